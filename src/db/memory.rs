use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use super::{PriceRepository, PriceSnapshotRecord};
use crate::error::DbError;

/// Process-local price history, used with `DATABASE_URL=memory` and in tests.
#[derive(Default)]
pub struct MemoryRepository {
    records: Mutex<Vec<PriceSnapshotRecord>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Rows are appended whole, so a panicking writer leaves nothing half-written.
    fn lock(&self) -> MutexGuard<'_, Vec<PriceSnapshotRecord>> {
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl PriceRepository for MemoryRepository {
    async fn save(&self, symbol: &str, price: f64) -> Result<(), DbError> {
        let mut records = self.lock();
        let id = records.len() as i32 + 1;
        records.push(PriceSnapshotRecord {
            id,
            stock_name: symbol.to_string(),
            price,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PriceSnapshotRecord>, DbError> {
        let mut records = self.lock().clone();

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(records)
    }
}
