pub mod entity;
pub mod memory;
pub mod repository;

pub use memory::MemoryRepository;
pub use repository::SeaOrmRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DbError;

/// One persisted price observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshotRecord {
    pub id: i32,
    pub stock_name: String,
    pub price: f64,
    pub created_at: DateTime<Utc>,
}

impl From<entity::Model> for PriceSnapshotRecord {
    fn from(model: entity::Model) -> Self {
        Self {
            id: model.id,
            stock_name: model.stock_name,
            price: model.price,
            created_at: model.created_at,
        }
    }
}

/// Durable price history consumed by the feed (writes) and the read API (reads).
#[async_trait]
pub trait PriceRepository: Send + Sync {
    async fn save(&self, symbol: &str, price: f64) -> Result<(), DbError>;

    /// All records, newest first. Ties on `created_at` fall back to `id` descending.
    async fn load_all(&self) -> Result<Vec<PriceSnapshotRecord>, DbError>;

    async fn close(&self) -> Result<(), DbError> {
        Ok(())
    }
}
