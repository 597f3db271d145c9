use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::StoreError;

/// Current price per symbol, shared between the feed and the read API.
///
/// Every read and write goes through a single lock around the whole map, so a
/// snapshot is always taken either before or after a committed batch.
#[derive(Clone, Default)]
pub struct PriceStore {
    prices: Arc<Mutex<HashMap<String, f64>>>,
}

impl PriceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, symbol: &str, price: f64) -> Result<(), StoreError> {
        validate(symbol, price)?;
        self.lock().insert(symbol.to_string(), price);
        Ok(())
    }

    /// Commits a whole tick under one lock acquisition. Nothing is written if
    /// any entry is invalid.
    pub fn apply(&self, batch: &[(String, f64)]) -> Result<(), StoreError> {
        for (symbol, price) in batch {
            validate(symbol, *price)?;
        }

        let mut prices = self.lock();
        for (symbol, price) in batch {
            prices.insert(symbol.clone(), *price);
        }
        Ok(())
    }

    pub fn get(&self, symbol: &str) -> Option<f64> {
        self.lock().get(symbol).copied()
    }

    /// Owned copy of the table, ordered by symbol.
    pub fn snapshot_all(&self) -> BTreeMap<String, f64> {
        self.lock()
            .iter()
            .map(|(symbol, price)| (symbol.clone(), *price))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // Entries are independent, so a panic mid-insert leaves nothing to repair.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, f64>> {
        self.prices.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn validate(symbol: &str, price: f64) -> Result<(), StoreError> {
    if symbol.is_empty() {
        return Err(StoreError::InvalidSymbol);
    }
    if !price.is_finite() || price < 0.0 {
        return Err(StoreError::InvalidPrice {
            symbol: symbol.to_string(),
            price,
        });
    }
    Ok(())
}
