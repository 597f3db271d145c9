use thiserror::Error;

use crate::data::SubscriberId;

/// Rejected writes to the price table.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("symbol must not be empty")]
    InvalidSymbol,

    #[error("invalid price {price} for {symbol}: must be finite and non-negative")]
    InvalidPrice { symbol: String, price: f64 },
}

/// Coordination errors reported to callers of register/unregister.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("subscriber {0} is already registered")]
    AlreadyRegistered(SubscriberId),

    #[error("subscriber {0} is not registered")]
    NotRegistered(SubscriberId),

    #[error("broadcaster is closed")]
    Closed,
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
