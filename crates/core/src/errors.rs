//! Core error types for the price cache.
//!
//! This module defines storage-agnostic error types. Storage-specific errors
//! (from Diesel, SQLite, r2d2) are converted to these types by the storage layer.

use thiserror::Error;

use pricecache_market_data::MarketDataError;

/// Type alias for Result using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Root error type for the price cache.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Database operation failed: {0}")]
    Database(#[from] DatabaseError),

    #[error("Market data operation failed: {0}")]
    MarketData(#[from] MarketDataError),

    #[error("Invalid configuration value: {0}")]
    InvalidConfigValue(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Storage-agnostic error type for durable cache operations.
///
/// The storage layer converts its own errors into this format.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to establish a database connection (includes overflow handles).
    #[error("Failed to connect to database: {0}")]
    ConnectionFailed(String),

    /// Failed to create or pre-warm the connection pool.
    #[error("Failed to create database pool: {0}")]
    PoolCreationFailed(String),

    /// The pool was closed by shutdown; no handle can be leased anymore.
    #[error("Connection pool is closed")]
    PoolClosed,

    /// A database query failed to execute.
    #[error("Database query failed: {0}")]
    QueryFailed(String),

    /// A database transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Database migration failed.
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// A stored row could not be decoded.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl Error {
    /// True when the failure comes from a closed pool (normal during shutdown).
    pub fn is_pool_closed(&self) -> bool {
        matches!(self, Error::Database(DatabaseError::PoolClosed))
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Task(err.to_string())
    }
}
