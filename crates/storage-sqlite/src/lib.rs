//! SQLite storage implementation for the price cache.
//!
//! This crate provides all database-related functionality using Diesel ORM with SQLite.
//! It implements the store trait defined in `pricecache-core` and contains:
//! - The bounded, pre-warmed connection pool (with overflow fallback)
//! - Diesel migrations
//! - The durable price cache repository
//! - Database-specific model types (with Diesel derives)
//!
//! # Architecture
//!
//! This crate is the only place in the workspace where Diesel dependencies exist.
//! `core` is database-agnostic and works with the `PriceCacheStore` trait.
//!
//! ```text
//! market-data ──► core (domain, refresh pipeline)
//!                   │
//!                   ▼
//!          storage-sqlite (this crate)
//!                   │
//!                   ▼
//!               SQLite DB
//! ```

pub mod db;
pub mod errors;
pub mod price_cache;
pub mod schema;
pub mod utils;

// Re-export database utilities
pub use db::{
    init, run_migrations, ConnectionPool, DbConnection, DbPool, PoolStats, PooledHandle,
};

// Re-export storage errors and conversion helpers
pub use errors::{IntoCore, StorageError};

pub use price_cache::PriceCacheRepository;

// Re-export from pricecache-core for convenience
pub use pricecache_core::errors::{DatabaseError, Error, Result};
