//! Pricecache Core - price cache domain, refresh pipeline and facade.
//!
//! This crate is database-agnostic: it defines the `PriceCacheStore` trait
//! implemented by the `storage-sqlite` crate, and talks to the network only
//! through `pricecache_market_data::BatchPriceSource`.

pub mod config;
pub mod constants;
pub mod errors;
pub mod events;
pub mod fx;
pub mod prices;

pub use config::CacheConfig;
pub use prices::*;

// Re-export error types
pub use errors::Error;
pub use errors::Result;
