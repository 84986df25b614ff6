//! Durable price cache storage trait.
//!
//! The durable cache is the authoritative, cross-session tier. Every method
//! leases one handle from the resource pool for its duration and never holds
//! two at once. Implementations are blocking; async callers go through
//! `spawn_blocking`.

use chrono::Duration;

use super::model::{CacheEntry, CacheStatistics, CachedPrice, PriceUpdate};
use crate::errors::Result;

/// Storage interface for the durable price cache.
///
/// # Method Naming Convention
///
/// - `get*` - point lookups
/// - `*_batch` / `read_bulk*` - many symbols in one statement or transaction
pub trait PriceCacheStore: Send + Sync {
    /// Returns the entry only if it is at most `max_age` old.
    ///
    /// A stale entry is reported as `None`, exactly like an absent one.
    fn get(&self, symbol: &str, max_age: Duration) -> Result<Option<CacheEntry>>;

    /// Returns the entry regardless of age, annotated with its age in minutes.
    fn get_any(&self, symbol: &str) -> Result<Option<CachedPrice>>;

    /// Overwrites the entry for `update.symbol`, setting `last_update = now`.
    fn upsert(&self, update: &PriceUpdate) -> Result<()>;

    /// Same as [`upsert`](Self::upsert) for many symbols in one transaction.
    ///
    /// Returns the number of rows written.
    fn upsert_batch(&self, updates: &[PriceUpdate]) -> Result<usize>;

    /// Single bulk read of the given symbols with their ages.
    ///
    /// Symbols that were never cached are simply missing from the result.
    fn read_bulk_with_age(&self, symbols: &[String]) -> Result<Vec<CachedPrice>>;

    /// Row counts used by the diagnostics view.
    fn statistics(&self) -> Result<CacheStatistics>;

    /// Deletes entries older than `max_age` whose symbol is not in `keep_symbols`.
    ///
    /// Returns the number of deleted rows.
    fn evict_stale(&self, keep_symbols: &[String], max_age: Duration) -> Result<usize>;
}
