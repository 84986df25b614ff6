//! Price cache: TTL cache, durable store contract, batch fetcher, refresh
//! coordinator and the facade used by the UI.

mod coordinator;
mod fetcher;
mod model;
mod service;
mod store;
mod ttl_cache;

#[cfg(test)]
mod service_tests;
#[cfg(test)]
pub(crate) mod test_support;

pub use coordinator::{RefreshCoordinator, RefreshRun, RefreshTrigger, RunStatus};
pub use fetcher::{BatchFetcher, FetchOutcome};
pub use model::{
    CacheEntry, CacheStatistics, CacheStats, CachedPrice, Currency, DisplayPrice, PriceUpdate,
    RefreshScope,
};
pub use service::PriceCacheService;
pub use store::PriceCacheStore;
pub use ttl_cache::{TtlCache, TtlStats};
