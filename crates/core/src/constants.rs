use std::time::Duration;

/// Number of durable-store handles kept warm in the pool
pub const DEFAULT_POOL_SIZE: u32 = 5;

/// How long `acquire` waits for a pooled handle before opening an overflow one
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifetime of an in-process TTL cache record
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Durable entries older than this (in minutes) make their scope stale
pub const STALENESS_THRESHOLD_MINUTES: i64 = 60;

/// Per-request timeout for the batch price source
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Durable entries unreferenced and older than this are evicted
pub const DEFAULT_EVICTION_AGE_DAYS: i64 = 30;

/// Currency written when the provider does not report one
pub const DEFAULT_CURRENCY: &str = "USD";
