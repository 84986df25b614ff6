//! Runtime configuration for the price cache.
//!
//! `CacheConfig::default()` carries the stock values; hosts override fields
//! (usually from environment variables) and call [`CacheConfig::validate`].

use std::time::Duration;

use chrono::Duration as ChronoDuration;
use pricecache_market_data::RetryPolicy;

use crate::constants::{
    DEFAULT_ACQUIRE_TIMEOUT, DEFAULT_EVICTION_AGE_DAYS, DEFAULT_POOL_SIZE, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_TTL, STALENESS_THRESHOLD_MINUTES,
};
use crate::errors::{Error, Result};
use crate::fx::FxFallbackPolicy;

/// Settings shared by the pool, the caches and the refresh pipeline.
#[derive(Clone, Debug)]
pub struct CacheConfig {
    /// Handles pre-opened in the durable-store pool.
    pub pool_size: u32,
    /// Wait for a pooled handle before falling back to an overflow handle.
    pub acquire_timeout: Duration,
    /// Lifetime of in-process TTL records.
    pub ttl: Duration,
    /// Durable entries older than this many minutes trigger a refresh.
    pub staleness_threshold_minutes: i64,
    /// Backoff applied around the grouped network call.
    pub retry: RetryPolicy,
    /// Per-request timeout handed to the HTTP source.
    pub request_timeout: Duration,
    /// Unreferenced durable entries older than this are evicted.
    pub eviction_age: ChronoDuration,
    /// What `fx_rate` answers when no cached rate exists.
    pub fx_fallback: FxFallbackPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            pool_size: DEFAULT_POOL_SIZE,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            ttl: DEFAULT_TTL,
            staleness_threshold_minutes: STALENESS_THRESHOLD_MINUTES,
            retry: RetryPolicy::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            eviction_age: ChronoDuration::days(DEFAULT_EVICTION_AGE_DAYS),
            fx_fallback: FxFallbackPolicy::Unavailable,
        }
    }
}

impl CacheConfig {
    /// Rejects values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pool_size == 0 {
            return Err(Error::InvalidConfigValue(
                "pool_size must be at least 1".to_string(),
            ));
        }
        if self.ttl.is_zero() {
            return Err(Error::InvalidConfigValue("ttl must be non-zero".to_string()));
        }
        if self.staleness_threshold_minutes < 0 {
            return Err(Error::InvalidConfigValue(
                "staleness_threshold_minutes must not be negative".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(Error::InvalidConfigValue(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.eviction_age <= ChronoDuration::zero() {
            return Err(Error::InvalidConfigValue(
                "eviction_age must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CacheConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.pool_size, 5);
        assert_eq!(config.ttl, Duration::from_secs(300));
        assert_eq!(config.staleness_threshold_minutes, 60);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_rejects_empty_pool() {
        let config = CacheConfig {
            pool_size: 0,
            ..CacheConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidConfigValue(_))
        ));
    }
}
