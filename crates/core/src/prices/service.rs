use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use rust_decimal::Decimal;
use tokio::runtime::Handle;

use pricecache_market_data::BatchPriceSource;

use super::coordinator::{RefreshCoordinator, RefreshTrigger};
use super::fetcher::BatchFetcher;
use super::model::{CacheStats, CachedPrice, Currency, DisplayPrice, RefreshScope};
use super::store::PriceCacheStore;
use super::ttl_cache::TtlCache;
use crate::config::CacheConfig;
use crate::errors::Result;
use crate::events::PriceEventSink;
use crate::fx::{pair_symbol, FxRate};

/// Entry point used by the UI layer.
///
/// Reads never touch the network: they answer from the TTL cache and the
/// durable store, and schedule a background refresh when the data is stale.
pub struct PriceCacheService {
    config: CacheConfig,
    store: Arc<dyn PriceCacheStore>,
    ttl_cache: Arc<TtlCache>,
    coordinator: RefreshCoordinator,
}

impl PriceCacheService {
    /// Wires the pipeline together. Refreshes are spawned on `runtime`.
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn PriceCacheStore>,
        source: Arc<dyn BatchPriceSource>,
        sink: Arc<dyn PriceEventSink>,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        let ttl_cache = Arc::new(TtlCache::new(config.ttl));
        let fetcher = Arc::new(BatchFetcher::new(
            source,
            ttl_cache.clone(),
            config.retry.clone(),
        ));
        let coordinator = RefreshCoordinator::new(
            fetcher,
            store.clone(),
            sink,
            runtime,
            config.staleness_threshold_minutes,
        );

        Ok(Self {
            config,
            store,
            ttl_cache,
            coordinator,
        })
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    pub fn ttl_cache(&self) -> &TtlCache {
        &self.ttl_cache
    }

    /// Best price available right now: TTL cache, then the durable cache
    /// regardless of age.
    pub fn get_price_instant(&self, symbol: &str) -> Option<Decimal> {
        if let Some(price) = self.ttl_cache.get(symbol) {
            return Some(price);
        }

        match self.store.get_any(symbol) {
            Ok(cached) => cached.map(|c| c.entry.price),
            Err(e) => {
                warn!("Durable cache read failed for {}: {}", symbol, e);
                None
            }
        }
    }

    /// Instant view of `symbols` for painting a table.
    ///
    /// Every requested symbol gets an entry; never-cached ones have no price.
    /// When the staleness policy says so, a refresh of `scope` is scheduled
    /// as a side effect.
    pub fn get_prices_for_display(
        &self,
        scope: &RefreshScope,
        symbols: &[String],
    ) -> HashMap<String, DisplayPrice> {
        let unique = dedup(symbols);
        let (view, cached) = self.read_view(&unique);

        if self.coordinator.needs_refresh(&cached, &unique) {
            debug!("{} has stale or missing prices", scope);
            self.coordinator.request_refresh(scope, &unique);
        }

        view
    }

    /// The same view as [`get_prices_for_display`](Self::get_prices_for_display)
    /// without the refresh side effect. Used to repaint after a refresh event.
    pub fn peek_prices_for_display(&self, symbols: &[String]) -> HashMap<String, DisplayPrice> {
        self.read_view(&dedup(symbols)).0
    }

    fn read_view(&self, unique: &[String]) -> (HashMap<String, DisplayPrice>, Vec<CachedPrice>) {
        let cached = match self.store.read_bulk_with_age(unique) {
            Ok(cached) => cached,
            Err(e) => {
                warn!(
                    "Bulk read of {} symbols failed, showing no cached data: {}",
                    unique.len(),
                    e
                );
                Vec::new()
            }
        };

        let mut view: HashMap<String, DisplayPrice> = cached
            .iter()
            .map(|c| (c.entry.symbol.clone(), DisplayPrice::from(c)))
            .collect();

        for symbol in unique {
            if view.contains_key(symbol) {
                continue;
            }
            // Fetched this session but not (yet) persisted
            let display = match self.ttl_cache.get_with_age(symbol) {
                Some((price, age)) => DisplayPrice {
                    price: Some(price),
                    age_minutes: Some((age.as_secs() / 60) as i64),
                    ..DisplayPrice::default()
                },
                None => DisplayPrice::default(),
            };
            view.insert(symbol.clone(), display);
        }

        (view, cached)
    }

    /// User-triggered "refresh now": drops the TTL records and refreshes
    /// regardless of staleness.
    pub fn force_refresh(&self, scope: &RefreshScope, symbols: &[String]) -> RefreshTrigger {
        for symbol in symbols {
            self.ttl_cache.remove(symbol);
        }
        self.coordinator.request_refresh(scope, symbols)
    }

    /// Diagnostics for the status bar.
    pub fn cache_stats(&self) -> Result<CacheStats> {
        let ttl = self.ttl_cache.stats();
        let durable = self.store.statistics()?;
        Ok(CacheStats {
            hit_rate: ttl.hit_rate(),
            ttl_summary: ttl.to_string(),
            total_cached: durable.total_cached,
            fresh_within_1h: durable.fresh_within_1h,
            fresh_within_24h: durable.fresh_within_24h,
        })
    }

    /// Deletes durable entries older than the configured eviction age,
    /// except for `keep` (held positions and watch-list).
    pub fn evict_stale(&self, keep: &[String]) -> Result<usize> {
        let removed = self.store.evict_stale(keep, self.config.eviction_age)?;
        if removed > 0 {
            info!("Evicted {} stale cache entries", removed);
        }
        Ok(removed)
    }

    /// Exchange rate from `from` to `to`, read from the cached pair symbol.
    pub fn fx_rate(&self, from: &Currency, to: &Currency) -> FxRate {
        if from == to {
            return FxRate::Identity;
        }

        match self.get_price_instant(&pair_symbol(from, to)) {
            Some(rate) => FxRate::Cached(rate),
            None => {
                let fallback = self.config.fx_fallback.resolve(from, to);
                debug!("No cached {}{} rate, using {:?}", from, to, fallback);
                fallback
            }
        }
    }

    /// Waits (bounded) for in-flight refreshes before the pool is closed.
    ///
    /// Returns `false` if some refresh was still running at the deadline;
    /// such runs end with a pool-closed failure.
    pub fn shutdown(&self, timeout: Duration) -> bool {
        let idle = self.coordinator.wait_until_idle(timeout);
        if idle {
            info!("Price cache idle, ready to close");
        } else {
            let scopes: Vec<String> = self
                .coordinator
                .running()
                .into_iter()
                .map(|run| run.scope.to_string())
                .collect();
            warn!("Abandoning running refreshes: {}", scopes.join(", "));
        }
        idle
    }
}

fn dedup(symbols: &[String]) -> Vec<String> {
    let mut unique: Vec<String> = symbols.to_vec();
    unique.sort();
    unique.dedup();
    unique
}
