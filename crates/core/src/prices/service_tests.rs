//! Tests for PriceCacheService contracts.
//!
//! # Critical Contract Points
//!
//! 1. Reads are instant: display and instant lookups never wait for the network
//! 2. Cache-then-store: fetched prices are visible from the TTL cache first,
//!    then from the durable cache once the TTL record expires
//! 3. Refreshes are scheduled only when the staleness policy asks for one
//! 4. Storage failures degrade to "no cached data", never to a panic

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as ChronoDuration;
    use pricecache_market_data::RetryPolicy;
    use rust_decimal_macros::dec;
    use tokio::runtime::Runtime;

    use crate::config::CacheConfig;
    use crate::events::{event_channel, PriceCacheEvent, PriceEventReceiver};
    use crate::fx::{FxFallbackPolicy, FxRate};
    use crate::prices::test_support::{MemoryStore, ScriptedSource};
    use crate::prices::{
        Currency, DisplayPrice, PriceCacheService, PriceUpdate, RefreshScope, RefreshTrigger,
    };

    const WAIT: Duration = Duration::from_secs(5);

    struct Harness {
        runtime: Runtime,
        source: Arc<ScriptedSource>,
        store: Arc<MemoryStore>,
        receiver: PriceEventReceiver,
        service: PriceCacheService,
    }

    fn harness_with(config: CacheConfig, source: ScriptedSource) -> Harness {
        let runtime = Runtime::new().unwrap();
        let source = Arc::new(source);
        let store = Arc::new(MemoryStore::new());
        let (sink, receiver) = event_channel();
        let service = PriceCacheService::new(
            config,
            store.clone(),
            source.clone(),
            Arc::new(sink),
            runtime.handle().clone(),
        )
        .unwrap();
        Harness {
            runtime,
            source,
            store,
            receiver,
            service,
        }
    }

    fn harness(source: ScriptedSource) -> Harness {
        let config = CacheConfig {
            retry: RetryPolicy::no_retry(),
            ..CacheConfig::default()
        };
        harness_with(config, source)
    }

    fn symbols(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn usd_view() -> RefreshScope {
        RefreshScope::for_currency(&Currency::Usd)
    }

    impl Harness {
        fn next_event(&mut self) -> PriceCacheEvent {
            self.runtime
                .block_on(self.receiver.recv_timeout(WAIT))
                .expect("no event received")
        }
    }

    // =========================================================================
    // Display path
    // =========================================================================

    #[test]
    fn test_cold_display_schedules_refresh_then_shows_prices() {
        let mut h = harness(ScriptedSource::with_prices(&[
            ("AAPL", dec!(230.15)),
            ("MSFT", dec!(410.02)),
        ]));
        let wanted = symbols(&["AAPL", "MSFT"]);

        let first = h.service.get_prices_for_display(&usd_view(), &wanted);
        assert_eq!(first.len(), 2);
        assert_eq!(first["AAPL"], DisplayPrice::default());
        assert_eq!(first["MSFT"].price, None);

        assert!(h.service.coordinator().wait_until_idle(WAIT));
        assert!(matches!(
            h.next_event(),
            PriceCacheEvent::PricesUpdated { .. }
        ));

        let second = h.service.get_prices_for_display(&usd_view(), &wanted);
        assert_eq!(second["AAPL"].price, Some(dec!(230.15)));
        assert_eq!(second["AAPL"].age_minutes, Some(0));
        assert_eq!(second["MSFT"].price, Some(dec!(410.02)));
        assert_eq!(second["MSFT"].age_minutes, Some(0));

        // Fresh data does not trigger another fetch
        assert!(h.service.coordinator().wait_until_idle(WAIT));
        assert_eq!(h.source.calls(), 1);
    }

    #[test]
    fn test_fresh_durable_data_does_not_refresh() {
        let h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(1))]));
        h.store.insert_aged(
            &PriceUpdate::new("AAPL", dec!(229), Currency::Usd),
            ChronoDuration::minutes(30),
        );

        let view = h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));

        assert_eq!(view["AAPL"].price, Some(dec!(229)));
        assert_eq!(view["AAPL"].age_minutes, Some(30));
        assert!(h.service.coordinator().is_idle());
        assert_eq!(h.source.calls(), 0);
    }

    #[test]
    fn test_stale_durable_data_is_shown_and_refreshed() {
        let h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(231))]));
        h.store.insert_aged(
            &PriceUpdate::new("AAPL", dec!(229), Currency::Usd),
            ChronoDuration::minutes(90),
        );

        let view = h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert_eq!(view["AAPL"].price, Some(dec!(229)));
        assert_eq!(view["AAPL"].age_minutes, Some(90));

        assert!(h.service.coordinator().wait_until_idle(WAIT));
        assert_eq!(h.source.calls(), 1);
        assert_eq!(h.store.entry("AAPL").unwrap().price, dec!(231));
    }

    #[test]
    fn test_display_survives_read_failure() {
        let h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(1))]));
        h.store.set_fail_reads(true);

        let view = h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));

        assert_eq!(view["AAPL"], DisplayPrice::default());
        assert!(h.service.coordinator().wait_until_idle(WAIT));
    }

    #[test]
    fn test_display_uses_ttl_when_durable_write_failed() {
        let mut h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(230.15))]));
        h.store.set_fail_writes(true);

        h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().wait_until_idle(WAIT));
        assert!(matches!(
            h.next_event(),
            PriceCacheEvent::RefreshFailed { .. }
        ));

        let view = h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert_eq!(view["AAPL"].price, Some(dec!(230.15)));
        assert_eq!(view["AAPL"].age_minutes, Some(0));
        assert!(h.service.coordinator().wait_until_idle(WAIT));
    }

    #[test]
    fn test_durable_cache_catches_up_after_writes_recover() {
        let mut h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(230.15))]));
        h.store.set_fail_writes(true);

        h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().wait_until_idle(WAIT));
        assert!(matches!(
            h.next_event(),
            PriceCacheEvent::RefreshFailed { .. }
        ));

        h.store.set_fail_writes(false);
        h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().wait_until_idle(WAIT));

        assert_eq!(
            h.next_event(),
            PriceCacheEvent::prices_updated(usd_view(), symbols(&["AAPL"]), vec![])
        );
        assert_eq!(h.store.entry("AAPL").unwrap().price, dec!(230.15));

        // Durable and fresh now: the next display schedules nothing
        let calls = h.source.calls();
        h.service.get_prices_for_display(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().is_idle());
        assert_eq!(h.source.calls(), calls);
    }

    #[test]
    fn test_peek_never_schedules_a_refresh() {
        let h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(1))]));
        h.store.insert_aged(
            &PriceUpdate::new("MSFT", dec!(400), Currency::Usd),
            ChronoDuration::hours(3),
        );

        let view = h
            .service
            .peek_prices_for_display(&symbols(&["ZZZZ", "MSFT", "ZZZZ"]));

        assert_eq!(view.len(), 2);
        assert_eq!(view["ZZZZ"], DisplayPrice::default());
        assert_eq!(view["MSFT"].price, Some(dec!(400)));
        assert!(h.service.coordinator().is_idle());
        assert_eq!(h.source.calls(), 0);
    }

    // =========================================================================
    // Instant lookups
    // =========================================================================

    #[test]
    fn test_cache_then_store() {
        let config = CacheConfig {
            ttl: Duration::from_millis(50),
            retry: RetryPolicy::no_retry(),
            ..CacheConfig::default()
        };
        let h = harness_with(config, ScriptedSource::with_prices(&[("AAPL", dec!(230.15))]));

        assert_eq!(
            h.service.force_refresh(&usd_view(), &symbols(&["AAPL"])),
            RefreshTrigger::Started
        );
        assert!(h.service.coordinator().wait_until_idle(WAIT));

        let before = h.service.ttl_cache().stats().hits;
        assert_eq!(h.service.get_price_instant("AAPL"), Some(dec!(230.15)));
        assert_eq!(h.service.ttl_cache().stats().hits, before + 1);

        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(h.service.ttl_cache().get("AAPL"), None);
        assert_eq!(h.service.get_price_instant("AAPL"), Some(dec!(230.15)));
    }

    #[test]
    fn test_instant_lookup_of_unknown_symbol() {
        let h = harness(ScriptedSource::with_prices(&[]));
        assert_eq!(h.service.get_price_instant("NOPE"), None);
        assert_eq!(h.source.calls(), 0);
    }

    #[test]
    fn test_instant_lookup_survives_read_failure() {
        let h = harness(ScriptedSource::with_prices(&[]));
        h.store.set_fail_reads(true);
        assert_eq!(h.service.get_price_instant("AAPL"), None);
    }

    // =========================================================================
    // Force refresh
    // =========================================================================

    #[test]
    fn test_force_refresh_bypasses_ttl_and_staleness() {
        let h = harness(ScriptedSource::with_prices(&[("AAPL", dec!(230.15))]));

        h.service.force_refresh(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().wait_until_idle(WAIT));
        h.source.set_price("AAPL", dec!(231.00));

        // Data is fresh and warm, but the user asked for it
        h.service.force_refresh(&usd_view(), &symbols(&["AAPL"]));
        assert!(h.service.coordinator().wait_until_idle(WAIT));

        assert_eq!(h.source.calls(), 2);
        assert_eq!(h.store.entry("AAPL").unwrap().price, dec!(231.00));
        assert_eq!(h.service.get_price_instant("AAPL"), Some(dec!(231.00)));
    }

    #[test]
    fn test_force_refresh_while_running_is_dropped() {
        let (source, gate) = ScriptedSource::with_prices(&[("AAPL", dec!(1))]).gated();
        let h = harness(source);

        assert_eq!(
            h.service.force_refresh(&usd_view(), &symbols(&["AAPL"])),
            RefreshTrigger::Started
        );
        assert_eq!(
            h.service.force_refresh(&usd_view(), &symbols(&["AAPL"])),
            RefreshTrigger::AlreadyRunning
        );

        gate.add_permits(1);
        assert!(h.service.shutdown(WAIT));
        assert_eq!(h.source.calls(), 1);
    }

    // =========================================================================
    // Diagnostics and maintenance
    // =========================================================================

    #[test]
    fn test_cache_stats_combines_ttl_and_durable_counts() {
        let h = harness(ScriptedSource::with_prices(&[]));
        h.store.insert_aged(
            &PriceUpdate::new("AAPL", dec!(1), Currency::Usd),
            ChronoDuration::minutes(10),
        );
        h.store.insert_aged(
            &PriceUpdate::new("MSFT", dec!(2), Currency::Usd),
            ChronoDuration::hours(5),
        );
        h.store.insert_aged(
            &PriceUpdate::new("NVDA", dec!(3), Currency::Usd),
            ChronoDuration::days(3),
        );
        h.service.ttl_cache().set("AAPL", dec!(1));
        h.service.get_price_instant("AAPL");
        h.service.get_price_instant("MSFT");

        let stats = h.service.cache_stats().unwrap();
        assert_eq!(stats.total_cached, 3);
        assert_eq!(stats.fresh_within_1h, 1);
        assert_eq!(stats.fresh_within_24h, 2);
        assert_eq!(stats.ttl_summary, "1/2 (50.0%)");
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_evict_stale_keeps_live_symbols() {
        let h = harness(ScriptedSource::with_prices(&[]));
        for symbol in ["OLD", "HELD"] {
            h.store.insert_aged(
                &PriceUpdate::new(symbol, dec!(1), Currency::Usd),
                ChronoDuration::days(45),
            );
        }
        h.store.insert_aged(
            &PriceUpdate::new("NEW", dec!(1), Currency::Usd),
            ChronoDuration::days(1),
        );

        let removed = h.service.evict_stale(&symbols(&["HELD"])).unwrap();

        assert_eq!(removed, 1);
        assert!(h.store.entry("OLD").is_none());
        assert!(h.store.entry("HELD").is_some());
        assert!(h.store.entry("NEW").is_some());
    }

    // =========================================================================
    // FX rates
    // =========================================================================

    #[test]
    fn test_fx_rate_reads_cached_pair() {
        let h = harness(ScriptedSource::with_prices(&[]));
        h.store.insert_aged(
            &PriceUpdate::new("USDPLN=X", dec!(3.98), Currency::Pln),
            ChronoDuration::hours(2),
        );

        assert_eq!(
            h.service.fx_rate(&Currency::Usd, &Currency::Pln),
            FxRate::Cached(dec!(3.98))
        );
        assert_eq!(
            h.service.fx_rate(&Currency::Pln, &Currency::Pln),
            FxRate::Identity
        );
    }

    #[test]
    fn test_fx_rate_unavailable_by_default() {
        let h = harness(ScriptedSource::with_prices(&[]));
        assert_eq!(
            h.service.fx_rate(&Currency::Usd, &Currency::Pln),
            FxRate::Unavailable
        );
    }

    #[test]
    fn test_fx_rate_uses_configured_fallback() {
        let config = CacheConfig {
            fx_fallback: FxFallbackPolicy::defaults([(Currency::Usd, Currency::Pln, dec!(4))]),
            ..CacheConfig::default()
        };
        let h = harness_with(config, ScriptedSource::with_prices(&[]));

        let rate = h.service.fx_rate(&Currency::Usd, &Currency::Pln);
        assert_eq!(rate, FxRate::Fallback(dec!(4)));
        assert!(rate.is_fallback());
    }

    #[test]
    fn test_rejects_invalid_config() {
        let runtime = Runtime::new().unwrap();
        let (sink, _receiver) = event_channel();
        let config = CacheConfig {
            pool_size: 0,
            ..CacheConfig::default()
        };
        let result = PriceCacheService::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(ScriptedSource::with_prices(&[])),
            Arc::new(sink),
            runtime.handle().clone(),
        );
        assert!(result.is_err());
    }
}
