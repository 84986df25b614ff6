//! Mock collaborators shared by the price cache unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Semaphore;

use pricecache_market_data::{BatchPriceSource, BatchQuote, BatchQuoteResult, MarketDataError};

use super::model::{CacheEntry, CacheStatistics, CachedPrice, PriceUpdate};
use super::store::PriceCacheStore;
use crate::errors::{DatabaseError, Error, Result};

// =========================================================================
// Scripted price source
// =========================================================================

/// Batch source answering from a fixed price table.
#[derive(Default)]
pub struct ScriptedSource {
    prices: Mutex<HashMap<String, Decimal>>,
    failing: HashSet<String>,
    transient_failures: AtomicUsize,
    calls: AtomicUsize,
    requested: Mutex<Vec<Vec<String>>>,
    gate: Option<Arc<Semaphore>>,
}

impl ScriptedSource {
    pub fn with_prices(prices: &[(&str, Decimal)]) -> Self {
        Self {
            prices: Mutex::new(
                prices
                    .iter()
                    .map(|(symbol, price)| (symbol.to_string(), *price))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    /// The symbol comes back as a per-symbol parse failure.
    pub fn failing_symbol(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    /// The first `count` calls fail with a timeout.
    pub fn transient_failures(self, count: usize) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    /// Every call waits for a permit on the returned semaphore.
    pub fn gated(mut self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        self.gate = Some(gate.clone());
        (self, gate)
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices
            .lock()
            .unwrap()
            .insert(symbol.to_string(), price);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requested(&self) -> Vec<Vec<String>> {
        self.requested.lock().unwrap().clone()
    }
}

#[async_trait]
impl BatchPriceSource for ScriptedSource {
    fn id(&self) -> &'static str {
        "SCRIPTED"
    }

    async fn batch_quote(
        &self,
        symbols: &[String],
    ) -> std::result::Result<BatchQuoteResult, MarketDataError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbols.to_vec());

        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }

        let remaining = self.transient_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures.store(remaining - 1, Ordering::SeqCst);
            return Err(MarketDataError::Timeout {
                provider: "SCRIPTED".to_string(),
            });
        }

        let prices = self.prices.lock().unwrap();
        let mut result = BatchQuoteResult::new();
        for symbol in symbols {
            if self.failing.contains(symbol) {
                result.insert(
                    symbol.clone(),
                    Err(MarketDataError::ParseFailed {
                        symbol: symbol.clone(),
                        message: "scripted failure".to_string(),
                    }),
                );
            } else if let Some(price) = prices.get(symbol) {
                result.insert(
                    symbol.clone(),
                    Ok(BatchQuote::new(symbol.clone(), *price).with_currency("USD")),
                );
            }
        }
        Ok(result)
    }
}

// =========================================================================
// In-memory durable store
// =========================================================================

/// `PriceCacheStore` over a mutex-guarded map.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
    fail_writes: Mutex<bool>,
    fail_reads: Mutex<bool>,
    batch_writes: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap() = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        *self.fail_reads.lock().unwrap() = fail;
    }

    /// Inserts an entry with an explicit age.
    pub fn insert_aged(&self, update: &PriceUpdate, age: Duration) {
        let entry = CacheEntry {
            symbol: update.symbol.clone(),
            price: update.price,
            currency: update.currency.clone(),
            display_name: update.display_name.clone(),
            last_update: Utc::now() - age,
        };
        self.entries
            .lock()
            .unwrap()
            .insert(update.symbol.clone(), entry);
    }

    pub fn entry(&self, symbol: &str) -> Option<CacheEntry> {
        self.entries.lock().unwrap().get(symbol).cloned()
    }

    pub fn batch_writes(&self) -> usize {
        self.batch_writes.load(Ordering::SeqCst)
    }

    fn check_reads(&self) -> Result<()> {
        if *self.fail_reads.lock().unwrap() {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "Intentional read failure".to_string(),
            )));
        }
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(Error::Database(DatabaseError::QueryFailed(
                "Intentional write failure".to_string(),
            )));
        }
        Ok(())
    }
}

impl PriceCacheStore for MemoryStore {
    fn get(&self, symbol: &str, max_age: Duration) -> Result<Option<CacheEntry>> {
        self.check_reads()?;
        let now = Utc::now();
        Ok(self
            .entry(symbol)
            .filter(|entry| now - entry.last_update <= max_age))
    }

    fn get_any(&self, symbol: &str) -> Result<Option<CachedPrice>> {
        self.check_reads()?;
        let now = Utc::now();
        Ok(self.entry(symbol).map(|entry| entry.with_age_at(now)))
    }

    fn upsert(&self, update: &PriceUpdate) -> Result<()> {
        self.check_writes()?;
        self.insert_aged(update, Duration::zero());
        Ok(())
    }

    fn upsert_batch(&self, updates: &[PriceUpdate]) -> Result<usize> {
        self.check_writes()?;
        self.batch_writes.fetch_add(1, Ordering::SeqCst);
        for update in updates {
            self.insert_aged(update, Duration::zero());
        }
        Ok(updates.len())
    }

    fn read_bulk_with_age(&self, symbols: &[String]) -> Result<Vec<CachedPrice>> {
        self.check_reads()?;
        let now = Utc::now();
        let entries = self.entries.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|symbol| entries.get(symbol))
            .map(|entry| entry.clone().with_age_at(now))
            .collect())
    }

    fn statistics(&self) -> Result<CacheStatistics> {
        self.check_reads()?;
        let now = Utc::now();
        let entries = self.entries.lock().unwrap();
        Ok(CacheStatistics {
            total_cached: entries.len() as i64,
            fresh_within_1h: entries
                .values()
                .filter(|e| now - e.last_update < Duration::hours(1))
                .count() as i64,
            fresh_within_24h: entries
                .values()
                .filter(|e| now - e.last_update < Duration::hours(24))
                .count() as i64,
            oldest_update: entries.values().map(|e| e.last_update).min(),
            newest_update: entries.values().map(|e| e.last_update).max(),
        })
    }

    fn evict_stale(&self, keep_symbols: &[String], max_age: Duration) -> Result<usize> {
        self.check_writes()?;
        let now = Utc::now();
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|symbol, entry| {
            keep_symbols.contains(symbol) || now - entry.last_update <= max_age
        });
        Ok(before - entries.len())
    }
}
