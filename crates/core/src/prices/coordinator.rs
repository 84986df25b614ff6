//! Refresh coordinator: single-flight background refresh per scope.
//!
//! Each scope moves `Idle -> Running -> Idle`. A request for a scope that is
//! already running is dropped, not queued. The run itself (fetch, durable
//! write, notification) executes on the tokio runtime, never on the caller's
//! thread, and the scope returns to `Idle` whether the run succeeded or not.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use tokio::runtime::Handle;

use super::fetcher::{BatchFetcher, FetchOutcome};
use super::model::{CachedPrice, Currency, PriceUpdate, RefreshScope};
use super::store::PriceCacheStore;
use crate::errors::Error;
use crate::events::{PriceCacheEvent, PriceEventSink};

/// Status of one scope.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
}

/// What `request_refresh` did with the request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshTrigger {
    /// A new run was spawned.
    Started,
    /// The scope was running; the request was dropped.
    AlreadyRunning,
    /// No symbols were given; nothing to do.
    Empty,
}

/// Bookkeeping for an in-flight run.
#[derive(Clone, Debug)]
pub struct RefreshRun {
    pub scope: RefreshScope,
    pub symbols: BTreeSet<String>,
    pub started_at: DateTime<Utc>,
}

#[derive(Default)]
struct RunTable {
    running: Mutex<HashMap<RefreshScope, RefreshRun>>,
    idle: Condvar,
}

impl RunTable {
    fn lock(&self) -> MutexGuard<'_, HashMap<RefreshScope, RefreshRun>> {
        self.running.lock().unwrap_or_else(|poisoned| {
            warn!("Refresh run table mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

/// Returns the scope to `Idle` when the run ends, however it ends.
struct RunGuard {
    table: Arc<RunTable>,
    scope: RefreshScope,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.table.lock().remove(&self.scope);
        self.table.idle.notify_all();
    }
}

pub struct RefreshCoordinator {
    fetcher: Arc<BatchFetcher>,
    store: Arc<dyn PriceCacheStore>,
    sink: Arc<dyn PriceEventSink>,
    runtime: Handle,
    staleness_threshold_minutes: i64,
    table: Arc<RunTable>,
}

impl RefreshCoordinator {
    pub fn new(
        fetcher: Arc<BatchFetcher>,
        store: Arc<dyn PriceCacheStore>,
        sink: Arc<dyn PriceEventSink>,
        runtime: Handle,
        staleness_threshold_minutes: i64,
    ) -> Self {
        Self {
            fetcher,
            store,
            sink,
            runtime,
            staleness_threshold_minutes,
            table: Arc::new(RunTable::default()),
        }
    }

    /// Staleness policy.
    ///
    /// `cached` is the bulk read of the durable cache for `symbols`. The scope
    /// needs a refresh when any symbol was never cached or is older than the
    /// threshold.
    pub fn needs_refresh(&self, cached: &[CachedPrice], symbols: &[String]) -> bool {
        let ages: HashMap<&str, i64> = cached
            .iter()
            .map(|c| (c.entry.symbol.as_str(), c.age_minutes))
            .collect();

        symbols.iter().any(|symbol| match ages.get(symbol.as_str()) {
            None => true,
            Some(age) => *age > self.staleness_threshold_minutes,
        })
    }

    pub fn run_status(&self, scope: &RefreshScope) -> RunStatus {
        if self.table.lock().contains_key(scope) {
            RunStatus::Running
        } else {
            RunStatus::Idle
        }
    }

    /// Snapshot of the runs currently in flight.
    pub fn running(&self) -> Vec<RefreshRun> {
        self.table.lock().values().cloned().collect()
    }

    pub fn is_idle(&self) -> bool {
        self.table.lock().is_empty()
    }

    /// Blocks the calling thread until no scope is running or `timeout`
    /// elapses. Returns `true` when idle.
    ///
    /// Must not be called from inside the runtime's worker threads.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut running = self.table.lock();
        while !running.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            running = match self.table.idle.wait_timeout(running, remaining) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
        true
    }

    /// Starts a background refresh of `symbols` for `scope` unless one is
    /// already running.
    ///
    /// Returns immediately; completion is reported through the event sink.
    pub fn request_refresh(&self, scope: &RefreshScope, symbols: &[String]) -> RefreshTrigger {
        let symbols: BTreeSet<String> = symbols.iter().cloned().collect();
        if symbols.is_empty() {
            return RefreshTrigger::Empty;
        }

        {
            let mut running = self.table.lock();
            if running.contains_key(scope) {
                debug!("Refresh for {} already running, request dropped", scope);
                return RefreshTrigger::AlreadyRunning;
            }
            running.insert(
                scope.clone(),
                RefreshRun {
                    scope: scope.clone(),
                    symbols: symbols.clone(),
                    started_at: Utc::now(),
                },
            );
        }

        // Created before spawning: if the runtime is gone the future is
        // dropped unpolled and the guard still resets the scope.
        let guard = RunGuard {
            table: self.table.clone(),
            scope: scope.clone(),
        };

        info!("Refresh started for {} ({} symbols)", scope, symbols.len());

        let fetcher = self.fetcher.clone();
        let store = self.store.clone();
        let sink = self.sink.clone();
        let scope = scope.clone();
        let threshold = self.staleness_threshold_minutes;

        self.runtime.spawn(async move {
            let event = run_refresh(&fetcher, store, &scope, &symbols, threshold).await;
            drop(guard);
            match event {
                Some(event) => sink.emit(event),
                None => debug!("Refresh for {} wrote nothing, no notification", scope),
            }
        });

        RefreshTrigger::Started
    }
}

/// Symbols whose durable entry is missing or older than `threshold_minutes`.
///
/// A TTL record for such a symbol means the run that fetched it never wrote
/// it, so it has to be priced again. A failed read counts every symbol.
async fn unpersisted(
    store: Arc<dyn PriceCacheStore>,
    symbols: &BTreeSet<String>,
    threshold_minutes: i64,
) -> BTreeSet<String> {
    let wanted: Vec<String> = symbols.iter().cloned().collect();
    let read = tokio::task::spawn_blocking(move || store.read_bulk_with_age(&wanted))
        .await
        .map_err(Error::from)
        .and_then(|result| result);

    match read {
        Ok(cached) => {
            let fresh: HashSet<String> = cached
                .into_iter()
                .filter(|c| c.age_minutes <= threshold_minutes)
                .map(|c| c.entry.symbol)
                .collect();
            symbols
                .iter()
                .filter(|symbol| !fresh.contains(*symbol))
                .cloned()
                .collect()
        }
        Err(err) => {
            warn!("Could not read durable cache before refresh: {}", err);
            symbols.clone()
        }
    }
}

/// One refresh run: fetch, persist the fresh quotes, describe the result.
///
/// Returns `None` when there was nothing to write and nothing failed.
async fn run_refresh(
    fetcher: &BatchFetcher,
    store: Arc<dyn PriceCacheStore>,
    scope: &RefreshScope,
    symbols: &BTreeSet<String>,
    threshold_minutes: i64,
) -> Option<PriceCacheEvent> {
    let cold = unpersisted(store.clone(), symbols, threshold_minutes).await;
    let outcomes = fetcher.fetch_with_cold(symbols, &cold).await;

    let mut updates = Vec::new();
    let mut failed = Vec::new();
    for (symbol, outcome) in outcomes {
        match outcome {
            FetchOutcome::Fetched(quote) => {
                let currency = Currency::from_provider(quote.currency.as_deref());
                let mut update = PriceUpdate::new(symbol, quote.price, currency);
                update.display_name = quote.display_name;
                updates.push(update);
            }
            // Durable entry is present and fresh
            FetchOutcome::Warm(_) => {}
            FetchOutcome::Failed(reason) => {
                debug!("{}: {} keeps its cached value ({})", scope, symbol, reason);
                failed.push(symbol);
            }
        }
    }
    failed.sort();

    if updates.is_empty() && !failed.is_empty() {
        warn!("Refresh for {} fetched nothing ({} failed)", scope, failed.len());
        return Some(PriceCacheEvent::refresh_failed(
            scope.clone(),
            format!("no prices fetched for {} symbols", failed.len()),
        ));
    }
    if updates.is_empty() {
        return None;
    }

    let mut updated: Vec<String> = updates.iter().map(|u| u.symbol.clone()).collect();
    updated.sort();

    let written = tokio::task::spawn_blocking(move || store.upsert_batch(&updates))
        .await
        .map_err(Error::from)
        .and_then(|result| result);

    match written {
        Ok(count) => debug!("{}: wrote {} cache entries", scope, count),
        Err(err) if err.is_pool_closed() => {
            warn!("Refresh for {} abandoned: {}", scope, err);
            return Some(PriceCacheEvent::refresh_failed(scope.clone(), err.to_string()));
        }
        Err(err) => {
            error!("Refresh for {} could not persist prices: {}", scope, err);
            return Some(PriceCacheEvent::refresh_failed(scope.clone(), err.to_string()));
        }
    }

    info!(
        "Refresh finished for {}: {} updated, {} failed",
        scope,
        updated.len(),
        failed.len()
    );
    Some(PriceCacheEvent::prices_updated(scope.clone(), updated, failed))
}
