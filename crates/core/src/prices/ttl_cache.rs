//! In-process TTL price cache.
//!
//! First-line cache in front of the durable store. Records expire lazily: the
//! TTL is checked at read time and an expired record counts as a miss. There
//! is no sweeper thread; expired records are overwritten by the next fetch.
//!
//! The cache is not authoritative. The durable store is.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, warn};
use rust_decimal::Decimal;

/// One in-memory record.
#[derive(Clone, Debug)]
struct TtlRecord {
    price: Decimal,
    fetched_at: Instant,
}

#[derive(Debug, Default)]
struct TtlState {
    records: HashMap<String, TtlRecord>,
    hits: u64,
    misses: u64,
}

/// Snapshot of the hit/miss counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TtlStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
}

impl TtlStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }

    /// Hit rate in `[0, 1]`; zero before the first lookup.
    pub fn hit_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.hits as f64 / self.total() as f64
        }
    }
}

impl fmt::Display for TtlStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} ({:.1}%)",
            self.hits,
            self.total(),
            self.hit_rate() * 100.0
        )
    }
}

/// Thread-safe symbol -> price cache with a fixed time-to-live.
///
/// Every operation takes the single mutex for O(1) work; nothing blocks on I/O
/// while holding it.
pub struct TtlCache {
    ttl: Duration,
    state: Mutex<TtlState>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(TtlState::default()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Lock the state, recovering from poison.
    ///
    /// A poisoned lock only means another thread panicked mid-update of a
    /// counter or record, which is harmless for a cache.
    fn lock_state(&self) -> MutexGuard<'_, TtlState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            warn!("TTL cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }

    /// Returns the price if a record younger than the TTL exists.
    pub fn get(&self, symbol: &str) -> Option<Decimal> {
        self.get_at(symbol, Instant::now())
    }

    /// [`get`](Self::get) evaluated at an explicit instant.
    pub fn get_at(&self, symbol: &str, now: Instant) -> Option<Decimal> {
        let mut state = self.lock_state();

        let fresh = state
            .records
            .get(symbol)
            .filter(|record| now.saturating_duration_since(record.fetched_at) < self.ttl)
            .map(|record| record.price);

        match fresh {
            Some(price) => {
                state.hits += 1;
                debug!("TTL cache hit for {}", symbol);
                Some(price)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Like [`get`](Self::get) but also returns how long ago the price was
    /// fetched. Counts as a lookup.
    pub fn get_with_age(&self, symbol: &str) -> Option<(Decimal, Duration)> {
        let now = Instant::now();
        let mut state = self.lock_state();

        let fresh = state
            .records
            .get(symbol)
            .map(|record| (record.price, now.saturating_duration_since(record.fetched_at)))
            .filter(|(_, age)| *age < self.ttl);

        if fresh.is_some() {
            state.hits += 1;
        } else {
            state.misses += 1;
        }
        fresh
    }

    /// Stores a freshly fetched price.
    pub fn set(&self, symbol: &str, price: Decimal) {
        self.set_at(symbol, price, Instant::now());
    }

    /// [`set`](Self::set) with an explicit fetch instant.
    pub fn set_at(&self, symbol: &str, price: Decimal, fetched_at: Instant) {
        self.lock_state().records.insert(
            symbol.to_string(),
            TtlRecord { price, fetched_at },
        );
    }

    /// Drops the record for one symbol.
    pub fn remove(&self, symbol: &str) {
        self.lock_state().records.remove(symbol);
    }

    /// Drops every record. Counters are kept.
    pub fn clear(&self) {
        self.lock_state().records.clear();
    }

    /// Number of records held, expired ones included.
    pub fn len(&self) -> usize {
        self.lock_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> TtlStats {
        let state = self.lock_state();
        TtlStats {
            hits: state.hits,
            misses: state.misses,
            entries: state.records.len(),
        }
    }
}
