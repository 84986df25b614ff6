//! Batch fetcher: the only component that reaches the network.
//!
//! For a set of symbols it answers warm ones from the TTL cache, prices the
//! rest with one grouped request wrapped in retry-with-backoff, and classifies
//! every symbol independently.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use log::{debug, info, warn};
use rust_decimal::Decimal;

use pricecache_market_data::{
    retry_with_backoff, BatchPriceSource, BatchQuote, MarketDataError, RetryPolicy,
};

use super::ttl_cache::TtlCache;

/// Result of fetching one symbol.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchOutcome {
    /// Answered from the TTL cache; the network was not asked.
    Warm(Decimal),
    /// Priced by the source in this call.
    Fetched(BatchQuote),
    /// Could not be priced; the reason is kept for logging.
    Failed(String),
}

impl FetchOutcome {
    pub fn price(&self) -> Option<Decimal> {
        match self {
            FetchOutcome::Warm(price) => Some(*price),
            FetchOutcome::Fetched(quote) => Some(quote.price),
            FetchOutcome::Failed(_) => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, FetchOutcome::Failed(_))
    }
}

/// Fetches prices for many symbols in as few round trips as possible.
pub struct BatchFetcher {
    source: Arc<dyn BatchPriceSource>,
    ttl_cache: Arc<TtlCache>,
    retry: RetryPolicy,
}

impl BatchFetcher {
    pub fn new(
        source: Arc<dyn BatchPriceSource>,
        ttl_cache: Arc<TtlCache>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            ttl_cache,
            retry,
        }
    }

    /// Prices every symbol in `symbols`.
    ///
    /// The returned map has exactly one entry per requested symbol. A failed
    /// grouped call (after retries) marks all of its symbols failed; it never
    /// returns an error to the caller.
    pub async fn fetch(&self, symbols: &BTreeSet<String>) -> HashMap<String, FetchOutcome> {
        self.fetch_with_cold(symbols, &BTreeSet::new()).await
    }

    /// Like [`fetch`](Self::fetch), but symbols in `cold` go to the source
    /// even when the TTL cache holds them.
    pub async fn fetch_with_cold(
        &self,
        symbols: &BTreeSet<String>,
        cold: &BTreeSet<String>,
    ) -> HashMap<String, FetchOutcome> {
        let mut outcomes = HashMap::with_capacity(symbols.len());
        let mut to_fetch: Vec<String> = Vec::new();

        for symbol in symbols {
            if cold.contains(symbol) {
                to_fetch.push(symbol.clone());
                continue;
            }
            match self.ttl_cache.get(symbol) {
                Some(price) => {
                    outcomes.insert(symbol.clone(), FetchOutcome::Warm(price));
                }
                None => to_fetch.push(symbol.clone()),
            }
        }

        if to_fetch.is_empty() {
            debug!("All {} symbols warm in TTL cache", symbols.len());
            return outcomes;
        }

        let source_id = self.source.id();
        let label = format!("{} batch quote ({} symbols)", source_id, to_fetch.len());
        let response = retry_with_backoff(&self.retry, &label, MarketDataError::is_transient, || {
            self.source.batch_quote(&to_fetch)
        })
        .await;

        match response {
            Ok(mut results) => {
                for symbol in to_fetch {
                    let outcome = match results.remove(&symbol) {
                        Some(Ok(quote)) => {
                            self.ttl_cache.set(&symbol, quote.price);
                            FetchOutcome::Fetched(quote)
                        }
                        Some(Err(err)) => FetchOutcome::Failed(err.to_string()),
                        None => FetchOutcome::Failed(
                            MarketDataError::SymbolNotFound(symbol.clone()).to_string(),
                        ),
                    };
                    outcomes.insert(symbol, outcome);
                }
            }
            Err(err) => {
                warn!(
                    "{} failed for {} symbols: {}",
                    source_id,
                    to_fetch.len(),
                    err
                );
                let reason = err.to_string();
                for symbol in to_fetch {
                    outcomes.insert(symbol, FetchOutcome::Failed(reason.clone()));
                }
            }
        }

        let failed = outcomes.values().filter(|o| o.is_failed()).count();
        info!(
            "Fetched {} symbols from {}: {} ok, {} failed",
            symbols.len(),
            source_id,
            outcomes.len() - failed,
            failed
        );

        outcomes
    }
}
