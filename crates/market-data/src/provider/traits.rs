//! Batch price source trait definition.

use async_trait::async_trait;

use crate::errors::MarketDataError;
use crate::models::BatchQuoteResult;

/// Trait for sources that can price many symbols in one round trip.
///
/// # Contract
///
/// - One call issues one grouped request, not one request per symbol.
/// - `Err` is reserved for failures of the whole request (transport, HTTP
///   status, unreadable body). Only transient ones are retried by the caller.
/// - A symbol that cannot be priced gets its own `Err` entry in the map, or is
///   left out. It must never fail the other symbols of the batch.
///
/// # Example
///
/// ```ignore
/// use async_trait::async_trait;
/// use pricecache_market_data::{BatchPriceSource, BatchQuoteResult, MarketDataError};
///
/// struct FixedSource;
///
/// #[async_trait]
/// impl BatchPriceSource for FixedSource {
///     fn id(&self) -> &'static str {
///         "FIXED"
///     }
///
///     async fn batch_quote(&self, symbols: &[String]) -> Result<BatchQuoteResult, MarketDataError> {
///         Ok(BatchQuoteResult::new())
///     }
/// }
/// ```
#[async_trait]
pub trait BatchPriceSource: Send + Sync {
    /// Unique identifier for this source, used in logs and errors.
    fn id(&self) -> &'static str;

    /// Fetch the latest price for every symbol in one grouped request.
    async fn batch_quote(&self, symbols: &[String]) -> Result<BatchQuoteResult, MarketDataError>;
}
