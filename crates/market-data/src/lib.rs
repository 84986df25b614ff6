//! Pricecache Market Data Crate
//!
//! Provider-agnostic access to "batch price sources": anything that can
//! return the latest price for many symbols in one round trip.
//!
//! # Overview
//!
//! - [`BatchPriceSource`] - the trait a provider implements
//! - [`YahooBatchSource`] - HTTP implementation over the grouped quote endpoint
//! - [`MarketDataError`] / [`RetryClass`] - error taxonomy with retry classification
//! - [`RetryPolicy`] / [`retry_with_backoff`] - exponential backoff wrapper,
//!   applied only around network calls
//!
//! ```text
//! caller ──> retry_with_backoff ──> BatchPriceSource::batch_quote ──> HTTP
//!                                          │
//!                                          v
//!                              BatchQuoteResult (per symbol Ok/Err)
//! ```

pub mod errors;
pub mod models;
pub mod provider;

pub use errors::{retry_with_backoff, MarketDataError, RetryClass, RetryPolicy};
pub use models::{BatchQuote, BatchQuoteResult};
pub use provider::yahoo::YahooBatchSource;
pub use provider::BatchPriceSource;
