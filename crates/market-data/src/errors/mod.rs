//! Error types and retry classification for the market data crate.
//!
//! This module provides:
//! - [`MarketDataError`]: The main error enum for all price source operations
//! - [`RetryClass`]: Classification for determining retry behavior
//! - [`RetryPolicy`] and [`retry_with_backoff`]: The backoff wrapper applied around network calls

mod retry;

pub use retry::{retry_with_backoff, RetryClass, RetryPolicy};

use thiserror::Error;

/// Errors that can occur while talking to a batch price source.
///
/// Each variant is classified into a [`RetryClass`] via the [`retry_class`](Self::retry_class)
/// method, which decides whether the backoff wrapper should try the call again.
#[derive(Error, Debug)]
pub enum MarketDataError {
    /// The requested symbol was not present in the provider response.
    /// This is a terminal error - retrying won't help.
    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    /// The provider rate limited the request (HTTP 429).
    #[error("Rate limited: {provider}")]
    RateLimited {
        /// The provider that rate limited the request
        provider: String,
    },

    /// The request to the provider timed out.
    #[error("Timeout: {provider}")]
    Timeout {
        /// The provider that timed out
        provider: String,
    },

    /// The connection to the provider could not be established or was reset.
    #[error("Connection failed: {provider} - {message}")]
    ConnectionFailed {
        /// The provider we tried to reach
        provider: String,
        /// Transport error description
        message: String,
    },

    /// The provider answered with a non-success status or an unusable body.
    #[error("Provider error: {provider} - {message}")]
    ProviderError {
        /// The provider that returned the error
        provider: String,
        /// The error message from the provider
        message: String,
    },

    /// The response (or one symbol inside it) could not be parsed.
    #[error("Parse error for {symbol}: {message}")]
    ParseFailed {
        /// Symbol whose entry failed to parse, or `*` for the whole body
        symbol: String,
        /// Description of the parse failure
        message: String,
    },

    /// Data validation failed (e.g. non-positive price).
    #[error("Validation failed: {message}")]
    ValidationFailed {
        /// Description of the validation failure
        message: String,
    },
}

impl MarketDataError {
    /// Returns the retry classification for this error.
    ///
    /// Only transport-level failures are retried. Parse and validation failures
    /// fail fast because the same response would be returned again.
    ///
    /// # Examples
    ///
    /// ```
    /// use pricecache_market_data::errors::{MarketDataError, RetryClass};
    ///
    /// let error = MarketDataError::Timeout { provider: "YAHOO".to_string() };
    /// assert_eq!(error.retry_class(), RetryClass::WithBackoff);
    ///
    /// let error = MarketDataError::SymbolNotFound("INVALID".to_string());
    /// assert_eq!(error.retry_class(), RetryClass::Never);
    /// ```
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout { .. } | Self::ConnectionFailed { .. } | Self::RateLimited { .. } => {
                RetryClass::WithBackoff
            }

            Self::SymbolNotFound(_)
            | Self::ProviderError { .. }
            | Self::ParseFailed { .. }
            | Self::ValidationFailed { .. } => RetryClass::Never,
        }
    }

    /// Returns true if the backoff wrapper should retry after this error.
    pub fn is_transient(&self) -> bool {
        self.retry_class() == RetryClass::WithBackoff
    }

    /// Maps a reqwest transport error onto the matching variant.
    pub fn from_transport(provider: &str, err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout {
                provider: provider.to_string(),
            }
        } else if err.is_connect() || err.is_request() {
            Self::ConnectionFailed {
                provider: provider.to_string(),
                message: err.to_string(),
            }
        } else {
            Self::ProviderError {
                provider: provider.to_string(),
                message: format!("Request failed: {}", err),
            }
        }
    }
}
