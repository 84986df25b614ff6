//! Yahoo Finance batch price source.
//!
//! Prices every requested symbol with a single call to the grouped
//! `/v7/finance/quote?symbols=A,B,C` endpoint. The response may be partial;
//! each entry is validated independently.

mod models;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::{header, Client};
use rust_decimal::Decimal;

use crate::errors::MarketDataError;
use crate::models::{BatchQuote, BatchQuoteResult};
use crate::provider::BatchPriceSource;

use models::{YahooQuoteEntry, YahooQuoteResponse};

const PROVIDER_ID: &str = "YAHOO";
pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Batch price source backed by the Yahoo Finance quote endpoint.
pub struct YahooBatchSource {
    client: Client,
    base_url: String,
}

impl YahooBatchSource {
    /// Create a source with the default endpoint and a 10s request timeout.
    pub fn new() -> Self {
        Self::with_options(DEFAULT_BASE_URL, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Create a source against a custom base URL (mirrors, test servers).
    pub fn with_options(base_url: &str, request_timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(request_timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for YahooBatchSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BatchPriceSource for YahooBatchSource {
    fn id(&self) -> &'static str {
        PROVIDER_ID
    }

    async fn batch_quote(&self, symbols: &[String]) -> Result<BatchQuoteResult, MarketDataError> {
        if symbols.is_empty() {
            return Ok(BatchQuoteResult::new());
        }

        let url = format!("{}/v7/finance/quote", self.base_url);
        let joined = symbols.join(",");
        debug!("Yahoo batch request for {} symbols", symbols.len());

        let response = self
            .client
            .get(&url)
            .query(&[("symbols", joined.as_str())])
            .header(header::USER_AGENT, USER_AGENT)
            .send()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited {
                provider: PROVIDER_ID.to_string(),
            });
        }
        if status.is_server_error() {
            // Gateway errors behave like a dropped connection
            return Err(MarketDataError::ConnectionFailed {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::ProviderError {
                provider: PROVIDER_ID.to_string(),
                message: format!("HTTP {} - {}", status, body),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| MarketDataError::from_transport(PROVIDER_ID, &e))?;

        parse_batch_response(&body, symbols)
    }
}

/// Parses a grouped quote body into per-symbol results.
///
/// An unreadable envelope fails the whole call. Inside a readable envelope every
/// entry stands alone: a malformed or non-positive entry becomes an `Err` for
/// that symbol only. Requested symbols missing from the body are left out.
pub(crate) fn parse_batch_response(
    body: &str,
    requested: &[String],
) -> Result<BatchQuoteResult, MarketDataError> {
    let response: YahooQuoteResponse =
        serde_json::from_str(body).map_err(|e| MarketDataError::ParseFailed {
            symbol: "*".to_string(),
            message: e.to_string(),
        })?;

    if let Some(error) = response.quote_response.error.filter(|e| !e.is_null()) {
        return Err(MarketDataError::ProviderError {
            provider: PROVIDER_ID.to_string(),
            message: error.to_string(),
        });
    }

    // Yahoo echoes symbols upper-cased; map back to the caller's spelling
    let by_upper: HashMap<String, &String> =
        requested.iter().map(|s| (s.to_uppercase(), s)).collect();

    let mut results = BatchQuoteResult::new();
    for raw in response.quote_response.result {
        let raw_symbol = raw
            .get("symbol")
            .and_then(|v| v.as_str())
            .map(str::to_uppercase);
        let Some(requested_symbol) = raw_symbol.as_ref().and_then(|s| by_upper.get(s)) else {
            debug!("Ignoring unrequested or unnamed entry in Yahoo response");
            continue;
        };
        let symbol = (*requested_symbol).clone();

        let outcome = serde_json::from_value::<YahooQuoteEntry>(raw)
            .map_err(|e| MarketDataError::ParseFailed {
                symbol: symbol.clone(),
                message: e.to_string(),
            })
            .and_then(|entry| entry_to_quote(&symbol, entry));

        if let Err(e) = &outcome {
            warn!("Yahoo entry for {} rejected: {}", symbol, e);
        }
        results.insert(symbol, outcome);
    }

    Ok(results)
}

fn entry_to_quote(symbol: &str, entry: YahooQuoteEntry) -> Result<BatchQuote, MarketDataError> {
    let raw_price = entry
        .regular_market_price
        .ok_or_else(|| MarketDataError::ParseFailed {
            symbol: symbol.to_string(),
            message: "missing regularMarketPrice".to_string(),
        })?;

    let price = Decimal::try_from(raw_price).map_err(|e| MarketDataError::ParseFailed {
        symbol: symbol.to_string(),
        message: e.to_string(),
    })?;

    if price <= Decimal::ZERO {
        return Err(MarketDataError::ValidationFailed {
            message: format!("{}: price must be positive, got {}", symbol, price),
        });
    }

    Ok(BatchQuote {
        symbol: symbol.to_string(),
        price,
        display_name: entry.display_name(),
        currency: entry.currency,
    })
}
