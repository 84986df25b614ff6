//! Yahoo Finance grouped quote response models.
//!
//! The envelope is parsed strictly. Individual `result` entries are kept as raw
//! JSON so that one malformed entry can be rejected on its own.

use serde::Deserialize;

/// Main response wrapper for the v7 quote API
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteResponse {
    pub quote_response: YahooQuoteEnvelope,
}

/// Quote response container
#[derive(Debug, Deserialize)]
pub struct YahooQuoteEnvelope {
    #[serde(default)]
    pub result: Vec<serde_json::Value>,
    pub error: Option<serde_json::Value>,
}

/// One entry of the `result` array
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YahooQuoteEntry {
    pub symbol: String,
    pub regular_market_price: Option<f64>,
    pub currency: Option<String>,
    pub short_name: Option<String>,
    pub long_name: Option<String>,
}

impl YahooQuoteEntry {
    /// Prefer the long name, fall back to the short one.
    pub fn display_name(&self) -> Option<String> {
        self.long_name
            .clone()
            .or_else(|| self.short_name.clone())
            .filter(|name| !name.trim().is_empty())
    }
}
