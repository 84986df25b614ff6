//! Quote types returned by a batch price source.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::MarketDataError;

/// Latest price for one symbol as reported by a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchQuote {
    /// Symbol exactly as it was requested
    pub symbol: String,
    /// Last traded price
    pub price: Decimal,
    /// ISO 4217 code reported by the provider, if any
    pub currency: Option<String>,
    /// Human readable instrument name, if any
    pub display_name: Option<String>,
}

impl BatchQuote {
    pub fn new(symbol: impl Into<String>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            currency: None,
            display_name: None,
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Per-symbol outcome of one grouped request.
///
/// Symbols that were requested but are missing from the map are treated
/// as failed by the caller.
pub type BatchQuoteResult = HashMap<String, Result<BatchQuote, MarketDataError>>;
