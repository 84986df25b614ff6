//! Domain models for cached prices.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_CURRENCY;

/// Quote currency of an instrument.
///
/// Stored and serialized as its ISO 4217 code. Unknown codes are kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Currency {
    #[default]
    Usd,
    Pln,
    Eur,
    Gbp,
    Chf,
    Other(String),
}

impl Currency {
    pub fn code(&self) -> &str {
        match self {
            Currency::Usd => "USD",
            Currency::Pln => "PLN",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
            Currency::Chf => "CHF",
            Currency::Other(code) => code,
        }
    }

    /// Maps a provider-reported code, falling back to USD when absent.
    pub fn from_provider(code: Option<&str>) -> Self {
        code.filter(|c| !c.trim().is_empty())
            .map(Currency::from)
            .unwrap_or_else(|| Currency::from(DEFAULT_CURRENCY))
    }
}

impl From<&str> for Currency {
    fn from(code: &str) -> Self {
        match code.trim().to_uppercase().as_str() {
            "USD" => Currency::Usd,
            "PLN" => Currency::Pln,
            "EUR" => Currency::Eur,
            "GBP" => Currency::Gbp,
            "CHF" => Currency::Chf,
            other => Currency::Other(other.to_string()),
        }
    }
}

impl From<String> for Currency {
    fn from(code: String) -> Self {
        Currency::from(code.as_str())
    }
}

impl From<Currency> for String {
    fn from(currency: Currency) -> Self {
        currency.code().to_string()
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Last known price of one symbol in the durable cache.
///
/// Unique by `symbol`; overwritten on every successful fetch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub symbol: String,
    pub price: Decimal,
    pub currency: Currency,
    pub display_name: Option<String>,
    pub last_update: DateTime<Utc>,
}

impl CacheEntry {
    /// Whole minutes elapsed since `last_update`, clamped at zero.
    pub fn age_minutes_at(&self, now: DateTime<Utc>) -> i64 {
        (now - self.last_update).num_minutes().max(0)
    }

    pub fn with_age_at(self, now: DateTime<Utc>) -> CachedPrice {
        let age_minutes = self.age_minutes_at(now);
        CachedPrice {
            entry: self,
            age_minutes,
        }
    }
}

/// A durable entry annotated with its age at read time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedPrice {
    #[serde(flatten)]
    pub entry: CacheEntry,
    pub age_minutes: i64,
}

/// Input of an upsert; `last_update` is always set by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceUpdate {
    pub symbol: String,
    pub price: Decimal,
    pub display_name: Option<String>,
    pub currency: Currency,
}

impl PriceUpdate {
    pub fn new(symbol: impl Into<String>, price: Decimal, currency: Currency) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            display_name: None,
            currency,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Row counts of the durable cache.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatistics {
    pub total_cached: i64,
    pub fresh_within_1h: i64,
    pub fresh_within_24h: i64,
    pub oldest_update: Option<DateTime<Utc>>,
    pub newest_update: Option<DateTime<Utc>>,
}

/// Combined diagnostics exposed to the UI.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// TTL cache hit rate in `[0, 1]`.
    pub hit_rate: f64,
    /// `"hits/total (rate%)"`.
    pub ttl_summary: String,
    pub total_cached: i64,
    pub fresh_within_1h: i64,
    pub fresh_within_24h: i64,
}

/// What a table cell shows for one symbol right now.
///
/// `price == None` means the symbol was never cached; the UI renders a
/// placeholder until the scheduled refresh lands.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayPrice {
    pub price: Option<Decimal>,
    pub age_minutes: Option<i64>,
    pub currency: Option<Currency>,
    pub display_name: Option<String>,
}

impl From<&CachedPrice> for DisplayPrice {
    fn from(cached: &CachedPrice) -> Self {
        Self {
            price: Some(cached.entry.price),
            age_minutes: Some(cached.age_minutes),
            currency: Some(cached.entry.currency.clone()),
            display_name: cached.entry.display_name.clone(),
        }
    }
}

/// Logical grouping of symbols refreshed together (e.g. one currency view).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RefreshScope(String);

impl RefreshScope {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The scope of one currency view, e.g. `"USD view"`.
    pub fn for_currency(currency: &Currency) -> Self {
        Self(format!("{} view", currency.code()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RefreshScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
