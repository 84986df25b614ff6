use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::prices::Currency;

/// Builds the provider symbol of an FX pair.
///
/// Returns format: "EURUSD=X"
pub fn pair_symbol(from: &Currency, to: &Currency) -> String {
    format!("{}{}=X", from.code(), to.code())
}

/// Answer of an FX-rate lookup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "rate", rename_all = "camelCase")]
pub enum FxRate {
    /// Same currency on both sides.
    Identity,
    /// Rate read from the price cache.
    Cached(Decimal),
    /// Configured default; the UI should mark values converted with it.
    Fallback(Decimal),
    /// Nothing cached and no default configured.
    Unavailable,
}

impl FxRate {
    /// The usable rate, if any.
    pub fn rate(&self) -> Option<Decimal> {
        match self {
            FxRate::Identity => Some(Decimal::ONE),
            FxRate::Cached(rate) | FxRate::Fallback(rate) => Some(*rate),
            FxRate::Unavailable => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, FxRate::Fallback(_))
    }
}

/// What to answer when no rate has been cached yet.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum FxFallbackPolicy {
    /// Surface the gap as [`FxRate::Unavailable`].
    #[default]
    Unavailable,
    /// Use hard-coded defaults, keyed by `(from, to)`.
    Defaults(HashMap<(Currency, Currency), Decimal>),
}

impl FxFallbackPolicy {
    pub fn defaults<I>(rates: I) -> Self
    where
        I: IntoIterator<Item = (Currency, Currency, Decimal)>,
    {
        FxFallbackPolicy::Defaults(
            rates
                .into_iter()
                .map(|(from, to, rate)| ((from, to), rate))
                .collect(),
        )
    }

    /// Resolves a pair with no cached rate.
    ///
    /// The inverse of a configured pair is used when only the other direction
    /// is known.
    pub fn resolve(&self, from: &Currency, to: &Currency) -> FxRate {
        let FxFallbackPolicy::Defaults(rates) = self else {
            return FxRate::Unavailable;
        };

        if let Some(rate) = rates.get(&(from.clone(), to.clone())) {
            return FxRate::Fallback(*rate);
        }
        match rates.get(&(to.clone(), from.clone())) {
            Some(rate) if !rate.is_zero() => FxRate::Fallback(Decimal::ONE / *rate),
            _ => FxRate::Unavailable,
        }
    }
}
