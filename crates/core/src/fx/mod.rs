//! FX (Foreign Exchange) rates read from the price cache.

mod fx_model;

pub use fx_model::{pair_symbol, FxFallbackPolicy, FxRate};
