//! Batch price source abstraction and implementations.
//!
//! This module contains:
//! - The [`BatchPriceSource`] trait the fetcher talks to
//! - [`yahoo::YahooBatchSource`], an HTTP source using the grouped quote endpoint
//!
//! The wire format stays inside the provider module. Callers only see
//! [`BatchQuoteResult`](crate::models::BatchQuoteResult): one entry per symbol,
//! each an independent success or failure.

mod traits;

pub mod yahoo;

pub use traits::BatchPriceSource;
