//! Data types exchanged with batch price sources.

mod quote;

pub use quote::{BatchQuote, BatchQuoteResult};
