//! Price cache events.
//!
//! Background refreshes never touch consumer-owned state. They emit a
//! [`PriceCacheEvent`] through a [`PriceEventSink`]; the interactive thread
//! drains the matching receiver on its own schedule.

mod price_event;
mod sink;

pub use price_event::*;
pub use sink::*;
