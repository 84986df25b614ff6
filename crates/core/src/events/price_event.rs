//! Price cache event types.

use serde::{Deserialize, Serialize};

use crate::prices::RefreshScope;

/// Events emitted when a background refresh finishes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PriceCacheEvent {
    /// A refresh run finished and the durable cache holds new data.
    ///
    /// `failed` symbols kept their previous cached value.
    PricesUpdated {
        scope: RefreshScope,
        updated: Vec<String>,
        failed: Vec<String>,
    },

    /// A refresh run finished without writing anything.
    RefreshFailed { scope: RefreshScope, message: String },
}

impl PriceCacheEvent {
    /// Creates a PricesUpdated event.
    pub fn prices_updated(scope: RefreshScope, updated: Vec<String>, failed: Vec<String>) -> Self {
        Self::PricesUpdated {
            scope,
            updated,
            failed,
        }
    }

    /// Creates a RefreshFailed event.
    pub fn refresh_failed(scope: RefreshScope, message: impl Into<String>) -> Self {
        Self::RefreshFailed {
            scope,
            message: message.into(),
        }
    }

    pub fn scope(&self) -> &RefreshScope {
        match self {
            Self::PricesUpdated { scope, .. } | Self::RefreshFailed { scope, .. } => scope,
        }
    }
}
