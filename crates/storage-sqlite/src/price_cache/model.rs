//! Database model for the durable price cache.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use diesel::prelude::*;
use rust_decimal::Decimal;

use crate::errors::StorageError;
use pricecache_core::prices::{CacheEntry, Currency, PriceUpdate};

/// Formats a timestamp the way `last_update` is stored.
///
/// Fixed width (microseconds, `Z` suffix), so text order is time order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Database model for one price cache row
#[derive(Queryable, Selectable, Insertable, Debug, Clone, PartialEq)]
#[diesel(table_name = crate::schema::price_cache)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct PriceCacheDB {
    pub symbol: String,
    pub last_price: String,
    pub last_update: String,
    pub display_name: Option<String>,
    pub currency: String,
}

impl PriceCacheDB {
    pub fn from_update(update: &PriceUpdate, now: DateTime<Utc>) -> Self {
        Self {
            symbol: update.symbol.clone(),
            last_price: update.price.to_string(),
            last_update: format_timestamp(now),
            display_name: update.display_name.clone(),
            currency: update.currency.code().to_string(),
        }
    }
}

impl TryFrom<PriceCacheDB> for CacheEntry {
    type Error = StorageError;

    fn try_from(row: PriceCacheDB) -> Result<Self, Self::Error> {
        let price = Decimal::from_str(&row.last_price).map_err(|e| {
            StorageError::CorruptRow(format!(
                "{}: invalid price '{}': {}",
                row.symbol, row.last_price, e
            ))
        })?;
        let last_update = DateTime::parse_from_rfc3339(&row.last_update)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                StorageError::CorruptRow(format!(
                    "{}: invalid timestamp '{}': {}",
                    row.symbol, row.last_update, e
                ))
            })?;

        Ok(CacheEntry {
            symbol: row.symbol,
            price,
            currency: Currency::from(row.currency),
            display_name: row.display_name,
            last_update,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn test_timestamp_format_is_fixed_width() {
        let whole = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        assert_eq!(format_timestamp(whole), "2025-03-01T09:30:00.000000Z");
        let later = whole + chrono::Duration::microseconds(1);
        assert!(format_timestamp(later) > format_timestamp(whole));
    }

    #[test]
    fn test_row_round_trip_keeps_exact_price() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 30, 0).unwrap();
        let update = PriceUpdate::new("CDR.WA", dec!(112.40), Currency::Pln)
            .with_display_name("CD Projekt");
        let entry = CacheEntry::try_from(PriceCacheDB::from_update(&update, now)).unwrap();

        assert_eq!(entry.price.to_string(), "112.40");
        assert_eq!(entry.currency, Currency::Pln);
        assert_eq!(entry.display_name.as_deref(), Some("CD Projekt"));
        assert_eq!(entry.last_update, now);
    }

    #[test]
    fn test_corrupt_row_is_reported() {
        let row = PriceCacheDB {
            symbol: "AAPL".to_string(),
            last_price: "n/a".to_string(),
            last_update: "2025-03-01T09:30:00.000000Z".to_string(),
            display_name: None,
            currency: "USD".to_string(),
        };
        assert!(matches!(
            CacheEntry::try_from(row),
            Err(StorageError::CorruptRow(_))
        ));
    }
}
