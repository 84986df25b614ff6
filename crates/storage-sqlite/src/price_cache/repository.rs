use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use diesel::connection::SimpleConnection;
use diesel::dsl::{max, min};
use diesel::prelude::*;
use diesel::result::Error as DieselError;
use log::{debug, info, warn};

use super::model::{format_timestamp, PriceCacheDB};
use crate::db::ConnectionPool;
use crate::errors::{IntoCore, StorageError};
use crate::schema::price_cache::dsl as price_cache_dsl;
use crate::utils::{chunk_for_sqlite, SQLITE_MAX_PARAMS_CHUNK};
use pricecache_core::prices::{
    CacheEntry, CacheStatistics, CachedPrice, PriceCacheStore, PriceUpdate,
};
use pricecache_core::Result;

/// Columns bound per row in a multi-row insert.
const COLUMNS_PER_ROW: usize = 5;

pub struct PriceCacheRepository {
    pool: Arc<ConnectionPool>,
}

impl PriceCacheRepository {
    pub fn new(pool: Arc<ConnectionPool>) -> Self {
        Self { pool }
    }

    /// Refreshes the query planner statistics.
    pub fn optimize(&self) -> Result<()> {
        let mut conn = self.pool.acquire()?;
        conn.batch_execute("ANALYZE; PRAGMA optimize;").into_core()?;
        info!("Price cache tables analyzed");
        Ok(())
    }
}

// =============================================================================
// PriceCacheStore Implementation
// =============================================================================

impl PriceCacheStore for PriceCacheRepository {
    // =========================================================================
    // Point lookups
    // =========================================================================

    fn get(&self, symbol: &str, max_age: Duration) -> Result<Option<CacheEntry>> {
        let mut conn = self.pool.acquire()?;
        let cutoff = format_timestamp(Utc::now() - max_age);

        let row = price_cache_dsl::price_cache
            .filter(price_cache_dsl::symbol.eq(symbol))
            .filter(price_cache_dsl::last_update.ge(cutoff))
            .select(PriceCacheDB::as_select())
            .first::<PriceCacheDB>(&mut *conn)
            .optional()
            .into_core()?;

        row.map(|r| CacheEntry::try_from(r).map_err(Into::into))
            .transpose()
    }

    fn get_any(&self, symbol: &str) -> Result<Option<CachedPrice>> {
        let mut conn = self.pool.acquire()?;

        let row = price_cache_dsl::price_cache
            .find(symbol)
            .select(PriceCacheDB::as_select())
            .first::<PriceCacheDB>(&mut *conn)
            .optional()
            .into_core()?;

        let now = Utc::now();
        row.map(|r| {
            CacheEntry::try_from(r)
                .map(|entry| entry.with_age_at(now))
                .map_err(Into::into)
        })
        .transpose()
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    fn upsert(&self, update: &PriceUpdate) -> Result<()> {
        let mut conn = self.pool.acquire()?;
        let row = PriceCacheDB::from_update(update, Utc::now());

        diesel::replace_into(price_cache_dsl::price_cache)
            .values(&row)
            .execute(&mut *conn)
            .map_err(StorageError::QueryFailed)?;
        Ok(())
    }

    fn upsert_batch(&self, updates: &[PriceUpdate]) -> Result<usize> {
        if updates.is_empty() {
            return Ok(0);
        }

        let now = Utc::now();
        let rows: Vec<PriceCacheDB> = updates
            .iter()
            .map(|u| PriceCacheDB::from_update(u, now))
            .collect();

        let mut conn = self.pool.acquire()?;
        let written = conn
            .transaction::<_, DieselError, _>(|tx| {
                let mut total = 0;
                for chunk in rows.chunks(SQLITE_MAX_PARAMS_CHUNK / COLUMNS_PER_ROW) {
                    total += diesel::replace_into(price_cache_dsl::price_cache)
                        .values(chunk)
                        .execute(tx)?;
                }
                Ok(total)
            })
            .into_core()?;

        debug!("Upserted {} price cache rows", written);
        Ok(written)
    }

    fn evict_stale(&self, keep_symbols: &[String], max_age: Duration) -> Result<usize> {
        let cutoff = format_timestamp(Utc::now() - max_age);
        let keep: HashSet<&str> = keep_symbols.iter().map(String::as_str).collect();

        let mut conn = self.pool.acquire()?;
        let deleted = conn
            .transaction::<_, DieselError, _>(|tx| {
                let candidates: Vec<String> = price_cache_dsl::price_cache
                    .filter(price_cache_dsl::last_update.lt(&cutoff))
                    .select(price_cache_dsl::symbol)
                    .load(tx)?;
                let doomed: Vec<String> = candidates
                    .into_iter()
                    .filter(|symbol| !keep.contains(symbol.as_str()))
                    .collect();

                let mut total = 0;
                for chunk in chunk_for_sqlite(&doomed) {
                    total += diesel::delete(
                        price_cache_dsl::price_cache.filter(price_cache_dsl::symbol.eq_any(chunk)),
                    )
                    .execute(tx)?;
                }
                Ok(total)
            })
            .into_core()?;

        if deleted > 0 {
            info!("Deleted {} price cache rows older than {}", deleted, cutoff);
        }
        Ok(deleted)
    }

    // =========================================================================
    // Bulk reads
    // =========================================================================

    fn read_bulk_with_age(&self, symbols: &[String]) -> Result<Vec<CachedPrice>> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.pool.acquire()?;
        let mut rows = Vec::with_capacity(symbols.len());
        for chunk in chunk_for_sqlite(symbols) {
            let found = price_cache_dsl::price_cache
                .filter(price_cache_dsl::symbol.eq_any(chunk))
                .select(PriceCacheDB::as_select())
                .load::<PriceCacheDB>(&mut *conn)
                .into_core()?;
            rows.extend(found);
        }
        drop(conn);

        let now = Utc::now();
        let cached = rows
            .into_iter()
            .filter_map(|row| match CacheEntry::try_from(row) {
                Ok(entry) => Some(entry.with_age_at(now)),
                Err(e) => {
                    // Treated as never cached; the next refresh overwrites it
                    warn!("Skipping unreadable price cache row: {}", e);
                    None
                }
            })
            .collect();
        Ok(cached)
    }

    fn statistics(&self) -> Result<CacheStatistics> {
        let now = Utc::now();
        let hour_ago = format_timestamp(now - Duration::hours(1));
        let day_ago = format_timestamp(now - Duration::hours(24));

        let mut conn = self.pool.acquire()?;

        let total_cached: i64 = price_cache_dsl::price_cache
            .count()
            .get_result(&mut *conn)
            .into_core()?;
        let fresh_within_1h: i64 = price_cache_dsl::price_cache
            .filter(price_cache_dsl::last_update.gt(&hour_ago))
            .count()
            .get_result(&mut *conn)
            .into_core()?;
        let fresh_within_24h: i64 = price_cache_dsl::price_cache
            .filter(price_cache_dsl::last_update.gt(&day_ago))
            .count()
            .get_result(&mut *conn)
            .into_core()?;
        let (oldest, newest): (Option<String>, Option<String>) = price_cache_dsl::price_cache
            .select((
                min(price_cache_dsl::last_update),
                max(price_cache_dsl::last_update),
            ))
            .get_result(&mut *conn)
            .into_core()?;

        let parse = |ts: Option<String>| {
            ts.and_then(|s| chrono::DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc))
        };

        Ok(CacheStatistics {
            total_cached,
            fresh_within_1h,
            fresh_within_24h,
            oldest_update: parse(oldest),
            newest_update: parse(newest),
        })
    }
}
