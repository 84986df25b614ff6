//! Utility functions for SQLite storage operations.
//!
//! This module provides helpers for working with SQLite, including chunking
//! utilities to avoid parameter limits.

/// Maximum number of parameters for SQLite IN (...) queries.
///
/// SQLite has a compile-time limit on the number of parameters in a SQL statement,
/// typically around 999 (SQLITE_MAX_VARIABLE_NUMBER). To stay safely under this limit
/// and leave room for other parameters in the query, we use 500 as our chunk size.
///
/// Any query that uses `IN (...)` with a potentially large list of symbols should use
/// `chunk_for_sqlite` to split the list into manageable chunks.
pub const SQLITE_MAX_PARAMS_CHUNK: usize = 500;

/// Chunk a slice into smaller slices for batch SQLite queries.
///
/// This function splits a slice into chunks of size `SQLITE_MAX_PARAMS_CHUNK` (500),
/// which can be used to safely execute multiple queries with `IN (...)` clauses
/// without exceeding SQLite's parameter limits.
///
/// # Example
///
/// ```ignore
/// let symbols: Vec<String> = watch_list_symbols(); // Could be > 999 items
///
/// let mut rows = Vec::new();
/// for chunk in chunk_for_sqlite(&symbols) {
///     rows.extend(price_cache.filter(symbol.eq_any(chunk)).load::<PriceCacheDB>(conn)?);
/// }
/// ```
pub fn chunk_for_sqlite<T>(items: &[T]) -> impl Iterator<Item = &[T]> {
    items.chunks(SQLITE_MAX_PARAMS_CHUNK)
}
