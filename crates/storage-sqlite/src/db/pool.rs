//! Bounded, pre-warmed SQLite connection pool with overflow fallback.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use diesel::connection::{Connection, SimpleConnection};
use diesel::r2d2::{self, ConnectionManager, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use log::{debug, info, warn};

use crate::errors::IntoCore;
use pricecache_core::errors::{DatabaseError, Result};

pub type DbPool = Pool<ConnectionManager<SqliteConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<SqliteConnection>>;

/// Switches the file to WAL before any pooled connection exists.
const JOURNAL_PRAGMAS: &str = "
    PRAGMA busy_timeout = 30000;
    PRAGMA journal_mode = WAL;
";

/// Applied once to every connection when it is opened.
///
/// `busy_timeout` comes first so the statements after it wait on a locked
/// file instead of failing with SQLITE_BUSY.
const CONNECTION_PRAGMAS: &str = "
    PRAGMA busy_timeout = 30000;
    PRAGMA journal_mode = WAL;
    PRAGMA synchronous = NORMAL;
    PRAGMA cache_size = -64000;
    PRAGMA temp_store = MEMORY;
    PRAGMA foreign_keys = ON;
";

#[derive(Debug)]
struct ConnectionCustomizer;

impl r2d2::CustomizeConnection<SqliteConnection, r2d2::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), r2d2::Error> {
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(r2d2::Error::QueryError)
    }
}

#[derive(Debug, Default)]
struct PoolCounters {
    outstanding: AtomicUsize,
    peak_outstanding: AtomicUsize,
    overflow_opened: AtomicUsize,
}

/// Snapshot of pool usage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured number of pooled handles.
    pub size: u32,
    /// Pooled handles currently leased.
    pub outstanding: usize,
    /// Highest `outstanding` observed since the pool was opened.
    pub peak_outstanding: usize,
    /// Overflow handles opened because the pool was exhausted.
    pub overflow_opened: usize,
    /// Pooled handles sitting idle.
    pub idle: u32,
    pub closed: bool,
}

/// Releases the pooled slot in the counters.
///
/// Declared before the connection inside [`PooledHandle::Pooled`] so the
/// counter drops before the connection goes back to the pool.
#[derive(Debug)]
pub struct Lease {
    counters: Arc<PoolCounters>,
}

impl Drop for Lease {
    fn drop(&mut self) {
        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A leased connection.
///
/// Dropping it releases the handle: pooled connections go back to the pool,
/// overflow connections are closed.
pub enum PooledHandle {
    Pooled(Lease, DbConnection),
    Overflow(SqliteConnection),
}

impl PooledHandle {
    pub fn is_overflow(&self) -> bool {
        matches!(self, PooledHandle::Overflow(_))
    }
}

impl Deref for PooledHandle {
    type Target = SqliteConnection;

    fn deref(&self) -> &SqliteConnection {
        match self {
            PooledHandle::Pooled(_, conn) => &**conn,
            PooledHandle::Overflow(conn) => conn,
        }
    }
}

impl DerefMut for PooledHandle {
    fn deref_mut(&mut self) -> &mut SqliteConnection {
        match self {
            PooledHandle::Pooled(_, conn) => &mut **conn,
            PooledHandle::Overflow(conn) => conn,
        }
    }
}

/// Fixed-size pool of SQLite connections.
///
/// All handles are opened up front. `acquire` waits up to the acquire timeout
/// for a pooled handle and then falls back to a one-off overflow connection,
/// so callers always make progress. After [`close_all`](Self::close_all)
/// every acquisition fails with [`DatabaseError::PoolClosed`].
pub struct ConnectionPool {
    database_url: String,
    size: u32,
    acquire_timeout: Duration,
    pool: RwLock<Option<DbPool>>,
    counters: Arc<PoolCounters>,
}

impl ConnectionPool {
    /// Opens and pre-warms `size` connections.
    ///
    /// Fails if any of them cannot be opened.
    pub fn open(database_url: &str, size: u32, acquire_timeout: Duration) -> Result<Self> {
        {
            let mut conn = SqliteConnection::establish(database_url).into_core()?;
            conn.batch_execute(JOURNAL_PRAGMAS).into_core()?;
        }

        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(size)
            .min_idle(Some(size))
            .connection_timeout(acquire_timeout)
            .connection_customizer(Box::new(ConnectionCustomizer))
            .build(manager)
            .into_core()?;

        info!(
            "Opened connection pool for {} ({} connections)",
            database_url, size
        );

        Ok(Self {
            database_url: database_url.to_string(),
            size,
            acquire_timeout,
            pool: RwLock::new(Some(pool)),
            counters: Arc::new(PoolCounters::default()),
        })
    }

    fn read_pool(&self) -> RwLockReadGuard<'_, Option<DbPool>> {
        self.pool.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_pool(&self) -> RwLockWriteGuard<'_, Option<DbPool>> {
        self.pool.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Leases a connection, blocking up to the acquire timeout.
    pub fn acquire(&self) -> Result<PooledHandle> {
        // r2d2 pools are cheap handles; clone so the lock is not held while waiting
        let pool = match self.read_pool().as_ref() {
            Some(pool) => pool.clone(),
            None => return Err(DatabaseError::PoolClosed.into()),
        };

        match pool.get_timeout(self.acquire_timeout) {
            Ok(conn) => {
                let now = self.counters.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                self.counters
                    .peak_outstanding
                    .fetch_max(now, Ordering::SeqCst);
                Ok(PooledHandle::Pooled(
                    Lease {
                        counters: self.counters.clone(),
                    },
                    conn,
                ))
            }
            Err(e) => {
                warn!(
                    "Connection pool exhausted after {:?} ({}), opening overflow connection",
                    self.acquire_timeout, e
                );
                let conn = self.open_overflow()?;
                self.counters.overflow_opened.fetch_add(1, Ordering::SeqCst);
                Ok(PooledHandle::Overflow(conn))
            }
        }
    }

    fn open_overflow(&self) -> Result<SqliteConnection> {
        let mut conn = SqliteConnection::establish(&self.database_url).into_core()?;
        conn.batch_execute(CONNECTION_PRAGMAS)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;
        Ok(conn)
    }

    /// Closes the pool.
    ///
    /// Idle connections are closed immediately; leased ones are closed when
    /// their holder drops them.
    pub fn close_all(&self) {
        if self.write_pool().take().is_some() {
            info!("Connection pool closed");
        } else {
            debug!("Connection pool already closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.read_pool().is_none()
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn stats(&self) -> PoolStats {
        let idle = self
            .read_pool()
            .as_ref()
            .map(|pool| pool.state().idle_connections)
            .unwrap_or(0);
        PoolStats {
            size: self.size,
            outstanding: self.counters.outstanding.load(Ordering::SeqCst),
            peak_outstanding: self.counters.peak_outstanding.load(Ordering::SeqCst),
            overflow_opened: self.counters.overflow_opened.load(Ordering::SeqCst),
            idle,
            closed: self.is_closed(),
        }
    }
}
