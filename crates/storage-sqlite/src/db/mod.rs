//! Database setup: path preparation, the connection pool and migrations.

use std::fs;
use std::path::Path;

use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use log::{error, info};

use pricecache_core::errors::{DatabaseError, Error, Result};

pub mod pool;

pub use pool::{ConnectionPool, DbConnection, DbPool, PoolStats, PooledHandle};

const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

/// Ensures the directory holding `db_path` exists and returns the path.
pub fn init(db_path: &str) -> Result<String> {
    if let Some(db_dir) = Path::new(db_path).parent() {
        if !db_dir.as_os_str().is_empty() && !db_dir.exists() {
            fs::create_dir_all(db_dir).map_err(|e| {
                error!("Failed to create database directory: {}", e);
                Error::Database(DatabaseError::ConnectionFailed(e.to_string()))
            })?;
        }
    }
    Ok(db_path.to_string())
}

pub fn run_migrations(pool: &ConnectionPool) -> Result<()> {
    info!("Running database migrations");
    let mut connection = pool.acquire()?;

    let result = connection.run_pending_migrations(MIGRATIONS).map_err(|e| {
        error!("Database migration failed: {}", e);
        Error::Database(DatabaseError::MigrationFailed(e.to_string()))
    })?;

    if result.is_empty() {
        info!("No pending migrations to apply.");
    } else {
        info!("Applied the following migrations:");
        for migration_version in &result {
            info!("  - {}", migration_version);
        }
    }

    Ok(())
}
