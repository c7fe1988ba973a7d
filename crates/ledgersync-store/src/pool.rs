//! SQLite connection pool and schema migrations
//!
//! File databases run in WAL mode so the daemon and the CLI can read while
//! the other writes. Migrations are applied in order on every open; the
//! `user_version` pragma records how far a database has been migrated.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::StoreError;

/// Ordered schema migrations, keyed by the `user_version` each one sets
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("migrations/0001_initial.sql")),
    (2, include_str!("migrations/0002_sync_lease.sql")),
];

/// Schema version of a fully migrated database
pub const SCHEMA_VERSION: i64 = 2;

const FILE_MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
    path: Option<PathBuf>,
}

impl DatabasePool {
    /// Opens the store at `db_path`, creating the file and its directory
    ///
    /// # Errors
    ///
    /// `StoreError::StorageUnavailable` when the location cannot be created
    /// or opened, `StoreError::MigrationFailed` when the schema cannot be
    /// brought up to date.
    pub async fn new(db_path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::StorageUnavailable(format!("{}: {}", parent.display(), e))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(FILE_MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("{}: {}", db_path.display(), e)))?;

        let store = Self {
            pool,
            path: Some(db_path.to_path_buf()),
        };
        store.migrate().await?;
        tracing::info!(path = %db_path.display(), "Opened offline store");
        Ok(store)
    }

    /// A private in-memory database
    ///
    /// Each SQLite memory database belongs to one connection, so the pool
    /// holds exactly one.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StoreError::StorageUnavailable(format!("in-memory database: {}", e)))?;

        let store = Self { pool, path: None };
        store.migrate().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// `None` for in-memory pools
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Current `PRAGMA user_version`
    pub async fn schema_version(&self) -> Result<i64, StoreError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version)
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        let current = self
            .schema_version()
            .await
            .map_err(|e| StoreError::MigrationFailed(e.to_string()))?;

        for (version, sql) in MIGRATIONS.iter().filter(|(v, _)| *v > current) {
            sqlx::raw_sql(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::MigrationFailed(format!("version {}: {}", version, e)))?;
            tracing::debug!(version, "Applied schema migration");
        }
        Ok(())
    }
}
