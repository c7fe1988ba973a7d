//! LedgerSync Store - Local persistence
//!
//! SQLite-based storage for:
//! - Offline copies of ERP entities (companies, customers, inventory, sales)
//! - The read-through cache of remote data
//! - The queue of mutations awaiting remote confirmation
//!
//! ## Architecture
//!
//! This crate implements the `ILocalStore` port from `ledgersync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteLocalStore`] - Full `ILocalStore` implementation
//! - [`StoreError`] - Error types for store operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use ledgersync_store::{DatabasePool, SqliteLocalStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/ledgersync/offline.db")).await?;
//! let store = SqliteLocalStore::new(pool.pool().clone());
//! // Use store as ILocalStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod store;

use ledgersync_core::domain::DomainError;

pub use pool::DatabasePool;
pub use store::SqliteLocalStore;

/// Errors that can occur during store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The database file or its directory could not be created or opened
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A record was rejected before it reached the database
    #[error("Validation failed: {0}")]
    Validation(#[from] DomainError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}
