//! Local store port (driven/secondary port)
//!
//! This module defines the interface for durable, asynchronous,
//! collection-partitioned persistence. It also owns the sync queue's
//! storage, since queue rows need an autoincrement key.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, etc.) and don't need domain-level classification.
//!   Adapters surface a typed `StoreError` that callers may downcast.
//! - Missing records are `Ok(None)` / no-ops, never errors.
//! - Writes take references so the caller keeps ownership.
//! - Several processes may share one store (daemon and CLI). The sync lease
//!   lets at most one of them replay the queue at a time.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{
    newtypes::{OperationId, RecordId},
    record::{Collection, Record},
    operation::{OperationRequest, SyncOperation},
};

/// Read-only storage usage report for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEstimate {
    /// Bytes currently used by the store
    pub used_bytes: u64,
    /// Configured quota, if any
    pub quota_bytes: Option<u64>,
}

impl StorageEstimate {
    /// Bytes still available under the quota
    pub fn available_bytes(&self) -> Option<u64> {
        self.quota_bytes.map(|q| q.saturating_sub(self.used_bytes))
    }

    /// Fraction of the quota in use (0.0 - 1.0+), if a quota is set
    pub fn usage_ratio(&self) -> Option<f64> {
        match self.quota_bytes {
            Some(0) | None => None,
            Some(q) => Some(self.used_bytes as f64 / q as f64),
        }
    }
}

/// Port trait for the local persistent store
///
/// ## Implementation Notes
///
/// - `put` writes all records of one call in a single transaction and must
///   reject records whose payload does not belong to `collection`.
/// - `list_operations` returns rows in insertion order (autoincrement key).
/// - `reconcile_operations` must apply removals and updates atomically and
///   must not touch rows it was not given, so operations enqueued while a
///   sync pass was running survive the pass.
#[async_trait::async_trait]
pub trait ILocalStore: Send + Sync {
    // --- Record operations ---

    /// Upserts records into a collection (last write wins)
    async fn put(&self, collection: Collection, records: &[Record]) -> anyhow::Result<()>;

    /// Retrieves one record by ID
    async fn get(&self, collection: Collection, id: &RecordId) -> anyhow::Result<Option<Record>>;

    /// Retrieves every record in a collection, ordered by ID
    async fn get_all(&self, collection: Collection) -> anyhow::Result<Vec<Record>>;

    /// Deletes a record; deleting a missing ID is a no-op
    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()>;

    /// Removes every record in a collection
    async fn clear(&self, collection: Collection) -> anyhow::Result<()>;

    // --- Sync queue operations ---

    /// Persists a new operation and returns it with its assigned ID
    async fn append_operation(&self, request: &OperationRequest) -> anyhow::Result<SyncOperation>;

    /// Lists all queued operations in insertion order
    async fn list_operations(&self) -> anyhow::Result<Vec<SyncOperation>>;

    /// Atomically deletes `removed` and rewrites `updated` rows
    async fn reconcile_operations(
        &self,
        removed: &[OperationId],
        updated: &[SyncOperation],
    ) -> anyhow::Result<()>;

    /// Removes every queued operation
    async fn clear_operations(&self) -> anyhow::Result<()>;

    // --- Sync lease ---

    /// Claims the store-wide sync lease for `holder` until `ttl` from now
    ///
    /// Returns false while another holder's lease has not expired. Claiming
    /// again as the current holder extends the lease.
    async fn try_acquire_sync_lease(&self, holder: &str, ttl: Duration) -> anyhow::Result<bool>;

    /// Gives the lease up; a no-op unless `holder` holds it
    async fn release_sync_lease(&self, holder: &str) -> anyhow::Result<()>;

    // --- Diagnostics ---

    /// Reports current storage usage
    async fn storage_estimate(&self) -> anyhow::Result<StorageEstimate>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_estimate_available() {
        let est = StorageEstimate {
            used_bytes: 300,
            quota_bytes: Some(1000),
        };
        assert_eq!(est.available_bytes(), Some(700));
        assert_eq!(est.usage_ratio(), Some(0.3));

        let unbounded = StorageEstimate {
            used_bytes: 300,
            quota_bytes: None,
        };
        assert_eq!(unbounded.available_bytes(), None);
        assert_eq!(unbounded.usage_ratio(), None);
    }

    #[test]
    fn test_storage_estimate_over_quota_saturates() {
        let est = StorageEstimate {
            used_bytes: 2000,
            quota_bytes: Some(1000),
        };
        assert_eq!(est.available_bytes(), Some(0));
    }
}
