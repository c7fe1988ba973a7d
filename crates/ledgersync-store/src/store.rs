//! SQLite implementation of ILocalStore
//!
//! This module provides the concrete SQLite-based implementation of the
//! local store port defined in ledgersync-core. It handles all domain
//! type serialization/deserialization and SQL query construction.
//!
//! ## Type Mapping
//!
//! | Domain Type         | SQL Type | Strategy                    |
//! |---------------------|----------|-----------------------------|
//! | Collection          | TEXT     | `.name()` / `FromStr`       |
//! | RecordId            | TEXT     | `.as_str()` / `RecordId::new()` |
//! | OperationId         | INTEGER  | `AUTOINCREMENT` key         |
//! | EntityKind          | TEXT     | `.name()` / `FromStr`       |
//! | OperationStatus     | TEXT     | `.as_str()` / `FromStr`     |
//! | DateTime<Utc>       | TEXT     | ISO 8601 via `to_rfc3339()` / `DateTime::parse_from_rfc3339()` |
//! | RecordPayload       | TEXT     | serde_json serialization    |
//! | OperationKind       | TEXT     | serde_json serialization    |
//! | FailureInfo         | TEXT     | serde_json serialization    |
//! | Lease expiry        | INTEGER  | Unix milliseconds           |

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ledgersync_core::domain::{
    Collection, DomainError, EntityKind, OperationId, OperationKind, OperationRequest,
    OperationStatus, Record, RecordId, RecordPayload, SyncOperation,
};
use ledgersync_core::ports::{ILocalStore, StorageEstimate};

use crate::StoreError;

/// SQLite-based implementation of the local store port
///
/// Records of every collection share one table keyed by
/// `(collection, id)`; queued operations live in `sync_queue`.
pub struct SqliteLocalStore {
    pool: SqlitePool,
    quota_bytes: Option<u64>,
}

impl SqliteLocalStore {
    /// Creates a new store over the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            quota_bytes: None,
        }
    }

    /// Sets the quota reported by [`ILocalStore::storage_estimate`]
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes;
        self
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            StoreError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, StoreError> {
    Ok(serde_json::to_string(value)?)
}

/// Collections that live in the `records` table
fn ensure_record_collection(collection: Collection) -> Result<(), StoreError> {
    if collection == Collection::SyncQueue {
        return Err(StoreError::Validation(DomainError::ValidationFailed(
            "sync_queue is only accessible through the queue operations".to_string(),
        )));
    }
    Ok(())
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn record_from_row(row: &SqliteRow) -> Result<Record, StoreError> {
    let id_str: String = row.get("id");
    let payload_str: String = row.get("payload");

    let id = RecordId::new(id_str).map_err(|e| {
        StoreError::SerializationError(format!("Corrupt record id in store: {}", e))
    })?;
    let payload: RecordPayload = serde_json::from_str(&payload_str)?;

    Ok(Record::new(id, payload))
}

fn operation_from_row(row: &SqliteRow) -> Result<SyncOperation, StoreError> {
    let id: i64 = row.get("id");
    let entity_str: String = row.get("entity");
    let endpoint: String = row.get("endpoint");
    let operation_str: String = row.get("operation");
    let enqueued_at_str: String = row.get("enqueued_at");
    let retry_count: i64 = row.get("retry_count");
    let status_str: String = row.get("status");
    let last_error_str: Option<String> = row.get("last_error");
    let next_attempt_at_str: Option<String> = row.get("next_attempt_at");

    let entity: EntityKind = entity_str
        .parse()
        .map_err(|e| StoreError::SerializationError(format!("Corrupt entity: {}", e)))?;
    let kind: OperationKind = serde_json::from_str(&operation_str)?;
    let status: OperationStatus = status_str
        .parse()
        .map_err(|e| StoreError::SerializationError(format!("Corrupt status: {}", e)))?;
    let last_error = match last_error_str {
        Some(s) => Some(serde_json::from_str(&s)?),
        None => None,
    };

    Ok(SyncOperation {
        id: OperationId::new(id),
        entity,
        endpoint,
        kind,
        enqueued_at: parse_datetime(&enqueued_at_str)?,
        retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
        status,
        last_error,
        next_attempt_at: parse_optional_datetime(next_attempt_at_str)?,
    })
}

// ============================================================================
// ILocalStore implementation
// ============================================================================

#[async_trait::async_trait]
impl ILocalStore for SqliteLocalStore {
    // --- Record operations ---

    async fn put(&self, collection: Collection, records: &[Record]) -> anyhow::Result<()> {
        ensure_record_collection(collection)?;
        for record in records {
            record
                .ensure_collection(collection)
                .map_err(StoreError::Validation)?;
        }
        if records.is_empty() {
            return Ok(());
        }

        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        for record in records {
            let payload = to_json(&record.payload)?;
            sqlx::query(
                "INSERT OR REPLACE INTO records (collection, id, payload, updated_at) \
                 VALUES (?, ?, ?, ?)",
            )
            .bind(collection.name())
            .bind(record.id.as_str())
            .bind(&payload)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }
        tx.commit().await.map_err(StoreError::from)?;

        tracing::trace!(%collection, count = records.len(), "Stored records");
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> anyhow::Result<Option<Record>> {
        ensure_record_collection(collection)?;
        let row = sqlx::query("SELECT id, payload FROM records WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::from)?;

        match row {
            Some(ref r) => Ok(Some(record_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn get_all(&self, collection: Collection) -> anyhow::Result<Vec<Record>> {
        ensure_record_collection(collection)?;
        let rows = sqlx::query("SELECT id, payload FROM records WHERE collection = ? ORDER BY id")
            .bind(collection.name())
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)?;

        let records = rows
            .iter()
            .map(record_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> anyhow::Result<()> {
        ensure_record_collection(collection)?;
        sqlx::query("DELETE FROM records WHERE collection = ? AND id = ?")
            .bind(collection.name())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        tracing::trace!(%collection, id = %id, "Deleted record");
        Ok(())
    }

    async fn clear(&self, collection: Collection) -> anyhow::Result<()> {
        if collection == Collection::SyncQueue {
            return self.clear_operations().await;
        }
        let result = sqlx::query("DELETE FROM records WHERE collection = ?")
            .bind(collection.name())
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        tracing::debug!(%collection, removed = result.rows_affected(), "Cleared collection");
        Ok(())
    }

    // --- Sync queue operations ---

    async fn append_operation(&self, request: &OperationRequest) -> anyhow::Result<SyncOperation> {
        request.validate().map_err(StoreError::Validation)?;

        let enqueued_at = Utc::now();
        let operation = to_json(&request.kind)?;
        let result = sqlx::query(
            "INSERT INTO sync_queue (entity, endpoint, operation, enqueued_at, retry_count, status) \
             VALUES (?, ?, ?, ?, 0, ?)",
        )
        .bind(request.entity.name())
        .bind(&request.endpoint)
        .bind(&operation)
        .bind(enqueued_at.to_rfc3339())
        .bind(OperationStatus::Pending.as_str())
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let id = OperationId::new(result.last_insert_rowid());
        tracing::debug!(
            operation_id = %id,
            entity = %request.entity,
            op = request.kind.name(),
            "Appended operation to sync queue"
        );

        Ok(SyncOperation::from_request(id, request.clone(), enqueued_at))
    }

    async fn list_operations(&self) -> anyhow::Result<Vec<SyncOperation>> {
        let rows = sqlx::query(
            "SELECT id, entity, endpoint, operation, enqueued_at, retry_count, status, \
                    last_error, next_attempt_at \
             FROM sync_queue ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let operations = rows
            .iter()
            .map(operation_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(operations)
    }

    async fn reconcile_operations(
        &self,
        removed: &[OperationId],
        updated: &[SyncOperation],
    ) -> anyhow::Result<()> {
        if removed.is_empty() && updated.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        for id in removed {
            sqlx::query("DELETE FROM sync_queue WHERE id = ?")
                .bind(id.get())
                .execute(&mut *tx)
                .await
                .map_err(StoreError::from)?;
        }

        // UPDATE only: a row cleared while the pass ran stays cleared.
        for op in updated {
            let last_error = match &op.last_error {
                Some(e) => Some(to_json(e)?),
                None => None,
            };
            sqlx::query(
                "UPDATE sync_queue SET retry_count = ?, status = ?, last_error = ?, \
                 next_attempt_at = ? WHERE id = ?",
            )
            .bind(i64::from(op.retry_count))
            .bind(op.status.as_str())
            .bind(&last_error)
            .bind(op.next_attempt_at.map(|dt| dt.to_rfc3339()))
            .bind(op.id.get())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }

        tx.commit().await.map_err(StoreError::from)?;

        tracing::debug!(
            removed = removed.len(),
            updated = updated.len(),
            "Reconciled sync queue"
        );
        Ok(())
    }

    async fn clear_operations(&self) -> anyhow::Result<()> {
        let result = sqlx::query("DELETE FROM sync_queue")
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;

        tracing::info!(removed = result.rows_affected(), "Cleared sync queue");
        Ok(())
    }

    // --- Sync lease ---

    async fn try_acquire_sync_lease(&self, holder: &str, ttl: Duration) -> anyhow::Result<bool> {
        let now = Utc::now().timestamp_millis();
        let expires_at = now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX));

        // The upsert only overwrites an expired lease or our own.
        let result = sqlx::query(
            "INSERT INTO sync_lease (id, holder, expires_at) VALUES (1, ?, ?) \
             ON CONFLICT (id) DO UPDATE SET holder = excluded.holder, expires_at = excluded.expires_at \
             WHERE sync_lease.holder = excluded.holder OR sync_lease.expires_at <= ?",
        )
        .bind(holder)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(StoreError::from)?;

        let acquired = result.rows_affected() == 1;
        tracing::trace!(holder, acquired, "Sync lease claim");
        Ok(acquired)
    }

    async fn release_sync_lease(&self, holder: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM sync_lease WHERE id = 1 AND holder = ?")
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(StoreError::from)?;
        Ok(())
    }

    // --- Diagnostics ---

    async fn storage_estimate(&self) -> anyhow::Result<StorageEstimate> {
        let page_count: i64 = sqlx::query_scalar("PRAGMA page_count")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;
        let page_size: i64 = sqlx::query_scalar("PRAGMA page_size")
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)?;

        Ok(StorageEstimate {
            used_bytes: u64::try_from(page_count.saturating_mul(page_size)).unwrap_or(0),
            quota_bytes: self.quota_bytes,
        })
    }
}
