//! Hand-written port doubles shared by the unit tests of this crate

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use ledgersync_core::domain::{
    Collection, EntityKind, OperationId, OperationRequest, Record, RecordId, SyncOperation,
};
use ledgersync_core::ports::{ILocalStore, IRemoteApi, StorageEstimate};
use ledgersync_store::{DatabasePool, SqliteLocalStore};
use serde_json::{json, Value};

pub async fn memory_store() -> SqliteLocalStore {
    let pool = DatabasePool::in_memory()
        .await
        .expect("Failed to create in-memory database");
    SqliteLocalStore::new(pool.pool().clone())
}

pub fn create_request(name: &str) -> OperationRequest {
    OperationRequest::create(
        EntityKind::Customer,
        "/api/crm/customers",
        json!({ "name": name }).as_object().cloned().unwrap(),
    )
}

// ============================================================================
// Store double
// ============================================================================

/// Delegates to an in-memory SQLite store, with failure injection and call counting
pub struct InstrumentedStore {
    inner: SqliteLocalStore,
    pub fail_list: AtomicBool,
    pub fail_reconcile: AtomicBool,
    pub list_calls: AtomicUsize,
    pub reconcile_calls: AtomicUsize,
}

impl InstrumentedStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: memory_store().await,
            fail_list: AtomicBool::new(false),
            fail_reconcile: AtomicBool::new(false),
            list_calls: AtomicUsize::new(0),
            reconcile_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait::async_trait]
impl ILocalStore for InstrumentedStore {
    async fn put(&self, collection: Collection, records: &[Record]) -> Result<()> {
        self.inner.put(collection, records).await
    }

    async fn get(&self, collection: Collection, id: &RecordId) -> Result<Option<Record>> {
        self.inner.get(collection, id).await
    }

    async fn get_all(&self, collection: Collection) -> Result<Vec<Record>> {
        self.inner.get_all(collection).await
    }

    async fn delete(&self, collection: Collection, id: &RecordId) -> Result<()> {
        self.inner.delete(collection, id).await
    }

    async fn clear(&self, collection: Collection) -> Result<()> {
        self.inner.clear(collection).await
    }

    async fn append_operation(&self, request: &OperationRequest) -> Result<SyncOperation> {
        self.inner.append_operation(request).await
    }

    async fn list_operations(&self) -> Result<Vec<SyncOperation>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list.load(Ordering::SeqCst) {
            anyhow::bail!("disk I/O error");
        }
        self.inner.list_operations().await
    }

    async fn reconcile_operations(
        &self,
        removed: &[OperationId],
        updated: &[SyncOperation],
    ) -> Result<()> {
        self.reconcile_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_reconcile.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        self.inner.reconcile_operations(removed, updated).await
    }

    async fn clear_operations(&self) -> Result<()> {
        self.inner.clear_operations().await
    }

    async fn try_acquire_sync_lease(&self, holder: &str, ttl: Duration) -> Result<bool> {
        self.inner.try_acquire_sync_lease(holder, ttl).await
    }

    async fn release_sync_lease(&self, holder: &str) -> Result<()> {
        self.inner.release_sync_lease(holder).await
    }

    async fn storage_estimate(&self) -> Result<StorageEstimate> {
        self.inner.storage_estimate().await
    }
}

// ============================================================================
// Remote double
// ============================================================================

/// Records every call; fails or stalls on request
#[derive(Default)]
pub struct MockRemote {
    pub calls: Mutex<Vec<(String, String, Option<Value>)>>,
    /// Request body field `name` values that fail with the given code
    failures: Mutex<HashMap<String, String>>,
    /// Request body field `name` values that never answer in time
    stalls: Mutex<Vec<String>>,
    delay: Mutex<Option<Duration>>,
}

impl MockRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, name: &str, code: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(name.to_string(), code.to_string());
    }

    pub fn stall_for(&self, name: &str) {
        self.stalls.lock().unwrap().push(name.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn called_paths(&self) -> Vec<(String, String)> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|(m, p, _)| (m.clone(), p.clone()))
            .collect()
    }

    async fn respond(&self, method: &str, path: &str, body: Option<&Value>) -> Result<Value> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), path.to_string(), body.cloned()));

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let name = body
            .and_then(|b| b.get("name"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(name) = name {
            let stalled = self.stalls.lock().unwrap().contains(&name);
            if stalled {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
            let failure = self.failures.lock().unwrap().get(&name).cloned();
            if let Some(code) = failure {
                return Err(anyhow::Error::new(MockFailure(code)));
            }
        }
        Ok(json!({ "ok": true, "path": path }))
    }
}

#[derive(Debug, thiserror::Error)]
#[error("mock remote failure: {0}")]
pub struct MockFailure(pub String);

#[async_trait::async_trait]
impl IRemoteApi for MockRemote {
    async fn get(&self, path: &str) -> Result<Value> {
        self.respond("GET", path, None).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.respond("POST", path, Some(body)).await
    }

    async fn put(&self, path: &str, body: &Value) -> Result<Value> {
        self.respond("PUT", path, Some(body)).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        self.respond("DELETE", path, None).await
    }

    fn failure_code(&self, err: &anyhow::Error) -> String {
        err.downcast_ref::<MockFailure>()
            .map_or_else(|| "remote".to_string(), |f| f.0.clone())
    }
}
