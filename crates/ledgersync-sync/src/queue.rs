//! Queue of mutations awaiting remote confirmation
//!
//! The local store is the source of truth; [`SyncQueue`] keeps an in-memory
//! mirror for cheap status reads and nudges the monitor when work arrives
//! while online. Every write to the store and its mirror update happen under
//! one async lock, so a concurrent `list()` never interleaves with them.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use ledgersync_core::domain::{OperationId, OperationRequest, SyncOperation};
use ledgersync_core::ports::ILocalStore;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info};

use crate::connectivity::{ConnectivityState, SyncTrigger};

pub struct SyncQueue {
    store: Arc<dyn ILocalStore>,
    state: Arc<ConnectivityState>,
    mirror: Mutex<Vec<SyncOperation>>,
    writes: tokio::sync::Mutex<()>,
    trigger: Option<mpsc::Sender<SyncTrigger>>,
}

impl SyncQueue {
    /// A queue whose mirror starts empty; see [`SyncQueue::load`]
    pub fn new(store: Arc<dyn ILocalStore>, state: Arc<ConnectivityState>) -> Self {
        Self {
            store,
            state,
            mirror: Mutex::new(Vec::new()),
            writes: tokio::sync::Mutex::new(()),
            trigger: None,
        }
    }

    /// A queue whose mirror is filled from the operations already stored
    pub async fn load(store: Arc<dyn ILocalStore>, state: Arc<ConnectivityState>) -> Result<Self> {
        let queue = Self::new(store, state);
        let loaded = queue.list().await?;
        debug!(queued = loaded.len(), "Loaded sync queue");
        Ok(queue)
    }

    /// Sends a best-effort [`SyncTrigger::Enqueued`] on every online enqueue
    pub fn with_trigger(mut self, trigger: mpsc::Sender<SyncTrigger>) -> Self {
        self.trigger = Some(trigger);
        self
    }

    /// Validates and persists a new operation
    ///
    /// The returned operation is `pending` with `retry_count == 0`. Nothing
    /// is sent to the remote API from here.
    pub async fn enqueue(&self, request: OperationRequest) -> Result<SyncOperation> {
        request.validate()?;
        let operation = {
            let _writing = self.writes.lock().await;
            let operation = self
                .store
                .append_operation(&request)
                .await
                .context("Failed to persist sync operation")?;

            let mut mirror = self.lock_mirror();
            if !mirror.iter().any(|op| op.id == operation.id) {
                mirror.push(operation.clone());
            }
            operation
        };
        info!(
            operation_id = %operation.id,
            entity = %operation.entity,
            op = operation.kind.name(),
            endpoint = %operation.endpoint,
            "Operation queued"
        );

        if self.state.is_online() {
            self.request_sync(SyncTrigger::Enqueued);
        }
        Ok(operation)
    }

    /// Asks the monitor for a pass without blocking
    ///
    /// Returns false if no monitor is attached or it has shut down.
    pub fn request_sync(&self, reason: SyncTrigger) -> bool {
        let Some(trigger) = &self.trigger else {
            return false;
        };
        match trigger.try_send(reason) {
            Ok(()) => true,
            // A pass is already requested.
            Err(TrySendError::Full(_)) => true,
            Err(TrySendError::Closed(_)) => {
                debug!("Sync trigger channel closed");
                false
            }
        }
    }

    /// All persisted operations in storage order; refreshes the mirror
    pub async fn list(&self) -> Result<Vec<SyncOperation>> {
        let _writing = self.writes.lock().await;
        let operations = self
            .store
            .list_operations()
            .await
            .context("Failed to read sync queue")?;
        *self.lock_mirror() = operations.clone();
        Ok(operations)
    }

    /// Removes every queued operation
    pub async fn clear(&self) -> Result<()> {
        let _writing = self.writes.lock().await;
        self.store
            .clear_operations()
            .await
            .context("Failed to clear sync queue")?;
        self.lock_mirror().clear();
        info!("Sync queue cleared");
        Ok(())
    }

    /// Number of operations in the mirror
    pub fn pending_count(&self) -> usize {
        self.lock_mirror().len()
    }

    /// Snapshot of the mirror without touching the store
    pub fn snapshot(&self) -> Vec<SyncOperation> {
        self.lock_mirror().clone()
    }

    /// Persists the outcome of a pass and applies it to the mirror
    ///
    /// Only the given ids are touched, so operations enqueued while the pass
    /// ran are kept.
    pub async fn apply_outcome(
        &self,
        synced: &[OperationId],
        failed: &[SyncOperation],
    ) -> Result<()> {
        let _writing = self.writes.lock().await;
        self.store
            .reconcile_operations(synced, failed)
            .await
            .context("Failed to record sync results")?;

        let mut mirror = self.lock_mirror();
        mirror.retain(|op| !synced.contains(&op.id));
        for updated in failed {
            if let Some(slot) = mirror.iter_mut().find(|op| op.id == updated.id) {
                *slot = updated.clone();
            }
        }
        Ok(())
    }

    /// Claims or extends the store-wide replay lease for `holder`
    pub async fn try_acquire_lease(&self, holder: &str, ttl: Duration) -> Result<bool> {
        self.store
            .try_acquire_sync_lease(holder, ttl)
            .await
            .context("Failed to claim sync lease")
    }

    pub async fn release_lease(&self, holder: &str) -> Result<()> {
        self.store
            .release_sync_lease(holder)
            .await
            .context("Failed to release sync lease")
    }

    fn lock_mirror(&self) -> MutexGuard<'_, Vec<SyncOperation>> {
        self.mirror.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
