//! Replay engine
//!
//! [`SyncEngine::sync_all`] runs one pass over the queue:
//!
//! ```text
//! offline / busy / lease held elsewhere ──► false (queue untouched)
//!       │
//!   claim flag + lease ─► sync_start ─► list queue ──err──► sync_error, false
//!                                   │
//!               replay due ops (bounded concurrency, per-item timeout)
//!                                   │
//!        reconcile: drop synced ids, persist failed ids with backoff
//!                                   │
//!                     sync_complete(results), true
//! ```
//!
//! Only ids processed by the pass are reconciled, so operations enqueued
//! while it runs survive untouched.
//!
//! The in-progress flag covers one process. The store's sync lease covers
//! every process sharing the database: it is claimed before the queue is
//! read, renewed before each replay, and released when the pass ends. An
//! item whose renewal fails is deferred instead of replayed.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{self, StreamExt};
use ledgersync_core::config::Config;
use ledgersync_core::domain::{
    FailureInfo, ItemOutcome, ItemResult, OperationKind, SyncEvent, SyncOperation,
};
use ledgersync_core::ports::IRemoteApi;
use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::connectivity::ConnectivityState;
use crate::events::EventBus;
use crate::queue::SyncQueue;
use crate::retry::RetryPolicy;
use crate::SyncError;

/// Tunables for a pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Upper bound on a single replay
    pub item_timeout: Duration,
    /// Replays in flight at once; results keep queue order regardless
    pub max_concurrent: usize,
    pub retry: RetryPolicy,
}

/// Slack on top of the longest gap between two lease renewals
const LEASE_MARGIN: Duration = Duration::from_secs(30);

impl EngineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            item_timeout: config.sync.item_timeout(),
            max_concurrent: config.sync.max_concurrent,
            retry: RetryPolicy::from_config(&config.retry),
        }
    }
}

impl EngineSettings {
    /// How long a claimed lease stays valid without renewal
    ///
    /// Renewals happen before each replay, and a replay never outlives
    /// `item_timeout`.
    pub fn lease_ttl(&self) -> Duration {
        self.item_timeout.saturating_mul(2).saturating_add(LEASE_MARGIN)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Replays queued operations against the remote API
pub struct SyncEngine {
    queue: Arc<SyncQueue>,
    remote: Arc<dyn IRemoteApi>,
    state: Arc<ConnectivityState>,
    events: Arc<EventBus>,
    settings: EngineSettings,
    /// Identifies this engine as holder of the store's sync lease
    lease_holder: String,
}

impl SyncEngine {
    pub fn new(
        queue: Arc<SyncQueue>,
        remote: Arc<dyn IRemoteApi>,
        state: Arc<ConnectivityState>,
        events: Arc<EventBus>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            queue,
            remote,
            state,
            events,
            settings,
            lease_holder: format!("{}-{}", std::process::id(), Uuid::new_v4()),
        }
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Runs one sync pass
    ///
    /// Returns false if the pass was skipped (offline, another pass in
    /// progress here or in another process) or aborted before any result
    /// could be recorded. Never panics and never returns an error; failures
    /// surface as events.
    #[tracing::instrument(skip(self))]
    pub async fn sync_all(&self) -> bool {
        if !self.state.is_online() {
            debug!("Offline, skipping sync pass");
            return false;
        }
        let Some(_guard) = self.state.try_begin_sync() else {
            debug!("Sync pass already in progress, skipping");
            return false;
        };

        match self
            .queue
            .try_acquire_lease(&self.lease_holder, self.settings.lease_ttl())
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                info!("Another process is replaying the queue, skipping");
                return false;
            }
            Err(e) => {
                self.abort(SyncError::SyncBatchFailed(format!("{e:#}")));
                return false;
            }
        }

        let ran = self.run_pass().await;

        if let Err(e) = self.queue.release_lease(&self.lease_holder).await {
            // The lease lapses on its own after `lease_ttl`.
            warn!(error = %e, "Failed to release sync lease");
        }
        ran
    }

    async fn run_pass(&self) -> bool {
        self.events.emit(&SyncEvent::SyncStart);

        let operations = match self.queue.list().await {
            Ok(ops) => ops,
            Err(e) => {
                self.abort(SyncError::SyncBatchFailed(format!("{e:#}")));
                return false;
            }
        };

        let started_at = Utc::now();
        info!(queued = operations.len(), "Sync pass started");

        let outcomes: Vec<(&SyncOperation, Option<Result<Value, SyncError>>)> =
            stream::iter(
                operations
                    .iter()
                    .map(|op| async move {
                        if op.is_due(started_at) && self.renew_lease().await {
                            (op, Some(self.replay(op).await))
                        } else {
                            (op, None)
                        }
                    })
                    .collect::<Vec<_>>(),
            )
            .buffered(self.settings.max_concurrent.max(1))
            .collect()
            .await;

        let mut synced = Vec::new();
        let mut failed = Vec::new();
        let mut results = Vec::with_capacity(outcomes.len());

        for (op, outcome) in outcomes {
            match outcome {
                Some(Ok(_)) => {
                    synced.push(op.id);
                    results.push(ItemResult {
                        operation_id: op.id,
                        outcome: ItemOutcome::Synced,
                        retry_count: op.retry_count,
                    });
                }
                Some(Err(err)) => {
                    let failure = err
                        .failure_info()
                        .unwrap_or_else(|| FailureInfo::new("internal", err.to_string()));
                    let mut updated = op.clone();
                    let retry_count = updated.retry_count.saturating_add(1);
                    let next_attempt_at =
                        self.settings.retry.next_attempt_at(retry_count, Utc::now());
                    updated.mark_failed(failure.clone(), next_attempt_at);

                    results.push(ItemResult {
                        operation_id: op.id,
                        outcome: ItemOutcome::Failed { failure },
                        retry_count: updated.retry_count,
                    });
                    failed.push(updated);
                }
                None => {
                    debug!(operation_id = %op.id, "Not replayed this pass, deferring");
                    results.push(ItemResult {
                        operation_id: op.id,
                        outcome: ItemOutcome::Deferred,
                        retry_count: op.retry_count,
                    });
                }
            }
        }

        if let Err(e) = self.queue.apply_outcome(&synced, &failed).await {
            // Replays already happened; synced operations will be replayed again.
            self.abort(SyncError::SyncBatchFailed(format!("{e:#}")));
            return false;
        }

        info!(
            synced = synced.len(),
            failed = failed.len(),
            deferred = results.len() - synced.len() - failed.len(),
            "Sync pass complete"
        );
        self.events.emit(&SyncEvent::SyncComplete { results });
        true
    }

    /// Replays one operation against the remote API
    ///
    /// Does not touch the queue or any shared state.
    pub async fn sync_item(&self, op: &SyncOperation) -> Result<Value, SyncError> {
        let path = op.resource_path();
        let result = match &op.kind {
            OperationKind::Create { payload } => {
                self.remote.post(&path, &Value::Object(payload.clone())).await
            }
            OperationKind::Update { payload, .. } => {
                self.remote.put(&path, &Value::Object(payload.clone())).await
            }
            OperationKind::Delete { .. } => self.remote.delete(&path).await,
        };

        result.map_err(|e| SyncError::SyncItemFailed {
            operation_id: op.id,
            code: self.remote.failure_code(&e),
            message: format!("{e:#}"),
        })
    }

    async fn replay(&self, op: &SyncOperation) -> Result<Value, SyncError> {
        let result = match tokio::time::timeout(self.settings.item_timeout, self.sync_item(op)).await
        {
            Ok(result) => result,
            Err(_) => Err(SyncError::SyncItemFailed {
                operation_id: op.id,
                code: "timeout".to_string(),
                message: format!(
                    "no response within {}s",
                    self.settings.item_timeout.as_secs_f64()
                ),
            }),
        };

        match &result {
            Ok(_) => debug!(operation_id = %op.id, path = %op.resource_path(), "Operation synced"),
            Err(e) => warn!(operation_id = %op.id, error = %e, "Operation replay failed"),
        }
        result
    }

    async fn renew_lease(&self) -> bool {
        match self
            .queue
            .try_acquire_lease(&self.lease_holder, self.settings.lease_ttl())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!("Sync lease taken over by another process");
                false
            }
            Err(e) => {
                warn!(error = %e, "Failed to renew sync lease");
                false
            }
        }
    }

    fn abort(&self, err: SyncError) {
        warn!(error = %err, "Sync pass aborted");
        self.events.emit(&SyncEvent::SyncError {
            message: err.to_string(),
        });
    }
}
