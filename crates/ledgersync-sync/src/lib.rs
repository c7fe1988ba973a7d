//! LedgerSync Sync - Offline synchronization machinery
//!
//! Provides:
//! - A durable queue of mutations captured while disconnected
//! - A replay engine with bounded concurrency, timeouts and backoff
//! - A connectivity monitor that decides when to replay
//! - A read-through cache of remote data
//! - A typed event bus for sync lifecycle notifications
//!
//! ## Modules
//!
//! - [`queue`] - Persisted queue with an in-memory mirror
//! - [`engine`] - Replays the queue against the remote API
//! - [`retry`] - Backoff policy for failed operations
//! - [`connectivity`] - Shared online / in-progress state
//! - [`monitor`] - Event loop turning signals and timers into passes
//! - [`cache`] - Versioned, TTL-aware cache on top of the local store
//! - [`events`] - Handler registry plus broadcast channel
//! - [`service`] - Wires everything together with an explicit lifecycle

pub mod cache;
pub mod connectivity;
pub mod engine;
pub mod events;
pub mod monitor;
pub mod queue;
pub mod retry;
pub mod service;

#[cfg(test)]
pub(crate) mod test_support;

use ledgersync_core::domain::{DomainError, FailureInfo, OperationId, SyncEventKind};
use thiserror::Error;

pub use service::OfflineSyncService;

/// Errors that can occur during synchronization
#[derive(Debug, Error)]
pub enum SyncError {
    /// Replaying one queued operation failed; the rest of the pass continues
    #[error("Operation {operation_id} failed [{code}]: {message}")]
    SyncItemFailed {
        operation_id: OperationId,
        code: String,
        message: String,
    },

    /// A pass could not run at all; the queue is left untouched
    #[error("Sync batch failed: {0}")]
    SyncBatchFailed(String),

    /// An event handler returned an error or panicked
    #[error("Handler for '{event}' failed: {message}")]
    EventHandlerFailed {
        event: SyncEventKind,
        message: String,
    },

    /// A domain-level error propagated from ledgersync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}

impl SyncError {
    /// Failure details to record on the queued operation, if this is an item failure
    pub fn failure_info(&self) -> Option<FailureInfo> {
        match self {
            SyncError::SyncItemFailed { code, message, .. } => {
                Some(FailureInfo::new(code.clone(), message.clone()))
            }
            _ => None,
        }
    }
}
