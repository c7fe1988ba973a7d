//! Sync lifecycle events
//!
//! Published by the sync engine and connectivity monitor, consumed by
//! observers (status indicators, logging, the CLI).

use std::fmt;

use serde::{Deserialize, Serialize};

use super::newtypes::OperationId;
use super::operation::{FailureInfo, OperationStatus};

/// Channel an event is published on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEventKind {
    Online,
    Offline,
    SyncStart,
    SyncComplete,
    SyncError,
}

impl SyncEventKind {
    pub fn name(&self) -> &'static str {
        match self {
            SyncEventKind::Online => "online",
            SyncEventKind::Offline => "offline",
            SyncEventKind::SyncStart => "sync_start",
            SyncEventKind::SyncComplete => "sync_complete",
            SyncEventKind::SyncError => "sync_error",
        }
    }
}

impl fmt::Display for SyncEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Input from the host environment to the connectivity monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivitySignal {
    /// The backend became reachable
    Online,
    /// The backend became unreachable
    Offline,
    /// The host application returned to the foreground
    Foregrounded,
}

/// Outcome of one operation within a pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Replayed and confirmed; pruned from the queue
    Synced,
    /// Replay failed; kept in the queue with `status = error`
    Failed { failure: FailureInfo },
    /// Not attempted this pass because its backoff has not elapsed
    Deferred,
}

/// Per-operation entry of a `SyncComplete` result list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemResult {
    pub operation_id: OperationId,
    pub outcome: ItemOutcome,
    /// Retry count after this pass
    pub retry_count: u32,
}

impl ItemResult {
    pub fn is_synced(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Synced)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Failed { .. })
    }

    /// Status the operation is left in after the pass
    pub fn status(&self) -> Option<OperationStatus> {
        match self.outcome {
            ItemOutcome::Synced => Some(OperationStatus::Success),
            ItemOutcome::Failed { .. } => Some(OperationStatus::Error),
            ItemOutcome::Deferred => None,
        }
    }
}

/// A lifecycle event with its payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
    Online,
    Offline,
    SyncStart,
    SyncComplete { results: Vec<ItemResult> },
    SyncError { message: String },
}

impl SyncEvent {
    pub fn kind(&self) -> SyncEventKind {
        match self {
            SyncEvent::Online => SyncEventKind::Online,
            SyncEvent::Offline => SyncEventKind::Offline,
            SyncEvent::SyncStart => SyncEventKind::SyncStart,
            SyncEvent::SyncComplete { .. } => SyncEventKind::SyncComplete,
            SyncEvent::SyncError { .. } => SyncEventKind::SyncError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_mapping() {
        assert_eq!(SyncEvent::Online.kind(), SyncEventKind::Online);
        assert_eq!(
            SyncEvent::SyncComplete { results: vec![] }.kind(),
            SyncEventKind::SyncComplete
        );
        assert_eq!(SyncEventKind::SyncError.to_string(), "sync_error");
    }

    #[test]
    fn test_item_result_status() {
        let synced = ItemResult {
            operation_id: OperationId::new(1),
            outcome: ItemOutcome::Synced,
            retry_count: 0,
        };
        let failed = ItemResult {
            operation_id: OperationId::new(2),
            outcome: ItemOutcome::Failed {
                failure: FailureInfo::new("network", "unreachable"),
            },
            retry_count: 1,
        };
        assert!(synced.is_synced());
        assert_eq!(synced.status(), Some(OperationStatus::Success));
        assert!(failed.is_failed());
        assert_eq!(failed.status(), Some(OperationStatus::Error));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let v = serde_json::to_value(SyncEvent::SyncError {
            message: "queue unreadable".into(),
        })
        .unwrap();
        assert_eq!(v["event"], "sync_error");
        assert_eq!(v["message"], "queue unreadable");
    }
}
