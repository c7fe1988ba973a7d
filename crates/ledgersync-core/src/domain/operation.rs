//! Deferred mutations awaiting remote confirmation
//!
//! A [`SyncOperation`] is created when a mutation cannot be confirmed
//! against the remote API immediately. It is replayed by the sync engine
//! until it succeeds, at which point it is removed from the queue.
//!
//! ## Status lifecycle
//!
//! ```text
//!   enqueue ──► Pending ──replay ok──► Success (pruned from the queue)
//!                  │                      ▲
//!             replay failed          replay ok
//!                  ▼                      │
//!                Error ───────────────────┘
//!                  │ ▲
//!                  └─┘ replay failed (retry_count += 1)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::{OperationId, RecordId};
use super::record::{Collection, JsonObject};

// ============================================================================
// EntityKind
// ============================================================================

/// The kind of ERP entity an operation targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Company,
    Customer,
    InventoryItem,
    Sale,
}

impl EntityKind {
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Company,
        EntityKind::Customer,
        EntityKind::InventoryItem,
        EntityKind::Sale,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Company => "company",
            EntityKind::Customer => "customer",
            EntityKind::InventoryItem => "inventory_item",
            EntityKind::Sale => "sale",
        }
    }

    /// Local collection mirroring this entity
    pub fn collection(&self) -> Collection {
        match self {
            EntityKind::Company => Collection::Companies,
            EntityKind::Customer => Collection::Customers,
            EntityKind::InventoryItem => Collection::Inventory,
            EntityKind::Sale => Collection::Sales,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EntityKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EntityKind::ALL
            .into_iter()
            .find(|e| e.name() == s)
            .ok_or_else(|| DomainError::UnknownEntity(s.to_string()))
    }
}

// ============================================================================
// OperationKind
// ============================================================================

/// What the operation does to the remote entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum OperationKind {
    /// `POST {endpoint}` with the payload
    Create { payload: JsonObject },
    /// `PUT {endpoint}/{record_id}` with the payload
    Update {
        record_id: RecordId,
        payload: JsonObject,
    },
    /// `DELETE {endpoint}/{record_id}`
    Delete { record_id: RecordId },
}

impl OperationKind {
    pub fn name(&self) -> &'static str {
        match self {
            OperationKind::Create { .. } => "create",
            OperationKind::Update { .. } => "update",
            OperationKind::Delete { .. } => "delete",
        }
    }

    /// Target record, when the operation addresses an existing one
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            OperationKind::Create { .. } => None,
            OperationKind::Update { record_id, .. } | OperationKind::Delete { record_id } => {
                Some(record_id)
            }
        }
    }

    /// Body sent with the request, if any
    pub fn payload(&self) -> Option<&JsonObject> {
        match self {
            OperationKind::Create { payload } | OperationKind::Update { payload, .. } => {
                Some(payload)
            }
            OperationKind::Delete { .. } => None,
        }
    }
}

// ============================================================================
// OperationStatus
// ============================================================================

/// Replay status of a queued operation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    #[default]
    Pending,
    Success,
    Error,
}

impl OperationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationStatus::Pending => "pending",
            OperationStatus::Success => "success",
            OperationStatus::Error => "error",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OperationStatus::Pending),
            "success" => Ok(OperationStatus::Success),
            "error" => Ok(OperationStatus::Error),
            other => Err(DomainError::InvalidStatus(other.to_string())),
        }
    }
}

// ============================================================================
// FailureInfo
// ============================================================================

/// Why the last replay attempt of an operation failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureInfo {
    /// Machine-readable category (e.g. "network", "timeout", "conflict")
    pub code: String,
    /// Human-readable message
    pub message: String,
    /// When the attempt was made
    pub attempted_at: DateTime<Utc>,
}

impl FailureInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            attempted_at: Utc::now(),
        }
    }
}

impl fmt::Display for FailureInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// ============================================================================
// OperationRequest
// ============================================================================

/// A mutation a caller wants to defer, before the queue has accepted it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    pub entity: EntityKind,
    /// REST collection path, e.g. `/api/accounting/customers`
    pub endpoint: String,
    pub kind: OperationKind,
}

impl OperationRequest {
    pub fn new(entity: EntityKind, endpoint: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            entity,
            endpoint: endpoint.into(),
            kind,
        }
    }

    pub fn create(entity: EntityKind, endpoint: impl Into<String>, payload: JsonObject) -> Self {
        Self::new(entity, endpoint, OperationKind::Create { payload })
    }

    pub fn update(
        entity: EntityKind,
        endpoint: impl Into<String>,
        record_id: RecordId,
        payload: JsonObject,
    ) -> Self {
        Self::new(entity, endpoint, OperationKind::Update { record_id, payload })
    }

    pub fn delete(entity: EntityKind, endpoint: impl Into<String>, record_id: RecordId) -> Self {
        Self::new(entity, endpoint, OperationKind::Delete { record_id })
    }

    /// Validates the request before it is persisted
    ///
    /// # Errors
    /// Returns `DomainError::InvalidEndpoint` if the endpoint is not an
    /// absolute path without query string or trailing slash.
    pub fn validate(&self) -> Result<(), DomainError> {
        let ep = &self.endpoint;
        if !ep.starts_with('/') || ep.len() < 2 {
            return Err(DomainError::InvalidEndpoint(format!(
                "endpoint must be an absolute path: {ep:?}"
            )));
        }
        if ep.ends_with('/') {
            return Err(DomainError::InvalidEndpoint(format!(
                "endpoint must not end with '/': {ep}"
            )));
        }
        if ep.contains('?') || ep.contains('#') || ep.chars().any(char::is_whitespace) {
            return Err(DomainError::InvalidEndpoint(format!(
                "endpoint must be a bare path: {ep}"
            )));
        }
        Ok(())
    }
}

// ============================================================================
// SyncOperation
// ============================================================================

/// A persisted, queued mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncOperation {
    pub id: OperationId,
    pub entity: EntityKind,
    pub endpoint: String,
    pub kind: OperationKind,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    pub status: OperationStatus,
    pub last_error: Option<FailureInfo>,
    /// Earliest time the engine may replay this operation again
    pub next_attempt_at: Option<DateTime<Utc>>,
}

impl SyncOperation {
    /// Builds a freshly queued operation from an accepted request
    pub fn from_request(id: OperationId, request: OperationRequest, enqueued_at: DateTime<Utc>) -> Self {
        Self {
            id,
            entity: request.entity,
            endpoint: request.endpoint,
            kind: request.kind,
            enqueued_at,
            retry_count: 0,
            status: OperationStatus::Pending,
            last_error: None,
            next_attempt_at: None,
        }
    }

    /// Path the operation is replayed against
    ///
    /// The record id is percent-encoded as a single path segment, so ids
    /// such as `GST/2024-25/001` or `INV#7` address exactly one resource.
    pub fn resource_path(&self) -> String {
        match self.kind.record_id() {
            Some(id) => format!("{}/{}", self.endpoint, urlencoding::encode(id.as_str())),
            None => self.endpoint.clone(),
        }
    }

    /// Returns true if the backoff gate allows a replay at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_attempt_at.map_or(true, |at| at <= now)
    }

    /// Records a failed replay attempt
    pub fn mark_failed(&mut self, failure: FailureInfo, next_attempt_at: Option<DateTime<Utc>>) {
        self.status = OperationStatus::Error;
        self.retry_count = self.retry_count.saturating_add(1);
        self.last_error = Some(failure);
        self.next_attempt_at = next_attempt_at;
    }

    /// Records a successful replay; the operation is pruned afterwards
    pub fn mark_succeeded(&mut self) {
        self.status = OperationStatus::Success;
        self.last_error = None;
        self.next_attempt_at = None;
    }
}
