//! Domain entities and business rules
//!
//! This module contains the core domain types for LedgerSync:
//! - Newtypes for validated identifiers
//! - Records and the closed set of collection payloads
//! - Queued sync operations and their status lifecycle
//! - Lifecycle events published by the sync engine
//! - Domain-specific error types

pub mod errors;
pub mod events;
pub mod newtypes;
pub mod operation;
pub mod record;

// Re-export commonly used types
pub use errors::DomainError;
pub use events::{ConnectivitySignal, ItemOutcome, ItemResult, SyncEvent, SyncEventKind};
pub use newtypes::*;
pub use operation::{
    EntityKind, FailureInfo, OperationKind, OperationRequest, OperationStatus, SyncOperation,
};
pub use record::{CacheEntry, Collection, JsonObject, Record, RecordPayload};
