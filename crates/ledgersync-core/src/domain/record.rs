//! Persisted records and the collections that partition the local store
//!
//! Every record belongs to exactly one [`Collection`]. The payload is a
//! closed tagged union ([`RecordPayload`]) so that a record can only be
//! written into the collection its variant maps to; the store checks this
//! with [`Record::ensure_collection`] before writing.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::RecordId;

/// A JSON object as received from or sent to the remote API
pub type JsonObject = serde_json::Map<String, serde_json::Value>;

// ============================================================================
// Collection
// ============================================================================

/// Named partition of the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Companies,
    Customers,
    Inventory,
    Sales,
    /// Read-through cache of remote data
    Cache,
    /// Pending mutations awaiting remote confirmation
    SyncQueue,
}

impl Collection {
    /// All collections, in schema order
    pub const ALL: [Collection; 6] = [
        Collection::Companies,
        Collection::Customers,
        Collection::Inventory,
        Collection::Sales,
        Collection::Cache,
        Collection::SyncQueue,
    ];

    /// Storage name of the collection
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Companies => "companies",
            Collection::Customers => "customers",
            Collection::Inventory => "inventory",
            Collection::Sales => "sales",
            Collection::Cache => "cache",
            Collection::SyncQueue => "sync_queue",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Collection {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| DomainError::UnknownCollection(s.to_string()))
    }
}

// ============================================================================
// CacheEntry
// ============================================================================

/// A cached copy of remote data, keyed by a logical identifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Logical cache key (e.g. "ledger:2024-25:trial-balance")
    pub key: String,
    /// Cached value, opaque to the cache
    pub value: serde_json::Value,
    /// When the value was written
    pub cached_at: DateTime<Utc>,
    /// Bumped on every overwrite of the same key, starting at 1
    pub version: u64,
}

impl CacheEntry {
    /// Creates a first-version entry stamped with the current time
    pub fn new(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            key: key.into(),
            value,
            cached_at: Utc::now(),
            version: 1,
        }
    }

    /// Builds the entry that replaces `self` with a new value
    pub fn superseded_by(&self, value: serde_json::Value) -> Self {
        Self {
            key: self.key.clone(),
            value,
            cached_at: Utc::now(),
            version: self.version + 1,
        }
    }

    /// Age of the entry relative to `now`
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.cached_at
    }
}

// ============================================================================
// RecordPayload
// ============================================================================

/// Payload of a persisted record
///
/// Entity variants carry the JSON object the remote API returned for that
/// entity; their inner shape is owned by the ERP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RecordPayload {
    Company(JsonObject),
    Customer(JsonObject),
    InventoryItem(JsonObject),
    Sale(JsonObject),
    Cached(CacheEntry),
}

impl RecordPayload {
    /// The collection this payload belongs to
    pub fn collection(&self) -> Collection {
        match self {
            RecordPayload::Company(_) => Collection::Companies,
            RecordPayload::Customer(_) => Collection::Customers,
            RecordPayload::InventoryItem(_) => Collection::Inventory,
            RecordPayload::Sale(_) => Collection::Sales,
            RecordPayload::Cached(_) => Collection::Cache,
        }
    }

    /// Variant name, as used in the serialized tag
    pub fn type_name(&self) -> &'static str {
        match self {
            RecordPayload::Company(_) => "company",
            RecordPayload::Customer(_) => "customer",
            RecordPayload::InventoryItem(_) => "inventory_item",
            RecordPayload::Sale(_) => "sale",
            RecordPayload::Cached(_) => "cached",
        }
    }
}

// ============================================================================
// Record
// ============================================================================

/// A generic persisted entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub payload: RecordPayload,
}

impl Record {
    pub fn new(id: RecordId, payload: RecordPayload) -> Self {
        Self { id, payload }
    }

    /// Collection derived from the payload variant
    pub fn collection(&self) -> Collection {
        self.payload.collection()
    }

    /// Checks that this record may be written into `collection`
    ///
    /// # Errors
    /// Returns `DomainError::CollectionMismatch` when the payload variant
    /// belongs elsewhere. The sync queue never accepts plain records.
    pub fn ensure_collection(&self, collection: Collection) -> Result<(), DomainError> {
        if self.collection() == collection {
            Ok(())
        } else {
            Err(DomainError::CollectionMismatch {
                collection: collection.name().to_string(),
                payload: self.payload.type_name().to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: serde_json::Value) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_collection_roundtrip_names() {
        for c in Collection::ALL {
            assert_eq!(c.name().parse::<Collection>().unwrap(), c);
        }
        assert!("ledgers".parse::<Collection>().is_err());
    }

    #[test]
    fn test_payload_maps_to_collection() {
        let p = RecordPayload::Customer(object(json!({"name": "Acme Traders"})));
        assert_eq!(p.collection(), Collection::Customers);
        let p = RecordPayload::Cached(CacheEntry::new("k", json!(1)));
        assert_eq!(p.collection(), Collection::Cache);
    }

    #[test]
    fn test_ensure_collection_rejects_mismatch() {
        let record = Record::new(
            RecordId::new("C1").unwrap(),
            RecordPayload::Company(object(json!({"gstin": "29ABCDE1234F1Z5"}))),
        );
        assert!(record.ensure_collection(Collection::Companies).is_ok());

        let err = record.ensure_collection(Collection::Sales).unwrap_err();
        assert!(matches!(err, DomainError::CollectionMismatch { .. }));
        assert!(record.ensure_collection(Collection::SyncQueue).is_err());
    }

    #[test]
    fn test_payload_serde_is_tagged() {
        let p = RecordPayload::Sale(object(json!({"total": 1180})));
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["type"], "sale");
        assert_eq!(v["data"]["total"], 1180);

        let back: RecordPayload = serde_json::from_value(v).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_cache_entry_supersede_bumps_version() {
        let first = CacheEntry::new("gst:rates", json!([5, 12, 18]));
        let second = first.superseded_by(json!([5, 12, 18, 28]));
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.key, "gst:rates");
        assert!(second.cached_at >= first.cached_at);
    }
}
