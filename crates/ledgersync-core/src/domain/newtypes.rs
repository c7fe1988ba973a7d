//! Domain newtypes with validation
//!
//! This module provides strongly-typed wrappers for domain identifiers.
//! Each newtype ensures data validity at construction time.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::DomainError;

// ============================================================================
// Record identifiers
// ============================================================================

/// Maximum accepted length of a record identifier
const MAX_RECORD_ID_LEN: usize = 256;

/// Identifier of a record within one collection
///
/// Record IDs come from the remote ERP (numeric or slug keys) or from the
/// caller for entities created while offline. They are opaque
/// to the store; the only rules are non-empty, no surrounding whitespace,
/// no control characters, and a sane length.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RecordId(String);

impl RecordId {
    /// Create a new RecordId
    ///
    /// # Errors
    /// Returns error if the ID is empty, padded, too long, or has control characters
    pub fn new(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DomainError::InvalidRecordId(
                "Record ID cannot be empty".to_string(),
            ));
        }

        if id.trim() != id {
            return Err(DomainError::InvalidRecordId(format!(
                "Record ID has surrounding whitespace: {id:?}"
            )));
        }

        if id.len() > MAX_RECORD_ID_LEN {
            return Err(DomainError::InvalidRecordId(format!(
                "Record ID longer than {MAX_RECORD_ID_LEN} bytes"
            )));
        }

        if id.chars().any(char::is_control) {
            return Err(DomainError::InvalidRecordId(format!(
                "Record ID contains control characters: {id:?}"
            )));
        }

        Ok(Self(id))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RecordId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for RecordId {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<RecordId> for String {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

// ============================================================================
// Queue identifiers
// ============================================================================

/// Identifier of a queued sync operation
///
/// Assigned by the store's autoincrement key, so ordering by ID is
/// insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(i64);

impl OperationId {
    /// Wrap a raw autoincrement key
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Get the raw key
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }
}

impl Display for OperationId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>()
            .map(Self)
            .map_err(|e| DomainError::ValidationFailed(format!("Invalid operation ID '{s}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_id_valid() {
        let id = RecordId::new("CUST-0042").unwrap();
        assert_eq!(id.as_str(), "CUST-0042");
        assert_eq!(id.to_string(), "CUST-0042");
    }

    #[test]
    fn test_record_id_rejects_empty_and_padded() {
        assert!(RecordId::new("").is_err());
        assert!(RecordId::new(" 42").is_err());
        assert!(RecordId::new("42\n").is_err());
        assert!(RecordId::new("a\u{0007}b").is_err());
        assert!(RecordId::new("x".repeat(MAX_RECORD_ID_LEN + 1)).is_err());
    }

    #[test]
    fn test_record_id_serde_validates() {
        let id: RecordId = serde_json::from_str("\"INV-1\"").unwrap();
        assert_eq!(id.as_str(), "INV-1");
        assert!(serde_json::from_str::<RecordId>("\"\"").is_err());
    }

    #[test]
    fn test_operation_id_ordering_and_parse() {
        let a = OperationId::new(1);
        let b: OperationId = "2".parse().unwrap();
        assert!(a < b);
        assert_eq!(b.get(), 2);
        assert!("two".parse::<OperationId>().is_err());
    }
}
