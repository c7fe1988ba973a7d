//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! mostly validation failures raised at the store and queue boundaries.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Record or cache identifier is empty or malformed
    #[error("Invalid record ID: {0}")]
    InvalidRecordId(String),

    /// Unknown collection name
    #[error("Unknown collection: {0}")]
    UnknownCollection(String),

    /// Unknown entity kind
    #[error("Unknown entity kind: {0}")]
    UnknownEntity(String),

    /// REST resource path is not usable for replay
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// A payload was written into a collection it does not belong to
    #[error("Payload of type {payload} cannot be stored in collection {collection}")]
    CollectionMismatch {
        /// The collection the caller targeted
        collection: String,
        /// The payload variant the record carried
        payload: String,
    },

    /// Invalid status value read back from storage
    #[error("Invalid operation status: {0}")]
    InvalidStatus(String),

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidRecordId("".to_string());
        assert_eq!(err.to_string(), "Invalid record ID: ");

        let err = DomainError::CollectionMismatch {
            collection: "customers".to_string(),
            payload: "company".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Payload of type company cannot be stored in collection customers"
        );
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidEndpoint("api".to_string());
        let err2 = DomainError::InvalidEndpoint("api".to_string());
        let err3 = DomainError::InvalidEndpoint("other".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
