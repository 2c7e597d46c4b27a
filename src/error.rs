use thiserror::Error;

use crate::schema::StorageForms;
use crate::segment::SegmentId;

/// Main error type for mapstore operations
#[derive(Error, Debug)]
pub enum MapstoreError {
    #[error("Conflicting declaration for field [{field}]: declared {declared}, requested {requested}")]
    ConflictingDeclaration {
        field: String,
        declared: String,
        requested: String,
    },

    #[error("Field [{field}] has no doc values ({declared})")]
    FieldNotColumnar { field: String, declared: StorageForms },

    #[error("Field [{field}] is not searchable ({declared})")]
    FieldNotSearchable { field: String, declared: StorageForms },

    #[error("Refresh failed while sealing {segment}: {source}")]
    PartialRefreshFailure {
        segment: SegmentId,
        #[source]
        source: std::io::Error,
    },

    #[error("Mapping is strict, dynamic introduction of [{0}] is not allowed")]
    StrictMappingViolation(String),

    #[error("Failed to parse field [{field}]: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Corrupted index data: {0}")]
    Corrupted(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for mapstore operations
pub type Result<T> = std::result::Result<T, MapstoreError>;

impl MapstoreError {
    /// Check if this error indicates a transient failure that could be retried
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            MapstoreError::PartialRefreshFailure { .. } | MapstoreError::Io(_)
        )
    }

    /// Name of the field the error is about, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            MapstoreError::ConflictingDeclaration { field, .. }
            | MapstoreError::FieldNotColumnar { field, .. }
            | MapstoreError::FieldNotSearchable { field, .. }
            | MapstoreError::InvalidValue { field, .. } => Some(field),
            MapstoreError::StrictMappingViolation(field) => Some(field),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MapstoreError::DocumentNotFound("42".to_string());
        assert_eq!(err.to_string(), "Document not found: 42");

        let err = MapstoreError::FieldNotColumnar {
            field: "name".to_string(),
            declared: StorageForms::new(true, true, false),
        };
        assert_eq!(
            err.to_string(),
            "Field [name] has no doc values (index=true, store=true, doc_values=false)"
        );
    }

    #[test]
    fn test_retriable_errors() {
        let refresh = MapstoreError::PartialRefreshFailure {
            segment: SegmentId::new(3),
            source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
        };
        assert!(refresh.is_retriable());
        assert!(!MapstoreError::DocumentNotFound("1".to_string()).is_retriable());
        assert!(!MapstoreError::InvalidMapping("bad".to_string()).is_retriable());
    }

    #[test]
    fn test_error_field() {
        let err = MapstoreError::StrictMappingViolation("extra".to_string());
        assert_eq!(err.field(), Some("extra"));
        assert_eq!(MapstoreError::InvalidQuery("x".to_string()).field(), None);
    }
}
