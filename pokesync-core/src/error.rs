//! Error types for PokeSync operations

use crate::EntityType;
use thiserror::Error;

/// Which decoding stage rejected a bus payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeStage {
    /// Gzip framing was invalid
    Decompress,
    /// Bytes were not a JSON object
    Unmarshal,
}

/// Message decoding errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Failed to decompress payload: {reason}")]
    Decompress { reason: String },

    #[error("Failed to parse payload JSON: {reason}")]
    Json { reason: String },

    #[error("Payload is not a JSON object (found {found})")]
    NotAnObject { found: String },
}

impl DecodeError {
    /// Stage at which decoding failed.
    pub fn stage(&self) -> DecodeStage {
        match self {
            DecodeError::Decompress { .. } => DecodeStage::Decompress,
            DecodeError::Json { .. } | DecodeError::NotAnObject { .. } => DecodeStage::Unmarshal,
        }
    }
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Entity not found: {entity_type:?} with id {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Insert failed for {entity_type:?}: {reason}")]
    InsertFailed { entity_type: EntityType, reason: String },

    #[error("Update failed for {entity_type:?} with id {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Delete failed for {entity_type:?} with id {id}: {reason}")]
    DeleteFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Query failed: {reason}")]
    Query { reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    /// True when the store itself cannot be reached, as opposed to a single
    /// statement failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. } | StorageError::LockPoisoned)
    }
}

/// Validation errors for incoming payload rows.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Message bus errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Failed to connect to bus: {reason}")]
    Connect { reason: String },

    #[error("Fetch failed: {reason}")]
    Fetch { reason: String },

    #[error("Commit failed for {topic}[{partition}]@{offset}: {reason}")]
    Commit {
        topic: String,
        partition: i32,
        offset: i64,
        reason: String,
    },

    #[error("Consumer closed")]
    Closed,
}

/// Poison file errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PoisonError {
    #[error("Poison file I/O failed on {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to encode poisoned document: {reason}")]
    Encode { reason: String },
}

/// Master error type for all PokeSync errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Poison store error: {0}")]
    Poison(#[from] PoisonError),
}

/// Result type alias for PokeSync operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_stage() {
        let gz = DecodeError::Decompress {
            reason: "invalid gzip header".to_string(),
        };
        let json = DecodeError::Json {
            reason: "EOF while parsing".to_string(),
        };
        let shape = DecodeError::NotAnObject {
            found: "array".to_string(),
        };
        assert_eq!(gz.stage(), DecodeStage::Decompress);
        assert_eq!(json.stage(), DecodeStage::Unmarshal);
        assert_eq!(shape.stage(), DecodeStage::Unmarshal);
    }

    #[test]
    fn test_storage_error_unavailable() {
        assert!(StorageError::Unavailable {
            reason: "pool timed out".to_string()
        }
        .is_unavailable());
        assert!(StorageError::LockPoisoned.is_unavailable());
        assert!(!StorageError::Query {
            reason: "syntax".to_string()
        }
        .is_unavailable());
    }

    #[test]
    fn test_pipeline_error_from() {
        let err: PipelineError = ValidationError::RequiredFieldMissing {
            field: "user_id".to_string(),
        }
        .into();
        assert!(matches!(err, PipelineError::Validation(_)));
        assert_eq!(
            err.to_string(),
            "Validation error: Required field missing: user_id"
        );
    }
}
