//! Error types for HOPE population engine operations

use crate::identity::EntityId;
use thiserror::Error;

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: EntityId },

    #[error("Insert failed for {entity}: {reason}")]
    InsertFailed { entity: &'static str, reason: String },

    #[error("Update failed for {entity} with id {id}: {reason}")]
    UpdateFailed {
        entity: &'static str,
        id: EntityId,
        reason: String,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors, surfaced before any persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Constraint violation on {constraint}: {reason}")]
    ConstraintViolation { constraint: String, reason: String },

    #[error("Invalid status transition for import {rdi_id}: {from} -> {to}")]
    InvalidStatusTransition {
        rdi_id: EntityId,
        from: String,
        to: String,
    },
}

/// Collision detection errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollisionError {
    /// More than one canonical household shares the identification key.
    /// This is a data-integrity failure requiring operator intervention,
    /// never silently resolved.
    #[error(
        "Ambiguous collision for identification key {key}: {} canonical candidates {candidate_ids:?}",
        .candidate_ids.len()
    )]
    AmbiguousMatch {
        key: String,
        candidate_ids: Vec<EntityId>,
    },
}

/// Deduplication engine errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeduplicationError {
    #[error("Deduplication threshold exceeded: {message}")]
    ThresholdExceeded { message: String },

    #[error("Biometric provider unavailable: {reason}")]
    ProviderUnavailable { reason: String },
}

/// Merge task errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MergeError {
    #[error("Import {rdi_id} is not ready to merge (status {status})")]
    NotReady { rdi_id: EntityId, status: String },

    #[error("Merge of import {rdi_id} failed: {reason}")]
    Failed { rdi_id: EntityId, reason: String },
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

/// Master error type for all engine errors.
#[derive(Debug, Clone, Error)]
pub enum HopeError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Collision error: {0}")]
    Collision(#[from] CollisionError),

    #[error("Deduplication error: {0}")]
    Deduplication(#[from] DeduplicationError),

    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for engine operations.
pub type HopeResult<T> = Result<T, HopeError>;

// =============================================================================
// TESTS
// =============================================================================
