//! Error types for ROSTER operations
//!
//! Every error is `Clone`: a single failed backing-store load is handed to
//! every caller that was waiting on it.

use thiserror::Error;

/// Backing store errors.
///
/// The cache layer never interprets these beyond "did not commit"; they are
/// propagated to callers verbatim and never cached.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity} not found with id {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error("A project role named '{name}' already exists")]
    DuplicateRoleName { name: String },

    #[error("Backing store failure: {reason}")]
    Backend { reason: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout {
        operation: &'static str,
        timeout_ms: u64,
    },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Errors from actor-set manipulation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActorError {
    #[error("Role actor {actor_type}:{parameter} does not exist in the set")]
    RoleActorDoesNotExist {
        actor_type: String,
        parameter: String,
    },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all ROSTER errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RosterError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Actor error: {0}")]
    Actor(#[from] ActorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl RosterError {
    /// Shorthand for an opaque backing store failure.
    pub fn backend(reason: impl Into<String>) -> Self {
        RosterError::Storage(StorageError::Backend {
            reason: reason.into(),
        })
    }
}

/// Result type alias for ROSTER operations.
pub type RosterResult<T> = Result<T, RosterError>;

// =============================================================================
// TESTS
// =============================================================================
