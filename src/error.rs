//! Engine error taxonomy.
//!
//! One enum covers the whole crate. Errors that callers can act on
//! (`InvalidTransition`, `Unauthorized`, `StateConflict`) carry enough
//! context to render a precise message without a second lookup.

use uuid::Uuid;

use crate::workflow::WorkflowKind;

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A definition or setup problem: malformed state graph reference,
    /// missing required wizard sections, unknown framework code.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The requested action has no edge from the current state, or the
    /// instance is already in a terminal state.
    #[error("invalid transition for {kind} instance: no action '{action}' from state '{state}'")]
    InvalidTransition {
        kind: WorkflowKind,
        state: String,
        action: String,
    },

    /// The actor holds none of the roles the transition requires.
    #[error("actor '{actor}' is not authorized to perform '{action}'")]
    Unauthorized { actor: String, action: String },

    /// An exclusive workflow kind already has an active instance for the
    /// subject.
    #[error("an active {kind} workflow already exists for {subject_type} {subject_id}")]
    DuplicateActiveInstance {
        kind: WorkflowKind,
        subject_type: String,
        subject_id: Uuid,
    },

    /// Compare-and-set rejection: the record changed between read and
    /// write. The caller may re-read and retry.
    #[error("state changed concurrently: expected '{expected}', found '{actual}'")]
    StateConflict { expected: String, actual: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Persistence or collaborator failure.
    #[error("store error: {0}")]
    Store(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "database")]
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;
