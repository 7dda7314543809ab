//! Typed error hierarchy for the Conductor pipeline core.
//!
//! Three top-level enums cover the three subsystems:
//! - `StoreError` — document/checkpoint file failures, always fatal
//! - `PipelineError` — per-phase execution failures, recoverable only via
//!   the continue-on-error policy
//! - `CheckpointError` — feature checkpoint lifecycle failures

use thiserror::Error;

/// Errors from reading or writing persisted state. Never downgraded to a
/// warning; these always propagate to the caller.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed content in {path}: {source}")]
    Parse {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Errors from executing a single pipeline phase.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Phase '{phase}' is {status}, not completed; its output is unavailable")]
    MissingDependency {
        phase: String,
        status: String,
        /// The phase whose input resolution triggered the read, if any.
        required_by: Option<String>,
    },

    #[error("Section '{phase}' failed validation: {}", .reasons.join("; "))]
    Validation { phase: String, reasons: Vec<String> },

    #[error("Producer '{agent}' failed in phase '{phase}': {message}")]
    Producer {
        phase: String,
        agent: String,
        message: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PipelineError {
    /// Store failures abort the pipeline regardless of the failure policy.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

/// Errors from the feature checkpoint lifecycle.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("No checkpoint found for feature '{feature}'")]
    NotFound { feature: String },

    #[error("Checkpoint for '{feature}' cannot move from {from} to {to}")]
    InvalidTransition {
        feature: String,
        from: String,
        to: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}
