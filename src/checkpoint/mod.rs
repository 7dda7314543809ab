//! Per-feature checkpoint records.
//!
//! A checkpoint tracks which phases a feature has completed, where to
//! resume from, and its position in the review lifecycle. The status moves
//! `new -> phase_complete -> ready_for_review -> approved` in that order
//! only; `approved` is reachable solely through an explicit approval call,
//! and `validation_failed` is cleared only by a fresh run.

mod manager;

pub use manager::{FeatureManager, FeatureOptions, FeatureRunResult};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::errors::{CheckpointError, StoreError};

/// Lifecycle status of a feature checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointStatus {
    #[default]
    New,
    PhaseComplete,
    ValidationFailed,
    ReadyForReview,
    Approved,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckpointStatus::New => "new",
            CheckpointStatus::PhaseComplete => "phase_complete",
            CheckpointStatus::ValidationFailed => "validation_failed",
            CheckpointStatus::ReadyForReview => "ready_for_review",
            CheckpointStatus::Approved => "approved",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::ValidationFailed)
    }

    /// Whether a transition to `next` is legal.
    pub fn can_transition_to(&self, next: CheckpointStatus) -> bool {
        use CheckpointStatus::*;
        match (*self, next) {
            // Any non-approved feature can be (re-)run to phase_complete
            (New | PhaseComplete | ValidationFailed | ReadyForReview, PhaseComplete) => true,
            (PhaseComplete, ReadyForReview | ValidationFailed) => true,
            (ReadyForReview, Approved) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for CheckpointStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Severity of one artifact validation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// One artifact validation check result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationCheck {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

/// The full validation gate outcome recorded on the checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub checks: Vec<ValidationCheck>,
    pub passed: bool,
}

impl ValidationOutcome {
    pub fn from_checks(checks: Vec<ValidationCheck>) -> Self {
        let passed = checks.iter().all(|c| c.status != CheckStatus::Fail);
        Self { checks, passed }
    }
}

/// Persisted per-feature progress record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub feature: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Completion time per phase id
    #[serde(default)]
    pub phases: BTreeMap<String, DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_phase: Option<String>,
    #[serde(default)]
    pub status: CheckpointStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
}

impl Checkpoint {
    pub fn new(feature: &str) -> Self {
        let now = Utc::now();
        Self {
            feature: feature.to_string(),
            created_at: now,
            updated_at: now,
            phases: BTreeMap::new(),
            last_phase: None,
            status: CheckpointStatus::New,
            validation: None,
            review_notes: None,
            approved_at: None,
        }
    }

    /// Record a phase completion and advance the resume pointer.
    pub fn record_phase(&mut self, phase_id: &str) {
        self.phases.insert(phase_id.to_string(), Utc::now());
        self.last_phase = Some(phase_id.to_string());
        self.updated_at = Utc::now();
    }

    /// Move to a new status, enforcing the lifecycle order.
    pub fn set_status(&mut self, next: CheckpointStatus) -> Result<(), CheckpointError> {
        if !self.status.can_transition_to(next) {
            return Err(CheckpointError::InvalidTransition {
                feature: self.feature.clone(),
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }
        self.status = next;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Stores checkpoints as one JSON file per feature under a directory.
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, feature: &str) -> PathBuf {
        self.dir.join(format!("{feature}.json"))
    }

    pub fn exists(&self, feature: &str) -> bool {
        self.path_for(feature).exists()
    }

    pub fn load(&self, feature: &str) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(feature);
        if !path.exists() {
            return Err(CheckpointError::NotFound {
                feature: feature.to_string(),
            });
        }
        let content = std::fs::read_to_string(&path).map_err(|source| StoreError::Io {
            path: path.clone(),
            source,
        })?;
        let checkpoint =
            serde_json::from_str(&content).map_err(|source| StoreError::Parse { path, source })?;
        Ok(checkpoint)
    }

    pub fn load_or_create(&self, feature: &str) -> Result<Checkpoint, CheckpointError> {
        match self.load(feature) {
            Ok(checkpoint) => Ok(checkpoint),
            Err(CheckpointError::NotFound { .. }) => Ok(Checkpoint::new(feature)),
            Err(other) => Err(other),
        }
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        std::fs::create_dir_all(&self.dir).map_err(|source| StoreError::Io {
            path: self.dir.clone(),
            source,
        })?;
        let path = self.path_for(&checkpoint.feature);
        let json = serde_json::to_string_pretty(checkpoint).map_err(|source| StoreError::Parse {
            path: path.clone(),
            source,
        })?;
        std::fs::write(&path, json).map_err(|source| StoreError::Io { path, source })?;
        Ok(())
    }
}
