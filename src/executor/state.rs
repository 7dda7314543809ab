//! Execution state tracking for the pipeline runner.
//!
//! This module provides types for tracking the result of a pipeline run,
//! including individual phase outcomes and the overall summary.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Overall state of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    /// Run is ready but not started
    #[default]
    Idle,
    /// Run is currently executing phases
    Running,
    /// Run completed with every phase successful
    Completed,
    /// Run ended with one or more failed phases
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Result of executing a single phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseOutcome {
    /// Phase id
    pub phase: String,
    /// Agent that ran the phase
    pub agent: String,
    /// Whether the phase completed successfully
    pub success: bool,
    /// Error message if the phase failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall-clock duration of the phase
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

impl PhaseOutcome {
    pub fn success(phase: &str, agent: &str, duration: Duration) -> Self {
        Self {
            phase: phase.to_string(),
            agent: agent.to_string(),
            success: true,
            error: None,
            duration,
        }
    }

    pub fn failure(phase: &str, agent: &str, error: &str, duration: Duration) -> Self {
        Self {
            phase: phase.to_string(),
            agent: agent.to_string(),
            success: false,
            error: Some(error.to_string()),
            duration,
        }
    }
}

/// Summary of a pipeline run over a phase subset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSummary {
    /// Phases in the executed subset
    pub total_phases: usize,
    /// Phases that completed successfully
    pub completed: usize,
    /// Phases that failed
    pub failed: usize,
    /// Total execution time
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Per-phase outcomes, in execution order
    #[serde(default)]
    pub outcomes: Vec<PhaseOutcome>,
}

impl PipelineSummary {
    pub fn new(total_phases: usize) -> Self {
        Self {
            total_phases,
            ..Default::default()
        }
    }

    pub fn add_outcome(&mut self, outcome: PhaseOutcome) {
        if outcome.success {
            self.completed += 1;
        } else {
            self.failed += 1;
        }
        self.outcomes.push(outcome);
    }

    /// Phases in the subset never reached (abort before execution).
    pub fn pending(&self) -> usize {
        self.total_phases - self.completed - self.failed
    }

    pub fn all_success(&self) -> bool {
        self.failed == 0 && self.completed == self.total_phases
    }

    pub fn state(&self) -> PipelineState {
        if self.all_success() {
            PipelineState::Completed
        } else {
            PipelineState::Failed
        }
    }
}

/// Tracks execution timing.
pub struct ExecutionTimer {
    start: Instant,
}

impl ExecutionTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Serde helpers for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_millis().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
