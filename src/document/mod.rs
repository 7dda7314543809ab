//! The shared versioned run document.
//!
//! A `Document` is the single source of truth for one requirement/feature
//! run: per-phase status and outputs, derived KPIs, an append-only execution
//! log, and learned-pattern records. Downstream phases may read a phase's
//! output only once its status is `completed`; reading anything else is a
//! hard error, never a silent default.

pub mod store;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::knowledge::{PatternRecord, StrategyRecord};
use crate::phase::{InputRef, Pipeline};

/// Status of a single phase slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    #[default]
    Pending,
    Completed,
    Failed,
}

impl PhaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseStatus::Pending => "pending",
            PhaseStatus::Completed => "completed",
            PhaseStatus::Failed => "failed",
        }
    }
}

impl std::fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Overall status of the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    InProgress,
    Completed,
    Failed,
}

/// One recorded error on a phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// The per-phase status/output/error envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PhaseRecord {
    #[serde(default)]
    pub status: PhaseStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default)]
    pub input: InputRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<PhaseErrorRecord>,
}

/// One append-only execution log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub event: String,
    pub message: String,
}

/// Orchestration-level KPI summary, computed at pipeline end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct OrchestrationKpis {
    pub total_duration_ms: u64,
    pub attempts_per_agent: BTreeMap<String, u32>,
    pub tokens_used: u64,
}

/// Per-phase timings and counts plus the orchestration summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct KpiBlock {
    /// Wall-clock duration per phase, in milliseconds.
    #[serde(default)]
    pub timings: BTreeMap<String, u64>,
    /// Derived section counts per phase (e.g. requirements extracted).
    #[serde(default)]
    pub counts: BTreeMap<String, BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orchestration: Option<OrchestrationKpis>,
}

/// Document identity and lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub id: Uuid,
    pub name: String,
    pub version: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub status: DocumentStatus,
    /// SHA-256 of the requirement source the run was seeded from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requirement_hash: Option<String>,
}

/// Input resolved against completed phase outputs, handed to a producer.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedInput {
    None,
    Single(Value),
    Many(Vec<Value>),
}

/// The shared versioned document for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub metadata: DocumentMetadata,
    pub phases: BTreeMap<String, PhaseRecord>,
    #[serde(default)]
    pub kpis: KpiBlock,
    #[serde(default)]
    pub execution_log: Vec<LogEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub strategies: Vec<StrategyRecord>,
    #[serde(default)]
    pub completed_phases: u32,
    #[serde(default)]
    pub failed_phases: u32,
}

impl Document {
    /// Build an empty document with every declared phase slot pending and
    /// no KPI data.
    pub fn new(name: &str, topology: &Pipeline, requirement_hash: Option<String>) -> Self {
        let now = Utc::now();
        let phases = topology
            .phases()
            .iter()
            .map(|spec| {
                (
                    spec.id.clone(),
                    PhaseRecord {
                        input: spec.input.clone(),
                        ..PhaseRecord::default()
                    },
                )
            })
            .collect();

        Self {
            metadata: DocumentMetadata {
                id: Uuid::new_v4(),
                name: name.to_string(),
                version: 1,
                created_at: now,
                updated_at: now,
                status: DocumentStatus::InProgress,
                requirement_hash,
            },
            phases,
            kpis: KpiBlock::default(),
            execution_log: Vec::new(),
            patterns: Vec::new(),
            strategies: Vec::new(),
            completed_phases: 0,
            failed_phases: 0,
        }
    }

    pub fn phase(&self, id: &str) -> Option<&PhaseRecord> {
        self.phases.get(id)
    }

    /// Read a phase's output. Available only once the phase is completed;
    /// any other status is a hard error naming the phase and its status.
    pub fn phase_output(&self, id: &str) -> Result<&Value, PipelineError> {
        let record = self
            .phases
            .get(id)
            .ok_or_else(|| PipelineError::MissingDependency {
                phase: id.to_string(),
                status: "undeclared".to_string(),
                required_by: None,
            })?;

        match (record.status, record.output.as_ref()) {
            (PhaseStatus::Completed, Some(output)) => Ok(output),
            (status, _) => Err(PipelineError::MissingDependency {
                phase: id.to_string(),
                status: status.to_string(),
                required_by: None,
            }),
        }
    }

    /// Resolve a declared input reference into the corresponding completed
    /// outputs, in declared order.
    pub fn resolve_input(
        &self,
        input: &InputRef,
        for_phase: &str,
    ) -> Result<ResolvedInput, PipelineError> {
        let tag_consumer = |err: PipelineError| match err {
            PipelineError::MissingDependency { phase, status, .. } => {
                PipelineError::MissingDependency {
                    phase,
                    status,
                    required_by: Some(for_phase.to_string()),
                }
            }
            other => other,
        };

        match input {
            InputRef::None => Ok(ResolvedInput::None),
            InputRef::Single(id) => Ok(ResolvedInput::Single(
                self.phase_output(id).map_err(tag_consumer)?.clone(),
            )),
            InputRef::Many(ids) => {
                let mut outputs = Vec::with_capacity(ids.len());
                for id in ids {
                    outputs.push(self.phase_output(id).map_err(tag_consumer)?.clone());
                }
                Ok(ResolvedInput::Many(outputs))
            }
        }
    }

    /// Mark a phase completed: stamp the timestamp, store the output, clear
    /// prior errors, bump the completed-phase counter.
    pub fn update_phase(&mut self, id: &str, output: Value, agent: &str) {
        let record = self.phases.entry(id.to_string()).or_default();
        record.status = PhaseStatus::Completed;
        record.timestamp = Some(Utc::now());
        record.agent = Some(agent.to_string());
        record.output = Some(output);
        record.errors.clear();
        self.completed_phases += 1;
        self.touch();
    }

    /// Mark a phase failed: append the error, bump the failed-phase counter,
    /// and mark the whole document failed.
    pub fn mark_phase_error(&mut self, id: &str, message: &str, agent: &str) {
        let record = self.phases.entry(id.to_string()).or_default();
        record.status = PhaseStatus::Failed;
        record.timestamp = Some(Utc::now());
        record.agent = Some(agent.to_string());
        record.errors.push(PhaseErrorRecord {
            timestamp: Utc::now(),
            message: message.to_string(),
        });
        self.failed_phases += 1;
        self.metadata.status = DocumentStatus::Failed;
        self.touch();
    }

    /// Append an execution log entry.
    pub fn log(&mut self, agent: &str, event: &str, message: &str) {
        self.execution_log.push(LogEntry {
            timestamp: Utc::now(),
            agent: agent.to_string(),
            event: event.to_string(),
            message: message.to_string(),
        });
    }

    /// Live (completed, failed, pending) counts derived from phase records.
    pub fn status_counts(&self) -> (usize, usize, usize) {
        let mut completed = 0;
        let mut failed = 0;
        let mut pending = 0;
        for record in self.phases.values() {
            match record.status {
                PhaseStatus::Completed => completed += 1,
                PhaseStatus::Failed => failed += 1,
                PhaseStatus::Pending => pending += 1,
            }
        }
        (completed, failed, pending)
    }

    fn touch(&mut self) {
        self.metadata.updated_at = Utc::now();
    }
}

/// Which sections a reset clears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetSelection {
    /// Clear every section.
    All,
    /// Clear the named phase and everything after it in declared order.
    Downstream(String),
    /// Clear exactly the named sections.
    Named(Vec<String>),
}

impl std::str::FromStr for ResetSelection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            anyhow::bail!("Empty reset selection");
        }
        if s.eq_ignore_ascii_case("all") {
            return Ok(ResetSelection::All);
        }
        if let Some(phase) = s.strip_prefix("downstream:") {
            if phase.trim().is_empty() {
                anyhow::bail!("downstream reset requires a phase id, e.g. downstream:technical");
            }
            return Ok(ResetSelection::Downstream(phase.trim().to_string()));
        }
        Ok(ResetSelection::Named(
            s.split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect(),
        ))
    }
}

/// Null exactly the selected sections (status back to pending; output,
/// agent, timestamp, and errors cleared), bump the document's last-modified
/// timestamp, and touch nothing else. Returns the ids actually cleared.
pub fn reset_sections(
    doc: &mut Document,
    topology: &Pipeline,
    selection: &ResetSelection,
) -> anyhow::Result<Vec<String>> {
    let targets: Vec<String> = match selection {
        ResetSelection::All => topology.ids().map(String::from).collect(),
        ResetSelection::Downstream(start) => topology.downstream_ids(start)?,
        ResetSelection::Named(names) => {
            for name in names {
                if !topology.contains(name) {
                    anyhow::bail!("Unknown section '{name}' in reset selection");
                }
            }
            names.clone()
        }
    };

    let mut cleared = Vec::new();
    for id in &targets {
        if let Some(record) = doc.phases.get_mut(id) {
            record.status = PhaseStatus::Pending;
            record.timestamp = None;
            record.agent = None;
            record.output = None;
            record.errors.clear();
            cleared.push(id.clone());
        }
    }
    doc.metadata.updated_at = Utc::now();
    Ok(cleared)
}
