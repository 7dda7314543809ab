//! Phase topology definition and JSON loading for the Conductor pipeline.
//!
//! This module provides:
//! - `InputRef` — a phase's declared input reference (none, one, or many)
//! - `PhaseSpec` — a single phase in the pipeline
//! - `Pipeline` — the fixed, ordered phase list with referential validation
//! - `PipelineFile` — JSON-based custom topology loading
//! - The default seven-phase pipeline as a fallback

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Declared input reference of a phase.
///
/// Resolved against completed phase outputs by a single exhaustive match;
/// there is no runtime type inspection anywhere downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "phases", rename_all = "snake_case")]
pub enum InputRef {
    /// The phase consumes nothing (the pipeline entry point).
    #[default]
    None,
    /// The phase consumes exactly one prior phase's output.
    Single(String),
    /// The phase consumes several prior outputs, in declared order.
    Many(Vec<String>),
}

impl InputRef {
    /// The phase ids this reference depends on, in declared order.
    pub fn dependencies(&self) -> Vec<&str> {
        match self {
            InputRef::None => Vec::new(),
            InputRef::Single(id) => vec![id.as_str()],
            InputRef::Many(ids) => ids.iter().map(String::as_str).collect(),
        }
    }
}

/// A single phase in the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseSpec {
    /// Phase id (e.g. "functional", "technical")
    pub id: String,
    /// Name of the agent responsible for this phase
    pub agent: String,
    /// Declared input reference
    #[serde(default)]
    pub input: InputRef,
}

impl PhaseSpec {
    pub fn new(id: &str, agent: &str, input: InputRef) -> Self {
        Self {
            id: id.to_string(),
            agent: agent.to_string(),
            input,
        }
    }
}

/// The fixed, ordered phase list. The list is configuration, not discovered
/// at runtime; construction validates that ids are unique and every input
/// reference points at an earlier phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pipeline {
    phases: Vec<PhaseSpec>,
}

impl Pipeline {
    pub fn new(phases: Vec<PhaseSpec>) -> Result<Self> {
        let mut seen: HashSet<&str> = HashSet::new();
        for spec in &phases {
            if !seen.insert(spec.id.as_str()) {
                bail!("Duplicate phase id '{}' in pipeline", spec.id);
            }
            for dep in spec.input.dependencies() {
                if !seen.contains(dep) {
                    bail!(
                        "Phase '{}' references input '{}' which is not declared earlier in the pipeline",
                        spec.id,
                        dep
                    );
                }
            }
        }
        Ok(Self { phases })
    }

    pub fn phases(&self) -> &[PhaseSpec] {
        &self.phases
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.phases.iter().map(|p| p.id.as_str())
    }

    pub fn get(&self, id: &str) -> Option<&PhaseSpec> {
        self.phases.iter().find(|p| p.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.phases.iter().position(|p| p.id == id)
    }

    pub fn first_id(&self) -> Option<&str> {
        self.phases.first().map(|p| p.id.as_str())
    }

    /// Get the contiguous suffix of phases starting at `start`, in declared
    /// order. Errors if `start` is not a declared phase.
    pub fn phases_from(&self, start: &str) -> Result<&[PhaseSpec]> {
        let pos = self
            .position(start)
            .with_context(|| format!("Unknown start phase '{start}'"))?;
        Ok(&self.phases[pos..])
    }

    /// Phase ids at or after `start` in declared order (the downstream set).
    pub fn downstream_ids(&self, start: &str) -> Result<Vec<String>> {
        Ok(self
            .phases_from(start)?
            .iter()
            .map(|p| p.id.clone())
            .collect())
    }
}

/// Represents a pipeline topology file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineFile {
    /// Optional human-readable name for the topology
    #[serde(default)]
    pub name: Option<String>,
    /// Ordered list of phases
    pub phases: Vec<PhaseSpec>,
}

impl PipelineFile {
    /// Load a topology from a JSON file and validate its references.
    pub fn load(path: &Path) -> Result<Pipeline> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;

        let file: PipelineFile = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline JSON: {}", path.display()))?;

        Pipeline::new(file.phases)
            .with_context(|| format!("Invalid pipeline topology in {}", path.display()))
    }

    /// Save a topology to a JSON file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize pipeline to JSON")?;

        std::fs::write(path, content)
            .with_context(|| format!("Failed to write pipeline file: {}", path.display()))?;

        Ok(())
    }
}

/// The default content-generation pipeline.
///
/// Implementation consumes both the technical and the test specs; every
/// other phase consumes at most one predecessor.
pub fn default_pipeline() -> Pipeline {
    Pipeline::new(vec![
        PhaseSpec::new("functional", "functional-analyst", InputRef::None),
        PhaseSpec::new(
            "technical",
            "technical-architect",
            InputRef::Single("functional".into()),
        ),
        PhaseSpec::new(
            "testing",
            "test-designer",
            InputRef::Single("technical".into()),
        ),
        PhaseSpec::new(
            "implementation",
            "implementer",
            InputRef::Many(vec!["technical".into(), "testing".into()]),
        ),
        PhaseSpec::new(
            "review",
            "reviewer",
            InputRef::Single("implementation".into()),
        ),
        PhaseSpec::new(
            "documentation",
            "doc-writer",
            InputRef::Single("implementation".into()),
        ),
        PhaseSpec::new(
            "deployment",
            "release-engineer",
            InputRef::Single("implementation".into()),
        ),
    ])
    .expect("default pipeline topology is valid")
}

/// Try to load a topology from a file, falling back to the default pipeline.
pub fn load_pipeline_or_default(pipeline_file: Option<&Path>) -> Result<Pipeline> {
    match pipeline_file {
        Some(path) if path.exists() => PipelineFile::load(path),
        _ => Ok(default_pipeline()),
    }
}
