//! Layered configuration for Conductor.
//!
//! Settings come from `conductor.toml` in the project directory, overridden
//! by environment variables, overridden by CLI flags (applied by the
//! command layer onto the public fields).
//!
//! # Configuration File Format
//!
//! ```toml
//! [project]
//! name = "my-feature"
//!
//! [pipeline]
//! document = ".conductor/document.json"
//! artifact_dir = "artifacts"
//! continue_on_error = false
//!
//! [retry]
//! max_iterations = 5
//! retry_delay_ms = 1000
//!
//! [reports]
//! enabled = false
//! dir = "reports"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// The name of the global conductor directory in the user's home.
pub const GLOBAL_CONDUCTOR_DIR: &str = ".conductor";

/// Environment override for the checkpoint directory.
pub const ENV_CHECKPOINT_DIR: &str = "CONDUCTOR_CHECKPOINT_DIR";

/// Environment override for the report directory.
pub const ENV_REPORT_DIR: &str = "CONDUCTOR_REPORT_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name (defaults to the directory name)
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Path of the run document, relative to the project directory
    #[serde(default = "default_document")]
    pub document: PathBuf,
    /// Optional custom topology file
    #[serde(default)]
    pub pipeline_file: Option<PathBuf>,
    /// Directory producers write artifacts under
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Record failures and keep going instead of aborting
    #[serde(default)]
    pub continue_on_error: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            document: default_document(),
            pipeline_file: None,
            artifact_dir: default_artifact_dir(),
            continue_on_error: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_report_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: default_report_dir(),
        }
    }
}

fn default_document() -> PathBuf {
    PathBuf::from(".conductor/document.json")
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifacts")
}

fn default_max_iterations() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// The raw `conductor.toml` contents.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConductorToml {
    #[serde(default)]
    pub project: ProjectConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

impl ConductorToml {
    /// Load `conductor.toml` from the project directory, or defaults when
    /// the file does not exist.
    pub fn load(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join("conductor.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// Resolved runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub project_dir: PathBuf,
    pub project_name: String,
    pub document_path: PathBuf,
    pub pipeline_file: Option<PathBuf>,
    pub artifact_dir: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub report_dir: PathBuf,
    pub report: bool,
    pub continue_on_error: bool,
    pub max_iterations: u32,
    pub retry_delay_ms: u64,
    pub verbose: bool,
}

impl Config {
    /// Resolve configuration for a project directory: file, then
    /// environment, then whatever CLI overrides the command layer applies
    /// onto the public fields afterwards.
    pub fn new(project_dir: PathBuf, verbose: bool) -> Result<Self> {
        let project_dir = project_dir
            .canonicalize()
            .context("Failed to resolve project directory")?;
        let file = ConductorToml::load(&project_dir)?;

        let project_name = file.project.name.clone().unwrap_or_else(|| {
            project_dir
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "project".to_string())
        });

        let checkpoint_dir = std::env::var_os(ENV_CHECKPOINT_DIR)
            .map(PathBuf::from)
            .or_else(|| dirs::home_dir().map(|h| h.join(GLOBAL_CONDUCTOR_DIR).join("checkpoints")))
            .unwrap_or_else(|| project_dir.join(GLOBAL_CONDUCTOR_DIR).join("checkpoints"));

        let report_dir = std::env::var_os(ENV_REPORT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| resolve(&project_dir, &file.reports.dir));

        Ok(Self {
            document_path: resolve(&project_dir, &file.pipeline.document),
            pipeline_file: file
                .pipeline
                .pipeline_file
                .as_ref()
                .map(|p| resolve(&project_dir, p)),
            artifact_dir: resolve(&project_dir, &file.pipeline.artifact_dir),
            checkpoint_dir,
            report_dir,
            report: file.reports.enabled,
            continue_on_error: file.pipeline.continue_on_error,
            max_iterations: file.retry.max_iterations,
            retry_delay_ms: file.retry.retry_delay_ms,
            project_name,
            project_dir,
            verbose,
        })
    }

    pub fn ensure_directories(&self) -> Result<()> {
        if let Some(parent) = self.document_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create document directory")?;
        }
        std::fs::create_dir_all(&self.artifact_dir)
            .context("Failed to create artifact directory")?;
        Ok(())
    }
}

fn resolve(project_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}
