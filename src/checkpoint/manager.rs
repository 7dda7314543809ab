//! Incremental resume and the review gate.
//!
//! `run_feature` drives the pipeline executor over the phase subset a
//! feature needs: a full run for a new feature, or a downstream reset plus
//! partial re-run when resuming from a later phase. The delegation is a
//! direct in-process call; the caller is suspended until the subset
//! finishes. On success the checkpoint advances to `phase_complete`, and
//! the optional validation gate decides between `ready_for_review` and
//! `validation_failed`.

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde_json::Value;
use std::path::PathBuf;
use walkdir::WalkDir;

use crate::checkpoint::{
    CheckStatus, Checkpoint, CheckpointStatus, CheckpointStore, ValidationCheck, ValidationOutcome,
};
use crate::document::store::DocumentRepository;
use crate::document::{Document, ResetSelection, reset_sections};
use crate::errors::CheckpointError;
use crate::executor::{ExecutorOptions, PhaseExecutor, PipelineSummary, ProducerRegistry};
use crate::phase::Pipeline;

/// Options for one feature run.
#[derive(Debug, Clone, Default)]
pub struct FeatureOptions {
    /// Resume from this phase; earlier sections are kept, this one and
    /// everything after it are cleared first.
    pub start_phase: Option<String>,
    /// Run the artifact validation gate after a successful subset run.
    pub validate: bool,
    /// Resolve and log only; execute nothing and mutate nothing.
    pub dry_run: bool,
}

/// What a feature run did.
#[derive(Debug)]
pub struct FeatureRunResult {
    pub checkpoint: Checkpoint,
    /// Present unless the run was a dry run
    pub summary: Option<PipelineSummary>,
    /// Phase ids that were (or would be) executed
    pub executed: Vec<String>,
    pub dry_run: bool,
}

/// Drives checkpointed feature runs and the approval lifecycle.
pub struct FeatureManager<'a> {
    store: CheckpointStore,
    repo: &'a dyn DocumentRepository,
    topology: &'a Pipeline,
    producers: &'a ProducerRegistry,
    executor_options: ExecutorOptions,
}

impl<'a> FeatureManager<'a> {
    pub fn new(
        checkpoint_dir: impl Into<PathBuf>,
        repo: &'a dyn DocumentRepository,
        topology: &'a Pipeline,
        producers: &'a ProducerRegistry,
        executor_options: ExecutorOptions,
    ) -> Self {
        Self {
            store: CheckpointStore::new(checkpoint_dir),
            repo,
            topology,
            producers,
            executor_options,
        }
    }

    pub fn checkpoint_store(&self) -> &CheckpointStore {
        &self.store
    }

    /// Run (or resume) the pipeline for a feature.
    pub async fn run_feature(
        &self,
        feature: &str,
        options: &FeatureOptions,
    ) -> Result<FeatureRunResult> {
        let mut checkpoint = self.store.load_or_create(feature)?;
        if checkpoint.status == CheckpointStatus::Approved {
            bail!("Feature '{feature}' is already approved; start a new feature for further work");
        }

        let start = options
            .start_phase
            .as_deref()
            .or(self.topology.first_id())
            .context("pipeline has no phases")?;
        let subset = self.topology.phases_from(start)?;
        let executed: Vec<String> = subset.iter().map(|p| p.id.clone()).collect();
        let is_resume = Some(start) != self.topology.first_id();

        if options.dry_run {
            if is_resume {
                tracing::info!(
                    feature,
                    sections = ?executed,
                    "dry run: would reset downstream sections"
                );
            }
            for spec in subset {
                tracing::info!(feature, phase = %spec.id, agent = %spec.agent, "dry run: would execute");
            }
            return Ok(FeatureRunResult {
                checkpoint,
                summary: None,
                executed,
                dry_run: true,
            });
        }

        if is_resume {
            let mut doc = self.repo.load()?;
            let cleared = reset_sections(
                &mut doc,
                self.topology,
                &ResetSelection::Downstream(start.to_string()),
            )?;
            self.repo.save(&doc)?;
            tracing::info!(feature, ?cleared, "reset sections before resume");
        }

        let executor = PhaseExecutor::new(
            self.repo,
            self.topology,
            self.producers,
            self.executor_options.clone(),
        );
        let summary = executor
            .run_phases(subset)
            .await
            .with_context(|| format!("Feature '{feature}' pipeline run failed"))?;

        if !summary.all_success() {
            bail!(
                "Feature '{feature}' run ended with {} failed phase(s)",
                summary.failed
            );
        }

        for id in &executed {
            checkpoint.record_phase(id);
        }
        checkpoint.set_status(CheckpointStatus::PhaseComplete)?;
        self.store.save(&checkpoint)?;

        if options.validate {
            let doc = self.repo.load()?;
            let outcome = self.validate_artifacts(&doc);
            let next = if outcome.passed {
                CheckpointStatus::ReadyForReview
            } else {
                CheckpointStatus::ValidationFailed
            };
            checkpoint.validation = Some(outcome);
            checkpoint.set_status(next)?;
            self.store.save(&checkpoint)?;
        }

        Ok(FeatureRunResult {
            checkpoint,
            summary: Some(summary),
            executed,
            dry_run: false,
        })
    }

    /// The only path to the `approved` state. Requires an existing
    /// checkpoint in `ready_for_review`.
    pub fn approve_feature(
        &self,
        feature: &str,
        notes: Option<&str>,
    ) -> Result<Checkpoint, CheckpointError> {
        let mut checkpoint = self.store.load(feature)?;
        checkpoint.set_status(CheckpointStatus::Approved)?;
        checkpoint.review_notes = notes.map(str::to_string);
        checkpoint.approved_at = Some(Utc::now());
        self.store.save(&checkpoint)?;
        tracing::info!(feature, "feature approved");
        Ok(checkpoint)
    }

    /// Artifact-presence gate over the feature's expected outputs.
    fn validate_artifacts(&self, doc: &Document) -> ValidationOutcome {
        let artifact_dir = &self.executor_options.artifact_dir;
        let mut checks = Vec::new();

        // Generated files exist at all
        let file_count = WalkDir::new(artifact_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .count();
        checks.push(if file_count > 0 {
            check("artifact_files", CheckStatus::Pass, format!("{file_count} file(s) present"))
        } else {
            check(
                "artifact_files",
                CheckStatus::Fail,
                format!("no artifact files under {}", artifact_dir.display()),
            )
        });

        // The recorded deployment manifest structurally parses
        checks.push(manifest_check(doc));

        // A tests directory exists among the generated artifacts
        let tests_dir = artifact_dir.join("tests");
        checks.push(if tests_dir.is_dir() {
            check("tests_directory", CheckStatus::Pass, "tests directory present")
        } else {
            check("tests_directory", CheckStatus::Fail, "tests directory missing")
        });

        // A top-level description document exists
        checks.push(if artifact_dir.join("README.md").is_file() {
            check("description_document", CheckStatus::Pass, "README.md present")
        } else {
            check("description_document", CheckStatus::Warn, "README.md missing")
        });

        for c in &checks {
            match c.status {
                CheckStatus::Pass => tracing::debug!(check = %c.name, detail = %c.detail, "gate check passed"),
                CheckStatus::Warn => tracing::warn!(check = %c.name, detail = %c.detail, "gate check warning"),
                CheckStatus::Fail => tracing::error!(check = %c.name, detail = %c.detail, "gate check failed"),
            }
        }

        ValidationOutcome::from_checks(checks)
    }
}

fn check(name: &str, status: CheckStatus, detail: impl Into<String>) -> ValidationCheck {
    ValidationCheck {
        name: name.to_string(),
        status,
        detail: detail.into(),
    }
}

fn manifest_check(doc: &Document) -> ValidationCheck {
    let manifest = doc
        .phase("deployment")
        .and_then(|r| r.output.as_ref())
        .and_then(|o| o.get("manifests"))
        .and_then(Value::as_array)
        .and_then(|m| m.first());

    match manifest {
        None => check("manifest_parses", CheckStatus::Warn, "no deployment manifest recorded"),
        Some(entry) => {
            let content = entry.get("content").and_then(Value::as_str).unwrap_or("");
            match serde_json::from_str::<Value>(content) {
                Ok(_) => check("manifest_parses", CheckStatus::Pass, "manifest parses"),
                Err(err) => check(
                    "manifest_parses",
                    CheckStatus::Fail,
                    format!("manifest does not parse: {err}"),
                ),
            }
        }
    }
}
