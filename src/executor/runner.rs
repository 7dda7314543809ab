//! The sequential pipeline core.
//!
//! Runs an ordered, fixed list of phases against a shared document. Every
//! step is persisted through the injected repository: the started marker
//! before any work, the section write after the producer returns, and the
//! KPI capture after validation. A crash at any point leaves a resumable,
//! inspectable document behind.
//!
//! Failure policy: by default the first failed phase aborts the run. With
//! `continue_on_error`, the failure is recorded and the run moves on; any
//! later phase that depends on the failed one fails at input-resolution
//! time, so failures cascade explicitly instead of being papered over.

use async_trait::async_trait;
use indicatif::ProgressBar;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use crate::document::store::DocumentRepository;
use crate::document::{DocumentStatus, PhaseStatus, ResolvedInput};
use crate::errors::PipelineError;
use crate::executor::state::{ExecutionTimer, PhaseOutcome, PipelineSummary};
use crate::kpi;
use crate::kpi::report::KpiReporter;
use crate::phase::{PhaseSpec, Pipeline};
use crate::retry::TestFailure;
use crate::validate::validate_section;

/// The contract a phase producer implements.
///
/// Producers are external collaborators: the core treats `execute` as an
/// opaque async call and only requires that the returned section payload
/// validates. Producers may additionally write artifact files on disk.
#[async_trait]
pub trait Producer: Send + Sync {
    fn name(&self) -> &str;

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value>;

    /// Hook invoked by the implementation-test retry loop after a failed
    /// iteration so the producer can adjust before the next attempt.
    fn learn_from_failures(&self, _candidate: &Value, _failures: &[TestFailure], _spec: &Value) {}
}

/// Maps phase ids to their producers.
#[derive(Default)]
pub struct ProducerRegistry {
    producers: HashMap<String, Box<dyn Producer>>,
}

impl ProducerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, phase_id: &str, producer: Box<dyn Producer>) {
        self.producers.insert(phase_id.to_string(), producer);
    }

    pub fn get(&self, phase_id: &str) -> Option<&dyn Producer> {
        self.producers.get(phase_id).map(Box::as_ref)
    }
}

/// Configuration for the pipeline executor.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Record failures and keep going instead of aborting.
    pub continue_on_error: bool,
    /// Render the KPI report at pipeline end.
    pub report: bool,
    /// Directory for KPI reports.
    pub report_dir: PathBuf,
    /// Base directory producers write artifact files under.
    pub artifact_dir: PathBuf,
    /// Show a spinner per phase on the console.
    pub show_progress: bool,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            report: false,
            report_dir: PathBuf::from("reports"),
            artifact_dir: PathBuf::from("."),
            show_progress: false,
        }
    }
}

/// Sequential executor over a fixed phase list.
pub struct PhaseExecutor<'a> {
    repo: &'a dyn DocumentRepository,
    topology: &'a Pipeline,
    producers: &'a ProducerRegistry,
    options: ExecutorOptions,
}

impl<'a> PhaseExecutor<'a> {
    pub fn new(
        repo: &'a dyn DocumentRepository,
        topology: &'a Pipeline,
        producers: &'a ProducerRegistry,
        options: ExecutorOptions,
    ) -> Self {
        Self {
            repo,
            topology,
            producers,
            options,
        }
    }

    /// Run every phase in the topology, in declared order.
    pub async fn run(&self) -> Result<PipelineSummary, PipelineError> {
        self.run_phases(self.topology.phases()).await
    }

    /// Run a contiguous subset of the topology, in declared order. Phases
    /// never run concurrently; no phase starts before its predecessor's
    /// document write is persisted.
    pub async fn run_phases(&self, subset: &[PhaseSpec]) -> Result<PipelineSummary, PipelineError> {
        let timer = ExecutionTimer::start();
        let mut summary = PipelineSummary::new(subset.len());
        let mut abort: Option<PipelineError> = None;

        let spinner = self.options.show_progress.then(|| {
            let pb = ProgressBar::new_spinner();
            pb.enable_steady_tick(Duration::from_millis(120));
            pb
        });

        for spec in subset {
            if let Some(pb) = &spinner {
                pb.set_message(format!("{} [{}]", spec.id, spec.agent));
            }
            let (outcome, error) = self.execute_phase(spec).await?;
            let failed = !outcome.success;
            summary.add_outcome(outcome);
            if failed && !self.options.continue_on_error {
                abort = error;
                break;
            }
        }

        if let Some(pb) = &spinner {
            pb.finish_and_clear();
        }

        summary.duration = timer.elapsed();
        self.finalize(&summary)?;

        tracing::info!(
            completed = summary.completed,
            failed = summary.failed,
            pending = summary.pending(),
            total_ms = summary.duration.as_millis() as u64,
            "pipeline run finished"
        );

        match abort {
            Some(err) => Err(err),
            None => Ok(summary),
        }
    }

    /// Execute one phase. Returns the outcome plus, for a recoverable
    /// failure, the error that the abort policy may re-raise. Store
    /// failures propagate immediately.
    async fn execute_phase(
        &self,
        spec: &PhaseSpec,
    ) -> Result<(PhaseOutcome, Option<PipelineError>), PipelineError> {
        let timer = ExecutionTimer::start();
        tracing::info!(phase = %spec.id, agent = %spec.agent, "phase started");

        // Reload from storage: defends against process restart or external
        // mutation since the previous phase.
        let mut doc = self.repo.load()?;

        // Persist the started marker before doing any work.
        doc.log(&spec.agent, "started", &format!("phase '{}' started", spec.id));
        self.repo.save(&doc)?;

        // Resolve inputs and invoke the producer contract.
        let produced: Result<Value, PipelineError> = match doc.resolve_input(&spec.input, &spec.id)
        {
            Err(err) => Err(err),
            Ok(input) => match self.producers.get(&spec.id) {
                None => Err(PipelineError::Producer {
                    phase: spec.id.clone(),
                    agent: spec.agent.clone(),
                    message: "no producer registered for phase".to_string(),
                }),
                Some(producer) => producer
                    .execute(input)
                    .await
                    .map_err(|e| PipelineError::Producer {
                        phase: spec.id.clone(),
                        agent: spec.agent.clone(),
                        message: e.to_string(),
                    }),
            },
        };

        let result: Result<Value, PipelineError> = match produced {
            Ok(output) => {
                // Write the section and persist, then validate it.
                doc.update_phase(&spec.id, output.clone(), &spec.agent);
                self.repo.save(&doc)?;

                // Reload so validation sees exactly what a restarted process
                // would, including anything the producer persisted itself.
                doc = self.repo.load()?;
                let report = validate_section(&spec.id, &output);
                for warning in &report.warnings {
                    tracing::warn!(phase = %spec.id, %warning, "section validation warning");
                }
                if report.valid() {
                    Ok(output)
                } else {
                    Err(PipelineError::Validation {
                        phase: spec.id.clone(),
                        reasons: report.errors,
                    })
                }
            }
            Err(err) => Err(err),
        };

        let elapsed = timer.elapsed();
        match result {
            Ok(output) => {
                doc.kpis
                    .timings
                    .insert(spec.id.clone(), elapsed.as_millis() as u64);
                let counts = kpi::derive_counts(&spec.id, &output, &self.options.artifact_dir);
                doc.kpis.counts.insert(spec.id.clone(), counts);
                doc.log(
                    &spec.agent,
                    "completed",
                    &format!("phase '{}' completed in {}ms", spec.id, elapsed.as_millis()),
                );
                self.repo.save(&doc)?;

                tracing::info!(phase = %spec.id, ms = elapsed.as_millis() as u64, "phase completed");
                Ok((PhaseOutcome::success(&spec.id, &spec.agent, elapsed), None))
            }
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                let message = err.to_string();
                doc.mark_phase_error(&spec.id, &message, &spec.agent);
                doc.log(&spec.agent, "failed", &message);
                self.repo.save(&doc)?;

                tracing::error!(phase = %spec.id, error = %message, "phase failed");
                Ok((
                    PhaseOutcome::failure(&spec.id, &spec.agent, &message, elapsed),
                    Some(err),
                ))
            }
        }
    }

    /// Compute the orchestration KPI summary and settle the document-level
    /// status. Runs at pipeline end, on success and on abort alike.
    fn finalize(&self, summary: &PipelineSummary) -> Result<(), PipelineError> {
        let mut doc = self.repo.load()?;

        doc.kpis.orchestration = Some(kpi::aggregate_orchestration(
            &doc,
            summary.duration.as_millis() as u64,
        ));

        let all_completed = doc
            .phases
            .values()
            .all(|r| r.status == PhaseStatus::Completed);
        if all_completed {
            doc.metadata.status = DocumentStatus::Completed;
        }

        self.repo.save(&doc)?;

        if self.options.report {
            KpiReporter::new(&self.options.report_dir).write_reports(&doc)?;
        }
        Ok(())
    }
}
