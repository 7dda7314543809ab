//! Full pipeline run: `conductor run`.

use anyhow::{Context, Result, bail};
use console::style;
use sha2::{Digest, Sha256};
use std::path::Path;

use conductor::config::Config;
use conductor::document::store::FileRepository;
use conductor::executor::{ExecutorOptions, PhaseExecutor};
use conductor::phase::load_pipeline_or_default;
use conductor::producers::default_registry;

pub(crate) fn hash_requirement(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub(crate) fn read_requirement(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read requirement source: {}", path.display()))
}

pub async fn cmd_run(config: &Config, requirement_path: &Path, clean_artifacts: bool) -> Result<()> {
    config.ensure_directories()?;

    let requirement = read_requirement(requirement_path)?;
    let requirement_hash = hash_requirement(&requirement);

    if clean_artifacts && config.artifact_dir.exists() {
        std::fs::remove_dir_all(&config.artifact_dir)
            .context("Failed to clean artifact directory")?;
        std::fs::create_dir_all(&config.artifact_dir)
            .context("Failed to recreate artifact directory")?;
        println!("Cleaned {}", config.artifact_dir.display());
    }

    let pipeline = load_pipeline_or_default(config.pipeline_file.as_deref())?;
    let repo = FileRepository::new(&config.document_path);
    let doc = repo.load_or_create(
        &config.project_name,
        &pipeline,
        Some(requirement_hash.clone()),
    )?;

    if let Some(existing) = &doc.metadata.requirement_hash
        && existing != &requirement_hash
    {
        tracing::warn!("requirement source changed since the document was created");
        println!(
            "{} requirement source changed since this document was created",
            style("warning:").yellow().bold()
        );
    }

    let registry = default_registry(&requirement, &config.artifact_dir, super::retry_config(config));
    let options = ExecutorOptions {
        continue_on_error: config.continue_on_error,
        report: config.report,
        report_dir: config.report_dir.clone(),
        artifact_dir: config.artifact_dir.clone(),
        show_progress: true,
    };

    println!(
        "Running {} phase(s) against {}",
        pipeline.phases().len(),
        config.document_path.display()
    );

    let executor = PhaseExecutor::new(&repo, &pipeline, &registry, options);
    match executor.run().await {
        Ok(summary) => {
            super::print_summary(&summary);
            if !summary.all_success() {
                bail!("Pipeline completed with {} failed phase(s)", summary.failed);
            }
            println!("{}", style("Pipeline completed").green().bold());
            Ok(())
        }
        Err(err) => {
            // The document on disk carries the failed phase and its errors
            println!(
                "{} {}",
                style("Pipeline aborted:").red().bold(),
                err
            );
            Err(err.into())
        }
    }
}
