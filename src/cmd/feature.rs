//! Checkpointed feature runs: `conductor feature run` and
//! `conductor feature approve`.

use anyhow::{Result, bail};
use console::style;
use dialoguer::Confirm;
use std::path::Path;

use conductor::checkpoint::{CheckpointStatus, FeatureManager, FeatureOptions};
use conductor::config::Config;
use conductor::document::store::FileRepository;
use conductor::executor::{ExecutorOptions, ProducerRegistry};
use conductor::phase::load_pipeline_or_default;
use conductor::producers::default_registry;

use super::run::{hash_requirement, read_requirement};

fn executor_options(config: &Config) -> ExecutorOptions {
    ExecutorOptions {
        continue_on_error: config.continue_on_error,
        report: config.report,
        report_dir: config.report_dir.clone(),
        artifact_dir: config.artifact_dir.clone(),
        show_progress: true,
    }
}

pub async fn cmd_feature_run(
    config: &Config,
    feature: &str,
    requirement_path: &Path,
    options: &FeatureOptions,
) -> Result<()> {
    config.ensure_directories()?;

    let requirement = read_requirement(requirement_path)?;
    let pipeline = load_pipeline_or_default(config.pipeline_file.as_deref())?;
    let repo = FileRepository::new(&config.document_path);
    repo.load_or_create(feature, &pipeline, Some(hash_requirement(&requirement)))?;

    let registry =
        default_registry(&requirement, &config.artifact_dir, super::retry_config(config));
    let manager = FeatureManager::new(
        &config.checkpoint_dir,
        &repo,
        &pipeline,
        &registry,
        executor_options(config),
    );

    let result = manager.run_feature(feature, options).await?;

    if result.dry_run {
        println!(
            "Dry run: would execute {} phase(s): {}",
            result.executed.len(),
            result.executed.join(", ")
        );
        return Ok(());
    }

    if let Some(summary) = &result.summary {
        super::print_summary(summary);
    }

    match result.checkpoint.status {
        CheckpointStatus::ValidationFailed => {
            if let Some(validation) = &result.checkpoint.validation {
                for check in &validation.checks {
                    println!("  {:<22} {:?}: {}", check.name, check.status, check.detail);
                }
            }
            bail!("Feature '{feature}' failed validation; fix the artifacts and re-run");
        }
        status => {
            println!(
                "Feature '{}' is now {}",
                style(feature).cyan(),
                style(status).green()
            );
            Ok(())
        }
    }
}

pub fn cmd_feature_approve(
    config: &Config,
    feature: &str,
    notes: Option<&str>,
    skip_confirm: bool,
) -> Result<()> {
    if !skip_confirm {
        let confirmed = Confirm::new()
            .with_prompt(format!("Approve feature '{feature}'?"))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("Approval aborted");
            return Ok(());
        }
    }

    // Approval only touches the checkpoint; the document and producers are
    // not involved.
    let pipeline = load_pipeline_or_default(config.pipeline_file.as_deref())?;
    let repo = FileRepository::new(&config.document_path);
    let registry = ProducerRegistry::new();
    let manager = FeatureManager::new(
        &config.checkpoint_dir,
        &repo,
        &pipeline,
        &registry,
        executor_options(config),
    );

    let checkpoint = manager.approve_feature(feature, notes)?;
    println!(
        "Feature '{}' {} at {}",
        style(feature).cyan(),
        style("approved").green().bold(),
        checkpoint
            .approved_at
            .map(|t| t.to_rfc3339())
            .unwrap_or_default()
    );
    Ok(())
}
