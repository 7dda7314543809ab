//! Document inspection and section reset: `conductor status` and
//! `conductor reset`.

use anyhow::{Context, Result};
use console::style;

use conductor::config::Config;
use conductor::document::store::{DocumentRepository, FileRepository};
use conductor::document::{PhaseStatus, ResetSelection, reset_sections};
use conductor::phase::load_pipeline_or_default;

pub fn cmd_status(config: &Config) -> Result<()> {
    let repo = FileRepository::new(&config.document_path);
    let doc = repo
        .load()
        .with_context(|| format!("No document at {}", config.document_path.display()))?;

    println!(
        "Document '{}' ({:?})",
        style(&doc.metadata.name).cyan(),
        doc.metadata.status
    );
    println!("  created {}", doc.metadata.created_at.to_rfc3339());
    println!("  updated {}", doc.metadata.updated_at.to_rfc3339());
    println!();

    let pipeline = load_pipeline_or_default(config.pipeline_file.as_deref())?;
    for spec in pipeline.phases() {
        let Some(record) = doc.phase(&spec.id) else {
            continue;
        };
        let marker = match record.status {
            PhaseStatus::Completed => style("completed").green(),
            PhaseStatus::Failed => style("failed").red(),
            PhaseStatus::Pending => style("pending").dim(),
        };
        let timing = doc
            .kpis
            .timings
            .get(&spec.id)
            .map(|ms| format!("{ms}ms"))
            .unwrap_or_default();
        println!("  {:<16} {:<10} {}", spec.id, marker, timing);
    }

    let (completed, failed, pending) = doc.status_counts();
    println!("\n{completed} completed, {failed} failed, {pending} pending");
    Ok(())
}

pub fn cmd_reset(config: &Config, selection: &str) -> Result<()> {
    let selection: ResetSelection = selection.parse()?;
    let pipeline = load_pipeline_or_default(config.pipeline_file.as_deref())?;

    let repo = FileRepository::new(&config.document_path);
    let mut doc = repo
        .load()
        .with_context(|| format!("No document at {}", config.document_path.display()))?;

    let cleared = reset_sections(&mut doc, &pipeline, &selection)?;
    repo.save(&doc)?;

    println!(
        "Reset {} section(s): {}",
        cleared.len(),
        style(cleared.join(", ")).cyan()
    );
    Ok(())
}
