//! KPI report rendering: `conductor report`.

use anyhow::{Context, Result};
use console::style;

use conductor::config::Config;
use conductor::document::store::{DocumentRepository, FileRepository};
use conductor::kpi::report::KpiReporter;

pub fn cmd_report(config: &Config) -> Result<()> {
    let repo = FileRepository::new(&config.document_path);
    let doc = repo
        .load()
        .with_context(|| format!("No document at {}", config.document_path.display()))?;

    let reporter = KpiReporter::new(&config.report_dir);
    let (md_path, csv_path) = reporter.write_reports(&doc)?;

    println!("{}", style("KPI reports written").green());
    println!("  {}", md_path.display());
    println!("  {}", csv_path.display());
    Ok(())
}
