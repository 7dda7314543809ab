//! KPI report rendering.
//!
//! Both representations are derived from the same flat metric rows, so the
//! Markdown document and the CSV export can never disagree on a value.

use chrono::Utc;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::document::Document;
use crate::errors::StoreError;

/// Renders the KPI block of a document to Markdown and CSV files.
pub struct KpiReporter {
    report_dir: PathBuf,
}

/// One flat metric row, e.g. `("counts.functional.requirements", 7)`.
type MetricRow = (String, u64);

impl KpiReporter {
    pub fn new(report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
        }
    }

    /// Write both report files, named after the document and a timestamp.
    /// Returns the (markdown, csv) paths.
    pub fn write_reports(&self, doc: &Document) -> Result<(PathBuf, PathBuf), StoreError> {
        std::fs::create_dir_all(&self.report_dir).map_err(|source| StoreError::Io {
            path: self.report_dir.clone(),
            source,
        })?;

        let stamp = Utc::now().format("%Y-%m-%dT%H-%M-%S");
        let stem = format!("{}-{stamp}", sanitize(&doc.metadata.name));
        let md_path = self.report_dir.join(format!("{stem}.md"));
        let csv_path = self.report_dir.join(format!("{stem}.csv"));

        let rows = metric_rows(doc);
        write_file(&md_path, &render_markdown(doc, &rows))?;
        write_file(&csv_path, &render_csv(&rows))?;

        tracing::info!(
            markdown = %md_path.display(),
            csv = %csv_path.display(),
            "KPI reports written"
        );
        Ok((md_path, csv_path))
    }
}

fn write_file(path: &Path, content: &str) -> Result<(), StoreError> {
    std::fs::write(path, content).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect()
}

/// Flatten the KPI block into `metric,value` rows.
pub fn metric_rows(doc: &Document) -> Vec<MetricRow> {
    let mut rows = Vec::new();

    for (phase, counts) in &doc.kpis.counts {
        for (metric, value) in counts {
            rows.push((format!("counts.{phase}.{metric}"), *value));
        }
    }
    for (phase, millis) in &doc.kpis.timings {
        rows.push((format!("timings.{phase}"), *millis));
    }
    if let Some(orchestration) = &doc.kpis.orchestration {
        rows.push((
            "orchestration.total_duration_ms".to_string(),
            orchestration.total_duration_ms,
        ));
        rows.push((
            "orchestration.tokens_used".to_string(),
            orchestration.tokens_used,
        ));
        for (agent, attempts) in &orchestration.attempts_per_agent {
            rows.push((
                format!("orchestration.attempts.{agent}"),
                u64::from(*attempts),
            ));
        }
    }

    rows
}

/// Render the Markdown report from the shared rows.
pub fn render_markdown(doc: &Document, rows: &[MetricRow]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# KPI Report: {}", doc.metadata.name);
    let _ = writeln!(out);
    let _ = writeln!(out, "Document `{}`, version {}.", doc.metadata.id, doc.metadata.version);
    let _ = writeln!(out);

    let _ = writeln!(out, "## Counts");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Phase | Metric | Value |");
    let _ = writeln!(out, "|-------|--------|-------|");
    for (name, value) in rows.iter().filter(|(n, _)| n.starts_with("counts.")) {
        let mut parts = name.splitn(3, '.');
        let _ = parts.next();
        let phase = parts.next().unwrap_or("");
        let metric = parts.next().unwrap_or("");
        let _ = writeln!(out, "| {phase} | {metric} | {value} |");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Timings (ms)");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Phase | Duration |");
    let _ = writeln!(out, "|-------|----------|");
    for (name, value) in rows.iter().filter(|(n, _)| n.starts_with("timings.")) {
        let phase = name.trim_start_matches("timings.");
        let _ = writeln!(out, "| {phase} | {value} |");
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "## Orchestration");
    let _ = writeln!(out);
    let _ = writeln!(out, "| Metric | Value |");
    let _ = writeln!(out, "|--------|-------|");
    for (name, value) in rows.iter().filter(|(n, _)| n.starts_with("orchestration.")) {
        let metric = name.trim_start_matches("orchestration.");
        let _ = writeln!(out, "| {metric} | {value} |");
    }

    out
}

/// Render the flat CSV export from the shared rows.
pub fn render_csv(rows: &[MetricRow]) -> String {
    let mut out = String::from("metric,value\n");
    for (name, value) in rows {
        let _ = writeln!(out, "{name},{value}");
    }
    out
}
