//! KPI derivation and aggregation.
//!
//! Counts are derived per phase kind from the section payload; the
//! implementation phase additionally scans the files the producer reports
//! having written for on-disk byte and line totals. The orchestration
//! summary is a pure function over the final document.

pub mod report;

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;

use crate::document::{Document, OrchestrationKpis, PhaseStatus};

fn array_len(output: &Value, key: &str) -> u64 {
    output
        .get(key)
        .and_then(Value::as_array)
        .map_or(0, |a| a.len() as u64)
}

/// Derive section-specific counts for a completed phase.
pub fn derive_counts(phase_id: &str, output: &Value, artifact_dir: &Path) -> BTreeMap<String, u64> {
    let mut counts = BTreeMap::new();

    match phase_id {
        "functional" => {
            counts.insert("requirements".to_string(), array_len(output, "requirements"));
        }
        "technical" => {
            counts.insert("components".to_string(), array_len(output, "components"));
            counts.insert("apis".to_string(), array_len(output, "apis"));
        }
        "testing" => {
            counts.insert("test_cases".to_string(), array_len(output, "test_cases"));
        }
        "implementation" => {
            let files = output
                .get("files")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            counts.insert("files".to_string(), files.len() as u64);

            let mut bytes = 0u64;
            let mut lines = 0u64;
            for file in &files {
                let Some(rel) = file.get("path").and_then(Value::as_str) else {
                    continue;
                };
                let path = artifact_dir.join(rel);
                match std::fs::read_to_string(&path) {
                    Ok(content) => {
                        bytes += content.len() as u64;
                        lines += content.lines().count() as u64;
                    }
                    Err(err) => {
                        tracing::debug!(path = %path.display(), %err, "skipping unreadable generated file");
                    }
                }
            }
            counts.insert("bytes_written".to_string(), bytes);
            counts.insert("lines_written".to_string(), lines);
        }
        "review" => {
            counts.insert("findings".to_string(), array_len(output, "findings"));
        }
        "documentation" => {
            counts.insert("sections".to_string(), array_len(output, "sections"));
        }
        "deployment" => {
            counts.insert("manifests".to_string(), array_len(output, "manifests"));
        }
        other => {
            tracing::debug!(phase = other, "no count derivation registered for phase kind");
        }
    }

    counts
}

/// Compute the orchestration-level summary from the final document.
///
/// There is no automatic per-phase retry at this layer, so every executed
/// phase contributes exactly one attempt to its agent.
pub fn aggregate_orchestration(doc: &Document, total_duration_ms: u64) -> OrchestrationKpis {
    let mut attempts_per_agent: BTreeMap<String, u32> = BTreeMap::new();
    let mut tokens_used = 0u64;

    for record in doc.phases.values() {
        if record.status == PhaseStatus::Pending {
            continue;
        }
        if let Some(agent) = &record.agent {
            *attempts_per_agent.entry(agent.clone()).or_insert(0) += 1;
        }
        if let Some(tokens) = record
            .output
            .as_ref()
            .and_then(|o| o.get("tokens_used"))
            .and_then(Value::as_u64)
        {
            tokens_used += tokens;
        }
    }

    OrchestrationKpis {
        total_duration_ms,
        attempts_per_agent,
        tokens_used,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::phase::default_pipeline;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn test_functional_counts_requirements() {
        let output = json!({"requirements": [1, 2, 3, 4, 5, 6, 7]});
        let counts = derive_counts("functional", &output, Path::new("."));
        assert_eq!(counts["requirements"], 7);
    }

    #[test]
    fn test_technical_counts_components_and_apis() {
        let output = json!({"components": [{"name": "core"}], "apis": ["a", "b"]});
        let counts = derive_counts("technical", &output, Path::new("."));
        assert_eq!(counts["components"], 1);
        assert_eq!(counts["apis"], 2);
    }

    #[test]
    fn test_implementation_scans_files_on_disk() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/core.txt"), "line one\nline two\n").unwrap();

        let output = json!({"files": [
            {"path": "src/core.txt", "language": "text"},
            {"path": "src/missing.txt", "language": "text"}
        ]});
        let counts = derive_counts("implementation", &output, dir.path());
        assert_eq!(counts["files"], 2);
        assert_eq!(counts["lines_written"], 2);
        assert_eq!(counts["bytes_written"], 18);
    }

    #[test]
    fn test_unknown_phase_kind_yields_no_counts() {
        let counts = derive_counts("mystery", &json!({"x": [1]}), Path::new("."));
        assert!(counts.is_empty());
    }

    #[test]
    fn test_aggregate_orchestration() {
        let mut doc = Document::new("demo", &default_pipeline(), None);
        doc.update_phase(
            "functional",
            json!({"requirements": ["r"], "tokens_used": 120}),
            "functional-analyst",
        );
        doc.update_phase(
            "technical",
            json!({"components": ["c"], "tokens_used": 310}),
            "technical-architect",
        );
        doc.mark_phase_error("testing", "boom", "test-designer");

        let summary = aggregate_orchestration(&doc, 5000);
        assert_eq!(summary.total_duration_ms, 5000);
        assert_eq!(summary.tokens_used, 430);
        // One attempt per executed phase, including the failed one
        assert_eq!(summary.attempts_per_agent["functional-analyst"], 1);
        assert_eq!(summary.attempts_per_agent["test-designer"], 1);
        assert_eq!(summary.attempts_per_agent.len(), 3);
    }
}
