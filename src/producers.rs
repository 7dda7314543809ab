//! Default template producers.
//!
//! These are deliberately thin stand-ins for the real content-generation
//! agents: enough to run the pipeline end-to-end from a requirement file
//! and give the KPI counts real inputs. The core never depends on their
//! internals, only on the producer contract.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

use crate::document::ResolvedInput;
use crate::executor::{Producer, ProducerRegistry};
use crate::retry::{
    FailureCategory, RetryLoopConfig, RetryingProducer, TestFailure, TestRunReport, Tester,
};

fn estimate_tokens(text: &str) -> u64 {
    (text.len() / 4) as u64
}

fn slug(text: &str) -> String {
    text.chars()
        .map(|c| {
            if c.is_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '-'
            }
        })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .take(4)
        .collect::<Vec<_>>()
        .join("-")
}

fn single(input: ResolvedInput) -> anyhow::Result<Value> {
    match input {
        ResolvedInput::Single(value) => Ok(value),
        other => anyhow::bail!("expected a single upstream section, got {other:?}"),
    }
}

/// Extracts requirement items from the raw requirement text.
pub struct FunctionalAnalyst {
    requirement: String,
}

impl FunctionalAnalyst {
    pub fn new(requirement: &str) -> Self {
        Self {
            requirement: requirement.to_string(),
        }
    }
}

#[async_trait]
impl Producer for FunctionalAnalyst {
    fn name(&self) -> &str {
        "functional-analyst"
    }

    async fn execute(&self, _input: ResolvedInput) -> anyhow::Result<Value> {
        let mut items: Vec<String> = self
            .requirement
            .lines()
            .filter_map(|line| {
                let line = line.trim();
                line.strip_prefix("- ")
                    .or_else(|| line.strip_prefix("* "))
                    .or_else(|| {
                        line.split_once(". ")
                            .filter(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
                            .map(|(_, rest)| rest)
                    })
                    .map(str::to_string)
            })
            .collect();

        // A requirement with no list items is a single requirement.
        if items.is_empty() {
            let text = self.requirement.trim();
            if text.is_empty() {
                anyhow::bail!("requirement source is empty");
            }
            items.push(text.to_string());
        }

        let requirements: Vec<Value> = items
            .iter()
            .enumerate()
            .map(|(i, text)| json!({"id": format!("REQ-{:03}", i + 1), "text": text}))
            .collect();

        Ok(json!({
            "requirements": requirements,
            "source_lines": self.requirement.lines().count(),
            "tokens_used": estimate_tokens(&self.requirement),
        }))
    }
}

/// Derives components and API operations from the functional spec.
pub struct TechnicalArchitect;

#[async_trait]
impl Producer for TechnicalArchitect {
    fn name(&self) -> &str {
        "technical-architect"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let functional = single(input)?;
        let requirements = functional["requirements"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let components: Vec<Value> = requirements
            .iter()
            .map(|req| {
                let text = req["text"].as_str().unwrap_or("component");
                json!({
                    "name": slug(text),
                    "responsibility": text,
                    "requirement": req["id"],
                })
            })
            .collect();
        let apis: Vec<Value> = components
            .iter()
            .map(|c| json!(format!("POST /{}", c["name"].as_str().unwrap_or("op"))))
            .collect();

        Ok(json!({
            "components": components,
            "apis": apis,
            "tokens_used": estimate_tokens(&functional.to_string()),
        }))
    }
}

/// Derives one test case per component from the technical spec.
pub struct TestDesigner;

#[async_trait]
impl Producer for TestDesigner {
    fn name(&self) -> &str {
        "test-designer"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let technical = single(input)?;
        let components = technical["components"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        let test_cases: Vec<Value> = components
            .iter()
            .map(|c| {
                let name = c["name"].as_str().unwrap_or("component");
                json!({
                    "name": format!("{name}_accepts_valid_input"),
                    "target": name,
                    "kind": "unit",
                })
            })
            .collect();

        Ok(json!({
            "test_cases": test_cases,
            "tokens_used": estimate_tokens(&technical.to_string()),
        }))
    }
}

/// Writes stub implementation and test files under the artifact directory.
pub struct Implementer {
    artifact_dir: PathBuf,
}

impl Implementer {
    pub fn new(artifact_dir: &Path) -> Self {
        Self {
            artifact_dir: artifact_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Producer for Implementer {
    fn name(&self) -> &str {
        "implementer"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let (technical, testing) = match input {
            ResolvedInput::Many(values) => match <[Value; 2]>::try_from(values) {
                Ok([technical, testing]) => (technical, testing),
                Err(values) => {
                    anyhow::bail!("expected technical and test specs, got {} inputs", values.len())
                }
            },
            other => anyhow::bail!("expected technical and test specs, got {other:?}"),
        };

        std::fs::create_dir_all(self.artifact_dir.join("src"))?;
        std::fs::create_dir_all(self.artifact_dir.join("tests"))?;

        let mut files = Vec::new();
        for component in technical["components"].as_array().cloned().unwrap_or_default() {
            let name = component["name"].as_str().unwrap_or("component");
            let rel = format!("src/{name}.txt");
            let body = format!(
                "module {name}\nresponsibility: {}\n",
                component["responsibility"].as_str().unwrap_or("")
            );
            std::fs::write(self.artifact_dir.join(&rel), body)?;
            files.push(json!({"path": rel, "language": "text"}));
        }

        let case_names: Vec<&str> = testing["test_cases"]
            .as_array()
            .map(|cases| {
                cases
                    .iter()
                    .filter_map(|c| c["name"].as_str())
                    .collect()
            })
            .unwrap_or_default();
        std::fs::write(
            self.artifact_dir.join("tests/smoke.txt"),
            case_names.join("\n") + "\n",
        )?;
        files.push(json!({"path": "tests/smoke.txt", "language": "text"}));

        Ok(json!({
            "files": files,
            "tokens_used": estimate_tokens(&technical.to_string()),
        }))
    }
}

/// Smoke-checks a candidate implementation section for the retry loop.
pub struct SmokeTester;

#[async_trait]
impl Tester for SmokeTester {
    async fn run_tests(&self, candidate: &Value) -> anyhow::Result<TestRunReport> {
        let files = candidate
            .get("files")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut failures = Vec::new();
        if files.is_empty() {
            failures.push(TestFailure {
                test: "artifacts_present".to_string(),
                message: "candidate generated no files".to_string(),
                category: FailureCategory::MissingSymbol,
            });
        }
        let has_tests = files.iter().any(|f| {
            f.get("path")
                .and_then(Value::as_str)
                .is_some_and(|p| p.starts_with("tests/"))
        });
        if !has_tests {
            failures.push(TestFailure {
                test: "tests_generated".to_string(),
                message: "candidate generated no test files".to_string(),
                category: FailureCategory::MissingSymbol,
            });
        }

        Ok(TestRunReport { total: 2, failures })
    }
}

/// Reviews the implementation section and records a verdict.
pub struct Reviewer;

#[async_trait]
impl Producer for Reviewer {
    fn name(&self) -> &str {
        "reviewer"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let implementation = single(input)?;
        let file_count = implementation["files"]
            .as_array()
            .map_or(0, |f| f.len());

        let findings: Vec<Value> = if file_count == 0 {
            vec![json!({"severity": "high", "message": "no files generated"})]
        } else {
            Vec::new()
        };
        let verdict = if findings.is_empty() { "approved" } else { "changes_requested" };

        Ok(json!({
            "verdict": verdict,
            "findings": findings,
            "files_reviewed": file_count,
        }))
    }
}

/// Writes a README describing the generated artifacts.
pub struct DocWriter {
    artifact_dir: PathBuf,
}

impl DocWriter {
    pub fn new(artifact_dir: &Path) -> Self {
        Self {
            artifact_dir: artifact_dir.to_path_buf(),
        }
    }
}

#[async_trait]
impl Producer for DocWriter {
    fn name(&self) -> &str {
        "doc-writer"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let implementation = single(input)?;
        let files = implementation["files"].as_array().cloned().unwrap_or_default();

        let mut body = String::from("# Generated artifacts\n\n## Files\n\n");
        for file in &files {
            if let Some(path) = file["path"].as_str() {
                body.push_str(&format!("- `{path}`\n"));
            }
        }
        std::fs::create_dir_all(&self.artifact_dir)?;
        std::fs::write(self.artifact_dir.join("README.md"), &body)?;

        Ok(json!({
            "sections": [
                {"title": "Overview", "body": "Generated artifact inventory"},
                {"title": "Files", "body": format!("{} file(s)", files.len())},
            ],
            "tokens_used": estimate_tokens(&body),
        }))
    }
}

/// Emits a minimal deployment manifest for the implementation.
pub struct ReleaseEngineer;

#[async_trait]
impl Producer for ReleaseEngineer {
    fn name(&self) -> &str {
        "release-engineer"
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let implementation = single(input)?;
        let file_count = implementation["files"].as_array().map_or(0, |f| f.len());

        let manifest = json!({
            "replicas": 1,
            "artifacts": file_count,
        });

        Ok(json!({
            "manifests": [
                {"name": "deploy.json", "content": manifest.to_string()},
            ],
        }))
    }
}

/// Build the default registry covering the default pipeline. The
/// implementation phase runs through the bounded implementation-test loop.
pub fn default_registry(
    requirement: &str,
    artifact_dir: &Path,
    retry: RetryLoopConfig,
) -> ProducerRegistry {
    let mut registry = ProducerRegistry::new();
    registry.register("functional", Box::new(FunctionalAnalyst::new(requirement)));
    registry.register("technical", Box::new(TechnicalArchitect));
    registry.register("testing", Box::new(TestDesigner));
    registry.register(
        "implementation",
        Box::new(RetryingProducer::new(
            Box::new(Implementer::new(artifact_dir)),
            Box::new(SmokeTester),
            retry,
        )),
    );
    registry.register("review", Box::new(Reviewer));
    registry.register("documentation", Box::new(DocWriter::new(artifact_dir)));
    registry.register("deployment", Box::new(ReleaseEngineer));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_functional_analyst_extracts_list_items() {
        let analyst = FunctionalAnalyst::new(
            "# Feature\n- users can log in\n- users can log out\n* sessions expire\n",
        );
        let output = analyst.execute(ResolvedInput::None).await.unwrap();
        let requirements = output["requirements"].as_array().unwrap();
        assert_eq!(requirements.len(), 3);
        assert_eq!(requirements[0]["id"], "REQ-001");
        assert_eq!(requirements[0]["text"], "users can log in");
    }

    #[tokio::test]
    async fn test_functional_analyst_falls_back_to_whole_text() {
        let analyst = FunctionalAnalyst::new("a single unstructured requirement");
        let output = analyst.execute(ResolvedInput::None).await.unwrap();
        assert_eq!(output["requirements"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_functional_analyst_rejects_empty_source() {
        let analyst = FunctionalAnalyst::new("   \n  ");
        assert!(analyst.execute(ResolvedInput::None).await.is_err());
    }

    #[tokio::test]
    async fn test_architect_derives_one_component_per_requirement() {
        let functional = serde_json::json!({
            "requirements": [
                {"id": "REQ-001", "text": "users can log in"},
                {"id": "REQ-002", "text": "sessions expire"},
            ]
        });
        let output = TechnicalArchitect
            .execute(ResolvedInput::Single(functional))
            .await
            .unwrap();
        assert_eq!(output["components"].as_array().unwrap().len(), 2);
        assert_eq!(output["apis"].as_array().unwrap().len(), 2);
        assert_eq!(output["components"][0]["name"], "users-can-log-in");
    }

    #[tokio::test]
    async fn test_implementer_writes_files_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let implementer = Implementer::new(dir.path());

        let technical = serde_json::json!({"components": [
            {"name": "login", "responsibility": "users can log in"},
        ]});
        let testing = serde_json::json!({"test_cases": [
            {"name": "login_accepts_valid_input"},
        ]});
        let output = implementer
            .execute(ResolvedInput::Many(vec![technical, testing]))
            .await
            .unwrap();

        let files = output["files"].as_array().unwrap();
        assert_eq!(files.len(), 2);
        assert!(dir.path().join("src/login.txt").is_file());
        let smoke = std::fs::read_to_string(dir.path().join("tests/smoke.txt")).unwrap();
        assert!(smoke.contains("login_accepts_valid_input"));
    }

    #[tokio::test]
    async fn test_release_engineer_manifest_parses() {
        let implementation = serde_json::json!({"files": [{"path": "src/a.txt"}]});
        let output = ReleaseEngineer
            .execute(ResolvedInput::Single(implementation))
            .await
            .unwrap();
        let content = output["manifests"][0]["content"].as_str().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(content).unwrap();
        assert_eq!(parsed["artifacts"], 1);
    }

    #[test]
    fn test_default_registry_covers_default_pipeline() {
        let dir = tempfile::tempdir().unwrap();
        let registry =
            default_registry("- one requirement", dir.path(), RetryLoopConfig::default());
        for id in crate::phase::default_pipeline().ids() {
            assert!(registry.get(id).is_some(), "missing producer for {id}");
        }
    }

    #[tokio::test]
    async fn test_smoke_tester_requires_test_files() {
        let passing = serde_json::json!({"files": [
            {"path": "src/a.txt"}, {"path": "tests/smoke.txt"},
        ]});
        let report = SmokeTester.run_tests(&passing).await.unwrap();
        assert!(report.all_passed());

        let no_tests = serde_json::json!({"files": [{"path": "src/a.txt"}]});
        let report = SmokeTester.run_tests(&no_tests).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].test, "tests_generated");

        let empty = serde_json::json!({"files": []});
        let report = SmokeTester.run_tests(&empty).await.unwrap();
        assert_eq!(report.failures.len(), 2);
    }
}
