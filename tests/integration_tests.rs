//! Integration tests for Conductor
//!
//! These tests drive the CLI end-to-end against temporary project
//! directories, from a requirement file through to an approved feature.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a conductor Command rooted in a project directory.
fn conductor(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("conductor");
    cmd.current_dir(dir.path())
        .env("CONDUCTOR_CHECKPOINT_DIR", dir.path().join("checkpoints"));
    cmd
}

/// Helper to create a temporary project with a requirement file.
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("requirement.md"),
        "# Login feature\n\
         - users can register with email\n\
         - users can log in\n\
         - sessions expire after an hour\n",
    )
    .unwrap();
    dir
}

fn document_path(dir: &TempDir) -> std::path::PathBuf {
    dir.path().join(".conductor/document.json")
}

fn run_pipeline(dir: &TempDir) {
    conductor(dir)
        .args(["run", "--requirement", "requirement.md"])
        .assert()
        .success();
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_conductor_help() {
        let dir = create_temp_project();
        conductor(&dir).arg("--help").assert().success();
    }

    #[test]
    fn test_conductor_version() {
        let dir = create_temp_project();
        conductor(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_status_without_document_fails() {
        let dir = create_temp_project();
        conductor(&dir)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("No document"));
    }

    #[test]
    fn test_run_with_missing_requirement_fails() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["run", "--requirement", "nope.md"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to read requirement"));
    }
}

// =============================================================================
// Pipeline Run Tests
// =============================================================================

mod pipeline_run {
    use super::*;

    #[test]
    fn test_run_creates_document_and_artifacts() {
        let dir = create_temp_project();

        conductor(&dir)
            .args(["run", "--requirement", "requirement.md"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Pipeline completed"));

        // Document persisted with every phase completed
        let content = fs::read_to_string(document_path(&dir)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(doc["metadata"]["status"], "completed");
        for phase in [
            "functional",
            "technical",
            "testing",
            "implementation",
            "review",
            "documentation",
            "deployment",
        ] {
            assert_eq!(doc["phases"][phase]["status"], "completed", "{phase}");
        }

        // Three bullet requirements extracted
        assert_eq!(doc["kpis"]["counts"]["functional"]["requirements"], 3);
        // Orchestration summary present
        assert!(doc["kpis"]["orchestration"]["total_duration_ms"].is_u64());

        // Producers wrote real artifacts
        assert!(dir.path().join("artifacts/tests/smoke.txt").is_file());
        assert!(dir.path().join("artifacts/README.md").is_file());
    }

    #[test]
    fn test_run_with_report_writes_both_files() {
        let dir = create_temp_project();

        conductor(&dir)
            .args([
                "run",
                "--requirement",
                "requirement.md",
                "--report",
                "--report-dir",
                "kpi-out",
            ])
            .assert()
            .success();

        let entries: Vec<_> = fs::read_dir(dir.path().join("kpi-out"))
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 2);

        let csv = entries
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == "csv"))
            .unwrap();
        let csv_content = fs::read_to_string(csv).unwrap();
        assert!(csv_content.contains("counts.functional.requirements,3"));

        let md = entries
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == "md"))
            .unwrap();
        let md_content = fs::read_to_string(md).unwrap();
        // The same number appears in both renderings
        assert!(md_content.contains("| functional | requirements | 3 |"));
    }

    #[test]
    fn test_status_after_run() {
        let dir = create_temp_project();
        run_pipeline(&dir);

        conductor(&dir)
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("7 completed, 0 failed, 0 pending"));
    }

    #[test]
    fn test_clean_artifacts_removes_stale_files() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join("artifacts")).unwrap();
        fs::write(dir.path().join("artifacts/stale.txt"), "old").unwrap();

        conductor(&dir)
            .args([
                "run",
                "--requirement",
                "requirement.md",
                "--clean-artifacts",
            ])
            .assert()
            .success();

        assert!(!dir.path().join("artifacts/stale.txt").exists());
        assert!(dir.path().join("artifacts/README.md").is_file());
    }
}

// =============================================================================
// Reset Tests
// =============================================================================

mod reset {
    use super::*;

    fn phase_status(dir: &TempDir, phase: &str) -> String {
        let content = fs::read_to_string(document_path(dir)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        doc["phases"][phase]["status"].as_str().unwrap().to_string()
    }

    #[test]
    fn test_reset_named_sections() {
        let dir = create_temp_project();
        run_pipeline(&dir);

        conductor(&dir)
            .args(["reset", "--sections", "technical,testing"])
            .assert()
            .success()
            .stdout(predicate::str::contains("technical, testing"));

        assert_eq!(phase_status(&dir, "functional"), "completed");
        assert_eq!(phase_status(&dir, "technical"), "pending");
        assert_eq!(phase_status(&dir, "testing"), "pending");
        assert_eq!(phase_status(&dir, "implementation"), "completed");
    }

    #[test]
    fn test_reset_downstream() {
        let dir = create_temp_project();
        run_pipeline(&dir);

        conductor(&dir)
            .args(["reset", "--sections", "downstream:review"])
            .assert()
            .success();

        assert_eq!(phase_status(&dir, "implementation"), "completed");
        assert_eq!(phase_status(&dir, "review"), "pending");
        assert_eq!(phase_status(&dir, "documentation"), "pending");
        assert_eq!(phase_status(&dir, "deployment"), "pending");
    }

    #[test]
    fn test_reset_unknown_section_fails() {
        let dir = create_temp_project();
        run_pipeline(&dir);

        conductor(&dir)
            .args(["reset", "--sections", "mystery"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown section"));
    }
}

// =============================================================================
// Feature Lifecycle Tests
// =============================================================================

mod feature_lifecycle {
    use super::*;

    fn checkpoint(dir: &TempDir, feature: &str) -> serde_json::Value {
        let content =
            fs::read_to_string(dir.path().join("checkpoints").join(format!("{feature}.json")))
                .unwrap();
        serde_json::from_str(&content).unwrap()
    }

    #[test]
    fn test_feature_run_records_checkpoint() {
        let dir = create_temp_project();

        conductor(&dir)
            .args(["feature", "run", "login", "--requirement", "requirement.md"])
            .assert()
            .success()
            .stdout(predicate::str::contains("phase_complete"));

        let cp = checkpoint(&dir, "login");
        assert_eq!(cp["status"], "phase_complete");
        assert_eq!(cp["last_phase"], "deployment");
        assert_eq!(cp["phases"].as_object().unwrap().len(), 7);
    }

    #[test]
    fn test_feature_dry_run_executes_nothing() {
        let dir = create_temp_project();

        conductor(&dir)
            .args([
                "feature",
                "run",
                "login",
                "--requirement",
                "requirement.md",
                "--dry-run",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("Dry run"));

        // No checkpoint written, no phase executed
        assert!(!dir.path().join("checkpoints/login.json").exists());
        let content = fs::read_to_string(document_path(&dir)).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(doc["phases"]["functional"]["status"], "pending");
    }

    #[test]
    fn test_feature_validate_then_approve() {
        let dir = create_temp_project();

        conductor(&dir)
            .args([
                "feature",
                "run",
                "login",
                "--requirement",
                "requirement.md",
                "--validate",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("ready_for_review"));

        assert_eq!(checkpoint(&dir, "login")["status"], "ready_for_review");

        conductor(&dir)
            .args([
                "feature", "approve", "login", "--yes", "--notes", "looks good",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("approved"));

        let cp = checkpoint(&dir, "login");
        assert_eq!(cp["status"], "approved");
        assert_eq!(cp["review_notes"], "looks good");
        assert!(cp["approved_at"].is_string());
    }

    #[test]
    fn test_approve_without_review_fails() {
        let dir = create_temp_project();

        conductor(&dir)
            .args(["feature", "run", "login", "--requirement", "requirement.md"])
            .assert()
            .success();

        // phase_complete is not ready_for_review
        conductor(&dir)
            .args(["feature", "approve", "login", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("cannot move from"));
    }

    #[test]
    fn test_approve_unknown_feature_fails() {
        let dir = create_temp_project();

        conductor(&dir)
            .args(["feature", "approve", "ghost", "--yes"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No checkpoint found"));
    }

    #[test]
    fn test_feature_resume_from_phase() {
        let dir = create_temp_project();

        conductor(&dir)
            .args(["feature", "run", "login", "--requirement", "requirement.md"])
            .assert()
            .success();

        conductor(&dir)
            .args([
                "feature",
                "run",
                "login",
                "--requirement",
                "requirement.md",
                "--start-phase",
                "implementation",
            ])
            .assert()
            .success();

        let cp = checkpoint(&dir, "login");
        assert_eq!(cp["status"], "phase_complete");
        assert_eq!(cp["last_phase"], "deployment");
    }
}

// =============================================================================
// Report Command Tests
// =============================================================================

mod report_command {
    use super::*;

    #[test]
    fn test_report_from_existing_document() {
        let dir = create_temp_project();
        run_pipeline(&dir);

        conductor(&dir)
            .args(["report", "--report-dir", "out"])
            .assert()
            .success()
            .stdout(predicate::str::contains("KPI reports written"));

        let has_ext = |ext: &str| {
            fs::read_dir(dir.path().join("out"))
                .unwrap()
                .map(|e| e.unwrap().path())
                .any(|p| p.extension().is_some_and(|e| e == ext))
        };
        assert!(has_ext("md"));
        assert!(has_ext("csv"));
    }

    #[test]
    fn test_report_without_document_fails() {
        let dir = create_temp_project();
        conductor(&dir)
            .args(["report"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No document"));
    }
}
