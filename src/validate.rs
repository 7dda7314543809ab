//! Structural validation of phase sections.
//!
//! Each phase kind has its own shape check. Fatal issues land in `errors`
//! and make the report invalid; advisory issues land in `warnings` and do
//! not. The executor treats an invalid report exactly like a producer
//! failure — there is no separate retry path for validation.

use serde_json::Value;

/// Result of validating one section.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }
}

fn array<'a>(output: &'a Value, key: &str) -> Option<&'a Vec<Value>> {
    output.get(key).and_then(Value::as_array)
}

fn non_empty_array(output: &Value, key: &str) -> bool {
    array(output, key).is_some_and(|a| !a.is_empty())
}

/// Validate a completed section against its phase kind.
pub fn validate_section(phase_id: &str, output: &Value) -> ValidationReport {
    let mut report = ValidationReport::default();

    if !output.is_object() {
        report.error(format!("section '{phase_id}' payload is not an object"));
        return report;
    }

    match phase_id {
        "functional" => {
            if !non_empty_array(output, "requirements") {
                report.error("functional section must list at least one requirement");
            }
        }
        "technical" => {
            if !non_empty_array(output, "components") && !non_empty_array(output, "apis") {
                report.error("technical section must expose a non-empty component or API list");
            }
        }
        "testing" => {
            if !non_empty_array(output, "test_cases") {
                report.error("testing section must list at least one test case");
            }
        }
        "implementation" => match array(output, "files") {
            Some(files) if !files.is_empty() => {
                for (i, file) in files.iter().enumerate() {
                    if file.get("path").and_then(Value::as_str).is_none() {
                        report.error(format!("implementation file entry {i} has no path"));
                    }
                    if file.get("language").and_then(Value::as_str).is_none() {
                        report.warn(format!("implementation file entry {i} has no language"));
                    }
                }
            }
            _ => report.error("implementation section must list at least one generated file"),
        },
        "review" => {
            if output.get("verdict").and_then(Value::as_str).is_none() {
                report.error("review section must carry a verdict");
            }
        }
        "documentation" => {
            if !non_empty_array(output, "sections") {
                report.error("documentation section must contain at least one section");
            } else if let Some(sections) = array(output, "sections") {
                for (i, section) in sections.iter().enumerate() {
                    if section.get("title").and_then(Value::as_str).is_none() {
                        report.warn(format!("documentation section {i} has no title"));
                    }
                }
            }
        }
        "deployment" => match array(output, "manifests") {
            Some(manifests) if manifests.is_empty() => {
                report.warn("deployment section has an empty manifest list");
            }
            Some(_) => {}
            None => report.error("deployment section must carry a manifests list"),
        },
        other => {
            report.warn(format!("no structural check registered for phase kind '{other}'"));
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_functional_requires_requirements() {
        let report = validate_section("functional", &json!({"requirements": []}));
        assert!(!report.valid());

        let report = validate_section("functional", &json!({"requirements": [{"id": "REQ-001"}]}));
        assert!(report.valid());
    }

    #[test]
    fn test_technical_accepts_components_or_apis() {
        assert!(validate_section("technical", &json!({"components": ["core"]})).valid());
        assert!(validate_section("technical", &json!({"apis": ["GET /items"]})).valid());
        assert!(!validate_section("technical", &json!({"components": [], "apis": []})).valid());
        assert!(!validate_section("technical", &json!({})).valid());
    }

    #[test]
    fn test_testing_requires_cases() {
        assert!(!validate_section("testing", &json!({})).valid());
        assert!(validate_section("testing", &json!({"test_cases": [{"name": "t1"}]})).valid());
    }

    #[test]
    fn test_implementation_path_fatal_language_advisory() {
        let report = validate_section(
            "implementation",
            &json!({"files": [{"path": "src/core.txt"}]}),
        );
        assert!(report.valid());
        assert_eq!(report.warnings.len(), 1);

        let report = validate_section("implementation", &json!({"files": [{"language": "rust"}]}));
        assert!(!report.valid());

        let report = validate_section("implementation", &json!({"files": []}));
        assert!(!report.valid());
    }

    #[test]
    fn test_review_requires_verdict() {
        assert!(!validate_section("review", &json!({"findings": []})).valid());
        assert!(validate_section("review", &json!({"verdict": "approved"})).valid());
    }

    #[test]
    fn test_deployment_empty_manifest_list_is_advisory() {
        let report = validate_section("deployment", &json!({"manifests": []}));
        assert!(report.valid());
        assert_eq!(report.warnings.len(), 1);

        assert!(!validate_section("deployment", &json!({})).valid());
    }

    #[test]
    fn test_non_object_payload_is_fatal() {
        assert!(!validate_section("functional", &json!([1, 2, 3])).valid());
        assert!(!validate_section("functional", &json!("text")).valid());
    }

    #[test]
    fn test_unknown_phase_kind_is_advisory_only() {
        let report = validate_section("mystery", &json!({"anything": true}));
        assert!(report.valid());
        assert_eq!(report.warnings.len(), 1);
    }
}
