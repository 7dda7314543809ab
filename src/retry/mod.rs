//! Bounded implementation-test retry loop.
//!
//! An implementer produces a candidate from the technical spec; a tester
//! runs tests against it. Failures feed back into the implementer and the
//! loop retries after a fixed delay, up to an iteration budget. Exhausting
//! the budget is a deadlock: the loop synthesises a feedback report with
//! the full iteration history, refinement suggestions keyed on structured
//! failure categories, and one learning point per failed iteration.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;

use crate::document::ResolvedInput;
use crate::executor::Producer;

/// State of the retry loop. `Success` and `Deadlock` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopState {
    Iterating,
    Success,
    Deadlock,
}

impl LoopState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Deadlock)
    }
}

/// Structured failure category emitted by testers. Suggestions are looked
/// up by category; no substring matching over error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    AssertionMismatch,
    MissingSymbol,
    Timeout,
    Panic,
    Io,
    #[default]
    Unknown,
}

impl FailureCategory {
    pub fn suggestion(&self) -> &'static str {
        match self {
            FailureCategory::AssertionMismatch => {
                "Re-derive the expected values from the technical spec; implementation and tests disagree on concrete outputs"
            }
            FailureCategory::MissingSymbol => {
                "Generate the missing definitions; the candidate does not cover every interface the tests reference"
            }
            FailureCategory::Timeout => {
                "Bound the candidate's work per operation; a test exceeded its time budget"
            }
            FailureCategory::Panic => {
                "Handle the failing edge case explicitly instead of letting the candidate abort"
            }
            FailureCategory::Io => {
                "Make file and path handling relative to the artifact directory; a test hit an I/O failure"
            }
            FailureCategory::Unknown => {
                "Tighten the technical spec for the failing area; the failure does not map to a known category"
            }
        }
    }
}

/// One failed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestFailure {
    pub test: String,
    pub message: String,
    #[serde(default)]
    pub category: FailureCategory,
}

/// Result of one tester invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestRunReport {
    /// Total tests executed
    pub total: u32,
    /// Failures; empty means the run passed
    #[serde(default)]
    pub failures: Vec<TestFailure>,
}

impl TestRunReport {
    pub fn passed(total: u32) -> Self {
        Self {
            total,
            failures: Vec::new(),
        }
    }

    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// The tester side of the loop.
#[async_trait]
pub trait Tester: Send + Sync {
    async fn run_tests(&self, candidate: &Value) -> anyhow::Result<TestRunReport>;
}

/// Receives the feedback report when the loop deadlocks.
pub trait FeedbackSink: Send + Sync {
    fn on_deadlock(&self, report: &FeedbackReport);
}

/// One recorded failed iteration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub failures: Vec<TestFailure>,
}

/// Synthesised when the iteration budget is exhausted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackReport {
    pub iterations: Vec<IterationRecord>,
    pub last_failures: Vec<TestFailure>,
    pub suggestions: Vec<String>,
    pub learning_points: Vec<String>,
}

/// Loop parameters.
#[derive(Debug, Clone)]
pub struct RetryLoopConfig {
    pub max_iterations: u32,
    pub retry_delay: Duration,
}

impl Default for RetryLoopConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

/// Final result of a loop run.
#[derive(Debug)]
pub struct LoopResult {
    pub state: LoopState,
    pub success: bool,
    pub iterations: u32,
    /// The last candidate produced, passing or not
    pub result: Option<Value>,
    /// Present only on deadlock
    pub report: Option<FeedbackReport>,
}

/// Bounded retry loop between an implementer and a tester.
pub struct RetryLoop<'a> {
    implementer: &'a dyn Producer,
    tester: &'a dyn Tester,
    config: RetryLoopConfig,
    sink: Option<&'a dyn FeedbackSink>,
}

impl<'a> RetryLoop<'a> {
    pub fn new(
        implementer: &'a dyn Producer,
        tester: &'a dyn Tester,
        config: RetryLoopConfig,
    ) -> Self {
        Self {
            implementer,
            tester,
            config,
            sink: None,
        }
    }

    pub fn with_feedback_sink(mut self, sink: &'a dyn FeedbackSink) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drive the loop to a terminal state. `input` is the resolved spec
    /// input the implementer works from (for the implementation phase, the
    /// technical and test specs). Errors from either collaborator abort the
    /// loop and propagate; they are not test failures.
    pub async fn run(&self, input: &ResolvedInput) -> anyhow::Result<LoopResult> {
        let mut history: Vec<IterationRecord> = Vec::new();
        let mut candidate: Option<Value> = None;
        let spec = spec_of(input);

        for iteration in 1..=self.config.max_iterations {
            tracing::debug!(iteration, "retry loop iteration started");

            let produced = self.implementer.execute(input.clone()).await?;
            let test_report = self.tester.run_tests(&produced).await?;

            if test_report.all_passed() {
                tracing::info!(iteration, "retry loop converged");
                return Ok(LoopResult {
                    state: LoopState::Success,
                    success: true,
                    iterations: iteration,
                    result: Some(produced),
                    report: None,
                });
            }

            tracing::warn!(
                iteration,
                failures = test_report.failures.len(),
                "iteration failed"
            );
            history.push(IterationRecord {
                iteration,
                timestamp: Utc::now(),
                failures: test_report.failures.clone(),
            });

            self.implementer
                .learn_from_failures(&produced, &test_report.failures, &spec);
            candidate = Some(produced);

            if iteration < self.config.max_iterations {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        let report = build_feedback_report(&history);
        tracing::error!(
            iterations = self.config.max_iterations,
            "retry loop deadlocked"
        );
        if let Some(sink) = self.sink {
            sink.on_deadlock(&report);
        }

        Ok(LoopResult {
            state: LoopState::Deadlock,
            success: false,
            iterations: self.config.max_iterations,
            result: candidate,
            report: Some(report),
        })
    }
}

/// Wraps an implementer and a tester behind the plain producer contract:
/// `execute` drives the bounded loop and returns the converged candidate,
/// or fails the phase when the loop deadlocks.
pub struct RetryingProducer {
    implementer: Box<dyn Producer>,
    tester: Box<dyn Tester>,
    config: RetryLoopConfig,
    sink: Option<Box<dyn FeedbackSink>>,
}

impl RetryingProducer {
    pub fn new(
        implementer: Box<dyn Producer>,
        tester: Box<dyn Tester>,
        config: RetryLoopConfig,
    ) -> Self {
        Self {
            implementer,
            tester,
            config,
            sink: None,
        }
    }

    pub fn with_feedback_sink(mut self, sink: Box<dyn FeedbackSink>) -> Self {
        self.sink = Some(sink);
        self
    }
}

#[async_trait]
impl Producer for RetryingProducer {
    fn name(&self) -> &str {
        self.implementer.name()
    }

    async fn execute(&self, input: ResolvedInput) -> anyhow::Result<Value> {
        let mut retry = RetryLoop::new(
            self.implementer.as_ref(),
            self.tester.as_ref(),
            self.config.clone(),
        );
        if let Some(sink) = &self.sink {
            retry = retry.with_feedback_sink(sink.as_ref());
        }

        let result = retry.run(&input).await?;
        if result.success {
            result
                .result
                .ok_or_else(|| anyhow::anyhow!("retry loop succeeded without a candidate"))
        } else {
            anyhow::bail!(
                "implementation-test loop deadlocked after {} iteration(s)",
                result.iterations
            )
        }
    }
}

/// The spec handed to the failure-feedback hook: the sole input, or the
/// first of several (the technical spec in the default pipeline).
fn spec_of(input: &ResolvedInput) -> Value {
    match input {
        ResolvedInput::None => Value::Null,
        ResolvedInput::Single(value) => value.clone(),
        ResolvedInput::Many(values) => values.first().cloned().unwrap_or(Value::Null),
    }
}

fn build_feedback_report(history: &[IterationRecord]) -> FeedbackReport {
    let last_failures = history
        .last()
        .map(|r| r.failures.clone())
        .unwrap_or_default();

    let categories: BTreeSet<FailureCategory> =
        last_failures.iter().map(|f| f.category).collect();
    let suggestions = categories
        .iter()
        .map(|c| c.suggestion().to_string())
        .collect();

    let learning_points = history
        .iter()
        .map(|record| {
            format!(
                "Iteration {}: {} test(s) still failing; the specification was not precise enough for the implementer to converge",
                record.iteration,
                record.failures.len()
            )
        })
        .collect();

    FeedbackReport {
        iterations: history.to_vec(),
        last_failures,
        suggestions,
        learning_points,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ResolvedInput;
    use serde_json::json;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct CountingImplementer {
        calls: AtomicU32,
        feedback_calls: AtomicU32,
    }

    impl CountingImplementer {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                feedback_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Producer for CountingImplementer {
        fn name(&self) -> &str {
            "implementer"
        }

        async fn execute(&self, _input: ResolvedInput) -> anyhow::Result<Value> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(json!({"attempt": call}))
        }

        fn learn_from_failures(&self, _candidate: &Value, _failures: &[TestFailure], _spec: &Value) {
            self.feedback_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Tester that fails until a given attempt number passes.
    struct PassingAtTester {
        pass_at: u32,
    }

    #[async_trait]
    impl Tester for PassingAtTester {
        async fn run_tests(&self, candidate: &Value) -> anyhow::Result<TestRunReport> {
            let attempt = candidate["attempt"].as_u64().unwrap() as u32;
            if attempt >= self.pass_at {
                Ok(TestRunReport::passed(3))
            } else {
                Ok(TestRunReport {
                    total: 3,
                    failures: vec![TestFailure {
                        test: "roundtrip".to_string(),
                        message: "expected 7, got 6".to_string(),
                        category: FailureCategory::AssertionMismatch,
                    }],
                })
            }
        }
    }

    struct AlwaysFailingTester;

    #[async_trait]
    impl Tester for AlwaysFailingTester {
        async fn run_tests(&self, _candidate: &Value) -> anyhow::Result<TestRunReport> {
            Ok(TestRunReport {
                total: 2,
                failures: vec![
                    TestFailure {
                        test: "a".to_string(),
                        message: "assert failed".to_string(),
                        category: FailureCategory::AssertionMismatch,
                    },
                    TestFailure {
                        test: "b".to_string(),
                        message: "symbol not found".to_string(),
                        category: FailureCategory::MissingSymbol,
                    },
                ],
            })
        }
    }

    struct CollectingSink {
        reports: Mutex<Vec<FeedbackReport>>,
    }

    impl FeedbackSink for CollectingSink {
        fn on_deadlock(&self, report: &FeedbackReport) {
            self.reports.lock().unwrap().push(report.clone());
        }
    }

    fn fast_config(max_iterations: u32) -> RetryLoopConfig {
        RetryLoopConfig {
            max_iterations,
            retry_delay: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_success_on_second_iteration() {
        let implementer = CountingImplementer::new();
        let tester = PassingAtTester { pass_at: 2 };
        let retry = RetryLoop::new(&implementer, &tester, fast_config(5));

        let result = retry.run(&ResolvedInput::Single(json!({"components": ["core"]}))).await.unwrap();
        assert!(result.success);
        assert_eq!(result.state, LoopState::Success);
        assert_eq!(result.iterations, 2);
        assert!(result.report.is_none());
        assert_eq!(result.result.unwrap()["attempt"], 2);
        // Feedback hook fired once, for the single failed iteration
        assert_eq!(implementer.feedback_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_deadlock_after_budget_exhausted() {
        let implementer = CountingImplementer::new();
        let tester = AlwaysFailingTester;
        let retry = RetryLoop::new(&implementer, &tester, fast_config(3));

        let result = retry.run(&ResolvedInput::Single(json!({}))).await.unwrap();
        assert!(!result.success);
        assert_eq!(result.state, LoopState::Deadlock);
        assert_eq!(result.iterations, 3);

        let report = result.report.unwrap();
        assert_eq!(report.iterations.len(), 3);
        // One learning point per failed iteration
        assert_eq!(report.learning_points.len(), 3);
        assert_eq!(report.last_failures.len(), 2);
        // One suggestion per distinct category in the last failure set
        assert_eq!(report.suggestions.len(), 2);
    }

    #[tokio::test]
    async fn test_deadlock_dispatches_to_sink() {
        let implementer = CountingImplementer::new();
        let tester = AlwaysFailingTester;
        let sink = CollectingSink {
            reports: Mutex::new(Vec::new()),
        };
        let retry =
            RetryLoop::new(&implementer, &tester, fast_config(2)).with_feedback_sink(&sink);

        retry.run(&ResolvedInput::Single(json!({}))).await.unwrap();
        let reports = sink.reports.lock().unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].learning_points.len(), 2);
    }

    #[tokio::test]
    async fn test_suggestions_come_from_category_lookup() {
        let implementer = CountingImplementer::new();
        let tester = AlwaysFailingTester;
        let retry = RetryLoop::new(&implementer, &tester, fast_config(1));

        let result = retry.run(&ResolvedInput::Single(json!({}))).await.unwrap();
        let report = result.report.unwrap();
        assert!(report
            .suggestions
            .contains(&FailureCategory::AssertionMismatch.suggestion().to_string()));
        assert!(report
            .suggestions
            .contains(&FailureCategory::MissingSymbol.suggestion().to_string()));
    }

    #[tokio::test]
    async fn test_collaborator_error_propagates() {
        struct BrokenTester;

        #[async_trait]
        impl Tester for BrokenTester {
            async fn run_tests(&self, _candidate: &Value) -> anyhow::Result<TestRunReport> {
                anyhow::bail!("test harness unavailable")
            }
        }

        let implementer = CountingImplementer::new();
        let retry = RetryLoop::new(&implementer, &BrokenTester, fast_config(3));
        let err = retry.run(&ResolvedInput::Single(json!({}))).await.unwrap_err();
        assert!(err.to_string().contains("test harness unavailable"));
    }

    #[tokio::test]
    async fn test_retrying_producer_returns_converged_candidate() {
        let producer = RetryingProducer::new(
            Box::new(CountingImplementer::new()),
            Box::new(PassingAtTester { pass_at: 2 }),
            fast_config(5),
        );
        let output = producer
            .execute(ResolvedInput::Single(json!({})))
            .await
            .unwrap();
        assert_eq!(output["attempt"], 2);
    }

    #[tokio::test]
    async fn test_retrying_producer_fails_phase_on_deadlock() {
        let producer = RetryingProducer::new(
            Box::new(CountingImplementer::new()),
            Box::new(AlwaysFailingTester),
            fast_config(2),
        );
        let err = producer
            .execute(ResolvedInput::Single(json!({})))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("deadlocked after 2"));
    }

    #[test]
    fn test_loop_state_terminality() {
        assert!(!LoopState::Iterating.is_terminal());
        assert!(LoopState::Success.is_terminal());
        assert!(LoopState::Deadlock.is_terminal());
    }

    #[test]
    fn test_failure_category_serialisation() {
        let failure = TestFailure {
            test: "t".to_string(),
            message: "m".to_string(),
            category: FailureCategory::Timeout,
        };
        let json = serde_json::to_string(&failure).unwrap();
        assert!(json.contains("\"timeout\""));
        // Missing category defaults to unknown
        let parsed: TestFailure = serde_json::from_str(r#"{"test":"t","message":"m"}"#).unwrap();
        assert_eq!(parsed.category, FailureCategory::Unknown);
    }
}
