//! CLI command implementations.

mod feature;
mod report;
mod run;
mod status;

pub use feature::{cmd_feature_approve, cmd_feature_run};
pub use report::cmd_report;
pub use run::cmd_run;
pub use status::{cmd_reset, cmd_status};

use conductor::config::Config;
use conductor::executor::PipelineSummary;
use conductor::retry::RetryLoopConfig;
use console::style;
use std::time::Duration;

/// Retry-loop parameters from the resolved configuration.
pub(crate) fn retry_config(config: &Config) -> RetryLoopConfig {
    RetryLoopConfig {
        max_iterations: config.max_iterations,
        retry_delay: Duration::from_millis(config.retry_delay_ms),
    }
}

/// Print the end-of-run phase summary.
pub(crate) fn print_summary(summary: &PipelineSummary) {
    println!();
    for outcome in &summary.outcomes {
        let marker = if outcome.success {
            style("ok").green()
        } else {
            style("failed").red()
        };
        println!(
            "  {:<16} {:<8} {:.1}s",
            outcome.phase,
            marker,
            outcome.duration.as_secs_f64()
        );
        if let Some(error) = &outcome.error {
            println!("    {}", style(error).dim());
        }
    }
    println!(
        "\n{} completed, {} failed, {} pending ({:.1}s total)",
        style(summary.completed).green(),
        style(summary.failed).red(),
        summary.pending(),
        summary.duration.as_secs_f64()
    );
}
