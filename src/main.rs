use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cmd;

use conductor::checkpoint::FeatureOptions;
use conductor::config::Config;

#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about = "Pipeline execution core for multi-stage content-generation workflows")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    /// Path of the run document. Overrides the configured location.
    #[arg(long, global = true)]
    pub document: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline from a requirement source
    Run {
        /// Path to the requirement source file
        #[arg(short, long)]
        requirement: PathBuf,
        /// Record failures and keep going instead of aborting
        #[arg(long)]
        continue_on_error: bool,
        /// Remove the artifact directory before running
        #[arg(long)]
        clean_artifacts: bool,
        /// Render the KPI report at pipeline end
        #[arg(long)]
        report: bool,
        /// Directory for KPI reports
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
    /// Checkpointed feature runs and approval
    Feature {
        #[command(subcommand)]
        command: FeatureCommands,
    },
    /// Clear document sections (all, downstream:<phase>, or a comma list)
    Reset {
        #[arg(long)]
        sections: String,
    },
    /// Render the KPI report from the current document
    Report {
        #[arg(long)]
        report_dir: Option<PathBuf>,
    },
    /// Show per-phase status of the current document
    Status,
}

#[derive(Subcommand)]
pub enum FeatureCommands {
    /// Run (or resume) the pipeline for a feature
    Run {
        name: String,
        /// Path to the requirement source file
        #[arg(short, long)]
        requirement: PathBuf,
        /// Resume from this phase, clearing it and everything after it
        #[arg(long)]
        start_phase: Option<String>,
        /// Run the artifact validation gate after the run
        #[arg(long)]
        validate: bool,
        /// Resolve and log only; execute nothing
        #[arg(long)]
        dry_run: bool,
    },
    /// Approve a feature that is ready for review
    Approve {
        name: String,
        /// Review notes recorded on the checkpoint
        #[arg(long)]
        notes: Option<String>,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();

    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let mut config = Config::new(project_dir, cli.verbose)?;
    if let Some(document) = &cli.document {
        config.document_path = document.clone();
    }

    match &cli.command {
        Commands::Run {
            requirement,
            continue_on_error,
            clean_artifacts,
            report,
            report_dir,
        } => {
            config.continue_on_error |= *continue_on_error;
            config.report |= *report;
            if let Some(dir) = report_dir {
                config.report_dir = dir.clone();
            }
            cmd::cmd_run(&config, requirement, *clean_artifacts).await?;
        }
        Commands::Feature { command } => match command {
            FeatureCommands::Run {
                name,
                requirement,
                start_phase,
                validate,
                dry_run,
            } => {
                let options = FeatureOptions {
                    start_phase: start_phase.clone(),
                    validate: *validate,
                    dry_run: *dry_run,
                };
                cmd::cmd_feature_run(&config, name, requirement, &options).await?;
            }
            FeatureCommands::Approve { name, notes, yes } => {
                cmd::cmd_feature_approve(&config, name, notes.as_deref(), *yes)?;
            }
        },
        Commands::Reset { sections } => {
            cmd::cmd_reset(&config, sections)?;
        }
        Commands::Report { report_dir } => {
            if let Some(dir) = report_dir {
                config.report_dir = dir.clone();
            }
            cmd::cmd_report(&config)?;
        }
        Commands::Status => {
            cmd::cmd_status(&config)?;
        }
    }

    Ok(())
}
