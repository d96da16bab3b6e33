//! Assay - analysis job runner
//!
//! Main entry point for the Assay CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::rolling::{RollingFileAppender, Rotation};

mod commands;

use commands::{analysis, archive, jobs, run, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Assay - run analysis workflows and collect their results
#[derive(Parser)]
#[command(name = "assay")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Load exactly this config file instead of discovering config layers
    #[arg(short, long, global = true, env = "ASSAY_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the HTTP API server
    Start(start::StartArgs),

    /// Manage analysis definitions
    Analysis(analysis::AnalysisArgs),

    /// Run an analysis and wait for it to finish
    Run(run::RunArgs),

    /// Inspect job records
    Jobs(jobs::JobsArgs),

    /// Write the result archive of a job
    Archive(archive::ArchiveArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "assay=debug,assay_jobs=debug,assay_server=debug,assay_config=debug,tower_http=debug,info"
    } else {
        "assay=info,assay_jobs=info,assay_server=info,warn"
    };

    let log_dir = assay_config::user_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let (file_writer, _guard) = match RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix("assay.log")
        .build(&log_dir)
    {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(e) => {
            eprintln!("warning: file logging disabled: {}", e);
            (None, None)
        }
    };

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "assay=trace,assay_jobs=trace,assay_server=trace,assay_config=trace,info",
                ))
        }))
        .init();

    let ctx = commands::Context::load(cli.config.as_deref(), cli.json, cli.verbose)?;

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Analysis(args) => analysis::run(args, &ctx).await,
        Commands::Run(args) => run::run(args, &ctx).await,
        Commands::Jobs(args) => jobs::run(args, &ctx).await,
        Commands::Archive(args) => archive::run(args, &ctx).await,
    }
}
