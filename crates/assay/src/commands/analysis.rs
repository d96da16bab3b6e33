//! Analysis command - manage analysis definitions.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::{Args, Subcommand};
use console::{Style, style};

use assay_jobs::{AnalysisDefinition, AnalysisSettings, parse_id};

use super::Context;

/// Arguments for the analysis command.
#[derive(Args, Debug)]
pub struct AnalysisArgs {
    #[command(subcommand)]
    pub command: AnalysisCommand,
}

#[derive(Subcommand, Debug)]
pub enum AnalysisCommand {
    /// Create an analysis
    Create {
        /// Display name
        #[arg(short, long)]
        name: String,

        /// JSON file holding the settings document
        #[arg(short, long)]
        settings: Option<PathBuf>,
    },

    /// List analyses, newest first
    List {
        /// Only names containing this text (case-insensitive)
        #[arg(short, long)]
        search: Option<String>,
    },

    /// Show one analysis
    Show {
        /// Analysis ID
        id: String,
    },

    /// Delete an analysis (its jobs are kept)
    Delete {
        /// Analysis ID
        id: String,
    },
}

/// Run the analysis command.
pub async fn run(args: AnalysisArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;

    match args.command {
        AnalysisCommand::Create { name, settings } => {
            let settings = match settings {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("failed to read {}", path.display()))?;
                    AnalysisSettings::from_text(Some(&text))?
                }
                None => AnalysisSettings::default(),
            };
            let analysis = store.create_analysis(&name, &settings)?;

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                println!(
                    "{} Analysis created: {}",
                    Style::new().green().apply_to("✓"),
                    Style::new().dim().apply_to(&analysis.id)
                );
            }
        }
        AnalysisCommand::List { search } => {
            let analyses = store.list_analyses(search.as_deref())?;

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&analyses)?);
            } else if analyses.is_empty() {
                println!("No analyses");
            } else {
                println!("{}", style("Analyses").bold());
                for analysis in &analyses {
                    print_summary(analysis);
                }
            }
        }
        AnalysisCommand::Show { id } => {
            let analysis = store.get_analysis(&parse_id(&id)?)?;

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&analysis)?);
            } else {
                print_summary(&analysis);
                println!("{}", serde_json::to_string_pretty(&analysis.settings)?);
            }
        }
        AnalysisCommand::Delete { id } => {
            store.delete_analysis(&parse_id(&id)?)?;
            if !ctx.json_output {
                println!("Deleted {}", id);
            }
        }
    }

    Ok(())
}

fn print_summary(analysis: &AnalysisDefinition) {
    let dim = Style::new().dim();
    let steps = analysis
        .settings
        .workflow
        .as_deref()
        .map(assay_jobs::parse_steps)
        .unwrap_or_default();
    println!(
        "  {} {} {}",
        analysis.name,
        dim.apply_to(&analysis.id),
        dim.apply_to(format!("({} steps)", steps.len()))
    );
}
