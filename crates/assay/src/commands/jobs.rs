//! Jobs command - inspect job records.

use anyhow::Result;
use clap::{Args, Subcommand};
use console::style;

use assay_jobs::parse_id;

use super::{Context, print_job};

/// Arguments for the jobs command.
#[derive(Args, Debug)]
pub struct JobsArgs {
    #[command(subcommand)]
    pub command: Option<JobsCommand>,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List jobs, newest first (default)
    List {
        /// Only jobs of this analysis
        #[arg(short, long)]
        analysis: Option<String>,
    },

    /// Show one job
    Show {
        /// Job ID
        id: String,
    },
}

/// Run the jobs command.
pub async fn run(args: JobsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let cmd = args.command.unwrap_or(JobsCommand::List { analysis: None });

    match cmd {
        JobsCommand::List { analysis } => {
            let analysis = analysis.as_deref().map(parse_id).transpose()?;
            let jobs = store.list_jobs(analysis.as_deref())?;

            if ctx.json_output {
                println!("{}", serde_json::to_string_pretty(&jobs)?);
            } else if jobs.is_empty() {
                println!("No jobs");
            } else {
                println!("{}", style("Jobs").bold());
                for job in &jobs {
                    print_job(job, ctx)?;
                }
            }
        }
        JobsCommand::Show { id } => {
            let job = store.get_job(&parse_id(&id)?)?;
            print_job(&job, ctx)?;
        }
    }

    Ok(())
}
