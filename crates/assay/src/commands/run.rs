//! Run command - run an analysis in-process and wait for the outcome.

use anyhow::{Result, bail};
use clap::Args;

use assay_jobs::JobStatus;

use super::{Context, print_job};

/// Arguments for the run command.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Analysis ID
    pub analysis_id: String,
}

/// Run the run command. Exits non-zero if the job fails.
pub async fn run(args: RunArgs, ctx: &Context) -> Result<()> {
    let runner = ctx.runner()?;
    let job = runner.run_to_completion(&args.analysis_id).await?;

    print_job(&job, ctx)?;

    if job.status != JobStatus::Completed {
        bail!("job {} {}", job.id, job.status);
    }
    Ok(())
}
