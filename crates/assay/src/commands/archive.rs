//! Archive command - write a job's result archive to disk.

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use clap::Args;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use assay_jobs::parse_id;

use super::Context;

/// Arguments for the archive command.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Job ID
    pub job_id: String,

    /// Output file (default: result-<job-id>.zip)
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Run the archive command.
pub async fn run(args: ArchiveArgs, ctx: &Context) -> Result<()> {
    let job_id = parse_id(&args.job_id)?;
    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(format!("result-{job_id}.zip")));

    let mut stream = ctx.archives()?.stream(&job_id)?;
    let mut file = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("failed to create {}", output.display()))?;

    let mut written = 0usize;
    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&output).await;
                return Err(e).context("archive aborted");
            }
        };
        file.write_all(&chunk).await?;
        written += chunk.len();
    }
    file.flush().await?;

    if ctx.json_output {
        println!(
            "{}",
            serde_json::json!({ "job_id": job_id, "path": output.display().to_string(), "bytes": written })
        );
    } else {
        println!("Wrote {} ({} bytes)", output.display(), written);
    }
    Ok(())
}
