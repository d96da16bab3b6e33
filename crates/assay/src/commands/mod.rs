//! CLI command handlers.

pub mod analysis;
pub mod archive;
pub mod jobs;
pub mod run;
pub mod start;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use console::Style;

use assay_config::{AssayConfig, LoadedConfig};
use assay_jobs::{
    ArchiveBuilder, ArtifactStore, ExecutorConfig, Interpreters, JobRecord, JobStatus, JobStore,
    PipelineRunner, StepExecutor,
};

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration.
    pub config: AssayConfig,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    /// Load configuration, either from one explicit file or by discovery.
    ///
    /// An explicit file that cannot be loaded is fatal; a broken discovered
    /// layer is only a warning.
    pub fn load(explicit: Option<&Path>, json_output: bool, verbose: bool) -> Result<Self> {
        let loaded = match explicit {
            Some(path) => LoadedConfig::from_file(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => assay_config::load_config(None)?,
        };

        for warning in &loaded.warnings {
            eprintln!("warning: {}", warning);
        }

        if verbose {
            let sources = loaded.loaded_from();
            if sources.is_empty() {
                eprintln!("No config files found, using defaults");
            } else {
                for source in sources {
                    eprintln!("Loaded config: {}", source.display());
                }
            }
        }

        Ok(Self {
            config: loaded.config,
            json_output,
            verbose,
        })
    }

    /// Open the job database.
    pub fn open_store(&self) -> Result<Arc<JobStore>> {
        let path = self.config.database_path();
        let store = JobStore::open(&path)
            .with_context(|| format!("failed to open database {}", path.display()))?;
        Ok(Arc::new(store))
    }

    fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(
            self.config.results_dir(),
            self.config.pipeline().shared_document,
        )
    }

    /// Build a runner wired to the configured database, results and steps.
    pub fn runner(&self) -> Result<PipelineRunner> {
        let pipeline = self.config.pipeline();
        let executor = StepExecutor::new(
            ExecutorConfig::new(&pipeline.steps_dir)
                .with_interpreters(Interpreters {
                    python: pipeline.python.clone(),
                    node: pipeline.node.clone(),
                })
                .with_workspace_env(&pipeline.workspace_env)
                .with_timeout(pipeline.step_timeout()),
        );
        Ok(PipelineRunner::new(
            self.open_store()?,
            self.artifacts(),
            executor,
            pipeline.report_file,
        ))
    }

    pub fn archives(&self) -> Result<ArchiveBuilder> {
        Ok(ArchiveBuilder::new(self.open_store()?, self.artifacts()))
    }
}

/// Print a job record the way every command shows it.
pub fn print_job(job: &JobRecord, ctx: &Context) -> Result<()> {
    if ctx.json_output {
        println!("{}", serde_json::to_string_pretty(job)?);
        return Ok(());
    }

    let dim = Style::new().dim();
    let status = match job.status {
        JobStatus::Pending => Style::new().yellow(),
        JobStatus::Completed => Style::new().green(),
        JobStatus::Failed => Style::new().red(),
    };

    println!("{} {}", status.apply_to(job.status), job.id);
    println!(
        "  analysis: {} {}",
        job.analysis_name.as_deref().unwrap_or("(deleted)"),
        dim.apply_to(&job.analysis_id)
    );
    println!("  created:  {}", job.created_at.to_rfc3339());
    if let Some(output) = &job.output {
        println!("  output:   {}", output);
    }
    if let Some(report) = &job.report {
        println!("  report:   {}", report);
    }
    Ok(())
}
