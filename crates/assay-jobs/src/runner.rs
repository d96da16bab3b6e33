//! Pipeline runner.
//!
//! Turns a trigger into a job: allocates and seeds the workspace, inserts the
//! `pending` record, then drives the steps one after another on a background
//! task. The first failing step ends the run as `failed`; a run whose steps
//! all succeed (including a run with no steps) ends as `completed`.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::directory::ArtifactStore;
use crate::executor::StepExecutor;
use crate::store::{JobOutcome, JobStore};
use crate::types::{JobRecord, JobStatus, new_id, parse_id};
use crate::workflow::Workflow;
use crate::{JobError, Result};

/// A freshly triggered job and the task executing it.
pub struct TriggeredJob {
    /// The record as inserted, always `pending`.
    pub job: JobRecord,
    /// Resolves to the terminal status once every step has been attempted.
    pub handle: JoinHandle<JobStatus>,
}

/// Everything one run needs, passed explicitly into its task.
struct JobContext {
    job_id: String,
    workspace: PathBuf,
    workflow: Workflow,
}

/// Orchestrates runs of stored analyses.
#[derive(Clone)]
pub struct PipelineRunner {
    store: Arc<JobStore>,
    artifacts: ArtifactStore,
    executor: Arc<StepExecutor>,
    report_file: String,
}

impl PipelineRunner {
    pub fn new(
        store: Arc<JobStore>,
        artifacts: ArtifactStore,
        executor: StepExecutor,
        report_file: impl Into<String>,
    ) -> Self {
        Self {
            store,
            artifacts,
            executor: Arc::new(executor),
            report_file: report_file.into(),
        }
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    pub fn artifacts(&self) -> &ArtifactStore {
        &self.artifacts
    }

    /// Start a run of `analysis_id` and return as soon as its record exists.
    ///
    /// Nothing is created when the identifier is malformed, the analysis is
    /// unknown, or its workflow names an unsupported step. The workspace is
    /// created and seeded before the record is inserted, so a record never
    /// exists without its workspace.
    pub fn trigger(&self, analysis_id: &str) -> Result<TriggeredJob> {
        let analysis_id = parse_id(analysis_id)?;
        let analysis = self.store.get_analysis(&analysis_id)?;
        let workflow = Workflow::resolve(&analysis.settings)
            .map_err(|e| JobError::Validation(e.to_string()))?;

        let job_id = new_id();
        let workspace = self.artifacts.create_for(&job_id)?;
        if let Err(e) = self.artifacts.seed(&job_id, &analysis.settings.to_document()) {
            self.discard_workspace(&job_id);
            return Err(e);
        }

        let job = match self.store.create_job(&job_id, &analysis.id) {
            Ok(job) => job,
            Err(e) => {
                self.discard_workspace(&job_id);
                return Err(e);
            }
        };

        let span = tracing::info_span!("job", job_id = %job.id, analysis_id = %analysis.id);
        span.in_scope(|| {
            tracing::info!(
                analysis = %analysis.name,
                steps = workflow.len(),
                workspace = %workspace.display(),
                "Job created"
            );
        });

        let ctx = JobContext {
            job_id: job.id.clone(),
            workspace,
            workflow,
        };
        let runner = self.clone();
        let handle = tokio::spawn(async move { runner.execute(ctx).await }.instrument(span));

        Ok(TriggeredJob { job, handle })
    }

    /// Trigger a run and wait for it to reach a terminal status.
    pub async fn run_to_completion(&self, analysis_id: &str) -> Result<JobRecord> {
        let TriggeredJob { job, handle } = self.trigger(analysis_id)?;
        if let Err(e) = handle.await {
            tracing::error!(job_id = %job.id, error = %e, "Job task did not finish");
        }
        self.store.get_job(&job.id)
    }

    async fn execute(self, ctx: JobContext) -> JobStatus {
        let total = ctx.workflow.len();

        for (index, step) in ctx.workflow.steps().iter().enumerate() {
            tracing::debug!(step = %step, position = index + 1, total, "Running step");
            if let Err(e) = self.executor.run(step, &ctx.workspace).await {
                tracing::warn!(step = %step, error = %e, "Step failed, stopping job");
                let outcome = JobOutcome {
                    output: Some(format!("{e}")),
                    report: self.report_path(&ctx),
                };
                return self.finish(&ctx, JobStatus::Failed, outcome);
            }
        }

        let outcome = JobOutcome {
            output: Some(format!("{total} of {total} steps completed")),
            report: self.report_path(&ctx),
        };
        self.finish(&ctx, JobStatus::Completed, outcome)
    }

    fn finish(&self, ctx: &JobContext, status: JobStatus, outcome: JobOutcome) -> JobStatus {
        match self.store.finalize(&ctx.job_id, status, outcome) {
            Ok(_) => tracing::info!(status = %status, "Job finished"),
            Err(e) => tracing::error!(status = %status, error = %e, "Failed to record job status"),
        }
        status
    }

    /// Workspace-relative path of the report, if the workflow produced one.
    fn report_path(&self, ctx: &JobContext) -> Option<String> {
        ctx.workspace
            .join(&self.report_file)
            .is_file()
            .then(|| self.report_file.clone())
    }

    fn discard_workspace(&self, job_id: &str) {
        if let Err(e) = self.artifacts.discard(job_id) {
            tracing::warn!(job_id, error = %e, "Failed to remove abandoned workspace");
        }
    }
}
