//! API routes.

pub mod analyses;
pub mod health;
pub mod jobs;

pub use analyses::{
    AnalysisListResponse, AnalysisResponse, CreateAnalysisRequest, UpdateAnalysisRequest,
    create_analysis_handler, delete_analysis_handler, get_analysis_handler,
    list_analyses_handler, run_analysis_handler, update_analysis_handler,
};
pub use health::{HealthResponse, health_routes};
pub use jobs::{
    JobListResponse, JobResponse, TriggerResponse, download_handler, get_job_handler,
    list_jobs_handler,
};

#[cfg(test)]
pub(crate) mod test_support {
    use std::path::PathBuf;
    use std::sync::Arc;

    use axum::Router;
    use axum::response::Response;
    use serde::de::DeserializeOwned;
    use serde_json::Value;
    use tempfile::TempDir;

    use assay_jobs::{
        AnalysisSettings, ArtifactStore, ExecutorConfig, Interpreters, JobRecord, JobStore,
        PipelineRunner, StepExecutor,
    };

    use crate::{AppState, Server, ServerConfig};

    /// In-process app over an in-memory store, with shell scripts as steps.
    pub struct TestApp {
        dir: TempDir,
        state: AppState,
    }

    impl TestApp {
        pub fn new() -> Self {
            let dir = TempDir::new().unwrap();
            std::fs::create_dir_all(dir.path().join("steps")).unwrap();

            let executor = StepExecutor::new(
                ExecutorConfig::new(dir.path().join("steps")).with_interpreters(Interpreters {
                    python: "sh".to_string(),
                    node: "sh".to_string(),
                }),
            );
            let runner = PipelineRunner::new(
                Arc::new(JobStore::open_in_memory().unwrap()),
                ArtifactStore::new(dir.path().join("results"), "data.json"),
                executor,
                "report.docx",
            );
            let config = ServerConfig::new().with_request_logging(false);
            Self {
                dir,
                state: AppState::new(runner, config),
            }
        }

        pub fn router(&self) -> Router {
            Server::from_state(self.state.clone()).router()
        }

        pub fn script(&self, name: &str, body: &str) {
            std::fs::write(self.dir.path().join("steps").join(name), body).unwrap();
        }

        pub fn analysis(&self, name: &str, settings: Value) -> String {
            let settings = AnalysisSettings::from_value(settings).unwrap();
            self.state.store().create_analysis(name, &settings).unwrap().id
        }

        pub async fn run(&self, analysis_id: &str) -> JobRecord {
            self.state.runner.run_to_completion(analysis_id).await.unwrap()
        }

        pub fn workspace(&self, job_id: &str) -> PathBuf {
            self.dir.path().join("results").join(job_id)
        }
    }

    pub async fn body_json<T: DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }
}
