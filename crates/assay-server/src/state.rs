//! Application state shared across handlers.

use std::sync::Arc;

use assay_jobs::{ArchiveBuilder, JobStore, PipelineRunner};

use crate::config::ServerConfig;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Job runner; also owns the record store and artifact directories.
    pub runner: PipelineRunner,

    /// Builds download archives.
    pub archives: ArchiveBuilder,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state around a runner.
    pub fn new(runner: PipelineRunner, config: ServerConfig) -> Self {
        let archives = ArchiveBuilder::new(runner.store().clone(), runner.artifacts().clone());
        Self {
            runner,
            archives,
            config: Arc::new(config),
        }
    }

    /// The record store.
    pub fn store(&self) -> &JobStore {
        self.runner.store()
    }
}
