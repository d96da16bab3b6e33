use std::path::PathBuf;

use thiserror::Error;

use crate::types::JobStatus;

#[derive(Debug, Error)]
pub enum JobError {
    /// Malformed identifiers or parameters, rejected before any run state exists.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Analysis not found: {0}")]
    AnalysisNotFound(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    /// The job record exists but its artifact directory does not.
    #[error("Workspace for job {0} is missing")]
    WorkspaceMissing(String),

    #[error("Artifact directory already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Invalid status transition for job {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: JobStatus,
        to: JobStatus,
    },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
}

impl JobError {
    /// Whether this error means "the thing asked for does not exist".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            JobError::AnalysisNotFound(_) | JobError::JobNotFound(_) | JobError::WorkspaceMissing(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, JobError>;
