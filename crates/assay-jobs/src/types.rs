//! Records persisted by the job store.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::settings::AnalysisSettings;
use crate::{JobError, Result};

/// Lifecycle of a job record: `pending` then exactly one of `completed` or `failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }

    /// Status only moves forward. Re-applying the current status is allowed.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        *self == next || (*self == JobStatus::Pending && next.is_terminal())
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(JobError::Validation(format!("unknown job status '{other}'"))),
        }
    }
}

/// A stored analysis: a named workflow plus its parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisDefinition {
    pub id: String,
    pub name: String,
    pub settings: AnalysisSettings,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One tracked run of an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub analysis_id: String,
    /// Name of the owning analysis, if it still exists.
    pub analysis_name: Option<String>,
    pub status: JobStatus,
    pub output: Option<String>,
    /// Workspace-relative path of the report file, if one was produced.
    pub report: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validate an externally supplied identifier.
///
/// Identifiers double as directory names, so anything that is not a UUID is
/// rejected before it can reach the filesystem.
pub fn parse_id(raw: &str) -> Result<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.to_string())
        .map_err(|_| JobError::Validation(format!("malformed identifier '{raw}'")))
}

/// Generate a fresh identifier.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        use JobStatus::*;
        assert!(Pending.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Pending));
        assert!(Completed.can_transition_to(Completed));
        assert!(Failed.can_transition_to(Failed));

        assert!(!Completed.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Pending));
        assert!(!Failed.can_transition_to(Pending));
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in [JobStatus::Pending, JobStatus::Completed, JobStatus::Failed] {
            assert_eq!(status.as_str().parse::<JobStatus>().unwrap(), status);
        }
        assert!("running".parse::<JobStatus>().is_err());
        assert_eq!(
            serde_json::to_string(&JobStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_parse_id() {
        let id = new_id();
        assert_eq!(parse_id(&id).unwrap(), id);
        assert!(matches!(parse_id("42"), Err(JobError::Validation(_))));
        assert!(matches!(parse_id("../etc"), Err(JobError::Validation(_))));
    }
}
