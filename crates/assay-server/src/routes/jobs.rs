use axum::{
    Json,
    body::Body,
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use assay_jobs::{JobRecord, parse_id};

use crate::error::Result;
use crate::state::AppState;

// ── Request/Response types ──────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub job_id: String,
    pub analysis_id: String,
    pub status: String,
    pub created_at: String,
}

impl From<&JobRecord> for TriggerResponse {
    fn from(job: &JobRecord) -> Self {
        Self {
            job_id: job.id.clone(),
            analysis_id: job.analysis_id.clone(),
            status: job.status.to_string(),
            created_at: job.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: String,
    pub analysis_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_name: Option<String>,
    pub status: String,
    pub output: Option<String>,
    pub report: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct JobListResponse {
    pub jobs: Vec<JobResponse>,
}

#[derive(Debug, Deserialize)]
pub struct JobQuery {
    pub analysis_id: Option<String>,
}

fn to_job_response(job: &JobRecord) -> JobResponse {
    JobResponse {
        id: job.id.clone(),
        analysis_id: job.analysis_id.clone(),
        analysis_name: job.analysis_name.clone(),
        status: job.status.to_string(),
        output: job.output.clone(),
        report: job.report.clone(),
        created_at: job.created_at.to_rfc3339(),
        updated_at: job.updated_at.to_rfc3339(),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// GET /api/v1/jobs
pub async fn list_jobs_handler(
    State(state): State<AppState>,
    Query(query): Query<JobQuery>,
) -> Result<Json<JobListResponse>> {
    let analysis_id = query.analysis_id.as_deref().map(parse_id).transpose()?;
    let jobs = state
        .store()
        .list_jobs(analysis_id.as_deref())?
        .iter()
        .map(to_job_response)
        .collect();
    Ok(Json(JobListResponse { jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobResponse>> {
    let id = parse_id(&id)?;
    let job = state.store().get_job(&id)?;
    Ok(Json(to_job_response(&job)))
}

/// GET /api/v1/jobs/{id}/download
///
/// Streams a zip of the job's workspace as it is being built.
pub async fn download_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response> {
    let id = parse_id(&id)?;
    let stream = state.archives.stream(&id)?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"result-{id}.zip\""),
            ),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}
