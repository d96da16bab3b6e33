use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use assay_jobs::{AnalysisDefinition, AnalysisSettings, parse_id};

use crate::error::Result;
use crate::routes::jobs::TriggerResponse;
use crate::state::AppState;

// ── Request/Response types ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateAnalysisRequest {
    pub name: String,
    #[serde(default)]
    pub settings: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateAnalysisRequest {
    #[serde(default)]
    pub name: Option<String>,
    /// Absent leaves settings alone; `null` clears them.
    #[serde(default, deserialize_with = "present")]
    pub settings: Option<Option<Value>>,
}

/// Maps a field that is present (even as `null`) to `Some`.
fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Option<Value>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub id: String,
    pub name: String,
    pub settings: Value,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AnalysisListResponse {
    pub analyses: Vec<AnalysisResponse>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisQuery {
    pub search: Option<String>,
}

fn to_analysis_response(analysis: &AnalysisDefinition) -> AnalysisResponse {
    AnalysisResponse {
        id: analysis.id.clone(),
        name: analysis.name.clone(),
        settings: analysis.settings.to_document(),
        created_at: analysis.created_at.to_rfc3339(),
        updated_at: analysis.updated_at.to_rfc3339(),
    }
}

// ── Handlers ────────────────────────────────────────────────────────

/// POST /api/v1/analyses
pub async fn create_analysis_handler(
    State(state): State<AppState>,
    Json(req): Json<CreateAnalysisRequest>,
) -> Result<impl IntoResponse> {
    let settings = AnalysisSettings::from_value(req.settings.unwrap_or(Value::Null))?;
    let analysis = state.store().create_analysis(&req.name, &settings)?;
    Ok((StatusCode::CREATED, Json(to_analysis_response(&analysis))))
}

/// GET /api/v1/analyses
pub async fn list_analyses_handler(
    State(state): State<AppState>,
    Query(query): Query<AnalysisQuery>,
) -> Result<Json<AnalysisListResponse>> {
    let analyses = state
        .store()
        .list_analyses(query.search.as_deref())?
        .iter()
        .map(to_analysis_response)
        .collect();
    Ok(Json(AnalysisListResponse { analyses }))
}

/// GET /api/v1/analyses/{id}
pub async fn get_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>> {
    let id = parse_id(&id)?;
    let analysis = state.store().get_analysis(&id)?;
    Ok(Json(to_analysis_response(&analysis)))
}

/// PUT /api/v1/analyses/{id}
pub async fn update_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAnalysisRequest>,
) -> Result<Json<AnalysisResponse>> {
    let id = parse_id(&id)?;
    let settings = req
        .settings
        .map(|value| AnalysisSettings::from_value(value.unwrap_or(Value::Null)))
        .transpose()?;
    let analysis = state
        .store()
        .update_analysis(&id, req.name.as_deref(), settings.as_ref())?;
    Ok(Json(to_analysis_response(&analysis)))
}

/// DELETE /api/v1/analyses/{id}
pub async fn delete_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let id = parse_id(&id)?;
    state.store().delete_analysis(&id)?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/analyses/{id}/run
///
/// Returns as soon as the job exists; progress is observed by polling the job.
pub async fn run_analysis_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let triggered = state.runner.trigger(&id)?;
    Ok((StatusCode::CREATED, Json(TriggerResponse::from(&triggered.job))))
}
