//! Generation and status route handlers.

use axum::extract::{Path, State};
use axum::response::Json;
use serde::Serialize;
use serde_json::{json, Value};

use super::AppState;
use crate::error::ApiError;
use crate::models::{
    CreateTestDataRequest, GenerationStatus, GenerationSummary, SessionGenerationStatus,
    SessionInfo,
};
use crate::orchestrator::RunOutcome;

/// Response body of `POST /api/create-test-data`.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CreateTestDataResponse {
    Completed(GenerationSummary),
    AlreadyRunning {
        message: String,
        status: String,
        session_id: String,
    },
}

/// GET /api/health
pub async fn health_check() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// POST /api/create-test-data
///
/// Runs a generation for the session named in the body. Returns the run
/// summary on success, an `already_running` acknowledgment if the session
/// already has an active run, or an error per the run contract.
pub async fn create_test_data(
    State(state): State<AppState>,
    Json(request): Json<CreateTestDataRequest>,
) -> Result<Json<CreateTestDataResponse>, ApiError> {
    match state.orchestrator.run(&request.session_id).await? {
        RunOutcome::Completed(summary) => Ok(Json(CreateTestDataResponse::Completed(summary))),
        RunOutcome::AlreadyRunning { session_id } => {
            Ok(Json(CreateTestDataResponse::AlreadyRunning {
                message: "Generation already running for this session".to_string(),
                status: "already_running".to_string(),
                session_id: session_id.chars().take(8).collect(),
            }))
        }
    }
}

/// GET /api/generation-status
pub async fn generation_status(State(state): State<AppState>) -> Json<GenerationStatus> {
    Json(state.registry.generation_status().await)
}

/// GET /api/generation-status/:session_id
pub async fn session_generation_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionGenerationStatus>, ApiError> {
    state
        .registry
        .session_generation_status(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::InvalidRequest("session not found".into()))
}

/// GET /api/session-info
pub async fn session_info(State(state): State<AppState>) -> Json<SessionInfo> {
    Json(SessionInfo {
        active_sessions: state.registry.session_count().await,
        has_connections: state.registry.has_active_connections().await,
        any_active_generation: state.registry.has_any_active_generation().await,
    })
}

/// POST /api/generation-pause/:session_id
pub async fn pause_generation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionGenerationStatus>, ApiError> {
    if !state.registry.pause_generation(&session_id).await {
        return Err(ApiError::InvalidRequest(
            "no active generation to pause".into(),
        ));
    }
    session_generation_status(State(state), Path(session_id)).await
}

/// POST /api/generation-resume/:session_id
pub async fn resume_generation(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionGenerationStatus>, ApiError> {
    if !state.registry.resume_generation(&session_id).await {
        return Err(ApiError::InvalidRequest(
            "no paused generation to resume".into(),
        ));
    }
    session_generation_status(State(state), Path(session_id)).await
}
