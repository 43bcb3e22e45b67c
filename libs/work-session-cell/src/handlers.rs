use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::AppError;

use crate::models::OpenSessionRequest;
use crate::services::scheduler::WorkSessionScheduler;

/// Schedule a session on a booth for an explicit time window
pub async fn open_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Json(request): Json<OpenSessionRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    info!(
        "Open session request for booth {} ({} - {})",
        request.booth_id, request.start_time, request.end_time
    );

    let session = scheduler.open_session(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "session": session
        })),
    ))
}

pub async fn get_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = scheduler.get_session(session_id).await?;
    Ok(Json(json!(session)))
}

pub async fn list_booth_sessions(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(booth_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let sessions = scheduler.list_sessions(booth_id).await;
    Ok(Json(json!({
        "sessions": sessions,
        "total": sessions.len()
    })))
}

pub async fn activate_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = scheduler.activate_session(session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

pub async fn pause_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = scheduler.pause_session(session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

pub async fn resume_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let session = scheduler.resume_session(session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}

pub async fn close_session(
    State(scheduler): State<Arc<WorkSessionScheduler>>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    info!("Close request for session {}", session_id);

    let session = scheduler.close_session(session_id).await?;
    Ok(Json(json!({ "success": true, "session": session })))
}
