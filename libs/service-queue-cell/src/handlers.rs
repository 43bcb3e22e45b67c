use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;
use uuid::Uuid;

use shared_models::AppError;

use crate::{router::QueueState, CallOutcome};

#[derive(Debug, Deserialize)]
pub struct SnapshotQuery {
    pub booth_id: Option<Uuid>,
    pub specialty_id: Option<Uuid>,
}

#[derive(Debug, Deserialize, Default)]
pub struct CompleteTaskRequest {
    pub results: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct RecallRequest {
    pub booth_id: Uuid,
}

/// Call the next patient to a booth
pub async fn call_next(
    State(state): State<QueueState>,
    Path(booth_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    info!("Call-next request for booth: {}", booth_id);

    let outcome = state.dispatcher.call_next(booth_id).await?;
    let response = match outcome {
        CallOutcome::Called { task, assignment } => json!({
            "success": true,
            "outcome": "called",
            "task": task,
            "assignment": assignment
        }),
        CallOutcome::QueueEmpty => json!({
            "success": true,
            "outcome": "queue_empty"
        }),
    };
    Ok(Json(response))
}

/// Ranked queue for a booth or a specialty
pub async fn get_snapshot(
    State(state): State<QueueState>,
    Query(query): Query<SnapshotQuery>,
) -> Result<Json<Value>, AppError> {
    let snapshot = match (query.booth_id, query.specialty_id) {
        (Some(booth_id), _) => state.dispatcher.snapshot_for_booth(booth_id).await?,
        (None, Some(specialty_id)) => state.dispatcher.snapshot_for_specialty(specialty_id).await,
        (None, None) => {
            return Err(AppError::BadRequest(
                "booth_id or specialty_id is required".to_string(),
            ))
        }
    };

    Ok(Json(json!(snapshot)))
}

pub async fn get_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.engine.get_task(task_id).await?;
    Ok(Json(json!(task)))
}

pub async fn start_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.start(task_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn skip_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.skip(task_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn complete_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<CompleteTaskRequest>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.complete(task_id, request.results).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn await_task_result(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.await_result(task_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn mark_task_returning(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.mark_returning(task_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn delay_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let task = state.dispatcher.delay(task_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn recall_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<RecallRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Recall request for task {} to booth {}", task_id, request.booth_id);

    let task = state.dispatcher.recall(task_id, request.booth_id).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn cancel_task(
    State(state): State<QueueState>,
    Path(task_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Cancel request for task {}: {}", task_id, request.reason);

    let task = state.dispatcher.cancel(task_id, &request.reason).await?;
    Ok(Json(json!({ "success": true, "task": task })))
}

pub async fn get_prescription(
    State(state): State<QueueState>,
    Path(prescription_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let prescription = state.engine.get_prescription(prescription_id).await?;
    let tasks = state.engine.list_tasks(prescription_id).await?;

    Ok(Json(json!({
        "prescription": prescription,
        "tasks": tasks
    })))
}

pub async fn get_prescription_by_code(
    State(state): State<QueueState>,
    Path(code): Path<String>,
) -> Result<Json<Value>, AppError> {
    let prescription = state.engine.get_prescription_by_code(&code).await?;
    let tasks = state.engine.list_tasks(prescription.id).await?;

    Ok(Json(json!({
        "prescription": prescription,
        "tasks": tasks
    })))
}

pub async fn cancel_prescription(
    State(state): State<QueueState>,
    Path(prescription_id): Path<Uuid>,
    Json(request): Json<CancelRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Cancel request for prescription {}: {}", prescription_id, request.reason);

    let cancelled = state
        .dispatcher
        .cancel_prescription(prescription_id, &request.reason)
        .await?;

    Ok(Json(json!({
        "success": true,
        "cancelled_tasks": cancelled.len()
    })))
}
