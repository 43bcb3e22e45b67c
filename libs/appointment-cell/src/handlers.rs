// libs/appointment-cell/src/handlers.rs
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

use crate::models::{CancelAppointmentRequest, CreateAppointmentRequest};
use crate::services::orchestrator::AppointmentOrchestrator;

#[axum::debug_handler]
pub async fn create_appointment(
    State(orchestrator): State<Arc<AppointmentOrchestrator>>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    info!(
        "Create appointment request for patient {} ({} service(s))",
        request.patient_profile_id,
        request.service_ids.len()
    );

    let appointment = orchestrator.create_appointment(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment
        })),
    ))
}

pub async fn get_appointment(
    State(orchestrator): State<Arc<AppointmentOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = orchestrator.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

pub async fn check_in_appointment(
    State(orchestrator): State<Arc<AppointmentOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    info!("Check-in for appointment {}", appointment_id);

    let appointment = orchestrator.check_in(appointment_id).await?;
    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

pub async fn cancel_appointment(
    State(orchestrator): State<Arc<AppointmentOrchestrator>>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<CancelAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    info!("Cancel request for appointment {}: {}", appointment_id, request.reason);

    let appointment = orchestrator
        .cancel_appointment(appointment_id, &request.reason)
        .await?;
    Ok(Json(json!({
        "success": true,
        "appointment": appointment
    })))
}

pub async fn get_patient_appointments(
    State(orchestrator): State<Arc<AppointmentOrchestrator>>,
    Path(patient_profile_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointments = orchestrator
        .list_patient_appointments(patient_profile_id)
        .await?;
    Ok(Json(json!({
        "appointments": appointments,
        "total": appointments.len()
    })))
}
