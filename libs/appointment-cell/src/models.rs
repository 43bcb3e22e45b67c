// libs/appointment-cell/src/models.rs
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use service_queue_cell::{PatientPriorityProfile, PrescriptionService, PriorityBand};
use shared_models::AttributeDocument;

// ==============================================================================
// APPOINTMENT STATUS
// ==============================================================================

/// Aggregate status of an appointment, derived from its tasks on every read.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "SCHEDULED"),
            AppointmentStatus::InProgress => write!(f, "IN_PROGRESS"),
            AppointmentStatus::Completed => write!(f, "COMPLETED"),
            AppointmentStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

// ==============================================================================
// APPOINTMENT
// ==============================================================================

/// A patient's visit. Holds identifiers only; tasks live in the queue engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_profile_id: Uuid,
    pub specialty_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub service_ids: Vec<Uuid>,
    pub scheduled_date: NaiveDate,
    pub prescription_id: Uuid,
    pub prescription_code: String,
    pub task_ids: Vec<Uuid>,
    pub priority: PriorityBand,
    /// Free-form data (emergency contact, intake answers). Stored, never inspected.
    pub attributes: AttributeDocument,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_profile_id: Uuid,
    pub specialty_id: Uuid,
    pub service_ids: Vec<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub scheduled_date: NaiveDate,
    pub priority_profile: Option<PatientPriorityProfile>,
    #[serde(default)]
    pub attributes: AttributeDocument,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
}

/// An appointment together with its derived status and current task states.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentView {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub status: AppointmentStatus,
    pub tasks: Vec<PrescriptionService>,
}
