use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use clinic_cell::ServiceProfile;
use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    NotStarted,
    Pending,
    Waiting,
    Preparing,
    Serving,
    WaitingResult,
    Returning,
    Completed,
    Delayed,
    Cancelled,
    Skipped,
}

impl ServiceStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ServiceStatus::Completed | ServiceStatus::Cancelled)
    }

    /// Statuses the queue ranks and `call` accepts.
    pub fn is_callable(&self) -> bool {
        matches!(self, ServiceStatus::Waiting | ServiceStatus::Skipped)
    }

    /// Statuses during which the task holds a seat on a work session.
    pub fn holds_session(&self) -> bool {
        matches!(self, ServiceStatus::Preparing | ServiceStatus::Serving)
    }

    /// Admitted and not yet finished. Delayed tasks wait on an operator and do not block the prescription.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            ServiceStatus::Waiting
                | ServiceStatus::Preparing
                | ServiceStatus::Serving
                | ServiceStatus::WaitingResult
                | ServiceStatus::Returning
                | ServiceStatus::Skipped
        )
    }

    pub fn can_transition_to(&self, target: &ServiceStatus) -> bool {
        use ServiceStatus::*;
        match (self, target) {
            (NotStarted, Pending) => true,
            (Pending, Waiting) => true,
            (Waiting, Preparing) | (Waiting, Skipped) | (Waiting, Delayed) => true,
            (Preparing, Serving) | (Preparing, Delayed) | (Preparing, Skipped) => true,
            (Serving, WaitingResult) | (Serving, Completed) => true,
            (WaitingResult, Returning) | (WaitingResult, Completed) => true,
            (Returning, Completed) => true,
            (Skipped, Waiting) | (Skipped, Preparing) | (Skipped, Delayed) => true,
            (Delayed, Preparing) => true,
            (NotStarted | Pending | Waiting | Preparing | Serving | Skipped | Delayed, Cancelled) => true,
            _ => false,
        }
    }
}

/// Outermost queue ordering key. Declared most urgent first so that ascending order serves it first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PriorityBand {
    VeryHigh,
    High,
    #[default]
    Normal,
    Low,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PatientPriorityProfile {
    pub age: Option<u32>,
    pub pregnancy_weeks: Option<u32>,
    #[serde(default)]
    pub is_disabled: bool,
}

/// A queued service task.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionService {
    pub id: Uuid,
    pub prescription_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub service_id: Uuid,
    pub specialty_id: Uuid,
    pub order: u32,
    pub status: ServiceStatus,
    pub priority: PriorityBand,
    pub duration_minutes: u32,
    pub requires_doctor: bool,
    pub requires_technician: bool,
    pub preferred_doctor_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub booth_id: Option<Uuid>,
    pub work_session_id: Option<Uuid>,
    pub call_count: u32,
    pub skip_count: u32,
    pub results: Option<String>,
    pub cancellation_reason: Option<String>,
    /// Last time the task entered the queue; refreshed on every re-entry.
    pub queued_at: Option<DateTime<Utc>>,
    pub called_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type QueueRank = (PriorityBand, u32, u32, DateTime<Utc>, u64);

impl PrescriptionService {
    pub fn queue_rank(&self) -> QueueRank {
        (
            self.priority,
            self.order,
            self.skip_count,
            self.queued_at.unwrap_or(self.created_at),
            self.sequence,
        )
    }

    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: Uuid,
    pub code: String,
    pub patient_profile_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    pub priority: PriorityBand,
    /// Task ids in ascending `order`.
    pub task_ids: Vec<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_profile_id: Uuid,
    pub appointment_id: Option<Uuid>,
    pub doctor_id: Option<Uuid>,
    #[serde(default)]
    pub priority: PriorityBand,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub service_id: Uuid,
    pub specialty_id: Uuid,
    pub order: u32,
    pub duration_minutes: u32,
    pub requires_doctor: bool,
    #[serde(default)]
    pub requires_technician: bool,
    pub preferred_doctor_id: Option<Uuid>,
}

impl ServiceRequest {
    pub fn from_profile(profile: &ServiceProfile, order: u32, preferred_doctor_id: Option<Uuid>) -> Self {
        Self {
            service_id: profile.id,
            specialty_id: profile.specialty_id,
            order,
            duration_minutes: profile.duration_minutes,
            requires_doctor: profile.requires_doctor,
            requires_technician: profile.requires_technician,
            preferred_doctor_id: if profile.requires_doctor {
                preferred_doctor_id
            } else {
                None
            },
        }
    }
}

/// Booth and staff bound to a task when it is claimed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub booth_id: Uuid,
    pub work_session_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
}

/// Result of a transition that may have given up a work-session seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTransition {
    pub task: PrescriptionService,
    pub previous: ServiceStatus,
    pub released_session: Option<Uuid>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueFilter {
    pub specialty_id: Option<Uuid>,
    pub service_ids: Option<Vec<Uuid>>,
    pub booth_id: Option<Uuid>,
}

impl QueueFilter {
    pub fn for_specialty(specialty_id: Uuid) -> Self {
        Self {
            specialty_id: Some(specialty_id),
            ..Self::default()
        }
    }

    pub fn matches_service(&self, task: &PrescriptionService) -> bool {
        self.specialty_id.map_or(true, |id| task.specialty_id == id)
            && self
                .service_ids
                .as_ref()
                .map_or(true, |ids| ids.contains(&task.service_id))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub position: usize,
    pub task_id: Uuid,
    pub prescription_id: Uuid,
    pub service_id: Uuid,
    pub status: ServiceStatus,
    pub priority: PriorityBand,
    pub order: u32,
    pub skip_count: u32,
    pub estimated_wait_minutes: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot {
    pub generated_at: DateTime<Utc>,
    pub waiting: Vec<QueueEntry>,
    pub in_service: Vec<PrescriptionService>,
    pub delayed: Vec<PrescriptionService>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CallOutcome {
    Called {
        task: PrescriptionService,
        assignment: Assignment,
    },
    QueueEmpty,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QueueEvent {
    TaskCalled {
        task_id: Uuid,
        appointment_id: Option<Uuid>,
        booth_id: Uuid,
        call_count: u32,
    },
    TaskSkipped {
        task_id: Uuid,
        appointment_id: Option<Uuid>,
        skip_count: u32,
        status: ServiceStatus,
    },
    ServiceCompleted {
        task_id: Uuid,
        appointment_id: Option<Uuid>,
        service_id: Uuid,
        results: Option<String>,
    },
    MedicalRecordNeeded {
        appointment_id: Uuid,
        doctor_id: Uuid,
    },
    TaskCancelled {
        task_id: Uuid,
        appointment_id: Option<Uuid>,
        reason: String,
    },
    AppointmentCancelled {
        appointment_id: Uuid,
        reason: String,
    },
}

impl QueueEvent {
    pub fn appointment_id(&self) -> Option<Uuid> {
        match self {
            QueueEvent::TaskCalled { appointment_id, .. }
            | QueueEvent::TaskSkipped { appointment_id, .. }
            | QueueEvent::ServiceCompleted { appointment_id, .. }
            | QueueEvent::TaskCancelled { appointment_id, .. } => *appointment_id,
            QueueEvent::MedicalRecordNeeded { appointment_id, .. }
            | QueueEvent::AppointmentCancelled { appointment_id, .. } => Some(*appointment_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct QueuePolicy {
    pub skip_threshold: u32,
    pub no_show_grace_seconds: u64,
    pub no_show_sweep_interval_seconds: u64,
    pub max_claim_attempts: u32,
    pub sequential_services: bool,
}

impl Default for QueuePolicy {
    fn default() -> Self {
        Self {
            skip_threshold: 3,
            no_show_grace_seconds: 300,
            no_show_sweep_interval_seconds: 30,
            max_claim_attempts: 5,
            sequential_services: false,
        }
    }
}

impl From<&AppConfig> for QueuePolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            skip_threshold: config.skip_threshold,
            no_show_grace_seconds: config.no_show_grace_seconds,
            no_show_sweep_interval_seconds: config.no_show_sweep_interval_seconds,
            max_claim_attempts: config.max_claim_attempts,
            sequential_services: config.sequential_services,
        }
    }
}
