use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkSessionStatus {
    Scheduled,
    Active,
    Paused,
    Closed,
}

impl WorkSessionStatus {
    pub fn is_closed(&self) -> bool {
        matches!(self, WorkSessionStatus::Closed)
    }

    pub fn can_transition_to(&self, target: &WorkSessionStatus) -> bool {
        use WorkSessionStatus::*;
        match (self, target) {
            (Scheduled, Active) => true,
            (Active, Paused) => true,
            (Paused, Active) => true,
            (_, Closed) => !self.is_closed(),
            _ => false,
        }
    }
}

/// A booth reserved for a staff pairing over `[start_time, end_time)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkSession {
    pub id: Uuid,
    pub booth_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub next_available_at: DateTime<Utc>,
    pub status: WorkSessionStatus,
    /// Tasks currently called to or being served at this session.
    pub active_task_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkSession {
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        windows_overlap(self.start_time, self.end_time, start, end)
    }

    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.start_time <= at && at < self.end_time
    }

    pub fn is_staff_free(&self) -> bool {
        self.active_task_ids.is_empty()
    }

    pub fn staff_ids(&self) -> impl Iterator<Item = Uuid> {
        self.doctor_id.into_iter().chain(self.technician_id)
    }
}

/// Half-open windows `[start1, end1)` and `[start2, end2)` overlap when each starts before the other ends.
pub fn windows_overlap(
    start1: DateTime<Utc>,
    end1: DateTime<Utc>,
    start2: DateTime<Utc>,
    end2: DateTime<Utc>,
) -> bool {
    start1 < end2 && start2 < end1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSessionRequest {
    pub booth_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservationRequest {
    pub task_id: Uuid,
    pub booth_ids: Vec<Uuid>,
    pub specialty_id: Uuid,
    pub requires_doctor: bool,
    pub requires_technician: bool,
    pub preferred_doctor_id: Option<Uuid>,
    pub duration_minutes: u32,
}

impl ReservationRequest {
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes as i64)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Reservation {
    pub session_id: Uuid,
    pub booth_id: Uuid,
    pub task_id: Uuid,
    pub doctor_id: Option<Uuid>,
    pub technician_id: Option<Uuid>,
    pub reserved_from: DateTime<Utc>,
    pub reserved_until: DateTime<Utc>,
    /// True when the session was opened on demand for this reservation.
    pub opened_session: bool,
}

#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    pub default_session_minutes: i64,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            default_session_minutes: 240,
        }
    }
}

impl From<&AppConfig> for SchedulerPolicy {
    fn from(config: &AppConfig) -> Self {
        Self {
            default_session_minutes: config.default_session_minutes,
        }
    }
}
