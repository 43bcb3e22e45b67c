// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use service_queue_cell::{PrescriptionService, ServiceStatus};
use shared_models::FlowError;

use crate::models::{Appointment, AppointmentStatus};

#[derive(Debug, Clone, Default)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Status of the appointment given the current state of its tasks.
    ///
    /// A cancelled appointment reads CANCELLED once none of its tasks is still
    /// running (tasks awaiting results finish first). Otherwise the appointment
    /// is COMPLETED when every task completed, CANCELLED when every task was
    /// cancelled, IN_PROGRESS once any task left NOT_STARTED, and SCHEDULED
    /// before that.
    pub fn derive_status(
        &self,
        appointment: &Appointment,
        tasks: &[PrescriptionService],
    ) -> AppointmentStatus {
        if appointment.cancelled_at.is_some() {
            return if tasks.iter().any(|t| t.status.is_in_flight()) {
                AppointmentStatus::InProgress
            } else {
                AppointmentStatus::Cancelled
            };
        }
        if tasks.is_empty() {
            return AppointmentStatus::Scheduled;
        }

        if tasks.iter().all(|t| t.status == ServiceStatus::Completed) {
            AppointmentStatus::Completed
        } else if tasks.iter().all(|t| t.status == ServiceStatus::Cancelled) {
            AppointmentStatus::Cancelled
        } else if tasks.iter().any(|t| t.status != ServiceStatus::NotStarted) {
            AppointmentStatus::InProgress
        } else {
            AppointmentStatus::Scheduled
        }
    }

    /// Cancellation is allowed until the appointment reaches a terminal status.
    pub fn validate_cancellation(&self, current_status: AppointmentStatus) -> Result<(), FlowError> {
        debug!("Validating cancellation from {}", current_status);

        if current_status.is_terminal() {
            warn!("Cancellation attempted on {} appointment", current_status);
            return Err(FlowError::state(current_status, AppointmentStatus::Cancelled));
        }
        Ok(())
    }

    /// Check-in admits the tasks of a SCHEDULED appointment only.
    pub fn validate_check_in(&self, current_status: AppointmentStatus) -> Result<(), FlowError> {
        if current_status != AppointmentStatus::Scheduled {
            warn!("Check-in attempted on {} appointment", current_status);
            return Err(FlowError::state(current_status, AppointmentStatus::InProgress));
        }
        Ok(())
    }
}
