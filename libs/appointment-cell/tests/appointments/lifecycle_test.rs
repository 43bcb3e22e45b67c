use assert_matches::assert_matches;
use chrono::Utc;
use tokio_test::assert_ok;

use appointment_cell::*;
use service_queue_cell::ServiceStatus;
use shared_models::FlowError;

use super::AppointmentHarness;

fn with_statuses(view: &AppointmentView, statuses: &[ServiceStatus]) -> Vec<service_queue_cell::PrescriptionService> {
    view.tasks
        .iter()
        .zip(statuses)
        .map(|(task, status)| {
            let mut task = task.clone();
            task.status = *status;
            task
        })
        .collect()
}

#[tokio::test]
async fn test_status_is_derived_from_task_states() {
    let harness = AppointmentHarness::new().await;
    let view = harness
        .book(&[harness.fixture.ecg_service_id, harness.fixture.consult_service_id])
        .await;
    let lifecycle = AppointmentLifecycleService::new();
    let derive = |statuses: &[ServiceStatus]| {
        lifecycle.derive_status(&view.appointment, &with_statuses(&view, statuses))
    };

    use ServiceStatus::*;
    assert_eq!(derive(&[NotStarted, NotStarted]), AppointmentStatus::Scheduled);
    assert_eq!(derive(&[Pending, NotStarted]), AppointmentStatus::InProgress);
    assert_eq!(derive(&[Completed, Waiting]), AppointmentStatus::InProgress);
    assert_eq!(derive(&[Completed, Completed]), AppointmentStatus::Completed);
    assert_eq!(derive(&[Cancelled, Cancelled]), AppointmentStatus::Cancelled);
    // Neither "all completed" nor "all cancelled".
    assert_eq!(derive(&[Completed, Cancelled]), AppointmentStatus::InProgress);
}

#[tokio::test]
async fn test_cancelled_appointment_stays_in_progress_while_results_are_pending() {
    let harness = AppointmentHarness::new().await;
    let ecg = harness.fixture.ecg_service_id;
    let mut view = harness.book(&[ecg, ecg]).await;
    view.appointment.cancelled_at = Some(Utc::now());

    let lifecycle = AppointmentLifecycleService::new();
    let derive = |statuses: &[ServiceStatus]| {
        lifecycle.derive_status(&view.appointment, &with_statuses(&view, statuses))
    };

    use ServiceStatus::*;
    assert_eq!(derive(&[WaitingResult, Cancelled]), AppointmentStatus::InProgress);
    assert_eq!(derive(&[Returning, Cancelled]), AppointmentStatus::InProgress);
    // Finished work does not hold the appointment open.
    assert_eq!(derive(&[Completed, Cancelled]), AppointmentStatus::Cancelled);
    assert_eq!(derive(&[Cancelled, Cancelled]), AppointmentStatus::Cancelled);
}

#[test]
fn test_terminal_appointments_cannot_be_cancelled() {
    let lifecycle = AppointmentLifecycleService::new();

    assert_ok!(lifecycle.validate_cancellation(AppointmentStatus::Scheduled));
    assert_ok!(lifecycle.validate_cancellation(AppointmentStatus::InProgress));
    assert_matches!(
        lifecycle.validate_cancellation(AppointmentStatus::Completed),
        Err(FlowError::StateError { .. })
    );
    assert_matches!(
        lifecycle.validate_cancellation(AppointmentStatus::Cancelled),
        Err(FlowError::StateError { .. })
    );
}

#[test]
fn test_check_in_only_from_scheduled() {
    let lifecycle = AppointmentLifecycleService::new();

    assert_ok!(lifecycle.validate_check_in(AppointmentStatus::Scheduled));
    assert_matches!(
        lifecycle.validate_check_in(AppointmentStatus::InProgress),
        Err(FlowError::StateError { .. })
    );
}
