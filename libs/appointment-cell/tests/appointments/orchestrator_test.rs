use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use uuid::Uuid;

use appointment_cell::*;
use clinic_cell::{Service, Specialty, StaffAvailability, StaffingAdapter};
use service_queue_cell::*;
use shared_models::{FlowError, StaffRole};
use shared_utils::test_utils::TestConfig;

use super::AppointmentHarness;

mock! {
    pub Staffing {}

    #[async_trait]
    impl StaffingAdapter for Staffing {
        async fn get_doctor_availability(&self, doctor_id: Uuid) -> Result<StaffAvailability, FlowError>;
        async fn get_technician_availability(&self, technician_id: Uuid) -> Result<StaffAvailability, FlowError>;
        async fn find_available(
            &self,
            role: StaffRole,
            specialty_id: Option<Uuid>,
            at: DateTime<Utc>,
        ) -> Result<Vec<StaffAvailability>, FlowError>;
    }
}

fn statuses(view: &AppointmentView) -> Vec<ServiceStatus> {
    view.tasks.iter().map(|t| t.status).collect()
}

#[tokio::test]
async fn test_create_appointment_fans_out_one_task_per_service() {
    let harness = AppointmentHarness::new().await;
    let mut request = harness.request(&[
        harness.fixture.ecg_service_id,
        harness.fixture.consult_service_id,
    ]);
    request.doctor_id = Some(harness.fixture.doctor_id);
    request
        .attributes
        .insert("emergency_contact", serde_json::json!({ "name": "Lan", "phone": "0901" }));

    let view = harness
        .orchestrator
        .create_appointment(request)
        .await
        .unwrap();

    assert_eq!(view.status, AppointmentStatus::Scheduled);
    assert_eq!(view.appointment.task_ids.len(), 2);
    assert_eq!(statuses(&view), vec![ServiceStatus::NotStarted; 2]);
    assert_eq!(view.tasks[0].order, 1);
    assert_eq!(view.tasks[0].service_id, harness.fixture.ecg_service_id);
    assert_eq!(view.tasks[1].order, 2);
    assert_eq!(view.tasks[1].service_id, harness.fixture.consult_service_id);

    // Only the doctor-led service carries the requested doctor.
    assert_eq!(view.tasks[0].preferred_doctor_id, None);
    assert_eq!(view.tasks[1].preferred_doctor_id, Some(harness.fixture.doctor_id));

    let prescription = harness
        .engine
        .get_prescription(view.appointment.prescription_id)
        .await
        .unwrap();
    assert_eq!(prescription.appointment_id, Some(view.appointment.id));
    assert_eq!(prescription.code, view.appointment.prescription_code);
    assert!(view.appointment.attributes.get("emergency_contact").is_some());
}

#[tokio::test]
async fn test_check_in_releases_tasks_into_the_queue() {
    let harness = AppointmentHarness::new().await;
    let booked = harness
        .book(&[harness.fixture.ecg_service_id, harness.fixture.ecg_service_id])
        .await;

    // Nothing is callable before check-in.
    assert_matches!(
        harness.dispatcher.call_next(harness.fixture.booth_id).await,
        Ok(CallOutcome::QueueEmpty)
    );

    let view = harness.orchestrator.check_in(booked.appointment.id).await.unwrap();
    assert_eq!(view.status, AppointmentStatus::InProgress);
    assert_eq!(statuses(&view), vec![ServiceStatus::Waiting; 2]);

    let called = harness.call_next_task().await;
    assert_eq!(called.id, booked.appointment.task_ids[0]);

    assert_matches!(
        harness.orchestrator.check_in(booked.appointment.id).await,
        Err(FlowError::StateError { .. })
    );
}

#[tokio::test]
async fn test_sequential_check_in_releases_one_task_at_a_time() {
    let harness = AppointmentHarness::with_config(TestConfig {
        sequential_services: true,
        ..TestConfig::default()
    })
    .await;
    let view = harness
        .book_and_check_in(&[harness.fixture.ecg_service_id, harness.fixture.ecg_service_id])
        .await;
    assert_eq!(
        statuses(&view),
        vec![ServiceStatus::Waiting, ServiceStatus::Pending]
    );

    let first = harness.call_next_task().await;
    harness.dispatcher.start(first.id).await.unwrap();
    harness.dispatcher.complete(first.id, None).await.unwrap();

    let view = harness
        .orchestrator
        .get_appointment(view.appointment.id)
        .await
        .unwrap();
    assert_eq!(
        statuses(&view),
        vec![ServiceStatus::Completed, ServiceStatus::Waiting]
    );
    assert_eq!(view.status, AppointmentStatus::InProgress);
}

#[tokio::test]
async fn test_appointment_completes_when_every_task_completes() {
    let harness = AppointmentHarness::new().await;
    let view = harness
        .book_and_check_in(&[harness.fixture.ecg_service_id])
        .await;

    let _channel = harness.orchestrator.subscribe(view.appointment.id).await.unwrap();

    let task = harness.call_next_task().await;
    harness.dispatcher.start(task.id).await.unwrap();
    harness
        .dispatcher
        .complete(task.id, Some("Sinus rhythm".into()))
        .await
        .unwrap();

    let view = harness
        .orchestrator
        .get_appointment(view.appointment.id)
        .await
        .unwrap();
    assert_eq!(view.status, AppointmentStatus::Completed);
    assert!(harness.events.get_active_channels().await.is_empty());

    assert_matches!(
        harness
            .orchestrator
            .cancel_appointment(view.appointment.id, "too late")
            .await,
        Err(FlowError::StateError { .. })
    );
}

#[tokio::test]
async fn test_cancel_cascades_to_waiting_and_serving_tasks() {
    let harness = AppointmentHarness::new().await;
    let ecg = harness.fixture.ecg_service_id;
    let view = harness.book_and_check_in(&[ecg, ecg, ecg]).await;

    let serving = harness.call_next_task().await;
    let serving = harness.dispatcher.start(serving.id).await.unwrap();
    assert_eq!(serving.status, ServiceStatus::Serving);
    let session_id = serving.work_session_id.unwrap();
    assert_eq!(
        harness.scheduler.get_session(session_id).await.unwrap().active_task_ids,
        vec![serving.id]
    );

    let mut bus = harness.events.subscribe_global();
    let cancelled = harness
        .orchestrator
        .cancel_appointment(view.appointment.id, "patient left")
        .await
        .unwrap();

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(statuses(&cancelled), vec![ServiceStatus::Cancelled; 3]);
    assert_eq!(
        cancelled.appointment.cancellation_reason.as_deref(),
        Some("patient left")
    );
    assert!(harness
        .scheduler
        .get_session(session_id)
        .await
        .unwrap()
        .active_task_ids
        .is_empty());

    let mut saw_appointment_event = false;
    while let Ok(event) = bus.try_recv() {
        if let QueueEvent::AppointmentCancelled { appointment_id, reason } = event {
            assert_eq!(appointment_id, view.appointment.id);
            assert_eq!(reason, "patient left");
            saw_appointment_event = true;
        }
    }
    assert!(saw_appointment_event);

    assert_matches!(
        harness
            .orchestrator
            .cancel_appointment(view.appointment.id, "again")
            .await,
        Err(FlowError::StateError { .. })
    );
}

#[tokio::test]
async fn test_cancel_leaves_tasks_awaiting_results_to_finish() {
    let harness = AppointmentHarness::new().await;
    let ecg = harness.fixture.ecg_service_id;
    let view = harness.book_and_check_in(&[ecg, ecg]).await;

    let task = harness.call_next_task().await;
    harness.dispatcher.start(task.id).await.unwrap();
    harness.dispatcher.await_result(task.id).await.unwrap();

    let _channel = harness.orchestrator.subscribe(view.appointment.id).await.unwrap();

    let cancelled = harness
        .orchestrator
        .cancel_appointment(view.appointment.id, "rescheduled")
        .await
        .unwrap();

    // The ECG awaiting its report keeps the appointment open.
    assert_eq!(cancelled.status, AppointmentStatus::InProgress);
    assert!(cancelled.appointment.cancelled_at.is_some());
    assert_eq!(
        statuses(&cancelled),
        vec![ServiceStatus::WaitingResult, ServiceStatus::Cancelled]
    );
    assert_eq!(
        harness.events.get_active_channels().await,
        vec![view.appointment.id]
    );
    assert_matches!(
        harness
            .orchestrator
            .cancel_appointment(view.appointment.id, "again")
            .await,
        Err(FlowError::StateError { .. })
    );
    assert_matches!(
        harness.orchestrator.check_in(view.appointment.id).await,
        Err(FlowError::StateError { .. })
    );

    let finished = harness.dispatcher.complete(task.id, None).await.unwrap();
    assert_eq!(finished.status, ServiceStatus::Completed);

    let closed = harness
        .orchestrator
        .get_appointment(view.appointment.id)
        .await
        .unwrap();
    assert_eq!(closed.status, AppointmentStatus::Cancelled);
    assert!(harness.events.get_active_channels().await.is_empty());
}

#[tokio::test]
async fn test_appointment_channel_is_released_on_cancellation() {
    let harness = AppointmentHarness::new().await;
    let view = harness
        .book_and_check_in(&[harness.fixture.ecg_service_id])
        .await;

    let mut channel = harness.orchestrator.subscribe(view.appointment.id).await.unwrap();
    assert_eq!(
        harness.events.get_active_channels().await,
        vec![view.appointment.id]
    );

    let cancelled = harness
        .orchestrator
        .cancel_appointment(view.appointment.id, "patient left")
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);

    let mut saw_cancellation = false;
    while let Ok(event) = channel.try_recv() {
        if matches!(event, QueueEvent::AppointmentCancelled { .. }) {
            saw_cancellation = true;
        }
    }
    assert!(saw_cancellation);
    assert!(harness.events.get_active_channels().await.is_empty());

    assert_matches!(
        harness.orchestrator.subscribe(view.appointment.id).await,
        Err(FlowError::StateError { .. })
    );
    assert_matches!(
        harness.orchestrator.subscribe(Uuid::new_v4()).await,
        Err(FlowError::NotFoundError { .. })
    );
}

#[tokio::test]
async fn test_priority_profile_sets_the_band() {
    let harness = AppointmentHarness::new().await;
    let mut request = harness.request(&[harness.fixture.ecg_service_id]);
    request.priority_profile = Some(PatientPriorityProfile {
        age: Some(70),
        pregnancy_weeks: None,
        is_disabled: false,
    });

    let view = harness
        .orchestrator
        .create_appointment(request)
        .await
        .unwrap();

    assert_eq!(view.appointment.priority, PriorityBand::High);
    assert_eq!(view.tasks[0].priority, PriorityBand::High);
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_anything_is_created() {
    let harness = AppointmentHarness::new().await;

    let empty = harness.request(&[]);
    assert_matches!(
        harness.orchestrator.create_appointment(empty).await,
        Err(FlowError::ValidationError(_))
    );

    let unknown_service = harness.request(&[harness.fixture.ecg_service_id, Uuid::new_v4()]);
    assert_matches!(
        harness.orchestrator.create_appointment(unknown_service).await,
        Err(FlowError::ValidationError(_))
    );

    let mut unknown_specialty = harness.request(&[harness.fixture.ecg_service_id]);
    unknown_specialty.specialty_id = Uuid::new_v4();
    assert_matches!(
        harness.orchestrator.create_appointment(unknown_specialty).await,
        Err(FlowError::ValidationError(_))
    );

    let mut unknown_doctor = harness.request(&[harness.fixture.consult_service_id]);
    unknown_doctor.doctor_id = Some(Uuid::new_v4());
    assert_matches!(
        harness.orchestrator.create_appointment(unknown_doctor).await,
        Err(FlowError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_service_from_another_specialty_is_rejected() {
    let harness = AppointmentHarness::new().await;
    let dermatology_id = Uuid::new_v4();
    let biopsy_id = Uuid::new_v4();
    harness
        .fixture
        .catalog
        .add_specialty(Specialty {
            id: dermatology_id,
            name: "Dermatology".to_string(),
        })
        .await;
    harness
        .fixture
        .catalog
        .add_service(Service {
            id: biopsy_id,
            code: "BIOPSY".to_string(),
            name: "Skin biopsy".to_string(),
            specialty_id: dermatology_id,
            duration_minutes: 30,
            requires_doctor: true,
            requires_technician: false,
        })
        .await;

    let request = harness.request(&[harness.fixture.ecg_service_id, biopsy_id]);
    assert_matches!(
        harness.orchestrator.create_appointment(request).await,
        Err(FlowError::ValidationError(_))
    );
}

#[tokio::test]
async fn test_doctor_is_checked_against_the_staffing_adapter() {
    let doctor_id = Uuid::new_v4();
    let other_specialty = Uuid::new_v4();

    let mut staffing = MockStaffing::new();
    staffing
        .expect_get_doctor_availability()
        .times(1)
        .returning(move |staff_id| {
            Ok(StaffAvailability {
                staff_id,
                role: StaffRole::Doctor,
                specialty_id: Some(other_specialty),
                is_available: true,
                shift_start: None,
                shift_end: None,
            })
        });
    staffing.expect_find_available().never();

    let harness = AppointmentHarness::with_staffing(Arc::new(staffing)).await;
    let mut request = harness.request(&[harness.fixture.consult_service_id]);
    request.doctor_id = Some(doctor_id);

    let result = harness.orchestrator.create_appointment(request).await;
    assert_matches!(result, Err(FlowError::ValidationError(message)) if message.contains("specialty"));
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let harness = AppointmentHarness::new().await;
    let missing = Uuid::new_v4();

    assert_matches!(
        harness.orchestrator.get_appointment(missing).await,
        Err(FlowError::NotFoundError { entity: "appointment", .. })
    );
    assert_matches!(
        harness.orchestrator.cancel_appointment(missing, "n/a").await,
        Err(FlowError::NotFoundError { .. })
    );
    assert_matches!(
        harness.orchestrator.check_in(missing).await,
        Err(FlowError::NotFoundError { .. })
    );
}

#[tokio::test]
async fn test_patient_appointments_are_listed_by_date() {
    let harness = AppointmentHarness::new().await;
    let patient_id = Uuid::new_v4();

    let mut later = harness.request(&[harness.fixture.ecg_service_id]);
    later.patient_profile_id = patient_id;
    later.scheduled_date = later.scheduled_date.succ_opt().unwrap();
    let mut earlier = harness.request(&[harness.fixture.consult_service_id]);
    earlier.patient_profile_id = patient_id;

    let later = harness.orchestrator.create_appointment(later).await.unwrap();
    let earlier = harness.orchestrator.create_appointment(earlier).await.unwrap();
    harness.book(&[harness.fixture.ecg_service_id]).await;

    let listed = harness
        .orchestrator
        .list_patient_appointments(patient_id)
        .await
        .unwrap();
    let ids: Vec<Uuid> = listed.iter().map(|v| v.appointment.id).collect();
    assert_eq!(ids, vec![earlier.appointment.id, later.appointment.id]);
}
