use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use appointment_cell::*;
use clinic_cell::StaffingAdapter;
use service_queue_cell::*;
use shared_models::AttributeDocument;
use shared_utils::test_utils::{ClinicFixture, TestConfig};
use work_session_cell::{SchedulerPolicy, WorkSessionScheduler};

mod lifecycle_test;
mod orchestrator_test;
mod router_test;

/// The queue stack over the in-memory clinic fixture, with an orchestrator on top.
pub struct AppointmentHarness {
    pub fixture: ClinicFixture,
    pub scheduler: Arc<WorkSessionScheduler>,
    pub engine: Arc<ServiceQueueEngine>,
    pub events: Arc<QueueEventBus>,
    pub dispatcher: Arc<QueueCallDispatcher>,
    pub orchestrator: Arc<AppointmentOrchestrator>,
}

impl AppointmentHarness {
    pub async fn new() -> Self {
        Self::build(TestConfig::default(), None).await
    }

    pub async fn with_config(config: TestConfig) -> Self {
        Self::build(config, None).await
    }

    /// Orchestrator validates doctors against `staffing`; the scheduler keeps the fixture's.
    pub async fn with_staffing(staffing: Arc<dyn StaffingAdapter>) -> Self {
        Self::build(TestConfig::default(), Some(staffing)).await
    }

    async fn build(config: TestConfig, staffing: Option<Arc<dyn StaffingAdapter>>) -> Self {
        let app_config = config.to_app_config();
        let fixture = ClinicFixture::new().await;

        let scheduler = Arc::new(WorkSessionScheduler::new(
            fixture.catalog.clone(),
            fixture.staffing.clone(),
            SchedulerPolicy::from(&app_config),
        ));
        let engine = Arc::new(ServiceQueueEngine::new(QueuePolicy::from(&app_config)));
        let events = Arc::new(QueueEventBus::new());
        let dispatcher = Arc::new(QueueCallDispatcher::new(
            engine.clone(),
            scheduler.clone(),
            fixture.catalog.clone(),
            events.clone(),
        ));
        let orchestrator = Arc::new(AppointmentOrchestrator::new(
            fixture.catalog.clone(),
            staffing.unwrap_or_else(|| fixture.staffing.clone() as Arc<dyn StaffingAdapter>),
            engine.clone(),
            dispatcher.clone(),
            events.clone(),
        ));

        Self {
            fixture,
            scheduler,
            engine,
            events,
            dispatcher,
            orchestrator,
        }
    }

    pub fn request(&self, service_ids: &[Uuid]) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            patient_profile_id: Uuid::new_v4(),
            specialty_id: self.fixture.specialty_id,
            service_ids: service_ids.to_vec(),
            doctor_id: None,
            scheduled_date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            priority_profile: None,
            attributes: AttributeDocument::new(),
        }
    }

    pub async fn book(&self, service_ids: &[Uuid]) -> AppointmentView {
        self.orchestrator
            .create_appointment(self.request(service_ids))
            .await
            .unwrap()
    }

    pub async fn book_and_check_in(&self, service_ids: &[Uuid]) -> AppointmentView {
        let view = self.book(service_ids).await;
        self.orchestrator.check_in(view.appointment.id).await.unwrap()
    }

    pub async fn call_next_task(&self) -> PrescriptionService {
        match self.dispatcher.call_next(self.fixture.booth_id).await.unwrap() {
            CallOutcome::Called { task, .. } => task,
            CallOutcome::QueueEmpty => panic!("expected a task to be called"),
        }
    }
}
