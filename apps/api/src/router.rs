use std::sync::Arc;

use axum::{
    Json, Router,
    routing::get,
};
use serde_json::json;

use appointment_cell::{appointment_routes, AppointmentOrchestrator};
use clinic_cell::{CatalogAdapter, StaffingAdapter};
use service_queue_cell::{
    create_service_queue_router, QueueCallDispatcher, QueueEventBus, QueuePolicy, QueueState,
    ServiceQueueEngine,
};
use shared_config::AppConfig;
use work_session_cell::{work_session_routes, SchedulerPolicy, WorkSessionScheduler};

/// Every long-lived service of the API, wired once at startup.
#[derive(Clone)]
pub struct ClinicServices {
    pub scheduler: Arc<WorkSessionScheduler>,
    pub engine: Arc<ServiceQueueEngine>,
    pub events: Arc<QueueEventBus>,
    pub dispatcher: Arc<QueueCallDispatcher>,
    pub orchestrator: Arc<AppointmentOrchestrator>,
}

impl ClinicServices {
    pub fn build(
        config: &AppConfig,
        catalog: Arc<dyn CatalogAdapter>,
        staffing: Arc<dyn StaffingAdapter>,
    ) -> Self {
        let scheduler = Arc::new(WorkSessionScheduler::new(
            catalog.clone(),
            staffing.clone(),
            SchedulerPolicy::from(config),
        ));
        let engine = Arc::new(ServiceQueueEngine::new(QueuePolicy::from(config)));
        let events = Arc::new(QueueEventBus::new());
        let dispatcher = Arc::new(QueueCallDispatcher::new(
            engine.clone(),
            scheduler.clone(),
            catalog.clone(),
            events.clone(),
        ));
        let orchestrator = Arc::new(AppointmentOrchestrator::new(
            catalog,
            staffing,
            engine.clone(),
            dispatcher.clone(),
            events.clone(),
        ));

        Self {
            scheduler,
            engine,
            events,
            dispatcher,
            orchestrator,
        }
    }
}

pub fn create_router(services: ClinicServices) -> Router {
    let events = services.events.clone();

    Router::new()
        .route("/", get(|| async { "Clinic flow API is running!" }))
        .route(
            "/health",
            get(move || {
                let events = events.clone();
                async move {
                    Json(json!({
                        "status": "ok",
                        "event_channels": events.get_active_channels().await.len()
                    }))
                }
            }),
        )
        .nest(
            "/queue",
            create_service_queue_router(QueueState {
                engine: services.engine.clone(),
                dispatcher: services.dispatcher.clone(),
            }),
        )
        .nest("/appointments", appointment_routes(services.orchestrator.clone()))
        .nest("/work-sessions", work_session_routes(services.scheduler.clone()))
}
