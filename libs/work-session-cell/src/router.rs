use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers;
use crate::services::scheduler::WorkSessionScheduler;

pub fn work_session_routes(scheduler: Arc<WorkSessionScheduler>) -> Router {
    Router::new()
        .route("/", post(handlers::open_session))
        .route("/{session_id}", get(handlers::get_session))
        .route("/{session_id}/activate", post(handlers::activate_session))
        .route("/{session_id}/pause", post(handlers::pause_session))
        .route("/{session_id}/resume", post(handlers::resume_session))
        .route("/{session_id}/close", post(handlers::close_session))
        .route("/booths/{booth_id}", get(handlers::list_booth_sessions))
        .with_state(scheduler)
}
