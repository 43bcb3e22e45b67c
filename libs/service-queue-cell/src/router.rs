use std::sync::Arc;
use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    await_task_result, call_next, cancel_prescription, cancel_task, complete_task, delay_task,
    get_prescription, get_prescription_by_code, get_snapshot, get_task, mark_task_returning,
    recall_task, skip_task, start_task,
};
use crate::services::{dispatcher::QueueCallDispatcher, engine::ServiceQueueEngine};

#[derive(Clone)]
pub struct QueueState {
    pub engine: Arc<ServiceQueueEngine>,
    pub dispatcher: Arc<QueueCallDispatcher>,
}

pub fn create_service_queue_router(state: QueueState) -> Router {
    Router::new()
        .route("/snapshot", get(get_snapshot))
        .route("/booths/{booth_id}/call-next", post(call_next))
        .route("/tasks/{task_id}", get(get_task))
        .route("/tasks/{task_id}/start", post(start_task))
        .route("/tasks/{task_id}/skip", post(skip_task))
        .route("/tasks/{task_id}/complete", post(complete_task))
        .route("/tasks/{task_id}/await-result", post(await_task_result))
        .route("/tasks/{task_id}/returning", post(mark_task_returning))
        .route("/tasks/{task_id}/delay", post(delay_task))
        .route("/tasks/{task_id}/recall", post(recall_task))
        .route("/tasks/{task_id}/cancel", post(cancel_task))
        .route("/prescriptions/{prescription_id}", get(get_prescription))
        .route("/prescriptions/{prescription_id}/cancel", post(cancel_prescription))
        .route("/prescriptions/code/{code}", get(get_prescription_by_code))
        .with_state(state)
}
