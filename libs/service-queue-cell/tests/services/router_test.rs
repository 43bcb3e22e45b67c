use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use service_queue_cell::*;

use super::QueueHarness;

fn router(harness: &QueueHarness) -> Router {
    create_service_queue_router(QueueState {
        engine: harness.engine.clone(),
        dispatcher: harness.dispatcher.clone(),
    })
}

async fn send(router: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(body) => Body::from(body.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_call_next_on_empty_queue() {
    let harness = QueueHarness::new().await;
    let router = router(&harness);

    let uri = format!("/booths/{}/call-next", harness.fixture.booth_id);
    let (status, body) = send(&router, "POST", &uri, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "queue_empty");
}

#[tokio::test]
async fn test_call_start_and_complete_over_http() {
    let harness = QueueHarness::new().await;
    let router = router(&harness);
    let (_, tasks) = harness
        .queue_services(&[harness.fixture.ecg_service_id], PriorityBand::Normal)
        .await;
    let task_id = tasks[0].id;

    let uri = format!("/booths/{}/call-next", harness.fixture.booth_id);
    let (status, body) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "called");
    assert_eq!(body["task"]["id"], json!(task_id));
    assert_eq!(body["task"]["status"], "PREPARING");

    // Completing before starting is an illegal transition.
    let complete_uri = format!("/tasks/{}/complete", task_id);
    let (status, body) = send(&router, "POST", &complete_uri, Some(json!({}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, _) = send(&router, "POST", &format!("/tasks/{}/start", task_id), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(
        &router,
        "POST",
        &complete_uri,
        Some(json!({ "results": "Normal ECG" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["status"], "COMPLETED");
    assert_eq!(body["task"]["results"], "Normal ECG");

    let (status, body) = send(&router, "GET", &format!("/tasks/{}", task_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["completed_at"].is_string());
}

#[tokio::test]
async fn test_snapshot_requires_a_key() {
    let harness = QueueHarness::new().await;
    let router = router(&harness);
    harness
        .queue_services(
            &[harness.fixture.ecg_service_id, harness.fixture.ecg_service_id],
            PriorityBand::Normal,
        )
        .await;

    let (status, _) = send(&router, "GET", "/snapshot", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/snapshot?booth_id={}", harness.fixture.booth_id);
    let (status, body) = send(&router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["waiting"].as_array().unwrap().len(), 2);
    assert_eq!(body["waiting"][1]["estimated_wait_minutes"], 15);
}

#[tokio::test]
async fn test_prescription_lookup_and_cancel() {
    let harness = QueueHarness::new().await;
    let router = router(&harness);
    let (prescription, _) = harness
        .queue_services(&[harness.fixture.ecg_service_id], PriorityBand::Normal)
        .await;

    let uri = format!("/prescriptions/code/{}", prescription.code);
    let (status, body) = send(&router, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["prescription"]["id"], json!(prescription.id));
    assert_eq!(body["tasks"].as_array().unwrap().len(), 1);

    let uri = format!("/prescriptions/{}/cancel", prescription.id);
    let (status, body) = send(&router, "POST", &uri, Some(json!({ "reason": "duplicate" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cancelled_tasks"], 1);
}

#[tokio::test]
async fn test_unknown_ids_map_to_not_found() {
    let harness = QueueHarness::new().await;
    let router = router(&harness);

    let (status, _) = send(&router, "GET", &format!("/tasks/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let uri = format!("/booths/{}/call-next", Uuid::new_v4());
    let (status, _) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
