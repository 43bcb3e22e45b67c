use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use appointment_cell::appointment_routes;

use super::AppointmentHarness;

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
async fn test_book_check_in_and_cancel_over_http() {
    let harness = AppointmentHarness::new().await;
    let router = appointment_routes(harness.orchestrator.clone());
    let patient_id = Uuid::new_v4();

    let (status, body) = send(
        &router,
        "POST",
        "/",
        Some(json!({
            "patient_profile_id": patient_id,
            "specialty_id": harness.fixture.specialty_id,
            "service_ids": [harness.fixture.ecg_service_id, harness.fixture.consult_service_id],
            "doctor_id": harness.fixture.doctor_id,
            "scheduled_date": "2026-10-20",
            "priority_profile": { "age": 4 },
            "attributes": { "emergency_contact": "0901 000 111" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["appointment"]["status"], "SCHEDULED");
    assert_eq!(body["appointment"]["priority"], "HIGH");
    assert_eq!(body["appointment"]["tasks"].as_array().unwrap().len(), 2);
    let appointment_id = body["appointment"]["id"].as_str().unwrap().to_string();

    let uri = format!("/{}/check-in", appointment_id);
    let (status, body) = send(&router, "POST", &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "IN_PROGRESS");
    assert_eq!(body["appointment"]["tasks"][0]["status"], "WAITING");

    let uri = format!("/{}/cancel", appointment_id);
    let (status, body) = send(&router, "POST", &uri, Some(json!({ "reason": "feeling better" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["appointment"]["status"], "CANCELLED");
    assert_eq!(body["appointment"]["cancellation_reason"], "feeling better");

    let (status, body) = send(&router, "POST", &uri, Some(json!({ "reason": "twice" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].is_string());

    let (status, body) = send(&router, "GET", &format!("/patients/{}", patient_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 1);
    assert_eq!(body["appointments"][0]["id"], json!(appointment_id));
}

#[tokio::test]
async fn test_unknown_service_is_a_bad_request() {
    let harness = AppointmentHarness::new().await;
    let router = appointment_routes(harness.orchestrator.clone());

    let (status, body) = send(
        &router,
        "POST",
        "/",
        Some(json!({
            "patient_profile_id": Uuid::new_v4(),
            "specialty_id": harness.fixture.specialty_id,
            "service_ids": [Uuid::new_v4()],
            "scheduled_date": "2026-10-20"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("service"));
}

#[tokio::test]
async fn test_unknown_appointment_is_not_found() {
    let harness = AppointmentHarness::new().await;
    let router = appointment_routes(harness.orchestrator.clone());

    let (status, _) = send(&router, "GET", &format!("/{}", Uuid::new_v4()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
