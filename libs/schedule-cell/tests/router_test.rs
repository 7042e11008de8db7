mod common;

use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tower::ServiceExt;

use schedule_cell::create_schedule_router;

use common::{harness, medication_schedule, PATIENT_ID};

async fn call(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(json) => Body::from(json.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test(start_paused = true)]
async fn test_update_then_list_jobs() {
    let h = harness().await;
    let app = create_schedule_router(h.manager.clone());
    let schedule = serde_json::to_value(medication_schedule(&["08:00", "20:00"])).unwrap();

    let (status, body) = call(
        app.clone(),
        "POST",
        "/patients/patient-1/schedule",
        Some(json!({ "action": "update", "schedule": schedule })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["schedule"]["active"], true);
    assert_eq!(body["schedule"]["installedJobs"].as_array().unwrap().len(), 2);

    let (status, body) = call(app, "GET", "/patients/patient-1/schedule/jobs", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["schedule"]["patientId"], PATIENT_ID);
    assert_eq!(body["schedule"]["jobs"][0]["key"], "med_patient-1_metformin_08:00");
    assert_eq!(body["schedule"]["jobs"][0]["recurring"], true);
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume_routes() {
    let h = harness().await;
    h.manager
        .install_schedule(medication_schedule(&["08:00"]))
        .await
        .unwrap();
    let app = create_schedule_router(h.manager.clone());

    let (status, body) = call(
        app.clone(),
        "POST",
        "/patients/patient-1/schedule",
        Some(json!({ "action": "pause" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["cancelledJobs"], 1);
    assert_eq!(body["schedule"]["active"], false);

    let (status, body) = call(
        app,
        "POST",
        "/patients/patient-1/schedule",
        Some(json!({ "action": "resume" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["schedule"]["installedJobs"][0], "med_patient-1_metformin_08:00");
}

#[tokio::test(start_paused = true)]
async fn test_update_without_schedule_is_rejected() {
    let h = harness().await;
    let app = create_schedule_router(h.manager.clone());

    let (status, body) = call(
        app,
        "POST",
        "/patients/patient-1/schedule",
        Some(json!({ "action": "update" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test(start_paused = true)]
async fn test_resume_unknown_patient_is_not_found() {
    let h = harness().await;
    let app = create_schedule_router(h.manager.clone());

    let (status, _) = call(
        app,
        "POST",
        "/patients/nobody/schedule",
        Some(json!({ "action": "resume" })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
