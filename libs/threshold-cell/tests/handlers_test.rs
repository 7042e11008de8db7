use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode},
    Json,
};
use tower::ServiceExt;

use audit_cell::AuditService;
use shared_database::InMemoryStore;
use shared_models::error::AppError;
use threshold_cell::handlers::*;
use threshold_cell::{create_threshold_router, SetThresholdRequest, ThresholdResolver};

fn create_resolver() -> Arc<ThresholdResolver> {
    Arc::new(ThresholdResolver::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(AuditService::in_memory()),
    ))
}

#[tokio::test]
async fn test_set_and_list_thresholds() {
    let resolver = create_resolver();

    let request = SetThresholdRequest {
        threshold_type: "glucose_high".to_string(),
        threshold_value: 220.0,
        unit: None,
        notes: None,
        updated_by: Some("dr-smith".to_string()),
    };
    let Json(set) = set_patient_threshold(
        State(resolver.clone()),
        Path("patient-1".to_string()),
        Json(request),
    )
    .await
    .unwrap();
    assert_eq!(set["success"], true);
    assert_eq!(set["threshold"]["value"], 220.0);

    let Json(listed) = list_patient_thresholds(State(resolver), Path("patient-1".to_string()))
        .await
        .unwrap();
    let thresholds = listed["thresholds"].as_array().unwrap();
    let glucose_high = thresholds
        .iter()
        .find(|t| t["type"] == "glucose_high")
        .unwrap();
    assert_eq!(glucose_high["isPatientSpecific"], true);
    // weight_gain has no default and is not listed.
    assert!(thresholds.iter().all(|t| t["type"] != "weight_gain"));
}

#[tokio::test]
async fn test_set_rejects_non_positive_value() {
    let resolver = create_resolver();

    let request = SetThresholdRequest {
        threshold_type: "glucose_low".to_string(),
        threshold_value: 0.0,
        unit: None,
        notes: None,
        updated_by: None,
    };
    let result = set_patient_threshold(State(resolver), Path("patient-1".to_string()), Json(request)).await;
    assert!(matches!(result, Err(AppError::ValidationError(_))));
}

#[tokio::test]
async fn test_remove_missing_override_succeeds() {
    let resolver = create_resolver();

    let Json(body) = remove_patient_threshold(
        State(resolver),
        Path(("patient-1".to_string(), "glucose_low".to_string())),
        Query(RemoveThresholdQuery { updated_by: None }),
    )
    .await
    .unwrap();
    assert_eq!(body["success"], true);
    assert_eq!(body["removed"], false);
}

#[tokio::test]
async fn test_router_maps_unknown_type_to_bad_request() {
    let app = create_threshold_router(create_resolver());

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/patients/patient-1/thresholds")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"thresholdType":"glucose_extreme","thresholdValue":80}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
