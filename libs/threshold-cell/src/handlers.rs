use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::models::SetThresholdRequest;
use crate::services::ThresholdResolver;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveThresholdQuery {
    pub updated_by: Option<String>,
}

#[axum::debug_handler]
pub async fn set_patient_threshold(
    State(resolver): State<Arc<ThresholdResolver>>,
    Path(patient_id): Path<String>,
    Json(request): Json<SetThresholdRequest>,
) -> Result<Json<Value>, AppError> {
    let threshold = resolver.set_override(&patient_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "threshold": threshold,
    })))
}

#[axum::debug_handler]
pub async fn list_patient_thresholds(
    State(resolver): State<Arc<ThresholdResolver>>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let thresholds = resolver.effective_thresholds(&patient_id).await?;

    Ok(Json(json!({
        "success": true,
        "patientId": patient_id,
        "thresholds": thresholds,
    })))
}

#[axum::debug_handler]
pub async fn remove_patient_threshold(
    State(resolver): State<Arc<ThresholdResolver>>,
    Path((patient_id, threshold_type)): Path<(String, String)>,
    Query(query): Query<RemoveThresholdQuery>,
) -> Result<Json<Value>, AppError> {
    let updated_by = query.updated_by.unwrap_or_else(|| "system".to_string());
    let removed = resolver
        .remove_override(&patient_id, &threshold_type, &updated_by)
        .await?;

    Ok(Json(json!({
        "success": true,
        "removed": removed,
        "message": if removed {
            "Threshold override removed, global value applies"
        } else {
            "No active override for this threshold"
        },
    })))
}
