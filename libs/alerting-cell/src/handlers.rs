use axum::{
    extract::{Path, Query, State},
    Form, Json,
};
use serde_json::{json, Value};

use messaging_cell::{TelnyxWebhook, TwilioInboundMessage, TwilioStatusCallback};
use shared_models::error::AppError;

use crate::models::{AcknowledgeRequest, CriticalAlertRequest, RecordVitalRequest, VitalsQuery};
use crate::router::AlertingState;

#[axum::debug_handler]
pub async fn record_vital(
    State(state): State<AlertingState>,
    Json(request): Json<RecordVitalRequest>,
) -> Result<Json<Value>, AppError> {
    let result = state.vitals.record_vital(request).await?;

    Ok(Json(json!({
        "success": true,
        "vitalId": result.vital_id,
        "thresholdCheck": result.threshold_check,
    })))
}

#[axum::debug_handler]
pub async fn get_patient_vitals(
    State(state): State<AlertingState>,
    Path(patient_id): Path<String>,
    Query(query): Query<VitalsQuery>,
) -> Result<Json<Value>, AppError> {
    let vitals = state.vitals.vitals_with_analysis(&patient_id, query.limit).await?;

    Ok(Json(json!({
        "success": true,
        "patientId": patient_id,
        "count": vitals.len(),
        "vitals": vitals,
    })))
}

#[axum::debug_handler]
pub async fn send_critical_alert(
    State(state): State<AlertingState>,
    Json(request): Json<CriticalAlertRequest>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.vitals.critical_alert(request).await?;

    Ok(Json(json!({
        "success": true,
        "delivered": outcome.any_delivered(),
        "incidentId": outcome.incident_id,
        "notifications": outcome.notifications,
        "scheduledLevels": outcome.scheduled_levels,
    })))
}

#[axum::debug_handler]
pub async fn acknowledge_incident(
    State(state): State<AlertingState>,
    Path(incident_id): Path<String>,
    Json(request): Json<AcknowledgeRequest>,
) -> Result<Json<Value>, AppError> {
    let acknowledged_by = request
        .acknowledged_by
        .unwrap_or_else(|| "care_team".to_string());
    let outcome = state.escalation.acknowledge(&incident_id, &acknowledged_by).await?;

    Ok(Json(json!({
        "success": true,
        "acknowledgment": outcome,
    })))
}

#[axum::debug_handler]
pub async fn telnyx_webhook(
    State(state): State<AlertingState>,
    Json(webhook): Json<TelnyxWebhook>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.webhooks.handle_telnyx(webhook).await?;
    Ok(Json(json!({ "success": true, "outcome": outcome })))
}

#[axum::debug_handler]
pub async fn twilio_status_webhook(
    State(state): State<AlertingState>,
    Form(callback): Form<TwilioStatusCallback>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.webhooks.handle_twilio_status(callback).await?;
    Ok(Json(json!({ "success": true, "outcome": outcome })))
}

#[axum::debug_handler]
pub async fn twilio_inbound_webhook(
    State(state): State<AlertingState>,
    Form(message): Form<TwilioInboundMessage>,
) -> Result<Json<Value>, AppError> {
    let outcome = state.webhooks.handle_twilio_inbound(message).await?;
    Ok(Json(json!({ "success": true, "outcome": outcome })))
}
