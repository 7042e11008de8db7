use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use audit_cell::AuditSink;
use shared_utils::signature::WebhookCredentials;
use shared_utils::Clock;

use crate::handlers;
use crate::middleware::{verify_telnyx_webhook, verify_twilio_webhook};
use crate::services::{EscalationCoordinator, VitalsService, WebhookProcessor};

#[derive(Clone)]
pub struct AlertingState {
    pub vitals: Arc<VitalsService>,
    pub escalation: EscalationCoordinator,
    pub webhooks: Arc<WebhookProcessor>,
    pub audit: Arc<dyn AuditSink>,
    pub webhook_credentials: Arc<WebhookCredentials>,
    pub clock: Arc<dyn Clock>,
}

pub fn create_alerting_router(state: AlertingState) -> Router {
    Router::new()
        .route("/vitals", post(handlers::record_vital))
        .route("/patients/{patient_id}/vitals", get(handlers::get_patient_vitals))
        .route("/alerts/critical", post(handlers::send_critical_alert))
        .route(
            "/alerts/{incident_id}/acknowledge",
            post(handlers::acknowledge_incident),
        )
        .with_state(state)
}

/// Provider callbacks. Every route sits behind its vendor's signature check.
pub fn create_webhook_router(state: AlertingState) -> Router {
    let telnyx = Router::new()
        .route("/webhooks/telnyx", post(handlers::telnyx_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), verify_telnyx_webhook));

    let twilio = Router::new()
        .route("/webhooks/twilio/status", post(handlers::twilio_status_webhook))
        .route("/webhooks/twilio/inbound", post(handlers::twilio_inbound_webhook))
        .route_layer(middleware::from_fn_with_state(state.clone(), verify_twilio_webhook));

    telnyx.merge(twilio).with_state(state)
}
