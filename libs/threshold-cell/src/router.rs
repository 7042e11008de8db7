use std::sync::Arc;

use axum::{
    routing::{delete, get},
    Router,
};

use crate::handlers;
use crate::services::ThresholdResolver;

pub fn create_threshold_router(resolver: Arc<ThresholdResolver>) -> Router {
    Router::new()
        .route(
            "/patients/{patient_id}/thresholds",
            get(handlers::list_patient_thresholds).post(handlers::set_patient_threshold),
        )
        .route(
            "/patients/{patient_id}/thresholds/{threshold_type}",
            delete(handlers::remove_patient_threshold),
        )
        .with_state(resolver)
}
