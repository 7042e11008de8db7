use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::services::ScheduleManager;

pub fn create_schedule_router(manager: ScheduleManager) -> Router {
    Router::new()
        .route("/patients/{patient_id}/schedule", post(handlers::manage_schedule))
        .route("/patients/{patient_id}/schedule/jobs", get(handlers::list_schedule_jobs))
        .with_state(manager)
}
