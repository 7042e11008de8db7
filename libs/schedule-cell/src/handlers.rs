use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};

use shared_models::error::AppError;

use crate::error::ScheduleError;
use crate::models::{ScheduleAction, ScheduleActionRequest, ScheduleActionResult, ScheduleJobs};
use crate::services::ScheduleManager;

#[axum::debug_handler]
pub async fn manage_schedule(
    State(manager): State<ScheduleManager>,
    Path(patient_id): Path<String>,
    Json(request): Json<ScheduleActionRequest>,
) -> Result<Json<Value>, AppError> {
    let result = match request.action {
        ScheduleAction::Pause => {
            let cancelled = manager.pause(&patient_id).await?;
            ScheduleActionResult {
                action: request.action,
                patient_id,
                active: false,
                installed_jobs: Vec::new(),
                cancelled_jobs: cancelled,
            }
        }
        ScheduleAction::Resume => {
            let keys = manager.resume(&patient_id).await?;
            ScheduleActionResult {
                action: request.action,
                patient_id,
                active: true,
                installed_jobs: keys,
                cancelled_jobs: 0,
            }
        }
        ScheduleAction::Update => {
            let schedule = request
                .schedule
                .ok_or_else(|| ScheduleError::ValidationError("schedule is required for update".to_string()))?;
            let keys = manager.update_schedule(&patient_id, schedule).await?;
            ScheduleActionResult {
                action: request.action,
                patient_id,
                active: true,
                installed_jobs: keys,
                cancelled_jobs: 0,
            }
        }
    };

    Ok(Json(json!({
        "success": true,
        "schedule": result,
    })))
}

#[axum::debug_handler]
pub async fn list_schedule_jobs(
    State(manager): State<ScheduleManager>,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let jobs = manager.jobs(&patient_id);

    Ok(Json(json!({
        "success": true,
        "count": jobs.len(),
        "schedule": ScheduleJobs { patient_id, jobs },
    })))
}
