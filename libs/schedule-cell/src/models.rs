use serde::{Deserialize, Serialize};

use shared_models::PatientSchedule;
use shared_utils::JobInfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleAction {
    Pause,
    Resume,
    Update,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActionRequest {
    pub action: ScheduleAction,
    pub schedule: Option<PatientSchedule>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleActionResult {
    pub action: ScheduleAction,
    pub patient_id: String,
    pub active: bool,
    /// Keys of the jobs installed by this action.
    pub installed_jobs: Vec<String>,
    pub cancelled_jobs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleJobs {
    pub patient_id: String,
    pub jobs: Vec<JobInfo>,
}
