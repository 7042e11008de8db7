use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored patient-specific threshold row. Soft-deleted through `is_active`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientThresholdOverride {
    pub id: String,
    pub patient_id: String,
    pub threshold_type: String,
    pub value: f64,
    pub unit: String,
    pub notes: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub updated_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
