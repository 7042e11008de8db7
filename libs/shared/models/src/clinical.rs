use chrono::{DateTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Ordered low → critical; also used as message priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CareTeamRole {
    PrimaryPhysician,
    CareCoordinator,
    OnCallProvider,
    Nurse,
    Specialist,
    #[serde(other)]
    Other,
}

/// Weekly availability window, hours in `[start, end)` on the listed days.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailableHours {
    pub start: u32,
    pub end: u32,
    pub days: Vec<Weekday>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareTeamMember {
    pub id: String,
    pub name: String,
    pub role: CareTeamRole,
    pub phone_number: String,
    pub email: Option<String>,
    pub department: Option<String>,
    pub on_call: bool,
    pub priority: i32,
    pub escalation_order: i32,
    #[serde(default)]
    pub specialties: Vec<String>,
    pub available_hours: AvailableHours,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientContact {
    pub patient_id: String,
    pub name: String,
    pub phone: String,
    pub emergency_contact_name: Option<String>,
    pub emergency_contact_phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalReading {
    pub id: String,
    pub patient_id: String,
    pub vital_type: String,
    pub value: f64,
    pub unit: String,
    pub measured_at: DateTime<Utc>,
    pub device_id: Option<String>,
    /// "device", "manual" or "sms"
    pub source: String,
}
