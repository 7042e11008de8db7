use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Medication {
    pub name: String,
    pub dosage: String,
    /// Local "HH:MM" dose times.
    pub times: Vec<String>,
    pub instructions: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlucoseCheck {
    pub time: String,
    pub label: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Appointment {
    pub id: String,
    pub scheduled_at: DateTime<Utc>,
    pub provider_name: String,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DigestFrequency {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CareTeamUpdates {
    pub frequency: DigestFrequency,
    pub time: String,
    /// Weekly digests only, defaults to Monday.
    pub day_of_week: Option<chrono::Weekday>,
    /// Monthly digests only, defaults to the 1st.
    pub day_of_month: Option<u32>,
    /// Recipient numbers; empty means the patient's own phone.
    #[serde(default)]
    pub recipients: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuietHours {
    pub start: String,
    pub end: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulePreferences {
    pub medication_reminders: bool,
    pub glucose_reminders: bool,
    pub appointment_reminders: bool,
    pub care_team_updates: bool,
}

impl Default for SchedulePreferences {
    fn default() -> Self {
        Self {
            medication_reminders: true,
            glucose_reminders: true,
            appointment_reminders: true,
            care_team_updates: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientSchedule {
    pub patient_id: String,
    #[serde(default)]
    pub medications: Vec<Medication>,
    #[serde(default)]
    pub glucose_checks: Vec<GlucoseCheck>,
    #[serde(default)]
    pub appointments: Vec<Appointment>,
    pub care_team_updates: Option<CareTeamUpdates>,
    pub quiet_hours: Option<QuietHours>,
    pub timezone: String,
    pub phone: String,
    #[serde(default)]
    pub preferences: SchedulePreferences,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduledMessageType {
    MedicationReminder,
    GlucoseCheck,
    AppointmentReminder,
    CareTeamUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledMessageStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl ScheduledMessageStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ScheduledMessageStatus::Pending)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledMessage {
    pub id: String,
    pub patient_id: String,
    #[serde(rename = "type")]
    pub message_type: ScheduledMessageType,
    pub message: String,
    pub scheduled_time: DateTime<Utc>,
    pub phone: String,
    pub status: ScheduledMessageStatus,
    pub retry_count: u32,
    pub max_retries: u32,
    pub metadata: Value,
}
