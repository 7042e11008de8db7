use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Hypoglycemia,
    Hyperglycemia,
    /// Critical non-glucose vital (blood pressure, oxygen, heart rate...).
    VitalSignCritical,
    MedicationMissed,
    DeviceDisconnected,
    WoundDeterioration,
    EmergencyResponse,
    #[serde(other)]
    General,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::Hypoglycemia => "hypoglycemia",
            AlertType::Hyperglycemia => "hyperglycemia",
            AlertType::VitalSignCritical => "vital_sign_critical",
            AlertType::MedicationMissed => "medication_missed",
            AlertType::DeviceDisconnected => "device_disconnected",
            AlertType::WoundDeterioration => "wound_deterioration",
            AlertType::EmergencyResponse => "emergency_response",
            AlertType::General => "general",
        }
    }

    /// Lenient parse; anything unrecognized is a general alert.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "hypoglycemia" | "critical_low_glucose" => AlertType::Hypoglycemia,
            "hyperglycemia" | "critical_high_glucose" => AlertType::Hyperglycemia,
            "vital_sign_critical" => AlertType::VitalSignCritical,
            "medication_missed" => AlertType::MedicationMissed,
            "device_disconnected" => AlertType::DeviceDisconnected,
            "wound_deterioration" => AlertType::WoundDeterioration,
            "emergency_response" | "emergency" => AlertType::EmergencyResponse,
            _ => AlertType::General,
        }
    }

    pub fn policy(&self) -> RecipientPolicy {
        POLICY_TABLE
            .iter()
            .find(|(alert_type, _)| alert_type == self)
            .map(|(_, policy)| *policy)
            .unwrap_or(RecipientPolicy::CoordinatorOnly)
    }

    /// The first escalation tier also places a voice call for these.
    pub fn requires_voice(&self) -> bool {
        matches!(
            self,
            AlertType::Hypoglycemia | AlertType::EmergencyResponse | AlertType::VitalSignCritical
        )
    }
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How recipients are chosen for an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecipientPolicy {
    /// Physician and coordinator in business hours, otherwise on-call only.
    PhysicianAndCoordinatorInHoursElseOnCall,
    /// Coordinator when available per their schedule, otherwise nobody.
    CoordinatorIfAvailable,
    /// Physician and coordinator at any hour.
    PhysicianAndCoordinator,
    /// On-call always, physician additionally in business hours.
    OnCallPlusPhysicianInHours,
    CoordinatorOnly,
}

pub const POLICY_TABLE: &[(AlertType, RecipientPolicy)] = &[
    (AlertType::Hypoglycemia, RecipientPolicy::PhysicianAndCoordinatorInHoursElseOnCall),
    (AlertType::Hyperglycemia, RecipientPolicy::PhysicianAndCoordinatorInHoursElseOnCall),
    (AlertType::VitalSignCritical, RecipientPolicy::PhysicianAndCoordinatorInHoursElseOnCall),
    (AlertType::MedicationMissed, RecipientPolicy::CoordinatorIfAvailable),
    (AlertType::DeviceDisconnected, RecipientPolicy::CoordinatorIfAvailable),
    (AlertType::WoundDeterioration, RecipientPolicy::PhysicianAndCoordinator),
    (AlertType::EmergencyResponse, RecipientPolicy::OnCallPlusPhysicianInHours),
    (AlertType::General, RecipientPolicy::CoordinatorOnly),
];

#[derive(Debug, Clone, PartialEq)]
pub struct AlertContext {
    pub alert_type: AlertType,
    pub occurred_at: DateTime<Utc>,
}

impl AlertContext {
    pub fn new(alert_type: AlertType, occurred_at: DateTime<Utc>) -> Self {
        Self {
            alert_type,
            occurred_at,
        }
    }
}
