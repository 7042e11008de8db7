use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use messaging_cell::{MessageResponse, MessageType};
use shared_models::{CareTeamMember, VitalReading};
use threshold_cell::ThresholdAlert;

// ==============================================================================
// VITALS
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordVitalRequest {
    pub patient_id: String,
    pub vital_type: String,
    pub value: f64,
    pub unit: Option<String>,
    pub measured_at: Option<DateTime<Utc>>,
    pub device_id: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdCheck {
    pub threshold_exceeded: bool,
    pub alert: Option<ThresholdAlert>,
    pub alert_sent: bool,
    pub debounced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
}

impl ThresholdCheck {
    pub fn within_range() -> Self {
        Self {
            threshold_exceeded: false,
            alert: None,
            alert_sent: false,
            debounced: false,
            incident_id: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalCheckResult {
    pub vital_id: String,
    pub threshold_check: ThresholdCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedReading {
    #[serde(flatten)]
    pub reading: VitalReading,
    pub analysis: Option<ThresholdAlert>,
}

#[derive(Debug, Deserialize)]
pub struct VitalsQuery {
    pub limit: Option<usize>,
}

// ==============================================================================
// CRITICAL ALERTS AND ESCALATION
// ==============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CriticalAlertRequest {
    pub patient_id: String,
    pub alert_type: String,
    #[serde(default)]
    pub data: Value,
    /// Explicit recipients; when absent the care-team policy decides.
    pub care_team: Option<Vec<CareTeamMember>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierNotification {
    pub recipient_id: Option<String>,
    pub recipient: String,
    pub channel: MessageType,
    pub success: bool,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TierNotification {
    pub fn from_response(
        recipient_id: Option<String>,
        recipient: &str,
        channel: MessageType,
        response: MessageResponse,
    ) -> Self {
        Self {
            recipient_id,
            recipient: recipient.to_string(),
            channel,
            success: response.success,
            provider: response.provider,
            error: response.error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationOutcome {
    pub incident_id: String,
    pub notifications: Vec<TierNotification>,
    pub scheduled_levels: Vec<u8>,
}

impl EscalationOutcome {
    pub fn any_delivered(&self) -> bool {
        self.notifications.iter().any(|n| n.success)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub acknowledged_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeOutcome {
    pub incident_id: String,
    pub cancelled_timers: usize,
    pub already_acknowledged: bool,
}

// ==============================================================================
// INBOUND SMS
// ==============================================================================

pub const GLUCOSE_SMS_MIN: f64 = 20.0;
pub const GLUCOSE_SMS_MAX: f64 = 600.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InboundKeyword {
    MedicationTaken,
    Help,
    Stop,
    Start,
    Emergency,
    GlucoseReading(f64),
    Unrecognized,
}

impl InboundKeyword {
    pub fn parse(body: &str) -> Self {
        let trimmed = body.trim();
        let first_word = trimmed
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .trim_matches(|c: char| !c.is_ascii_alphanumeric())
            .to_ascii_uppercase();

        match first_word.as_str() {
            "TAKEN" | "DONE" | "YES" => InboundKeyword::MedicationTaken,
            "HELP" => InboundKeyword::Help,
            "STOP" | "UNSUBSCRIBE" => InboundKeyword::Stop,
            "START" | "UNSTOP" => InboundKeyword::Start,
            "EMERGENCY" | "URGENT" | "911" => InboundKeyword::Emergency,
            _ => match trimmed.parse::<f64>() {
                Ok(value) if (GLUCOSE_SMS_MIN..=GLUCOSE_SMS_MAX).contains(&value) => {
                    InboundKeyword::GlucoseReading(value)
                }
                _ => InboundKeyword::Unrecognized,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReply {
    pub keyword: InboundKeyword,
    pub patient_id: Option<String>,
    pub reply: String,
    pub reply_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookOutcome {
    pub event: String,
    pub handled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl WebhookOutcome {
    pub fn handled(event: &str, detail: impl Into<String>) -> Self {
        Self {
            event: event.to_string(),
            handled: true,
            detail: Some(detail.into()),
        }
    }

    pub fn ignored(event: &str) -> Self {
        Self {
            event: event.to_string(),
            handled: false,
            detail: None,
        }
    }
}
