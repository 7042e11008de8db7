use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use shared_models::Severity;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Sms,
    Voice,
    Email,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Sms => "sms",
            MessageType::Voice => "voice",
            MessageType::Email => "email",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Longest accepted escalation rule delay: one week.
pub const MAX_ESCALATION_DELAY_MINUTES: u64 = 7 * 24 * 60;

/// Follow-up installed when a critical send fails. `delay` is in minutes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    pub delay: u64,
    pub recipient: String,
    #[serde(default)]
    pub method: MessageType,
    pub message: String,
}

fn default_priority() -> Severity {
    Severity::Medium
}

fn default_category() -> String {
    "general".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub to: String,
    #[serde(default)]
    pub message: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(default = "default_priority")]
    pub priority: Severity,
    pub patient_id: Option<String>,
    pub provider_id: Option<String>,
    #[serde(default = "default_category")]
    pub category: String,
    pub template: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    /// Groups rule timers so acknowledging the incident cancels them.
    pub incident_id: Option<String>,
}

impl MessageRequest {
    pub fn new(message_type: MessageType, to: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            message: message.into(),
            message_type,
            priority: default_priority(),
            patient_id: None,
            provider_id: None,
            category: default_category(),
            template: None,
            variables: HashMap::new(),
            escalation_rules: Vec::new(),
            incident_id: None,
        }
    }

    pub fn sms(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(MessageType::Sms, to, message)
    }

    pub fn voice(to: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(MessageType::Voice, to, message)
    }

    pub fn with_priority(mut self, priority: Severity) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_provider(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = Some(provider_id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_template(mut self, template: &str, variables: HashMap<String, String>) -> Self {
        self.template = Some(template.to_string());
        self.variables = variables;
        self
    }

    pub fn with_escalation(mut self, incident_id: impl Into<String>, rules: Vec<EscalationRule>) -> Self {
        self.incident_id = Some(incident_id.into());
        self.escalation_rules = rules;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Queued,
    Sending,
    Sent,
    Delivered,
    Failed,
    Undelivered,
    Unknown,
}

impl DeliveryStatus {
    /// Maps the vendors' status vocabularies onto one set.
    pub fn from_provider(status: &str) -> Self {
        match status.to_ascii_lowercase().as_str() {
            "queued" | "accepted" | "scheduled" | "initiated" => DeliveryStatus::Queued,
            "sending" | "ringing" | "in-progress" => DeliveryStatus::Sending,
            "sent" | "answered" => DeliveryStatus::Sent,
            "delivered" | "completed" | "received" | "read" => DeliveryStatus::Delivered,
            "failed" | "delivery_failed" | "sending_failed" | "busy" | "no-answer" | "canceled" => {
                DeliveryStatus::Failed
            }
            "undelivered" | "delivery_unconfirmed" => DeliveryStatus::Undelivered,
            _ => DeliveryStatus::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Queued => "queued",
            DeliveryStatus::Sending => "sending",
            DeliveryStatus::Sent => "sent",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Failed => "failed",
            DeliveryStatus::Undelivered => "undelivered",
            DeliveryStatus::Unknown => "unknown",
        }
    }
}

/// What a provider hands back after accepting a message or call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderReceipt {
    pub message_id: String,
    pub status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retryable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_status: Option<DeliveryStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incident_id: Option<String>,
}

impl MessageResponse {
    pub fn delivered(provider: &str, receipt: ProviderReceipt) -> Self {
        Self {
            success: true,
            message_id: Some(receipt.message_id),
            provider: provider.to_string(),
            error: None,
            retryable: None,
            delivery_status: Some(receipt.status),
            incident_id: None,
        }
    }

    pub fn failed(provider: &str, error: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            message_id: None,
            provider: provider.to_string(),
            error: Some(error.into()),
            retryable: Some(retryable),
            delivery_status: Some(DeliveryStatus::Failed),
            incident_id: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeliveryStatusQuery {
    pub provider: String,
}

// Telnyx API shapes

#[derive(Debug, Serialize)]
pub struct TelnyxMessageRequest<'a> {
    pub from: &'a str,
    pub to: &'a str,
    pub text: &'a str,
    pub messaging_profile_id: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TelnyxCallRequest<'a> {
    pub connection_id: &'a str,
    pub to: &'a str,
    pub from: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TelnyxSpeakRequest<'a> {
    pub payload: &'a str,
    pub voice: &'a str,
    pub language: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxEnvelope<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxRecipient {
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxMessageData {
    pub id: String,
    #[serde(default)]
    pub to: Vec<TelnyxRecipient>,
}

#[derive(Debug, Deserialize)]
pub struct TelnyxCallData {
    pub call_control_id: String,
}

/// Inbound Telnyx webhook: `{ "data": { "event_type": .., "payload": {..} } }`.
#[derive(Debug, Clone, Deserialize)]
pub struct TelnyxWebhook {
    pub data: TelnyxWebhookEvent,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelnyxWebhookEvent {
    pub event_type: String,
    pub id: Option<String>,
    #[serde(default)]
    pub payload: Value,
}

// Twilio API shapes

#[derive(Debug, Deserialize)]
pub struct TwilioResource {
    pub sid: String,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TwilioErrorBody {
    pub code: Option<i64>,
    pub message: Option<String>,
}

/// Twilio status callback (form encoded). Covers both message and call callbacks.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioStatusCallback {
    pub message_sid: Option<String>,
    pub message_status: Option<String>,
    pub call_sid: Option<String>,
    pub call_status: Option<String>,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TwilioInboundMessage {
    pub from: String,
    #[serde(default)]
    pub body: String,
    pub message_sid: Option<String>,
}
