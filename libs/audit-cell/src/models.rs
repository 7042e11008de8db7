// =====================================================================================
// AUDIT MODELS
// =====================================================================================

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    // Notification delivery
    MessageDispatchAttempted,
    MessageDispatchCompleted,
    DeliveryStatusReceived,

    // Thresholds
    ThresholdOverrideSet,
    ThresholdOverrideRemoved,
    ThresholdExceeded,

    // Escalation
    EscalationStarted,
    EscalationTierFired,
    EscalationAcknowledged,

    // Scheduling
    ScheduleInstalled,
    SchedulePaused,
    ScheduleResumed,
    ScheduledMessageSent,
    ScheduledMessageFailed,
    ScheduledMessageCancelled,

    // Inbound traffic
    InboundMessageReceived,
    MedicationConfirmed,
    SmsOptOutChanged,
    WebhookRejected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
    Denied,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub actor: Option<String>,
    pub patient_id: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub action: String,
    pub outcome: AuditOutcome,
    pub additional_data: HashMap<String, serde_json::Value>,
}

impl AuditEntry {
    pub fn new(event_type: AuditEventType, action: impl Into<String>, outcome: AuditOutcome) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            actor: None,
            patient_id: None,
            resource_type: None,
            resource_id: None,
            action: action.into(),
            outcome,
            additional_data: HashMap::new(),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn with_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_optional_patient(mut self, patient_id: Option<&str>) -> Self {
        self.patient_id = patient_id.map(str::to_string);
        self
    }

    pub fn with_resource(mut self, resource_type: &str, resource_id: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.into());
        self
    }

    pub fn add_context<T: Serialize>(mut self, key: &str, value: T) -> Self {
        if let Ok(value) = serde_json::to_value(value) {
            self.additional_data.insert(key.to_string(), value);
        }
        self
    }

    pub fn context(&self, key: &str) -> Option<&serde_json::Value> {
        self.additional_data.get(key)
    }
}
