use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Delivery callback reported by a telephony provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryStatusUpdate {
    pub message_id: String,
    pub provider: String,
    pub status: String,
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}
