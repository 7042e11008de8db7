use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Persisted state of one critical incident's escalation chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRecord {
    pub incident_id: String,
    pub patient_id: String,
    pub alert_type: String,
    pub message: String,
    pub started_at: DateTime<Utc>,
    pub delay_minutes: u64,
    /// Highest tier that will be scheduled (tier 0 is the initial notification).
    pub max_level: u8,
    pub fired_levels: Vec<u8>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub acknowledged_by: Option<String>,
}

impl EscalationRecord {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at.is_some()
    }

    /// Saturates at the latest representable instant instead of overflowing.
    pub fn fire_time(&self, level: u8) -> DateTime<Utc> {
        self.delay_minutes
            .checked_mul(u64::from(level))
            .and_then(|minutes| i64::try_from(minutes).ok())
            .and_then(Duration::try_minutes)
            .and_then(|offset| self.started_at.checked_add_signed(offset))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn pending_levels(&self) -> Vec<u8> {
        if self.is_acknowledged() {
            return Vec::new();
        }
        (1..=self.max_level)
            .filter(|level| !self.fired_levels.contains(level))
            .collect()
    }
}
