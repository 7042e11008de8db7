use anyhow::Result;
use async_trait::async_trait;

use shared_models::{
    CareTeamMember, DeliveryStatusUpdate, EscalationRecord, PatientContact, PatientSchedule,
    PatientThresholdOverride, ScheduledMessage, VitalReading,
};

/// Narrow read/write contract to the persistent store. Everything the alerting
/// engine persists or looks up goes through here.
#[async_trait]
pub trait ClinicalStore: Send + Sync {
    // Thresholds

    /// Latest active override for (patient, type), if any.
    async fn active_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
    ) -> Result<Option<PatientThresholdOverride>>;

    async fn active_threshold_overrides(&self, patient_id: &str) -> Result<Vec<PatientThresholdOverride>>;

    /// Insert or replace the active override for (patient, type).
    async fn upsert_threshold_override(
        &self,
        threshold: PatientThresholdOverride,
    ) -> Result<PatientThresholdOverride>;

    /// Marks the active override inactive. Returns false when none was active.
    async fn deactivate_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
        updated_by: &str,
    ) -> Result<bool>;

    /// Globally configured value stored under `threshold_{type}`.
    async fn global_threshold(&self, key: &str) -> Result<Option<f64>>;

    // Patients and care teams

    async fn patient_contact(&self, patient_id: &str) -> Result<Option<PatientContact>>;

    async fn patient_by_phone(&self, phone: &str) -> Result<Option<PatientContact>>;

    async fn care_team(&self, patient_id: &str) -> Result<Vec<CareTeamMember>>;

    // Vitals

    async fn insert_vital(&self, reading: VitalReading) -> Result<VitalReading>;

    /// Most recent first.
    async fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalReading>>;

    // Schedules

    async fn save_schedule(&self, schedule: &PatientSchedule) -> Result<()>;

    async fn schedule(&self, patient_id: &str) -> Result<Option<PatientSchedule>>;

    async fn active_schedules(&self) -> Result<Vec<PatientSchedule>>;

    /// Returns false when no schedule is stored for the patient.
    async fn set_schedule_active(&self, patient_id: &str, active: bool) -> Result<bool>;

    async fn save_scheduled_message(&self, message: &ScheduledMessage) -> Result<()>;

    async fn scheduled_message(&self, id: &str) -> Result<Option<ScheduledMessage>>;

    // Messaging

    async fn record_delivery_status(&self, update: DeliveryStatusUpdate) -> Result<()>;

    async fn set_sms_opt_out(&self, phone: &str, opted_out: bool) -> Result<()>;

    async fn is_sms_opted_out(&self, phone: &str) -> Result<bool>;

    // Escalations

    async fn save_escalation(&self, record: &EscalationRecord) -> Result<()>;

    async fn escalation(&self, incident_id: &str) -> Result<Option<EscalationRecord>>;

    /// Unacknowledged incidents with at least one tier still to fire.
    async fn pending_escalations(&self) -> Result<Vec<EscalationRecord>>;
}
