use std::collections::{HashMap, HashSet};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;

use shared_models::{
    CareTeamMember, DeliveryStatusUpdate, EscalationRecord, PatientContact, PatientSchedule,
    PatientThresholdOverride, ScheduledMessage, VitalReading,
};

use crate::store::ClinicalStore;

/// Process-local store used in development and tests.
#[derive(Default)]
pub struct InMemoryStore {
    overrides: RwLock<Vec<PatientThresholdOverride>>,
    settings: RwLock<HashMap<String, f64>>,
    patients: RwLock<HashMap<String, PatientContact>>,
    care_teams: RwLock<HashMap<String, Vec<CareTeamMember>>>,
    vitals: RwLock<Vec<VitalReading>>,
    schedules: RwLock<HashMap<String, PatientSchedule>>,
    scheduled_messages: RwLock<HashMap<String, ScheduledMessage>>,
    delivery_updates: RwLock<Vec<DeliveryStatusUpdate>>,
    opted_out: RwLock<HashSet<String>>,
    escalations: RwLock<HashMap<String, EscalationRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_global_threshold(&self, key: &str, value: f64) {
        self.settings.write().await.insert(key.to_string(), value);
    }

    pub async fn add_patient(&self, contact: PatientContact) {
        self.patients
            .write()
            .await
            .insert(contact.patient_id.clone(), contact);
    }

    pub async fn add_care_team_member(&self, patient_id: &str, member: CareTeamMember) {
        self.care_teams
            .write()
            .await
            .entry(patient_id.to_string())
            .or_default()
            .push(member);
    }

    pub async fn delivery_updates(&self) -> Vec<DeliveryStatusUpdate> {
        self.delivery_updates.read().await.clone()
    }

    pub async fn scheduled_messages_for(&self, patient_id: &str) -> Vec<ScheduledMessage> {
        self.scheduled_messages
            .read()
            .await
            .values()
            .filter(|m| m.patient_id == patient_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ClinicalStore for InMemoryStore {
    async fn active_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
    ) -> Result<Option<PatientThresholdOverride>> {
        let overrides = self.overrides.read().await;
        Ok(overrides
            .iter()
            .filter(|o| o.is_active && o.patient_id == patient_id && o.threshold_type == threshold_type)
            .max_by_key(|o| o.updated_at)
            .cloned())
    }

    async fn active_threshold_overrides(&self, patient_id: &str) -> Result<Vec<PatientThresholdOverride>> {
        let overrides = self.overrides.read().await;
        Ok(overrides
            .iter()
            .filter(|o| o.is_active && o.patient_id == patient_id)
            .cloned()
            .collect())
    }

    async fn upsert_threshold_override(
        &self,
        threshold: PatientThresholdOverride,
    ) -> Result<PatientThresholdOverride> {
        let mut overrides = self.overrides.write().await;
        // Keep at most one active row per (patient, type); older rows stay as history.
        for existing in overrides.iter_mut().filter(|o| {
            o.is_active
                && o.patient_id == threshold.patient_id
                && o.threshold_type == threshold.threshold_type
                && o.id != threshold.id
        }) {
            existing.is_active = false;
            existing.updated_by = threshold.updated_by.clone();
            existing.updated_at = threshold.updated_at;
        }

        match overrides.iter_mut().find(|o| o.id == threshold.id) {
            Some(existing) => *existing = threshold.clone(),
            None => overrides.push(threshold.clone()),
        }
        Ok(threshold)
    }

    async fn deactivate_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
        updated_by: &str,
    ) -> Result<bool> {
        let mut overrides = self.overrides.write().await;
        let mut changed = false;
        for existing in overrides.iter_mut().filter(|o| {
            o.is_active && o.patient_id == patient_id && o.threshold_type == threshold_type
        }) {
            existing.is_active = false;
            existing.updated_by = updated_by.to_string();
            existing.updated_at = chrono::Utc::now();
            changed = true;
        }
        Ok(changed)
    }

    async fn global_threshold(&self, key: &str) -> Result<Option<f64>> {
        Ok(self.settings.read().await.get(key).copied())
    }

    async fn patient_contact(&self, patient_id: &str) -> Result<Option<PatientContact>> {
        Ok(self.patients.read().await.get(patient_id).cloned())
    }

    async fn patient_by_phone(&self, phone: &str) -> Result<Option<PatientContact>> {
        Ok(self
            .patients
            .read()
            .await
            .values()
            .find(|p| p.phone == phone)
            .cloned())
    }

    async fn care_team(&self, patient_id: &str) -> Result<Vec<CareTeamMember>> {
        Ok(self
            .care_teams
            .read()
            .await
            .get(patient_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn insert_vital(&self, reading: VitalReading) -> Result<VitalReading> {
        self.vitals.write().await.push(reading.clone());
        Ok(reading)
    }

    async fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalReading>> {
        let mut readings: Vec<VitalReading> = self
            .vitals
            .read()
            .await
            .iter()
            .filter(|v| v.patient_id == patient_id)
            .cloned()
            .collect();
        readings.sort_by(|a, b| b.measured_at.cmp(&a.measured_at));
        readings.truncate(limit);
        Ok(readings)
    }

    async fn save_schedule(&self, schedule: &PatientSchedule) -> Result<()> {
        self.schedules
            .write()
            .await
            .insert(schedule.patient_id.clone(), schedule.clone());
        Ok(())
    }

    async fn schedule(&self, patient_id: &str) -> Result<Option<PatientSchedule>> {
        Ok(self.schedules.read().await.get(patient_id).cloned())
    }

    async fn active_schedules(&self) -> Result<Vec<PatientSchedule>> {
        Ok(self
            .schedules
            .read()
            .await
            .values()
            .filter(|s| s.active)
            .cloned()
            .collect())
    }

    async fn set_schedule_active(&self, patient_id: &str, active: bool) -> Result<bool> {
        let mut schedules = self.schedules.write().await;
        match schedules.get_mut(patient_id) {
            Some(schedule) => {
                schedule.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_scheduled_message(&self, message: &ScheduledMessage) -> Result<()> {
        self.scheduled_messages
            .write()
            .await
            .insert(message.id.clone(), message.clone());
        Ok(())
    }

    async fn scheduled_message(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        Ok(self.scheduled_messages.read().await.get(id).cloned())
    }

    async fn record_delivery_status(&self, update: DeliveryStatusUpdate) -> Result<()> {
        self.delivery_updates.write().await.push(update);
        Ok(())
    }

    async fn set_sms_opt_out(&self, phone: &str, opted_out: bool) -> Result<()> {
        let mut set = self.opted_out.write().await;
        if opted_out {
            set.insert(phone.to_string());
        } else {
            set.remove(phone);
        }
        Ok(())
    }

    async fn is_sms_opted_out(&self, phone: &str) -> Result<bool> {
        Ok(self.opted_out.read().await.contains(phone))
    }

    async fn save_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.escalations
            .write()
            .await
            .insert(record.incident_id.clone(), record.clone());
        Ok(())
    }

    async fn escalation(&self, incident_id: &str) -> Result<Option<EscalationRecord>> {
        Ok(self.escalations.read().await.get(incident_id).cloned())
    }

    async fn pending_escalations(&self) -> Result<Vec<EscalationRecord>> {
        Ok(self
            .escalations
            .read()
            .await
            .values()
            .filter(|r| !r.pending_levels().is_empty())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn override_row(id: &str, value: f64, minutes_ago: i64) -> PatientThresholdOverride {
        let at = Utc::now() - Duration::minutes(minutes_ago);
        PatientThresholdOverride {
            id: id.to_string(),
            patient_id: "patient-1".to_string(),
            threshold_type: "glucose_low".to_string(),
            value,
            unit: "mg/dL".to_string(),
            notes: None,
            is_active: true,
            created_by: "dr-a".to_string(),
            updated_by: "dr-a".to_string(),
            created_at: at,
            updated_at: at,
        }
    }

    #[tokio::test]
    async fn test_upsert_keeps_single_active_override() {
        let store = InMemoryStore::new();
        store.upsert_threshold_override(override_row("a", 60.0, 10)).await.unwrap();
        store.upsert_threshold_override(override_row("b", 65.0, 0)).await.unwrap();

        let active = store.active_threshold_overrides("patient-1").await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "b");
    }

    #[tokio::test]
    async fn test_deactivate_is_idempotent() {
        let store = InMemoryStore::new();
        store.upsert_threshold_override(override_row("a", 60.0, 0)).await.unwrap();

        assert!(store.deactivate_threshold_override("patient-1", "glucose_low", "dr-b").await.unwrap());
        assert!(!store.deactivate_threshold_override("patient-1", "glucose_low", "dr-b").await.unwrap());
        assert!(store
            .active_threshold_override("patient-1", "glucose_low")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_opt_out_round_trip() {
        let store = InMemoryStore::new();
        store.set_sms_opt_out("+15550001111", true).await.unwrap();
        assert!(store.is_sms_opted_out("+15550001111").await.unwrap());
        store.set_sms_opt_out("+15550001111", false).await.unwrap();
        assert!(!store.is_sms_opted_out("+15550001111").await.unwrap());
    }
}
