use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use shared_database::ClinicalStore;
use shared_models::PatientThresholdOverride;

use crate::error::ThresholdError;
use crate::models::{
    severity_from_excess, Bound, SetThresholdRequest, Threshold, ThresholdAlert, ThresholdSource,
    ThresholdType, VitalType,
};

pub struct ThresholdResolver {
    store: Arc<dyn ClinicalStore>,
    audit: Arc<dyn AuditSink>,
}

impl ThresholdResolver {
    pub fn new(store: Arc<dyn ClinicalStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { store, audit }
    }

    /// Effective threshold: active patient override, then global setting, then
    /// the built-in default. `None` when the type has no value anywhere.
    #[instrument(skip(self))]
    pub async fn resolve(
        &self,
        patient_id: &str,
        threshold_type: ThresholdType,
    ) -> Result<Option<Threshold>, ThresholdError> {
        let definition = threshold_type.definition();

        if let Some(row) = self
            .store
            .active_threshold_override(patient_id, threshold_type.as_str())
            .await?
        {
            debug!("Using patient override for {}: {}", threshold_type, row.value);
            return Ok(Some(Threshold {
                threshold_type,
                value: row.value,
                unit: row.unit,
                is_patient_specific: true,
                notes: row.notes,
                source: ThresholdSource::PatientOverride,
            }));
        }

        if let Some(value) = self.store.global_threshold(&threshold_type.global_key()).await? {
            return Ok(Some(Threshold {
                threshold_type,
                value,
                unit: definition.unit.to_string(),
                is_patient_specific: false,
                notes: None,
                source: ThresholdSource::Global,
            }));
        }

        Ok(definition.default_value.map(|value| Threshold {
            threshold_type,
            value,
            unit: definition.unit.to_string(),
            is_patient_specific: false,
            notes: None,
            source: ThresholdSource::Default,
        }))
    }

    /// Checks a reading against every candidate threshold of its vital type and
    /// reports the first one exceeded. Boundary values are normal.
    #[instrument(skip(self))]
    pub async fn evaluate(
        &self,
        patient_id: &str,
        vital_type: VitalType,
        value: f64,
    ) -> Result<Option<ThresholdAlert>, ThresholdError> {
        if !value.is_finite() {
            return Err(ThresholdError::ValidationError(format!(
                "Reading for {} must be a finite number",
                vital_type.as_str()
            )));
        }

        for &threshold_type in vital_type.candidate_thresholds() {
            let Some(threshold) = self.resolve(patient_id, threshold_type).await? else {
                continue;
            };

            let definition = threshold_type.definition();
            let exceeded = match definition.bound {
                Bound::High => value > threshold.value,
                Bound::Low => value < threshold.value,
            };
            if !exceeded {
                continue;
            }

            let severity = definition
                .default_severity
                .unwrap_or_else(|| severity_from_excess(definition.bound, value, threshold.value));
            let direction = match definition.bound {
                Bound::High => "above",
                Bound::Low => "below",
            };
            let message = format!(
                "{} reading of {} {} is {} the {}threshold of {} {}",
                vital_type.label(),
                value,
                threshold.unit,
                direction,
                if threshold.is_patient_specific { "patient-specific " } else { "" },
                threshold.value,
                threshold.unit,
            );

            info!(
                patient_id = %patient_id,
                threshold_type = %threshold_type,
                severity = %severity,
                "Threshold exceeded"
            );

            return Ok(Some(ThresholdAlert {
                patient_id: patient_id.to_string(),
                threshold_type,
                actual_value: value,
                threshold_value: threshold.value,
                unit: threshold.unit,
                severity,
                is_patient_specific: threshold.is_patient_specific,
                message,
            }));
        }

        Ok(None)
    }

    /// Resolved value for every known type; types with no value anywhere are omitted.
    pub async fn effective_thresholds(&self, patient_id: &str) -> Result<Vec<Threshold>, ThresholdError> {
        let mut thresholds = Vec::with_capacity(ThresholdType::ALL.len());
        for threshold_type in ThresholdType::ALL {
            if let Some(threshold) = self.resolve(patient_id, threshold_type).await? {
                thresholds.push(threshold);
            }
        }
        Ok(thresholds)
    }

    #[instrument(skip(self, request))]
    pub async fn set_override(
        &self,
        patient_id: &str,
        request: SetThresholdRequest,
    ) -> Result<PatientThresholdOverride, ThresholdError> {
        let threshold_type: ThresholdType = request.threshold_type.parse()?;

        if !request.threshold_value.is_finite() || request.threshold_value <= 0.0 {
            return Err(ThresholdError::ValidationError(format!(
                "Threshold value for {} must be a positive number",
                threshold_type
            )));
        }

        let actor = request.updated_by.unwrap_or_else(|| "system".to_string());
        let unit = request
            .unit
            .unwrap_or_else(|| threshold_type.definition().unit.to_string());
        let now = Utc::now();

        let existing = self
            .store
            .active_threshold_override(patient_id, threshold_type.as_str())
            .await?;
        let previous_value = existing.as_ref().map(|row| row.value);

        let row = match existing {
            Some(mut row) => {
                row.value = request.threshold_value;
                row.unit = unit;
                row.notes = request.notes;
                row.updated_by = actor.clone();
                row.updated_at = now;
                row
            }
            None => PatientThresholdOverride {
                id: Uuid::new_v4().to_string(),
                patient_id: patient_id.to_string(),
                threshold_type: threshold_type.as_str().to_string(),
                value: request.threshold_value,
                unit,
                notes: request.notes,
                is_active: true,
                created_by: actor.clone(),
                updated_by: actor.clone(),
                created_at: now,
                updated_at: now,
            },
        };

        let saved = self.store.upsert_threshold_override(row).await?;

        info!(
            patient_id = %patient_id,
            threshold_type = %threshold_type,
            value = saved.value,
            "Patient threshold override set"
        );
        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::ThresholdOverrideSet,
                    format!("set {} override", threshold_type),
                    AuditOutcome::Success,
                )
                .with_actor(actor)
                .with_patient(patient_id)
                .with_resource("patient_threshold", saved.id.clone())
                .add_context("threshold_type", threshold_type.as_str())
                .add_context("value", saved.value)
                .add_context("previous_value", previous_value),
            )
            .await;

        Ok(saved)
    }

    /// Soft-removes the override so the global value applies again. Returns
    /// false when nothing was active, which is not an error.
    #[instrument(skip(self))]
    pub async fn remove_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
        updated_by: &str,
    ) -> Result<bool, ThresholdError> {
        let threshold_type: ThresholdType = threshold_type.parse()?;

        let removed = self
            .store
            .deactivate_threshold_override(patient_id, threshold_type.as_str(), updated_by)
            .await?;

        if removed {
            info!(patient_id = %patient_id, threshold_type = %threshold_type, "Patient threshold override removed");
        } else {
            warn!(patient_id = %patient_id, threshold_type = %threshold_type, "No active override to remove");
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::ThresholdOverrideRemoved,
                    format!("remove {} override", threshold_type),
                    if removed { AuditOutcome::Success } else { AuditOutcome::Info },
                )
                .with_actor(updated_by)
                .with_patient(patient_id)
                .add_context("threshold_type", threshold_type.as_str())
                .add_context("was_active", removed),
            )
            .await;

        Ok(removed)
    }
}
