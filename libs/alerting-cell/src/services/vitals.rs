use std::str::FromStr;
use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use care_team_cell::{AlertContext, AlertType, CareTeamRouter};
use messaging_cell::{MessageRequest, NotificationDispatcher};
use shared_database::ClinicalStore;
use shared_models::{Severity, VitalReading};
use shared_utils::Clock;
use threshold_cell::{Bound, ThresholdAlert, ThresholdError, ThresholdResolver, VitalType};

use crate::error::AlertingError;
use crate::models::{
    AnalyzedReading, CriticalAlertRequest, EscalationOutcome, RecordVitalRequest, ThresholdCheck, VitalCheckResult,
};
use crate::services::{AlertDebouncer, EscalationCoordinator};

const DEFAULT_VITALS_LIMIT: usize = 50;
const MAX_VITALS_LIMIT: usize = 500;

/// Which care-team policy an exceeded threshold falls under.
pub fn alert_type_for(vital_type: VitalType, alert: &ThresholdAlert) -> AlertType {
    match vital_type {
        VitalType::Glucose => match alert.threshold_type.definition().bound {
            Bound::Low => AlertType::Hypoglycemia,
            Bound::High => AlertType::Hyperglycemia,
        },
        _ if alert.severity == Severity::Critical => AlertType::VitalSignCritical,
        _ => AlertType::General,
    }
}

/// Vitals intake: store, evaluate, alert.
pub struct VitalsService {
    store: Arc<dyn ClinicalStore>,
    resolver: Arc<ThresholdResolver>,
    dispatcher: NotificationDispatcher,
    care_team: Arc<CareTeamRouter>,
    escalation: EscalationCoordinator,
    debouncer: Arc<AlertDebouncer>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl VitalsService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        resolver: Arc<ThresholdResolver>,
        dispatcher: NotificationDispatcher,
        care_team: Arc<CareTeamRouter>,
        escalation: EscalationCoordinator,
        debouncer: Arc<AlertDebouncer>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let clock = dispatcher.scheduler().clock();
        Self {
            store,
            resolver,
            dispatcher,
            care_team,
            escalation,
            debouncer,
            audit,
            clock,
        }
    }

    #[instrument(skip(self, request), fields(patient_id = %request.patient_id, vital_type = %request.vital_type))]
    pub async fn record_vital(&self, request: RecordVitalRequest) -> Result<VitalCheckResult, AlertingError> {
        if request.patient_id.trim().is_empty() {
            return Err(AlertingError::ValidationError("patientId is required".to_string()));
        }
        let vital_type = VitalType::from_str(&request.vital_type)?;
        if !request.value.is_finite() {
            return Err(AlertingError::ValidationError(format!(
                "Reading for {} must be a finite number",
                vital_type.as_str()
            )));
        }

        let unit = request.unit.clone().unwrap_or_else(|| {
            vital_type
                .candidate_thresholds()
                .first()
                .map(|t| t.definition().unit.to_string())
                .unwrap_or_default()
        });

        let reading = self
            .store
            .insert_vital(VitalReading {
                id: Uuid::new_v4().to_string(),
                patient_id: request.patient_id.clone(),
                vital_type: vital_type.as_str().to_string(),
                value: request.value,
                unit,
                measured_at: request.measured_at.unwrap_or_else(|| self.clock.now()),
                device_id: request.device_id.clone(),
                source: request.source.clone().unwrap_or_else(|| "device".to_string()),
            })
            .await?;

        let Some(alert) = self
            .resolver
            .evaluate(&reading.patient_id, vital_type, reading.value)
            .await?
        else {
            return Ok(VitalCheckResult {
                vital_id: reading.id,
                threshold_check: ThresholdCheck::within_range(),
            });
        };

        self.audit
            .record(
                AuditEntry::new(AuditEventType::ThresholdExceeded, "vital reading exceeded threshold", AuditOutcome::Info)
                    .with_patient(reading.patient_id.clone())
                    .with_resource("vital_reading", reading.id.clone())
                    .add_context("alert", &alert),
            )
            .await;

        if !self
            .debouncer
            .should_dispatch(&alert.patient_id, alert.threshold_type.as_str())
        {
            return Ok(VitalCheckResult {
                vital_id: reading.id,
                threshold_check: ThresholdCheck {
                    threshold_exceeded: true,
                    alert: Some(alert),
                    alert_sent: false,
                    debounced: true,
                    incident_id: None,
                },
            });
        }

        let (alert_sent, incident_id) = self.dispatch_alert(vital_type, &alert).await?;

        Ok(VitalCheckResult {
            vital_id: reading.id,
            threshold_check: ThresholdCheck {
                threshold_exceeded: true,
                alert: Some(alert),
                alert_sent,
                debounced: false,
                incident_id,
            },
        })
    }

    /// Critical alerts open an escalation; anything else goes out once by SMS
    /// to the policy's recipients.
    async fn dispatch_alert(
        &self,
        vital_type: VitalType,
        alert: &ThresholdAlert,
    ) -> Result<(bool, Option<String>), AlertingError> {
        let alert_type = alert_type_for(vital_type, alert);

        if alert.severity == Severity::Critical {
            let outcome = self
                .escalation
                .start(&alert.patient_id, alert_type, &alert.message, None)
                .await?;
            return Ok((outcome.any_delivered(), Some(outcome.incident_id)));
        }

        let context = AlertContext::new(alert_type, self.clock.now());
        let recipients = self.care_team.recipients_for(&alert.patient_id, &context).await?;
        if recipients.is_empty() {
            warn!(patient_id = %alert.patient_id, "Threshold alert has no recipients");
            return Ok((false, None));
        }

        let mut any_sent = false;
        for member in recipients {
            let request = MessageRequest::sms(&member.phone_number, alert.message.clone())
                .with_priority(alert.severity)
                .with_patient(&alert.patient_id)
                .with_provider(&member.id)
                .with_category("threshold_alert");

            match self.dispatcher.send(request).await {
                Ok(response) => any_sent |= response.success,
                Err(e) => error!("Threshold alert to {} rejected: {}", member.id, e),
            }
        }

        Ok((any_sent, None))
    }

    /// Recent readings, newest first, each with a fresh evaluation against the
    /// thresholds in effect now.
    pub async fn vitals_with_analysis(
        &self,
        patient_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<AnalyzedReading>, AlertingError> {
        let limit = limit.unwrap_or(DEFAULT_VITALS_LIMIT).clamp(1, MAX_VITALS_LIMIT);
        let readings = self.store.recent_vitals(patient_id, limit).await?;

        let mut analyzed = Vec::with_capacity(readings.len());
        for reading in readings {
            let analysis = match VitalType::from_str(&reading.vital_type) {
                Ok(vital_type) => match self.resolver.evaluate(patient_id, vital_type, reading.value).await {
                    Ok(alert) => alert,
                    Err(ThresholdError::StoreError(e)) => return Err(AlertingError::StoreError(e)),
                    Err(_) => None,
                },
                Err(_) => None,
            };
            analyzed.push(AnalyzedReading { reading, analysis });
        }

        Ok(analyzed)
    }

    /// Direct broadcast from a monitoring source. Always escalation-eligible.
    #[instrument(skip(self, request), fields(patient_id = %request.patient_id, alert_type = %request.alert_type))]
    pub async fn critical_alert(&self, request: CriticalAlertRequest) -> Result<EscalationOutcome, AlertingError> {
        if request.patient_id.trim().is_empty() {
            return Err(AlertingError::ValidationError("patientId is required".to_string()));
        }

        let alert_type = AlertType::parse(&request.alert_type);
        let message = alert_message(alert_type, &request.data);
        info!("Critical alert received: {}", message);

        self.escalation
            .start(&request.patient_id, alert_type, &message, request.care_team)
            .await
    }
}

fn alert_message(alert_type: AlertType, data: &Value) -> String {
    if let Some(message) = data.get("message").and_then(Value::as_str) {
        return message.to_string();
    }

    let label = alert_type.as_str().replace('_', " ").to_uppercase();
    match data {
        Value::Null => label,
        Value::Object(fields) if fields.is_empty() => label,
        other => format!("{}: {}", label, other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_alert_message_prefers_explicit_text() {
        let data = json!({ "message": "Patient fell in bathroom" });
        assert_eq!(alert_message(AlertType::EmergencyResponse, &data), "Patient fell in bathroom");
    }

    #[test]
    fn test_alert_message_falls_back_to_label_and_data() {
        assert_eq!(alert_message(AlertType::Hypoglycemia, &Value::Null), "HYPOGLYCEMIA");
        assert_eq!(
            alert_message(AlertType::WoundDeterioration, &json!({ "stage": 3 })),
            "WOUND DETERIORATION: {\"stage\":3}"
        );
    }
}
