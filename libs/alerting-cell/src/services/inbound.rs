use std::collections::HashMap;
use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use audit_cell::{message_body_field, AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use care_team_cell::AlertType;
use messaging_cell::{MessageRequest, NotificationDispatcher};
use shared_database::ClinicalStore;
use shared_models::PatientContact;

use crate::error::AlertingError;
use crate::models::{InboundKeyword, InboundReply, RecordVitalRequest};
use crate::services::{EscalationCoordinator, VitalsService};

const UNREGISTERED_REPLY: &str =
    "We could not match this number to a patient record. Please contact your clinic directly.";
const GENERIC_REPLY: &str =
    "Reply TAKEN to confirm your medication, HELP for assistance, or text your glucose reading as a number.";

/// Handles SMS replies from patients and answers each one.
pub struct InboundMessageHandler {
    store: Arc<dyn ClinicalStore>,
    dispatcher: NotificationDispatcher,
    vitals: Arc<VitalsService>,
    escalation: EscalationCoordinator,
    audit: Arc<dyn AuditSink>,
    include_body_in_audit: bool,
}

impl InboundMessageHandler {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        dispatcher: NotificationDispatcher,
        vitals: Arc<VitalsService>,
        escalation: EscalationCoordinator,
        audit: Arc<dyn AuditSink>,
        include_body_in_audit: bool,
    ) -> Self {
        Self {
            store,
            dispatcher,
            vitals,
            escalation,
            audit,
            include_body_in_audit,
        }
    }

    #[instrument(skip(self, body))]
    pub async fn handle(&self, from: &str, body: &str, provider: &str) -> Result<InboundReply, AlertingError> {
        let keyword = InboundKeyword::parse(body);
        let patient = self.store.patient_by_phone(from).await?;
        let patient_id = patient.as_ref().map(|p| p.patient_id.clone());

        self.audit
            .record(
                AuditEntry::new(AuditEventType::InboundMessageReceived, "inbound sms received", AuditOutcome::Info)
                    .with_optional_patient(patient_id.as_deref())
                    .add_context("from", from)
                    .add_context("provider", provider)
                    .add_context("keyword", keyword)
                    .add_context("message", message_body_field(body, self.include_body_in_audit)),
            )
            .await;

        let reply = match (&keyword, &patient) {
            (InboundKeyword::Stop, _) => self.set_opt_out(from, patient_id.as_deref(), true).await?,
            (InboundKeyword::Start, _) => self.set_opt_out(from, patient_id.as_deref(), false).await?,
            (InboundKeyword::Help, _) => self
                .dispatcher
                .templates()
                .render("help", &HashMap::new())?,
            (_, None) => {
                warn!("Inbound message from unregistered number");
                UNREGISTERED_REPLY.to_string()
            }
            (InboundKeyword::MedicationTaken, Some(patient)) => self.confirm_medication(patient, body).await,
            (InboundKeyword::Emergency, Some(patient)) => self.raise_emergency(patient).await?,
            (InboundKeyword::GlucoseReading(value), Some(patient)) => self.record_glucose(patient, *value).await?,
            (InboundKeyword::Unrecognized, Some(_)) => GENERIC_REPLY.to_string(),
        };

        let request = MessageRequest::sms(from, reply.clone()).with_category("inbound_reply");
        let request = match &patient_id {
            Some(id) => request.with_patient(id),
            None => request,
        };

        let reply_sent = match self.dispatcher.deliver(request).await {
            Ok(response) => response.success,
            Err(e) => {
                error!("Reply to inbound message rejected: {}", e);
                false
            }
        };

        Ok(InboundReply {
            keyword,
            patient_id,
            reply,
            reply_sent,
        })
    }

    async fn set_opt_out(&self, phone: &str, patient_id: Option<&str>, opted_out: bool) -> Result<String, AlertingError> {
        self.store.set_sms_opt_out(phone, opted_out).await?;

        info!(opted_out, "SMS opt-out changed");
        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::SmsOptOutChanged,
                    if opted_out { "sms opt-out" } else { "sms opt-in" },
                    AuditOutcome::Success,
                )
                .with_optional_patient(patient_id)
                .add_context("phone", phone)
                .add_context("opted_out", opted_out),
            )
            .await;

        Ok(if opted_out {
            "You have been unsubscribed from reminder messages. Reply START to resubscribe.".to_string()
        } else {
            "You are subscribed to reminder messages again. Reply STOP to unsubscribe.".to_string()
        })
    }

    async fn confirm_medication(&self, patient: &PatientContact, body: &str) -> String {
        self.audit
            .record(
                AuditEntry::new(AuditEventType::MedicationConfirmed, "medication taken confirmed by sms", AuditOutcome::Success)
                    .with_actor(patient.patient_id.clone())
                    .with_patient(patient.patient_id.clone())
                    .add_context("reply", message_body_field(body, self.include_body_in_audit)),
            )
            .await;

        format!("Thank you, {}. Your medication has been recorded.", patient.name)
    }

    async fn raise_emergency(&self, patient: &PatientContact) -> Result<String, AlertingError> {
        let message = format!("{} reported an emergency by text message", patient.name);
        let outcome = self
            .escalation
            .start(&patient.patient_id, AlertType::EmergencyResponse, &message, None)
            .await?;

        error!(incident_id = %outcome.incident_id, "Patient-initiated emergency");
        Ok("Your care team has been alerted and will contact you shortly. If this is life-threatening, call 911 now."
            .to_string())
    }

    async fn record_glucose(&self, patient: &PatientContact, value: f64) -> Result<String, AlertingError> {
        let result = self
            .vitals
            .record_vital(RecordVitalRequest {
                patient_id: patient.patient_id.clone(),
                vital_type: "glucose".to_string(),
                value,
                unit: Some("mg/dL".to_string()),
                measured_at: None,
                device_id: None,
                source: Some("sms".to_string()),
            })
            .await?;

        Ok(match result.threshold_check.alert {
            Some(alert) => format!(
                "Glucose {} mg/dL recorded. This is outside your target range and your care team has been notified. {}",
                value, alert.message
            ),
            None => format!("Glucose {} mg/dL recorded. This is within your target range.", value),
        })
    }
}
