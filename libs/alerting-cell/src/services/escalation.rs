use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use care_team_cell::{AlertContext, AlertType, CareTeamRouter};
use messaging_cell::{MessageRequest, MessageType, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::ClinicalStore;
use shared_models::{CareTeamMember, EscalationRecord, Severity};
use shared_utils::{JobInfo, JobScheduler};

use crate::error::AlertingError;
use crate::models::{AcknowledgeOutcome, EscalationOutcome, TierNotification};

/// Tier 1 calls the on-call provider, tier 2 the patient's emergency contact.
const HIGHEST_TIER: u8 = 2;

pub fn tier_key(incident_id: &str, level: u8) -> String {
    format!("{}_level{}", incident_id, level)
}

/// Runs the three-tier escalation chain for critical incidents. Tier timers
/// live in the scheduler under the incident's group, so acknowledging an
/// incident cancels all of them at once.
#[derive(Clone)]
pub struct EscalationCoordinator {
    store: Arc<dyn ClinicalStore>,
    dispatcher: NotificationDispatcher,
    care_team: Arc<CareTeamRouter>,
    audit: Arc<dyn AuditSink>,
    scheduler: JobScheduler,
    delay_minutes: u64,
    max_level: u8,
    incident_locks: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

impl EscalationCoordinator {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        dispatcher: NotificationDispatcher,
        care_team: Arc<CareTeamRouter>,
        audit: Arc<dyn AuditSink>,
        config: &AppConfig,
    ) -> Self {
        let scheduler = dispatcher.scheduler().clone();
        Self {
            store,
            dispatcher,
            care_team,
            audit,
            scheduler,
            delay_minutes: config.escalation_delay_minutes,
            // The configured count includes the initial notification.
            max_level: config.escalation_max_levels.saturating_sub(1).min(HIGHEST_TIER),
            incident_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Serialises every read-modify-write of one incident's record. Tiers
    /// that come due together (after a restart) take turns.
    async fn lock_incident(&self, incident_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = match self.incident_locks.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            Arc::clone(locks.entry(incident_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }

    /// Drops the lock entry of an incident with nothing left to fire.
    fn release_incident(&self, incident_id: &str) {
        let mut locks = match self.incident_locks.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.remove(incident_id);
    }

    async fn patient_name(&self, patient_id: &str) -> String {
        match self.store.patient_contact(patient_id).await {
            Ok(Some(contact)) => contact.name,
            _ => format!("patient {}", patient_id),
        }
    }

    /// Opens an incident: notifies the first tier now and schedules the rest.
    /// `recipients` overrides the care-team policy when provided.
    #[instrument(skip(self, message, recipients), fields(alert_type = %alert_type))]
    pub async fn start(
        &self,
        patient_id: &str,
        alert_type: AlertType,
        message: &str,
        recipients: Option<Vec<CareTeamMember>>,
    ) -> Result<EscalationOutcome, AlertingError> {
        let now = self.scheduler.clock().now();
        let incident_id = format!("incident_{}", Uuid::new_v4());

        let record = EscalationRecord {
            incident_id: incident_id.clone(),
            patient_id: patient_id.to_string(),
            alert_type: alert_type.as_str().to_string(),
            message: message.to_string(),
            started_at: now,
            delay_minutes: self.delay_minutes,
            max_level: self.max_level,
            fired_levels: Vec::new(),
            acknowledged_at: None,
            acknowledged_by: None,
        };
        self.store.save_escalation(&record).await?;

        let recipients = match recipients {
            Some(explicit) => explicit,
            None => {
                self.care_team
                    .recipients_for(patient_id, &AlertContext::new(alert_type, now))
                    .await?
            }
        };

        let patient_name = self.patient_name(patient_id).await;
        let mut variables = HashMap::new();
        variables.insert("patientName".to_string(), patient_name);
        variables.insert("alertMessage".to_string(), message.to_string());

        let mut channels = vec![MessageType::Sms];
        if alert_type.requires_voice() {
            channels.push(MessageType::Voice);
        }

        let mut notifications = Vec::new();
        for member in &recipients {
            for channel in &channels {
                let request = MessageRequest::new(*channel, &member.phone_number, "")
                    .with_template("critical_alert", variables.clone())
                    .with_priority(Severity::Critical)
                    .with_patient(patient_id)
                    .with_provider(&member.id)
                    .with_category("critical_alert");

                let notification = match self.dispatcher.deliver(request).await {
                    Ok(response) => {
                        TierNotification::from_response(Some(member.id.clone()), &member.phone_number, *channel, response)
                    }
                    Err(e) => {
                        error!("Critical alert to {} rejected: {}", member.id, e);
                        TierNotification {
                            recipient_id: Some(member.id.clone()),
                            recipient: member.phone_number.clone(),
                            channel: *channel,
                            success: false,
                            provider: "none".to_string(),
                            error: Some(e.to_string()),
                        }
                    }
                };
                notifications.push(notification);
            }
        }

        if recipients.is_empty() {
            warn!(patient_id = %patient_id, "Critical incident opened with no first-tier recipients");
        }

        let mut scheduled_levels = Vec::new();
        for level in record.pending_levels() {
            if self.schedule_tier(&record, level) {
                scheduled_levels.push(level);
            }
        }

        error!(
            patient_id = %patient_id,
            incident_id = %incident_id,
            recipients = recipients.len(),
            "Critical incident opened"
        );
        self.audit
            .record(
                AuditEntry::new(AuditEventType::EscalationStarted, "critical incident opened", AuditOutcome::Success)
                    .with_patient(patient_id)
                    .with_resource("incident", incident_id.clone())
                    .add_context("alert_type", alert_type.as_str())
                    .add_context("recipients", recipients.iter().map(|m| m.id.clone()).collect::<Vec<_>>())
                    .add_context("delivered", notifications.iter().filter(|n| n.success).count())
                    .add_context("scheduled_levels", &scheduled_levels),
            )
            .await;

        Ok(EscalationOutcome {
            incident_id,
            notifications,
            scheduled_levels,
        })
    }

    /// Installs the timer for one tier. A tier already pending is left alone.
    fn schedule_tier(&self, record: &EscalationRecord, level: u8) -> bool {
        let key = tier_key(&record.incident_id, level);
        let coordinator = self.clone();
        let incident_id = record.incident_id.clone();

        let installed = self.scheduler.schedule_once_if_absent(
            &key,
            &record.incident_id,
            record.fire_time(level),
            async move {
                if let Err(e) = coordinator.fire_tier(&incident_id, level).await {
                    error!("Escalation tier {} for {} failed: {}", level, incident_id, e);
                }
            },
        );

        if installed {
            info!(key = %key, fire_at = %record.fire_time(level), "Escalation tier scheduled");
        }
        installed
    }

    /// Tier callback. Re-reads the stored record so an acknowledgment made
    /// elsewhere stops the chain.
    #[instrument(skip(self))]
    pub async fn fire_tier(&self, incident_id: &str, level: u8) -> Result<(), AlertingError> {
        let _guard = self.lock_incident(incident_id).await;
        let Some(mut record) = self.store.escalation(incident_id).await? else {
            warn!("Escalation record {} disappeared, tier {} skipped", incident_id, level);
            return Ok(());
        };
        if record.is_acknowledged() {
            info!("Incident {} acknowledged, tier {} skipped", incident_id, level);
            return Ok(());
        }
        if record.fired_levels.contains(&level) {
            return Ok(());
        }

        let patient_name = self.patient_name(&record.patient_id).await;
        let mut variables = HashMap::new();
        variables.insert("patientName".to_string(), patient_name);
        variables.insert("alertMessage".to_string(), record.message.clone());

        let target = match level {
            1 => self
                .care_team
                .on_call_provider(&record.patient_id)
                .await?
                .map(|member| (Some(member.id), member.phone_number, "escalation_on_call")),
            _ => self
                .store
                .patient_contact(&record.patient_id)
                .await?
                .and_then(|contact| contact.emergency_contact_phone)
                .map(|phone| (None, phone, "escalation_emergency_contact")),
        };

        let delivered = match target {
            Some((recipient_id, phone, template)) => {
                let request = MessageRequest::voice(&phone, "")
                    .with_template(template, variables)
                    .with_priority(Severity::Critical)
                    .with_patient(&record.patient_id)
                    .with_category("escalation");
                let request = match recipient_id {
                    Some(id) => request.with_provider(id),
                    None => request,
                };

                match self.dispatcher.deliver(request).await {
                    Ok(response) => response.success,
                    Err(e) => {
                        error!("Escalation tier {} request rejected: {}", level, e);
                        false
                    }
                }
            }
            None => {
                error!(
                    incident_id = %incident_id,
                    level,
                    "No escalation target available for this tier"
                );
                false
            }
        };

        record.fired_levels.push(level);
        self.store.save_escalation(&record).await?;
        if record.pending_levels().is_empty() {
            self.release_incident(incident_id);
        }

        warn!(incident_id = %incident_id, level, delivered, "Escalation tier fired");
        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::EscalationTierFired,
                    format!("escalation tier {} fired", level),
                    if delivered { AuditOutcome::Success } else { AuditOutcome::Failure },
                )
                .with_patient(record.patient_id.clone())
                .with_resource("incident", incident_id)
                .add_context("level", level)
                .add_context("delivered", delivered),
            )
            .await;

        Ok(())
    }

    /// Stops an incident: cancels every pending timer in its group (tier and
    /// request-rule timers) and marks the record. Repeating it is harmless.
    #[instrument(skip(self))]
    pub async fn acknowledge(&self, incident_id: &str, acknowledged_by: &str) -> Result<AcknowledgeOutcome, AlertingError> {
        let cancelled_timers = self.scheduler.cancel_group(incident_id);
        let _guard = self.lock_incident(incident_id).await;
        let record = self.store.escalation(incident_id).await?;

        let Some(mut record) = record else {
            self.release_incident(incident_id);
            if cancelled_timers == 0 {
                return Err(AlertingError::NotFound(format!("Incident {}", incident_id)));
            }
            info!(incident_id = %incident_id, cancelled_timers, "Cancelled request-rule timers");
            return Ok(AcknowledgeOutcome {
                incident_id: incident_id.to_string(),
                cancelled_timers,
                already_acknowledged: false,
            });
        };

        if record.is_acknowledged() {
            self.release_incident(incident_id);
            return Ok(AcknowledgeOutcome {
                incident_id: incident_id.to_string(),
                cancelled_timers,
                already_acknowledged: true,
            });
        }

        record.acknowledged_at = Some(self.scheduler.clock().now());
        record.acknowledged_by = Some(acknowledged_by.to_string());
        self.store.save_escalation(&record).await?;
        self.release_incident(incident_id);

        info!(incident_id = %incident_id, cancelled_timers, "Incident acknowledged");
        self.audit
            .record(
                AuditEntry::new(AuditEventType::EscalationAcknowledged, "incident acknowledged", AuditOutcome::Success)
                    .with_actor(acknowledged_by)
                    .with_patient(record.patient_id.clone())
                    .with_resource("incident", incident_id)
                    .add_context("cancelled_timers", cancelled_timers)
                    .add_context("fired_levels", &record.fired_levels),
            )
            .await;

        Ok(AcknowledgeOutcome {
            incident_id: incident_id.to_string(),
            cancelled_timers,
            already_acknowledged: false,
        })
    }

    /// Reinstalls the remaining tiers of every open incident. Tiers already
    /// due fire immediately. Returns the number of timers installed.
    pub async fn restore_pending(&self) -> Result<usize, AlertingError> {
        let records = self.store.pending_escalations().await?;
        let mut installed = 0;

        for record in &records {
            for level in record.pending_levels() {
                if self.schedule_tier(record, level) {
                    installed += 1;
                }
            }
        }

        info!("Restored {} escalation timers across {} incidents", installed, records.len());
        Ok(installed)
    }

    pub fn pending_timers(&self, incident_id: &str) -> Vec<JobInfo> {
        self.scheduler.jobs_in_group(incident_id)
    }
}
