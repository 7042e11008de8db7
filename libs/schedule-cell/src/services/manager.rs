use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use messaging_cell::{MessageRequest, NotificationDispatcher};
use shared_config::AppConfig;
use shared_database::ClinicalStore;
use shared_models::{
    Appointment, CareTeamUpdates, DigestFrequency, GlucoseCheck, Medication, PatientSchedule, QuietHours,
    ScheduledMessage, ScheduledMessageStatus, ScheduledMessageType,
};
use shared_utils::{Clock, JobInfo, JobScheduler};

use crate::error::ScheduleError;
use crate::services::timing::{local_time, next_occurrence, parse_time, parse_timezone, QuietWindow, Recurrence};

/// Reminder lead times for appointments.
const APPOINTMENT_LEADS: [(&str, i64); 2] = [("24h", 24), ("2h", 2)];

const RETRY_SUFFIX: &str = "_retry";

fn retry_group(patient_id: &str) -> String {
    format!("{}:retries", patient_id)
}

fn slug(value: &str) -> String {
    value
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect()
}

fn message_type_label(message_type: ScheduledMessageType) -> &'static str {
    match message_type {
        ScheduledMessageType::MedicationReminder => "medication_reminder",
        ScheduledMessageType::GlucoseCheck => "glucose_check",
        ScheduledMessageType::AppointmentReminder => "appointment_reminder",
        ScheduledMessageType::CareTeamUpdate => "care_team_update",
    }
}

#[derive(Debug, Clone)]
enum Reminder {
    Medication(Medication),
    Glucose(GlucoseCheck),
    Appointment(Appointment),
    Digest(CareTeamUpdates),
}

impl Reminder {
    fn message_type(&self) -> ScheduledMessageType {
        match self {
            Reminder::Medication(_) => ScheduledMessageType::MedicationReminder,
            Reminder::Glucose(_) => ScheduledMessageType::GlucoseCheck,
            Reminder::Appointment(_) => ScheduledMessageType::AppointmentReminder,
            Reminder::Digest(_) => ScheduledMessageType::CareTeamUpdate,
        }
    }
}

/// Everything a firing job needs, resolved once at install time.
#[derive(Debug)]
struct JobPlan {
    key: String,
    patient_id: String,
    phone: String,
    timezone: Tz,
    quiet_hours: Option<QuietWindow>,
    reminder: Reminder,
    /// `None` for one-shot jobs.
    recurrence: Option<(NaiveTime, Recurrence)>,
    fire_at: Option<DateTime<Utc>>,
}

impl JobPlan {
    fn recipients(&self) -> Vec<String> {
        match &self.reminder {
            Reminder::Digest(updates) if !updates.recipients.is_empty() => updates.recipients.clone(),
            _ => vec![self.phone.clone()],
        }
    }

    fn suppressed_at(&self, nominal: DateTime<Utc>) -> bool {
        self.quiet_hours
            .map(|window| window.contains(local_time(self.timezone, nominal)))
            .unwrap_or(false)
    }
}

/// Owns every patient's recurring reminder jobs and the retry of failed
/// scheduled sends. Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct ScheduleManager {
    store: Arc<dyn ClinicalStore>,
    dispatcher: NotificationDispatcher,
    audit: Arc<dyn AuditSink>,
    scheduler: JobScheduler,
    clock: Arc<dyn Clock>,
    max_retries: u32,
    retry_delay: Duration,
    default_quiet_hours: QuietHours,
}

impl ScheduleManager {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        dispatcher: NotificationDispatcher,
        audit: Arc<dyn AuditSink>,
        config: &AppConfig,
    ) -> Self {
        let scheduler = dispatcher.scheduler().clone();
        let clock = scheduler.clock();
        Self {
            store,
            dispatcher,
            audit,
            scheduler,
            clock,
            max_retries: config.schedule_max_retries.max(1),
            retry_delay: Duration::seconds(config.schedule_retry_delay_seconds as i64),
            default_quiet_hours: QuietHours {
                start: config.default_quiet_hours_start.clone(),
                end: config.default_quiet_hours_end.clone(),
            },
        }
    }

    /// Replaces the patient's jobs with those derived from `schedule` and
    /// stores it as active. Returns the installed job keys.
    #[instrument(skip(self, schedule), fields(patient_id = %schedule.patient_id))]
    pub async fn install_schedule(&self, mut schedule: PatientSchedule) -> Result<Vec<String>, ScheduleError> {
        let plans = self.plan(&schedule)?;

        schedule.active = true;
        self.store.save_schedule(&schedule).await?;
        let cancelled = self.scheduler.cancel_group(&schedule.patient_id);
        let keys = self.install_jobs(plans);

        info!(
            jobs = keys.len(),
            replaced = cancelled,
            "Schedule installed"
        );

        self.audit
            .record(
                AuditEntry::new(AuditEventType::ScheduleInstalled, "Schedule installed", AuditOutcome::Success)
                    .with_patient(&schedule.patient_id)
                    .with_resource("patient_schedule", &schedule.patient_id)
                    .add_context("jobs", &keys)
                    .add_context("replaced_jobs", cancelled),
            )
            .await;

        Ok(keys)
    }

    pub async fn update_schedule(&self, patient_id: &str, schedule: PatientSchedule) -> Result<Vec<String>, ScheduleError> {
        if schedule.patient_id != patient_id {
            return Err(ScheduleError::ValidationError(format!(
                "Schedule belongs to {}, not {}",
                schedule.patient_id, patient_id
            )));
        }
        self.install_schedule(schedule).await
    }

    /// Cancels every job of the patient, pending retries included. Safe when
    /// nothing is installed.
    pub async fn cancel_schedule(&self, patient_id: &str) -> usize {
        let cancelled = self.scheduler.cancel_group(patient_id) + self.cancel_retries(patient_id).await;
        info!(patient_id = %patient_id, cancelled, "Schedule jobs cancelled");
        cancelled
    }

    #[instrument(skip(self))]
    pub async fn pause(&self, patient_id: &str) -> Result<usize, ScheduleError> {
        let cancelled = self.scheduler.cancel_group(patient_id) + self.cancel_retries(patient_id).await;
        if !self.store.set_schedule_active(patient_id, false).await? {
            return Err(ScheduleError::NotFound(patient_id.to_string()));
        }

        info!(cancelled, "Schedule paused");
        self.audit
            .record(
                AuditEntry::new(AuditEventType::SchedulePaused, "Schedule paused", AuditOutcome::Success)
                    .with_patient(patient_id)
                    .with_resource("patient_schedule", patient_id)
                    .add_context("cancelled_jobs", cancelled),
            )
            .await;

        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn resume(&self, patient_id: &str) -> Result<Vec<String>, ScheduleError> {
        let mut schedule = self
            .store
            .schedule(patient_id)
            .await?
            .ok_or_else(|| ScheduleError::NotFound(patient_id.to_string()))?;
        let plans = self.plan(&schedule)?;

        schedule.active = true;
        self.store.save_schedule(&schedule).await?;
        self.scheduler.cancel_group(patient_id);
        let keys = self.install_jobs(plans);

        info!(jobs = keys.len(), "Schedule resumed");
        self.audit
            .record(
                AuditEntry::new(AuditEventType::ScheduleResumed, "Schedule resumed", AuditOutcome::Success)
                    .with_patient(patient_id)
                    .with_resource("patient_schedule", patient_id)
                    .add_context("jobs", &keys),
            )
            .await;

        Ok(keys)
    }

    /// Reinstalls every stored active schedule. A schedule that no longer
    /// validates is logged and skipped. Returns how many were restored.
    pub async fn restore_active_schedules(&self) -> Result<usize, ScheduleError> {
        let schedules = self.store.active_schedules().await?;
        let mut restored = 0;

        for schedule in schedules {
            match self.plan(&schedule) {
                Ok(plans) => {
                    self.scheduler.cancel_group(&schedule.patient_id);
                    let keys = self.install_jobs(plans);
                    debug!(patient_id = %schedule.patient_id, jobs = keys.len(), "Schedule restored");
                    restored += 1;
                }
                Err(e) => {
                    error!(patient_id = %schedule.patient_id, "Stored schedule could not be restored: {}", e);
                }
            }
        }

        info!(restored, "Active schedules restored");
        Ok(restored)
    }

    /// Reminder jobs followed by pending retries.
    pub fn jobs(&self, patient_id: &str) -> Vec<JobInfo> {
        let mut jobs = self.scheduler.jobs_in_group(patient_id);
        jobs.extend(self.scheduler.jobs_in_group(&retry_group(patient_id)));
        jobs
    }

    /// Drops the patient's pending retries and settles each message as
    /// cancelled. Returns how many retries were pending.
    async fn cancel_retries(&self, patient_id: &str) -> usize {
        let group = retry_group(patient_id);
        let pending = self.scheduler.jobs_in_group(&group);
        self.scheduler.cancel_group(&group);

        for job in &pending {
            let Some(message_id) = job.key.strip_suffix(RETRY_SUFFIX) else {
                continue;
            };
            let mut message = match self.store.scheduled_message(message_id).await {
                Ok(Some(message)) if !message.status.is_terminal() => message,
                Ok(_) => continue,
                Err(e) => {
                    error!(message_id = %message_id, "Could not load scheduled message to cancel: {}", e);
                    continue;
                }
            };

            message.status = ScheduledMessageStatus::Cancelled;
            self.persist(&message).await;
            info!(message_id = %message_id, "Pending retry cancelled");
            self.audit
                .record(
                    AuditEntry::new(
                        AuditEventType::ScheduledMessageCancelled,
                        "Scheduled message cancelled",
                        AuditOutcome::Info,
                    )
                    .with_patient(&message.patient_id)
                    .with_resource("scheduled_message", &message.id)
                    .add_context("type", message.message_type)
                    .add_context("retry_count", message.retry_count),
                )
                .await;
        }

        pending.len()
    }

    /// Validates the schedule and resolves one plan per job. Appointment
    /// reminders already in the past are left out.
    fn plan(&self, schedule: &PatientSchedule) -> Result<Vec<JobPlan>, ScheduleError> {
        let patient_id = schedule.patient_id.trim();
        if patient_id.is_empty() {
            return Err(ScheduleError::ValidationError("Patient id is required".to_string()));
        }
        if schedule.phone.trim().is_empty() {
            return Err(ScheduleError::ValidationError("Phone is required".to_string()));
        }

        let timezone = parse_timezone(&schedule.timezone)?;
        let quiet = schedule.quiet_hours.as_ref().unwrap_or(&self.default_quiet_hours);
        let quiet_hours = Some(QuietWindow {
            start: parse_time(&quiet.start)?,
            end: parse_time(&quiet.end)?,
        });
        let preferences = &schedule.preferences;
        let now = self.clock.now();

        let base = |key: String, reminder: Reminder| JobPlan {
            key,
            patient_id: patient_id.to_string(),
            phone: schedule.phone.clone(),
            timezone,
            quiet_hours,
            reminder,
            recurrence: None,
            fire_at: None,
        };

        let mut plans = Vec::new();

        if preferences.medication_reminders {
            for medication in &schedule.medications {
                for time in &medication.times {
                    let at = parse_time(time)?;
                    let mut plan = base(
                        format!("med_{}_{}_{}", patient_id, slug(&medication.name), time.trim()),
                        Reminder::Medication(medication.clone()),
                    );
                    plan.recurrence = Some((at, Recurrence::Daily));
                    plans.push(plan);
                }
            }
        }

        if preferences.glucose_reminders {
            for check in &schedule.glucose_checks {
                let at = parse_time(&check.time)?;
                let mut plan = base(
                    format!("glucose_{}_{}", patient_id, check.time.trim()),
                    Reminder::Glucose(check.clone()),
                );
                plan.recurrence = Some((at, Recurrence::Daily));
                plans.push(plan);
            }
        }

        if preferences.appointment_reminders {
            for appointment in &schedule.appointments {
                for (label, hours) in APPOINTMENT_LEADS {
                    let fire_at = appointment.scheduled_at - Duration::hours(hours);
                    if fire_at <= now {
                        debug!(appointment_id = %appointment.id, lead = label, "Reminder time already passed, skipping");
                        continue;
                    }
                    let mut plan = base(
                        format!("appt_{}_{}_{}", patient_id, slug(&appointment.id), label),
                        Reminder::Appointment(appointment.clone()),
                    );
                    plan.fire_at = Some(fire_at);
                    plans.push(plan);
                }
            }
        }

        if preferences.care_team_updates {
            if let Some(updates) = &schedule.care_team_updates {
                let at = parse_time(&updates.time)?;
                let recurrence = match updates.frequency {
                    DigestFrequency::Daily => Recurrence::Daily,
                    DigestFrequency::Weekly => Recurrence::Weekly(updates.day_of_week.unwrap_or(Weekday::Mon)),
                    DigestFrequency::Monthly => {
                        let day = updates.day_of_month.unwrap_or(1);
                        if !(1..=31).contains(&day) {
                            return Err(ScheduleError::ValidationError(format!(
                                "Day of month must be 1-31, got {}",
                                day
                            )));
                        }
                        Recurrence::Monthly(day)
                    }
                };
                let frequency = match updates.frequency {
                    DigestFrequency::Daily => "daily",
                    DigestFrequency::Weekly => "weekly",
                    DigestFrequency::Monthly => "monthly",
                };
                let mut plan = base(
                    format!("careteam_{}_{}", patient_id, frequency),
                    Reminder::Digest(updates.clone()),
                );
                plan.recurrence = Some((at, recurrence));
                plans.push(plan);
            }
        }

        Ok(plans)
    }

    fn install_jobs(&self, plans: Vec<JobPlan>) -> Vec<String> {
        let mut keys = Vec::with_capacity(plans.len());

        for plan in plans {
            let plan = Arc::new(plan);
            let key = plan.key.clone();
            let group = plan.patient_id.clone();

            match (plan.recurrence, plan.fire_at) {
                (Some((time, recurrence)), _) => {
                    let timezone = plan.timezone;
                    let manager = self.clone();
                    self.scheduler.schedule_recurring(
                        &key,
                        &group,
                        move |now| next_occurrence(timezone, time, recurrence, now),
                        move |nominal| {
                            let manager = manager.clone();
                            let plan = Arc::clone(&plan);
                            async move { manager.fire(plan, nominal).await }
                        },
                    );
                }
                (None, Some(fire_at)) => {
                    let manager = self.clone();
                    self.scheduler
                        .schedule_once(&key, &group, fire_at, async move { manager.fire(plan, fire_at).await });
                }
                (None, None) => continue,
            }
            keys.push(key);
        }

        keys
    }

    async fn fire(&self, plan: Arc<JobPlan>, nominal: DateTime<Utc>) {
        if plan.suppressed_at(nominal) {
            debug!(key = %plan.key, "Inside quiet hours, reminder suppressed");
            return;
        }

        let text = match self.compose(&plan, nominal).await {
            Ok(text) => text,
            Err(e) => {
                error!(key = %plan.key, "Could not build scheduled message: {}", e);
                return;
            }
        };

        for phone in plan.recipients() {
            match self.store.is_sms_opted_out(&phone).await {
                Ok(true) => {
                    info!(key = %plan.key, "Recipient opted out of SMS, reminder skipped");
                    continue;
                }
                Ok(false) => {}
                Err(e) => warn!(key = %plan.key, "Opt-out lookup failed, sending anyway: {}", e),
            }

            let message = ScheduledMessage {
                id: format!("sched_{}", Uuid::new_v4()),
                patient_id: plan.patient_id.clone(),
                message_type: plan.reminder.message_type(),
                message: text.clone(),
                scheduled_time: nominal,
                phone,
                status: ScheduledMessageStatus::Pending,
                retry_count: 0,
                max_retries: self.max_retries,
                metadata: json!({ "jobKey": plan.key }),
            };
            self.persist(&message).await;
            self.attempt_delivery(message).await;
        }
    }

    async fn compose(&self, plan: &JobPlan, nominal: DateTime<Utc>) -> Result<String, ScheduleError> {
        let patient_name = match self.store.patient_contact(&plan.patient_id).await? {
            Some(contact) => contact.name,
            None => "there".to_string(),
        };

        let mut vars: HashMap<String, String> = HashMap::new();
        vars.insert("patientName".to_string(), patient_name);

        match &plan.reminder {
            Reminder::Medication(medication) => {
                vars.insert("medicationName".to_string(), medication.name.clone());
                vars.insert("dosage".to_string(), medication.dosage.clone());
                vars.insert(
                    "instructions".to_string(),
                    medication.instructions.clone().unwrap_or_default(),
                );
            }
            Reminder::Glucose(check) => {
                vars.insert(
                    "label".to_string(),
                    check.label.clone().unwrap_or_else(|| "scheduled".to_string()),
                );
            }
            Reminder::Appointment(appointment) => {
                let local = appointment.scheduled_at.with_timezone(&plan.timezone);
                vars.insert("providerName".to_string(), appointment.provider_name.clone());
                vars.insert(
                    "appointmentTime".to_string(),
                    local.format("%a %b %-d, %-I:%M %p").to_string(),
                );
                vars.insert(
                    "location".to_string(),
                    appointment.location.clone().unwrap_or_else(|| "see your appointment details".to_string()),
                );
            }
            Reminder::Digest(updates) => {
                let (label, days) = match updates.frequency {
                    DigestFrequency::Daily => ("Daily", 1),
                    DigestFrequency::Weekly => ("Weekly", 7),
                    DigestFrequency::Monthly => ("Monthly", 30),
                };
                vars.insert("frequency".to_string(), label.to_string());
                vars.insert(
                    "summary".to_string(),
                    self.digest_summary(&plan.patient_id, nominal - Duration::days(days)).await?,
                );
            }
        }

        let text = self
            .dispatcher
            .templates()
            .render(message_type_label(plan.reminder.message_type()), &vars)?;
        Ok(text.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    async fn digest_summary(&self, patient_id: &str, since: DateTime<Utc>) -> Result<String, ScheduleError> {
        let readings: Vec<_> = self
            .store
            .recent_vitals(patient_id, 200)
            .await?
            .into_iter()
            .filter(|r| r.measured_at >= since)
            .collect();

        Ok(match readings.iter().max_by_key(|r| r.measured_at) {
            None => "no readings logged this period.".to_string(),
            Some(latest) => format!(
                "{} readings logged this period, latest {} {} {}.",
                readings.len(),
                latest.vital_type.replace('_', " "),
                latest.value,
                latest.unit
            ),
        })
    }

    async fn persist(&self, message: &ScheduledMessage) {
        if let Err(e) = self.store.save_scheduled_message(message).await {
            error!(message_id = %message.id, "Failed to store scheduled message: {}", e);
        }
    }

    /// One send attempt. Provider failures are retried after the fixed delay
    /// until `max_retries` is reached; malformed requests fail immediately.
    #[instrument(skip(self, message), fields(message_id = %message.id, attempt = message.retry_count + 1))]
    async fn attempt_delivery(&self, mut message: ScheduledMessage) {
        let request = MessageRequest::sms(&message.phone, &message.message)
            .with_patient(&message.patient_id)
            .with_category(message_type_label(message.message_type));

        let failure = match self.dispatcher.deliver(request).await {
            Ok(response) if response.success => None,
            Ok(response) => Some((
                response.error.unwrap_or_else(|| "Delivery failed".to_string()),
                response.retryable.unwrap_or(true),
            )),
            Err(e) => Some((e.to_string(), false)),
        };

        let Some((reason, retryable)) = failure else {
            message.status = ScheduledMessageStatus::Sent;
            self.persist(&message).await;
            info!("Scheduled message sent");
            self.audit
                .record(
                    AuditEntry::new(
                        AuditEventType::ScheduledMessageSent,
                        "Scheduled message sent",
                        AuditOutcome::Success,
                    )
                    .with_patient(&message.patient_id)
                    .with_resource("scheduled_message", &message.id)
                    .add_context("type", message.message_type)
                    .add_context("retry_count", message.retry_count),
                )
                .await;
            return;
        };

        message.retry_count = (message.retry_count + 1).min(message.max_retries);
        if retryable && message.retry_count < message.max_retries {
            warn!(
                retry_count = message.retry_count,
                max_retries = message.max_retries,
                "Scheduled send failed, retrying: {}",
                reason
            );
            self.persist(&message).await;
            self.schedule_retry(&message);
            return;
        }

        message.status = ScheduledMessageStatus::Failed;
        self.persist(&message).await;
        error!(
            patient_id = %message.patient_id,
            retry_count = message.retry_count,
            "Scheduled message failed permanently: {}",
            reason
        );
        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::ScheduledMessageFailed,
                    "Scheduled message failed",
                    AuditOutcome::Failure,
                )
                .with_patient(&message.patient_id)
                .with_resource("scheduled_message", &message.id)
                .add_context("type", message.message_type)
                .add_context("retry_count", message.retry_count)
                .add_context("error", &reason),
            )
            .await;
    }

    /// Retries live in their own group, so replacing the schedule leaves
    /// them running.
    fn schedule_retry(&self, message: &ScheduledMessage) {
        let key = format!("{}{}", message.id, RETRY_SUFFIX);
        let fire_at = self.clock.now() + self.retry_delay;
        let message_id = message.id.clone();
        let manager = self.clone();

        self.scheduler
            .schedule_once(&key, &retry_group(&message.patient_id), fire_at, async move {
                manager.retry(&message_id).await
            });
    }

    async fn retry(&self, message_id: &str) {
        match self.store.scheduled_message(message_id).await {
            Ok(Some(message)) if !message.status.is_terminal() => self.attempt_delivery(message).await,
            Ok(Some(_)) => debug!(message_id = %message_id, "Message already settled, retry dropped"),
            Ok(None) => warn!(message_id = %message_id, "Scheduled message vanished before retry"),
            Err(e) => error!(message_id = %message_id, "Could not load scheduled message for retry: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slug_keeps_keys_shell_safe() {
        assert_eq!(slug("Metformin XR"), "metformin-xr");
        assert_eq!(slug(" Insulin/Glargine "), "insulin-glargine");
    }

    #[test]
    fn test_digest_goes_to_listed_recipients() {
        let plan = JobPlan {
            key: "careteam_p1_weekly".to_string(),
            patient_id: "p1".to_string(),
            phone: "+15551230001".to_string(),
            timezone: Tz::UTC,
            quiet_hours: None,
            reminder: Reminder::Digest(CareTeamUpdates {
                frequency: DigestFrequency::Weekly,
                time: "09:00".to_string(),
                day_of_week: None,
                day_of_month: None,
                recipients: vec!["+15557770001".to_string(), "+15557770002".to_string()],
            }),
            recurrence: None,
            fire_at: None,
        };

        assert_eq!(plan.recipients(), vec!["+15557770001", "+15557770002"]);
    }
}
