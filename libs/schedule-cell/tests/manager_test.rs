mod common;

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::Duration as ChronoDuration;

use audit_cell::AuditEventType;
use messaging_cell::testing::{ScriptedGateway, ScriptedOutcome};
use schedule_cell::ScheduleError;
use shared_database::ClinicalStore;
use shared_models::{
    Appointment, CareTeamUpdates, DigestFrequency, GlucoseCheck, QuietHours, ScheduledMessageStatus,
    ScheduledMessageType, VitalReading,
};
use shared_utils::Clock;

use common::{
    harness, harness_with, medication_schedule, schedule_for, settle, OTHER_PATIENT_ID, OTHER_PATIENT_PHONE,
    PATIENT_ID, PATIENT_PHONE,
};

const MINUTE: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn test_each_dose_time_gets_its_own_job() {
    let h = harness().await;

    let keys = h
        .manager
        .install_schedule(medication_schedule(&["08:00", "20:00"]))
        .await
        .unwrap();

    assert_eq!(
        keys,
        vec!["med_patient-1_metformin_08:00", "med_patient-1_metformin_20:00"]
    );
    let jobs = h.manager.jobs(PATIENT_ID);
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.recurring));
    assert_eq!(
        jobs[1].next_fire_at,
        Some(common::wednesday_afternoon() + ChronoDuration::hours(6))
    );
    assert!(h.store.schedule(PATIENT_ID).await.unwrap().unwrap().active);
    assert_eq!(h.audit.entries_of_type(AuditEventType::ScheduleInstalled).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_removes_only_that_patients_jobs() {
    let h = harness().await;
    h.manager
        .install_schedule(medication_schedule(&["08:00", "20:00"]))
        .await
        .unwrap();
    let mut other = schedule_for(OTHER_PATIENT_ID, OTHER_PATIENT_PHONE);
    other.medications = vec![common::metformin(&["09:00"])];
    h.manager.install_schedule(other).await.unwrap();

    assert_eq!(h.manager.cancel_schedule(PATIENT_ID).await, 2);

    assert!(h.manager.jobs(PATIENT_ID).is_empty());
    assert_eq!(h.manager.jobs(OTHER_PATIENT_ID).len(), 1);
    assert_eq!(h.manager.cancel_schedule(PATIENT_ID).await, 0);
}

#[tokio::test(start_paused = true)]
async fn test_reinstall_replaces_previous_jobs() {
    let h = harness().await;
    h.manager
        .install_schedule(medication_schedule(&["08:00", "20:00"]))
        .await
        .unwrap();

    let keys = h.manager.install_schedule(medication_schedule(&["12:00"])).await.unwrap();

    assert_eq!(keys, vec!["med_patient-1_metformin_12:00"]);
    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_medication_reminder_fires_at_its_local_time() {
    let h = harness().await;
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(59 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 0);

    tokio::time::sleep(2 * MINUTE).await;
    settle().await;

    let sent = h.gateway.attempts_to(PATIENT_PHONE);
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        "Hi Test Patient, it's time to take your Metformin (500 mg). Take with food. Reply TAKEN when done."
    );

    let messages = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].message_type, ScheduledMessageType::MedicationReminder);
    assert_eq!(messages[0].status, ScheduledMessageStatus::Sent);
    assert_eq!(messages[0].retry_count, 0);
    assert_eq!(messages[0].metadata["jobKey"], "med_patient-1_metformin_15:00");

    // Still installed for tomorrow.
    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_two_failures_then_success_ends_sent() {
    let gateway = ScriptedGateway::accepting("primary")
        .then(ScriptedOutcome::Fail("carrier timeout".to_string()))
        .then(ScriptedOutcome::Fail("carrier timeout".to_string()));
    let h = harness_with(gateway).await;
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;
    let first = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(first[0].status, ScheduledMessageStatus::Pending);
    assert_eq!(first[0].retry_count, 1);

    tokio::time::sleep(5 * MINUTE).await;
    settle().await;
    tokio::time::sleep(5 * MINUTE).await;
    settle().await;

    let messages = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, ScheduledMessageStatus::Sent);
    assert_eq!(messages[0].retry_count, 2);
    assert_eq!(messages[0].max_retries, 3);
    assert_eq!(h.gateway.attempt_count(), 3);

    // Only the daily medication job is left; no retry is pending.
    let jobs = h.manager.jobs(PATIENT_ID);
    assert_eq!(jobs.len(), 1);
    assert!(jobs[0].recurring);

    tokio::time::sleep(30 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 3);
    assert_eq!(h.audit.entries_of_type(AuditEventType::ScheduledMessageSent).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_retries_mark_message_failed() {
    let h = harness_with(ScriptedGateway::failing("primary")).await;
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;
    for _ in 0..2 {
        tokio::time::sleep(5 * MINUTE).await;
        settle().await;
    }

    let messages = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(messages[0].status, ScheduledMessageStatus::Failed);
    assert_eq!(messages[0].retry_count, 3);
    assert_eq!(h.gateway.attempt_count(), 3);

    let failures = h.audit.entries_of_type(AuditEventType::ScheduledMessageFailed).await;
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].patient_id.as_deref(), Some(PATIENT_ID));

    tokio::time::sleep(30 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_schedule_update_keeps_pending_retry() {
    let gateway =
        ScriptedGateway::accepting("primary").then(ScriptedOutcome::Fail("carrier timeout".to_string()));
    let h = harness_with(gateway).await;
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;
    assert_eq!(
        h.store.scheduled_messages_for(PATIENT_ID).await[0].status,
        ScheduledMessageStatus::Pending
    );

    h.manager.install_schedule(medication_schedule(&["18:00"])).await.unwrap();
    let keys: Vec<_> = h.manager.jobs(PATIENT_ID).into_iter().map(|j| j.key).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], "med_patient-1_metformin_18:00");
    assert!(keys[1].ends_with("_retry"));

    tokio::time::sleep(5 * MINUTE).await;
    settle().await;

    let messages = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].status, ScheduledMessageStatus::Sent);
    assert_eq!(messages[0].retry_count, 1);
    assert_eq!(h.gateway.attempt_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_pause_cancels_pending_retry() {
    let h = harness_with(ScriptedGateway::failing("primary")).await;
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 1);

    assert_eq!(h.manager.pause(PATIENT_ID).await.unwrap(), 2);
    assert!(h.manager.jobs(PATIENT_ID).is_empty());

    let messages = h.store.scheduled_messages_for(PATIENT_ID).await;
    assert_eq!(messages[0].status, ScheduledMessageStatus::Cancelled);
    assert_eq!(messages[0].retry_count, 1);

    let cancelled = h.audit.entries_of_type(AuditEventType::ScheduledMessageCancelled).await;
    assert_eq!(cancelled.len(), 1);
    assert_eq!(cancelled[0].patient_id.as_deref(), Some(PATIENT_ID));

    tokio::time::sleep(30 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_hours_suppress_without_failure() {
    let h = harness().await;
    let mut schedule = medication_schedule(&["15:00"]);
    schedule.quiet_hours = Some(QuietHours {
        start: "14:30".to_string(),
        end: "16:00".to_string(),
    });
    h.manager.install_schedule(schedule).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;

    assert_eq!(h.gateway.attempt_count(), 0);
    assert!(h.store.scheduled_messages_for(PATIENT_ID).await.is_empty());
    assert!(h.audit.entries_of_type(AuditEventType::ScheduledMessageFailed).await.is_empty());
    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_default_quiet_hours_apply_when_schedule_has_none() {
    let h = harness().await;
    // 23:00 UTC falls inside the default 22:00-07:00 window.
    h.manager.install_schedule(medication_schedule(&["23:00"])).await.unwrap();

    tokio::time::sleep(10 * 60 * MINUTE).await;
    settle().await;

    assert_eq!(h.gateway.attempt_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_opted_out_phone_is_skipped() {
    let h = harness().await;
    h.store.set_sms_opt_out(PATIENT_PHONE, true).await.unwrap();
    h.manager.install_schedule(medication_schedule(&["15:00"])).await.unwrap();

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;

    assert_eq!(h.gateway.attempt_count(), 0);
    assert!(h.store.scheduled_messages_for(PATIENT_ID).await.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_preferences_gate_job_types() {
    let h = harness().await;
    let mut schedule = medication_schedule(&["08:00"]);
    schedule.glucose_checks = vec![GlucoseCheck {
        time: "07:30".to_string(),
        label: Some("fasting".to_string()),
    }];
    schedule.preferences.medication_reminders = false;

    let keys = h.manager.install_schedule(schedule).await.unwrap();

    assert_eq!(keys, vec!["glucose_patient-1_07:30"]);
}

#[tokio::test(start_paused = true)]
async fn test_past_appointment_reminders_are_not_installed() {
    let h = harness().await;
    let now = h.clock.now();
    let mut schedule = schedule_for(PATIENT_ID, PATIENT_PHONE);
    schedule.appointments = vec![
        Appointment {
            id: "appt-7".to_string(),
            scheduled_at: now + ChronoDuration::hours(3),
            provider_name: "Dr. Rivera".to_string(),
            location: Some("Clinic B".to_string()),
        },
        Appointment {
            id: "appt-8".to_string(),
            scheduled_at: now + ChronoDuration::days(3),
            provider_name: "Dr. Rivera".to_string(),
            location: None,
        },
    ];

    let keys = h.manager.install_schedule(schedule).await.unwrap();

    assert_eq!(
        keys,
        vec!["appt_patient-1_appt-7_2h", "appt_patient-1_appt-8_24h", "appt_patient-1_appt-8_2h"]
    );
    assert!(h.manager.jobs(PATIENT_ID).iter().all(|j| !j.recurring));

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;

    let sent = h.gateway.attempts_to(PATIENT_PHONE);
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Dr. Rivera"));
    assert!(sent[0].body.contains("Clinic B"));
    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_daily_digest_summarises_recent_readings() {
    let h = harness().await;
    h.store
        .insert_vital(VitalReading {
            id: "vital-1".to_string(),
            patient_id: PATIENT_ID.to_string(),
            vital_type: "glucose".to_string(),
            value: 182.0,
            unit: "mg/dL".to_string(),
            measured_at: h.clock.now(),
            device_id: None,
            source: "device".to_string(),
        })
        .await
        .unwrap();

    let mut schedule = schedule_for(PATIENT_ID, PATIENT_PHONE);
    schedule.care_team_updates = Some(CareTeamUpdates {
        frequency: DigestFrequency::Daily,
        time: "15:00".to_string(),
        day_of_week: None,
        day_of_month: None,
        recipients: vec!["+15557770001".to_string()],
    });
    let keys = h.manager.install_schedule(schedule).await.unwrap();
    assert_eq!(keys, vec!["careteam_patient-1_daily"]);

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;

    let sent = h.gateway.attempts_to("+15557770001");
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].body,
        "Daily update for Test Patient: 1 readings logged this period, latest glucose 182 mg/dL."
    );
    assert!(h.gateway.attempts_to(PATIENT_PHONE).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_pause_and_resume() {
    let h = harness().await;
    h.manager
        .install_schedule(medication_schedule(&["15:00", "20:00"]))
        .await
        .unwrap();

    let cancelled = h.manager.pause(PATIENT_ID).await.unwrap();
    assert_eq!(cancelled, 2);
    assert!(h.manager.jobs(PATIENT_ID).is_empty());
    assert!(!h.store.schedule(PATIENT_ID).await.unwrap().unwrap().active);

    tokio::time::sleep(61 * MINUTE).await;
    settle().await;
    assert_eq!(h.gateway.attempt_count(), 0);

    let keys = h.manager.resume(PATIENT_ID).await.unwrap();
    assert_eq!(keys.len(), 2);
    assert!(h.store.schedule(PATIENT_ID).await.unwrap().unwrap().active);
    assert_eq!(h.audit.entries_of_type(AuditEventType::SchedulePaused).await.len(), 1);
    assert_eq!(h.audit.entries_of_type(AuditEventType::ScheduleResumed).await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_pause_without_schedule_is_not_found() {
    let h = harness().await;

    assert_matches!(h.manager.pause(PATIENT_ID).await, Err(ScheduleError::NotFound(_)));
    assert_matches!(h.manager.resume(PATIENT_ID).await, Err(ScheduleError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn test_invalid_update_keeps_existing_jobs() {
    let h = harness().await;
    h.manager
        .install_schedule(medication_schedule(&["08:00", "20:00"]))
        .await
        .unwrap();

    let mut bad_zone = medication_schedule(&["09:00"]);
    bad_zone.timezone = "Mars/Olympus_Mons".to_string();
    assert_matches!(
        h.manager.update_schedule(PATIENT_ID, bad_zone).await,
        Err(ScheduleError::InvalidTimezone(_))
    );

    let bad_time = medication_schedule(&["9am"]);
    assert_matches!(
        h.manager.update_schedule(PATIENT_ID, bad_time).await,
        Err(ScheduleError::InvalidTime(_))
    );

    assert_matches!(
        h.manager
            .update_schedule(OTHER_PATIENT_ID, medication_schedule(&["09:00"]))
            .await,
        Err(ScheduleError::ValidationError(_))
    );

    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_restore_reinstalls_only_active_schedules() {
    let h = harness().await;
    h.store.save_schedule(&medication_schedule(&["08:00"])).await.unwrap();
    let mut paused = schedule_for(OTHER_PATIENT_ID, OTHER_PATIENT_PHONE);
    paused.medications = vec![common::metformin(&["09:00"])];
    paused.active = false;
    h.store.save_schedule(&paused).await.unwrap();

    let restored = h.manager.restore_active_schedules().await.unwrap();

    assert_eq!(restored, 1);
    assert_eq!(h.manager.jobs(PATIENT_ID).len(), 1);
    assert!(h.manager.jobs(OTHER_PATIENT_ID).is_empty());
}
