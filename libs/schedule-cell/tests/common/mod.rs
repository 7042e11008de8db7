#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use audit_cell::AuditService;
use messaging_cell::testing::{scripted_dispatcher, ScriptedGateway};
use schedule_cell::ScheduleManager;
use shared_config::AppConfig;
use shared_database::{ClinicalStore, InMemoryStore};
use shared_models::{Medication, PatientSchedule, SchedulePreferences};
use shared_utils::test_utils::{test_patient, TestConfig};
use shared_utils::{Clock, JobScheduler, TokioClock};

pub const PATIENT_ID: &str = "patient-1";
pub const PATIENT_PHONE: &str = "+15551230001";
pub const OTHER_PATIENT_ID: &str = "patient-2";
pub const OTHER_PATIENT_PHONE: &str = "+15551230002";

/// Wednesday 14:00 UTC.
pub fn wednesday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 14, 0, 0).unwrap()
}

pub struct Harness {
    pub config: AppConfig,
    pub store: Arc<InMemoryStore>,
    pub audit: Arc<AuditService>,
    pub gateway: Arc<ScriptedGateway>,
    pub scheduler: JobScheduler,
    pub clock: Arc<dyn Clock>,
    pub manager: ScheduleManager,
}

pub async fn harness() -> Harness {
    harness_with(ScriptedGateway::accepting("primary")).await
}

pub async fn harness_with(gateway: ScriptedGateway) -> Harness {
    let config = TestConfig::default().to_app_config();
    let store = Arc::new(InMemoryStore::new());
    store.add_patient(test_patient(PATIENT_ID, PATIENT_PHONE)).await;
    store.add_patient(test_patient(OTHER_PATIENT_ID, OTHER_PATIENT_PHONE)).await;

    let audit = Arc::new(AuditService::in_memory());
    let gateway = Arc::new(gateway);
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(wednesday_afternoon()));
    let scheduler = JobScheduler::new(clock.clone());

    let dispatcher = scripted_dispatcher(&[gateway.clone()], audit.clone(), scheduler.clone());
    let dyn_store: Arc<dyn ClinicalStore> = store.clone();
    let manager = ScheduleManager::new(dyn_store, dispatcher, audit.clone(), &config);

    Harness {
        config,
        store,
        audit,
        gateway,
        scheduler,
        clock,
        manager,
    }
}

pub fn metformin(times: &[&str]) -> Medication {
    Medication {
        name: "Metformin".to_string(),
        dosage: "500 mg".to_string(),
        times: times.iter().map(|t| t.to_string()).collect(),
        instructions: Some("Take with food.".to_string()),
    }
}

pub fn schedule_for(patient_id: &str, phone: &str) -> PatientSchedule {
    PatientSchedule {
        patient_id: patient_id.to_string(),
        medications: Vec::new(),
        glucose_checks: Vec::new(),
        appointments: Vec::new(),
        care_team_updates: None,
        quiet_hours: None,
        timezone: "UTC".to_string(),
        phone: phone.to_string(),
        preferences: SchedulePreferences::default(),
        active: true,
    }
}

pub fn medication_schedule(times: &[&str]) -> PatientSchedule {
    let mut schedule = schedule_for(PATIENT_ID, PATIENT_PHONE);
    schedule.medications = vec![metformin(times)];
    schedule
}

/// Lets spawned timer tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
