#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use alerting_cell::{
    AlertDebouncer, AlertingState, EscalationCoordinator, InboundMessageHandler, VitalsService, WebhookProcessor,
};
use audit_cell::AuditService;
use care_team_cell::CareTeamRouter;
use messaging_cell::testing::{scripted_dispatcher, ScriptedGateway};
use shared_config::AppConfig;
use shared_database::{ClinicalStore, InMemoryStore};
use shared_utils::signature::WebhookCredentials;
use shared_utils::test_utils::{test_patient, TestCareTeam, TestConfig};
use shared_utils::{Clock, JobScheduler, TokioClock};
use threshold_cell::ThresholdResolver;

pub const PATIENT_ID: &str = "patient-1";
pub const PATIENT_PHONE: &str = "+15551230001";
pub const EMERGENCY_PHONE: &str = "+15559990000";

/// Wednesday 14:00 UTC, inside clinic hours.
pub fn wednesday_afternoon() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, 14, 0, 0).unwrap()
}

pub struct Harness {
    pub config: AppConfig,
    pub store: Arc<InMemoryStore>,
    pub audit: Arc<AuditService>,
    pub primary: Arc<ScriptedGateway>,
    pub backup: Arc<ScriptedGateway>,
    pub scheduler: JobScheduler,
    pub clock: Arc<dyn Clock>,
    pub escalation: EscalationCoordinator,
    pub vitals: Arc<VitalsService>,
    pub inbound: Arc<InboundMessageHandler>,
    pub webhooks: Arc<WebhookProcessor>,
    pub state: AlertingState,
}

pub async fn harness() -> Harness {
    harness_with(TestConfig::default().to_app_config(), ScriptedGateway::accepting("primary")).await
}

pub async fn harness_with(config: AppConfig, primary: ScriptedGateway) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    store.add_patient(test_patient(PATIENT_ID, PATIENT_PHONE)).await;
    store
        .add_care_team_member(PATIENT_ID, TestCareTeam::physician("physician-1"))
        .await;
    store
        .add_care_team_member(PATIENT_ID, TestCareTeam::coordinator("coordinator-1"))
        .await;
    store
        .add_care_team_member(PATIENT_ID, TestCareTeam::on_call("oncall-1"))
        .await;

    let audit = Arc::new(AuditService::in_memory());
    let primary = Arc::new(primary);
    let backup = Arc::new(ScriptedGateway::accepting("backup"));
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(wednesday_afternoon()));
    let scheduler = JobScheduler::new(clock.clone());

    let dispatcher = scripted_dispatcher(&[primary.clone(), backup.clone()], audit.clone(), scheduler.clone());

    let dyn_store: Arc<dyn ClinicalStore> = store.clone();
    let care_team = Arc::new(CareTeamRouter::from_config(dyn_store.clone(), &config).unwrap());
    let resolver = Arc::new(ThresholdResolver::new(dyn_store.clone(), audit.clone()));
    let escalation = EscalationCoordinator::new(
        dyn_store.clone(),
        dispatcher.clone(),
        care_team.clone(),
        audit.clone(),
        &config,
    );
    let debouncer = Arc::new(AlertDebouncer::new(config.alert_debounce_seconds, clock.clone()));
    let vitals = Arc::new(VitalsService::new(
        dyn_store.clone(),
        resolver,
        dispatcher.clone(),
        care_team,
        escalation.clone(),
        debouncer,
        audit.clone(),
    ));
    let inbound = Arc::new(InboundMessageHandler::new(
        dyn_store.clone(),
        dispatcher.clone(),
        vitals.clone(),
        escalation.clone(),
        audit.clone(),
        false,
    ));
    let webhooks = Arc::new(WebhookProcessor::new(
        dyn_store,
        dispatcher,
        inbound.clone(),
        audit.clone(),
    ));

    let state = AlertingState {
        vitals: vitals.clone(),
        escalation: escalation.clone(),
        webhooks: webhooks.clone(),
        audit: audit.clone(),
        webhook_credentials: Arc::new(WebhookCredentials::from_config(&config)),
        clock: clock.clone(),
    };

    Harness {
        config,
        store,
        audit,
        primary,
        backup,
        scheduler,
        clock,
        escalation,
        vitals,
        inbound,
        webhooks,
        state,
    }
}

/// Lets spawned timer tasks run to completion.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn phone(member_id: &str) -> String {
    TestCareTeam::phone_for(member_id)
}
