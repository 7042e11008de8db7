use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeZone, Utc, Weekday};

use care_team_cell::{is_available, AlertContext, AlertType, CareTeamError, CareTeamRouter};
use shared_config::AppConfig;
use shared_database::InMemoryStore;
use shared_utils::test_utils::{TestCareTeam, TestConfig};

const PATIENT: &str = "patient-1";

fn wednesday(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 14, hour, 0, 0).unwrap()
}

fn saturday(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, hour, 0, 0).unwrap()
}

async fn router_with_team() -> CareTeamRouter {
    let store = Arc::new(InMemoryStore::new());
    store.add_care_team_member(PATIENT, TestCareTeam::physician("dr-a")).await;
    store.add_care_team_member(PATIENT, TestCareTeam::coordinator("coord-a")).await;
    store.add_care_team_member(PATIENT, TestCareTeam::on_call("oncall-a")).await;
    CareTeamRouter::from_config(store, &TestConfig::default().to_app_config()).unwrap()
}

fn ids(members: &[shared_models::CareTeamMember]) -> Vec<&str> {
    members.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn test_glucose_alert_in_business_hours_goes_to_physician_and_coordinator() {
    let router = router_with_team().await;

    let recipients = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::Hypoglycemia, wednesday(10)))
        .await
        .unwrap();

    assert_eq!(ids(&recipients), vec!["dr-a", "coord-a"]);
}

#[tokio::test]
async fn test_glucose_alert_after_hours_goes_to_on_call_only() {
    let router = router_with_team().await;

    let evening = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::Hyperglycemia, wednesday(20)))
        .await
        .unwrap();
    assert_eq!(ids(&evening), vec!["oncall-a"]);

    let weekend = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::Hyperglycemia, saturday(10)))
        .await
        .unwrap();
    assert_eq!(ids(&weekend), vec!["oncall-a"]);
}

#[tokio::test]
async fn test_missed_medication_skips_unavailable_coordinator() {
    let router = router_with_team().await;

    let during = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::MedicationMissed, wednesday(10)))
        .await
        .unwrap();
    assert_eq!(ids(&during), vec!["coord-a"]);

    // Coordinator works 9-17; nobody else is substituted.
    let after = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::DeviceDisconnected, wednesday(18)))
        .await
        .unwrap();
    assert!(after.is_empty());
}

#[tokio::test]
async fn test_wound_deterioration_ignores_the_clock() {
    let router = router_with_team().await;

    let recipients = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::WoundDeterioration, saturday(3)))
        .await
        .unwrap();
    assert_eq!(ids(&recipients), vec!["dr-a", "coord-a"]);
}

#[tokio::test]
async fn test_emergency_response_adds_physician_only_in_hours() {
    let router = router_with_team().await;

    let in_hours = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::EmergencyResponse, wednesday(9)))
        .await
        .unwrap();
    assert_eq!(ids(&in_hours), vec!["oncall-a", "dr-a"]);

    let night = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::EmergencyResponse, wednesday(2)))
        .await
        .unwrap();
    assert_eq!(ids(&night), vec!["oncall-a"]);
}

#[tokio::test]
async fn test_general_alert_goes_to_coordinator_only() {
    let router = router_with_team().await;

    let recipients = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::General, saturday(23)))
        .await
        .unwrap();
    assert_eq!(ids(&recipients), vec!["coord-a"]);
}

#[tokio::test]
async fn test_member_with_two_matching_roles_is_notified_once() {
    let store = Arc::new(InMemoryStore::new());
    let mut physician_on_call = TestCareTeam::physician("dr-b");
    physician_on_call.on_call = true;
    store.add_care_team_member(PATIENT, physician_on_call).await;
    store.add_care_team_member(PATIENT, TestCareTeam::on_call("oncall-b")).await;

    let router = CareTeamRouter::from_config(store, &TestConfig::default().to_app_config()).unwrap();
    let recipients = router
        .recipients_for(PATIENT, &AlertContext::new(AlertType::EmergencyResponse, wednesday(10)))
        .await
        .unwrap();

    assert_eq!(recipients.len(), 2);
    assert_eq!(recipients.iter().filter(|m| m.id == "dr-b").count(), 1);
}

#[tokio::test]
async fn test_business_hours_use_clinic_timezone() {
    let store = Arc::new(InMemoryStore::new());
    let config = AppConfig {
        clinic_timezone: "America/New_York".to_string(),
        ..AppConfig::default()
    };
    let router = CareTeamRouter::from_config(store, &config).unwrap();

    // 21:00 UTC is 17:00 in New York during daylight saving time.
    assert!(router.is_business_hours(wednesday(21)));
    // 08:00 UTC is 04:00 in New York.
    assert!(!router.is_business_hours(wednesday(8)));
}

#[test]
fn test_invalid_timezone_is_a_configuration_error() {
    let config = AppConfig {
        clinic_timezone: "Mars/Olympus_Mons".to_string(),
        ..AppConfig::default()
    };
    let result = CareTeamRouter::from_config(Arc::new(InMemoryStore::new()), &config);
    assert_matches!(result, Err(CareTeamError::InvalidTimezone(_)));
}

#[test]
fn test_availability_window_and_on_call_flag() {
    let coordinator = TestCareTeam::coordinator("coord-c");
    assert!(is_available(&coordinator, Weekday::Tue, 9));
    assert!(is_available(&coordinator, Weekday::Tue, 16));
    assert!(!is_available(&coordinator, Weekday::Tue, 17));
    assert!(!is_available(&coordinator, Weekday::Sun, 10));

    let on_call = TestCareTeam::on_call("oncall-c");
    assert!(is_available(&on_call, Weekday::Sun, 3));
}
