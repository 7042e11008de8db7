use std::sync::Arc;

use assert_matches::assert_matches;

use audit_cell::{AuditEventType, AuditService};
use shared_database::InMemoryStore;
use shared_models::Severity;
use threshold_cell::{
    SetThresholdRequest, ThresholdError, ThresholdResolver, ThresholdSource, ThresholdType, VitalType,
};

fn setup() -> (Arc<InMemoryStore>, Arc<AuditService>, ThresholdResolver) {
    let store = Arc::new(InMemoryStore::new());
    let audit = Arc::new(AuditService::in_memory());
    let resolver = ThresholdResolver::new(store.clone(), audit.clone());
    (store, audit, resolver)
}

fn override_request(threshold_type: &str, value: f64) -> SetThresholdRequest {
    SetThresholdRequest {
        threshold_type: threshold_type.to_string(),
        threshold_value: value,
        unit: None,
        notes: Some("clinician adjusted".to_string()),
        updated_by: Some("dr-smith".to_string()),
    }
}

#[tokio::test]
async fn test_low_glucose_uses_default_and_is_critical() {
    let (_, _, resolver) = setup();

    let alert = resolver
        .evaluate("patient-1", VitalType::Glucose, 65.0)
        .await
        .unwrap()
        .expect("65 mg/dL is below the default 70");

    assert_eq!(alert.threshold_type, ThresholdType::GlucoseLow);
    assert_eq!(alert.severity, Severity::Critical);
    assert_eq!(alert.threshold_value, 70.0);
    assert_eq!(alert.actual_value, 65.0);
    assert!(!alert.is_patient_specific);
}

#[tokio::test]
async fn test_patient_override_suppresses_alert() {
    let (_, _, resolver) = setup();

    resolver
        .set_override("patient-1", override_request("glucose_low", 60.0))
        .await
        .unwrap();

    let alert = resolver.evaluate("patient-1", VitalType::Glucose, 65.0).await.unwrap();
    assert!(alert.is_none());

    // Other patients still use the default.
    let other = resolver.evaluate("patient-2", VitalType::Glucose, 65.0).await.unwrap();
    assert!(other.is_some());
}

#[tokio::test]
async fn test_boundary_values_are_normal() {
    let (_, _, resolver) = setup();

    assert!(resolver
        .evaluate("patient-1", VitalType::Glucose, 70.0)
        .await
        .unwrap()
        .is_none());
    assert!(resolver
        .evaluate("patient-1", VitalType::Glucose, 250.0)
        .await
        .unwrap()
        .is_none());
    assert!(resolver
        .evaluate("patient-1", VitalType::HeartRate, 100.0)
        .await
        .unwrap()
        .is_none());
    assert!(resolver
        .evaluate("patient-1", VitalType::OxygenSaturation, 92.0)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_resolution_priority_override_then_global_then_default() {
    let (store, _, resolver) = setup();

    let default = resolver
        .resolve("patient-1", ThresholdType::HeartRateHigh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(default.value, 100.0);
    assert_eq!(default.source, ThresholdSource::Default);

    store.set_global_threshold("threshold_heart_rate_high", 110.0).await;
    let global = resolver
        .resolve("patient-1", ThresholdType::HeartRateHigh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(global.value, 110.0);
    assert_eq!(global.source, ThresholdSource::Global);

    resolver
        .set_override("patient-1", override_request("heart_rate_high", 120.0))
        .await
        .unwrap();
    let patient = resolver
        .resolve("patient-1", ThresholdType::HeartRateHigh)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.value, 120.0);
    assert!(patient.is_patient_specific);
    assert_eq!(patient.source, ThresholdSource::PatientOverride);
}

#[tokio::test]
async fn test_unconfigured_type_resolves_to_none() {
    let (_, _, resolver) = setup();

    let threshold = resolver.resolve("patient-1", ThresholdType::WeightGain).await.unwrap();
    assert!(threshold.is_none());

    let alert = resolver
        .evaluate("patient-1", VitalType::WeightChange, 12.0)
        .await
        .unwrap();
    assert!(alert.is_none());
}

#[tokio::test]
async fn test_severity_computed_from_excess_without_default_classification() {
    let (_, _, resolver) = setup();

    resolver
        .set_override("patient-1", override_request("weight_gain", 4.0))
        .await
        .unwrap();

    let alert = resolver
        .evaluate("patient-1", VitalType::WeightChange, 7.0)
        .await
        .unwrap()
        .unwrap();
    // 75% over the threshold.
    assert_eq!(alert.severity, Severity::Critical);

    let mild = resolver
        .evaluate("patient-1", VitalType::RespiratoryRate, 26.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mild.threshold_type, ThresholdType::RespiratoryRateHigh);
    assert_eq!(mild.severity, Severity::Low);
}

#[tokio::test]
async fn test_critical_tier_is_reported_before_high_tier() {
    let (_, _, resolver) = setup();

    let alert = resolver
        .evaluate("patient-1", VitalType::Glucose, 450.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(alert.threshold_type, ThresholdType::GlucoseCriticalHigh);

    let systolic = resolver
        .evaluate("patient-1", VitalType::BloodPressureSystolic, 150.0)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(systolic.threshold_type, ThresholdType::BloodPressureSystolicHigh);
    assert_eq!(systolic.severity, Severity::High);
}

#[tokio::test]
async fn test_non_positive_override_is_rejected() {
    let (_, _, resolver) = setup();

    let zero = resolver
        .set_override("patient-1", override_request("glucose_low", 0.0))
        .await;
    assert_matches!(zero, Err(ThresholdError::ValidationError(_)));

    let negative = resolver
        .set_override("patient-1", override_request("glucose_low", -5.0))
        .await;
    assert_matches!(negative, Err(ThresholdError::ValidationError(_)));
}

#[tokio::test]
async fn test_unknown_threshold_type_is_rejected() {
    let (_, _, resolver) = setup();

    let result = resolver
        .set_override("patient-1", override_request("glucose_extreme", 80.0))
        .await;
    assert_matches!(result, Err(ThresholdError::UnknownThresholdType(_)));
}

#[tokio::test]
async fn test_setting_twice_keeps_one_active_override() {
    let (_, _, resolver) = setup();

    let first = resolver
        .set_override("patient-1", override_request("glucose_low", 60.0))
        .await
        .unwrap();
    let second = resolver
        .set_override("patient-1", override_request("glucose_low", 65.0))
        .await
        .unwrap();

    assert_eq!(first.id, second.id);
    let resolved = resolver
        .resolve("patient-1", ThresholdType::GlucoseLow)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.value, 65.0);
}

#[tokio::test]
async fn test_remove_twice_is_a_noop_the_second_time() {
    let (_, audit, resolver) = setup();

    resolver
        .set_override("patient-1", override_request("glucose_low", 60.0))
        .await
        .unwrap();

    assert!(resolver
        .remove_override("patient-1", "glucose_low", "dr-smith")
        .await
        .unwrap());
    assert!(!resolver
        .remove_override("patient-1", "glucose_low", "dr-smith")
        .await
        .unwrap());

    let resolved = resolver
        .resolve("patient-1", ThresholdType::GlucoseLow)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resolved.value, 70.0);
    assert!(!resolved.is_patient_specific);

    assert_eq!(audit.entries_of_type(AuditEventType::ThresholdOverrideSet).await.len(), 1);
    assert_eq!(audit.entries_of_type(AuditEventType::ThresholdOverrideRemoved).await.len(), 2);
}

#[tokio::test]
async fn test_non_finite_reading_is_a_validation_error() {
    let (_, _, resolver) = setup();

    let result = resolver.evaluate("patient-1", VitalType::Glucose, f64::NAN).await;
    assert_matches!(result, Err(ThresholdError::ValidationError(_)));
}
