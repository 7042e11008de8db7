use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ThresholdError;
use shared_models::Severity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdType {
    GlucoseCriticalHigh,
    GlucoseCriticalLow,
    GlucoseHigh,
    GlucoseLow,
    BloodPressureSystolicCritical,
    BloodPressureSystolicHigh,
    BloodPressureSystolicLow,
    BloodPressureDiastolicCritical,
    BloodPressureDiastolicHigh,
    BloodPressureDiastolicLow,
    HeartRateHigh,
    HeartRateLow,
    OxygenSaturationLow,
    TemperatureHigh,
    TemperatureLow,
    RespiratoryRateHigh,
    RespiratoryRateLow,
    WeightGain,
}

/// Which side of the threshold is abnormal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Bound {
    /// Triggers when `value > threshold`.
    High,
    /// Triggers when `value < threshold`.
    Low,
}

#[derive(Debug, Clone, Copy)]
pub struct ThresholdDefinition {
    pub threshold_type: ThresholdType,
    pub bound: Bound,
    pub default_value: Option<f64>,
    pub unit: &'static str,
    pub default_severity: Option<Severity>,
}

const fn def(
    threshold_type: ThresholdType,
    bound: Bound,
    default_value: Option<f64>,
    unit: &'static str,
    default_severity: Option<Severity>,
) -> ThresholdDefinition {
    ThresholdDefinition {
        threshold_type,
        bound,
        default_value,
        unit,
        default_severity,
    }
}

use Bound::{High, Low};
use Severity::{Critical, High as SevHigh, Medium};

/// Hard-coded fallback table, last step of resolution.
pub const THRESHOLD_TABLE: &[ThresholdDefinition] = &[
    def(ThresholdType::GlucoseCriticalHigh, High, Some(400.0), "mg/dL", Some(Critical)),
    def(ThresholdType::GlucoseCriticalLow, Low, Some(54.0), "mg/dL", Some(Critical)),
    def(ThresholdType::GlucoseHigh, High, Some(250.0), "mg/dL", Some(SevHigh)),
    def(ThresholdType::GlucoseLow, Low, Some(70.0), "mg/dL", Some(Critical)),
    def(ThresholdType::BloodPressureSystolicCritical, High, Some(180.0), "mmHg", Some(Critical)),
    def(ThresholdType::BloodPressureSystolicHigh, High, Some(140.0), "mmHg", Some(SevHigh)),
    def(ThresholdType::BloodPressureSystolicLow, Low, Some(90.0), "mmHg", Some(Medium)),
    def(ThresholdType::BloodPressureDiastolicCritical, High, Some(120.0), "mmHg", Some(Critical)),
    def(ThresholdType::BloodPressureDiastolicHigh, High, Some(90.0), "mmHg", Some(SevHigh)),
    def(ThresholdType::BloodPressureDiastolicLow, Low, Some(60.0), "mmHg", Some(Medium)),
    def(ThresholdType::HeartRateHigh, High, Some(100.0), "bpm", Some(SevHigh)),
    def(ThresholdType::HeartRateLow, Low, Some(50.0), "bpm", Some(SevHigh)),
    def(ThresholdType::OxygenSaturationLow, Low, Some(92.0), "%", Some(Critical)),
    def(ThresholdType::TemperatureHigh, High, Some(100.4), "°F", Some(Medium)),
    def(ThresholdType::TemperatureLow, Low, Some(95.0), "°F", Some(SevHigh)),
    def(ThresholdType::RespiratoryRateHigh, High, Some(24.0), "breaths/min", None),
    def(ThresholdType::RespiratoryRateLow, Low, Some(10.0), "breaths/min", None),
    def(ThresholdType::WeightGain, High, None, "lbs", None),
];

impl ThresholdType {
    pub const ALL: [ThresholdType; 18] = [
        ThresholdType::GlucoseCriticalHigh,
        ThresholdType::GlucoseCriticalLow,
        ThresholdType::GlucoseHigh,
        ThresholdType::GlucoseLow,
        ThresholdType::BloodPressureSystolicCritical,
        ThresholdType::BloodPressureSystolicHigh,
        ThresholdType::BloodPressureSystolicLow,
        ThresholdType::BloodPressureDiastolicCritical,
        ThresholdType::BloodPressureDiastolicHigh,
        ThresholdType::BloodPressureDiastolicLow,
        ThresholdType::HeartRateHigh,
        ThresholdType::HeartRateLow,
        ThresholdType::OxygenSaturationLow,
        ThresholdType::TemperatureHigh,
        ThresholdType::TemperatureLow,
        ThresholdType::RespiratoryRateHigh,
        ThresholdType::RespiratoryRateLow,
        ThresholdType::WeightGain,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThresholdType::GlucoseCriticalHigh => "glucose_critical_high",
            ThresholdType::GlucoseCriticalLow => "glucose_critical_low",
            ThresholdType::GlucoseHigh => "glucose_high",
            ThresholdType::GlucoseLow => "glucose_low",
            ThresholdType::BloodPressureSystolicCritical => "blood_pressure_systolic_critical",
            ThresholdType::BloodPressureSystolicHigh => "blood_pressure_systolic_high",
            ThresholdType::BloodPressureSystolicLow => "blood_pressure_systolic_low",
            ThresholdType::BloodPressureDiastolicCritical => "blood_pressure_diastolic_critical",
            ThresholdType::BloodPressureDiastolicHigh => "blood_pressure_diastolic_high",
            ThresholdType::BloodPressureDiastolicLow => "blood_pressure_diastolic_low",
            ThresholdType::HeartRateHigh => "heart_rate_high",
            ThresholdType::HeartRateLow => "heart_rate_low",
            ThresholdType::OxygenSaturationLow => "oxygen_saturation_low",
            ThresholdType::TemperatureHigh => "temperature_high",
            ThresholdType::TemperatureLow => "temperature_low",
            ThresholdType::RespiratoryRateHigh => "respiratory_rate_high",
            ThresholdType::RespiratoryRateLow => "respiratory_rate_low",
            ThresholdType::WeightGain => "weight_gain",
        }
    }

    pub fn definition(&self) -> ThresholdDefinition {
        THRESHOLD_TABLE
            .iter()
            .find(|d| d.threshold_type == *self)
            .copied()
            .unwrap_or(ThresholdDefinition {
                threshold_type: *self,
                bound: Bound::High,
                default_value: None,
                unit: "",
                default_severity: None,
            })
    }

    /// Key under which a global override lives in the settings store.
    pub fn global_key(&self) -> String {
        format!("threshold_{}", self.as_str())
    }
}

impl fmt::Display for ThresholdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThresholdType {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        ThresholdType::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .copied()
            .ok_or_else(|| ThresholdError::UnknownThresholdType(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VitalType {
    Glucose,
    BloodPressureSystolic,
    BloodPressureDiastolic,
    HeartRate,
    OxygenSaturation,
    Temperature,
    RespiratoryRate,
    WeightChange,
}

impl VitalType {
    /// Thresholds checked for this vital, in evaluation order: critical tier,
    /// then high, then low. The first exceeded one wins.
    pub fn candidate_thresholds(&self) -> &'static [ThresholdType] {
        use ThresholdType::*;
        match self {
            VitalType::Glucose => &[GlucoseCriticalHigh, GlucoseCriticalLow, GlucoseHigh, GlucoseLow],
            VitalType::BloodPressureSystolic => &[
                BloodPressureSystolicCritical,
                BloodPressureSystolicHigh,
                BloodPressureSystolicLow,
            ],
            VitalType::BloodPressureDiastolic => &[
                BloodPressureDiastolicCritical,
                BloodPressureDiastolicHigh,
                BloodPressureDiastolicLow,
            ],
            VitalType::HeartRate => &[HeartRateHigh, HeartRateLow],
            VitalType::OxygenSaturation => &[OxygenSaturationLow],
            VitalType::Temperature => &[TemperatureHigh, TemperatureLow],
            VitalType::RespiratoryRate => &[RespiratoryRateHigh, RespiratoryRateLow],
            VitalType::WeightChange => &[WeightGain],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VitalType::Glucose => "glucose",
            VitalType::BloodPressureSystolic => "blood_pressure_systolic",
            VitalType::BloodPressureDiastolic => "blood_pressure_diastolic",
            VitalType::HeartRate => "heart_rate",
            VitalType::OxygenSaturation => "oxygen_saturation",
            VitalType::Temperature => "temperature",
            VitalType::RespiratoryRate => "respiratory_rate",
            VitalType::WeightChange => "weight_change",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            VitalType::Glucose => "Glucose",
            VitalType::BloodPressureSystolic => "Systolic blood pressure",
            VitalType::BloodPressureDiastolic => "Diastolic blood pressure",
            VitalType::HeartRate => "Heart rate",
            VitalType::OxygenSaturation => "Oxygen saturation",
            VitalType::Temperature => "Temperature",
            VitalType::RespiratoryRate => "Respiratory rate",
            VitalType::WeightChange => "Weight change",
        }
    }
}

impl FromStr for VitalType {
    type Err = ThresholdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "glucose" | "blood_glucose" => Ok(VitalType::Glucose),
            "blood_pressure_systolic" | "systolic" => Ok(VitalType::BloodPressureSystolic),
            "blood_pressure_diastolic" | "diastolic" => Ok(VitalType::BloodPressureDiastolic),
            "heart_rate" | "pulse" => Ok(VitalType::HeartRate),
            "oxygen_saturation" | "spo2" => Ok(VitalType::OxygenSaturation),
            "temperature" => Ok(VitalType::Temperature),
            "respiratory_rate" => Ok(VitalType::RespiratoryRate),
            "weight_change" | "weight_gain" => Ok(VitalType::WeightChange),
            _ => Err(ThresholdError::UnknownVitalType(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdSource {
    PatientOverride,
    Global,
    Default,
}

/// Effective threshold snapshot produced by resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Threshold {
    #[serde(rename = "type")]
    pub threshold_type: ThresholdType,
    pub value: f64,
    pub unit: String,
    pub is_patient_specific: bool,
    pub notes: Option<String>,
    pub source: ThresholdSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdAlert {
    pub patient_id: String,
    pub threshold_type: ThresholdType,
    pub actual_value: f64,
    pub threshold_value: f64,
    pub unit: String,
    pub severity: Severity,
    pub is_patient_specific: bool,
    pub message: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetThresholdRequest {
    pub threshold_type: String,
    pub threshold_value: f64,
    pub unit: Option<String>,
    pub notes: Option<String>,
    pub updated_by: Option<String>,
}

/// Fallback severity when the threshold type has no default classification.
pub fn severity_from_excess(bound: Bound, value: f64, threshold: f64) -> Severity {
    let excess = match bound {
        Bound::High => value - threshold,
        Bound::Low => threshold - value,
    };
    let percent = excess / threshold.abs() * 100.0;

    if percent > 50.0 {
        Severity::Critical
    } else if percent > 25.0 {
        Severity::High
    } else if percent > 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_type_has_a_definition_and_round_trips() {
        for t in ThresholdType::ALL {
            assert_eq!(t.definition().threshold_type, t);
            assert_eq!(t.as_str().parse::<ThresholdType>().unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_threshold_type_is_rejected() {
        assert!(matches!(
            "glucose_very_high".parse::<ThresholdType>(),
            Err(ThresholdError::UnknownThresholdType(_))
        ));
    }

    #[test]
    fn test_severity_from_excess_buckets() {
        assert_eq!(severity_from_excess(Bound::High, 31.0, 20.0), Severity::Critical);
        assert_eq!(severity_from_excess(Bound::High, 26.0, 20.0), Severity::High);
        assert_eq!(severity_from_excess(Bound::High, 23.0, 20.0), Severity::Medium);
        assert_eq!(severity_from_excess(Bound::High, 21.0, 20.0), Severity::Low);
        assert_eq!(severity_from_excess(Bound::Low, 4.0, 10.0), Severity::Critical);
    }

    #[test]
    fn test_glucose_candidates_check_critical_tier_first() {
        let order = VitalType::Glucose.candidate_thresholds();
        assert_eq!(order.first(), Some(&ThresholdType::GlucoseCriticalHigh));
        assert_eq!(order.last(), Some(&ThresholdType::GlucoseLow));
    }
}
