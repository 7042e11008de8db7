use std::sync::Arc;

use chrono::Weekday;

use shared_config::AppConfig;
use shared_models::{AvailableHours, CareTeamMember, CareTeamRole, PatientContact};

pub struct TestConfig {
    pub webhook_secret: String,
    pub provider_base_url: String,
    pub escalation_delay_minutes: u64,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            webhook_secret: "test-webhook-secret-must-be-long-enough".to_string(),
            provider_base_url: "http://localhost:9999".to_string(),
            escalation_delay_minutes: 15,
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            telnyx_api_key: "KEY_test".to_string(),
            telnyx_phone_number: "+15550000001".to_string(),
            telnyx_messaging_profile_id: "profile-test".to_string(),
            telnyx_connection_id: "connection-test".to_string(),
            telnyx_base_url: self.provider_base_url.clone(),
            twilio_account_sid: "AC_test".to_string(),
            twilio_auth_token: "twilio-token".to_string(),
            twilio_phone_number: "+15550000002".to_string(),
            twilio_base_url: self.provider_base_url.clone(),
            webhook_signing_secret: self.webhook_secret.clone(),
            public_webhook_base_url: "https://alerts.example.test".to_string(),
            escalation_delay_minutes: self.escalation_delay_minutes,
            clinic_timezone: "UTC".to_string(),
            ..AppConfig::default()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestCareTeam;

impl TestCareTeam {
    pub fn member(id: &str, role: CareTeamRole, on_call: bool) -> CareTeamMember {
        CareTeamMember {
            id: id.to_string(),
            name: format!("Member {}", id),
            role,
            phone_number: Self::phone_for(id),
            email: Some(format!("{}@clinic.test", id)),
            department: Some("Endocrinology".to_string()),
            on_call,
            priority: 1,
            escalation_order: 1,
            specialties: vec![],
            available_hours: Self::weekday_hours(9, 17),
        }
    }

    /// Deterministic per-id number so recipients can be told apart in assertions.
    pub fn phone_for(id: &str) -> String {
        let digits = id
            .bytes()
            .fold(0u32, |acc, b| (acc * 31 + b as u32) % 10_000_000);
        format!("+1555{:07}", digits)
    }

    pub fn with_phone(mut member: CareTeamMember, phone: &str) -> CareTeamMember {
        member.phone_number = phone.to_string();
        member
    }

    pub fn weekday_hours(start: u32, end: u32) -> AvailableHours {
        AvailableHours {
            start,
            end,
            days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }

    pub fn physician(id: &str) -> CareTeamMember {
        Self::member(id, CareTeamRole::PrimaryPhysician, false)
    }

    pub fn coordinator(id: &str) -> CareTeamMember {
        Self::member(id, CareTeamRole::CareCoordinator, false)
    }

    pub fn on_call(id: &str) -> CareTeamMember {
        Self::member(id, CareTeamRole::OnCallProvider, true)
    }
}

pub fn test_patient(patient_id: &str, phone: &str) -> PatientContact {
    PatientContact {
        patient_id: patient_id.to_string(),
        name: "Test Patient".to_string(),
        phone: phone.to_string(),
        emergency_contact_name: Some("Emergency Contact".to_string()),
        emergency_contact_phone: Some("+15559990000".to_string()),
    }
}
