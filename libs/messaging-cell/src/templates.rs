use std::collections::HashMap;

use regex::{Captures, Regex};

use crate::error::MessagingError;

const BUILT_IN_TEMPLATES: &[(&str, &str)] = &[
    (
        "medication_reminder",
        "Hi {patientName}, it's time to take your {medicationName} ({dosage}). {instructions} Reply TAKEN when done.",
    ),
    (
        "glucose_check",
        "Hi {patientName}, time for your {label} glucose check. Reply with your reading (e.g. 120).",
    ),
    (
        "appointment_reminder",
        "Reminder: you have an appointment with {providerName} at {appointmentTime} ({location}). Reply HELP for assistance.",
    ),
    (
        "care_team_update",
        "{frequency} update for {patientName}: {summary}",
    ),
    (
        "critical_alert",
        "CRITICAL ALERT: {patientName} - {alertMessage}. Please respond immediately.",
    ),
    (
        "escalation_on_call",
        "ESCALATION: no response to critical alert for {patientName}. {alertMessage}. Please call the patient now.",
    ),
    (
        "escalation_emergency_contact",
        "This is an urgent message about {patientName}. {alertMessage}. The care team could not be reached. If this is life-threatening, call 911 now.",
    ),
    (
        "help",
        "Reply TAKEN after your medication, a number to log glucose (e.g. 120), EMERGENCY for urgent help, or STOP to opt out.",
    ),
];

/// Named message templates with `{variable}` placeholders.
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
    placeholder: Option<Regex>,
}

impl Default for TemplateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRegistry {
    pub fn new() -> Self {
        Self {
            templates: BUILT_IN_TEMPLATES
                .iter()
                .map(|(name, body)| (name.to_string(), body.to_string()))
                .collect(),
            placeholder: Regex::new(r"\{(\w+)\}").ok(),
        }
    }

    pub fn render(&self, name: &str, variables: &HashMap<String, String>) -> Result<String, MessagingError> {
        let body = self
            .templates
            .get(name)
            .ok_or_else(|| MessagingError::UnknownTemplate(name.to_string()))?;
        Ok(self.substitute(body, variables))
    }

    /// Replaces known `{name}` placeholders; unknown ones stay literal.
    pub fn substitute(&self, text: &str, variables: &HashMap<String, String>) -> String {
        let Some(placeholder) = &self.placeholder else {
            return text.to_string();
        };

        placeholder
            .replace_all(text, |caps: &Captures| match variables.get(&caps[1]) {
                Some(value) => value.clone(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}
