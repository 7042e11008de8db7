use std::env;
use std::str::FromStr;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,

    pub telnyx_api_key: String,
    pub telnyx_phone_number: String,
    pub telnyx_messaging_profile_id: String,
    pub telnyx_connection_id: String,
    pub telnyx_base_url: String,

    pub twilio_account_sid: String,
    pub twilio_auth_token: String,
    pub twilio_phone_number: String,
    pub twilio_base_url: String,

    /// Provider tried first; the other one is the backup.
    pub primary_provider: String,
    pub provider_timeout_seconds: u64,

    /// Relay HMAC secret for `X-Webhook-Signature`.
    pub webhook_signing_secret: String,
    /// Base64 Ed25519 key from the Telnyx portal, for native Telnyx signatures.
    pub telnyx_public_key: String,
    /// Public origin Twilio calls back on; part of the Twilio signature.
    pub public_webhook_base_url: String,

    pub escalation_delay_minutes: u64,
    pub escalation_max_levels: u8,

    pub default_quiet_hours_start: String,
    pub default_quiet_hours_end: String,

    pub schedule_max_retries: u32,
    pub schedule_retry_delay_seconds: u64,

    pub alert_debounce_seconds: u64,

    pub clinic_timezone: String,
    pub business_hours_start: u32,
    pub business_hours_end: u32,

    pub audit_include_message_body: bool,

    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            telnyx_api_key: String::new(),
            telnyx_phone_number: String::new(),
            telnyx_messaging_profile_id: String::new(),
            telnyx_connection_id: String::new(),
            telnyx_base_url: "https://api.telnyx.com/v2".to_string(),
            twilio_account_sid: String::new(),
            twilio_auth_token: String::new(),
            twilio_phone_number: String::new(),
            twilio_base_url: "https://api.twilio.com".to_string(),
            primary_provider: "telnyx".to_string(),
            provider_timeout_seconds: 10,
            webhook_signing_secret: String::new(),
            telnyx_public_key: String::new(),
            public_webhook_base_url: String::new(),
            escalation_delay_minutes: 15,
            escalation_max_levels: 3,
            default_quiet_hours_start: "22:00".to_string(),
            default_quiet_hours_end: "07:00".to_string(),
            schedule_max_retries: 3,
            schedule_retry_delay_seconds: 300,
            alert_debounce_seconds: 300,
            clinic_timezone: "America/New_York".to_string(),
            business_hours_start: 8,
            business_hours_end: 18,
            audit_include_message_body: false,
            port: 3000,
        }
    }
}

fn string_var(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| {
        if default.is_empty() {
            warn!("{} not set, using empty value", name);
        } else {
            warn!("{} not set, using default", name);
        }
        default.to_string()
    })
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value ({}), using default", name, raw);
            default
        }),
        Err(_) => default,
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            supabase_url: string_var("SUPABASE_URL", ""),
            supabase_anon_key: string_var("SUPABASE_ANON_PUBLIC_KEY", ""),

            telnyx_api_key: string_var("TELNYX_API_KEY", ""),
            telnyx_phone_number: string_var("TELNYX_PHONE_NUMBER", ""),
            telnyx_messaging_profile_id: string_var("TELNYX_MESSAGING_PROFILE_ID", ""),
            telnyx_connection_id: string_var("TELNYX_CONNECTION_ID", ""),
            telnyx_base_url: string_var("TELNYX_BASE_URL", &defaults.telnyx_base_url),

            twilio_account_sid: string_var("TWILIO_ACCOUNT_SID", ""),
            twilio_auth_token: string_var("TWILIO_AUTH_TOKEN", ""),
            twilio_phone_number: string_var("TWILIO_PHONE_NUMBER", ""),
            twilio_base_url: string_var("TWILIO_BASE_URL", &defaults.twilio_base_url),

            primary_provider: parsed_var("PRIMARY_PROVIDER", defaults.primary_provider),
            provider_timeout_seconds: parsed_var("PROVIDER_TIMEOUT_SECONDS", defaults.provider_timeout_seconds),

            webhook_signing_secret: string_var("WEBHOOK_SIGNING_SECRET", ""),
            telnyx_public_key: string_var("TELNYX_PUBLIC_KEY", ""),
            public_webhook_base_url: string_var("PUBLIC_WEBHOOK_BASE_URL", ""),

            escalation_delay_minutes: parsed_var("ESCALATION_DELAY_MINUTES", defaults.escalation_delay_minutes),
            escalation_max_levels: parsed_var("ESCALATION_MAX_LEVELS", defaults.escalation_max_levels),

            default_quiet_hours_start: parsed_var("DEFAULT_QUIET_HOURS_START", defaults.default_quiet_hours_start),
            default_quiet_hours_end: parsed_var("DEFAULT_QUIET_HOURS_END", defaults.default_quiet_hours_end),

            schedule_max_retries: parsed_var("SCHEDULE_MAX_RETRIES", defaults.schedule_max_retries),
            schedule_retry_delay_seconds: parsed_var("SCHEDULE_RETRY_DELAY_SECONDS", defaults.schedule_retry_delay_seconds),

            alert_debounce_seconds: parsed_var("ALERT_DEBOUNCE_SECONDS", defaults.alert_debounce_seconds),

            clinic_timezone: parsed_var("CLINIC_TIMEZONE", defaults.clinic_timezone),
            business_hours_start: parsed_var("BUSINESS_HOURS_START", defaults.business_hours_start),
            business_hours_end: parsed_var("BUSINESS_HOURS_END", defaults.business_hours_end),

            audit_include_message_body: parsed_var("AUDIT_INCLUDE_MESSAGE_BODY", defaults.audit_include_message_body),

            port: parsed_var("PORT", defaults.port),
        };

        if !config.is_store_configured() {
            warn!("Supabase not configured - falling back to the in-memory store");
        }
        if !config.is_telnyx_configured() && !config.is_twilio_configured() {
            warn!("No telephony provider configured - SMS and voice delivery will fail");
        }
        if config.webhook_signing_secret.is_empty() && config.telnyx_public_key.is_empty() {
            warn!("Neither WEBHOOK_SIGNING_SECRET nor TELNYX_PUBLIC_KEY set - Telnyx webhooks will be rejected");
        }
        if config.webhook_signing_secret.is_empty() && config.public_webhook_base_url.is_empty() {
            warn!("Neither WEBHOOK_SIGNING_SECRET nor PUBLIC_WEBHOOK_BASE_URL set - Twilio webhooks will be rejected");
        }

        config
    }

    pub fn is_store_configured(&self) -> bool {
        !self.supabase_url.is_empty() && !self.supabase_anon_key.is_empty()
    }

    pub fn is_telnyx_configured(&self) -> bool {
        !self.telnyx_api_key.is_empty() && !self.telnyx_phone_number.is_empty()
    }

    pub fn is_twilio_configured(&self) -> bool {
        !self.twilio_account_sid.is_empty()
            && !self.twilio_auth_token.is_empty()
            && !self.twilio_phone_number.is_empty()
    }

    pub fn twilio_is_primary(&self) -> bool {
        self.primary_provider.eq_ignore_ascii_case("twilio")
    }
}
