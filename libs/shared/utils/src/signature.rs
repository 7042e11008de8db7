use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use ring::{hmac as ring_hmac, signature as ring_signature};
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use shared_config::AppConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";
pub const TIMESTAMP_HEADER: &str = "x-webhook-timestamp";
pub const SIGNATURE_TOLERANCE_SECONDS: i64 = 300;

pub const TELNYX_SIGNATURE_HEADER: &str = "telnyx-signature-ed25519";
pub const TELNYX_TIMESTAMP_HEADER: &str = "telnyx-timestamp";
pub const TWILIO_SIGNATURE_HEADER: &str = "x-twilio-signature";

/// Everything webhook verification needs. A vendor's native scheme is only
/// tried when its key material is present.
#[derive(Debug, Clone, Default)]
pub struct WebhookCredentials {
    pub relay_secret: String,
    pub telnyx_public_key: String,
    pub twilio_auth_token: String,
    pub public_base_url: String,
}

impl WebhookCredentials {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            relay_secret: config.webhook_signing_secret.clone(),
            telnyx_public_key: config.telnyx_public_key.clone(),
            twilio_auth_token: config.twilio_auth_token.clone(),
            public_base_url: config.public_webhook_base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum SignatureError {
    #[error("webhook signing secret is not configured")]
    MissingSecret,
    #[error("configured verification key is malformed")]
    InvalidKey,
    #[error("invalid webhook timestamp")]
    InvalidTimestamp,
    #[error("webhook timestamp outside the accepted window")]
    Expired,
    #[error("invalid signature encoding")]
    InvalidEncoding,
    #[error("signature mismatch")]
    Mismatch,
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Result<HmacSha256, SignatureError> {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::MissingSecret)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);
    Ok(mac)
}

/// Base64 HMAC-SHA256 over `"{timestamp}.{body}"`.
pub fn sign_payload(secret: &str, timestamp: i64, body: &[u8]) -> Result<String, SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let mac = mac_for(secret, &timestamp.to_string(), body)?;
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

fn check_timestamp(timestamp: &str, now: DateTime<Utc>) -> Result<(), SignatureError> {
    let sent_at: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| SignatureError::InvalidTimestamp)?;
    let skew = now
        .timestamp()
        .checked_sub(sent_at)
        .map(i64::unsigned_abs)
        .ok_or(SignatureError::Expired)?;
    if skew > SIGNATURE_TOLERANCE_SECONDS.unsigned_abs() {
        debug!("Webhook timestamp {} outside tolerance (now {})", sent_at, now.timestamp());
        return Err(SignatureError::Expired);
    }
    Ok(())
}

/// Relay scheme: `X-Webhook-Signature` over `"{timestamp}.{body}"`.
pub fn verify_signature(
    secret: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    if secret.is_empty() {
        return Err(SignatureError::MissingSecret);
    }

    check_timestamp(timestamp, now)?;

    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::InvalidEncoding)?;

    let mac = mac_for(secret, timestamp.trim(), body)?;
    mac.verify_slice(&expected).map_err(|_| SignatureError::Mismatch)
}

/// Telnyx signs `"{timestamp}|{body}"` with Ed25519; the header carries the
/// base64 signature.
pub fn verify_telnyx_signature(
    public_key: &str,
    timestamp: &str,
    body: &[u8],
    signature: &str,
    now: DateTime<Utc>,
) -> Result<(), SignatureError> {
    if public_key.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    check_timestamp(timestamp, now)?;

    let key = STANDARD
        .decode(public_key.trim())
        .map_err(|_| SignatureError::InvalidKey)?;
    let signature = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::InvalidEncoding)?;

    let mut signed = Vec::with_capacity(timestamp.len() + 1 + body.len());
    signed.extend_from_slice(timestamp.trim().as_bytes());
    signed.push(b'|');
    signed.extend_from_slice(body);

    ring_signature::UnparsedPublicKey::new(&ring_signature::ED25519, key)
        .verify(&signed, &signature)
        .map_err(|_| SignatureError::Mismatch)
}

/// Twilio's string to sign: the full callback URL followed by every POST
/// parameter as `key` + `value`, sorted.
fn twilio_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();
    sorted.iter().fold(url.to_string(), |mut acc, (key, value)| {
        acc.push_str(key);
        acc.push_str(value);
        acc
    })
}

/// Base64 HMAC-SHA1 as sent in `X-Twilio-Signature`.
pub fn sign_twilio(auth_token: &str, url: &str, params: &[(String, String)]) -> String {
    let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    let tag = ring_hmac::sign(&key, twilio_payload(url, params).as_bytes());
    STANDARD.encode(tag.as_ref())
}

pub fn verify_twilio_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> Result<(), SignatureError> {
    if auth_token.is_empty() {
        return Err(SignatureError::MissingSecret);
    }
    let expected = STANDARD
        .decode(signature.trim())
        .map_err(|_| SignatureError::InvalidEncoding)?;

    let key = ring_hmac::Key::new(ring_hmac::HMAC_SHA1_FOR_LEGACY_USE_ONLY, auth_token.as_bytes());
    ring_hmac::verify(&key, twilio_payload(url, params).as_bytes(), &expected)
        .map_err(|_| SignatureError::Mismatch)
}
