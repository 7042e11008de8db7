use axum::{
    body::{to_bytes, Body, Bytes},
    extract::{FromRequest, OriginalUri, State},
    http::{header::CONTENT_TYPE, request::Parts, HeaderMap, Method, Request},
    middleware::Next,
    response::Response,
    Form,
};
use tracing::warn;

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome};
use shared_models::error::AppError;
use shared_utils::signature::{
    verify_signature, verify_telnyx_signature, verify_twilio_signature, SignatureError, SIGNATURE_HEADER,
    TELNYX_SIGNATURE_HEADER, TELNYX_TIMESTAMP_HEADER, TIMESTAMP_HEADER, TWILIO_SIGNATURE_HEADER,
};

use crate::router::AlertingState;

const MAX_WEBHOOK_BODY_BYTES: usize = 256 * 1024;

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
}

async fn buffer(request: Request<Body>) -> Result<(Parts, Bytes), AppError> {
    let (parts, body) = request.into_parts();
    let bytes = to_bytes(body, MAX_WEBHOOK_BODY_BYTES)
        .await
        .map_err(|_| AppError::BadRequest("Webhook body too large or unreadable".to_string()))?;
    Ok((parts, bytes))
}

fn verify_relay(state: &AlertingState, parts: &Parts, body: &[u8]) -> Result<(), SignatureError> {
    verify_signature(
        &state.webhook_credentials.relay_secret,
        header_value(&parts.headers, TIMESTAMP_HEADER),
        body,
        header_value(&parts.headers, SIGNATURE_HEADER),
        state.clock.now(),
    )
}

// Rejects with 401 and an audit record, or hands an identical request on.
async fn finish(
    state: &AlertingState,
    parts: Parts,
    bytes: Bytes,
    verified: Result<(), SignatureError>,
    next: Next,
) -> Result<Response, AppError> {
    if let Err(reason) = verified {
        warn!(path = %parts.uri.path(), "Webhook rejected: {}", reason);
        state
            .audit
            .record(
                AuditEntry::new(AuditEventType::WebhookRejected, "webhook signature rejected", AuditOutcome::Denied)
                    .with_resource("webhook", parts.uri.path().to_string())
                    .add_context("reason", reason.to_string()),
            )
            .await;
        return Err(AppError::Unauthorized(format!("Webhook signature rejected: {}", reason)));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

/// Native `telnyx-signature-ed25519` when present, relay HMAC otherwise.
pub async fn verify_telnyx_webhook(
    State(state): State<AlertingState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, bytes) = buffer(request).await?;

    let verified = if parts.headers.contains_key(TELNYX_SIGNATURE_HEADER) {
        verify_telnyx_signature(
            &state.webhook_credentials.telnyx_public_key,
            header_value(&parts.headers, TELNYX_TIMESTAMP_HEADER),
            &bytes,
            header_value(&parts.headers, TELNYX_SIGNATURE_HEADER),
            state.clock.now(),
        )
    } else {
        verify_relay(&state, &parts, &bytes)
    };

    finish(&state, parts, bytes, verified, next).await
}

/// Native `X-Twilio-Signature` when present, relay HMAC otherwise. Twilio
/// signs the public URL it called, so the configured base URL is required.
pub async fn verify_twilio_webhook(
    State(state): State<AlertingState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (parts, bytes) = buffer(request).await?;

    let verified = if parts.headers.contains_key(TWILIO_SIGNATURE_HEADER) {
        let credentials = &state.webhook_credentials;
        if credentials.public_base_url.is_empty() {
            Err(SignatureError::MissingSecret)
        } else {
            let uri = parts
                .extensions
                .get::<OriginalUri>()
                .map(|original| &original.0)
                .unwrap_or(&parts.uri);
            let path = uri.path_and_query().map(|p| p.as_str()).unwrap_or_else(|| uri.path());
            let url = format!("{}{}", credentials.public_base_url, path);

            verify_twilio_signature(
                &credentials.twilio_auth_token,
                &url,
                &form_pairs(&bytes).await?,
                header_value(&parts.headers, TWILIO_SIGNATURE_HEADER),
            )
        }
    } else {
        verify_relay(&state, &parts, &bytes)
    };

    finish(&state, parts, bytes, verified, next).await
}

async fn form_pairs(bytes: &Bytes) -> Result<Vec<(String, String)>, AppError> {
    let request = Request::builder()
        .method(Method::POST)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(bytes.clone()))
        .map_err(|e| AppError::BadRequest(format!("Unreadable webhook body: {}", e)))?;

    let Form(pairs) = Form::<Vec<(String, String)>>::from_request(request, &())
        .await
        .map_err(|e| AppError::BadRequest(format!("Malformed form body: {}", e)))?;
    Ok(pairs)
}
