use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use audit_cell::{AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use messaging_cell::{DeliveryStatus, NotificationDispatcher, TelnyxWebhook, TwilioInboundMessage, TwilioStatusCallback};
use shared_database::ClinicalStore;
use shared_models::DeliveryStatusUpdate;
use shared_utils::Clock;

use crate::error::AlertingError;
use crate::models::{InboundReply, WebhookOutcome};
use crate::services::InboundMessageHandler;

fn payload_str<'a>(payload: &'a Value, pointer: &str) -> Option<&'a str> {
    payload.pointer(pointer).and_then(Value::as_str)
}

/// Telnyx reports per-recipient status on `message.finalized`; the event name
/// carries it for the others.
fn telnyx_message_status(event_type: &str, payload: &Value) -> String {
    match event_type {
        "message.finalized" => payload_str(payload, "/to/0/status")
            .unwrap_or("delivered")
            .to_string(),
        other => other.trim_start_matches("message.").to_string(),
    }
}

/// Normalizes provider callbacks into store updates and routes inbound SMS.
pub struct WebhookProcessor {
    store: Arc<dyn ClinicalStore>,
    dispatcher: NotificationDispatcher,
    inbound: Arc<InboundMessageHandler>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl WebhookProcessor {
    pub fn new(
        store: Arc<dyn ClinicalStore>,
        dispatcher: NotificationDispatcher,
        inbound: Arc<InboundMessageHandler>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let clock = dispatcher.scheduler().clock();
        Self {
            store,
            dispatcher,
            inbound,
            audit,
            clock,
        }
    }

    async fn record_status(
        &self,
        provider: &str,
        message_id: &str,
        status: &str,
        error: Option<String>,
    ) -> Result<(), AlertingError> {
        let normalized = DeliveryStatus::from_provider(status);
        let update = DeliveryStatusUpdate {
            message_id: message_id.to_string(),
            provider: provider.to_string(),
            status: status.to_string(),
            error: error.clone(),
            recorded_at: self.clock.now(),
        };
        self.store.record_delivery_status(update).await?;

        if matches!(normalized, DeliveryStatus::Failed | DeliveryStatus::Undelivered) {
            warn!(provider = %provider, message_id = %message_id, error = ?error, "Delivery failed");
        } else {
            debug!(provider = %provider, message_id = %message_id, status = %status, "Delivery status recorded");
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::DeliveryStatusReceived,
                    format!("{} delivery status", provider),
                    if matches!(normalized, DeliveryStatus::Failed | DeliveryStatus::Undelivered) {
                        AuditOutcome::Failure
                    } else {
                        AuditOutcome::Info
                    },
                )
                .with_resource("message", message_id)
                .add_context("status", status)
                .add_context("normalized_status", normalized)
                .add_context("error", error),
            )
            .await;

        Ok(())
    }

    #[instrument(skip(self, webhook), fields(event_type = %webhook.data.event_type))]
    pub async fn handle_telnyx(&self, webhook: TelnyxWebhook) -> Result<WebhookOutcome, AlertingError> {
        let event_type = webhook.data.event_type.as_str();
        let payload = &webhook.data.payload;

        match event_type {
            "message.received" => {
                let (Some(from), Some(text)) = (payload_str(payload, "/from/phone_number"), payload_str(payload, "/text"))
                else {
                    warn!("Telnyx inbound message without sender or text");
                    return Ok(WebhookOutcome::ignored(event_type));
                };
                let reply = self.inbound.handle(from, text, "telnyx").await?;
                Ok(inbound_outcome(event_type, &reply))
            }
            "message.sent" | "message.finalized" | "message.delivered" | "message.delivery_failed" => {
                let Some(message_id) = payload_str(payload, "/id") else {
                    return Ok(WebhookOutcome::ignored(event_type));
                };
                let status = telnyx_message_status(event_type, payload);
                let error = payload_str(payload, "/errors/0/detail")
                    .or_else(|| payload_str(payload, "/errors/0/title"))
                    .map(str::to_string);

                self.record_status("telnyx", message_id, &status, error).await?;
                Ok(WebhookOutcome::handled(event_type, status))
            }
            "call.answered" => {
                let Some(call_id) = payload_str(payload, "/call_control_id") else {
                    return Ok(WebhookOutcome::ignored(event_type));
                };
                self.record_status("telnyx", call_id, "answered", None).await?;
                let spoke = self.dispatcher.handle_call_answered(call_id).await?;
                info!(call_id = %call_id, spoke, "Telnyx call answered");
                Ok(WebhookOutcome::handled(
                    event_type,
                    if spoke { "speech started" } else { "no pending speech" },
                ))
            }
            call_event if call_event.starts_with("call.") => {
                let Some(call_id) = payload_str(payload, "/call_control_id") else {
                    return Ok(WebhookOutcome::ignored(event_type));
                };
                let status = call_event.trim_start_matches("call.").to_string();
                let cause = payload_str(payload, "/hangup_cause").map(str::to_string);
                self.record_status("telnyx", call_id, &status, cause).await?;
                if call_event == "call.hangup" && self.dispatcher.handle_call_ended(call_id).await {
                    debug!(call_id = %call_id, "Released speech for unanswered call");
                }
                Ok(WebhookOutcome::handled(event_type, status))
            }
            _ => {
                debug!("Ignoring Telnyx event {}", event_type);
                Ok(WebhookOutcome::ignored(event_type))
            }
        }
    }

    #[instrument(skip(self, callback))]
    pub async fn handle_twilio_status(&self, callback: TwilioStatusCallback) -> Result<WebhookOutcome, AlertingError> {
        let (resource_id, status) = match (&callback.message_sid, &callback.message_status, &callback.call_sid, &callback.call_status) {
            (Some(sid), Some(status), _, _) => (sid.clone(), status.clone()),
            (_, _, Some(sid), Some(status)) => (sid.clone(), status.clone()),
            _ => {
                warn!("Twilio status callback without a resource id or status");
                return Ok(WebhookOutcome::ignored("twilio.status"));
            }
        };

        let error = callback.error_code.as_ref().map(|code| format!("Twilio error {}", code));
        self.record_status("twilio", &resource_id, &status, error).await?;
        Ok(WebhookOutcome::handled("twilio.status", status))
    }

    #[instrument(skip(self, message))]
    pub async fn handle_twilio_inbound(&self, message: TwilioInboundMessage) -> Result<WebhookOutcome, AlertingError> {
        let reply = self.inbound.handle(&message.from, &message.body, "twilio").await?;
        Ok(inbound_outcome("twilio.inbound", &reply))
    }
}

fn inbound_outcome(event: &str, reply: &InboundReply) -> WebhookOutcome {
    let keyword = serde_json::to_value(reply.keyword)
        .ok()
        .map(|v| match v {
            Value::String(s) => s,
            Value::Object(map) => map.keys().next().cloned().unwrap_or_default(),
            other => other.to_string(),
        })
        .unwrap_or_default();
    WebhookOutcome::handled(event, keyword)
}
