use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use shared_config::AppConfig;

use crate::error::MessagingError;
use crate::models::{DeliveryStatus, ProviderReceipt};
use crate::services::{TelnyxGateway, TwilioGateway};

/// One telephony vendor. Implementations hide the vendor's request shapes and
/// turn every vendor failure into a `MessagingError`.
#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn name(&self) -> &'static str;

    async fn send_sms(&self, to: &str, body: &str) -> Result<ProviderReceipt, MessagingError>;

    /// Places a call that speaks `speech` once answered.
    async fn place_call(&self, to: &str, speech: &str) -> Result<ProviderReceipt, MessagingError>;

    async fn delivery_status(&self, message_id: &str) -> Result<DeliveryStatus, MessagingError>;

    /// Called when the vendor reports a call as answered. Returns whether this
    /// gateway had something to say on that call.
    async fn on_call_answered(&self, _call_id: &str) -> Result<bool, MessagingError> {
        Ok(false)
    }

    /// Called when the vendor reports a call as over without (or after) an
    /// answer. Returns whether this gateway was still holding speech for it.
    async fn on_call_ended(&self, _call_id: &str) -> bool {
        false
    }
}

/// Configured gateways in priority order; the primary provider comes first.
pub fn gateways_from_config(config: &AppConfig) -> Vec<Arc<dyn ProviderGateway>> {
    let mut gateways: Vec<Arc<dyn ProviderGateway>> = Vec::new();

    match TelnyxGateway::new(config) {
        Ok(gateway) => gateways.push(Arc::new(gateway)),
        Err(e) => warn!("Telnyx gateway disabled: {}", e),
    }
    match TwilioGateway::new(config) {
        Ok(gateway) => gateways.push(Arc::new(gateway)),
        Err(e) => warn!("Twilio gateway disabled: {}", e),
    }

    if config.twilio_is_primary() {
        gateways.reverse();
    }
    gateways
}
