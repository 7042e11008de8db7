use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use shared_config::AppConfig;

use crate::error::MessagingError;
use crate::models::{
    DeliveryStatus, ProviderReceipt, TelnyxCallData, TelnyxCallRequest, TelnyxEnvelope,
    TelnyxMessageData, TelnyxMessageRequest, TelnyxSpeakRequest,
};
use crate::services::ProviderGateway;

const PROVIDER: &str = "telnyx";

/// Speech for a call that never reports back is dropped after this long.
const PENDING_SPEECH_TTL: Duration = Duration::from_secs(15 * 60);

struct PendingSpeech {
    text: String,
    dialed_at: Instant,
}

fn prune_expired(pending: &mut HashMap<String, PendingSpeech>, now: Instant) -> usize {
    let before = pending.len();
    pending.retain(|_, speech| now.duration_since(speech.dialed_at) < PENDING_SPEECH_TTL);
    before - pending.len()
}

/// Telnyx v2 REST client. Calls are two-step: the call is dialed first and the
/// text is spoken when the `call.answered` webhook arrives. A hangup or the
/// TTL releases speech for calls that are never answered.
pub struct TelnyxGateway {
    client: Client,
    api_key: String,
    from_number: String,
    messaging_profile_id: String,
    connection_id: String,
    base_url: String,
    pending_speech: Mutex<HashMap<String, PendingSpeech>>,
}

impl std::fmt::Debug for TelnyxGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelnyxGateway")
            .field("from_number", &self.from_number)
            .field("messaging_profile_id", &self.messaging_profile_id)
            .field("connection_id", &self.connection_id)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TelnyxGateway {
    pub fn new(config: &AppConfig) -> Result<Self, MessagingError> {
        if !config.is_telnyx_configured() {
            return Err(MessagingError::NotConfigured {
                provider: PROVIDER.to_string(),
            });
        }

        Ok(Self {
            client: Client::new(),
            api_key: config.telnyx_api_key.clone(),
            from_number: config.telnyx_phone_number.clone(),
            messaging_profile_id: config.telnyx_messaging_profile_id.clone(),
            connection_id: config.telnyx_connection_id.clone(),
            base_url: config.telnyx_base_url.trim_end_matches('/').to_string(),
            pending_speech: Mutex::new(HashMap::new()),
        })
    }

    async fn parse<T: DeserializeOwned>(&self, response: Response) -> Result<T, MessagingError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        if !status.is_success() {
            error!("Telnyx request failed: {} - {}", status, body);
            return Err(MessagingError::api(PROVIDER, format!("HTTP {}: {}", status, body)));
        }

        serde_json::from_str(&body)
            .map_err(|e| MessagingError::api(PROVIDER, format!("Failed to parse response: {}", e)))
    }

    pub async fn pending_call_count(&self) -> usize {
        self.pending_speech.lock().await.len()
    }
}

#[async_trait]
impl ProviderGateway for TelnyxGateway {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<ProviderReceipt, MessagingError> {
        let url = format!("{}/messages", self.base_url);
        debug!("Sending Telnyx SMS via {}", url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&TelnyxMessageRequest {
                from: &self.from_number,
                to,
                text: body,
                messaging_profile_id: &self.messaging_profile_id,
            })
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let envelope: TelnyxEnvelope<TelnyxMessageData> = self.parse(response).await?;
        let status = envelope
            .data
            .to
            .first()
            .and_then(|recipient| recipient.status.as_deref())
            .map(DeliveryStatus::from_provider)
            .unwrap_or(DeliveryStatus::Queued);

        info!("Telnyx accepted SMS {}", envelope.data.id);
        Ok(ProviderReceipt {
            message_id: envelope.data.id,
            status,
        })
    }

    async fn place_call(&self, to: &str, speech: &str) -> Result<ProviderReceipt, MessagingError> {
        let url = format!("{}/calls", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&TelnyxCallRequest {
                connection_id: &self.connection_id,
                to,
                from: &self.from_number,
            })
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let envelope: TelnyxEnvelope<TelnyxCallData> = self.parse(response).await?;
        let call_id = envelope.data.call_control_id;

        {
            let mut pending = self.pending_speech.lock().await;
            let expired = prune_expired(&mut pending, Instant::now());
            if expired > 0 {
                warn!("Dropped speech for {} Telnyx calls that never reported back", expired);
            }
            pending.insert(
                call_id.clone(),
                PendingSpeech {
                    text: speech.to_string(),
                    dialed_at: Instant::now(),
                },
            );
        }

        info!("Telnyx call {} dialed, speech pending answer", call_id);
        Ok(ProviderReceipt {
            message_id: call_id,
            status: DeliveryStatus::Queued,
        })
    }

    async fn delivery_status(&self, message_id: &str) -> Result<DeliveryStatus, MessagingError> {
        let url = format!("{}/messages/{}", self.base_url, message_id);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let envelope: TelnyxEnvelope<TelnyxMessageData> = self.parse(response).await?;
        Ok(envelope
            .data
            .to
            .first()
            .and_then(|recipient| recipient.status.as_deref())
            .map(DeliveryStatus::from_provider)
            .unwrap_or(DeliveryStatus::Unknown))
    }

    async fn on_call_answered(&self, call_id: &str) -> Result<bool, MessagingError> {
        let Some(speech) = self.pending_speech.lock().await.remove(call_id) else {
            return Ok(false);
        };

        let url = format!("{}/calls/{}/actions/speak", self.base_url, call_id);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&TelnyxSpeakRequest {
                payload: &speech.text,
                voice: "female",
                language: "en-US",
            })
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!("Telnyx speak failed on call {}: {} - {}", call_id, status, body);
            return Err(MessagingError::api(PROVIDER, format!("HTTP {}: {}", status, body)));
        }

        info!("Spoke pending message on Telnyx call {}", call_id);
        Ok(true)
    }

    async fn on_call_ended(&self, call_id: &str) -> bool {
        let released = self.pending_speech.lock().await.remove(call_id).is_some();
        if released {
            info!("Telnyx call {} ended before it was answered, speech dropped", call_id);
        }
        released
    }
}
