use async_trait::async_trait;
use reqwest::{Client, Response};
use tracing::{debug, error, info};

use shared_config::AppConfig;

use crate::error::MessagingError;
use crate::models::{DeliveryStatus, ProviderReceipt, TwilioErrorBody, TwilioResource};
use crate::services::ProviderGateway;

const PROVIDER: &str = "twilio";

/// Twilio REST client (2010-04-01 API, form encoded, basic auth).
pub struct TwilioGateway {
    client: Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
    base_url: String,
}

impl TwilioGateway {
    pub fn new(config: &AppConfig) -> Result<Self, MessagingError> {
        if !config.is_twilio_configured() {
            return Err(MessagingError::NotConfigured {
                provider: PROVIDER.to_string(),
            });
        }

        Ok(Self {
            client: Client::new(),
            account_sid: config.twilio_account_sid.clone(),
            auth_token: config.twilio_auth_token.clone(),
            from_number: config.twilio_phone_number.clone(),
            base_url: config.twilio_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn account_url(&self, resource: &str) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/{}",
            self.base_url, self.account_sid, resource
        )
    }

    async fn parse(&self, response: Response) -> Result<TwilioResource, MessagingError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        if !status.is_success() {
            error!("Twilio request failed: {} - {}", status, body);
            let detail = serde_json::from_str::<TwilioErrorBody>(&body)
                .ok()
                .and_then(|err| {
                    err.message
                        .map(|message| format!("{} (code {})", message, err.code.unwrap_or_default()))
                })
                .unwrap_or(body);
            return Err(MessagingError::api(PROVIDER, format!("HTTP {}: {}", status, detail)));
        }

        serde_json::from_str(&body)
            .map_err(|e| MessagingError::api(PROVIDER, format!("Failed to parse response: {}", e)))
    }
}

/// TwiML that reads `speech` aloud.
pub fn say_twiml(speech: &str) -> String {
    let escaped = speech
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;");
    format!(
        "<Response><Say voice=\"alice\">{}</Say></Response>",
        escaped
    )
}

#[async_trait]
impl ProviderGateway for TwilioGateway {
    fn name(&self) -> &'static str {
        PROVIDER
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<ProviderReceipt, MessagingError> {
        let url = self.account_url("Messages.json");
        debug!("Sending Twilio SMS via {}", url);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", self.from_number.as_str()), ("Body", body)])
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let resource = self.parse(response).await?;
        info!("Twilio accepted SMS {}", resource.sid);

        Ok(ProviderReceipt {
            status: resource
                .status
                .as_deref()
                .map(DeliveryStatus::from_provider)
                .unwrap_or(DeliveryStatus::Queued),
            message_id: resource.sid,
        })
    }

    async fn place_call(&self, to: &str, speech: &str) -> Result<ProviderReceipt, MessagingError> {
        let url = self.account_url("Calls.json");
        let twiml = say_twiml(speech);

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[
                ("To", to),
                ("From", self.from_number.as_str()),
                ("Twiml", twiml.as_str()),
            ])
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let resource = self.parse(response).await?;
        info!("Twilio placed call {}", resource.sid);

        Ok(ProviderReceipt {
            status: resource
                .status
                .as_deref()
                .map(DeliveryStatus::from_provider)
                .unwrap_or(DeliveryStatus::Queued),
            message_id: resource.sid,
        })
    }

    async fn delivery_status(&self, message_id: &str) -> Result<DeliveryStatus, MessagingError> {
        let url = self.account_url(&format!("Messages/{}.json", message_id));

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .send()
            .await
            .map_err(|e| MessagingError::transport(PROVIDER, e))?;

        let resource = self.parse(response).await?;
        Ok(resource
            .status
            .as_deref()
            .map(DeliveryStatus::from_provider)
            .unwrap_or(DeliveryStatus::Unknown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_twiml_escapes_markup() {
        assert_eq!(
            say_twiml("BP <180> & rising"),
            "<Response><Say voice=\"alice\">BP &lt;180&gt; &amp; rising</Say></Response>"
        );
    }
}
