use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use audit_cell::{message_body_field, AuditEntry, AuditEventType, AuditOutcome, AuditSink};
use shared_models::Severity;
use shared_utils::JobScheduler;

use crate::error::MessagingError;
use crate::models::{
    DeliveryStatus, MessageRequest, MessageResponse, MessageType, ProviderReceipt,
    MAX_ESCALATION_DELAY_MINUTES,
};
use crate::services::ProviderGateway;
use crate::templates::TemplateRegistry;

/// Delivers messages through the configured gateways in priority order.
/// Cloning is cheap; every field is shared.
#[derive(Clone)]
pub struct NotificationDispatcher {
    gateways: Arc<Vec<Arc<dyn ProviderGateway>>>,
    templates: Arc<TemplateRegistry>,
    audit: Arc<dyn AuditSink>,
    scheduler: JobScheduler,
    provider_timeout: Duration,
    include_body_in_audit: bool,
    phone_pattern: Option<Regex>,
}

impl NotificationDispatcher {
    pub fn new(
        gateways: Vec<Arc<dyn ProviderGateway>>,
        audit: Arc<dyn AuditSink>,
        scheduler: JobScheduler,
    ) -> Self {
        Self {
            gateways: Arc::new(gateways),
            templates: Arc::new(TemplateRegistry::new()),
            audit,
            scheduler,
            provider_timeout: Duration::from_secs(10),
            include_body_in_audit: false,
            phone_pattern: Regex::new(r"^\+?[1-9]\d{7,14}$").ok(),
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_message_bodies_in_audit(mut self, include: bool) -> Self {
        self.include_body_in_audit = include;
        self
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn scheduler(&self) -> &JobScheduler {
        &self.scheduler
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.gateways.iter().map(|g| g.name()).collect()
    }

    /// Delivers the request and, for a failed critical send carrying
    /// escalation rules, installs one timer per rule.
    #[instrument(skip(self, request), fields(to = %request.to, message_type = %request.message_type))]
    pub async fn send(&self, request: MessageRequest) -> Result<MessageResponse, MessagingError> {
        let needs_rules = request.priority == Severity::Critical && !request.escalation_rules.is_empty();
        let rule_request = if needs_rules { Some(request.clone()) } else { None };

        let mut response = self.deliver(request).await?;

        if let Some(request) = rule_request {
            if !response.success {
                let incident_id = self.schedule_rule_timers(&request);
                response.incident_id = Some(incident_id);
            }
        }

        Ok(response)
    }

    /// Delivery without rule processing. Provider failures come back as
    /// `success: false`; only malformed requests are errors.
    #[instrument(skip(self, request), fields(to = %request.to))]
    pub async fn deliver(&self, request: MessageRequest) -> Result<MessageResponse, MessagingError> {
        let text = self.compose(&request)?;
        self.validate(&request, &text)?;

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::MessageDispatchAttempted,
                    format!("{} dispatch attempted", request.message_type),
                    AuditOutcome::Info,
                )
                .with_optional_patient(request.patient_id.as_deref())
                .add_context("recipient", &request.to)
                .add_context("category", &request.category)
                .add_context("priority", request.priority)
                .add_context("template", &request.template)
                .add_context("message", message_body_field(&text, self.include_body_in_audit)),
            )
            .await;

        let response = match request.message_type {
            MessageType::Email => {
                info!("Email channel is a stub, reporting success for {}", request.to);
                MessageResponse::delivered(
                    "email",
                    ProviderReceipt {
                        message_id: format!("email-{}", Uuid::new_v4()),
                        status: DeliveryStatus::Sent,
                    },
                )
            }
            MessageType::Sms | MessageType::Voice => {
                self.send_with_failover(request.message_type, &request.to, &text)
                    .await?
            }
        };

        if response.success {
            info!(provider = %response.provider, "Message delivered");
        } else if request.priority == Severity::Critical {
            error!(
                to = %request.to,
                error = ?response.error,
                "Critical message could not be delivered by any provider"
            );
        }

        self.audit
            .record(
                AuditEntry::new(
                    AuditEventType::MessageDispatchCompleted,
                    format!("{} dispatch {}", request.message_type, if response.success { "succeeded" } else { "failed" }),
                    if response.success { AuditOutcome::Success } else { AuditOutcome::Failure },
                )
                .with_optional_patient(request.patient_id.as_deref())
                .add_context("recipient", &request.to)
                .add_context("category", &request.category)
                .add_context("priority", request.priority)
                .add_context("template", &request.template)
                .add_context("provider", &response.provider)
                .add_context("success", response.success)
                .add_context("message_id", &response.message_id)
                .add_context("error", &response.error),
            )
            .await;

        Ok(response)
    }

    fn compose(&self, request: &MessageRequest) -> Result<String, MessagingError> {
        match &request.template {
            Some(name) => self.templates.render(name, &request.variables),
            None => Ok(self.templates.substitute(&request.message, &request.variables)),
        }
    }

    fn validate(&self, request: &MessageRequest, text: &str) -> Result<(), MessagingError> {
        if request.to.trim().is_empty() {
            return Err(MessagingError::ValidationError("Recipient is required".to_string()));
        }
        if text.trim().is_empty() {
            return Err(MessagingError::ValidationError("Message text is required".to_string()));
        }
        if request.message_type != MessageType::Email {
            if let Some(pattern) = &self.phone_pattern {
                if !pattern.is_match(&request.to) {
                    return Err(MessagingError::ValidationError(format!(
                        "Invalid phone number: {}",
                        request.to
                    )));
                }
            }
        }
        if let Some(rule) = request
            .escalation_rules
            .iter()
            .find(|rule| rule.delay > MAX_ESCALATION_DELAY_MINUTES)
        {
            return Err(MessagingError::ValidationError(format!(
                "Escalation delay {} exceeds {} minutes",
                rule.delay, MAX_ESCALATION_DELAY_MINUTES
            )));
        }
        Ok(())
    }

    /// Strict priority order: each gateway is tried at most once and only
    /// after the previous one failed or timed out.
    async fn send_with_failover(
        &self,
        channel: MessageType,
        to: &str,
        text: &str,
    ) -> Result<MessageResponse, MessagingError> {
        if self.gateways.is_empty() {
            return Err(MessagingError::NotConfigured {
                provider: "sms/voice".to_string(),
            });
        }

        let mut failures = Vec::with_capacity(self.gateways.len());
        for gateway in self.gateways.iter() {
            let attempt = match channel {
                MessageType::Voice => gateway.place_call(to, text),
                _ => gateway.send_sms(to, text),
            };

            match tokio::time::timeout(self.provider_timeout, attempt).await {
                Ok(Ok(receipt)) => {
                    if !failures.is_empty() {
                        warn!(provider = %gateway.name(), "Delivered via backup provider");
                    }
                    return Ok(MessageResponse::delivered(gateway.name(), receipt));
                }
                Ok(Err(e)) => {
                    warn!(provider = %gateway.name(), "Provider attempt failed: {}", e);
                    failures.push(format!("{}: {}", gateway.name(), e));
                }
                Err(_) => {
                    warn!(provider = %gateway.name(), "Provider attempt timed out");
                    failures.push(format!(
                        "{}: timed out after {}s",
                        gateway.name(),
                        self.provider_timeout.as_secs()
                    ));
                }
            }
        }

        let last = self.gateways.last().map(|g| g.name()).unwrap_or("none");
        Ok(MessageResponse::failed(
            last,
            format!("All providers failed. {}", failures.join("; ")),
            true,
        ))
    }

    /// One one-shot timer per rule, keyed `{incident}_rule{N}` in the
    /// incident's group. Returns the incident id used.
    fn schedule_rule_timers(&self, request: &MessageRequest) -> String {
        let incident_id = request
            .incident_id
            .clone()
            .unwrap_or_else(|| format!("incident_{}", Uuid::new_v4()));
        let now = self.scheduler.clock().now();

        for (index, rule) in request.escalation_rules.iter().enumerate() {
            let key = format!("{}_rule{}", incident_id, index + 1);
            let Some(fire_at) = i64::try_from(rule.delay)
                .ok()
                .and_then(chrono::Duration::try_minutes)
                .and_then(|delay| now.checked_add_signed(delay))
            else {
                error!(key = %key, delay_minutes = rule.delay, "Escalation rule delay out of range, skipped");
                continue;
            };

            let mut follow_up = MessageRequest::new(rule.method, &rule.recipient, &rule.message)
                .with_priority(Severity::Critical)
                .with_category("escalation");
            follow_up.patient_id = request.patient_id.clone();
            follow_up.incident_id = Some(incident_id.clone());

            let dispatcher = self.clone();
            let installed = self.scheduler.schedule_once_if_absent(&key, &incident_id, fire_at, async move {
                match dispatcher.deliver(follow_up).await {
                    Ok(response) if response.success => info!("Escalation rule delivered"),
                    Ok(response) => error!("Escalation rule delivery failed: {:?}", response.error),
                    Err(e) => error!("Escalation rule rejected: {}", e),
                }
            });

            if installed {
                info!(key = %key, delay_minutes = rule.delay, "Escalation rule scheduled");
            }
        }

        incident_id
    }

    pub async fn delivery_status(&self, provider: &str, message_id: &str) -> Result<DeliveryStatus, MessagingError> {
        let gateway = self
            .gateways
            .iter()
            .find(|g| g.name().eq_ignore_ascii_case(provider))
            .ok_or_else(|| MessagingError::UnknownProvider(provider.to_string()))?;

        gateway.delivery_status(message_id).await
    }

    /// Releases whatever a gateway still holds for a call that ended.
    pub async fn handle_call_ended(&self, call_id: &str) -> bool {
        for gateway in self.gateways.iter() {
            if gateway.on_call_ended(call_id).await {
                return true;
            }
        }
        false
    }

    /// Routes a `call.answered` event to whichever gateway dialed the call.
    pub async fn handle_call_answered(&self, call_id: &str) -> Result<bool, MessagingError> {
        for gateway in self.gateways.iter() {
            if gateway.on_call_answered(call_id).await? {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
