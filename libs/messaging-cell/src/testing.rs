//! In-process gateway for tests of this crate and the cells built on it.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use audit_cell::AuditSink;
use shared_utils::JobScheduler;

use crate::error::MessagingError;
use crate::models::{DeliveryStatus, MessageType, ProviderReceipt};
use crate::services::{NotificationDispatcher, ProviderGateway};

/// Dispatcher over scripted gateways, tried in the given order.
pub fn scripted_dispatcher(
    gateways: &[Arc<ScriptedGateway>],
    audit: Arc<dyn AuditSink>,
    scheduler: JobScheduler,
) -> NotificationDispatcher {
    let gateways: Vec<Arc<dyn ProviderGateway>> = gateways
        .iter()
        .map(|gateway| Arc::clone(gateway) as Arc<dyn ProviderGateway>)
        .collect();
    NotificationDispatcher::new(gateways, audit, scheduler)
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedOutcome {
    Accept,
    Fail(String),
    /// Never answers; exercises the dispatcher's timeout.
    Hang,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub channel: MessageType,
    pub to: String,
    pub body: String,
}

/// Gateway that plays back queued outcomes, then falls back to a default.
pub struct ScriptedGateway {
    name: &'static str,
    script: Mutex<VecDeque<ScriptedOutcome>>,
    default: ScriptedOutcome,
    attempts: Mutex<Vec<SentMessage>>,
    answered: Mutex<Vec<String>>,
    ended: Mutex<Vec<String>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl ScriptedGateway {
    pub fn accepting(name: &'static str) -> Self {
        Self::with_default(name, ScriptedOutcome::Accept)
    }

    pub fn failing(name: &'static str) -> Self {
        Self::with_default(name, ScriptedOutcome::Fail(format!("{} unavailable", name)))
    }

    pub fn hanging(name: &'static str) -> Self {
        Self::with_default(name, ScriptedOutcome::Hang)
    }

    pub fn with_default(name: &'static str, default: ScriptedOutcome) -> Self {
        Self {
            name,
            script: Mutex::new(VecDeque::new()),
            default,
            attempts: Mutex::new(Vec::new()),
            answered: Mutex::new(Vec::new()),
            ended: Mutex::new(Vec::new()),
        }
    }

    /// Queues an outcome for the next attempt.
    pub fn then(self, outcome: ScriptedOutcome) -> Self {
        lock(&self.script).push_back(outcome);
        self
    }

    /// Every attempt, successful or not, in order.
    pub fn attempts(&self) -> Vec<SentMessage> {
        lock(&self.attempts).clone()
    }

    pub fn attempt_count(&self) -> usize {
        lock(&self.attempts).len()
    }

    pub fn attempts_to(&self, to: &str) -> Vec<SentMessage> {
        lock(&self.attempts)
            .iter()
            .filter(|m| m.to == to)
            .cloned()
            .collect()
    }

    pub fn answered_calls(&self) -> Vec<String> {
        lock(&self.answered).clone()
    }

    pub fn ended_calls(&self) -> Vec<String> {
        lock(&self.ended).clone()
    }

    async fn play(&self, channel: MessageType, to: &str, body: &str) -> Result<ProviderReceipt, MessagingError> {
        lock(&self.attempts).push(SentMessage {
            channel,
            to: to.to_string(),
            body: body.to_string(),
        });

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or_else(|| self.default.clone());

        match outcome {
            ScriptedOutcome::Accept => Ok(ProviderReceipt {
                message_id: format!("{}-{}", self.name, Uuid::new_v4()),
                status: DeliveryStatus::Queued,
            }),
            ScriptedOutcome::Fail(message) => Err(MessagingError::api(self.name, message)),
            ScriptedOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(24 * 60 * 60)).await;
                Err(MessagingError::api(self.name, "hung"))
            }
        }
    }
}

#[async_trait]
impl ProviderGateway for ScriptedGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn send_sms(&self, to: &str, body: &str) -> Result<ProviderReceipt, MessagingError> {
        self.play(MessageType::Sms, to, body).await
    }

    async fn place_call(&self, to: &str, speech: &str) -> Result<ProviderReceipt, MessagingError> {
        self.play(MessageType::Voice, to, speech).await
    }

    async fn delivery_status(&self, _message_id: &str) -> Result<DeliveryStatus, MessagingError> {
        Ok(DeliveryStatus::Delivered)
    }

    async fn on_call_answered(&self, call_id: &str) -> Result<bool, MessagingError> {
        lock(&self.answered).push(call_id.to_string());
        Ok(call_id.starts_with(self.name))
    }

    async fn on_call_ended(&self, call_id: &str) -> bool {
        lock(&self.ended).push(call_id.to_string());
        call_id.starts_with(self.name)
    }
}
