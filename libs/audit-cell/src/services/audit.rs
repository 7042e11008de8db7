// =====================================================================================
// AUDIT SERVICE - HIPAA COMPLIANT NOTIFICATION AUDIT TRAIL
// =====================================================================================

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::models::{AuditEntry, AuditEventType, AuditOutcome};
use shared_config::AppConfig;
use shared_database::SupabaseClient;

const FLUSH_THRESHOLD: usize = 100;

/// Accepts structured audit records. Recording never fails the caller.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry);
}

/// Message bodies may carry PHI; unless explicitly enabled only the length is kept.
pub fn message_body_field(body: &str, include_body: bool) -> serde_json::Value {
    if include_body {
        json!(body)
    } else {
        json!(format!("[redacted: {} chars]", body.chars().count()))
    }
}

pub struct AuditService {
    supabase: Option<SupabaseClient>,
    audit_buffer: Arc<RwLock<Vec<AuditEntry>>>,
    /// Queryable copy of every entry, kept only by `in_memory()`.
    history: Option<Arc<RwLock<Vec<AuditEntry>>>>,
}

impl AuditService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = if config.is_store_configured() {
            Some(SupabaseClient::new(config))
        } else {
            None
        };

        Self {
            supabase,
            audit_buffer: Arc::new(RwLock::new(Vec::new())),
            history: None,
        }
    }

    /// Buffer-only sink, nothing leaves the process. Entries stay
    /// queryable through the `entries_*` accessors.
    pub fn in_memory() -> Self {
        Self {
            supabase: None,
            audit_buffer: Arc::new(RwLock::new(Vec::new())),
            history: Some(Arc::new(RwLock::new(Vec::new()))),
        }
    }

    /// Flushes the buffer every `every` so a quiet period never leaves
    /// entries waiting for the size threshold.
    pub fn spawn_periodic_flush(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let audit = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = audit.flush_audit_buffer().await {
                    warn!("Periodic audit flush failed: {}", e);
                }
            }
        })
    }

    pub async fn pending_entries(&self) -> usize {
        self.audit_buffer.read().await.len()
    }

    #[instrument(skip(self, entry))]
    pub async fn log_audit_entry(&self, entry: AuditEntry) -> Result<()> {
        self.log_to_tracing(&entry);

        if let Some(history) = &self.history {
            history.write().await.push(entry.clone());
        }

        let should_flush = {
            let mut buffer = self.audit_buffer.write().await;
            buffer.push(entry);
            buffer.len() >= FLUSH_THRESHOLD
        };

        if should_flush {
            self.flush_audit_buffer().await?;
        }

        Ok(())
    }

    fn log_to_tracing(&self, entry: &AuditEntry) {
        match entry.outcome {
            AuditOutcome::Success => {
                info!(
                    event_id = %entry.event_id,
                    event_type = ?entry.event_type,
                    patient_id = ?entry.patient_id,
                    actor = ?entry.actor,
                    "AUDIT: {}", entry.action
                );
            }
            AuditOutcome::Failure | AuditOutcome::Denied => {
                warn!(
                    event_id = %entry.event_id,
                    event_type = ?entry.event_type,
                    patient_id = ?entry.patient_id,
                    outcome = ?entry.outcome,
                    "AUDIT FAILURE: {}", entry.action
                );
            }
            AuditOutcome::Info => {
                debug!(
                    event_id = %entry.event_id,
                    event_type = ?entry.event_type,
                    "AUDIT: {}", entry.action
                );
            }
        }
    }

    #[instrument(skip(self))]
    pub async fn flush_audit_buffer(&self) -> Result<()> {
        let entries = {
            let mut buffer = self.audit_buffer.write().await;
            std::mem::take(&mut *buffer)
        };

        if entries.is_empty() {
            return Ok(());
        }

        match &self.supabase {
            Some(client) => {
                let rows = serde_json::to_value(&entries)?;
                if let Err(e) = client
                    .execute(
                        Method::POST,
                        "/rest/v1/audit_logs",
                        &[],
                        Some(rows),
                        Some("return=minimal"),
                    )
                    .await
                {
                    // Put the batch back so the next flush retries it.
                    error!("Failed to persist {} audit entries: {}", entries.len(), e);
                    let mut buffer = self.audit_buffer.write().await;
                    let newer = std::mem::take(&mut *buffer);
                    *buffer = entries;
                    buffer.extend(newer);
                    return Err(e);
                }
                info!("Flushed {} audit entries to persistent storage", entries.len());
            }
            None => {
                debug!("Dropping {} buffered audit entries (no persistent store)", entries.len());
            }
        }

        Ok(())
    }

    pub async fn entries_for_patient(&self, patient_id: &str, limit: Option<usize>) -> Vec<AuditEntry> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        history
            .read()
            .await
            .iter()
            .filter(|entry| entry.patient_id.as_deref() == Some(patient_id))
            .take(limit.unwrap_or(100))
            .cloned()
            .collect()
    }

    pub async fn entries_of_type(&self, event_type: AuditEventType) -> Vec<AuditEntry> {
        let Some(history) = &self.history else {
            return Vec::new();
        };
        history
            .read()
            .await
            .iter()
            .filter(|entry| entry.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn all_entries(&self) -> Vec<AuditEntry> {
        match &self.history {
            Some(history) => history.read().await.clone(),
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl AuditSink for AuditService {
    async fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.log_audit_entry(entry).await {
            error!("Audit sink error: {}", e);
        }
    }
}
