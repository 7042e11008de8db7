use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE},
    Client, Method,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_models::{
    CareTeamMember, DeliveryStatusUpdate, EscalationRecord, PatientContact, PatientSchedule,
    PatientThresholdOverride, ScheduledMessage, VitalReading,
};

use crate::store::ClinicalStore;

pub struct SupabaseClient {
    client: Client,
    base_url: String,
    anon_key: String,
}

impl SupabaseClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.supabase_url.clone(),
            anon_key: config.supabase_anon_key.clone(),
        }
    }

    fn get_headers(&self, prefer: Option<&str>) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();

        headers.insert("apikey", HeaderValue::from_str(&self.anon_key)?);
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.anon_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(prefer) = prefer {
            headers.insert("Prefer", HeaderValue::from_str(prefer)?);
        }

        Ok(headers)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url, path);
        debug!("Making request to {}", url);

        let mut req = self
            .client
            .request(method, &url)
            .headers(self.get_headers(prefer)?)
            .query(query);

        if let Some(body_data) = body {
            req = req.json(&body_data);
        }

        let response = req.send().await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            error!("API error ({}): {}", status, error_text);

            return Err(match status.as_u16() {
                401 | 403 => anyhow!("Authentication error: {}", error_text),
                404 => anyhow!("Resource not found: {}", error_text),
                _ => anyhow!("API error ({}): {}", status, error_text),
            });
        }

        Ok(response)
    }

    pub async fn request<T>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<T>
    where
        T: DeserializeOwned,
    {
        let response = self.send(method, path, query, body, prefer).await?;
        let data = response.json::<T>().await?;
        Ok(data)
    }

    /// Like `request` but ignores the response body (`Prefer: return=minimal`).
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
        prefer: Option<&str>,
    ) -> Result<()> {
        self.send(method, path, query, body, prefer).await?;
        Ok(())
    }

    pub fn get_base_url(&self) -> &str {
        &self.base_url
    }
}

#[derive(Deserialize)]
struct DocumentRow<T> {
    data: T,
}

/// PostgREST-backed store. Each table keeps its filter columns next to a
/// `data` jsonb column holding the full record.
pub struct SupabaseStore {
    client: SupabaseClient,
}

impl SupabaseStore {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: SupabaseClient::new(config),
        }
    }

    async fn select_documents<T: DeserializeOwned>(
        &self,
        table: &str,
        mut query: Vec<(&str, String)>,
    ) -> Result<Vec<T>> {
        query.push(("select", "data".to_string()));
        let rows: Vec<DocumentRow<T>> = self
            .client
            .request(Method::GET, &format!("/rest/v1/{}", table), &query, None, None)
            .await
            .with_context(|| format!("failed to read {}", table))?;
        Ok(rows.into_iter().map(|row| row.data).collect())
    }

    async fn upsert_document<T: Serialize>(
        &self,
        table: &str,
        conflict_columns: &str,
        mut columns: Value,
        document: &T,
    ) -> Result<()> {
        columns["data"] = serde_json::to_value(document)?;
        self.client
            .execute(
                Method::POST,
                &format!("/rest/v1/{}", table),
                &[("on_conflict", conflict_columns.to_string())],
                Some(columns),
                Some("resolution=merge-duplicates,return=minimal"),
            )
            .await
            .with_context(|| format!("failed to write {}", table))
    }
}

fn eq(value: &str) -> String {
    format!("eq.{}", value)
}

#[async_trait]
impl ClinicalStore for SupabaseStore {
    async fn active_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
    ) -> Result<Option<PatientThresholdOverride>> {
        let rows = self
            .select_documents(
                "patient_thresholds",
                vec![
                    ("patient_id", eq(patient_id)),
                    ("threshold_type", eq(threshold_type)),
                    ("is_active", eq("true")),
                    ("order", "updated_at.desc".to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn active_threshold_overrides(&self, patient_id: &str) -> Result<Vec<PatientThresholdOverride>> {
        self.select_documents(
            "patient_thresholds",
            vec![("patient_id", eq(patient_id)), ("is_active", eq("true"))],
        )
        .await
    }

    async fn upsert_threshold_override(
        &self,
        threshold: PatientThresholdOverride,
    ) -> Result<PatientThresholdOverride> {
        // Retire the previous active row so only one stays active per (patient, type).
        let previous: Vec<PatientThresholdOverride> = self
            .active_threshold_overrides(&threshold.patient_id)
            .await?
            .into_iter()
            .filter(|row| row.threshold_type == threshold.threshold_type && row.id != threshold.id)
            .collect();
        for mut row in previous {
            row.is_active = false;
            row.updated_by = threshold.updated_by.clone();
            row.updated_at = threshold.updated_at;
            self.upsert_threshold_row(&row).await?;
        }

        self.upsert_threshold_row(&threshold).await?;
        Ok(threshold)
    }

    async fn deactivate_threshold_override(
        &self,
        patient_id: &str,
        threshold_type: &str,
        updated_by: &str,
    ) -> Result<bool> {
        let active: Vec<PatientThresholdOverride> = self
            .active_threshold_overrides(patient_id)
            .await?
            .into_iter()
            .filter(|row| row.threshold_type == threshold_type)
            .collect();
        let changed = !active.is_empty();
        for mut row in active {
            row.is_active = false;
            row.updated_by = updated_by.to_string();
            row.updated_at = chrono::Utc::now();
            self.upsert_threshold_row(&row).await?;
        }
        Ok(changed)
    }

    async fn global_threshold(&self, key: &str) -> Result<Option<f64>> {
        #[derive(Deserialize)]
        struct SettingRow {
            value: Value,
        }

        let rows: Vec<SettingRow> = self
            .client
            .request(
                Method::GET,
                "/rest/v1/system_settings",
                &[("key", eq(key)), ("select", "value".to_string())],
                None,
                None,
            )
            .await?;

        Ok(rows.into_iter().next().and_then(|row| match row.value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }))
    }

    async fn patient_contact(&self, patient_id: &str) -> Result<Option<PatientContact>> {
        let rows = self
            .select_documents("patients", vec![("id", eq(patient_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn patient_by_phone(&self, phone: &str) -> Result<Option<PatientContact>> {
        let rows = self
            .select_documents("patients", vec![("phone", eq(phone)), ("limit", "1".to_string())])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn care_team(&self, patient_id: &str) -> Result<Vec<CareTeamMember>> {
        self.select_documents("care_team_assignments", vec![("patient_id", eq(patient_id))])
            .await
    }

    async fn insert_vital(&self, reading: VitalReading) -> Result<VitalReading> {
        self.upsert_document(
            "vital_signs",
            "id",
            json!({
                "id": reading.id,
                "patient_id": reading.patient_id,
                "measured_at": reading.measured_at.to_rfc3339(),
            }),
            &reading,
        )
        .await?;
        Ok(reading)
    }

    async fn recent_vitals(&self, patient_id: &str, limit: usize) -> Result<Vec<VitalReading>> {
        self.select_documents(
            "vital_signs",
            vec![
                ("patient_id", eq(patient_id)),
                ("order", "measured_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
        )
        .await
    }

    async fn save_schedule(&self, schedule: &PatientSchedule) -> Result<()> {
        self.upsert_document(
            "patient_schedules",
            "patient_id",
            json!({ "patient_id": schedule.patient_id, "active": schedule.active }),
            schedule,
        )
        .await
    }

    async fn schedule(&self, patient_id: &str) -> Result<Option<PatientSchedule>> {
        let rows = self
            .select_documents("patient_schedules", vec![("patient_id", eq(patient_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn active_schedules(&self) -> Result<Vec<PatientSchedule>> {
        self.select_documents("patient_schedules", vec![("active", eq("true"))])
            .await
    }

    async fn set_schedule_active(&self, patient_id: &str, active: bool) -> Result<bool> {
        match self.schedule(patient_id).await? {
            Some(mut schedule) => {
                schedule.active = active;
                self.save_schedule(&schedule).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn save_scheduled_message(&self, message: &ScheduledMessage) -> Result<()> {
        self.upsert_document(
            "scheduled_messages",
            "id",
            json!({
                "id": message.id,
                "patient_id": message.patient_id,
                "status": message.status,
            }),
            message,
        )
        .await
    }

    async fn scheduled_message(&self, id: &str) -> Result<Option<ScheduledMessage>> {
        let rows = self
            .select_documents("scheduled_messages", vec![("id", eq(id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn record_delivery_status(&self, update: DeliveryStatusUpdate) -> Result<()> {
        self.upsert_document(
            "message_delivery_status",
            "message_id",
            json!({
                "message_id": update.message_id,
                "provider": update.provider,
                "status": update.status,
            }),
            &update,
        )
        .await
    }

    async fn set_sms_opt_out(&self, phone: &str, opted_out: bool) -> Result<()> {
        self.client
            .execute(
                Method::POST,
                "/rest/v1/sms_opt_outs",
                &[("on_conflict", "phone".to_string())],
                Some(json!({ "phone": phone, "opted_out": opted_out })),
                Some("resolution=merge-duplicates,return=minimal"),
            )
            .await
    }

    async fn is_sms_opted_out(&self, phone: &str) -> Result<bool> {
        #[derive(Deserialize)]
        struct OptOutRow {
            opted_out: bool,
        }

        let rows: Vec<OptOutRow> = self
            .client
            .request(
                Method::GET,
                "/rest/v1/sms_opt_outs",
                &[("phone", eq(phone)), ("select", "opted_out".to_string())],
                None,
                None,
            )
            .await?;
        Ok(rows.first().map(|row| row.opted_out).unwrap_or(false))
    }

    async fn save_escalation(&self, record: &EscalationRecord) -> Result<()> {
        self.upsert_document(
            "escalations",
            "incident_id",
            json!({
                "incident_id": record.incident_id,
                "patient_id": record.patient_id,
                "acknowledged": record.is_acknowledged(),
            }),
            record,
        )
        .await
    }

    async fn escalation(&self, incident_id: &str) -> Result<Option<EscalationRecord>> {
        let rows = self
            .select_documents("escalations", vec![("incident_id", eq(incident_id))])
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn pending_escalations(&self) -> Result<Vec<EscalationRecord>> {
        let rows: Vec<EscalationRecord> = self
            .select_documents("escalations", vec![("acknowledged", eq("false"))])
            .await?;
        Ok(rows
            .into_iter()
            .filter(|record| !record.pending_levels().is_empty())
            .collect())
    }
}

impl SupabaseStore {
    async fn upsert_threshold_row(&self, row: &PatientThresholdOverride) -> Result<()> {
        self.upsert_document(
            "patient_thresholds",
            "id",
            json!({
                "id": row.id,
                "patient_id": row.patient_id,
                "threshold_type": row.threshold_type,
                "is_active": row.is_active,
                "updated_at": row.updated_at.to_rfc3339(),
            }),
            row,
        )
        .await
    }
}
