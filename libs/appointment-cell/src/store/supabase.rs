// libs/appointment-cell/src/store/supabase.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::{SupabaseClient, PREFER_INSERT, PREFER_UPSERT};
use shared_models::error::StoreError;

use crate::models::{
    Appointment, AppointmentFilter, AuditLogEntry, AuditLogFilter, PatientRecord,
    ProfessionalRecord, RiskLevel, RoomRecord, ServiceRecord,
};
use crate::store::{AppointmentStore, AuditLogStore, Directory};

const APPOINTMENTS: &str = "/rest/v1/appointments";
const AUDIT_LOGS: &str = "/rest/v1/audit_logs";

fn encode_time(time: DateTime<Utc>) -> String {
    urlencoding::encode(&time.to_rfc3339_opts(SecondsFormat::Millis, true)).into_owned()
}

fn with_query(base: &str, parts: &[String]) -> String {
    if parts.is_empty() {
        base.to_string()
    } else {
        format!("{}?{}", base, parts.join("&"))
    }
}

fn parse_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(StoreError::from)
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(Arc::new(SupabaseClient::new(config)))
    }

    fn filter_parts(filter: &AppointmentFilter) -> Vec<String> {
        let mut query_parts = Vec::new();

        if let Some(professional_id) = filter.professional_id {
            query_parts.push(format!("professional_id=eq.{}", professional_id));
        }
        if let Some(patient_id) = filter.patient_id {
            query_parts.push(format!("patient_id=eq.{}", patient_id));
        }
        if let Some(room_id) = filter.room_id {
            query_parts.push(format!("room_id=eq.{}", room_id));
        }
        if let Some(statuses) = &filter.statuses {
            let list: Vec<String> = statuses.iter().map(|s| s.to_string()).collect();
            query_parts.push(format!("status=in.({})", list.join(",")));
        }
        if let Some(before) = filter.starts_before {
            query_parts.push(format!("start_time=lt.{}", encode_time(before)));
        }
        if let Some(after) = filter.ends_after {
            query_parts.push(format!("end_time=gt.{}", encode_time(after)));
        }
        if !filter.include_deleted {
            query_parts.push("deleted_at=is.null".to_string());
        }

        query_parts
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let mut query_parts = Self::filter_parts(filter);
        query_parts.push("order=start_time.asc".to_string());
        if let Some(limit) = filter.limit {
            query_parts.push(format!("limit={}", limit));
        }
        if let Some(offset) = filter.offset {
            query_parts.push(format!("offset={}", offset));
        }

        let path = with_query(APPOINTMENTS, &query_parts);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, self.supabase.service_token(), None)
            .await?;

        debug!("Fetched {} appointment rows", rows.len());
        parse_rows(rows)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        let path = format!("{}?id=eq.{}&limit=1", APPOINTMENTS, id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, self.supabase.service_token(), None)
            .await?;

        Ok(parse_rows(rows)?.into_iter().next())
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        let body = serde_json::to_value(appointment)?;
        self.supabase
            .execute(Method::POST, APPOINTMENTS, self.supabase.service_token(), Some(body), PREFER_UPSERT)
            .await
    }

    async fn count_documents(&self, filter: &AppointmentFilter) -> Result<u64, StoreError> {
        let mut query_parts = vec!["select=id".to_string()];
        query_parts.extend(Self::filter_parts(filter));
        let path = with_query(APPOINTMENTS, &query_parts);
        self.supabase.count(&path, self.supabase.service_token()).await
    }
}

// ==============================================================================
// AUDIT LOGS
// ==============================================================================

pub struct SupabaseAuditLogStore {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAuditLogStore {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn filter_parts(filter: &AuditLogFilter) -> Vec<String> {
        let mut query_parts = Vec::new();

        if let Some(entity_id) = filter.entity_id {
            query_parts.push(format!("entity_id=eq.{}", entity_id));
        }
        if let Some(actor_id) = filter.actor_id {
            query_parts.push(format!("actor_id=eq.{}", actor_id));
        }
        if let Some(action) = filter.action {
            query_parts.push(format!("action=eq.{}", action));
        }
        if let Some(min_risk) = filter.min_risk_level {
            let levels: Vec<&str> = [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High]
                .into_iter()
                .filter(|level| *level >= min_risk)
                .map(|level| match level {
                    RiskLevel::Low => "low",
                    RiskLevel::Medium => "medium",
                    RiskLevel::High => "high",
                })
                .collect();
            query_parts.push(format!("risk_level=in.({})", levels.join(",")));
        }
        if let Some(since) = filter.since {
            query_parts.push(format!("timestamp=gte.{}", encode_time(since)));
        }

        query_parts
    }
}

#[async_trait]
impl AuditLogStore for SupabaseAuditLogStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let body = serde_json::to_value(entry)?;
        self.supabase
            .execute(Method::POST, AUDIT_LOGS, self.supabase.service_token(), Some(body), PREFER_INSERT)
            .await
    }

    async fn find(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let mut query_parts = Self::filter_parts(filter);
        query_parts.push("order=timestamp.asc".to_string());

        let path = with_query(AUDIT_LOGS, &query_parts);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, self.supabase.service_token(), None)
            .await?;

        parse_rows(rows)
    }

    async fn count_documents(&self, filter: &AuditLogFilter) -> Result<u64, StoreError> {
        let mut query_parts = vec!["select=id".to_string()];
        query_parts.extend(Self::filter_parts(filter));
        let path = with_query(AUDIT_LOGS, &query_parts);
        self.supabase.count(&path, self.supabase.service_token()).await
    }
}

// ==============================================================================
// DIRECTORY
// ==============================================================================

pub struct SupabaseDirectory {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseDirectory {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    async fn find_one<T: DeserializeOwned>(&self, table: &str, id: Uuid) -> Result<Option<T>, StoreError> {
        let path = format!("/rest/v1/{}?id=eq.{}&limit=1", table, id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, self.supabase.service_token(), None)
            .await?;

        match rows.into_iter().next() {
            Some(row) => Ok(Some(serde_json::from_value(row)?)),
            None => {
                debug!("No {} row with id {}", table, id);
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl Directory for SupabaseDirectory {
    async fn find_patient(&self, id: Uuid) -> Result<Option<PatientRecord>, StoreError> {
        self.find_one("patients", id).await
    }

    async fn find_professional(&self, id: Uuid) -> Result<Option<ProfessionalRecord>, StoreError> {
        self.find_one("professionals", id).await
    }

    async fn find_service(&self, id: Uuid) -> Result<Option<ServiceRecord>, StoreError> {
        self.find_one("services", id).await
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError> {
        self.find_one("rooms", id).await
    }
}
