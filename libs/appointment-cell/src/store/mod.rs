// libs/appointment-cell/src/store/mod.rs
//
// Persistence and directory ports used by the booking service, with an
// in-memory and a Supabase (PostgREST) implementation of each.

pub mod memory;
pub mod supabase;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use shared_models::error::StoreError;

use crate::models::{
    Appointment, AppointmentFilter, AuditLogEntry, AuditLogFilter, PatientRecord,
    ProfessionalRecord, RoomRecord, ServiceRecord,
};

pub use memory::{InMemoryAppointmentStore, InMemoryAuditLogStore, InMemoryDirectory};
pub use supabase::{SupabaseAppointmentStore, SupabaseAuditLogStore, SupabaseDirectory};

#[async_trait]
pub trait AppointmentStore: Send + Sync {
    /// Matching appointments ordered by start time.
    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError>;

    /// Looks up by id regardless of soft-delete state.
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError>;

    /// Insert or replace by id.
    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError>;

    async fn count_documents(&self, filter: &AppointmentFilter) -> Result<u64, StoreError>;
}

/// Append-only; entries are never updated or deleted.
#[async_trait]
pub trait AuditLogStore: Send + Sync {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError>;

    /// Matching entries ordered oldest first.
    async fn find(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>, StoreError>;

    async fn count_documents(&self, filter: &AuditLogFilter) -> Result<u64, StoreError>;
}

#[async_trait]
pub trait Directory: Send + Sync {
    async fn find_patient(&self, id: Uuid) -> Result<Option<PatientRecord>, StoreError>;
    async fn find_professional(&self, id: Uuid) -> Result<Option<ProfessionalRecord>, StoreError>;
    async fn find_service(&self, id: Uuid) -> Result<Option<ServiceRecord>, StoreError>;
    async fn find_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError>;
}

/// Run a store call under `timeout`. On expiry the outcome of the call is
/// unknown and the caller has to re-read.
pub async fn bounded<T, F>(timeout: Duration, op: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    match tokio::time::timeout(timeout, op).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(timeout)),
    }
}
