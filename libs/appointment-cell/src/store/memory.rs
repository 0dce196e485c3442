// libs/appointment-cell/src/store/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use shared_models::error::StoreError;

use crate::models::{
    Appointment, AppointmentFilter, AuditLogEntry, AuditLogFilter, PatientRecord,
    ProfessionalRecord, RoomRecord, ServiceRecord,
};
use crate::store::{AppointmentStore, AuditLogStore, Directory};

#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored row, soft-deleted ones included.
    pub async fn all(&self) -> Vec<Appointment> {
        let mut all: Vec<Appointment> = self.appointments.read().await.values().cloned().collect();
        all.sort_by_key(|a| a.start_time);
        all
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn find(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, StoreError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| filter.matches(a))
            .cloned()
            .collect();
        matching.sort_by_key(|a| (a.start_time, a.id));

        let offset = filter.offset.unwrap_or(0);
        let limit = filter.limit.unwrap_or(usize::MAX);
        Ok(matching.into_iter().skip(offset).take(limit).collect())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, StoreError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn save(&self, appointment: &Appointment) -> Result<(), StoreError> {
        self.appointments
            .write()
            .await
            .insert(appointment.id, appointment.clone());
        Ok(())
    }

    async fn count_documents(&self, filter: &AppointmentFilter) -> Result<u64, StoreError> {
        let appointments = self.appointments.read().await;
        Ok(appointments.values().filter(|a| filter.matches(a)).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryAuditLogStore {
    entries: RwLock<Vec<AuditLogEntry>>,
}

impl InMemoryAuditLogStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl AuditLogStore for InMemoryAuditLogStore {
    async fn append(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        self.entries.write().await.push(entry.clone());
        Ok(())
    }

    async fn find(&self, filter: &AuditLogFilter) -> Result<Vec<AuditLogEntry>, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| filter.matches(e)).cloned().collect())
    }

    async fn count_documents(&self, filter: &AuditLogFilter) -> Result<u64, StoreError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|e| filter.matches(e)).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryDirectory {
    patients: RwLock<HashMap<Uuid, PatientRecord>>,
    professionals: RwLock<HashMap<Uuid, ProfessionalRecord>>,
    services: RwLock<HashMap<Uuid, ServiceRecord>>,
    rooms: RwLock<HashMap<Uuid, RoomRecord>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_patient(&self, patient: PatientRecord) {
        self.patients.write().await.insert(patient.id, patient);
    }

    pub async fn add_professional(&self, professional: ProfessionalRecord) {
        self.professionals.write().await.insert(professional.id, professional);
    }

    pub async fn add_service(&self, service: ServiceRecord) {
        self.services.write().await.insert(service.id, service);
    }

    pub async fn add_room(&self, room: RoomRecord) {
        self.rooms.write().await.insert(room.id, room);
    }
}

#[async_trait]
impl Directory for InMemoryDirectory {
    async fn find_patient(&self, id: Uuid) -> Result<Option<PatientRecord>, StoreError> {
        Ok(self.patients.read().await.get(&id).cloned())
    }

    async fn find_professional(&self, id: Uuid) -> Result<Option<ProfessionalRecord>, StoreError> {
        Ok(self.professionals.read().await.get(&id).cloned())
    }

    async fn find_service(&self, id: Uuid) -> Result<Option<ServiceRecord>, StoreError> {
        Ok(self.services.read().await.get(&id).cloned())
    }

    async fn find_room(&self, id: Uuid) -> Result<Option<RoomRecord>, StoreError> {
        Ok(self.rooms.read().await.get(&id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        AppointmentStatus, Attendance, PatientInfoSnapshot, PaymentStatus, PricingSnapshot,
        Reminders,
    };
    use chrono::{Duration, TimeZone, Utc};

    fn appointment(professional_id: Uuid, hour: u32) -> Appointment {
        let start = Utc.with_ymd_and_hms(2024, 1, 15, hour, 0, 0).unwrap();
        Appointment {
            id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            professional_id,
            service_id: Uuid::new_v4(),
            room_id: None,
            start_time: start,
            end_time: start + Duration::minutes(50),
            duration_minutes: 50,
            timezone: "UTC".to_string(),
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            pricing: PricingSnapshot::compute(60.0, 0.0, 0.0, "EUR".to_string()),
            patient_info: PatientInfoSnapshot {
                name: "Test Patient".to_string(),
                email: None,
                phone: None,
                date_of_birth: None,
                emergency_contact: None,
            },
            rescheduling: None,
            cancellation: None,
            attendance: Attendance::default(),
            reminders: Reminders::default(),
            notes: None,
            created_by: Uuid::new_v4(),
            created_at: start,
            updated_at: start,
            deleted_at: None,
        }
    }

    #[tokio::test]
    async fn find_orders_pages_and_hides_deleted() {
        let store = InMemoryAppointmentStore::new();
        let professional_id = Uuid::new_v4();

        for hour in [11, 9, 10] {
            store.save(&appointment(professional_id, hour)).await.unwrap();
        }
        let mut deleted = appointment(professional_id, 12);
        deleted.deleted_at = Some(deleted.start_time);
        store.save(&deleted).await.unwrap();

        let filter = AppointmentFilter {
            professional_id: Some(professional_id),
            ..AppointmentFilter::default()
        };
        let hours: Vec<u32> = store
            .find(&filter)
            .await
            .unwrap()
            .iter()
            .map(|a| chrono::Timelike::hour(&a.start_time))
            .collect();
        assert_eq!(hours, vec![9, 10, 11]);

        let page = AppointmentFilter {
            limit: Some(1),
            offset: Some(1),
            ..filter.clone()
        };
        assert_eq!(store.find(&page).await.unwrap().len(), 1);
        assert_eq!(store.count_documents(&filter).await.unwrap(), 3);

        let with_deleted = AppointmentFilter {
            include_deleted: true,
            ..filter
        };
        assert_eq!(store.count_documents(&with_deleted).await.unwrap(), 4);
        assert!(store.find_by_id(deleted.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn save_replaces_by_id() {
        let store = InMemoryAppointmentStore::new();
        let mut appt = appointment(Uuid::new_v4(), 9);
        store.save(&appt).await.unwrap();

        appt.status = AppointmentStatus::Confirmed;
        store.save(&appt).await.unwrap();

        let all = store.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, AppointmentStatus::Confirmed);
    }
}
