#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use appointment_cell::models::{
    AuditLogFilter, CreateAppointmentRequest, PatientRecord, ProfessionalRecord, RoomRecord,
    ServiceRecord, AppointmentValidationRules, EmergencyContact,
};
use appointment_cell::services::{
    AppointmentBookingService, AuthorizationPolicy, Clock, ManualClock, RequestContext,
    RoleBasedPolicy,
};
use appointment_cell::store::{
    AppointmentStore, AuditLogStore, InMemoryAppointmentStore, InMemoryAuditLogStore,
    InMemoryDirectory,
};
use shared_utils::telemetry::init_test_tracing;
use shared_utils::test_utils::TestUser;

pub const STORE_TIMEOUT: StdDuration = StdDuration::from_secs(2);

/// A January 2024 instant, UTC.
pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, day, hour, minute, 0).unwrap()
}

pub fn context_for(user: &TestUser) -> RequestContext {
    RequestContext::new(user.to_actor(), STORE_TIMEOUT)
}

/// One professional, one patient, one service and one room backed by
/// in-memory stores, with the clock parked at 2024-01-10 08:00 UTC.
pub struct Clinic {
    pub service: AppointmentBookingService,
    pub clock: Arc<ManualClock>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub audit_log: Arc<InMemoryAuditLogStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub patient: PatientRecord,
    pub professional: ProfessionalRecord,
    pub therapy: ServiceRecord,
    pub room: RoomRecord,
    pub admin: RequestContext,
    pub reception: RequestContext,
}

impl Clinic {
    pub async fn new() -> Self {
        Self::with_policy(Arc::new(RoleBasedPolicy::new())).await
    }

    pub async fn with_policy(policy: Arc<dyn AuthorizationPolicy>) -> Self {
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let audit_log = Arc::new(InMemoryAuditLogStore::new());
        Self::with_stores(policy, appointments.clone(), audit_log.clone(), appointments, audit_log).await
    }

    /// Build with custom store implementations; `appointments`/`audit_log`
    /// are the in-memory handles kept for assertions.
    pub async fn with_stores(
        policy: Arc<dyn AuthorizationPolicy>,
        appointment_store: Arc<dyn AppointmentStore>,
        audit_store: Arc<dyn AuditLogStore>,
        appointments: Arc<InMemoryAppointmentStore>,
        audit_log: Arc<InMemoryAuditLogStore>,
    ) -> Self {
        init_test_tracing();
        let directory = Arc::new(InMemoryDirectory::new());

        let patient = PatientRecord {
            id: Uuid::new_v4(),
            first_name: "Ana".to_string(),
            last_name: "Ruiz".to_string(),
            email: Some("ana.ruiz@example.com".to_string()),
            phone: Some("+34600111222".to_string()),
            date_of_birth: None,
            emergency_contact: Some(EmergencyContact {
                name: "Luis Ruiz".to_string(),
                phone: "+34600111333".to_string(),
                relationship: Some("brother".to_string()),
            }),
        };
        let professional = ProfessionalRecord {
            id: Uuid::new_v4(),
            first_name: "Marta".to_string(),
            last_name: "Vidal".to_string(),
            email: Some("marta.vidal@example.com".to_string()),
        };
        let therapy = ServiceRecord {
            id: Uuid::new_v4(),
            name: "Individual therapy".to_string(),
            default_duration_minutes: Some(50),
            base_price: 60.0,
            currency: None,
        };
        let room = RoomRecord {
            id: Uuid::new_v4(),
            name: "Consulta 2".to_string(),
        };

        directory.add_patient(patient.clone()).await;
        directory.add_professional(professional.clone()).await;
        directory.add_service(therapy.clone()).await;
        directory.add_room(room.clone()).await;

        let clock = Arc::new(ManualClock::new(at(10, 8, 0)));
        let service = AppointmentBookingService::with_components(
            appointment_store,
            audit_store,
            directory.clone(),
            policy,
            AppointmentValidationRules::default(),
        )
        .with_clock(clock.clone() as Arc<dyn Clock>);

        Self {
            service,
            clock,
            appointments,
            audit_log,
            directory,
            patient,
            professional,
            therapy,
            room,
            admin: context_for(&TestUser::admin("admin@clinic.test")),
            reception: context_for(&TestUser::receptionist("desk@clinic.test")),
        }
    }

    /// Booking request for the clinic's patient/professional/service.
    pub fn booking(&self, start: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest::new(self.patient.id, self.professional.id, self.therapy.id, start)
    }

    pub fn booking_until(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            end_time: Some(end),
            ..self.booking(start)
        }
    }

    pub async fn audit_count(&self, appointment_id: Uuid) -> u64 {
        self.audit_log
            .count_documents(&AuditLogFilter::for_entity(appointment_id))
            .await
            .unwrap()
    }
}
