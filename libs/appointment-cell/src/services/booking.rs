// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::Actor;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentSearchQuery, AppointmentStatus,
    AppointmentValidationRules, AuditAction, AuditLogEntry, AuditLogFilter, Attendance,
    CancelAppointmentRequest, CreateAppointmentRequest, EntityKind, FieldChange,
    PatientInfoSnapshot, PaymentStatus, RejectionReason, Reminders, RescheduleAppointmentRequest,
    ResourceOwners, SchedulingAction, UpdateAppointmentRequest,
};
use crate::services::audit::{creation_changes, diff_appointments, AuditTrailRecorder};
use crate::services::authorization::{AuthorizationPolicy, RoleBasedPolicy};
use crate::services::clock::{Clock, SystemClock};
use crate::services::conflict::ConflictDetectionService;
use crate::services::consistency::SchedulingLocks;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::pricing::PricingService;
use crate::services::time_range::resolve_window;
use crate::store::{
    bounded, AppointmentStore, AuditLogStore, Directory, SupabaseAppointmentStore,
    SupabaseAuditLogStore, SupabaseDirectory,
};

const DEFAULT_TIMEZONE: &str = "UTC";

/// Who is calling and how long each store call may take.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub actor: Actor,
    pub timeout: StdDuration,
}

impl RequestContext {
    pub fn new(actor: Actor, timeout: StdDuration) -> Self {
        Self { actor, timeout }
    }

    pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentStore>,
    audit_log: Arc<dyn AuditLogStore>,
    directory: Arc<dyn Directory>,
    authorization: Arc<dyn AuthorizationPolicy>,
    clock: Arc<dyn Clock>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    pricing_service: PricingService,
    audit_recorder: AuditTrailRecorder,
    locks: SchedulingLocks,
    validation_rules: AppointmentValidationRules,
}

impl AppointmentBookingService {
    /// Supabase-backed service with the default role policy.
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self::with_components(
            Arc::new(SupabaseAppointmentStore::new(Arc::clone(&supabase))),
            Arc::new(SupabaseAuditLogStore::new(Arc::clone(&supabase))),
            Arc::new(SupabaseDirectory::new(supabase)),
            Arc::new(RoleBasedPolicy::new()),
            AppointmentValidationRules::from_config(config),
        )
    }

    pub fn with_components(
        appointments: Arc<dyn AppointmentStore>,
        audit_log: Arc<dyn AuditLogStore>,
        directory: Arc<dyn Directory>,
        authorization: Arc<dyn AuthorizationPolicy>,
        validation_rules: AppointmentValidationRules,
    ) -> Self {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&appointments), validation_rules.clone()),
            lifecycle_service: AppointmentLifecycleService::new(&validation_rules),
            pricing_service: PricingService::new(validation_rules.default_currency.clone()),
            audit_recorder: AuditTrailRecorder::new(Arc::clone(&audit_log), Arc::clone(&clock)),
            locks: SchedulingLocks::new(validation_rules.lock_timeout),
            appointments,
            audit_log,
            directory,
            authorization,
            clock,
            validation_rules,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.audit_recorder = AuditTrailRecorder::new(Arc::clone(&self.audit_log), Arc::clone(&clock));
        self.clock = clock;
        self
    }

    /// Context for `actor` using the configured store timeout.
    pub fn context(&self, actor: Actor) -> RequestContext {
        RequestContext::new(actor, self.validation_rules.store_timeout)
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    #[instrument(skip(self, ctx, request), fields(actor = %ctx.actor.id, professional = %request.professional_id))]
    pub async fn create_appointment(
        &self,
        ctx: &RequestContext,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!(
            "Booking appointment for patient {} with professional {}",
            request.patient_id, request.professional_id
        );

        let owners = ResourceOwners {
            patient_id: Some(request.patient_id),
            professional_id: Some(request.professional_id),
            patient_email: None,
        };
        self.authorize(ctx, SchedulingAction::Create, &owners)?;

        let patient = bounded(ctx.timeout, self.directory.find_patient(request.patient_id))
            .await?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Patient, request.patient_id))?;
        bounded(ctx.timeout, self.directory.find_professional(request.professional_id))
            .await?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Professional, request.professional_id))?;
        let service = bounded(ctx.timeout, self.directory.find_service(request.service_id))
            .await?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Service, request.service_id))?;
        if let Some(room_id) = request.room_id {
            self.ensure_room(ctx, room_id).await?;
        }

        let window = resolve_window(
            request.start_time,
            request.end_time,
            request.duration_minutes,
            service.default_duration_minutes,
            self.validation_rules.default_session_minutes,
        )
        .map_err(AppointmentError::ValidationError)?;

        let pricing = self
            .pricing_service
            .snapshot(&service, request.discount_amount, request.copay_amount)?;

        let guard = self.locks.acquire(request.professional_id).await?;
        self.conflict_service
            .ensure_available(request.professional_id, window.start, window.end, None, ctx.timeout)
            .await?;

        let now = self.clock.now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            patient_id: request.patient_id,
            professional_id: request.professional_id,
            service_id: request.service_id,
            room_id: request.room_id,
            start_time: window.start,
            end_time: window.end,
            duration_minutes: window.duration_minutes,
            timezone: request.timezone.unwrap_or_else(|| DEFAULT_TIMEZONE.to_string()),
            status: AppointmentStatus::Pending,
            payment_status: PaymentStatus::Pending,
            pricing,
            patient_info: PatientInfoSnapshot::from(&patient),
            rescheduling: None,
            cancellation: None,
            attendance: Attendance::default(),
            reminders: Reminders::default(),
            notes: request.notes,
            created_by: ctx.actor.id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.persist(ctx, &appointment).await?;
        drop(guard);

        let changes = creation_changes(&appointment)?;
        self.audit(ctx, AuditAction::Created, &appointment, changes, None).await?;

        info!(
            "Appointment {} booked for professional {} at {}",
            appointment.id, appointment.professional_id, appointment.start_time
        );
        Ok(appointment)
    }

    /// Partial update. Time changes are only accepted while the appointment
    /// is pending or confirmed and are conflict-checked excluding itself.
    /// Moving the window clears the reminder flags.
    #[instrument(skip(self, ctx, patch), fields(actor = %ctx.actor.id))]
    pub async fn update_appointment(
        &self,
        ctx: &RequestContext,
        appointment_id: Uuid,
        patch: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let existing = self.load(ctx, appointment_id).await?;
        self.authorize(ctx, SchedulingAction::Update, &existing.owners())?;

        if patch.changes_time() && !existing.status.is_changeable() {
            return Err(self.rejected(RejectionReason::InvalidStatus { current: existing.status }));
        }
        if patch.changes_pricing() && existing.pricing.is_invoiced() {
            return Err(self.rejected(RejectionReason::PricingLocked));
        }
        if let Some(room_id) = patch.room_id {
            self.ensure_room(ctx, room_id).await?;
        }

        let guard = self.locks.acquire(existing.professional_id).await?;
        let before = self.load(ctx, appointment_id).await?;
        let mut appointment = before.clone();
        let now = self.clock.now();

        if patch.changes_time() {
            if !before.status.is_changeable() {
                return Err(self.rejected(RejectionReason::InvalidStatus { current: before.status }));
            }

            let start = patch.start_time.unwrap_or(before.start_time);
            let window = resolve_window(
                start,
                patch.end_time,
                patch.duration_minutes.or(Some(before.duration_minutes)),
                None,
                self.validation_rules.default_session_minutes,
            )
            .map_err(AppointmentError::ValidationError)?;

            self.conflict_service
                .ensure_available(before.professional_id, window.start, window.end, Some(appointment_id), ctx.timeout)
                .await?;

            if window.start != before.start_time || window.end != before.end_time {
                appointment.reminders.reset();
            }
            appointment.start_time = window.start;
            appointment.end_time = window.end;
            appointment.duration_minutes = window.duration_minutes;
        }

        if let Some(room_id) = patch.room_id {
            appointment.room_id = Some(room_id);
        }
        if let Some(notes) = patch.notes {
            appointment.notes = Some(notes);
        }
        if let Some(payment_status) = patch.payment_status {
            appointment.payment_status = payment_status;
        }
        if patch.discount_amount.is_some() || patch.copay_amount.is_some() {
            appointment.pricing = self
                .pricing_service
                .reprice(&before.pricing, patch.discount_amount, patch.copay_amount)?;
        }
        if let Some(invoiced_at) = patch.invoiced_at {
            if before.pricing.is_invoiced() {
                return Err(self.rejected(RejectionReason::PricingLocked));
            }
            appointment.pricing.invoiced_at = Some(invoiced_at);
        }
        appointment.updated_at = now;

        self.persist(ctx, &appointment).await?;
        drop(guard);

        let changes = diff_appointments(&before, &appointment)?;
        if changes.is_empty() {
            debug!("Update of appointment {} changed nothing", appointment_id);
        }
        self.audit(ctx, AuditAction::Updated, &appointment, changes, None).await?;

        info!("Appointment {} updated", appointment_id);
        Ok(appointment)
    }

    #[instrument(skip(self, ctx, request), fields(actor = %ctx.actor.id))]
    pub async fn reschedule_appointment(
        &self,
        ctx: &RequestContext,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let now = self.clock.now();
        let existing = self.load(ctx, appointment_id).await?;
        self.authorize(ctx, SchedulingAction::Reschedule, &existing.owners())?;
        self.lifecycle_service
            .can_be_rescheduled(&existing, now)
            .map_err(|reason| self.rejected(reason))?;

        let window = resolve_window(
            request.new_start_time,
            request.new_end_time,
            Some(existing.duration_minutes),
            None,
            self.validation_rules.default_session_minutes,
        )
        .map_err(AppointmentError::ValidationError)?;

        let guard = self.locks.acquire(existing.professional_id).await?;
        let before = self.load(ctx, appointment_id).await?;

        self.conflict_service
            .ensure_available(before.professional_id, window.start, window.end, Some(appointment_id), ctx.timeout)
            .await?;

        let mut appointment = before.clone();
        self.lifecycle_service
            .apply_reschedule(&mut appointment, window, ctx.actor.id, request.reason.clone(), now)?;

        self.persist(ctx, &appointment).await?;
        drop(guard);

        let changes = diff_appointments(&before, &appointment)?;
        self.audit(ctx, AuditAction::Rescheduled, &appointment, changes, request.reason)
            .await?;

        info!(
            "Appointment {} rescheduled from {} to {}",
            appointment_id, before.start_time, appointment.start_time
        );
        Ok(appointment)
    }

    #[instrument(skip(self, ctx, request), fields(actor = %ctx.actor.id))]
    pub async fn cancel_appointment(
        &self,
        ctx: &RequestContext,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let reason = request.reason.clone();
        let refund_requested = request.refund_amount.unwrap_or(0.0);

        let appointment = self
            .mutate(ctx, appointment_id, SchedulingAction::Cancel, AuditAction::Cancelled, Some(reason.clone()), |appointment, now| {
                self.lifecycle_service
                    .can_be_cancelled(appointment, now)
                    .map_err(|r| self.rejected(r))?;
                let refund = self.pricing_service.validate_refund(&appointment.pricing, refund_requested)?;

                let previous = self
                    .lifecycle_service
                    .cancel(appointment, ctx.actor.id, request.reason, refund, now)?;
                appointment.payment_status = self
                    .pricing_service
                    .reconcile_after_cancellation(appointment.payment_status, refund);

                debug!("Appointment {} cancelled from {}", appointment.id, previous);
                Ok(())
            })
            .await?;

        info!("Appointment {} cancelled: {}", appointment_id, reason);
        Ok(appointment)
    }

    /// Flag a cancelled appointment as having been offered a new slot.
    pub async fn offer_reschedule(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::OfferReschedule, AuditAction::RescheduleOffered, None, |appointment, now| {
            self.lifecycle_service.offer_reschedule(appointment, now)
        })
        .await
    }

    // ==============================================================================
    // SESSION LIFECYCLE
    // ==============================================================================

    pub async fn confirm_appointment(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::Confirm, AuditAction::Confirmed, None, |appointment, now| {
            self.lifecycle_service.confirm(appointment, now)
        })
        .await
    }

    pub async fn mark_arrived(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::MarkArrived, AuditAction::PatientArrived, None, |appointment, now| {
            self.lifecycle_service.mark_arrived(appointment, now);
            Ok(())
        })
        .await
    }

    pub async fn start_session(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::StartSession, AuditAction::SessionStarted, None, |appointment, now| {
            self.lifecycle_service.start_session(appointment, now)
        })
        .await
    }

    pub async fn end_session(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::EndSession, AuditAction::SessionEnded, None, |appointment, now| {
            self.lifecycle_service.end_session(appointment, now)
        })
        .await
    }

    pub async fn mark_no_show(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.mutate(ctx, appointment_id, SchedulingAction::MarkNoShow, AuditAction::NoShow, None, |appointment, now| {
            self.lifecycle_service.mark_no_show(appointment, now)
        })
        .await
    }

    /// Hide the appointment from scheduling and normal reads. The row and its
    /// audit trail are kept.
    pub async fn soft_delete(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self
            .mutate(ctx, appointment_id, SchedulingAction::SoftDelete, AuditAction::Deleted, None, |appointment, now| {
                self.lifecycle_service.soft_delete(appointment, now);
                Ok(())
            })
            .await?;

        warn!("Appointment {} soft-deleted by {}", appointment_id, ctx.actor.id);
        Ok(appointment)
    }

    // ==============================================================================
    // READS
    // ==============================================================================

    pub async fn get_appointment(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(ctx, appointment_id).await?;
        self.authorize(ctx, SchedulingAction::View, &appointment.owners())?;
        Ok(appointment)
    }

    /// Matching appointments the actor may view. Soft-deleted rows are never
    /// returned. `limit`/`offset` page over the visible rows only.
    pub async fn search_appointments(
        &self,
        ctx: &RequestContext,
        query: AppointmentSearchQuery,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filter = AppointmentFilter::from(query);
        let offset = filter.offset.take().unwrap_or(0);
        let limit = filter.limit.take().unwrap_or(usize::MAX);

        let appointments = bounded(ctx.timeout, self.appointments.find(&filter)).await?;
        let total = appointments.len();

        let visible: Vec<Appointment> = appointments
            .into_iter()
            .filter(|a| {
                self.authorization
                    .can_perform(&ctx.actor, SchedulingAction::View, &a.owners())
            })
            .skip(offset)
            .take(limit)
            .collect();

        debug!("Search matched {} appointments, returning {} to {}", total, visible.len(), ctx.actor.id);
        Ok(visible)
    }

    /// The actor must be allowed to view everything the query could match,
    /// judged on the patient/professional the query is scoped to.
    pub async fn count_appointments(
        &self,
        ctx: &RequestContext,
        query: AppointmentSearchQuery,
    ) -> Result<u64, AppointmentError> {
        let owners = ResourceOwners {
            patient_id: query.patient_id,
            professional_id: query.professional_id,
            patient_email: None,
        };
        self.authorize(ctx, SchedulingAction::View, &owners)?;

        let filter = AppointmentFilter::from(query);
        Ok(bounded(ctx.timeout, self.appointments.count_documents(&filter)).await?)
    }

    /// Read that includes soft-deleted appointments.
    pub async fn get_for_compliance(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = bounded(ctx.timeout, self.appointments.find_by_id(appointment_id))
            .await?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Appointment, appointment_id))?;
        self.authorize(ctx, SchedulingAction::ComplianceView, &appointment.owners())?;

        info!(
            "Compliance read of appointment {} by {} (deleted: {})",
            appointment_id,
            ctx.actor.id,
            appointment.is_deleted()
        );
        Ok(appointment)
    }

    /// Audit entries for one appointment, oldest first.
    pub async fn audit_trail(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Vec<AuditLogEntry>, AppointmentError> {
        let appointment = bounded(ctx.timeout, self.appointments.find_by_id(appointment_id))
            .await?
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Appointment, appointment_id))?;

        let owners = appointment.owners();
        if appointment.is_deleted()
            && !self.authorization.can_perform(&ctx.actor, SchedulingAction::ComplianceView, &owners)
        {
            return Err(AppointmentError::not_found(EntityKind::Appointment, appointment_id));
        }
        self.authorize(ctx, SchedulingAction::ViewAudit, &owners)?;

        let mut entries = bounded(ctx.timeout, self.audit_log.find(&AuditLogFilter::for_entity(appointment_id))).await?;
        entries.sort_by_key(|e| e.timestamp);
        Ok(entries)
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Read-modify-write of one appointment under its professional's lock,
    /// followed by exactly one audit entry.
    async fn mutate<F>(
        &self,
        ctx: &RequestContext,
        appointment_id: Uuid,
        action: SchedulingAction,
        audit_action: AuditAction,
        reason: Option<String>,
        apply: F,
    ) -> Result<Appointment, AppointmentError>
    where
        F: FnOnce(&mut Appointment, DateTime<Utc>) -> Result<(), AppointmentError>,
    {
        let existing = self.load(ctx, appointment_id).await?;
        self.authorize(ctx, action, &existing.owners())?;

        let guard = self.locks.acquire(existing.professional_id).await?;
        let before = self.load(ctx, appointment_id).await?;
        let mut appointment = before.clone();

        apply(&mut appointment, self.clock.now())?;

        self.persist(ctx, &appointment).await?;
        drop(guard);

        let changes = diff_appointments(&before, &appointment)?;
        self.audit(ctx, audit_action, &appointment, changes, reason).await?;

        debug!("Appointment {} {}: {} -> {}", appointment_id, audit_action, before.status, appointment.status);
        Ok(appointment)
    }

    /// Non-deleted appointment by id.
    async fn load(&self, ctx: &RequestContext, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        match bounded(ctx.timeout, self.appointments.find_by_id(appointment_id)).await? {
            Some(appointment) if !appointment.is_deleted() => Ok(appointment),
            _ => Err(AppointmentError::not_found(EntityKind::Appointment, appointment_id)),
        }
    }

    async fn persist(&self, ctx: &RequestContext, appointment: &Appointment) -> Result<(), AppointmentError> {
        bounded(ctx.timeout, self.appointments.save(appointment)).await?;
        Ok(())
    }

    async fn ensure_room(&self, ctx: &RequestContext, room_id: Uuid) -> Result<(), AppointmentError> {
        bounded(ctx.timeout, self.directory.find_room(room_id))
            .await?
            .map(|_| ())
            .ok_or_else(|| AppointmentError::not_found(EntityKind::Room, room_id))
    }

    async fn audit(
        &self,
        ctx: &RequestContext,
        action: AuditAction,
        appointment: &Appointment,
        changes: Vec<FieldChange>,
        reason: Option<String>,
    ) -> Result<AuditLogEntry, AppointmentError> {
        let classification = AuditTrailRecorder::classify(action, &changes);
        let recorded = bounded(
            ctx.timeout,
            self.audit_recorder
                .record(action, appointment, &ctx.actor, changes, classification, reason),
        )
        .await;

        recorded.map_err(|source| {
            error!(
                "Appointment {} was {} but its audit entry could not be written: {}",
                appointment.id, action, source
            );
            AppointmentError::AuditWriteFailed {
                appointment_id: appointment.id,
                action,
                source,
            }
        })
    }

    fn authorize(&self, ctx: &RequestContext, action: SchedulingAction, owners: &ResourceOwners) -> Result<(), AppointmentError> {
        if self.authorization.can_perform(&ctx.actor, action, owners) {
            Ok(())
        } else {
            warn!("{} {} denied permission to {}", ctx.actor.role, ctx.actor.id, action);
            Err(AppointmentError::PermissionDenied { action })
        }
    }

    fn rejected(&self, reason: RejectionReason) -> AppointmentError {
        warn!("Operation rejected: {}", reason);
        AppointmentError::PolicyViolation(reason)
    }
}
