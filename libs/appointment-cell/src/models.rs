// libs/appointment-cell/src/models.rs
use std::fmt;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::Role;
use shared_models::error::StoreError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub room_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub timezone: String,
    pub status: AppointmentStatus,
    pub payment_status: PaymentStatus,
    pub pricing: PricingSnapshot,
    pub patient_info: PatientInfoSnapshot,
    pub rescheduling: Option<ReschedulingRecord>,
    pub cancellation: Option<CancellationRecord>,
    pub attendance: Attendance,
    pub reminders: Reminders,
    pub notes: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Time left until the stored start, measured from `now`.
    pub fn time_until_start(&self, now: DateTime<Utc>) -> Duration {
        self.start_time - now
    }

    pub fn owners(&self) -> ResourceOwners {
        ResourceOwners {
            patient_id: Some(self.patient_id),
            professional_id: Some(self.professional_id),
            patient_email: self.patient_info.email.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
    Rescheduled,
}

impl AppointmentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self,
            AppointmentStatus::Completed |
            AppointmentStatus::Cancelled |
            AppointmentStatus::NoShow
        )
    }

    /// Statuses that still occupy the professional's calendar.
    pub fn blocks_calendar(&self) -> bool {
        !matches!(self, AppointmentStatus::Cancelled | AppointmentStatus::NoShow)
    }

    /// Statuses from which the appointment may still be moved or cancelled.
    pub fn is_changeable(&self) -> bool {
        matches!(self, AppointmentStatus::Pending | AppointmentStatus::Confirmed)
    }

    pub fn calendar_blocking() -> Vec<AppointmentStatus> {
        vec![
            AppointmentStatus::Pending,
            AppointmentStatus::Confirmed,
            AppointmentStatus::InProgress,
            AppointmentStatus::Completed,
            AppointmentStatus::Rescheduled,
        ]
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "pending"),
            AppointmentStatus::Confirmed => write!(f, "confirmed"),
            AppointmentStatus::InProgress => write!(f, "in_progress"),
            AppointmentStatus::Completed => write!(f, "completed"),
            AppointmentStatus::Cancelled => write!(f, "cancelled"),
            AppointmentStatus::NoShow => write!(f, "no_show"),
            AppointmentStatus::Rescheduled => write!(f, "rescheduled"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Partial,
    Paid,
    Refunded,
    Overdue,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentStatus::Pending => write!(f, "pending"),
            PaymentStatus::Partial => write!(f, "partial"),
            PaymentStatus::Paid => write!(f, "paid"),
            PaymentStatus::Refunded => write!(f, "refunded"),
            PaymentStatus::Overdue => write!(f, "overdue"),
        }
    }
}

// ==============================================================================
// SNAPSHOTS AND SUB-RECORDS
// ==============================================================================

/// Price as agreed at booking time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PricingSnapshot {
    pub base_price: f64,
    pub discount_amount: f64,
    pub copay_amount: f64,
    pub total_amount: f64,
    pub currency: String,
    pub invoiced_at: Option<DateTime<Utc>>,
}

impl PricingSnapshot {
    pub fn compute(base_price: f64, discount_amount: f64, copay_amount: f64, currency: String) -> Self {
        Self {
            base_price,
            discount_amount,
            copay_amount,
            total_amount: base_price - discount_amount + copay_amount,
            currency,
            invoiced_at: None,
        }
    }

    pub fn is_invoiced(&self) -> bool {
        self.invoiced_at.is_some()
    }
}

/// Copy of the patient's contact data taken when the appointment was booked.
/// Later edits to the patient record never reach this.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PatientInfoSnapshot {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub emergency_contact: Option<EmergencyContact>,
}

impl From<&PatientRecord> for PatientInfoSnapshot {
    fn from(patient: &PatientRecord) -> Self {
        Self {
            name: patient.full_name(),
            email: patient.email.clone(),
            phone: patient.phone.clone(),
            date_of_birth: patient.date_of_birth,
            emergency_contact: patient.emergency_contact.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmergencyContact {
    pub name: String,
    pub phone: String,
    pub relationship: Option<String>,
}

/// Created by the first reschedule. Later reschedules overwrite
/// `rescheduled_by`, `rescheduled_at` and `reason` but only ever increment
/// `rescheduling_count`; the original window stays the first one.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReschedulingRecord {
    pub original_start_time: DateTime<Utc>,
    pub original_end_time: DateTime<Utc>,
    pub rescheduled_by: Uuid,
    pub rescheduled_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub rescheduling_count: u32,
}

/// Present iff the appointment status is `cancelled`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CancellationRecord {
    pub cancelled_by: Uuid,
    pub cancelled_at: DateTime<Utc>,
    pub reason: String,
    pub refund_amount: f64,
    pub refund_processed: bool,
    pub reschedule_offered: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Attendance {
    pub patient_arrived: bool,
    pub arrived_at: Option<DateTime<Utc>>,
    pub professional_present: bool,
    pub session_started: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub session_ended: bool,
    pub ended_at: Option<DateTime<Utc>>,
    pub actual_duration_minutes: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ReminderChannel {
    pub sent: bool,
    pub sent_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Reminders {
    pub sms: ReminderChannel,
    pub email: ReminderChannel,
    pub push: ReminderChannel,
}

impl Reminders {
    /// Mark every channel unsent so the reminder scheduler fires again.
    pub fn reset(&mut self) {
        *self = Reminders::default();
    }

    pub fn any_sent(&self) -> bool {
        self.sms.sent || self.email.sent || self.push.sent
    }
}

// ==============================================================================
// DIRECTORY RECORDS (read-only lookups)
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub emergency_contact: Option<EmergencyContact>,
}

impl PatientRecord {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfessionalRecord {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRecord {
    pub id: Uuid,
    pub name: String,
    pub default_duration_minutes: Option<i64>,
    pub base_price: f64,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomRecord {
    pub id: Uuid,
    pub name: String,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub patient_id: Uuid,
    pub professional_id: Uuid,
    pub service_id: Uuid,
    pub room_id: Option<Uuid>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub timezone: Option<String>,
    pub discount_amount: Option<f64>,
    pub copay_amount: Option<f64>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn new(
        patient_id: Uuid,
        professional_id: Uuid,
        service_id: Uuid,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            patient_id,
            professional_id,
            service_id,
            room_id: None,
            start_time,
            end_time: None,
            duration_minutes: None,
            timezone: None,
            discount_amount: None,
            copay_amount: None,
            notes: None,
        }
    }
}

/// Partial update; `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_minutes: Option<i64>,
    pub room_id: Option<Uuid>,
    pub notes: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub discount_amount: Option<f64>,
    pub copay_amount: Option<f64>,
    pub invoiced_at: Option<DateTime<Utc>>,
}

impl UpdateAppointmentRequest {
    pub fn changes_time(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some() || self.duration_minutes.is_some()
    }

    pub fn changes_pricing(&self) -> bool {
        self.discount_amount.is_some() || self.copay_amount.is_some() || self.invoiced_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_start_time: DateTime<Utc>,
    pub new_end_time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: String,
    pub refund_amount: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub patient_id: Option<Uuid>,
    pub professional_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

/// Store-level selection over appointments.
///
/// `starts_before`/`ends_after` select windows intersecting
/// `[ends_after, starts_before)`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppointmentFilter {
    pub professional_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub room_id: Option<Uuid>,
    pub statuses: Option<Vec<AppointmentStatus>>,
    pub starts_before: Option<DateTime<Utc>>,
    pub ends_after: Option<DateTime<Utc>>,
    pub include_deleted: bool,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl AppointmentFilter {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        if !self.include_deleted && appointment.is_deleted() {
            return false;
        }
        if self.professional_id.is_some_and(|id| id != appointment.professional_id) {
            return false;
        }
        if self.patient_id.is_some_and(|id| id != appointment.patient_id) {
            return false;
        }
        if self.room_id.is_some() && self.room_id != appointment.room_id {
            return false;
        }
        if let Some(statuses) = &self.statuses {
            if !statuses.contains(&appointment.status) {
                return false;
            }
        }
        if self.starts_before.is_some_and(|t| appointment.start_time >= t) {
            return false;
        }
        if self.ends_after.is_some_and(|t| appointment.end_time <= t) {
            return false;
        }
        true
    }
}

impl From<AppointmentSearchQuery> for AppointmentFilter {
    fn from(query: AppointmentSearchQuery) -> Self {
        Self {
            professional_id: query.professional_id,
            patient_id: query.patient_id,
            room_id: query.room_id,
            statuses: query.status.map(|s| vec![s]),
            starts_before: query.to_date,
            ends_after: query.from_date,
            include_deleted: false,
            limit: query.limit,
            offset: query.offset,
        }
    }
}

// ==============================================================================
// CONFLICT DETECTION MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
    pub suggested_alternatives: Vec<SuggestedSlot>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestedSlot {
    pub professional_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

// ==============================================================================
// AUDIT TRAIL MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Created,
    Updated,
    Rescheduled,
    Cancelled,
    Deleted,
    Confirmed,
    PatientArrived,
    SessionStarted,
    SessionEnded,
    NoShow,
    RescheduleOffered,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AuditAction::Created => "created",
            AuditAction::Updated => "updated",
            AuditAction::Rescheduled => "rescheduled",
            AuditAction::Cancelled => "cancelled",
            AuditAction::Deleted => "deleted",
            AuditAction::Confirmed => "confirmed",
            AuditAction::PatientArrived => "patient_arrived",
            AuditAction::SessionStarted => "session_started",
            AuditAction::SessionEnded => "session_ended",
            AuditAction::NoShow => "no_show",
            AuditAction::RescheduleOffered => "reschedule_offered",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComplianceFlags {
    pub hipaa_relevant: bool,
    pub gdpr_relevant: bool,
    pub requires_retention: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub policy: String,
    pub duration: String,
}

impl RetentionPolicy {
    pub fn appointment_records() -> Self {
        Self {
            policy: "appointment_records".to_string(),
            duration: "7y".to_string(),
        }
    }
}

/// Security classification attached to an audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditClassification {
    pub risk_level: RiskLevel,
    pub compliance: ComplianceFlags,
    pub retention: RetentionPolicy,
}

impl AuditClassification {
    /// Normalized classification per action. `phi_changed` only matters for
    /// plain updates, where GDPR relevance depends on what was touched.
    pub fn for_action(action: AuditAction, phi_changed: bool) -> Self {
        let (risk_level, gdpr_relevant) = match action {
            AuditAction::Created => (RiskLevel::Medium, true),
            AuditAction::Updated => (RiskLevel::Low, phi_changed),
            AuditAction::Rescheduled => (RiskLevel::Medium, true),
            AuditAction::Cancelled => (RiskLevel::High, true),
            AuditAction::Deleted => (RiskLevel::High, true),
            AuditAction::Confirmed
            | AuditAction::PatientArrived
            | AuditAction::SessionStarted
            | AuditAction::SessionEnded
            | AuditAction::NoShow
            | AuditAction::RescheduleOffered => (RiskLevel::Low, false),
        };

        Self {
            risk_level,
            compliance: ComplianceFlags {
                hipaa_relevant: true,
                gdpr_relevant,
                requires_retention: true,
            },
            retention: RetentionPolicy::appointment_records(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Added,
    Modified,
    Removed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub field: String,
    pub old_value: serde_json::Value,
    pub new_value: serde_json::Value,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    Patient,
    Professional,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RelatedEntity {
    #[serde(rename = "type")]
    pub kind: RelatedKind,
    pub id: Uuid,
}

/// Immutable once written.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub action: AuditAction,
    pub entity_type: String,
    pub entity_id: Uuid,
    pub actor_id: Uuid,
    pub actor_type: Role,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<FieldChange>,
    pub risk_level: RiskLevel,
    pub compliance: ComplianceFlags,
    pub retention: RetentionPolicy,
    pub related: Vec<RelatedEntity>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuditLogFilter {
    pub entity_id: Option<Uuid>,
    pub actor_id: Option<Uuid>,
    pub action: Option<AuditAction>,
    pub min_risk_level: Option<RiskLevel>,
    pub since: Option<DateTime<Utc>>,
}

impl AuditLogFilter {
    pub fn for_entity(entity_id: Uuid) -> Self {
        Self {
            entity_id: Some(entity_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, entry: &AuditLogEntry) -> bool {
        self.entity_id.map_or(true, |id| id == entry.entity_id)
            && self.actor_id.map_or(true, |id| id == entry.actor_id)
            && self.action.map_or(true, |a| a == entry.action)
            && self.min_risk_level.map_or(true, |r| entry.risk_level >= r)
            && self.since.map_or(true, |t| entry.timestamp >= t)
    }
}

// ==============================================================================
// AUTHORIZATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SchedulingAction {
    Create,
    View,
    Update,
    Reschedule,
    Cancel,
    OfferReschedule,
    Confirm,
    MarkArrived,
    StartSession,
    EndSession,
    MarkNoShow,
    SoftDelete,
    ViewAudit,
    /// Read including soft-deleted rows.
    ComplianceView,
}

impl fmt::Display for SchedulingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchedulingAction::Create => "create",
            SchedulingAction::View => "view",
            SchedulingAction::Update => "update",
            SchedulingAction::Reschedule => "reschedule",
            SchedulingAction::Cancel => "cancel",
            SchedulingAction::OfferReschedule => "offer_reschedule",
            SchedulingAction::Confirm => "confirm",
            SchedulingAction::MarkArrived => "mark_arrived",
            SchedulingAction::StartSession => "start_session",
            SchedulingAction::EndSession => "end_session",
            SchedulingAction::MarkNoShow => "mark_no_show",
            SchedulingAction::SoftDelete => "soft_delete",
            SchedulingAction::ViewAudit => "view_audit",
            SchedulingAction::ComplianceView => "compliance_view",
        };
        write!(f, "{}", name)
    }
}

/// Who a resource belongs to, as seen by the authorization policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceOwners {
    pub patient_id: Option<Uuid>,
    pub professional_id: Option<Uuid>,
    pub patient_email: Option<String>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Appointment,
    Patient,
    Professional,
    Service,
    Room,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Appointment => write!(f, "Appointment"),
            EntityKind::Patient => write!(f, "Patient"),
            EntityKind::Professional => write!(f, "Professional"),
            EntityKind::Service => write!(f, "Service"),
            EntityKind::Room => write!(f, "Room"),
        }
    }
}

/// Why the state machine refused a transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum RejectionReason {
    TooCloseToStart { minutes_until_start: i64 },
    InvalidStatus { current: AppointmentStatus },
    NotCancelled,
    PricingLocked,
}

impl RejectionReason {
    pub fn code(&self) -> &'static str {
        match self {
            RejectionReason::TooCloseToStart { .. } => "too_close_to_start",
            RejectionReason::InvalidStatus { .. } => "invalid_status",
            RejectionReason::NotCancelled => "not_cancelled",
            RejectionReason::PricingLocked => "pricing_locked",
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::TooCloseToStart { minutes_until_start } => write!(
                f,
                "{}: appointment starts in {} minutes",
                self.code(),
                minutes_until_start
            ),
            RejectionReason::InvalidStatus { current } => {
                write!(f, "{}: not allowed while {}", self.code(), current)
            }
            RejectionReason::NotCancelled | RejectionReason::PricingLocked => {
                write!(f, "{}", self.code())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppointmentError {
    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: Uuid },

    #[error("Appointment conflicts with {} existing booking(s)", .conflicts.len())]
    Conflict {
        conflicts: Vec<Appointment>,
        suggested_alternatives: Vec<SuggestedSlot>,
    },

    #[error("Operation rejected ({0})")]
    PolicyViolation(RejectionReason),

    #[error("Not permitted to {action} this appointment")]
    PermissionDenied { action: SchedulingAction },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Timed out waiting for scheduling lock on professional {0}")]
    LockTimeout(Uuid),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The state change was persisted but its audit entry was not.
    #[error("Appointment {appointment_id} was {action} but the audit entry could not be written: {source}")]
    AuditWriteFailed {
        appointment_id: Uuid,
        action: AuditAction,
        #[source]
        source: StoreError,
    },
}

impl AppointmentError {
    pub fn not_found(entity: EntityKind, id: Uuid) -> Self {
        AppointmentError::NotFound { entity, id }
    }

    /// Whether the caller may retry after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppointmentError::Store(e) => e.is_retryable(),
            AppointmentError::LockTimeout(_) => true,
            _ => false,
        }
    }

    pub fn conflict_ids(&self) -> Vec<Uuid> {
        match self {
            AppointmentError::Conflict { conflicts, .. } => conflicts.iter().map(|a| a.id).collect(),
            _ => Vec::new(),
        }
    }
}

// ==============================================================================
// VALIDATION MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct AppointmentValidationRules {
    /// Reschedule and cancel need at least this much notice.
    pub min_change_notice_hours: i64,
    /// Used when neither the request nor the service gives a duration.
    pub default_session_minutes: i64,
    pub default_currency: String,
    pub alternative_slot_count: usize,
    pub alternative_slot_step_minutes: i64,
    pub store_timeout: StdDuration,
    pub lock_timeout: StdDuration,
}

impl Default for AppointmentValidationRules {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl AppointmentValidationRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            min_change_notice_hours: config.min_change_notice_hours,
            default_session_minutes: config.default_session_minutes,
            default_currency: config.default_currency.clone(),
            alternative_slot_count: config.alternative_slot_count,
            alternative_slot_step_minutes: 30,
            store_timeout: config.store_timeout(),
            lock_timeout: config.lock_timeout(),
        }
    }

    pub fn min_change_notice(&self) -> Duration {
        Duration::hours(self.min_change_notice_hours)
    }
}
