// libs/appointment-cell/src/services/lifecycle.rs
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, AppointmentValidationRules,
    CancellationRecord, RejectionReason, ReschedulingRecord,
};
use crate::services::time_range::{duration_minutes, TimeWindow};

/// Status transitions and their guards. Pure: callers read, apply, then
/// persist.
///
/// - pending -> confirmed
/// - pending | confirmed -> in_progress -> completed
/// - pending | confirmed -> cancelled (with notice)
/// - confirmed -> no_show
///
/// Rescheduling keeps the status.
pub struct AppointmentLifecycleService {
    min_change_notice: Duration,
}

impl AppointmentLifecycleService {
    pub fn new(rules: &AppointmentValidationRules) -> Self {
        Self {
            min_change_notice: rules.min_change_notice(),
        }
    }

    pub fn can_be_rescheduled(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), RejectionReason> {
        self.check_changeable(appointment, now)
    }

    pub fn can_be_cancelled(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), RejectionReason> {
        self.check_changeable(appointment, now)
    }

    // status first, then notice
    fn check_changeable(&self, appointment: &Appointment, now: DateTime<Utc>) -> Result<(), RejectionReason> {
        if !appointment.status.is_changeable() {
            return Err(RejectionReason::InvalidStatus {
                current: appointment.status,
            });
        }

        let until_start = appointment.time_until_start(now);
        if until_start < self.min_change_notice {
            return Err(RejectionReason::TooCloseToStart {
                minutes_until_start: until_start.num_minutes(),
            });
        }

        Ok(())
    }

    pub fn confirm(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        require_status(appointment, &[AppointmentStatus::Pending])?;
        appointment.status = AppointmentStatus::Confirmed;
        appointment.updated_at = now;
        debug!("Appointment {} confirmed", appointment.id);
        Ok(())
    }

    /// Arrival is recorded regardless of status.
    pub fn mark_arrived(&self, appointment: &mut Appointment, now: DateTime<Utc>) {
        appointment.attendance.patient_arrived = true;
        appointment.attendance.arrived_at = Some(now);
        appointment.updated_at = now;
    }

    pub fn start_session(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        require_status(appointment, &[AppointmentStatus::Pending, AppointmentStatus::Confirmed])?;

        appointment.status = AppointmentStatus::InProgress;
        appointment.attendance.session_started = true;
        appointment.attendance.started_at = Some(now);
        appointment.attendance.professional_present = true;
        appointment.updated_at = now;
        Ok(())
    }

    pub fn end_session(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        require_status(appointment, &[AppointmentStatus::InProgress])?;

        appointment.status = AppointmentStatus::Completed;
        appointment.attendance.session_ended = true;
        appointment.attendance.ended_at = Some(now);
        appointment.attendance.actual_duration_minutes = appointment
            .attendance
            .started_at
            .map(|started| duration_minutes(started, now));
        appointment.updated_at = now;
        Ok(())
    }

    pub fn mark_no_show(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        require_status(appointment, &[AppointmentStatus::Confirmed])?;
        appointment.status = AppointmentStatus::NoShow;
        appointment.updated_at = now;
        Ok(())
    }

    /// Move the appointment to `window`. The caller has already checked the
    /// new window for conflicts.
    pub fn apply_reschedule(
        &self,
        appointment: &mut Appointment,
        window: TimeWindow,
        rescheduled_by: Uuid,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppointmentError> {
        self.can_be_rescheduled(appointment, now).map_err(reject)?;

        let record = match appointment.rescheduling.take() {
            Some(previous) => ReschedulingRecord {
                rescheduled_by,
                rescheduled_at: now,
                reason,
                rescheduling_count: previous.rescheduling_count + 1,
                ..previous
            },
            None => ReschedulingRecord {
                original_start_time: appointment.start_time,
                original_end_time: appointment.end_time,
                rescheduled_by,
                rescheduled_at: now,
                reason,
                rescheduling_count: 1,
            },
        };

        appointment.start_time = window.start;
        appointment.end_time = window.end;
        appointment.duration_minutes = window.duration_minutes;
        appointment.rescheduling = Some(record);
        appointment.reminders.reset();
        appointment.updated_at = now;
        Ok(())
    }

    /// Cancel and return the status the appointment had before.
    pub fn cancel(
        &self,
        appointment: &mut Appointment,
        cancelled_by: Uuid,
        reason: String,
        refund_amount: f64,
        now: DateTime<Utc>,
    ) -> Result<AppointmentStatus, AppointmentError> {
        self.can_be_cancelled(appointment, now).map_err(reject)?;

        let previous = appointment.status;
        appointment.status = AppointmentStatus::Cancelled;
        appointment.cancellation = Some(CancellationRecord {
            cancelled_by,
            cancelled_at: now,
            reason,
            refund_amount,
            refund_processed: refund_amount > 0.0,
            reschedule_offered: false,
        });
        appointment.updated_at = now;
        Ok(previous)
    }

    pub fn offer_reschedule(&self, appointment: &mut Appointment, now: DateTime<Utc>) -> Result<(), AppointmentError> {
        match appointment.cancellation.as_mut() {
            Some(cancellation) if appointment.status == AppointmentStatus::Cancelled => {
                cancellation.reschedule_offered = true;
                appointment.updated_at = now;
                Ok(())
            }
            _ => Err(reject(RejectionReason::NotCancelled)),
        }
    }

    /// Status is left as it was.
    pub fn soft_delete(&self, appointment: &mut Appointment, now: DateTime<Utc>) {
        appointment.deleted_at = Some(now);
        appointment.updated_at = now;
    }
}

fn require_status(appointment: &Appointment, allowed: &[AppointmentStatus]) -> Result<(), AppointmentError> {
    if allowed.contains(&appointment.status) {
        Ok(())
    } else {
        Err(reject(RejectionReason::InvalidStatus {
            current: appointment.status,
        }))
    }
}

fn reject(reason: RejectionReason) -> AppointmentError {
    warn!("Transition rejected: {}", reason);
    AppointmentError::PolicyViolation(reason)
}
