// libs/appointment-cell/src/services/conflict.rs
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilter, AppointmentStatus,
    AppointmentValidationRules, ConflictCheckResponse, SuggestedSlot,
};
use crate::services::time_range::overlaps;
use crate::store::{bounded, AppointmentStore};

pub struct ConflictDetectionService {
    store: Arc<dyn AppointmentStore>,
    rules: AppointmentValidationRules,
}

/// The one conflict predicate. Used for the stored rows of every
/// create, time-changing update, reschedule and slot suggestion.
pub fn is_conflicting(
    existing: &Appointment,
    professional_id: Uuid,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    exclude_appointment_id: Option<Uuid>,
) -> bool {
    existing.professional_id == professional_id
        && existing.status.blocks_calendar()
        && !existing.is_deleted()
        && Some(existing.id) != exclude_appointment_id
        && overlaps(existing.start_time, existing.end_time, start_time, end_time)
}

impl ConflictDetectionService {
    pub fn new(store: Arc<dyn AppointmentStore>, rules: AppointmentValidationRules) -> Self {
        Self { store, rules }
    }

    /// Check a professional's calendar for bookings overlapping
    /// `[start_time, end_time)`.
    pub async fn check_conflicts(
        &self,
        professional_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        timeout: StdDuration,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        debug!(
            "Checking conflicts for professional {} from {} to {}",
            professional_id, start_time, end_time
        );

        let existing = self
            .blocking_appointments(professional_id, start_time, end_time, timeout)
            .await?;

        let conflicting_appointments: Vec<Appointment> = existing
            .into_iter()
            .filter(|a| is_conflicting(a, professional_id, start_time, end_time, exclude_appointment_id))
            .collect();

        let has_conflict = !conflicting_appointments.is_empty();
        let suggested_alternatives = if has_conflict {
            warn!(
                "Conflict detected for professional {} - {} conflicting appointments",
                professional_id,
                conflicting_appointments.len()
            );
            self.suggest_alternatives(professional_id, start_time, end_time, exclude_appointment_id, timeout)
                .await?
        } else {
            Vec::new()
        };

        Ok(ConflictCheckResponse {
            has_conflict,
            conflicting_appointments,
            suggested_alternatives,
        })
    }

    /// Like `check_conflicts`, but any conflict is an error.
    pub async fn ensure_available(
        &self,
        professional_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        timeout: StdDuration,
    ) -> Result<(), AppointmentError> {
        let response = self
            .check_conflicts(professional_id, start_time, end_time, exclude_appointment_id, timeout)
            .await?;

        if response.has_conflict {
            return Err(AppointmentError::Conflict {
                conflicts: response.conflicting_appointments,
                suggested_alternatives: response.suggested_alternatives,
            });
        }
        Ok(())
    }

    /// Free slots of the same length later on the same (UTC) day, in fixed
    /// steps after the requested start.
    pub async fn suggest_alternatives(
        &self,
        professional_id: Uuid,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        exclude_appointment_id: Option<Uuid>,
        timeout: StdDuration,
    ) -> Result<Vec<SuggestedSlot>, AppointmentError> {
        let wanted = self.rules.alternative_slot_count;
        let step = Duration::minutes(self.rules.alternative_slot_step_minutes);
        if wanted == 0 || step <= Duration::zero() {
            return Ok(Vec::new());
        }

        let length = end_time - start_time;
        let day_end = start_time.date_naive().and_time(NaiveTime::default()).and_utc() + Duration::days(1);

        let day = self
            .blocking_appointments(professional_id, start_time, day_end, timeout)
            .await?;

        let mut suggestions = Vec::with_capacity(wanted);
        let mut candidate = start_time + step;
        while candidate + length <= day_end && suggestions.len() < wanted {
            let candidate_end = candidate + length;
            let taken = day
                .iter()
                .any(|a| is_conflicting(a, professional_id, candidate, candidate_end, exclude_appointment_id));
            if !taken {
                suggestions.push(SuggestedSlot {
                    professional_id,
                    start_time: candidate,
                    end_time: candidate_end,
                });
            }
            candidate += step;
        }

        debug!(
            "Found {} alternative slots for professional {} on {}",
            suggestions.len(),
            professional_id,
            start_time.date_naive()
        );
        Ok(suggestions)
    }

    async fn blocking_appointments(
        &self,
        professional_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        timeout: StdDuration,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let filter = AppointmentFilter {
            professional_id: Some(professional_id),
            statuses: Some(AppointmentStatus::calendar_blocking()),
            starts_before: Some(to),
            ends_after: Some(from),
            include_deleted: false,
            ..AppointmentFilter::default()
        };

        Ok(bounded(timeout, self.store.find(&filter)).await?)
    }
}
