// libs/appointment-cell/src/services/time_range.rs
use chrono::{DateTime, Duration, Utc};

/// Half-open `[start, end)` windows intersect. Touching windows do not.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

/// Whole minutes between `start` and `end`, rounded to nearest.
pub fn duration_minutes(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let millis = (end - start).num_milliseconds();
    (millis as f64 / 60_000.0).round() as i64
}

/// A resolved appointment window with `end == start + duration_minutes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
}

/// Work out the end of a window. An explicit end wins over an explicit
/// duration, which wins over the service default, which falls back to
/// `fallback_minutes`.
///
/// An explicit end is normalized to a whole number of minutes after start.
pub fn resolve_window(
    start: DateTime<Utc>,
    explicit_end: Option<DateTime<Utc>>,
    duration: Option<i64>,
    service_default: Option<i64>,
    fallback_minutes: i64,
) -> Result<TimeWindow, String> {
    let minutes = match (explicit_end, duration) {
        (Some(end), _) => {
            if end <= start {
                return Err(format!("end time {} must be after start time {}", end, start));
            }
            duration_minutes(start, end)
        }
        (None, Some(minutes)) => minutes,
        (None, None) => service_default
            .filter(|m| *m > 0)
            .unwrap_or(fallback_minutes),
    };

    if minutes <= 0 {
        return Err(format!("duration must be positive, got {} minutes", minutes));
    }

    let end = Duration::try_minutes(minutes)
        .and_then(|length| start.checked_add_signed(length))
        .ok_or_else(|| format!("duration out of range: {} minutes", minutes))?;

    Ok(TimeWindow {
        start,
        end,
        duration_minutes: minutes,
    })
}
