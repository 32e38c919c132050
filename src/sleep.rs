//! Sleep duration calculation
//!
//! Converts sleep session intervals into whole minutes per night. A session
//! is attributed entirely to the calendar date of its start, so a session
//! crossing midnight is never split.

use tracing::warn;

use crate::reducer::calendar_date;
use crate::types::{DailySleepMap, RawMetricRecord};

/// Calculator for per-night sleep minutes
pub struct SleepCalculator;

impl SleepCalculator {
    /// Sum session minutes per start date.
    ///
    /// Sessions without an end time, or ending before they start, are
    /// skipped with a warning.
    pub fn minutes_by_date(sessions: &[RawMetricRecord]) -> DailySleepMap {
        let mut by_date = DailySleepMap::new();
        let mut skipped = 0usize;

        for session in sessions {
            match session_minutes(session) {
                Some(minutes) => {
                    *by_date.entry(calendar_date(&session.start_time)).or_insert(0) += minutes;
                }
                None => skipped += 1,
            }
        }

        if skipped > 0 {
            warn!(skipped, "skipped sleep sessions with missing or inverted end time");
        }

        by_date
    }
}

/// Whole minutes in one session, floored.
///
/// `None` when the session has no end time or ends before it starts.
pub fn session_minutes(session: &RawMetricRecord) -> Option<i64> {
    let end = session.end_time?;
    let elapsed = end - session.start_time;
    if elapsed.num_milliseconds() < 0 {
        return None;
    }
    Some(elapsed.num_minutes())
}
