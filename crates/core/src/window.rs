//! Polling-window derivation.
//!
//! The window start is computed in the job's local time: shift the current
//! instant back `days_back` days, pin the wall time to `(start_hour, 0, 0,
//! 0)`, then convert to UTC for the upstream query parameters (unix seconds
//! for the question boards, second-precision ISO-8601 for the GraphQL
//! `created:>` filter).

use chrono::{DateTime, Duration, Local, TimeZone, Utc};

/// UTC boundary of one polling window, pre-rendered in the formats the
/// upstream clients send.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryWindow {
    pub start_utc: DateTime<Utc>,
    /// `fromdate` for question-board fetches (unix seconds).
    pub from_unix: i64,
    /// `created:>` operand for GraphQL search (no fractional seconds).
    pub created_after_iso: String,
}

impl QueryWindow {
    pub fn derive(now: DateTime<Local>, days_back: u16, start_hour: u8) -> Self {
        let day = now - Duration::days(i64::from(days_back));
        let naive = day
            .date_naive()
            .and_hms_opt(u32::from(start_hour), 0, 0)
            .unwrap_or_else(|| day.date_naive().and_hms_opt(0, 0, 0).unwrap());

        // DST gaps can make the pinned wall time nonexistent; fall back to
        // interpreting it with the current offset.
        let start_utc = match Local.from_local_datetime(&naive).earliest() {
            Some(local) => local.with_timezone(&Utc),
            None => {
                let shifted =
                    naive - Duration::seconds(i64::from(now.offset().local_minus_utc()));
                Utc.from_utc_datetime(&shifted)
            }
        };
        Self {
            start_utc,
            from_unix: start_utc.timestamp(),
            created_after_iso: start_utc.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }
}
