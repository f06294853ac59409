//! DST transition policies for turning local wall-clock times into instants.
//!
//! Events are authored as a calendar date plus a wall-clock time in some IANA
//! zone. Most of the time that maps to exactly one instant. Around DST
//! transitions it may map to two (fall back) or none (spring forward); the
//! policy decides what happens in the second case. Ambiguous times always
//! resolve to the earlier instant.

use chrono::{DateTime, Duration, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

/// Longest DST gap we search across, in minutes.
const MAX_GAP_MINUTES: i64 = 180;

/// Policy for handling wall-clock times that fall during DST transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DstPolicy {
    /// Skip instances that fall in the DST gap (e.g., 2:30 AM during spring forward)
    Skip,
    /// Shift to the first valid time after the gap
    #[default]
    ShiftForward,
    /// Keep the wall clock reading and interpret it with the pre-transition
    /// offset (2:30 AM becomes 3:30 AM after a one-hour spring forward)
    WallClock,
}

/// Resolve a local wall-clock time in `tz` to a UTC instant.
///
/// Returns `None` only when the time falls in a DST gap and the policy is
/// [`DstPolicy::Skip`].
pub fn resolve_local(tz: Tz, local: NaiveDateTime, policy: DstPolicy) -> Option<DateTime<Utc>> {
    if let Some(dt) = tz.from_local_datetime(&local).earliest() {
        return Some(dt.with_timezone(&Utc));
    }

    match policy {
        DstPolicy::Skip => None,
        DstPolicy::ShiftForward => (1..=MAX_GAP_MINUTES)
            .map(|m| local + Duration::minutes(m))
            .find_map(|candidate| tz.from_local_datetime(&candidate).earliest())
            .map(|dt| dt.with_timezone(&Utc)),
        DstPolicy::WallClock => {
            let before = local - Duration::minutes(MAX_GAP_MINUTES);
            let offset = tz.from_local_datetime(&before).earliest()?.offset().fix();
            let utc = local - Duration::seconds(i64::from(offset.local_minus_utc()));
            Some(Utc.from_utc_datetime(&utc))
        }
    }
}

/// Format the UTC offset of `tz` at `instant` as a signed `HH:MM` string.
pub fn utc_offset_at(tz: Tz, instant: DateTime<Utc>) -> String {
    instant.with_timezone(&tz).format("%:z").to_string()
}
