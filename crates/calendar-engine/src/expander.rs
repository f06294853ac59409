//! Recurrence expansion -- turns a [`RecurrenceSpec`] into the concrete
//! instants that fall inside a query window.
//!
//! Wraps the `rrule` crate (v0.13). The spec is rendered as a
//! `DTSTART;TZID=...`/`RRULE:` block in the engine's expansion timezone, so
//! wall-clock anchors survive DST transitions when expanding in an authoring
//! zone, and the plain UTC semantics hold when expanding in UTC.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use rrule::RRuleSet;

use crate::error::{CalendarError, Result};
use crate::recurrence::RecurrenceSpec;

/// Default cap on instants returned by a single call.
pub const DEFAULT_MAX_OCCURRENCES: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecurrenceEngine {
    timezone: Tz,
    max_occurrences: usize,
}

impl Default for RecurrenceEngine {
    fn default() -> Self {
        Self::utc()
    }
}

impl RecurrenceEngine {
    /// Expand rules in UTC: every step is a fixed number of UTC days, weeks,
    /// months or years from DTSTART.
    pub fn utc() -> Self {
        Self::in_timezone(chrono_tz::UTC)
    }

    /// Expand rules in `timezone`, keeping the local wall-clock time of
    /// DTSTART fixed across DST changes.
    pub fn in_timezone(timezone: Tz) -> Self {
        Self {
            timezone,
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
        }
    }

    pub fn with_max_occurrences(mut self, max_occurrences: usize) -> Self {
        self.max_occurrences = max_occurrences;
        self
    }

    /// All instants of `spec` in `[window_start, window_end]` (inclusive),
    /// ascending and deduplicated.
    ///
    /// Never returns instants before DTSTART, after UNTIL, or past the
    /// COUNT-th instant of the series (counted from DTSTART, not from the
    /// window start). An infinite series is bounded by `window_end`.
    ///
    /// # Errors
    /// Returns `CalendarError::InvalidRule` if the `rrule` crate rejects the
    /// rendered rule.
    pub fn occurrences_between(
        &self,
        spec: &RecurrenceSpec,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>> {
        if window_end < window_start || window_end < spec.dtstart {
            return Ok(Vec::new());
        }
        if let Some(until) = spec.until() {
            if until < window_start {
                return Ok(Vec::new());
            }
        }

        let rrule_text = spec.to_rrule_text(self.timezone);
        let rule_set: RRuleSet = rrule_text
            .parse()
            .map_err(|e| CalendarError::InvalidRule(format!("{}", e)))?;

        let lower = window_start.max(spec.dtstart);
        let upper = match spec.until() {
            Some(until) => window_end.min(until),
            None => window_end,
        };

        let mut instants: Vec<DateTime<Utc>> = Vec::new();
        for dt in &rule_set {
            let instant = dt.with_timezone(&Utc);
            if instant > upper {
                break;
            }
            if instant < lower {
                continue;
            }
            if instants.last() == Some(&instant) {
                continue;
            }
            if instants.len() == self.max_occurrences {
                tracing::warn!(
                    rule = %spec,
                    limit = self.max_occurrences,
                    "occurrence limit reached, truncating expansion"
                );
                break;
            }
            instants.push(instant);
        }

        tracing::trace!(
            rule = %spec,
            timezone = %self.timezone,
            found = instants.len(),
            "expanded recurrence"
        );

        Ok(instants)
    }
}
