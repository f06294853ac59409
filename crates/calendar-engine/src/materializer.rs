//! Occurrence materialisation: stored events plus a query window become
//! concrete, localised occurrences.
//!
//! Each event is expanded in its authoring timezone. Every occurrence date is
//! combined with the event's wall-clock start and end times, resolved through
//! the configured [`DstPolicy`], and finally re-expressed in the caller's
//! timezone. Results across events are sorted by start, then by event id.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;

use crate::builder::parse_date;
use crate::config::CalendarConfig;
use crate::dst::{resolve_local, DstPolicy};
use crate::error::{Result, ValidationError};
use crate::event::{Event, Occurrence};
use crate::expander::RecurrenceEngine;

/// How far before the window an anchor may sit and still produce an
/// occurrence inside it: one day of wall-clock offset plus DST slack.
const ANCHOR_SLACK_HOURS: i64 = 26;

/// First and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = date.with_day(1).unwrap_or(date);
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .unwrap_or(date);
    (first, last)
}

fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN)
}

/// An inclusive UTC query window with an optional title filter.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub search: Option<String>,
}

impl QueryWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start,
            end,
            search: None,
        }
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.search = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    /// Start of `first` through the last second of `last`, both local to `tz`.
    pub fn for_dates(first: NaiveDate, last: NaiveDate, tz: Tz) -> Result<Self> {
        let bound = |date: NaiveDate, time: NaiveTime| {
            let local = date.and_time(time);
            resolve_local(tz, local, DstPolicy::ShiftForward).ok_or_else(|| {
                ValidationError::NonexistentLocalTime(local.to_string(), tz.to_string())
            })
        };
        Ok(Self::new(
            bound(first, NaiveTime::MIN)?,
            bound(last, end_of_day())?,
        ))
    }

    /// Window from caller-supplied `YYYY-MM-DD` dates in the caller's zone.
    /// A missing start means the first day of the caller's current month, a
    /// missing end the last day of it.
    pub fn from_dates(
        start_date: Option<&str>,
        end_date: Option<&str>,
        caller_tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let (month_first, month_last) = month_bounds(now.with_timezone(&caller_tz).date_naive());
        let first = match start_date.map(str::trim).filter(|s| !s.is_empty()) {
            Some(date) => parse_date("start", date)?,
            None => month_first,
        };
        let last = match end_date.map(str::trim).filter(|s| !s.is_empty()) {
            Some(date) => parse_date("end", date)?,
            None => month_last,
        };
        Self::for_dates(first, last, caller_tz)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct OccurrenceMaterializer {
    dst_policy: DstPolicy,
    max_occurrences: usize,
}

impl OccurrenceMaterializer {
    pub fn new(config: &CalendarConfig) -> Self {
        Self {
            dst_policy: config.dst_policy,
            max_occurrences: config.max_occurrences,
        }
    }

    /// Occurrences of `events` starting inside `window`, localised to
    /// `caller_tz` and sorted by (start, event id).
    ///
    /// # Errors
    /// Returns `CalendarError::InvalidRule` if a stored rule cannot be parsed
    /// or expanded.
    pub fn materialize(
        &self,
        events: &[Event],
        window: &QueryWindow,
        caller_tz: Tz,
    ) -> Result<Vec<Occurrence>> {
        let mut occurrences = Vec::new();

        for event in events {
            if let Some(needle) = window.search.as_deref() {
                if !event.title_matches(needle) {
                    continue;
                }
            }
            if !event.may_overlap(window.start, window.end) {
                tracing::debug!(event_id = %event.id, "event outside window, pruned");
                continue;
            }
            occurrences.extend(self.expand_event(event, window, caller_tz)?);
        }

        occurrences.sort_by(|a, b| {
            a.start
                .cmp(&b.start)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(occurrences)
    }

    fn expand_event(
        &self,
        event: &Event,
        window: &QueryWindow,
        caller_tz: Tz,
    ) -> Result<Vec<Occurrence>> {
        let spec = event.recurrence()?;
        let tz = event.timezone;
        let engine = RecurrenceEngine::in_timezone(tz).with_max_occurrences(self.max_occurrences);
        let anchors = engine.occurrences_between(
            &spec,
            window.start - Duration::hours(ANCHOR_SLACK_HOURS),
            window.end,
        )?;

        let mut occurrences = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let date = anchor.with_timezone(&tz).date_naive();
            let Some(start) =
                resolve_local(tz, date.and_time(event.original_start_time), self.dst_policy)
            else {
                tracing::debug!(event_id = %event.id, %date, "start falls in DST gap, skipped");
                continue;
            };
            if start < window.start || start > window.end {
                continue;
            }
            let end = resolve_local(tz, date.and_time(event.original_end_time), self.dst_policy)
                .unwrap_or(start)
                .max(start);

            occurrences.push(Occurrence {
                event_id: event.id,
                start: start.with_timezone(&caller_tz),
                end: end.with_timezone(&caller_tz),
                title: event.title.clone(),
                description: event.description.clone(),
                is_whole_day: event.is_whole_day,
            });
        }

        Ok(occurrences)
    }
}
