//! Calendars, stored events and the occurrences materialised from them.

use std::fmt;
use std::ops::Deref;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ValidationError};
use crate::recurrence::RecurrenceSpec;
use crate::reminder::ReminderRule;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub u64);

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalendarId(pub u64);

impl fmt::Display for CalendarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The entity a calendar belongs to (a user, a team, a room...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OwnerRef {
    pub kind: String,
    pub id: String,
}

impl OwnerRef {
    pub fn new(
        kind: impl Into<String>,
        id: impl Into<String>,
    ) -> std::result::Result<Self, ValidationError> {
        let owner = Self {
            kind: kind.into(),
            id: id.into(),
        };
        if owner.kind.trim().is_empty() || owner.id.trim().is_empty() {
            return Err(ValidationError::InvalidOwner);
        }
        Ok(owner)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calendar {
    pub id: CalendarId,
    pub owner: OwnerRef,
    pub name: String,
    pub color: String,
}

impl Calendar {
    /// A stable `#RRGGBB` colour for a calendar, derived from owner and name.
    ///
    /// FNV-1a over `kind`, `id` and `name`, each followed by a zero byte.
    pub fn color_for(owner: &OwnerRef, name: &str) -> String {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        let mut hash = FNV_OFFSET;
        for part in [owner.kind.as_str(), owner.id.as_str(), name] {
            for byte in part.bytes().chain(std::iter::once(0)) {
                hash ^= u64::from(byte);
                hash = hash.wrapping_mul(FNV_PRIME);
            }
        }
        format!("#{:06X}", hash & 0xFF_FFFF)
    }
}

/// A validated, persist-ready event as produced by the builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub title: String,
    pub description: String,
    pub is_whole_day: bool,
    pub original_start_date: NaiveDate,
    pub original_end_date: Option<NaiveDate>,
    pub original_start_time: NaiveTime,
    pub original_end_time: NaiveTime,
    pub utc_start_timestamp: DateTime<Utc>,
    pub utc_end_timestamp: DateTime<Utc>,
    pub timezone: Tz,
    pub utc_offset: String,
    pub is_infinite: bool,
    pub rrule: String,
    #[serde(default)]
    pub meta_data: Map<String, Value>,
    #[serde(default)]
    pub reminders: Vec<ReminderRule>,
}

impl EventRecord {
    /// Parse the stored recurrence rule.
    pub fn recurrence(&self) -> Result<RecurrenceSpec> {
        self.rrule.parse()
    }

    /// Last instant of the series when it was given an explicit end date.
    ///
    /// Without one, `utc_end_timestamp` only marks the end of the first day,
    /// so it says nothing about where a COUNT series stops.
    pub fn series_end(&self) -> Option<DateTime<Utc>> {
        self.original_end_date.map(|_| self.utc_end_timestamp)
    }

    /// Cheap range check: could any occurrence fall in `[start, end]`?
    pub fn may_overlap(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        if self.is_infinite {
            return true;
        }
        self.utc_start_timestamp <= end && self.series_end().is_none_or(|e| e >= start)
    }

    /// Case-insensitive substring match on the title.
    pub fn title_matches(&self, needle: &str) -> bool {
        self.title.to_lowercase().contains(&needle.to_lowercase())
    }
}

/// A stored event: a record plus the identifiers assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub calendar_id: CalendarId,
    #[serde(flatten)]
    pub record: EventRecord,
}

impl Deref for Event {
    type Target = EventRecord;

    fn deref(&self) -> &EventRecord {
        &self.record
    }
}

/// One concrete occurrence of an event, localised to the caller's timezone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Occurrence {
    pub event_id: EventId,
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    pub title: String,
    pub description: String,
    pub is_whole_day: bool,
}
