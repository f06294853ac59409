//! Reminder rules and the scheduler that turns occurrences into notification
//! instants.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ValidationError;
use crate::event::{Event, EventId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Minutes,
    Hours,
    Days,
    Weeks,
}

impl ReminderKind {
    pub const ALL: [ReminderKind; 4] = [
        ReminderKind::Minutes,
        ReminderKind::Hours,
        ReminderKind::Days,
        ReminderKind::Weeks,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ReminderKind::Minutes => "minutes",
            ReminderKind::Hours => "hours",
            ReminderKind::Days => "days",
            ReminderKind::Weeks => "weeks",
        }
    }

    /// Offset used when a rule does not state one.
    pub fn default_offset(self) -> u32 {
        match self {
            ReminderKind::Minutes => 10,
            ReminderKind::Hours | ReminderKind::Days | ReminderKind::Weeks => 1,
        }
    }

    pub fn duration(self, offset: u32) -> Duration {
        let n = i64::from(offset);
        match self {
            ReminderKind::Minutes => Duration::minutes(n),
            ReminderKind::Hours => Duration::hours(n),
            ReminderKind::Days => Duration::days(n),
            ReminderKind::Weeks => Duration::weeks(n),
        }
    }

    fn allowed() -> String {
        Self::ALL
            .iter()
            .map(|k| k.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for ReminderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReminderKind {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, ValidationError> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutes" => Ok(ReminderKind::Minutes),
            "hours" => Ok(ReminderKind::Hours),
            "days" => Ok(ReminderKind::Days),
            "weeks" => Ok(ReminderKind::Weeks),
            _ => Err(ValidationError::UnknownReminderKind {
                kind: s.to_string(),
                allowed: Self::allowed(),
            }),
        }
    }
}

// Stored rules are read leniently: an unrecognised kind behaves like minutes.
impl<'de> Deserialize<'de> for ReminderKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(raw.parse().unwrap_or_else(|_| {
            tracing::warn!(kind = %raw, "unrecognised reminder kind, falling back to minutes");
            ReminderKind::Minutes
        }))
    }
}

/// How far before an occurrence a notification fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReminderRule {
    #[serde(alias = "type")]
    pub kind: ReminderKind,
    #[serde(alias = "nth")]
    pub offset: u32,
}

impl ReminderRule {
    pub fn new(kind: ReminderKind, offset: u32) -> Self {
        Self { kind, offset }
    }

    /// Validate a reminder as supplied by a caller. A missing offset takes the
    /// kind's default.
    pub fn parse(kind: &str, offset: Option<u32>) -> Result<Self, ValidationError> {
        let kind: ReminderKind = kind.parse()?;
        let offset = offset.unwrap_or_else(|| kind.default_offset());
        if offset == 0 {
            return Err(ValidationError::NonPositiveReminderOffset);
        }
        Ok(Self { kind, offset })
    }

    /// The instant this rule fires for an occurrence starting at `start`, or
    /// `None` when the offset reaches past the representable range.
    pub fn fire_at(&self, start: DateTime<Utc>) -> Option<DateTime<Utc>> {
        start.checked_sub_signed(self.kind.duration(self.offset))
    }
}

impl Default for ReminderRule {
    fn default() -> Self {
        Self::new(ReminderKind::Minutes, ReminderKind::Minutes.default_offset())
    }
}

/// A reminder as supplied by a caller, before validation.
///
/// Accepts both `{"kind", "offset"}` and the legacy `{"type", "nth"}` keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawReminder {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, alias = "nth")]
    pub offset: Option<u32>,
}

impl RawReminder {
    pub fn new(kind: impl Into<String>, offset: Option<u32>) -> Self {
        Self {
            kind: kind.into(),
            offset,
        }
    }
}

impl FromStr for RawReminder {
    type Err = ValidationError;

    /// `minutes`, `hours:2`, ...
    fn from_str(s: &str) -> Result<Self, ValidationError> {
        match s.split_once(':') {
            Some((kind, offset)) => {
                let offset = offset.trim().parse().map_err(|_| {
                    ValidationError::InvalidReminderOffset(offset.trim().to_string())
                })?;
                Ok(Self::new(kind.trim(), Some(offset)))
            }
            None => Ok(Self::new(s.trim(), None)),
        }
    }
}

/// A notification ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScheduledNotification {
    pub calendar_event_id: EventId,
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub id: u64,
    pub calendar_event_id: EventId,
    pub title: String,
    pub body: String,
    pub scheduled_at: DateTime<Utc>,
    pub idempotency_key: String,
}

impl ScheduledNotification {
    pub fn from_new(id: u64, new: NewScheduledNotification) -> Self {
        Self {
            id,
            calendar_event_id: new.calendar_event_id,
            title: new.title,
            body: new.body,
            scheduled_at: new.scheduled_at,
            idempotency_key: new.idempotency_key,
        }
    }
}

/// Key identifying one reminder of one occurrence; repeated generation runs
/// produce the same key.
pub fn idempotency_key(
    event_id: EventId,
    occurrence_start: DateTime<Utc>,
    rule: &ReminderRule,
) -> String {
    format!(
        "{}:{}:{}:{}",
        event_id,
        occurrence_start.format("%Y-%m-%dT%H:%M:%SZ"),
        rule.kind,
        rule.offset
    )
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ReminderScheduler;

impl ReminderScheduler {
    /// One candidate instant per rule, in rule order, past or not. Rules whose
    /// instant cannot be represented are skipped.
    pub fn candidates(
        rules: &[ReminderRule],
        occurrence_start: DateTime<Utc>,
    ) -> Vec<(ReminderRule, DateTime<Utc>)> {
        rules
            .iter()
            .filter_map(|rule| match rule.fire_at(occurrence_start) {
                Some(at) => Some((*rule, at)),
                None => {
                    tracing::warn!(
                        kind = %rule.kind,
                        offset = rule.offset,
                        %occurrence_start,
                        "reminder offset out of range, skipping"
                    );
                    None
                }
            })
            .collect()
    }

    /// Notifications for one occurrence of `event`. Candidates at or before
    /// `now` are dropped, never backfilled.
    pub fn schedule(
        event: &Event,
        occurrence_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Vec<NewScheduledNotification> {
        Self::candidates(&event.reminders, occurrence_start)
            .into_iter()
            .filter(|(_, at)| *at > now)
            .map(|(rule, at)| NewScheduledNotification {
                calendar_event_id: event.id,
                title: event.title.clone(),
                body: event.description.clone(),
                scheduled_at: at,
                idempotency_key: idempotency_key(event.id, occurrence_start, &rule),
            })
            .collect()
    }
}
