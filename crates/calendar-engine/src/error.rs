//! Error types for calendar-engine operations.

use thiserror::Error;

use crate::event::EventId;

/// Input rejected while assembling an event or a recurrence rule.
///
/// Always surfaced synchronously at construction time. Callers recover by
/// correcting the input; nothing here is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please provide a valid {field} date (expected YYYY-MM-DD, got '{value}')")]
    InvalidDate { field: &'static str, value: String },

    #[error("Please provide a valid time (expected HH:MM, got '{0}')")]
    InvalidTime(String),

    #[error("Start time must be before end time ({start} >= {end})")]
    StartNotBeforeEnd { start: String, end: String },

    #[error("Start at should not be greater than end at")]
    StartAfterEnd,

    #[error("End at should not be less than start at")]
    EndBeforeStart,

    #[error("You can't set {rejected} if you already set {existing}")]
    ConflictingTermination {
        rejected: &'static str,
        existing: &'static str,
    },

    #[error("Invalid repeat rule. Repeat value must be greater than zero")]
    NonPositiveCount,

    #[error("Interval must be greater than zero")]
    NonPositiveInterval,

    #[error("Interval {0} is too large (at most 65535)")]
    IntervalTooLarge(u32),

    #[error("Please provide a valid reminder type '{kind}'. types: {allowed}")]
    UnknownReminderKind { kind: String, allowed: String },

    #[error("Reminder offset must be greater than zero")]
    NonPositiveReminderOffset,

    #[error("Invalid reminder offset '{0}'")]
    InvalidReminderOffset(String),

    #[error("Please provide a valid start date")]
    MissingStartDate,

    #[error("Please provide a valid owner (kind and id must not be empty)")]
    InvalidOwner,

    #[error("Invalid weekday token '{0}'")]
    InvalidWeekday(String),

    #[error("BYMONTHDAY value {0} is outside -31..=31 or zero")]
    InvalidMonthDay(i8),

    #[error("BYMONTH value {0} is outside 1..=12")]
    InvalidMonth(u8),

    #[error("Local time {0} does not exist in timezone {1}")]
    NonexistentLocalTime(String, String),
}

#[derive(Error, Debug)]
pub enum CalendarError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Invalid RRULE: {0}")]
    InvalidRule(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Task dispatch error: {0}")]
    Dispatch(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CalendarError>;
