//! # calendar-engine
//!
//! Recurring calendar events with timezone-correct occurrence expansion and
//! reminder scheduling.
//!
//! Events are authored as a date, a wall-clock time and a recurrence rule in
//! the author's IANA timezone. At query time every stored rule is expanded
//! with the `rrule` crate, each occurrence is pinned back to its wall-clock
//! time through a DST policy, and the result is presented in the caller's
//! timezone. Reminder instants are derived per occurrence.
//!
//! ## Modules
//!
//! - [`recurrence`] — recurrence data model and its `KEY=VALUE;...` wire form
//! - [`expander`] — rule → concrete instants inside a window
//! - [`dst`] — DST transition policies (skip, shift, wall clock)
//! - [`builder`] — fluent, validating event construction
//! - [`materializer`] — stored events + window → localised occurrences
//! - [`reminder`] — reminder rules and notification scheduling
//! - [`jobs`] — background reminder generation
//! - [`store`] — collaborator traits and in-memory implementations
//! - [`service`] — facade over the pieces above
//! - [`config`] — engine configuration
//! - [`error`] — Error types

pub mod builder;
pub mod config;
pub mod dst;
pub mod error;
pub mod event;
pub mod expander;
pub mod jobs;
pub mod materializer;
pub mod recurrence;
pub mod reminder;
pub mod service;
pub mod store;

pub use builder::EventBuilder;
pub use config::{caller_timezone, parse_timezone, CalendarConfig};
pub use dst::DstPolicy;
pub use error::{CalendarError, ValidationError};
pub use event::{Calendar, CalendarId, Event, EventId, EventRecord, Occurrence, OwnerRef};
pub use expander::RecurrenceEngine;
pub use jobs::{GenerateRemindersTask, Task};
pub use materializer::{OccurrenceMaterializer, QueryWindow};
pub use recurrence::{Frequency, RecurrenceSpec, Termination, WeekdayToken};
pub use reminder::{
    NewScheduledNotification, RawReminder, ReminderKind, ReminderRule, ReminderScheduler,
    ScheduledNotification,
};
pub use service::{CalendarService, EventsFilter};
pub use store::{InMemoryQueue, InMemoryStore, StoreSnapshot};
