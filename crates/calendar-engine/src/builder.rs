//! Fluent construction of validated events.
//!
//! Every fallible step returns `Result<Self>` so a chain reads
//!
//! ```no_run
//! # use calendar_engine::{CalendarConfig, EventBuilder, OwnerRef};
//! # fn main() -> calendar_engine::error::Result<()> {
//! let config = CalendarConfig::default();
//! let owner = OwnerRef::new("user", "42")?;
//! let record = EventBuilder::new(owner, chrono_tz::Europe::Berlin, &config)
//!     .title("Standup")
//!     .time("09:00", "09:15")?
//!     .start_at("2025-01-06")?
//!     .weekly(&[], 1)?
//!     .repeat(10)?
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use serde_json::{Map, Value};

use crate::config::CalendarConfig;
use crate::dst::{resolve_local, utc_offset_at};
use crate::error::{Result, ValidationError};
use crate::event::{Event, EventRecord, OwnerRef};
use crate::jobs::{GenerateRemindersTask, Task};
use crate::recurrence::{
    Frequency, RecurrenceSpec, Termination, WeekdayToken, MAX_INTERVAL,
};
use crate::reminder::{RawReminder, ReminderRule};
use crate::store::{CalendarResolver, EventStore, TaskQueue};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M";

fn day_start() -> NaiveTime {
    NaiveTime::MIN
}

fn day_end() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 0).unwrap_or(NaiveTime::MIN)
}

pub(crate) fn parse_date(
    field: &'static str,
    value: &str,
) -> std::result::Result<NaiveDate, ValidationError> {
    let invalid = || ValidationError::InvalidDate {
        field,
        value: value.to_string(),
    };
    let date = NaiveDate::parse_from_str(value, DATE_FORMAT).map_err(|_| invalid())?;
    // Reject forms chrono tolerates but that do not round-trip, e.g. "2025-1-5".
    if date.format(DATE_FORMAT).to_string() != value {
        return Err(invalid());
    }
    Ok(date)
}

fn parse_time(value: &str) -> std::result::Result<NaiveTime, ValidationError> {
    NaiveTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|_| ValidationError::InvalidTime(value.to_string()))
}

#[derive(Debug, Clone)]
pub struct EventBuilder {
    owner: OwnerRef,
    config: CalendarConfig,
    timezone: Tz,
    title: String,
    description: String,
    is_whole_day: bool,
    meta_data: Map<String, Value>,
    reminders: Vec<ReminderRule>,
    start_time: NaiveTime,
    end_time: NaiveTime,
    start_date: Option<NaiveDate>,
    end_date: Option<NaiveDate>,
    dtstart: Option<DateTime<Utc>>,
    termination: Termination,
    frequency: Option<Frequency>,
    interval: u32,
    by_day: Vec<WeekdayToken>,
    by_month_day: Vec<i8>,
    by_month: Vec<u8>,
}

impl EventBuilder {
    /// Start an event for `owner`, authored in `timezone` (the caller's
    /// declared zone).
    pub fn new(owner: OwnerRef, timezone: Tz, config: &CalendarConfig) -> Self {
        Self {
            owner,
            config: config.clone(),
            timezone,
            title: "No Title".to_string(),
            description: String::new(),
            is_whole_day: false,
            meta_data: Map::new(),
            reminders: vec![ReminderRule::default()],
            start_time: day_start(),
            end_time: day_end(),
            start_date: None,
            end_date: None,
            dtstart: None,
            termination: Termination::Infinite,
            frequency: None,
            interval: 1,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
        }
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Whole-day events always span 00:00 to 23:59, whatever `time()` said.
    pub fn whole_day(mut self, is_whole_day: bool) -> Self {
        self.is_whole_day = is_whole_day;
        self
    }

    /// Change the authoring timezone. Dates already set are re-anchored in
    /// the new zone.
    pub fn timezone(mut self, timezone: Tz) -> Result<Self> {
        self.timezone = timezone;
        if let Some(start) = self.start_date {
            self.dtstart = Some(self.local_instant(start, day_start())?);
        }
        if let (Some(end), Termination::Until(_)) = (self.end_date, self.termination) {
            self.termination = Termination::Until(self.local_instant(end, day_start())?);
        }
        Ok(self)
    }

    pub fn meta_data(mut self, meta_data: Map<String, Value>) -> Self {
        self.meta_data = meta_data;
        self
    }

    /// Wall-clock bounds of each occurrence, `HH:MM`.
    pub fn time(mut self, start: &str, end: &str) -> Result<Self> {
        let start_time = parse_time(start)?;
        let end_time = parse_time(end)?;
        if start_time >= end_time {
            return Err(ValidationError::StartNotBeforeEnd {
                start: start.to_string(),
                end: end.to_string(),
            }
            .into());
        }
        self.start_time = start_time;
        self.end_time = end_time;
        Ok(self)
    }

    /// Replace the reminder set. Entries are validated here, once.
    pub fn reminders<I>(mut self, reminders: I) -> Result<Self>
    where
        I: IntoIterator<Item = RawReminder>,
    {
        self.reminders = reminders
            .into_iter()
            .map(|r| ReminderRule::parse(&r.kind, r.offset))
            .collect::<std::result::Result<_, _>>()?;
        Ok(self)
    }

    /// First day of the series (`YYYY-MM-DD`); becomes DTSTART.
    pub fn start_at(mut self, date: &str) -> Result<Self> {
        let start = parse_date("start", date)?;
        if self.end_date.is_some_and(|end| start > end) {
            return Err(ValidationError::StartAfterEnd.into());
        }
        self.dtstart = Some(self.local_instant(start, day_start())?);
        self.start_date = Some(start);
        Ok(self)
    }

    /// Last day of the series (`YYYY-MM-DD`); becomes UNTIL.
    pub fn end_at(mut self, date: &str) -> Result<Self> {
        self.ensure_open_ended("ends at")?;
        let end = parse_date("end", date)?;
        if self.start_date.is_some_and(|start| end < start) {
            return Err(ValidationError::EndBeforeStart.into());
        }
        self.termination = Termination::Until(self.local_instant(end, day_start())?);
        self.end_date = Some(end);
        Ok(self)
    }

    /// Number of occurrences in the series; becomes COUNT.
    pub fn repeat(mut self, count: u32) -> Result<Self> {
        self.ensure_open_ended("repeat")?;
        if count == 0 {
            return Err(ValidationError::NonPositiveCount.into());
        }
        self.termination = Termination::Count(count);
        Ok(self)
    }

    pub fn daily(self, by_day: &[WeekdayToken], interval: u32) -> Result<Self> {
        self.with_rule(Frequency::Daily, interval, by_day, &[], &[])
    }

    pub fn weekly(self, by_day: &[WeekdayToken], interval: u32) -> Result<Self> {
        self.with_rule(Frequency::Weekly, interval, by_day, &[], &[])
    }

    /// Monthly on the given days of the month, or else on the given weekdays.
    /// When both are supplied only `by_month_day` is used.
    pub fn monthly(
        self,
        by_month_day: &[i8],
        by_day: &[WeekdayToken],
        interval: u32,
    ) -> Result<Self> {
        if !by_month_day.is_empty() && !by_day.is_empty() {
            tracing::debug!("monthly(): BYMONTHDAY given, ignoring BYDAY");
            return self.with_rule(Frequency::Monthly, interval, &[], by_month_day, &[]);
        }
        self.with_rule(Frequency::Monthly, interval, by_day, by_month_day, &[])
    }

    pub fn yearly(
        self,
        by_month: &[u8],
        by_month_day: &[i8],
        by_day: &[WeekdayToken],
        interval: u32,
    ) -> Result<Self> {
        self.with_rule(Frequency::Yearly, interval, by_day, by_month_day, by_month)
    }

    fn with_rule(
        mut self,
        frequency: Frequency,
        interval: u32,
        by_day: &[WeekdayToken],
        by_month_day: &[i8],
        by_month: &[u8],
    ) -> Result<Self> {
        if interval == 0 {
            return Err(ValidationError::NonPositiveInterval.into());
        }
        if interval > MAX_INTERVAL {
            return Err(ValidationError::IntervalTooLarge(interval).into());
        }
        self.frequency = Some(frequency);
        self.interval = interval;
        self.by_day = by_day.to_vec();
        self.by_month_day = by_month_day.to_vec();
        self.by_month = by_month.to_vec();
        Ok(self)
    }

    fn ensure_open_ended(
        &self,
        rejected: &'static str,
    ) -> std::result::Result<(), ValidationError> {
        if self.termination == Termination::Infinite {
            Ok(())
        } else {
            Err(ValidationError::ConflictingTermination {
                rejected,
                existing: self.termination.label(),
            })
        }
    }

    fn local_instant(
        &self,
        date: NaiveDate,
        time: NaiveTime,
    ) -> std::result::Result<DateTime<Utc>, ValidationError> {
        let local = date.and_time(time);
        resolve_local(self.timezone, local, self.config.dst_policy).ok_or_else(|| {
            ValidationError::NonexistentLocalTime(local.to_string(), self.timezone.to_string())
        })
    }

    /// Validate and derive the persist-ready record without touching any
    /// collaborator.
    pub fn build(&self) -> Result<EventRecord> {
        let start_date = self.start_date.ok_or(ValidationError::MissingStartDate)?;
        let dtstart = self.dtstart.ok_or(ValidationError::MissingStartDate)?;

        let (start_time, end_time) = if self.is_whole_day {
            (day_start(), day_end())
        } else {
            (self.start_time, self.end_time)
        };

        // Without a frequency the event happens once, unless an end rule
        // asks for a daily series.
        let (frequency, termination) = match (self.frequency, self.termination) {
            (Some(frequency), termination) => (frequency, termination),
            (None, Termination::Infinite) => (Frequency::Daily, Termination::Count(1)),
            (None, termination) => (Frequency::Daily, termination),
        };

        let spec = RecurrenceSpec {
            frequency,
            interval: self.interval,
            termination,
            by_day: self.by_day.clone(),
            by_month_day: self.by_month_day.clone(),
            by_month: self.by_month.clone(),
            dtstart,
        }
        .normalize();
        spec.validate()?;

        let utc_start_timestamp = self.local_instant(start_date, start_time)?;
        // Same-day end unless an explicit end date was given.
        let utc_end_timestamp =
            self.local_instant(self.end_date.unwrap_or(start_date), end_time)?;

        Ok(EventRecord {
            title: self.title.clone(),
            description: self.description.clone(),
            is_whole_day: self.is_whole_day,
            original_start_date: start_date,
            original_end_date: self.end_date,
            original_start_time: start_time,
            original_end_time: end_time,
            utc_start_timestamp,
            utc_end_timestamp,
            timezone: self.timezone,
            utc_offset: utc_offset_at(self.timezone, utc_start_timestamp),
            is_infinite: spec.is_infinite(),
            rrule: spec.to_string(),
            meta_data: self.meta_data.clone(),
            reminders: self.reminders.clone(),
        })
    }

    /// Build the event, persist it in the owner's `calendar_name` calendar
    /// and, when reminders are enabled, queue reminder generation for it.
    pub fn create<S, Q>(self, calendar_name: &str, store: &S, queue: &Q) -> Result<Event>
    where
        S: CalendarResolver + EventStore + ?Sized,
        Q: TaskQueue + ?Sized,
    {
        let record = self.build()?;
        let name = if calendar_name.trim().is_empty() {
            self.config.default_calendar.as_str()
        } else {
            calendar_name
        };

        let calendar = store.resolve_or_create(&self.owner, name)?;
        let event = store.create_event(&calendar, record)?;
        tracing::info!(
            event_id = %event.id,
            calendar = %calendar.name,
            rrule = %event.rrule,
            "created calendar event"
        );

        if self.config.allow_reminders {
            queue.enqueue(Task::GenerateReminders(GenerateRemindersTask {
                event_id: event.id,
            }))?;
        }

        Ok(event)
    }
}
