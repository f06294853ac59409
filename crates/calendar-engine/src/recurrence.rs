//! Recurrence specifications and their persisted `KEY=VALUE` wire form.
//!
//! A [`RecurrenceSpec`] is the normalized recurrence of an event: frequency,
//! interval, termination, BY* filters and the DTSTART anchor. Events store it
//! compiled to a compact string such as
//! `FREQ=MONTHLY;INTERVAL=1;BYMONTHDAY=31;DTSTART=2025-01-31T00:00:00Z`,
//! which parses back to an equivalent spec.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc, Weekday};
use chrono_tz::Tz;

use crate::error::{CalendarError, Result, ValidationError};

/// Instant format used by DTSTART and UNTIL in the wire form.
pub const WIRE_INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Largest INTERVAL the expander accepts.
pub const MAX_INTERVAL: u32 = u16::MAX as u32;

/// Basic-format datetime understood by the `rrule` crate.
const ICAL_DATETIME_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Wire keys, in the order they are compiled.
const KEYS: [&str; 8] = [
    "FREQ",
    "INTERVAL",
    "COUNT",
    "UNTIL",
    "BYDAY",
    "BYMONTHDAY",
    "BYMONTH",
    "DTSTART",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DAILY" => Ok(Frequency::Daily),
            "WEEKLY" => Ok(Frequency::Weekly),
            "MONTHLY" => Ok(Frequency::Monthly),
            "YEARLY" => Ok(Frequency::Yearly),
            other => Err(CalendarError::InvalidRule(format!(
                "unsupported FREQ '{}' (expected DAILY, WEEKLY, MONTHLY or YEARLY)",
                other
            ))),
        }
    }
}

/// A BYDAY entry: a weekday with an optional ordinal (`MO`, `2TU`, `-1FR`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WeekdayToken {
    pub ordinal: Option<i8>,
    pub weekday: Weekday,
}

impl WeekdayToken {
    pub fn every(weekday: Weekday) -> Self {
        Self {
            ordinal: None,
            weekday,
        }
    }

    pub fn nth(ordinal: i8, weekday: Weekday) -> Self {
        Self {
            ordinal: Some(ordinal),
            weekday,
        }
    }
}

fn weekday_code(weekday: Weekday) -> &'static str {
    match weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    }
}

impl fmt::Display for WeekdayToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(n) = self.ordinal {
            write!(f, "{}", n)?;
        }
        f.write_str(weekday_code(self.weekday))
    }
}

impl FromStr for WeekdayToken {
    type Err = ValidationError;

    fn from_str(s: &str) -> std::result::Result<Self, ValidationError> {
        let token = s.trim().to_ascii_uppercase();
        let invalid = || ValidationError::InvalidWeekday(s.trim().to_string());

        if token.len() < 2 || !token.is_ascii() {
            return Err(invalid());
        }
        let (prefix, code) = token.split_at(token.len() - 2);
        let weekday = match code {
            "MO" => Weekday::Mon,
            "TU" => Weekday::Tue,
            "WE" => Weekday::Wed,
            "TH" => Weekday::Thu,
            "FR" => Weekday::Fri,
            "SA" => Weekday::Sat,
            "SU" => Weekday::Sun,
            _ => return Err(invalid()),
        };

        let ordinal = if prefix.is_empty() {
            None
        } else {
            let n: i8 = prefix.parse().map_err(|_| invalid())?;
            if n == 0 || n.unsigned_abs() > 53 {
                return Err(invalid());
            }
            Some(n)
        };

        Ok(Self { ordinal, weekday })
    }
}

/// How a series ends. Assigned once; COUNT and UNTIL are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Termination {
    Count(u32),
    Until(DateTime<Utc>),
    #[default]
    Infinite,
}

impl Termination {
    pub fn label(&self) -> &'static str {
        match self {
            Termination::Count(_) => "the repeat rule",
            Termination::Until(_) => "the ends at rule",
            Termination::Infinite => "no end rule",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrenceSpec {
    pub frequency: Frequency,
    pub interval: u32,
    pub termination: Termination,
    pub by_day: Vec<WeekdayToken>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u8>,
    pub dtstart: DateTime<Utc>,
}

impl RecurrenceSpec {
    pub fn new(frequency: Frequency, dtstart: DateTime<Utc>) -> Self {
        Self {
            frequency,
            interval: 1,
            termination: Termination::Infinite,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            dtstart,
        }
    }

    pub fn with_interval(mut self, interval: u32) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_termination(mut self, termination: Termination) -> Self {
        self.termination = termination;
        self
    }

    pub fn with_by_day(mut self, by_day: impl Into<Vec<WeekdayToken>>) -> Self {
        self.by_day = by_day.into();
        self
    }

    pub fn with_by_month_day(mut self, by_month_day: impl Into<Vec<i8>>) -> Self {
        self.by_month_day = by_month_day.into();
        self
    }

    pub fn with_by_month(mut self, by_month: impl Into<Vec<u8>>) -> Self {
        self.by_month = by_month.into();
        self
    }

    pub fn count(&self) -> Option<u32> {
        match self.termination {
            Termination::Count(n) => Some(n),
            _ => None,
        }
    }

    pub fn until(&self) -> Option<DateTime<Utc>> {
        match self.termination {
            Termination::Until(u) => Some(u),
            _ => None,
        }
    }

    /// True iff the series has neither COUNT nor UNTIL.
    pub fn is_infinite(&self) -> bool {
        self.termination == Termination::Infinite
    }

    /// De-duplicate the BY* sets and apply the monthly BYMONTHDAY-over-BYDAY
    /// precedence. Idempotent.
    pub fn normalize(mut self) -> Self {
        dedup_in_order(&mut self.by_day);
        dedup_in_order(&mut self.by_month_day);
        dedup_in_order(&mut self.by_month);

        if self.frequency == Frequency::Monthly
            && !self.by_month_day.is_empty()
            && !self.by_day.is_empty()
        {
            tracing::debug!(
                by_day = ?self.by_day,
                "monthly rule has BYMONTHDAY, ignoring BYDAY"
            );
            self.by_day.clear();
        }
        self
    }

    /// Check the structural invariants of the spec.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        if self.interval == 0 {
            return Err(ValidationError::NonPositiveInterval);
        }
        if self.interval > MAX_INTERVAL {
            return Err(ValidationError::IntervalTooLarge(self.interval));
        }
        if self.termination == Termination::Count(0) {
            return Err(ValidationError::NonPositiveCount);
        }
        if let Some(&day) = self
            .by_month_day
            .iter()
            .find(|d| **d == 0 || d.unsigned_abs() > 31)
        {
            return Err(ValidationError::InvalidMonthDay(day));
        }
        if let Some(&month) = self.by_month.iter().find(|m| !(1..=12).contains(*m)) {
            return Err(ValidationError::InvalidMonth(month));
        }
        // Ordinal weekdays only make sense inside a month or a year.
        if matches!(self.frequency, Frequency::Daily | Frequency::Weekly) {
            if let Some(token) = self.by_day.iter().find(|t| t.ordinal.is_some()) {
                return Err(ValidationError::InvalidWeekday(token.to_string()));
            }
        }
        Ok(())
    }

    /// Render the spec as an RFC 5545 `DTSTART`/`RRULE` block for the `rrule`
    /// crate, with the anchor expressed as local time in `tz`.
    ///
    /// UNTIL is left out: [`RecurrenceEngine`](crate::expander::RecurrenceEngine)
    /// applies it as an upper bound while iterating, in UTC, whatever `tz` is.
    pub fn to_rrule_text(&self, tz: Tz) -> String {
        let mut rule = format!("FREQ={};INTERVAL={}", self.frequency, self.interval);
        if let Termination::Count(n) = self.termination {
            rule.push_str(&format!(";COUNT={}", n));
        }

        push_list(&mut rule, "BYDAY", &self.by_day);
        push_list(&mut rule, "BYMONTHDAY", &self.by_month_day);
        push_list(&mut rule, "BYMONTH", &self.by_month);

        let local_start = self.dtstart.with_timezone(&tz).naive_local();
        format!(
            "DTSTART;TZID={}:{}\nRRULE:{}",
            tz.name(),
            local_start.format(ICAL_DATETIME_FORMAT),
            rule
        )
    }
}

fn dedup_in_order<T: PartialEq + Copy>(values: &mut Vec<T>) {
    let mut seen: Vec<T> = Vec::with_capacity(values.len());
    values.retain(|v| {
        if seen.contains(v) {
            false
        } else {
            seen.push(*v);
            true
        }
    });
}

fn push_list<T: fmt::Display>(out: &mut String, key: &str, values: &[T]) {
    if values.is_empty() {
        return;
    }
    let joined: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    out.push_str(&format!(";{}={}", key, joined.join(",")));
}

fn join_values<T: fmt::Display>(values: &[T]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

/// Format an instant the way DTSTART and UNTIL are persisted.
pub fn format_wire_instant(instant: DateTime<Utc>) -> String {
    instant.format(WIRE_INSTANT_FORMAT).to_string()
}

/// Parse a persisted instant. The basic iCalendar form (`20250131T000000Z`)
/// is accepted as well.
pub fn parse_wire_instant(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, WIRE_INSTANT_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%SZ"))
        .map(|naive| naive.and_utc())
        .map_err(|_| CalendarError::InvalidRule(format!("invalid instant '{}'", value)))
}

impl fmt::Display for RecurrenceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = vec![
            format!("FREQ={}", self.frequency),
            format!("INTERVAL={}", self.interval),
        ];
        match self.termination {
            Termination::Count(n) => parts.push(format!("COUNT={}", n)),
            Termination::Until(u) => parts.push(format!("UNTIL={}", format_wire_instant(u))),
            Termination::Infinite => {}
        }
        if !self.by_day.is_empty() {
            parts.push(format!("BYDAY={}", join_values(&self.by_day)));
        }
        if !self.by_month_day.is_empty() {
            parts.push(format!("BYMONTHDAY={}", join_values(&self.by_month_day)));
        }
        if !self.by_month.is_empty() {
            parts.push(format!("BYMONTH={}", join_values(&self.by_month)));
        }
        parts.push(format!("DTSTART={}", format_wire_instant(self.dtstart)));

        f.write_str(&parts.join(";"))
    }
}

fn parse_list<T: FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| CalendarError::InvalidRule(format!("invalid {} value '{}'", key, v)))
        })
        .collect()
}

impl FromStr for RecurrenceSpec {
    type Err = CalendarError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(CalendarError::InvalidRule("empty RRULE string".to_string()));
        }

        let mut seen: Vec<String> = Vec::new();
        let mut frequency = None;
        let mut interval = 1u32;
        let mut count = None;
        let mut until = None;
        let mut by_day = Vec::new();
        let mut by_month_day = Vec::new();
        let mut by_month = Vec::new();
        let mut dtstart = None;

        for part in s.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (raw_key, value) = part.split_once('=').ok_or_else(|| {
                CalendarError::InvalidRule(format!("expected KEY=VALUE, got '{}'", part))
            })?;
            let key = raw_key.trim().to_ascii_uppercase();
            let key = key.as_str();
            if seen.contains(&key.to_string()) {
                return Err(CalendarError::InvalidRule(format!("duplicate key '{}'", key)));
            }
            seen.push(key.to_string());

            let value = value.trim();
            match key {
                "FREQ" => frequency = Some(value.parse::<Frequency>()?),
                "INTERVAL" => {
                    interval = value.parse().map_err(|_| {
                        CalendarError::InvalidRule(format!("invalid INTERVAL '{}'", value))
                    })?
                }
                "COUNT" => {
                    count = Some(value.parse::<u32>().map_err(|_| {
                        CalendarError::InvalidRule(format!("invalid COUNT '{}'", value))
                    })?)
                }
                "UNTIL" => until = Some(parse_wire_instant(value)?),
                "BYDAY" => by_day = parse_list(key, value)?,
                "BYMONTHDAY" => by_month_day = parse_list(key, value)?,
                "BYMONTH" => by_month = parse_list(key, value)?,
                "DTSTART" => dtstart = Some(parse_wire_instant(value)?),
                other => {
                    return Err(CalendarError::InvalidRule(format!(
                        "unsupported key '{}' (supported: {})",
                        other,
                        KEYS.join(", ")
                    )))
                }
            }
        }

        let frequency =
            frequency.ok_or_else(|| CalendarError::InvalidRule("missing FREQ".to_string()))?;
        let dtstart =
            dtstart.ok_or_else(|| CalendarError::InvalidRule("missing DTSTART".to_string()))?;
        let termination = match (count, until) {
            (Some(_), Some(_)) => {
                return Err(ValidationError::ConflictingTermination {
                    rejected: "UNTIL",
                    existing: "COUNT",
                }
                .into())
            }
            (Some(n), None) => Termination::Count(n),
            (None, Some(u)) => Termination::Until(u),
            (None, None) => Termination::Infinite,
        };

        let spec = RecurrenceSpec {
            frequency,
            interval,
            termination,
            by_day,
            by_month_day,
            by_month,
            dtstart,
        }
        .normalize();
        spec.validate()?;
        Ok(spec)
    }
}
