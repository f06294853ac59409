//! Collaborator seams: calendar resolution, event and notification storage,
//! task dispatch. In-memory implementations back the CLI and the tests.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CalendarError, Result};
use crate::event::{Calendar, CalendarId, Event, EventId, EventRecord, OwnerRef};
use crate::jobs::Task;
use crate::reminder::{NewScheduledNotification, ScheduledNotification};

pub trait CalendarResolver: Send + Sync {
    /// Idempotent get-or-create keyed by owner and name.
    fn resolve_or_create(&self, owner: &OwnerRef, name: &str) -> Result<Calendar>;
}

pub trait EventStore: Send + Sync {
    fn create_event(&self, calendar: &Calendar, record: EventRecord) -> Result<Event>;
    fn query_events(&self, calendar_id: CalendarId, query: &EventQuery) -> Result<Vec<Event>>;
    fn find_event(&self, id: EventId) -> Result<Option<Event>>;
}

pub trait NotificationStore: Send + Sync {
    /// Persist a notification. Returns `None` when one with the same
    /// idempotency key already exists.
    fn create_scheduled_notification(
        &self,
        notification: NewScheduledNotification,
    ) -> Result<Option<ScheduledNotification>>;
}

/// Fire-and-forget dispatch; implementations must not block on execution.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, task: Task) -> Result<()>;
}

/// One conjunctive predicate set over stored event columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    pub is_infinite: Option<bool>,
    pub has_end_date: Option<bool>,
    /// `utc_start_timestamp <= t`
    pub starts_on_or_before: Option<DateTime<Utc>>,
    /// `utc_end_timestamp >= t`
    pub ends_on_or_after: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &EventRecord) -> bool {
        self.is_infinite.is_none_or(|v| event.is_infinite == v)
            && self
                .has_end_date
                .is_none_or(|v| event.original_end_date.is_some() == v)
            && self
                .starts_on_or_before
                .is_none_or(|t| event.utc_start_timestamp <= t)
            && self
                .ends_on_or_after
                .is_none_or(|t| event.utc_end_timestamp >= t)
    }
}

/// A union of [`EventFilter`]s plus an optional title filter.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub any_of: Vec<EventFilter>,
    pub title_contains: Option<String>,
}

impl EventQuery {
    /// Events that may have occurrences in `[start, end]`: finite series with
    /// an end date overlapping the window, finite series without one that
    /// start before the window ends, and every infinite series.
    pub fn for_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            any_of: vec![
                EventFilter {
                    is_infinite: Some(false),
                    has_end_date: Some(true),
                    starts_on_or_before: Some(end),
                    ends_on_or_after: Some(start),
                },
                EventFilter {
                    is_infinite: Some(false),
                    has_end_date: Some(false),
                    starts_on_or_before: Some(end),
                    ends_on_or_after: None,
                },
                EventFilter {
                    is_infinite: Some(true),
                    ..EventFilter::default()
                },
            ],
            title_contains: None,
        }
    }

    pub fn with_search(mut self, search: Option<&str>) -> Self {
        self.title_contains = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self
    }

    pub fn matches(&self, event: &EventRecord) -> bool {
        let in_union = self.any_of.is_empty() || self.any_of.iter().any(|f| f.matches(event));
        in_union
            && self
                .title_contains
                .as_deref()
                .is_none_or(|needle| event.title_matches(needle))
    }
}

/// Serializable contents of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub calendars: Vec<Calendar>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub notifications: Vec<ScheduledNotification>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<StoreSnapshot>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: Mutex::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> Result<StoreSnapshot> {
        Ok(self.lock()?.clone())
    }

    pub fn events(&self) -> Result<Vec<Event>> {
        Ok(self.lock()?.events.clone())
    }

    pub fn notifications(&self) -> Result<Vec<ScheduledNotification>> {
        Ok(self.lock()?.notifications.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreSnapshot>> {
        self.state
            .lock()
            .map_err(|_| CalendarError::Storage("store lock poisoned".to_string()))
    }
}

impl CalendarResolver for InMemoryStore {
    fn resolve_or_create(&self, owner: &OwnerRef, name: &str) -> Result<Calendar> {
        let mut state = self.lock()?;
        if let Some(existing) = state
            .calendars
            .iter()
            .find(|c| c.owner == *owner && c.name == name)
        {
            return Ok(existing.clone());
        }

        let id = CalendarId(state.calendars.iter().map(|c| c.id.0).max().unwrap_or(0) + 1);
        let calendar = Calendar {
            id,
            owner: owner.clone(),
            name: name.to_string(),
            color: Calendar::color_for(owner, name),
        };
        tracing::debug!(calendar_id = %id, name, "created calendar");
        state.calendars.push(calendar.clone());
        Ok(calendar)
    }
}

impl EventStore for InMemoryStore {
    fn create_event(&self, calendar: &Calendar, record: EventRecord) -> Result<Event> {
        let mut state = self.lock()?;
        if !state.calendars.iter().any(|c| c.id == calendar.id) {
            return Err(CalendarError::Storage(format!(
                "unknown calendar {}",
                calendar.id
            )));
        }

        let id = EventId(state.events.iter().map(|e| e.id.0).max().unwrap_or(0) + 1);
        let event = Event {
            id,
            calendar_id: calendar.id,
            record,
        };
        state.events.push(event.clone());
        Ok(event)
    }

    fn query_events(&self, calendar_id: CalendarId, query: &EventQuery) -> Result<Vec<Event>> {
        let state = self.lock()?;
        Ok(state
            .events
            .iter()
            .filter(|e| e.calendar_id == calendar_id && query.matches(e))
            .cloned()
            .collect())
    }

    fn find_event(&self, id: EventId) -> Result<Option<Event>> {
        Ok(self.lock()?.events.iter().find(|e| e.id == id).cloned())
    }
}

impl NotificationStore for InMemoryStore {
    fn create_scheduled_notification(
        &self,
        notification: NewScheduledNotification,
    ) -> Result<Option<ScheduledNotification>> {
        let mut state = self.lock()?;
        if state
            .notifications
            .iter()
            .any(|n| n.idempotency_key == notification.idempotency_key)
        {
            return Ok(None);
        }

        let id = state
            .notifications
            .iter()
            .map(|n| n.id)
            .max()
            .unwrap_or(0)
            + 1;
        let created = ScheduledNotification::from_new(id, notification);
        state.notifications.push(created.clone());
        Ok(Some(created))
    }
}

/// A queue that holds tasks until a worker drains them.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every pending task, oldest first.
    pub fn drain(&self) -> Result<Vec<Task>> {
        let mut tasks = self
            .tasks
            .lock()
            .map_err(|_| CalendarError::Dispatch("queue lock poisoned".to_string()))?;
        Ok(tasks.drain(..).collect())
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TaskQueue for InMemoryQueue {
    fn enqueue(&self, task: Task) -> Result<()> {
        self.tasks
            .lock()
            .map_err(|_| CalendarError::Dispatch("queue lock poisoned".to_string()))?
            .push_back(task);
        Ok(())
    }
}
