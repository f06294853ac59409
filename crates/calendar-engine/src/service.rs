//! Top-level facade tying the builder, the stores and the materialiser
//! together.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::builder::EventBuilder;
use crate::config::CalendarConfig;
use crate::error::Result;
use crate::event::{Event, Occurrence, OwnerRef};
use crate::jobs::{self, Task};
use crate::materializer::{OccurrenceMaterializer, QueryWindow};
use crate::reminder::ScheduledNotification;
use crate::store::{CalendarResolver, EventQuery, EventStore, NotificationStore, TaskQueue};

/// Caller filters for [`CalendarService::calendar_events`]. Dates are
/// `YYYY-MM-DD` in the caller's timezone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsFilter {
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
    #[serde(default)]
    pub search: Option<String>,
}

pub struct CalendarService<S, Q> {
    store: S,
    queue: Q,
    config: CalendarConfig,
}

impl<S, Q> CalendarService<S, Q>
where
    S: CalendarResolver + EventStore + NotificationStore,
    Q: TaskQueue,
{
    pub fn new(store: S, queue: Q, config: CalendarConfig) -> Self {
        Self {
            store,
            queue,
            config,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    pub fn config(&self) -> &CalendarConfig {
        &self.config
    }

    /// Start a new event for `owner`, authored in `caller_tz`.
    pub fn event(&self, owner: OwnerRef, caller_tz: Tz) -> EventBuilder {
        EventBuilder::new(owner, caller_tz, &self.config)
    }

    pub fn create_event(&self, builder: EventBuilder, calendar_name: &str) -> Result<Event> {
        builder.create(calendar_name, &self.store, &self.queue)
    }

    /// Occurrences in the owner's `calendar_name` calendar that start inside
    /// the filter's window, expressed in `caller_tz`. The calendar is created
    /// when it does not exist yet.
    pub fn calendar_events(
        &self,
        owner: &OwnerRef,
        calendar_name: &str,
        filter: &EventsFilter,
        caller_tz: Tz,
        now: DateTime<Utc>,
    ) -> Result<Vec<Occurrence>> {
        let name = if calendar_name.trim().is_empty() {
            self.config.default_calendar.as_str()
        } else {
            calendar_name
        };
        let calendar = self.store.resolve_or_create(owner, name)?;

        let window = QueryWindow::from_dates(
            filter.start_date.as_deref(),
            filter.end_date.as_deref(),
            caller_tz,
            now,
        )?
        .with_search(filter.search.as_deref());

        let query = EventQuery::for_window(window.start, window.end)
            .with_search(window.search.as_deref());
        let events = self.store.query_events(calendar.id, &query)?;
        tracing::debug!(
            calendar_id = %calendar.id,
            candidates = events.len(),
            window_start = %window.start,
            window_end = %window.end,
            "querying calendar events"
        );

        OccurrenceMaterializer::new(&self.config).materialize(&events, &window, caller_tz)
    }

    pub fn run_task(&self, task: &Task, now: DateTime<Utc>) -> Result<Vec<ScheduledNotification>> {
        jobs::run_task(&self.store, &self.config, task, now)
    }

    /// Run every task in `tasks` in order, stopping at the first failure.
    pub fn run_tasks<I>(&self, tasks: I, now: DateTime<Utc>) -> Result<Vec<ScheduledNotification>>
    where
        I: IntoIterator<Item = Task>,
    {
        let mut created = Vec::new();
        for task in tasks {
            created.extend(self.run_task(&task, now)?);
        }
        Ok(created)
    }
}
