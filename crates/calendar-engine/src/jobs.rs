//! Background tasks dispatched through a [`TaskQueue`](crate::store::TaskQueue).
//!
//! Reminder generation covers a bounded horizon (today through the end of the
//! current month, in the system timezone); it has to be re-run periodically to
//! reach later occurrences. Re-running is safe: notifications carry an
//! idempotency key and the store ignores duplicates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CalendarConfig;
use crate::error::{CalendarError, Result};
use crate::event::EventId;
use crate::materializer::{month_bounds, OccurrenceMaterializer, QueryWindow};
use crate::reminder::{ReminderScheduler, ScheduledNotification};
use crate::store::{EventStore, NotificationStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateRemindersTask {
    pub event_id: EventId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    GenerateReminders(GenerateRemindersTask),
}

/// Start of today through the end of the current month, in the system
/// timezone.
pub fn reminder_horizon(now: DateTime<Utc>, config: &CalendarConfig) -> Result<QueryWindow> {
    let tz = config.system_timezone;
    let today = now.with_timezone(&tz).date_naive();
    let (_, last) = month_bounds(today);
    QueryWindow::for_dates(today, last, tz)
}

/// Materialise the event's occurrences in the reminder horizon and persist
/// one notification per reminder that is still in the future.
///
/// Returns only the notifications created by this run.
pub fn generate_reminders<S>(
    store: &S,
    config: &CalendarConfig,
    task: &GenerateRemindersTask,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledNotification>>
where
    S: EventStore + NotificationStore + ?Sized,
{
    let event = store
        .find_event(task.event_id)?
        .ok_or(CalendarError::EventNotFound(task.event_id))?;

    let horizon = reminder_horizon(now, config)?;
    let occurrences = OccurrenceMaterializer::new(config).materialize(
        std::slice::from_ref(&event),
        &horizon,
        chrono_tz::UTC,
    )?;

    let mut created = Vec::new();
    for occurrence in &occurrences {
        let occurrence_start = occurrence.start.with_timezone(&Utc);
        for notification in ReminderScheduler::schedule(&event, occurrence_start, now) {
            match store.create_scheduled_notification(notification)? {
                Some(stored) => created.push(stored),
                None => tracing::debug!(
                    event_id = %event.id,
                    %occurrence_start,
                    "reminder already scheduled"
                ),
            }
        }
    }

    tracing::info!(
        event_id = %event.id,
        occurrences = occurrences.len(),
        created = created.len(),
        "generated reminders"
    );
    Ok(created)
}

/// Execute one task.
pub fn run_task<S>(
    store: &S,
    config: &CalendarConfig,
    task: &Task,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduledNotification>>
where
    S: EventStore + NotificationStore + ?Sized,
{
    match task {
        Task::GenerateReminders(task) => generate_reminders(store, config, task, now),
    }
}
