//! Tests for reminder rules, scheduling and the reminder generation task.

use calendar_engine::jobs::{generate_reminders, reminder_horizon};
use calendar_engine::reminder::idempotency_key;
use calendar_engine::{
    CalendarConfig, CalendarError, CalendarService, EventId, GenerateRemindersTask,
    InMemoryQueue, InMemoryStore, OwnerRef, RawReminder, ReminderKind, ReminderRule,
    ReminderScheduler, ValidationError,
};
use chrono::{DateTime, TimeZone, Utc};

fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn service() -> CalendarService<InMemoryStore, InMemoryQueue> {
    CalendarService::new(
        InMemoryStore::new(),
        InMemoryQueue::new(),
        CalendarConfig::default(),
    )
}

fn owner() -> OwnerRef {
    OwnerRef::new("user", "42").unwrap()
}

// ---------------------------------------------------------------------------
// Scheduling a single occurrence
// ---------------------------------------------------------------------------

#[test]
fn future_reminder_is_emitted_and_past_one_dropped() {
    let svc = service();
    let event = svc
        .create_event(
            svc.event(owner(), chrono_tz::UTC)
                .title("Launch")
                .description("Ship it")
                .time("09:00", "10:00")
                .unwrap()
                .start_at("2025-06-01")
                .unwrap(),
            "work",
        )
        .unwrap();
    let occurrence_start = utc(2025, 6, 1, 9, 0);

    let emitted = ReminderScheduler::schedule(&event, occurrence_start, utc(2025, 6, 1, 8, 0));
    assert_eq!(emitted.len(), 1);
    assert_eq!(emitted[0].scheduled_at, utc(2025, 6, 1, 8, 50));
    assert_eq!(emitted[0].calendar_event_id, event.id);
    assert_eq!(emitted[0].title, "Launch");
    assert_eq!(emitted[0].body, "Ship it");

    let dropped = ReminderScheduler::schedule(&event, occurrence_start, utc(2025, 6, 1, 8, 55));
    assert!(dropped.is_empty());

    // Strictly after now: a reminder due exactly now is not sent.
    let due_now = ReminderScheduler::schedule(&event, occurrence_start, utc(2025, 6, 1, 8, 50));
    assert!(due_now.is_empty());
}

#[test]
fn candidates_keep_rule_order() {
    let rules = [
        ReminderRule::new(ReminderKind::Weeks, 1),
        ReminderRule::new(ReminderKind::Hours, 2),
        ReminderRule::new(ReminderKind::Days, 1),
    ];
    let start = utc(2025, 6, 15, 12, 0);

    let instants: Vec<DateTime<Utc>> = ReminderScheduler::candidates(&rules, start)
        .into_iter()
        .map(|(_, at)| at)
        .collect();

    assert_eq!(
        instants,
        vec![
            utc(2025, 6, 8, 12, 0),
            utc(2025, 6, 15, 10, 0),
            utc(2025, 6, 14, 12, 0),
        ]
    );
}

#[test]
fn unrepresentable_offset_is_skipped() {
    let huge = ReminderRule::parse("weeks", Some(u32::MAX)).unwrap();
    let start = utc(2025, 6, 1, 9, 0);
    assert_eq!(huge.fire_at(start), None);

    let rules = [huge, ReminderRule::new(ReminderKind::Minutes, 10)];
    assert_eq!(
        ReminderScheduler::candidates(&rules, start),
        vec![(rules[1], utc(2025, 6, 1, 8, 50))]
    );
}

#[test]
fn generation_survives_oversized_reminder_offset() {
    let svc = service();
    svc.create_event(
        svc.event(owner(), chrono_tz::UTC)
            .time("09:00", "09:30")
            .unwrap()
            .start_at("2025-06-10")
            .unwrap()
            .reminders([
                RawReminder::new("weeks", Some(u32::MAX)),
                RawReminder::new("minutes", Some(10)),
            ])
            .unwrap(),
        "work",
    )
    .unwrap();

    let tasks = svc.queue().drain().unwrap();
    let created = svc.run_tasks(tasks, utc(2025, 6, 1, 0, 0)).unwrap();

    assert_eq!(created.len(), 1);
    assert_eq!(created[0].scheduled_at, utc(2025, 6, 10, 8, 50));
}

#[test]
fn idempotency_key_identifies_rule_and_occurrence() {
    let rule = ReminderRule::new(ReminderKind::Minutes, 10);
    assert_eq!(
        idempotency_key(EventId(7), utc(2025, 6, 1, 9, 0), &rule),
        "7:2025-06-01T09:00:00Z:minutes:10"
    );
}

// ---------------------------------------------------------------------------
// Parsing reminder rules
// ---------------------------------------------------------------------------

#[test]
fn stored_rules_with_unknown_kind_fall_back_to_minutes() {
    let rule: ReminderRule = serde_json::from_str(r#"{"kind":"fortnights","offset":3}"#).unwrap();
    assert_eq!(rule, ReminderRule::new(ReminderKind::Minutes, 3));
}

#[test]
fn legacy_field_names_accepted() {
    let rule: ReminderRule = serde_json::from_str(r#"{"type":"hours","nth":2}"#).unwrap();
    assert_eq!(rule, ReminderRule::new(ReminderKind::Hours, 2));

    let raw: RawReminder = serde_json::from_str(r#"{"type":"days"}"#).unwrap();
    assert_eq!(raw, RawReminder::new("days", None));
}

#[test]
fn rules_serialize_with_lowercase_kind() {
    let json = serde_json::to_string(&ReminderRule::new(ReminderKind::Weeks, 1)).unwrap();
    assert_eq!(json, r#"{"kind":"weeks","offset":1}"#);
}

#[test]
fn raw_reminder_shorthand() {
    assert_eq!(
        "hours:2".parse::<RawReminder>().unwrap(),
        RawReminder::new("hours", Some(2))
    );
    assert_eq!(
        "minutes".parse::<RawReminder>().unwrap(),
        RawReminder::new("minutes", None)
    );
    assert_eq!(
        "hours:x".parse::<RawReminder>().unwrap_err(),
        ValidationError::InvalidReminderOffset("x".to_string())
    );
}

#[test]
fn strict_kind_parsing_is_case_insensitive() {
    assert_eq!("HOURS".parse::<ReminderKind>().unwrap(), ReminderKind::Hours);
    assert!("months".parse::<ReminderKind>().is_err());
}

// ---------------------------------------------------------------------------
// Reminder generation task
// ---------------------------------------------------------------------------

#[test]
fn horizon_runs_from_today_to_month_end() {
    let horizon = reminder_horizon(utc(2025, 6, 10, 8, 55), &CalendarConfig::default()).unwrap();
    assert_eq!(horizon.start, utc(2025, 6, 10, 0, 0));
    assert_eq!(horizon.end, Utc.with_ymd_and_hms(2025, 6, 30, 23, 59, 59).unwrap());
}

#[test]
fn generation_is_idempotent() {
    let svc = service();
    let event = svc
        .create_event(
            svc.event(owner(), chrono_tz::UTC)
                .title("Standup")
                .time("09:00", "09:30")
                .unwrap()
                .start_at("2025-06-10")
                .unwrap()
                .daily(&[], 1)
                .unwrap()
                .repeat(3)
                .unwrap()
                .reminders([
                    RawReminder::new("minutes", Some(10)),
                    RawReminder::new("hours", Some(1)),
                ])
                .unwrap(),
            "work",
        )
        .unwrap();

    let now = utc(2025, 6, 10, 8, 55);
    let tasks = svc.queue().drain().unwrap();
    assert_eq!(tasks.len(), 1);

    let created = svc.run_tasks(tasks.clone(), now).unwrap();
    let mut at: Vec<DateTime<Utc>> = created.iter().map(|n| n.scheduled_at).collect();
    at.sort();
    assert_eq!(
        at,
        vec![
            utc(2025, 6, 11, 8, 0),
            utc(2025, 6, 11, 8, 50),
            utc(2025, 6, 12, 8, 0),
            utc(2025, 6, 12, 8, 50),
        ]
    );
    assert!(created.iter().all(|n| n.calendar_event_id == event.id));

    let again = svc.run_tasks(tasks, now).unwrap();
    assert!(again.is_empty());
    assert_eq!(svc.store().notifications().unwrap().len(), 4);
}

#[test]
fn generation_stops_at_month_end() {
    let svc = service();
    svc.create_event(
        svc.event(owner(), chrono_tz::UTC)
            .time("09:00", "09:30")
            .unwrap()
            .start_at("2025-06-29")
            .unwrap()
            .daily(&[], 1)
            .unwrap(),
        "work",
    )
    .unwrap();

    let tasks = svc.queue().drain().unwrap();
    let created = svc.run_tasks(tasks, utc(2025, 6, 1, 0, 0)).unwrap();

    let days: Vec<u32> = created
        .iter()
        .map(|n| chrono::Datelike::day(&n.scheduled_at))
        .collect();
    assert_eq!(days, vec![29, 30]);
}

#[test]
fn unknown_event_reported() {
    let store = InMemoryStore::new();
    let err = generate_reminders(
        &store,
        &CalendarConfig::default(),
        &GenerateRemindersTask {
            event_id: EventId(99),
        },
        utc(2025, 6, 1, 0, 0),
    )
    .unwrap_err();

    assert!(matches!(err, CalendarError::EventNotFound(EventId(99))));
}
