//! `calendar` CLI — expand recurrence rules and manage events in a JSON store.
//!
//! ## Usage
//!
//! ```sh
//! # Expand a persisted rule over a window
//! calendar expand --rule "FREQ=MONTHLY;BYMONTHDAY=31;DTSTART=2025-01-31T00:00:00Z" \
//!     --from 2025-01-01T00:00:00Z --to 2025-04-30T23:59:59Z
//!
//! # Create a weekly event in the "work" calendar of user 42
//! calendar create --store cal.json --owner-id 42 --calendar work --title Standup \
//!     --start 2025-01-06 --time 09:00-09:15 --freq weekly --repeat 10 --reminder minutes:5
//!
//! # List occurrences in January, shown in Berlin time
//! calendar occurrences --store cal.json --owner-id 42 --calendar work \
//!     --from 2025-01-01 --to 2025-01-31 --tz Europe/Berlin
//!
//! # Generate reminders for every stored event
//! calendar reminders --store cal.json
//! ```
//!
//! Set `RUST_LOG=debug` to see expansion and pruning decisions on stderr.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use calendar_engine::recurrence::format_wire_instant;
use calendar_engine::{
    caller_timezone, CalendarConfig, CalendarService, EventBuilder, EventsFilter, Frequency,
    GenerateRemindersTask, InMemoryQueue, InMemoryStore, OwnerRef, RawReminder,
    RecurrenceEngine, RecurrenceSpec, StoreSnapshot, Task, WeekdayToken,
};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};
use tracing_subscriber::EnvFilter;

type Service = CalendarService<InMemoryStore, InMemoryQueue>;

#[derive(Parser)]
#[command(name = "calendar", version, about = "Recurring calendar events CLI")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct OwnerArgs {
    /// Kind of the entity owning the calendar
    #[arg(long, default_value = "user")]
    owner_kind: String,
    /// Identifier of the entity owning the calendar
    #[arg(long, default_value = "default")]
    owner_id: String,
    /// Calendar name (the configured default calendar if omitted)
    #[arg(long, default_value = "")]
    calendar: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Expand a persisted recurrence rule into UTC instants
    Expand {
        /// Rule in KEY=VALUE;... form, including DTSTART
        #[arg(long)]
        rule: String,
        /// Window start (RFC 3339)
        #[arg(long)]
        from: String,
        /// Window end (RFC 3339)
        #[arg(long)]
        to: String,
        /// Expansion timezone (system timezone if omitted)
        #[arg(long)]
        tz: Option<String>,
    },
    /// Create an event and schedule its reminders
    Create {
        /// JSON store file (created if missing)
        #[arg(long)]
        store: PathBuf,
        #[command(flatten)]
        owner: OwnerArgs,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        /// First day, YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Last day, YYYY-MM-DD
        #[arg(long)]
        end: Option<String>,
        /// Wall-clock range, HH:MM-HH:MM
        #[arg(long)]
        time: Option<String>,
        #[arg(long)]
        whole_day: bool,
        /// Authoring timezone (system timezone if omitted)
        #[arg(long)]
        tz: Option<String>,
        /// daily, weekly, monthly or yearly
        #[arg(long)]
        freq: Option<String>,
        #[arg(long, default_value_t = 1)]
        interval: u32,
        /// Comma-separated weekday tokens, e.g. MO,WE or 2TU
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        by_day: Vec<String>,
        #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
        by_month_day: Vec<i8>,
        #[arg(long, value_delimiter = ',')]
        by_month: Vec<u8>,
        /// Number of occurrences
        #[arg(long)]
        repeat: Option<u32>,
        /// Reminder as kind[:offset], repeatable
        #[arg(long = "reminder")]
        reminders: Vec<String>,
        /// Metadata entry as key=value, repeatable; JSON values are parsed
        #[arg(long = "meta", value_name = "KEY=VALUE")]
        meta: Vec<String>,
        /// Reference time for reminder scheduling (RFC 3339, defaults to now)
        #[arg(long)]
        now: Option<String>,
    },
    /// List occurrences of a calendar's events
    Occurrences {
        #[arg(long)]
        store: PathBuf,
        #[command(flatten)]
        owner: OwnerArgs,
        /// First day, YYYY-MM-DD (start of the current month if omitted)
        #[arg(long)]
        from: Option<String>,
        /// Last day, YYYY-MM-DD (end of the current month if omitted)
        #[arg(long)]
        to: Option<String>,
        /// Caller timezone (system timezone if omitted)
        #[arg(long)]
        tz: Option<String>,
        /// Case-insensitive title filter
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        now: Option<String>,
    },
    /// Generate reminders for every stored event
    Reminders {
        #[arg(long)]
        store: PathBuf,
        #[arg(long)]
        now: Option<String>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => CalendarConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => CalendarConfig::default(),
    };

    match cli.command {
        Commands::Expand { rule, from, to, tz } => {
            let spec: RecurrenceSpec = rule.parse().context("Failed to parse rule")?;
            let tz = caller_timezone(tz.as_deref(), &config)?;
            let instants = RecurrenceEngine::in_timezone(tz)
                .with_max_occurrences(config.max_occurrences)
                .occurrences_between(&spec, parse_instant(&from)?, parse_instant(&to)?)
                .context("Failed to expand rule")?;
            let formatted: Vec<String> = instants.into_iter().map(format_wire_instant).collect();
            print_json(&formatted)?;
        }
        Commands::Create {
            store,
            owner,
            title,
            description,
            start,
            end,
            time,
            whole_day,
            tz,
            freq,
            interval,
            by_day,
            by_month_day,
            by_month,
            repeat,
            reminders,
            meta,
            now,
        } => {
            let now = parse_now(now.as_deref())?;
            let service = open_service(&store, config)?;
            let tz = caller_timezone(tz.as_deref(), service.config())?;

            let mut builder = service.event(owner_ref(&owner)?, tz).whole_day(whole_day);
            if let Some(title) = title {
                builder = builder.title(title);
            }
            if let Some(description) = description {
                builder = builder.description(description);
            }
            if let Some(range) = time {
                let (from, to) = range
                    .split_once('-')
                    .with_context(|| format!("Invalid --time '{}', expected HH:MM-HH:MM", range))?;
                builder = builder.time(from.trim(), to.trim())?;
            }
            builder = builder.start_at(&start)?;
            if let Some(end) = end {
                builder = builder.end_at(&end)?;
            }
            if let Some(freq) = freq {
                let frequency: Frequency = freq.parse()?;
                let by_day = by_day
                    .iter()
                    .map(|token| token.parse::<WeekdayToken>())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                builder = apply_frequency(
                    builder,
                    frequency,
                    interval,
                    &by_day,
                    &by_month_day,
                    &by_month,
                )?;
            }
            if let Some(count) = repeat {
                builder = builder.repeat(count)?;
            }
            if !reminders.is_empty() {
                let raw = reminders
                    .iter()
                    .map(|r| r.parse::<RawReminder>())
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                builder = builder.reminders(raw)?;
            }
            if !meta.is_empty() {
                builder = builder.meta_data(parse_meta(&meta)?);
            }

            let event = service
                .create_event(builder, &owner.calendar)
                .context("Failed to create event")?;
            let tasks = service.queue().drain()?;
            let created = service.run_tasks(tasks, now)?;
            tracing::info!(notifications = created.len(), "scheduled reminders");

            save_store(&store, service.store())?;
            print_json(&event)?;
        }
        Commands::Occurrences {
            store,
            owner,
            from,
            to,
            tz,
            search,
            now,
        } => {
            let now = parse_now(now.as_deref())?;
            let service = open_service(&store, config)?;
            let tz = caller_timezone(tz.as_deref(), service.config())?;
            let filter = EventsFilter {
                start_date: from,
                end_date: to,
                search,
            };
            let occurrences = service
                .calendar_events(&owner_ref(&owner)?, &owner.calendar, &filter, tz, now)
                .context("Failed to list occurrences")?;
            print_json(&occurrences)?;
        }
        Commands::Reminders { store, now } => {
            let now = parse_now(now.as_deref())?;
            let service = open_service(&store, config)?;
            let tasks: Vec<Task> = service
                .store()
                .events()?
                .iter()
                .map(|event| {
                    Task::GenerateReminders(GenerateRemindersTask { event_id: event.id })
                })
                .collect();
            let created = service
                .run_tasks(tasks, now)
                .context("Failed to generate reminders")?;

            save_store(&store, service.store())?;
            print_json(&created)?;
        }
    }

    Ok(())
}

fn apply_frequency(
    builder: EventBuilder,
    frequency: Frequency,
    interval: u32,
    by_day: &[WeekdayToken],
    by_month_day: &[i8],
    by_month: &[u8],
) -> Result<EventBuilder> {
    let builder = match frequency {
        Frequency::Daily => builder.daily(by_day, interval)?,
        Frequency::Weekly => builder.weekly(by_day, interval)?,
        Frequency::Monthly => builder.monthly(by_month_day, by_day, interval)?,
        Frequency::Yearly => builder.yearly(by_month, by_month_day, by_day, interval)?,
    };
    Ok(builder)
}

fn owner_ref(args: &OwnerArgs) -> Result<OwnerRef> {
    Ok(OwnerRef::new(args.owner_kind.as_str(), args.owner_id.as_str())?)
}

/// `key=value` pairs into an ordered map. Values that parse as JSON are kept
/// as JSON, anything else becomes a string.
fn parse_meta(entries: &[String]) -> Result<Map<String, Value>> {
    let mut map = Map::new();
    for entry in entries {
        let (key, raw) = entry
            .split_once('=')
            .with_context(|| format!("Invalid --meta '{}', expected KEY=VALUE", entry))?;
        let value =
            serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        map.insert(key.trim().to_string(), value);
    }
    Ok(map)
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("Invalid instant '{}', expected RFC 3339", value))
}

fn parse_now(value: Option<&str>) -> Result<DateTime<Utc>> {
    match value {
        Some(value) => parse_instant(value),
        None => Ok(Utc::now()),
    }
}

fn open_service(path: &Path, config: CalendarConfig) -> Result<Service> {
    let snapshot = if path.exists() {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read file: {}", path.display()))?;
        serde_json::from_str::<StoreSnapshot>(&content)
            .with_context(|| format!("Failed to parse store: {}", path.display()))?
    } else {
        StoreSnapshot::default()
    };
    Ok(CalendarService::new(
        InMemoryStore::from_snapshot(snapshot),
        InMemoryQueue::new(),
        config,
    ))
}

fn save_store(path: &Path, store: &InMemoryStore) -> Result<()> {
    let content = serde_json::to_string_pretty(&store.snapshot()?)?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write file: {}", path.display()))?;
    tracing::debug!(path = %path.display(), "saved store");
    Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
