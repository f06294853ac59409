//! Tests for configuration loading and timezone resolution.

use calendar_engine::{caller_timezone, parse_timezone, CalendarConfig, CalendarError, DstPolicy};

#[test]
fn full_config_parses() {
    let config = CalendarConfig::from_toml_str(
        r#"
system_timezone = "Europe/Berlin"
allow_reminders = false
dst_policy = "skip"
max_occurrences = 250
default_calendar = "personal"
"#,
    )
    .unwrap();

    assert_eq!(config.system_timezone, chrono_tz::Europe::Berlin);
    assert!(!config.allow_reminders);
    assert_eq!(config.dst_policy, DstPolicy::Skip);
    assert_eq!(config.max_occurrences, 250);
    assert_eq!(config.default_calendar, "personal");
}

#[test]
fn missing_keys_take_defaults() {
    let config = CalendarConfig::from_toml_str("dst_policy = \"wall_clock\"\n").unwrap();

    assert_eq!(config.dst_policy, DstPolicy::WallClock);
    assert_eq!(config.system_timezone, chrono_tz::UTC);
    assert!(config.allow_reminders);
    assert_eq!(config.max_occurrences, 5000);
    assert_eq!(config.default_calendar, "default");

    assert_eq!(CalendarConfig::from_toml_str("").unwrap(), CalendarConfig::default());
}

#[test]
fn invalid_values_rejected() {
    for content in [
        "system_timezone = \"Mars/Olympus\"",
        "dst_policy = \"sometimes\"",
        "max_occurrences = 0",
        "max_occurrences = \"many\"",
    ] {
        assert!(
            matches!(
                CalendarConfig::from_toml_str(content),
                Err(CalendarError::Config(_))
            ),
            "{:?} should be rejected",
            content
        );
    }
}

#[test]
fn load_reads_file() {
    let path = std::env::temp_dir()
        .join(format!("calendar-engine-config-{}.toml", std::process::id()));
    std::fs::write(&path, "system_timezone = \"Asia/Tokyo\"\n").unwrap();

    let config = CalendarConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.system_timezone, chrono_tz::Asia::Tokyo);
}

#[test]
fn load_missing_file_is_config_error() {
    let err =
        CalendarConfig::load(std::path::Path::new("/nonexistent/calendar.toml")).unwrap_err();
    assert!(matches!(err, CalendarError::Config(_)));
}

#[test]
fn caller_timezone_falls_back_to_system_zone() {
    let config = CalendarConfig {
        system_timezone: chrono_tz::America::Chicago,
        ..CalendarConfig::default()
    };

    assert_eq!(caller_timezone(None, &config).unwrap(), chrono_tz::America::Chicago);
    assert_eq!(caller_timezone(Some("  "), &config).unwrap(), chrono_tz::America::Chicago);
    assert_eq!(
        caller_timezone(Some("Asia/Kolkata"), &config).unwrap(),
        chrono_tz::Asia::Kolkata
    );
    assert!(matches!(
        caller_timezone(Some("Nowhere/Land"), &config),
        Err(CalendarError::InvalidTimezone(_))
    ));
}

#[test]
fn parse_timezone_trims_input() {
    assert_eq!(parse_timezone(" UTC ").unwrap(), chrono_tz::UTC);
}
