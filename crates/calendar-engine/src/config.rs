//! Engine configuration, passed explicitly to every component that needs it.
//!
//! ```toml
//! system_timezone = "UTC"
//! allow_reminders = true
//! dst_policy = "shift_forward"
//! max_occurrences = 5000
//! default_calendar = "default"
//! ```

use std::path::Path;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::dst::DstPolicy;
use crate::error::{CalendarError, Result};
use crate::expander::DEFAULT_MAX_OCCURRENCES;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Canonical zone for stored instants and query windows.
    pub system_timezone: Tz,
    /// Enqueue reminder generation after each event is created.
    pub allow_reminders: bool,
    pub dst_policy: DstPolicy,
    /// Cap on occurrences expanded per event per query.
    pub max_occurrences: usize,
    pub default_calendar: String,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            system_timezone: chrono_tz::UTC,
            allow_reminders: true,
            dst_policy: DstPolicy::default(),
            max_occurrences: DEFAULT_MAX_OCCURRENCES,
            default_calendar: "default".to_string(),
        }
    }
}

impl CalendarConfig {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| CalendarError::Config(e.to_string()))?;
        if config.max_occurrences == 0 {
            return Err(CalendarError::Config(
                "max_occurrences must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CalendarError::Config(format!("Could not read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse()
        .map_err(|_| CalendarError::InvalidTimezone(name.to_string()))
}

/// The timezone a caller declared for a request, falling back to the
/// system timezone when none was given.
pub fn caller_timezone(declared: Option<&str>, config: &CalendarConfig) -> Result<Tz> {
    match declared.map(str::trim).filter(|s| !s.is_empty()) {
        Some(name) => parse_timezone(name),
        None => Ok(config.system_timezone),
    }
}
