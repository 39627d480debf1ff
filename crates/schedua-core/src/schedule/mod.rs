//! Domain records for series, exceptions, holidays, categories and the
//! process-wide settings/override rows.
//!
//! All times are naive wall-clock instants in a single implicit zone, with
//! minute precision. Records are plain values; the repository
//! ([`crate::storage::Database`]) owns persistence and enforces the
//! invariants documented on each type.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Wire data type hint for a series target value.
///
/// `Auto` carries the raw text and lets the sink probe the concrete type at
/// write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    #[default]
    Auto,
    Int,
    Float,
    #[serde(rename = "string")]
    Text,
    Bool,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Int => "int",
            Self::Float => "float",
            Self::Text => "string",
            Self::Bool => "bool",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "auto" => Some(Self::Auto),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "string" => Some(Self::Text),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }
}

/// A target value typed for the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum TargetValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    /// Raw text; the sink probes bool -> int -> float -> text at write time.
    Auto(String),
}

impl TargetValue {
    /// Type the raw text per the series `data_type` hint.
    ///
    /// # Errors
    /// Returns a validation error when the text does not parse as the
    /// declared type.
    pub fn coerce(raw: &str, data_type: DataType) -> Result<Self, ValidationError> {
        let trimmed = raw.trim();
        match data_type {
            DataType::Auto => Ok(Self::Auto(trimmed.to_string())),
            DataType::Text => Ok(Self::Text(trimmed.to_string())),
            DataType::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Ok(Self::Bool(true)),
                "false" | "0" => Ok(Self::Bool(false)),
                _ => Err(ValidationError::InvalidValue {
                    field: "target_value",
                    message: format!("'{trimmed}' is not a bool"),
                }),
            },
            DataType::Int => trimmed.parse::<i64>().map(Self::Int).map_err(|_| {
                ValidationError::InvalidValue {
                    field: "target_value",
                    message: format!("'{trimmed}' is not an integer"),
                }
            }),
            DataType::Float => trimmed.parse::<f64>().map(Self::Float).map_err(|_| {
                ValidationError::InvalidValue {
                    field: "target_value",
                    message: format!("'{trimmed}' is not a float"),
                }
            }),
        }
    }

    /// Resolve `Auto` text to a concrete variant: bool, then int, then
    /// float, falling back to text.
    pub fn probe(raw: &str) -> Self {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Self::Int(i);
        }
        if let Ok(f) = trimmed.parse::<f64>() {
            return Self::Float(f);
        }
        Self::Text(trimmed.to_string())
    }

    /// Text rendering used for display and change detection.
    pub fn render(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) | Self::Auto(s) => s.clone(),
        }
    }
}

/// Connection and credential settings for the sink endpoint of one series.
///
/// Opaque to the resolution pipeline; the scheduler loop reads only the two
/// timeouts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkSecurity {
    pub security_policy: String,
    pub security_mode: String,
    pub username: String,
    pub password: String,
    /// Per-call sink timeout in seconds.
    pub timeout_secs: u32,
    /// Retry interval in seconds for retry-until-end occurrences.
    pub write_timeout_secs: u32,
}

impl Default for SinkSecurity {
    fn default() -> Self {
        Self {
            security_policy: "None".to_string(),
            security_mode: "None".to_string(),
            username: String::new(),
            password: String::new(),
            timeout_secs: 10,
            write_timeout_secs: 5,
        }
    }
}

/// A repeating schedule definition: when to fire (rule string) and what to
/// write where (endpoint, node, value).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub id: i64,
    pub task_name: String,
    /// Wire endpoint descriptor, e.g. `opc.tcp://host:4840`.
    pub endpoint: String,
    /// Target node identifier, e.g. `ns=2;i=1001`.
    pub node_id: String,
    pub target_value: String,
    pub data_type: DataType,
    pub rrule_str: String,
    pub category_id: i64,
    pub priority: i64,
    pub enabled: bool,
    #[serde(default)]
    pub security: SinkSecurity,
    /// Outcome of the most recent sink write ("ok" / "failed"), if any.
    #[serde(default)]
    pub last_execution_status: Option<String>,
}

/// What an exception does to the occurrences of its date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExceptionAction {
    Cancel,
    Override,
}

impl ExceptionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cancel => "cancel",
            Self::Override => "override",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cancel" => Some(Self::Cancel),
            "override" => Some(Self::Override),
            _ => None,
        }
    }
}

/// A per-date cancel/override record attached to a series.
///
/// At most one exception exists per `(schedule_id, occurrence_date)`. An
/// override applies to every occurrence of the series on that date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exception {
    pub id: i64,
    pub schedule_id: i64,
    pub occurrence_date: NaiveDate,
    pub action: ExceptionAction,
    pub override_start: Option<NaiveDateTime>,
    pub override_end: Option<NaiveDateTime>,
    pub override_task_name: Option<String>,
    pub override_target_value: Option<String>,
    pub override_category_id: Option<i64>,
    pub note: Option<String>,
}

impl Exception {
    /// True when the override carries at least one rewrite field.
    pub fn has_override_payload(&self) -> bool {
        self.override_start.is_some()
            || self.override_end.is_some()
            || self.override_task_name.as_deref().is_some_and(|s| !s.is_empty())
            || self
                .override_target_value
                .as_deref()
                .is_some_and(|s| !s.is_empty())
            || self.override_category_id.is_some()
    }
}

/// A named holiday calendar; entries live in [`HolidayEntry`]. At most one
/// calendar is the default, and only the default feeds the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayCalendar {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub is_default: bool,
}

/// A single holiday date, full-day or a time window, optionally rewriting
/// category and target value for occurrences that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HolidayEntry {
    pub id: i64,
    pub calendar_id: i64,
    pub date: NaiveDate,
    pub name: String,
    pub is_full_day: bool,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub override_category_id: Option<i64>,
    pub override_target_value: Option<String>,
}

impl HolidayEntry {
    pub fn has_override(&self) -> bool {
        self.override_category_id.is_some()
            || self
                .override_target_value
                .as_deref()
                .is_some_and(|s| !s.is_empty())
    }
}

/// A named colour pair used for display and grouping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    /// 7-char hex `#RRGGBB`.
    pub bg_color: String,
    pub fg_color: String,
    pub sort_order: i64,
    /// System categories are undeletable and cannot be renamed.
    pub is_system: bool,
}

/// Single-row process configuration, re-read by the scheduler on each tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneralSettings {
    pub profile_name: String,
    pub description: Option<String>,
    pub enable_schedule: bool,
    /// Seconds between scheduler ticks.
    pub scan_rate: u32,
    /// Seconds between UI polls.
    pub refresh_rate: u32,
    pub use_active_period: bool,
    pub active_from: Option<NaiveDateTime>,
    pub active_to: Option<NaiveDateTime>,
    pub output_type: String,
    pub refresh_output: bool,
    pub generate_events: bool,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            profile_name: "Default".to_string(),
            description: None,
            enable_schedule: true,
            scan_rate: 30,
            refresh_rate: 5,
            use_active_period: false,
            active_from: None,
            active_to: None,
            output_type: "opcua".to_string(),
            refresh_output: true,
            generate_events: false,
        }
    }
}

impl GeneralSettings {
    /// True when the active-period gate admits `now`.
    ///
    /// With the gate disabled (or a bound missing) every instant is
    /// admitted.
    pub fn in_active_period(&self, now: NaiveDateTime) -> bool {
        if !self.use_active_period {
            return true;
        }
        match (self.active_from, self.active_to) {
            (Some(from), Some(to)) => from <= now && now <= to,
            _ => true,
        }
    }
}

/// The process-wide forced value. Wins over all other layers while active;
/// an absent `override_until` means active until cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeOverride {
    pub override_value: String,
    pub override_until: Option<NaiveDateTime>,
}

impl RuntimeOverride {
    pub fn is_active(&self, now: NaiveDateTime) -> bool {
        self.override_until.map_or(true, |until| until > now)
    }
}
