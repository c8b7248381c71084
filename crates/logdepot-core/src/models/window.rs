//! Time windows bounding the content of a log bundle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One bound of a log window as found in the log content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogTime {
    /// Timestamp parsed from the log line
    Parsed(DateTime<Utc>),
    /// Timestamp-shaped token that did not parse
    Raw(String),
}

impl LogTime {
    /// The bound as a UTC time, if it parsed
    pub fn as_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            LogTime::Parsed(t) => Some(*t),
            LogTime::Raw(_) => None,
        }
    }
}

impl std::fmt::Display for LogTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogTime::Parsed(t) => write!(f, "{}", t),
            LogTime::Raw(s) => f.write_str(s),
        }
    }
}

/// Start and end of the content of a log bundle.
///
/// Both bounds are `None` when the scanner found no dated evidence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogWindow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<LogTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<LogTime>,
}

impl LogWindow {
    pub fn new(start: Option<LogTime>, end: Option<LogTime>) -> Self {
        Self { start, end }
    }

    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            start: Some(LogTime::Parsed(start)),
            end: Some(LogTime::Parsed(end)),
        }
    }

    /// True when neither bound is known
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }

    pub fn started_on(&self) -> Option<DateTime<Utc>> {
        self.start.as_ref().and_then(LogTime::as_datetime)
    }

    pub fn ended_on(&self) -> Option<DateTime<Utc>> {
        self.end.as_ref().and_then(LogTime::as_datetime)
    }
}

/// Render an optional bound the way log lines show it (empty when absent)
pub fn display_bound(bound: &Option<LogTime>) -> String {
    bound.as_ref().map(ToString::to_string).unwrap_or_default()
}
