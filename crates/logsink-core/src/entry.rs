// ABOUTME: Defines the LogEntry record and the LogLevel enumeration ingested by logsink.
// ABOUTME: Entries serialize to the camelCase JSON shape used on the wire and in the JSONL file.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Severity of a log entry. Only these five values are accepted at ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Returned when a string does not name one of the five log levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid log level '{0}'")]
pub struct ParseLevelError(pub String);

impl LogLevel {
    pub const ALL: [LogLevel; 5] = [
        LogLevel::Trace,
        LogLevel::Debug,
        LogLevel::Info,
        LogLevel::Warn,
        LogLevel::Error,
    ];

    /// The canonical upper-case name, as stored and as accepted in URLs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ParseLevelError;

    /// Matching is exact: "info" and "INF" are both rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogLevel::ALL
            .into_iter()
            .find(|level| level.as_str() == s)
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}

/// One structured log record. `created` is epoch milliseconds and is always
/// assigned by the server when the entry is ingested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    #[serde(rename = "logLevel")]
    pub level: LogLevel,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub labels: Vec<String>,
    #[serde(default)]
    pub origin_service: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created: i64,
}

impl LogEntry {
    /// Create an entry with no labels and an unset creation time.
    pub fn new(level: LogLevel, origin_service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            labels: Vec::new(),
            origin_service: origin_service.into(),
            message: message.into(),
            created: 0,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created(mut self, created: i64) -> Self {
        self.created = created;
        self
    }

    /// Overwrite `created` with the current wall-clock time in milliseconds.
    /// Any client-supplied value is discarded.
    pub fn stamp_now(&mut self) {
        self.created = now_millis();
    }
}

/// Current wall-clock time in milliseconds since the Unix epoch, the unit of
/// `created`.
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Clients send `"labels": null` for unlabeled entries.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
