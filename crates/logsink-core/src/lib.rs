// ABOUTME: Core library for logsink, containing the log entry model and filter criteria.
// ABOUTME: This crate defines the shared data model used by the stores and the HTTP server.

pub mod criteria;
pub mod entry;

pub use criteria::MatchCriteria;
pub use entry::{LogEntry, LogLevel, ParseLevelError, now_millis};
