// ABOUTME: API module containing the HTTP handler functions for the logsink REST API.
// ABOUTME: Split into path-to-criteria parsing, error mapping, and the log handlers themselves.

pub mod criteria;
pub mod error;
pub mod logs;

pub use error::ApiError;
