// ABOUTME: HTTP server for logsink, exposing ingest, query, and delete endpoints under /api/v1.
// ABOUTME: Uses Axum with an injected LogStore so handlers never touch global state.

pub mod api;
pub mod app_state;
pub mod config;
pub mod routes;

pub use app_state::{AppState, DEFAULT_READ_MAX_LIMIT, SharedState};
pub use config::{ConfigError, LogsinkConfig, Persistence};
pub use routes::create_router;
