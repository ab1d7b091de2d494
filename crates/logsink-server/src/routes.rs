// ABOUTME: Route definitions for the logsink HTTP API.
// ABOUTME: Assembles the /api/v1 routes into a single Axum Router with shared state and request tracing.

use axum::Router;
use axum::routing::get;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::SharedState;

/// Build the complete Axum router with all routes and shared state.
///
/// Every filtered query and delete lives under `/api/v1/logs/{*rest}`; the
/// segment grammar is handled by [`api::criteria::parse_logs_path`].
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api/v1/ping", get(ping))
        .route(
            "/api/v1/logs",
            get(api::logs::get_all_logs).post(api::logs::add_log),
        )
        .route(
            "/api/v1/logs/{*rest}",
            get(api::logs::get_logs).delete(api::logs::delete_logs),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Liveness check. Returns 200 OK with a fixed JSON body.
async fn ping() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({ "value": "pong" }))
}
