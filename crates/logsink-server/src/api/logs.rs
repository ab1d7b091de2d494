// ABOUTME: Log API handlers for ingesting, querying, and deleting log entries.
// ABOUTME: Parses request paths into MatchCriteria and delegates to the injected LogStore.

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use logsink_core::{LogEntry, MatchCriteria};

use crate::api::ApiError;
use crate::api::criteria::{Trailing, parse_logs_path};
use crate::app_state::SharedState;

/// POST /api/v1/logs - Ingest one entry. The server assigns `created`.
pub async fn add_log(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    if body.is_empty() {
        return Err(ApiError::BadRequest("empty request body".to_string()));
    }

    let mut entry: LogEntry = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("failed to parse log entry: {}", e)))?;
    entry.stamp_now();

    state.store.add(entry).await?;
    Ok(StatusCode::ACCEPTED)
}

/// GET /api/v1/logs - Every stored entry, up to the read cap.
pub async fn get_all_logs(
    State(state): State<SharedState>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    query(&state, MatchCriteria::default()).await
}

/// GET /api/v1/logs/{*rest} - Entries matching the filters encoded in the path.
pub async fn get_logs(
    State(state): State<SharedState>,
    Path(rest): Path<String>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    let criteria = parse_logs_path(&rest, Trailing::Query)?;
    query(&state, criteria).await
}

/// DELETE /api/v1/logs/{*rest} - Remove matching entries; the body is the count.
pub async fn delete_logs(
    State(state): State<SharedState>,
    Path(rest): Path<String>,
) -> Result<String, ApiError> {
    let criteria = parse_logs_path(&rest, Trailing::Delete)?;
    let removed = state.store.remove(&criteria).await?;
    tracing::debug!("removed {} log entries", removed);
    Ok(removed.to_string())
}

/// Run a query under the read cap and refuse to return more than the
/// resulting limit allows.
async fn query(
    state: &SharedState,
    mut criteria: MatchCriteria,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    criteria.limit = state.effective_limit(criteria.limit);
    let entries = state.store.find(&criteria).await?;

    if criteria.limit > 0 && entries.len() > criteria.limit {
        return Err(ApiError::TooLarge {
            found: entries.len(),
            limit: criteria.limit,
        });
    }

    Ok(Json(entries))
}
