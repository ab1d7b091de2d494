// ABOUTME: Shared application state for the logsink HTTP server.
// ABOUTME: Holds the single LogStore chosen at startup and the cap on query results.

use std::sync::Arc;

use logsink_store::LogStore;

/// Default cap on how many entries a single query may return.
pub const DEFAULT_READ_MAX_LIMIT: usize = 50_000;

/// Shared application state accessible by all Axum handlers.
pub struct AppState {
    pub store: Arc<dyn LogStore>,
    /// Upper bound applied to every query's limit; 0 disables the cap.
    pub read_max_limit: usize,
}

/// Type alias for the Arc-wrapped state used with Axum's State extractor.
pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(store: Arc<dyn LogStore>) -> Self {
        Self {
            store,
            read_max_limit: DEFAULT_READ_MAX_LIMIT,
        }
    }

    pub fn with_read_max_limit(mut self, read_max_limit: usize) -> Self {
        self.read_max_limit = read_max_limit;
        self
    }

    /// The limit a query actually runs with. A missing (0) or oversized
    /// request is replaced by the configured maximum.
    pub fn effective_limit(&self, requested: usize) -> usize {
        if self.read_max_limit > 0 && (requested == 0 || requested > self.read_max_limit) {
            self.read_max_limit
        } else {
            requested
        }
    }
}
