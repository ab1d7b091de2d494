// ABOUTME: Persistence layer for logsink, storing entries and answering filtered queries.
// ABOUTME: Provides the LogStore trait with a JSONL file backend and a SQLite backend.

pub mod jsonl;
pub mod sqlite;
pub mod store;

pub use jsonl::JsonlStore;
pub use sqlite::SqliteStore;
pub use store::{LogStore, StoreConfig, StoreError, open_store};
