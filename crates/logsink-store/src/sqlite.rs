// ABOUTME: SQLite-backed log store that translates MatchCriteria into a WHERE clause.
// ABOUTME: Filtering, deletion counts, and result caps are all delegated to the database.

use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use logsink_core::{LogEntry, LogLevel, MatchCriteria};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, Row, params, params_from_iter};

use crate::store::{LogStore, StoreError, run_blocking};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS log_entries (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        log_level TEXT NOT NULL,
        labels TEXT NOT NULL,
        origin_service TEXT NOT NULL,
        message TEXT NOT NULL,
        created INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_log_entries_created ON log_entries (created);";

/// A log store kept in a single SQLite table. Labels are stored as a JSON
/// array and matched with `json_each`.
///
/// Time bounds here are strict (`created > start`, `created < end`), unlike
/// the inclusive bounds of [`MatchCriteria::matches`] used by the file store.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    io_timeout: Duration,
}

impl SqliteStore {
    /// Open or create a database at `path` and ensure the schema exists.
    pub fn open(path: &Path, io_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, io_timeout)
    }

    /// Open a private in-memory database. Contents vanish with the store.
    pub fn open_in_memory(io_timeout: Duration) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, io_timeout)
    }

    fn init(conn: Connection, io_timeout: Duration) -> Result<Self, StoreError> {
        conn.busy_timeout(io_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            io_timeout,
        })
    }
}

#[async_trait]
impl LogStore for SqliteStore {
    async fn add(&self, entry: LogEntry) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(self.io_timeout, move || {
            let conn = lock(&conn)?;
            insert(&conn, &entry)
        })
        .await
    }

    async fn find(&self, criteria: &MatchCriteria) -> Result<Vec<LogEntry>, StoreError> {
        let conn = Arc::clone(&self.conn);
        let criteria = criteria.clone();
        run_blocking(self.io_timeout, move || {
            let conn = lock(&conn)?;
            select(&conn, &criteria)
        })
        .await
    }

    async fn remove(&self, criteria: &MatchCriteria) -> Result<usize, StoreError> {
        let conn = Arc::clone(&self.conn);
        let filter = Filter::from_criteria(criteria);
        run_blocking(self.io_timeout, move || {
            let sql = format!("DELETE FROM log_entries{}", filter.where_clause());
            let removed = lock(&conn)?.execute(&sql, params_from_iter(filter.params.iter()))?;
            Ok(removed)
        })
        .await
    }

    async fn reset(&self) -> Result<(), StoreError> {
        let conn = Arc::clone(&self.conn);
        run_blocking(self.io_timeout, move || {
            lock(&conn)?.execute("DELETE FROM log_entries", [])?;
            Ok(())
        })
        .await
    }
}

fn lock(conn: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>, StoreError> {
    conn.lock().map_err(|_| StoreError::Poisoned)
}

fn insert(conn: &Connection, entry: &LogEntry) -> Result<(), StoreError> {
    let labels = serde_json::to_string(&entry.labels)?;
    conn.execute(
        "INSERT INTO log_entries (log_level, labels, origin_service, message, created)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            entry.level.as_str(),
            labels,
            entry.origin_service,
            entry.message,
            entry.created,
        ],
    )?;
    Ok(())
}

fn select(conn: &Connection, criteria: &MatchCriteria) -> Result<Vec<LogEntry>, StoreError> {
    let mut filter = Filter::from_criteria(criteria);
    let mut sql = format!(
        "SELECT log_level, labels, origin_service, message, created FROM log_entries{} ORDER BY id",
        filter.where_clause()
    );
    if criteria.limit > 0 {
        sql.push_str(" LIMIT ?");
        filter
            .params
            .push(Value::Integer(i64::try_from(criteria.limit).unwrap_or(i64::MAX)));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(filter.params.iter()), entry_from_row)?;

    let mut entries = Vec::new();
    for row in rows {
        entries.push(row?);
    }
    Ok(entries)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<LogEntry> {
    let level: String = row.get(0)?;
    let level = level
        .parse::<LogLevel>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;
    let labels: String = row.get(1)?;
    let labels = serde_json::from_str::<Vec<String>>(&labels)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(LogEntry {
        level,
        labels,
        origin_service: row.get(2)?,
        message: row.get(3)?,
        created: row.get(4)?,
    })
}

/// The WHERE conditions for a MatchCriteria, with positional parameters in
/// the order their `?` placeholders appear.
#[derive(Debug, Default)]
struct Filter {
    conditions: Vec<String>,
    params: Vec<Value>,
}

impl Filter {
    fn from_criteria(criteria: &MatchCriteria) -> Self {
        let mut filter = Filter::default();

        if !criteria.origin_services.is_empty() {
            filter.conditions.push(format!(
                "origin_service IN ({})",
                placeholders(criteria.origin_services.len())
            ));
            filter
                .params
                .extend(criteria.origin_services.iter().cloned().map(Value::Text));
        }

        if !criteria.log_levels.is_empty() {
            filter.conditions.push(format!(
                "log_level IN ({})",
                placeholders(criteria.log_levels.len())
            ));
            filter.params.extend(
                criteria
                    .log_levels
                    .iter()
                    .map(|level| Value::Text(level.as_str().to_string())),
            );
        }

        if !criteria.labels.is_empty() {
            filter.conditions.push(format!(
                "EXISTS (SELECT 1 FROM json_each(log_entries.labels) WHERE json_each.value IN ({}))",
                placeholders(criteria.labels.len())
            ));
            filter
                .params
                .extend(criteria.labels.iter().cloned().map(Value::Text));
        }

        if !criteria.keywords.is_empty() {
            let any = vec!["instr(message, ?) > 0"; criteria.keywords.len()].join(" OR ");
            filter.conditions.push(format!("({})", any));
            filter
                .params
                .extend(criteria.keywords.iter().cloned().map(Value::Text));
        }

        if criteria.start > 0 {
            filter.conditions.push("created > ?".to_string());
            filter.params.push(Value::Integer(criteria.start));
        }

        if criteria.end > 0 {
            filter.conditions.push("created < ?".to_string());
            filter.params.push(Value::Integer(criteria.end));
        }

        filter
    }

    /// `" WHERE a AND b"`, or empty when nothing is filtered.
    fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
