// ABOUTME: Configuration loading and validation for the logsink server.
// ABOUTME: Reads LOGSINK_* environment variables and selects the persistence backend.

use std::fmt;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use logsink_store::StoreConfig;
use thiserror::Error;

use crate::app_state::DEFAULT_READ_MAX_LIMIT;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("LOGSINK_BIND is not a valid socket address: {0}")]
    InvalidBind(String),

    #[error("unknown persistence backend '{0}', expected 'file' or 'sqlite'")]
    UnknownPersistence(String),

    #[error("LOGSINK_IO_TIMEOUT_MS must be a positive integer: {0}")]
    InvalidTimeout(String),

    #[error("LOGSINK_READ_MAX_LIMIT must be a non-negative integer: {0}")]
    InvalidReadMaxLimit(String),
}

/// Which storage backend the process uses for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    File,
    Sqlite,
}

impl FromStr for Persistence {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Persistence::File),
            "sqlite" => Ok(Persistence::Sqlite),
            other => Err(ConfigError::UnknownPersistence(other.to_string())),
        }
    }
}

impl fmt::Display for Persistence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Persistence::File => f.write_str("file"),
            Persistence::Sqlite => f.write_str("sqlite"),
        }
    }
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct LogsinkConfig {
    pub bind: SocketAddr,
    pub persistence: Persistence,
    pub log_file: PathBuf,
    pub db_path: PathBuf,
    pub io_timeout: Duration,
    pub read_max_limit: usize,
}

impl LogsinkConfig {
    /// Load configuration from environment variables with sensible defaults.
    ///
    /// Environment variables:
    /// - LOGSINK_BIND: socket address to bind (default: 127.0.0.1:48061)
    /// - LOGSINK_PERSISTENCE: `file` or `sqlite` (default: file)
    /// - LOGSINK_LOG_FILE: JSONL file for the file backend (default: logsink.jsonl)
    /// - LOGSINK_DB_PATH: database for the sqlite backend (default: logsink.db)
    /// - LOGSINK_IO_TIMEOUT_MS: bound on each storage operation (default: 5000)
    /// - LOGSINK_READ_MAX_LIMIT: most entries one query returns, 0 for no cap (default: 50000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_str =
            std::env::var("LOGSINK_BIND").unwrap_or_else(|_| "127.0.0.1:48061".to_string());
        let bind: SocketAddr = bind_str
            .parse()
            .map_err(|_| ConfigError::InvalidBind(bind_str))?;

        let persistence = match std::env::var("LOGSINK_PERSISTENCE") {
            Ok(value) if !value.is_empty() => value.parse()?,
            _ => Persistence::File,
        };

        let log_file = std::env::var("LOGSINK_LOG_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logsink.jsonl"));

        let db_path = std::env::var("LOGSINK_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("logsink.db"));

        let io_timeout = match std::env::var("LOGSINK_IO_TIMEOUT_MS") {
            Ok(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => return Err(ConfigError::InvalidTimeout(value)),
            },
            Err(_) => Duration::from_millis(5000),
        };

        let read_max_limit = match std::env::var("LOGSINK_READ_MAX_LIMIT") {
            Ok(value) => value
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidReadMaxLimit(value))?,
            Err(_) => DEFAULT_READ_MAX_LIMIT,
        };

        Ok(Self {
            bind,
            persistence,
            log_file,
            db_path,
            io_timeout,
            read_max_limit,
        })
    }

    /// The store configuration for the selected backend.
    pub fn store_config(&self) -> StoreConfig {
        match self.persistence {
            Persistence::File => StoreConfig::File {
                path: self.log_file.clone(),
                io_timeout: self.io_timeout,
            },
            Persistence::Sqlite => StoreConfig::Sqlite {
                path: self.db_path.clone(),
                io_timeout: self.io_timeout,
            },
        }
    }
}
