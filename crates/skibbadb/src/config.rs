//! The database configuration surface: where and how to open the backing
//! SQLite connection.

use skibbadb_driver_sqlite::SqliteConfig as DriverSqliteConfig;
use std::path::PathBuf;

/// SQLite pragma overrides. Fields left `None` take the driver's own
/// defaults (see `skibbadb_driver_sqlite::pragmas`).
#[derive(Debug, Clone, Default)]
pub struct SqliteOptions {
    pub busy_timeout_ms: Option<u32>,
    pub read_only: Option<bool>,
}

impl SqliteOptions {
    pub fn into_driver_config(self) -> DriverSqliteConfig {
        let defaults = DriverSqliteConfig::default();
        DriverSqliteConfig {
            busy_timeout_ms: self.busy_timeout_ms.unwrap_or(defaults.busy_timeout_ms),
            read_only: self.read_only.unwrap_or(defaults.read_only),
        }
    }
}

/// Where and how to open the backing database.
#[derive(Debug, Clone)]
pub struct Config {
    pub path: Option<PathBuf>,
    pub memory: bool,
    pub sqlite: SqliteOptions,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            path: None,
            memory: true,
            sqlite: SqliteOptions::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self.memory = false;
        self
    }

    pub fn memory(mut self, memory: bool) -> Self {
        self.memory = memory;
        self
    }

    pub fn sqlite(mut self, sqlite: SqliteOptions) -> Self {
        self.sqlite = sqlite;
        self
    }
}
