//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::core::DEFAULT_BATCH_SIZE;
use crate::error::MigrateError;

/// Default database host.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default database port.
pub const DEFAULT_PORT: u16 = 3306;
/// Default database name.
pub const DEFAULT_DATABASE: &str = "forge";
/// Default database user.
pub const DEFAULT_USER: &str = "forge";

/// Marker file that identifies an application checkout.
pub const APP_MARKER_FILE: &str = "artisan";

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Legacy database (read-only).
    pub source: StoreConfig,

    /// Next database (read-write).
    pub target: StoreConfig,

    /// Application checkouts checked before any data moves.
    pub paths: AppPaths,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,
}

/// Which side of the migration a store is on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreRole {
    Legacy,
    Next,
}

impl StoreRole {
    /// Environment variable prefix (`LEGACY` / `NEXT`).
    pub fn env_prefix(&self) -> &'static str {
        match self {
            StoreRole::Legacy => "LEGACY",
            StoreRole::Next => "NEXT",
        }
    }

    /// Human-readable role used in logs and errors.
    pub fn label(&self) -> &'static str {
        match self {
            StoreRole::Legacy => "source",
            StoreRole::Next => "destination",
        }
    }
}

impl fmt::Display for StoreRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Supported database drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreDriver {
    /// MySQL 5.7+ / MariaDB 10.2+.
    Mysql,
}

impl FromStr for StoreDriver {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(StoreDriver::Mysql),
            other => Err(MigrateError::Config(format!(
                "Unsupported database connection: '{}'. Supported connections: mysql, mariadb",
                other
            ))),
        }
    }
}

impl fmt::Display for StoreDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreDriver::Mysql => f.write_str("mysql"),
        }
    }
}

/// Connection settings for one store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Legacy or next.
    pub role: StoreRole,

    /// Database driver (`*_DB_CONNECTION`).
    pub driver: StoreDriver,

    /// Database host (default: 127.0.0.1).
    pub host: String,

    /// Database port (default: 3306).
    pub port: u16,

    /// Database name (default: forge).
    pub database: String,

    /// Username (default: forge).
    pub user: String,

    /// Password (default: empty).
    #[serde(skip_serializing, default)]
    pub password: String,
}

impl StoreConfig {
    /// `host:port/database`, for logs.
    pub fn describe(&self) -> String {
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Paths of the legacy and next application checkouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    /// `LEGACY_APP_PATH`
    pub legacy: PathBuf,

    /// `NEXT_APP_PATH`
    pub next: PathBuf,
}

impl AppPaths {
    /// Marker files that must exist, with the variable that set each root.
    pub fn markers(&self) -> [(&'static str, PathBuf); 2] {
        [
            ("LEGACY_APP_PATH", self.legacy.join(APP_MARKER_FILE)),
            ("NEXT_APP_PATH", self.next.join(APP_MARKER_FILE)),
        ]
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per batch for copies and rewrite scans (default: 500).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}
