//! Configuration loading and validation.
//!
//! Settings come from environment variables. [`Config::from_lookup`] takes
//! the lookup as a closure so callers (and tests) decide where values come
//! from; [`Config::from_env`] reads the process environment.

mod types;
mod validation;

pub use types::*;

use std::path::PathBuf;

use crate::error::{MigrateError, Result};

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Config {
            source: StoreConfig::from_lookup(StoreRole::Legacy, &lookup)?,
            target: StoreConfig::from_lookup(StoreRole::Next, &lookup)?,
            paths: AppPaths {
                legacy: PathBuf::from(required(&lookup, "LEGACY_APP_PATH")?),
                next: PathBuf::from(required(&lookup, "NEXT_APP_PATH")?),
            },
            migration: MigrationConfig::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }
}

impl StoreConfig {
    /// Read `<PREFIX>_DB_*` settings for one store.
    pub fn from_lookup<F>(role: StoreRole, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = role.env_prefix();
        let var = |name: &str| format!("{}_DB_{}", prefix, name);

        let driver = required(lookup, &var("CONNECTION"))?.parse()?;

        let port_var = var("PORT");
        let port = match non_empty(lookup, &port_var) {
            Some(raw) => raw.trim().parse::<u16>().map_err(|_| {
                MigrateError::Config(format!("{} must be a port number, got '{}'", port_var, raw))
            })?,
            None => DEFAULT_PORT,
        };

        Ok(StoreConfig {
            role,
            driver,
            host: non_empty(lookup, &var("HOST")).unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port,
            database: non_empty(lookup, &var("DATABASE"))
                .unwrap_or_else(|| DEFAULT_DATABASE.to_string()),
            user: non_empty(lookup, &var("USERNAME")).unwrap_or_else(|| DEFAULT_USER.to_string()),
            password: lookup(&var("PASSWORD")).unwrap_or_default(),
        })
    }
}

/// A set, non-blank variable.
fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key).filter(|v| !v.trim().is_empty())
}

fn required<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key).ok_or_else(|| MigrateError::Config(format!("{} is required", key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("LEGACY_DB_CONNECTION", "mysql"),
            ("LEGACY_DB_DATABASE", "legacy"),
            ("NEXT_DB_CONNECTION", "mysql"),
            ("NEXT_DB_DATABASE", "next"),
            ("LEGACY_APP_PATH", "/srv/legacy"),
            ("NEXT_APP_PATH", "/srv/next"),
        ]
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup_from(&minimal())).unwrap();

        assert_eq!(config.source.host, "127.0.0.1");
        assert_eq!(config.source.port, 3306);
        assert_eq!(config.source.user, "forge");
        assert_eq!(config.source.password, "");
        assert_eq!(config.source.database, "legacy");
        assert_eq!(config.target.database, "next");
        assert_eq!(config.target.role, StoreRole::Next);
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.paths.next, PathBuf::from("/srv/next"));
    }

    #[test]
    fn test_explicit_values() {
        let mut vars = minimal();
        vars.extend([
            ("NEXT_DB_HOST", "db.internal"),
            ("NEXT_DB_PORT", "3307"),
            ("NEXT_DB_USERNAME", "next_user"),
            ("NEXT_DB_PASSWORD", "s3cret"),
        ]);
        let config = Config::from_lookup(lookup_from(&vars)).unwrap();

        assert_eq!(config.target.host, "db.internal");
        assert_eq!(config.target.port, 3307);
        assert_eq!(config.target.user, "next_user");
        assert_eq!(config.target.password, "s3cret");
    }

    #[test]
    fn test_missing_connection_is_config_error() {
        let vars: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "LEGACY_DB_CONNECTION")
            .collect();
        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("LEGACY_DB_CONNECTION")));
    }

    #[test]
    fn test_missing_app_path_is_config_error() {
        let vars: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "NEXT_APP_PATH")
            .collect();
        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("NEXT_APP_PATH")));
    }

    #[test]
    fn test_bad_port_is_config_error() {
        let mut vars = minimal();
        vars.push(("LEGACY_DB_PORT", "mysql"));
        let err = Config::from_lookup(lookup_from(&vars)).unwrap_err();
        assert!(matches!(err, MigrateError::Config(ref m) if m.contains("LEGACY_DB_PORT")));
    }

    #[test]
    fn test_unsupported_driver() {
        let mut vars: Vec<_> = minimal()
            .into_iter()
            .filter(|(k, _)| *k != "NEXT_DB_CONNECTION")
            .collect();
        vars.push(("NEXT_DB_CONNECTION", "sqlsrv"));
        assert!(matches!(
            Config::from_lookup(lookup_from(&vars)),
            Err(MigrateError::Config(_))
        ));
    }
}
