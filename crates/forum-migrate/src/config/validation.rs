//! Configuration validation.

use tracing::warn;

use super::Config;
use crate::error::{MigrateError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    for store in [&config.source, &config.target] {
        let prefix = store.role.env_prefix();
        if store.host.is_empty() {
            return Err(MigrateError::Config(format!("{}_DB_HOST is required", prefix)));
        }
        if store.database.is_empty() {
            return Err(MigrateError::Config(format!(
                "{}_DB_DATABASE is required",
                prefix
            )));
        }
        if store.port == 0 {
            return Err(MigrateError::Config(format!(
                "{}_DB_PORT must be non-zero",
                prefix
            )));
        }
    }

    if shares_database(config) {
        warn!(
            "legacy and next connections both point at {}; copies will collide with the source tables",
            config.source.describe()
        );
    }

    if config.migration.batch_size == 0 {
        return Err(MigrateError::Config(
            "migration batch size must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Whether both stores resolve to the same server and database.
pub fn shares_database(config: &Config) -> bool {
    config.source.host == config.target.host
        && config.source.port == config.target.port
        && config.source.database == config.target.database
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        AppPaths, MigrationConfig, StoreConfig, StoreDriver, StoreRole, DEFAULT_DATABASE,
        DEFAULT_HOST, DEFAULT_PORT,
    };
    use std::path::PathBuf;

    fn store(role: StoreRole, database: &str) -> StoreConfig {
        StoreConfig {
            role,
            driver: StoreDriver::Mysql,
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            database: database.to_string(),
            user: "forge".to_string(),
            password: String::new(),
        }
    }

    fn valid_config() -> Config {
        Config {
            source: store(StoreRole::Legacy, "legacy"),
            target: store(StoreRole::Next, "next"),
            paths: AppPaths {
                legacy: PathBuf::from("/srv/legacy"),
                next: PathBuf::from("/srv/next"),
            },
            migration: MigrationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(validate(&valid_config()).is_ok());
    }

    #[test]
    fn test_default_databases_accepted() {
        let mut config = valid_config();
        config.source.database = DEFAULT_DATABASE.to_string();
        config.target.database = DEFAULT_DATABASE.to_string();
        assert!(shares_database(&config));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_same_database_on_other_host() {
        let mut config = valid_config();
        config.target.database = "legacy".to_string();
        assert!(shares_database(&config));
        config.target.host = "10.0.0.2".to_string();
        assert!(!shares_database(&config));
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_port() {
        let mut config = valid_config();
        config.source.port = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("LEGACY_DB_PORT"));
    }
}
