//! Store connections for the legacy and next databases.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, StoreDriver, StoreRole};
use crate::core::{SourceReader, TargetWriter};
use crate::drivers::{MysqlReader, MysqlWriter};
use crate::error::{MigrateError, Result};

/// Table read by the connectivity probe on both stores.
pub const PROBE_TABLE: &str = "users";

/// The pipeline is sequential; one connection per store is enough.
const MAX_CONNECTIONS: u32 = 1;

/// Result of a health check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Whether the legacy store answered the probe.
    pub source_connected: bool,

    /// Legacy store probe latency in milliseconds.
    pub source_latency_ms: u64,

    /// Legacy store error, if any.
    pub source_error: Option<String>,

    /// Whether the next store answered the probe.
    pub target_connected: bool,

    /// Next store probe latency in milliseconds.
    pub target_latency_ms: u64,

    /// Next store error, if any.
    pub target_error: Option<String>,

    /// Both stores reachable.
    pub healthy: bool,
}

/// Source reader and destination writer for one run.
#[derive(Clone)]
pub struct Stores {
    pub source: Arc<dyn SourceReader>,
    pub target: Arc<dyn TargetWriter>,
}

impl Stores {
    /// Wrap already-opened stores.
    pub fn new(source: Arc<dyn SourceReader>, target: Arc<dyn TargetWriter>) -> Self {
        Self { source, target }
    }

    /// Open both stores from configuration.
    pub async fn connect(config: &Config) -> Result<Self> {
        let source: Arc<dyn SourceReader> = match config.source.driver {
            StoreDriver::Mysql => Arc::new(MysqlReader::new(&config.source, MAX_CONNECTIONS).await?),
        };
        let target: Arc<dyn TargetWriter> = match config.target.driver {
            StoreDriver::Mysql => {
                Arc::new(MysqlWriter::new(&config.target, MAX_CONNECTIONS as usize).await?)
            }
        };
        Ok(Self { source, target })
    }

    /// Read one row of `users` from each store.
    pub async fn verify(&self) -> Result<()> {
        self.source
            .probe(PROBE_TABLE)
            .await
            .map_err(|e| MigrateError::connectivity(StoreRole::Legacy.label(), e))?;
        self.target
            .probe(PROBE_TABLE)
            .await
            .map_err(|e| MigrateError::connectivity(StoreRole::Next.label(), e))?;
        info!(
            "Both stores reachable ({} -> {})",
            self.source.db_type(),
            self.target.db_type()
        );
        Ok(())
    }

    /// Probe both stores without failing fast.
    pub async fn health_check(&self) -> HealthCheckResult {
        let start = Instant::now();
        let source = self.source.probe(PROBE_TABLE).await;
        let source_latency_ms = start.elapsed().as_millis() as u64;

        let start = Instant::now();
        let target = self.target.probe(PROBE_TABLE).await;
        let target_latency_ms = start.elapsed().as_millis() as u64;

        if let Err(e) = &source {
            warn!("source health check failed: {}", e);
        }
        if let Err(e) = &target {
            warn!("destination health check failed: {}", e);
        }

        HealthCheckResult {
            source_connected: source.is_ok(),
            source_latency_ms,
            source_error: source.as_ref().err().map(ToString::to_string),
            target_connected: target.is_ok(),
            target_latency_ms,
            target_error: target.as_ref().err().map(ToString::to_string),
            healthy: source.is_ok() && target.is_ok(),
        }
    }

    /// Close both connection pools.
    pub async fn close(&self) {
        self.source.close().await;
        self.target.close().await;
    }
}
