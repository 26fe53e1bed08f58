//! Migration orchestrator - runs the stages in order.
//!
//! A run is five labelled stages: verify, copy, remap boards, strip tags,
//! flatten quotes. The first failing stage stops the run; its error is
//! wrapped with the stage label.

pub mod pools;
pub mod preflight;

pub use pools::{HealthCheckResult, Stores, PROBE_TABLE};

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::remap::{remap_boards, RemapStats};
use crate::rewrite::{apply_rewrites, PairedTag, QuoteFlattener, RewriteStats, TagStripper};
use crate::transfer::{copy_plan, TableMapping, TransferConfig, TransferEngine, TransferStats};

/// Tag stripped from reply bodies.
pub const UNSUPPORTED_TAG: &str = "center";

/// One labelled step of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Verify,
    Copy,
    RemapBoards,
    StripTags,
    FlattenQuotes,
}

impl Stage {
    /// All stages in run order.
    pub const ALL: [Stage; 5] = [
        Stage::Verify,
        Stage::Copy,
        Stage::RemapBoards,
        Stage::StripTags,
        Stage::FlattenQuotes,
    ];

    /// Task label shown to the operator.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Verify => "Verifying configuration",
            Stage::Copy => "Copying data",
            Stage::RemapBoards => "Converting categories to boards",
            Stage::StripTags => "Stripping unsupported tags from replies",
            Stage::FlattenQuotes => "Flattening quotes",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Progress events streamed while a run executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressUpdate {
    StageStarted { stage: Stage },
    TableCopyStarted { source: String, target: String },
    TableCopied { stats: TransferStats },
    StageCompleted { stage: Stage },
    StageFailed { stage: Stage, error: String },
}

/// Result of a migration run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationResult {
    /// Unique run identifier.
    pub run_id: String,

    /// When the migration started.
    pub started_at: DateTime<Utc>,

    /// When the migration completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Per-table copy statistics, in copy order.
    pub tables: Vec<TransferStats>,

    /// Total rows copied.
    pub rows_transferred: u64,

    /// Board remap counters.
    pub boards: RemapStats,

    /// Tag stripping counters.
    pub tags: RewriteStats,

    /// Quote flattening counters.
    pub quotes: RewriteStats,
}

impl MigrationResult {
    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Row counts of one copied table on both stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableValidation {
    pub source: String,
    pub target: String,
    pub source_rows: i64,
    pub target_rows: i64,
    pub matches: bool,
}

#[derive(Default)]
struct RunSummary {
    tables: Vec<TransferStats>,
    boards: RemapStats,
    tags: RewriteStats,
    quotes: RewriteStats,
}

/// Migration orchestrator.
pub struct Orchestrator {
    config: Config,
    stores: Stores,
    progress_tx: Option<mpsc::Sender<ProgressUpdate>>,
}

impl Orchestrator {
    /// Connect both stores and create an orchestrator.
    pub async fn new(config: Config) -> Result<Self> {
        let stores = Stores::connect(&config).await?;
        Ok(Self::with_stores(config, stores))
    }

    /// Create an orchestrator over already-opened stores.
    pub fn with_stores(config: Config, stores: Stores) -> Self {
        Self {
            config,
            stores,
            progress_tx: None,
        }
    }

    /// Set progress channel for updates.
    pub fn with_progress(mut self, tx: mpsc::Sender<ProgressUpdate>) -> Self {
        self.progress_tx = Some(tx);
        self
    }

    /// Send progress update if channel is configured.
    async fn send_progress(&self, update: ProgressUpdate) {
        if let Some(tx) = &self.progress_tx {
            let _ = tx.send(update).await;
        }
    }

    /// Run every stage in order.
    pub async fn run(&self) -> Result<MigrationResult> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting migration run: {}", run_id);

        let mut summary = RunSummary::default();
        for stage in Stage::ALL {
            info!("{}", stage);
            self.send_progress(ProgressUpdate::StageStarted { stage }).await;

            if let Err(e) = self.run_stage(stage, &mut summary).await {
                error!("{} failed: {}", stage, e);
                self.send_progress(ProgressUpdate::StageFailed {
                    stage,
                    error: e.to_string(),
                })
                .await;
                return Err(e.in_stage(stage.label()));
            }

            self.send_progress(ProgressUpdate::StageCompleted { stage }).await;
        }

        let completed_at = Utc::now();
        let duration_seconds = (completed_at - started_at).num_milliseconds() as f64 / 1000.0;
        let rows_transferred = summary.tables.iter().map(|t| t.rows).sum();

        let result = MigrationResult {
            run_id,
            started_at,
            completed_at,
            duration_seconds,
            tables: summary.tables,
            rows_transferred,
            boards: summary.boards,
            tags: summary.tags,
            quotes: summary.quotes,
        };

        info!(
            "Migration completed: {} tables, {} rows in {:.1}s",
            result.tables.len(),
            result.rows_transferred,
            result.duration_seconds
        );
        Ok(result)
    }

    async fn run_stage(&self, stage: Stage, summary: &mut RunSummary) -> Result<()> {
        let target = self.stores.target.as_ref();
        let batch_size = self.config.migration.batch_size;

        match stage {
            Stage::Verify => {
                self.stores.verify().await?;
                preflight::check_app_paths(&self.config.paths)?;
            }
            Stage::Copy => {
                let engine = TransferEngine::new(
                    self.stores.source.clone(),
                    self.stores.target.clone(),
                    TransferConfig { batch_size },
                );
                for mapping in copy_plan() {
                    self.send_progress(ProgressUpdate::TableCopyStarted {
                        source: mapping.source.clone(),
                        target: mapping.target.clone(),
                    })
                    .await;
                    info!("Copying data from {} to {}", mapping.source, mapping.target);

                    let stats = engine.copy_table(&mapping).await?;
                    self.send_progress(ProgressUpdate::TableCopied {
                        stats: stats.clone(),
                    })
                    .await;
                    summary.tables.push(stats);
                }
            }
            Stage::RemapBoards => {
                summary.boards = remap_boards(target).await?;
            }
            Stage::StripTags => {
                summary.tags = TagStripper::new(PairedTag::new(UNSUPPORTED_TAG)?)
                    .with_batch_size(batch_size)
                    .run(target)
                    .await?;
            }
            Stage::FlattenQuotes => {
                let pending = QuoteFlattener::new()
                    .with_batch_size(batch_size)
                    .scan(target)
                    .await?;
                summary.quotes = RewriteStats {
                    rows_scanned: pending.scanned(),
                    rows_rewritten: apply_rewrites(target, &pending).await?,
                };
            }
        }
        Ok(())
    }

    /// Probe both stores without failing fast.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        Ok(self.stores.health_check().await)
    }

    /// Validate row counts between source and destination for the copy plan.
    pub async fn validate(&self) -> Result<Vec<TableValidation>> {
        let mut results = Vec::new();

        for TableMapping { source, target } in copy_plan() {
            let source_rows = self.stores.source.row_count(&source).await?;
            let target_rows = self.stores.target.row_count(&target).await.unwrap_or(0);
            let matches = source_rows == target_rows;

            if matches {
                info!("{} -> {}: {} rows (match)", source, target, source_rows);
            } else {
                warn!(
                    "{} -> {}: source={} target={} (MISMATCH)",
                    source, target, source_rows, target_rows
                );
            }

            results.push(TableValidation {
                source,
                target,
                source_rows,
                target_rows,
                matches,
            });
        }

        Ok(results)
    }

    /// Close both stores.
    pub async fn close(&self) {
        self.stores.close().await;
    }
}
