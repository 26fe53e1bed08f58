//! Table copier: batched, id-ordered copy from the legacy store to the next store.
//!
//! Each table is read in keyset-paginated batches (`id > last ORDER BY id
//! LIMIT n`), every row goes through [`crate::transform`], and the batch is
//! written with a single multi-row insert. Reads and writes alternate; no
//! batch is read ahead of the one being written.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{ReadOptions, SourceReader, TargetWriter, DEFAULT_BATCH_SIZE};
use crate::error::{MigrateError, Result};
use crate::transform::transform_rows;

/// Tables copied under their own name, in copy order.
pub const IDENTITY_TABLES: &[&str] = &[
    "achievements",
    "activity_log",
    "bans",
    "failed_jobs",
    "firewall",
    "has_read_discussions_users",
    "notifications",
    "post_reaction_user",
    "reactions",
    "roles",
    "subscribed_discussions_users",
    "user_achievement",
    "users",
    "users_discussions",
];

/// Tables copied under a new name, in copy order.
///
/// Referenced tables come first: threads point at boards, replies at threads.
pub const RENAMED_TABLES: &[(&str, &str)] = &[
    ("categories", "boards"),
    ("discussions", "threads"),
    ("posts", "replies"),
];

/// A source table and the destination table it is copied into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMapping {
    /// Table in the legacy store.
    pub source: String,
    /// Table in the next store.
    pub target: String,
}

impl TableMapping {
    /// Copy a table under its own name.
    pub fn identity(table: impl Into<String>) -> Self {
        let table = table.into();
        Self {
            source: table.clone(),
            target: table,
        }
    }

    /// Copy a table under a new name.
    pub fn renamed(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }

    /// Whether source and destination names differ.
    pub fn is_rename(&self) -> bool {
        self.source != self.target
    }
}

impl fmt::Display for TableMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

/// The fixed, dependency-ordered copy plan.
pub fn copy_plan() -> Vec<TableMapping> {
    IDENTITY_TABLES
        .iter()
        .map(|t| TableMapping::identity(*t))
        .chain(
            RENAMED_TABLES
                .iter()
                .map(|(source, target)| TableMapping::renamed(*source, *target)),
        )
        .collect()
}

/// Statistics from copying one table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferStats {
    /// Source table.
    pub source: String,

    /// Destination table.
    pub target: String,

    /// Total rows copied.
    pub rows: u64,

    /// Number of batches read.
    pub batches: u64,

    /// Last `id` copied.
    pub last_id: Option<i64>,

    /// Time spent reading from the source.
    #[serde(with = "duration_ms")]
    pub read_time: Duration,

    /// Time spent writing to the destination.
    #[serde(with = "duration_ms")]
    pub write_time: Duration,
}

/// Transfer engine configuration.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

/// Copies tables from the source store into the destination store.
pub struct TransferEngine {
    source: Arc<dyn SourceReader>,
    target: Arc<dyn TargetWriter>,
    config: TransferConfig,
}

impl TransferEngine {
    /// Create a new transfer engine.
    pub fn new(
        source: Arc<dyn SourceReader>,
        target: Arc<dyn TargetWriter>,
        config: TransferConfig,
    ) -> Self {
        Self {
            source,
            target,
            config,
        }
    }

    /// Copy one table.
    ///
    /// Not idempotent: rows already present in the destination make the
    /// insert fail, and the copy stops at the first failing batch.
    pub async fn copy_table(&self, mapping: &TableMapping) -> Result<TransferStats> {
        let start = Instant::now();
        let mut stats = TransferStats {
            source: mapping.source.clone(),
            target: mapping.target.clone(),
            ..Default::default()
        };

        let table = self.source.describe_table(&mapping.source).await?;
        if !table.supports_keyset_pagination() {
            return Err(MigrateError::NoPrimaryKey(mapping.source.clone()));
        }

        let mut opts = ReadOptions::new(&table, self.config.batch_size);

        loop {
            let read_start = Instant::now();
            let batch = self.source.read_batch(&opts).await?;
            stats.read_time += read_start.elapsed();

            if batch.is_empty() {
                break;
            }
            stats.batches += 1;

            let is_last = batch.is_last;
            let last_key = batch.last_key;
            let rows = transform_rows(batch.rows, &mapping.target);

            let write_start = Instant::now();
            let written = self.target.insert_batch(&mapping.target, &rows).await?;
            stats.write_time += write_start.elapsed();
            stats.rows += written;
            if last_key.is_some() {
                stats.last_id = last_key;
            }

            debug!(
                "{}: batch {} wrote {} rows (last id: {:?})",
                mapping, stats.batches, written, last_key
            );

            if is_last {
                break;
            }
            match last_key {
                Some(id) => opts.after_id = Some(id),
                None => {
                    return Err(MigrateError::read(
                        &mapping.source,
                        "batch has no id to continue from",
                    ))
                }
            }
        }

        let elapsed = start.elapsed();
        info!(
            "{}: copied {} rows in {:?} (read: {:?}, write: {:?})",
            mapping, stats.rows, elapsed, stats.read_time, stats.write_time
        );

        Ok(stats)
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Row, SqlValue};
    use crate::drivers::memory::MemoryStore;

    fn engine(source: &MemoryStore, target: &MemoryStore, batch_size: usize) -> TransferEngine {
        TransferEngine::new(
            Arc::new(source.clone()),
            Arc::new(target.clone()),
            TransferConfig { batch_size },
        )
    }

    fn seed_posts(store: &MemoryStore, n: i64) {
        store.create_table("posts", &["id", "discussion_id", "body"]);
        let rows: Vec<Row> = (1..=n)
            .map(|id| {
                Row::new()
                    .with("id", id)
                    .with("discussion_id", id % 7)
                    .with("body", format!("post {}", id))
            })
            .collect();
        store.seed("posts", rows);
    }

    #[test]
    fn test_copy_plan_order() {
        let plan = copy_plan();
        assert_eq!(plan.len(), 17);
        assert_eq!(plan[0], TableMapping::identity("achievements"));

        let pos = |target: &str| plan.iter().position(|m| m.target == target).unwrap();
        assert!(pos("users") < pos("replies"));
        assert!(pos("boards") < pos("threads"));
        assert!(pos("threads") < pos("replies"));
        assert_eq!(plan[16], TableMapping::renamed("posts", "replies"));
        assert!(plan[16].is_rename());
        assert!(!plan[0].is_rename());
    }

    #[tokio::test]
    async fn test_copy_is_complete_for_batch_boundaries() {
        for n in [0_i64, 1, 499, 500, 501, 1999] {
            let source = MemoryStore::new();
            let target = MemoryStore::new();
            seed_posts(&source, n);
            target.create_table("replies", &["id", "thread_id", "body"]);

            let stats = engine(&source, &target, 500)
                .copy_table(&TableMapping::renamed("posts", "replies"))
                .await
                .unwrap();

            assert_eq!(stats.rows, n as u64, "n = {}", n);
            let ids = target.ids("replies");
            let expected: Vec<i64> = (1..=n).collect();
            assert_eq!(ids, expected, "n = {}", n);
            assert_eq!(stats.batches, (n as u64).div_ceil(500), "n = {}", n);
        }
    }

    #[tokio::test]
    async fn test_copy_applies_rules() {
        let source = MemoryStore::new();
        let target = MemoryStore::new();
        seed_posts(&source, 3);
        target.create_table("replies", &["id", "thread_id", "body"]);

        engine(&source, &target, 2)
            .copy_table(&TableMapping::renamed("posts", "replies"))
            .await
            .unwrap();

        let row = target.row("replies", 3).unwrap();
        assert_eq!(row.get("thread_id"), Some(&SqlValue::I64(3)));
        assert!(!row.contains("discussion_id"));
        assert_eq!(row.text("body"), Some("post 3"));
    }

    #[tokio::test]
    async fn test_copy_into_populated_table_fails() {
        let source = MemoryStore::new();
        let target = MemoryStore::new();
        seed_posts(&source, 3);
        target.create_table("replies", &["id", "thread_id", "body"]);

        let engine = engine(&source, &target, 500);
        let mapping = TableMapping::renamed("posts", "replies");
        engine.copy_table(&mapping).await.unwrap();

        let err = engine.copy_table(&mapping).await.unwrap_err();
        assert!(matches!(err, MigrateError::Insert { ref table, .. } if table == "replies"));
        assert_eq!(target.ids("replies").len(), 3);
    }

    #[tokio::test]
    async fn test_copy_without_id_column() {
        let source = MemoryStore::new();
        let target = MemoryStore::new();
        source.create_table("post_reaction_user", &["post_id", "user_id"]);

        let err = engine(&source, &target, 500)
            .copy_table(&TableMapping::identity("post_reaction_user"))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::NoPrimaryKey(_)));
    }
}
