//! # forum-migrate
//!
//! One-shot migration of a legacy forum database into the next schema.
//!
//! A run copies every table in keyset-paginated batches, applying per-table
//! column rules, then rewrites the copied data in place on the destination:
//!
//! - **Board remap**: renames boards and folds retired ones into `random`
//! - **Tag stripping**: removes `[center]` markup from reply bodies
//! - **Quote flattening**: expands `#p:<id>` references into quote blocks
//!
//! ## Example
//!
//! ```rust,no_run
//! use forum_migrate::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> forum_migrate::Result<()> {
//!     let config = Config::from_env()?;
//!     let orchestrator = Orchestrator::new(config).await?;
//!     let result = orchestrator.run().await?;
//!     println!("Migrated {} rows", result.rows_transferred);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod core;
pub mod drivers;
pub mod error;
pub mod orchestrator;
pub mod remap;
pub mod rewrite;
pub mod transfer;
pub mod transform;

// Re-exports for convenient access
pub use config::{AppPaths, Config, MigrationConfig, StoreConfig, StoreDriver, StoreRole};
pub use core::{Batch, Row, SourceReader, SqlValue, Table, TargetWriter};
pub use drivers::{MemoryStore, MysqlReader, MysqlWriter};
pub use error::{MigrateError, Result};
pub use orchestrator::{
    HealthCheckResult, MigrationResult, Orchestrator, ProgressUpdate, Stage, Stores,
    TableValidation,
};
pub use transfer::{TableMapping, TransferConfig, TransferEngine, TransferStats};
