//! Core abstractions shared by drivers and stages.
//!
//! - [`schema`]: table and column metadata
//! - [`value`]: cell values, generic rows and batches
//! - [`traits`]: the source and destination store traits
//!
//! Stages are written against the traits only. Drivers under `drivers/`
//! implement them for MySQL and for an in-memory store.

pub mod schema;
pub mod traits;
pub mod value;

pub use schema::{Column, Table};
pub use traits::{
    QuotedReply, ReadOptions, ScanOptions, ScanOrder, SourceReader, TargetWriter,
    DEFAULT_BATCH_SIZE,
};
pub use value::{Batch, Row, SqlValue, ID_COLUMN};
