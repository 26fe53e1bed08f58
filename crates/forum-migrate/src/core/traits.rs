//! Store traits the migration stages are written against.
//!
//! - [`SourceReader`]: read-only access to the legacy database
//! - [`TargetWriter`]: read-write access to the next database
//!
//! Stages only see these traits, so they run unchanged against the MySQL
//! driver or the in-memory store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::schema::{Column, Table};
use super::value::{Batch, Row, SqlValue};

/// Default number of rows per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// Options for reading one batch of a source table.
#[derive(Debug, Clone)]
pub struct ReadOptions {
    /// Table name.
    pub table: String,
    /// Columns to read, in order, with the metadata drivers decode by.
    pub columns: Vec<Column>,
    /// Exclusive lower bound on `id` (keyset pagination).
    pub after_id: Option<i64>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl ReadOptions {
    /// Options for the first batch of `table`.
    pub fn new(table: &Table, batch_size: usize) -> Self {
        Self {
            table: table.name.clone(),
            columns: table.columns.clone(),
            after_id: None,
            batch_size,
        }
    }

    /// Names of the columns to read.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

/// Direction of a keyset scan over `id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanOrder {
    /// `id > cursor ORDER BY id ASC`
    #[default]
    Ascending,
    /// `id < cursor ORDER BY id DESC`
    Descending,
}

/// Options for scanning a destination table.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Table name.
    pub table: String,
    /// Columns to return. `id` is always included.
    pub columns: Vec<String>,
    /// Only rows where this column contains the literal substring.
    pub contains: Option<(String, String)>,
    /// Scan direction.
    pub order: ScanOrder,
    /// Exclusive cursor on `id`.
    pub cursor: Option<i64>,
    /// Number of rows per batch.
    pub batch_size: usize,
}

impl ScanOptions {
    /// Scan `column` of `table` for rows containing `needle`.
    pub fn containing(
        table: impl Into<String>,
        column: impl Into<String>,
        needle: impl Into<String>,
    ) -> Self {
        let column = column.into();
        Self {
            table: table.into(),
            columns: vec![column.clone()],
            contains: Some((column, needle.into())),
            order: ScanOrder::Ascending,
            cursor: None,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the scan direction.
    pub fn with_order(mut self, order: ScanOrder) -> Self {
        self.order = order;
        self
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Advance the cursor past the given batch.
    pub fn advance(&mut self, batch: &Batch) {
        if batch.last_key.is_some() {
            self.cursor = batch.last_key;
        }
    }

    /// Whether a row id lies beyond the cursor in scan direction.
    pub fn is_past_cursor(&self, id: i64) -> bool {
        match (self.cursor, self.order) {
            (None, _) => true,
            (Some(c), ScanOrder::Ascending) => id > c,
            (Some(c), ScanOrder::Descending) => id < c,
        }
    }
}

/// A reply resolved for quoting, joined with its thread and author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotedReply {
    /// Reply id.
    pub id: i64,
    /// Reply body.
    pub body: String,
    /// Author display name (`users.name`).
    pub author: String,
    /// Whether the parent thread is private.
    pub private: bool,
}

/// Read access to the legacy (source) database.
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Trivial existence read against a known table.
    async fn probe(&self, table: &str) -> Result<()>;

    /// Load column metadata for a table.
    async fn describe_table(&self, table: &str) -> Result<Table>;

    /// Read one batch ordered by `id` ascending.
    async fn read_batch(&self, opts: &ReadOptions) -> Result<Batch>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// Read-write access to the next (destination) database.
#[async_trait]
pub trait TargetWriter: Send + Sync {
    /// Trivial existence read against a known table.
    async fn probe(&self, table: &str) -> Result<()>;

    /// Insert all rows of a batch. Returns the number of rows written.
    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<u64>;

    /// Read one batch of a keyset scan.
    async fn scan_batch(&self, opts: &ScanOptions) -> Result<Batch>;

    /// `UPDATE table SET changes WHERE id = ?`
    async fn update_by_id(&self, table: &str, id: i64, changes: &Row) -> Result<u64>;

    /// `UPDATE table SET changes WHERE column = ?`
    async fn update_where_eq(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
        changes: &Row,
    ) -> Result<u64>;

    /// `DELETE FROM table WHERE id = ?`
    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64>;

    /// Id of the first row (lowest id) where `column = value`.
    async fn find_id_by(&self, table: &str, column: &str, value: &SqlValue)
        -> Result<Option<i64>>;

    /// Resolve a reply with its thread and author for quoting.
    async fn find_quoted_reply(&self, reply_id: i64) -> Result<Option<QuotedReply>>;

    /// Get the row count for a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Get the database type identifier (e.g., "mysql").
    fn db_type(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_options_cursor() {
        let mut opts = ScanOptions::containing("replies", "body", "#p:")
            .with_order(ScanOrder::Descending)
            .with_batch_size(2);
        assert!(opts.is_past_cursor(10));

        let batch = Batch::from_rows(
            vec![Row::new().with("id", 9), Row::new().with("id", 7)],
            2,
        );
        opts.advance(&batch);
        assert_eq!(opts.cursor, Some(7));
        assert!(opts.is_past_cursor(6));
        assert!(!opts.is_past_cursor(7));
        assert!(!opts.is_past_cursor(9));
    }

    #[test]
    fn test_read_options_from_table() {
        let table = Table::new(
            "posts",
            vec![Column::new("id", "int"), Column::new("body", "text")],
        );
        let opts = ReadOptions::new(&table, DEFAULT_BATCH_SIZE);
        assert_eq!(opts.column_names(), vec!["id", "body"]);
        assert_eq!(opts.batch_size, 500);
        assert!(opts.after_id.is_none());
    }
}
