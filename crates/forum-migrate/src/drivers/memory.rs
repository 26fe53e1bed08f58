//! In-memory store implementing both store traits.
//!
//! Tables are held behind a shared mutex, so a cloned handle sees the same
//! data. Inserts follow primary key semantics (a duplicate `id` rejects the
//! whole batch) and unknown columns are refused, which is enough to run the
//! full migration against it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::{
    Batch, Column, QuotedReply, ReadOptions, Row, ScanOptions, ScanOrder, SourceReader, SqlValue,
    Table, TargetWriter, ID_COLUMN,
};
use crate::error::{MigrateError, Result};

#[derive(Debug, Default)]
struct MemTable {
    columns: Vec<Column>,
    rows: Vec<Row>,
}

impl MemTable {
    fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    fn unknown_column<'a>(&self, row: &'a Row) -> Option<&'a str> {
        row.columns().find(|c| !self.has_column(c))
    }

    fn find(&self, id: i64) -> Option<&Row> {
        self.rows.iter().find(|r| r.id() == Some(id))
    }
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemTable>,
    offline: bool,
}

/// Shared in-memory database.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Create (or replace) a table.
    ///
    /// `id` and `*_id` columns are typed `bigint`, everything else `text`.
    pub fn create_table(&self, name: &str, columns: &[&str]) {
        let columns = columns
            .iter()
            .map(|c| {
                let data_type = if *c == ID_COLUMN || c.ends_with("_id") {
                    "bigint"
                } else {
                    "text"
                };
                Column::new(*c, data_type)
            })
            .collect();
        self.lock().tables.insert(
            name.to_string(),
            MemTable {
                columns,
                rows: Vec::new(),
            },
        );
    }

    /// Append rows without any checks.
    pub fn seed(&self, table: &str, rows: impl IntoIterator<Item = Row>) {
        let mut state = self.lock();
        let entry = state.tables.entry(table.to_string()).or_default();
        entry.rows.extend(rows);
    }

    /// Make every probe fail, as an unreachable server would.
    pub fn set_offline(&self, offline: bool) {
        self.lock().offline = offline;
    }

    /// Ids of a table, ascending.
    pub fn ids(&self, table: &str) -> Vec<i64> {
        let state = self.lock();
        let mut ids: Vec<i64> = state
            .tables
            .get(table)
            .map(|t| t.rows.iter().filter_map(Row::id).collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    /// Copy of the row with the given id.
    pub fn row(&self, table: &str, id: i64) -> Option<Row> {
        self.lock()
            .tables
            .get(table)
            .and_then(|t| t.find(id))
            .cloned()
    }

    /// Copy of every row of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    fn probe_table(&self, table: &str) -> Result<()> {
        let state = self.lock();
        if state.offline {
            return Err(MigrateError::read(table, "connection refused"));
        }
        if !state.tables.contains_key(table) {
            return Err(MigrateError::read(table, "table doesn't exist"));
        }
        Ok(())
    }

    fn count(&self, table: &str) -> Result<i64> {
        let state = self.lock();
        let t = existing(&state, table)?;
        Ok(t.rows.len() as i64)
    }
}

fn existing<'a>(state: &'a State, table: &str) -> Result<&'a MemTable> {
    state
        .tables
        .get(table)
        .ok_or_else(|| MigrateError::read(table, "table doesn't exist"))
}

/// Compare two cells the way MySQL compares an integer column to a value.
fn loosely_eq(a: &SqlValue, b: &SqlValue) -> bool {
    if a.is_null() || b.is_null() {
        return false;
    }
    match (a.as_i64(), b.as_i64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn project(row: &Row, columns: &[String]) -> Row {
    let mut out = Row::new();
    if !columns.iter().any(|c| c == ID_COLUMN) {
        if let Some(id) = row.get(ID_COLUMN) {
            out.set(ID_COLUMN, id.clone());
        }
    }
    for column in columns {
        out.set(
            column.clone(),
            row.get(column).cloned().unwrap_or(SqlValue::Null),
        );
    }
    out
}

fn apply_changes(
    table: &str,
    t: &mut MemTable,
    changes: &Row,
    mut matches: impl FnMut(&Row) -> bool,
) -> Result<u64> {
    if let Some(column) = t.unknown_column(changes) {
        return Err(MigrateError::update(
            table,
            format!("Unknown column '{}'", column),
        ));
    }
    let mut affected = 0;
    for row in t.rows.iter_mut().filter(|r| matches(r)) {
        for (column, value) in changes.iter() {
            row.set(column, value.clone());
        }
        affected += 1;
    }
    Ok(affected)
}

#[async_trait]
impl SourceReader for MemoryStore {
    async fn probe(&self, table: &str) -> Result<()> {
        self.probe_table(table)
    }

    async fn describe_table(&self, table: &str) -> Result<Table> {
        let state = self.lock();
        let t = existing(&state, table)?;
        Ok(Table::new(table, t.columns.clone()))
    }

    async fn read_batch(&self, opts: &ReadOptions) -> Result<Batch> {
        let state = self.lock();
        let t = existing(&state, &opts.table)?;

        let mut rows: Vec<&Row> = t
            .rows
            .iter()
            .filter(|r| match (opts.after_id, r.id()) {
                (Some(after), Some(id)) => id > after,
                (None, Some(_)) => true,
                (_, None) => false,
            })
            .collect();
        rows.sort_by_key(|r| r.id());
        rows.truncate(opts.batch_size);

        let columns = opts.column_names();
        let rows = rows.into_iter().map(|r| project(r, &columns)).collect();
        Ok(Batch::from_rows(rows, opts.batch_size))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.count(table)
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

#[async_trait]
impl TargetWriter for MemoryStore {
    async fn probe(&self, table: &str) -> Result<()> {
        self.probe_table(table)
    }

    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<u64> {
        if rows.is_empty() {
            return Ok(0);
        }
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::insert(table, "table doesn't exist"))?;

        let mut seen = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(column) = t.unknown_column(row) {
                return Err(MigrateError::insert(
                    table,
                    format!("Unknown column '{}' in 'field list'", column),
                ));
            }
            if let Some(id) = row.id() {
                if seen.contains(&id) || t.find(id).is_some() {
                    return Err(MigrateError::insert(
                        table,
                        format!("Duplicate entry '{}' for key 'PRIMARY'", id),
                    ));
                }
                seen.push(id);
            }
        }

        t.rows.extend(rows.iter().cloned());
        Ok(rows.len() as u64)
    }

    async fn scan_batch(&self, opts: &ScanOptions) -> Result<Batch> {
        let state = self.lock();
        let t = existing(&state, &opts.table)?;

        let mut rows: Vec<&Row> = t
            .rows
            .iter()
            .filter(|r| r.id().is_some_and(|id| opts.is_past_cursor(id)))
            .filter(|r| match &opts.contains {
                Some((column, needle)) => r.text(column).is_some_and(|v| v.contains(needle)),
                None => true,
            })
            .collect();
        match opts.order {
            ScanOrder::Ascending => rows.sort_by_key(|r| r.id()),
            ScanOrder::Descending => rows.sort_by_key(|r| std::cmp::Reverse(r.id())),
        }
        rows.truncate(opts.batch_size);

        let rows = rows.into_iter().map(|r| project(r, &opts.columns)).collect();
        Ok(Batch::from_rows(rows, opts.batch_size))
    }

    async fn update_by_id(&self, table: &str, id: i64, changes: &Row) -> Result<u64> {
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::update(table, "table doesn't exist"))?;
        apply_changes(table, t, changes, |r| r.id() == Some(id))
    }

    async fn update_where_eq(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
        changes: &Row,
    ) -> Result<u64> {
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::update(table, "table doesn't exist"))?;
        apply_changes(table, t, changes, |r| {
            r.get(column).is_some_and(|v| loosely_eq(v, value))
        })
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64> {
        let mut state = self.lock();
        let t = state
            .tables
            .get_mut(table)
            .ok_or_else(|| MigrateError::update(table, "table doesn't exist"))?;
        let before = t.rows.len();
        t.rows.retain(|r| r.id() != Some(id));
        Ok((before - t.rows.len()) as u64)
    }

    async fn find_id_by(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<Option<i64>> {
        let state = self.lock();
        let t = existing(&state, table)?;
        Ok(t.rows
            .iter()
            .filter(|r| r.get(column).is_some_and(|v| loosely_eq(v, value)))
            .filter_map(Row::id)
            .min())
    }

    async fn find_quoted_reply(&self, reply_id: i64) -> Result<Option<QuotedReply>> {
        let state = self.lock();
        let replies = existing(&state, "replies")?;
        let threads = existing(&state, "threads")?;
        let users = existing(&state, "users")?;

        let Some(reply) = replies.find(reply_id) else {
            return Ok(None);
        };
        let thread = reply
            .get("thread_id")
            .and_then(SqlValue::as_i64)
            .and_then(|id| threads.find(id));
        let author = reply
            .get("user_id")
            .and_then(SqlValue::as_i64)
            .and_then(|id| users.find(id));

        // inner joins: a dangling thread or author drops the row
        let (Some(thread), Some(author)) = (thread, author) else {
            return Ok(None);
        };

        Ok(Some(QuotedReply {
            id: reply_id,
            body: reply.text("body").unwrap_or_default().to_string(),
            author: author.text("name").unwrap_or_default().to_string(),
            private: thread.get("private").is_some_and(SqlValue::is_truthy),
        }))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        self.count(table)
    }

    fn db_type(&self) -> &str {
        "memory"
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forum() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("users", &["id", "name"]);
        store.create_table("threads", &["id", "board_id", "private"]);
        store.create_table("replies", &["id", "thread_id", "user_id", "body"]);
        store.seed("users", [Row::new().with("id", 1).with("name", "alice")]);
        store.seed(
            "threads",
            [
                Row::new().with("id", 1).with("private", false),
                Row::new().with("id", 2).with("private", 1),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_insert_rejects_whole_batch_on_duplicate() {
        let store = forum();
        let rows = vec![
            Row::new().with("id", 2).with("name", "bob"),
            Row::new().with("id", 1).with("name", "again"),
        ];
        let err = store.insert_batch("users", &rows).await.unwrap_err();
        assert!(matches!(err, MigrateError::Insert { .. }));
        assert_eq!(store.ids("users"), vec![1]);
    }

    #[tokio::test]
    async fn test_insert_rejects_unknown_column() {
        let store = forum();
        let rows = vec![Row::new().with("id", 2).with("api_token", "x")];
        let err = store.insert_batch("users", &rows).await.unwrap_err();
        assert!(err.to_string().contains("api_token"));
    }

    #[tokio::test]
    async fn test_scan_descending_with_filter() {
        let store = forum();
        store.seed(
            "replies",
            (1..=5).map(|id| {
                let body = if id % 2 == 1 { "see #p:1" } else { "plain" };
                Row::new().with("id", id).with("body", body)
            }),
        );

        let mut opts = ScanOptions::containing("replies", "body", "#p:")
            .with_order(ScanOrder::Descending)
            .with_batch_size(2);
        let first = store.scan_batch(&opts).await.unwrap();
        let ids: Vec<_> = first.rows.iter().filter_map(Row::id).collect();
        assert_eq!(ids, vec![5, 3]);
        assert!(!first.is_last);

        opts.advance(&first);
        let second = store.scan_batch(&opts).await.unwrap();
        assert_eq!(second.rows.len(), 1);
        assert_eq!(second.last_key, Some(1));
        assert!(second.is_last);
    }

    #[tokio::test]
    async fn test_find_id_by_returns_lowest() {
        let store = MemoryStore::new();
        store.create_table("boards", &["id", "slug"]);
        store.seed(
            "boards",
            [
                Row::new().with("id", 9).with("slug", "random"),
                Row::new().with("id", 4).with("slug", "random"),
            ],
        );
        let id = store
            .find_id_by("boards", "slug", &"random".into())
            .await
            .unwrap();
        assert_eq!(id, Some(4));
        let none = store
            .find_id_by("boards", "slug", &"nope".into())
            .await
            .unwrap();
        assert_eq!(none, None);
    }

    #[tokio::test]
    async fn test_update_where_eq_matches_numeric_text() {
        let store = forum();
        store.seed("threads", [Row::new().with("id", 3).with("board_id", "7")]);
        let n = store
            .update_where_eq(
                "threads",
                "board_id",
                &SqlValue::I64(7),
                &Row::new().with("board_id", 1),
            )
            .await
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.row("threads", 3).unwrap().get("board_id"),
            Some(&SqlValue::I64(1))
        );
    }

    #[tokio::test]
    async fn test_find_quoted_reply_joins() {
        let store = forum();
        store.seed(
            "replies",
            [
                Row::new()
                    .with("id", 10)
                    .with("thread_id", 1)
                    .with("user_id", 1)
                    .with("body", "hello"),
                Row::new()
                    .with("id", 11)
                    .with("thread_id", 2)
                    .with("user_id", 1)
                    .with("body", "secret"),
                Row::new()
                    .with("id", 12)
                    .with("thread_id", 1)
                    .with("user_id", 99)
                    .with("body", "orphan"),
            ],
        );

        let quoted = store.find_quoted_reply(10).await.unwrap().unwrap();
        assert_eq!(quoted.author, "alice");
        assert_eq!(quoted.body, "hello");
        assert!(!quoted.private);

        assert!(store.find_quoted_reply(11).await.unwrap().unwrap().private);
        assert!(store.find_quoted_reply(12).await.unwrap().is_none());
        assert!(store.find_quoted_reply(404).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_offline_probe_fails() {
        let store = forum();
        assert!(SourceReader::probe(&store, "users").await.is_ok());
        store.set_offline(true);
        assert!(SourceReader::probe(&store, "users").await.is_err());
    }
}
