//! MySQL/MariaDB destination writer implementation.
//!
//! Implements the `TargetWriter` trait for the next database.
//! Uses mysql_async for connection pooling, prepared statements, and batched
//! multi-row INSERT.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use mysql_async::prelude::*;
use mysql_async::{Conn, Opts, OptsBuilder, Pool, PoolConstraints, PoolOpts, Value};
use tracing::{debug, info};

use super::{escape_like, quote_ident};
use crate::config::StoreConfig;
use crate::core::{
    Batch, QuotedReply, Row, ScanOptions, ScanOrder, SqlValue, TargetWriter, ID_COLUMN,
};
use crate::error::{MigrateError, Result};

/// MySQL max placeholders per prepared statement.
const MYSQL_MAX_PLACEHOLDERS: usize = 65535;

/// MySQL destination writer using mysql_async.
pub struct MysqlWriter {
    pool: Pool,
}

impl MysqlWriter {
    /// Create a new MySQL writer from configuration.
    pub async fn new(config: &StoreConfig, max_conns: usize) -> Result<Self> {
        let pool = Pool::new(Self::opts(config, max_conns)?);

        // Open the first connection now so a bad host fails here
        let conn = pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::connectivity(config.role.label(), e))?;
        drop(conn);

        info!("Connected to MySQL destination: {}", config.describe());

        Ok(Self { pool })
    }

    /// Connection options for the destination pool.
    fn opts(config: &StoreConfig, max_conns: usize) -> Result<Opts> {
        let constraints = PoolConstraints::new(1, max_conns.max(1)).ok_or_else(|| {
            MigrateError::Config(format!("invalid pool size {}", max_conns))
        })?;

        let builder = OptsBuilder::default()
            .ip_or_hostname(&config.host)
            .tcp_port(config.port)
            .db_name(Some(&config.database))
            .user(Some(&config.user))
            .pass(Some(&config.password))
            // affected rows count matched rows, not only changed ones
            .client_found_rows(true)
            // utf8mb4 for full Unicode bodies
            .init(vec!["SET NAMES utf8mb4"])
            .pool_opts(PoolOpts::new().with_constraints(constraints));

        Ok(builder.into())
    }

    async fn conn(&self) -> Result<Conn> {
        self.pool
            .get_conn()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MySQL connection"))
    }

    /// `a = ?, b = ?` plus the values to bind.
    fn set_clause(changes: &Row) -> (String, Vec<Value>) {
        let assignments = changes
            .columns()
            .map(|c| format!("{} = ?", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let params = changes.iter().map(|(_, v)| sql_value_to_mysql(v)).collect();
        (assignments, params)
    }

    /// Build the keyset scan statement for the given options.
    fn scan_query(opts: &ScanOptions) -> (String, Vec<Value>) {
        let id = quote_ident(ID_COLUMN);
        let mut select = vec![id.clone()];
        select.extend(
            opts.columns
                .iter()
                .filter(|c| c.as_str() != ID_COLUMN)
                .map(|c| quote_ident(c)),
        );

        let mut conditions = Vec::new();
        let mut params = Vec::new();
        if let Some((column, needle)) = &opts.contains {
            conditions.push(format!("{} LIKE ?", quote_ident(column)));
            params.push(Value::from(format!("%{}%", escape_like(needle))));
        }
        let (cmp, dir) = match opts.order {
            ScanOrder::Ascending => (">", "ASC"),
            ScanOrder::Descending => ("<", "DESC"),
        };
        if let Some(cursor) = opts.cursor {
            conditions.push(format!("{} {} ?", id, cmp));
            params.push(Value::from(cursor));
        }

        let mut sql = format!("SELECT {} FROM {}", select.join(", "), quote_ident(&opts.table));
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {} {} LIMIT {}", id, dir, opts.batch_size));
        (sql, params)
    }
}

#[async_trait]
impl TargetWriter for MysqlWriter {
    async fn probe(&self, table: &str) -> Result<()> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT 1 FROM {} LIMIT 1", quote_ident(table));
        conn.query_drop(&sql)
            .await
            .map_err(|e| MigrateError::read(table, e))
    }

    async fn insert_batch(&self, table: &str, rows: &[Row]) -> Result<u64> {
        let Some(first) = rows.first() else {
            return Ok(0);
        };
        let cols: Vec<&str> = first.columns().collect();
        let num_cols = cols.len();
        if num_cols == 0 {
            return Ok(0);
        }

        let col_list = cols.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ");
        let placeholders_per_row = format!("({})", vec!["?"; num_cols].join(", "));
        let max_rows_per_stmt = MYSQL_MAX_PLACEHOLDERS / num_cols;

        let mut conn = self.conn().await?;
        for chunk in rows.chunks(max_rows_per_stmt) {
            let all_placeholders: Vec<&str> =
                std::iter::repeat_n(placeholders_per_row.as_str(), chunk.len()).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                quote_ident(table),
                col_list,
                all_placeholders.join(", ")
            );

            let params: Vec<Value> = chunk
                .iter()
                .flat_map(|row| {
                    cols.iter()
                        .map(|c| row.get(c).map(sql_value_to_mysql).unwrap_or(Value::NULL))
                })
                .collect();

            conn.exec_drop(&sql, params)
                .await
                .map_err(|e| MigrateError::insert(table, e))?;
        }

        debug!("MySQL: wrote {} rows to {}", rows.len(), table);
        Ok(rows.len() as u64)
    }

    async fn scan_batch(&self, opts: &ScanOptions) -> Result<Batch> {
        let (sql, params) = Self::scan_query(opts);
        let mut conn = self.conn().await?;
        let rows: Vec<mysql_async::Row> = conn
            .exec(&sql, params)
            .await
            .map_err(|e| MigrateError::read(&opts.table, e))?;

        let rows = rows.iter().map(mysql_row_to_row).collect();
        Ok(Batch::from_rows(rows, opts.batch_size))
    }

    async fn update_by_id(&self, table: &str, id: i64, changes: &Row) -> Result<u64> {
        self.update_where_eq(table, ID_COLUMN, &SqlValue::I64(id), changes)
            .await
    }

    async fn update_where_eq(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
        changes: &Row,
    ) -> Result<u64> {
        if changes.is_empty() {
            return Ok(0);
        }
        let (assignments, mut params) = Self::set_clause(changes);
        params.push(sql_value_to_mysql(value));
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?",
            quote_ident(table),
            assignments,
            quote_ident(column)
        );

        let mut conn = self.conn().await?;
        conn.exec_drop(&sql, params)
            .await
            .map_err(|e| MigrateError::update(table, e))?;
        Ok(conn.affected_rows())
    }

    async fn delete_by_id(&self, table: &str, id: i64) -> Result<u64> {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote_ident(table),
            quote_ident(ID_COLUMN)
        );
        let mut conn = self.conn().await?;
        conn.exec_drop(&sql, (id,))
            .await
            .map_err(|e| MigrateError::update(table, e))?;
        Ok(conn.affected_rows())
    }

    async fn find_id_by(
        &self,
        table: &str,
        column: &str,
        value: &SqlValue,
    ) -> Result<Option<i64>> {
        let id = quote_ident(ID_COLUMN);
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ? ORDER BY {} LIMIT 1",
            id,
            quote_ident(table),
            quote_ident(column),
            id
        );
        let mut conn = self.conn().await?;
        let found: Option<i64> = conn
            .exec_first(&sql, vec![sql_value_to_mysql(value)])
            .await
            .map_err(|e| MigrateError::read(table, e))?;
        Ok(found)
    }

    async fn find_quoted_reply(&self, reply_id: i64) -> Result<Option<QuotedReply>> {
        let sql = r#"
            SELECT r.`body`, u.`name`, t.`private`
            FROM `replies` r
            INNER JOIN `threads` t ON r.`thread_id` = t.`id`
            INNER JOIN `users` u ON r.`user_id` = u.`id`
            WHERE r.`id` = ?
            LIMIT 1
        "#;
        let mut conn = self.conn().await?;
        let row: Option<mysql_async::Row> = conn
            .exec_first(sql, (reply_id,))
            .await
            .map_err(|e| MigrateError::read("replies", e))?;

        Ok(row.map(|row| {
            let cell = |i: usize| {
                row.as_ref(i)
                    .cloned()
                    .map(mysql_to_sql_value)
                    .unwrap_or(SqlValue::Null)
            };
            QuotedReply {
                id: reply_id,
                body: text_or_empty(cell(0)),
                author: text_or_empty(cell(1)),
                private: cell(2).is_truthy(),
            }
        }))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let mut conn = self.conn().await?;
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let count: Option<i64> = conn
            .query_first(&sql)
            .await
            .map_err(|e| MigrateError::read(table, e))?;
        Ok(count.unwrap_or(0))
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.clone().disconnect().await.ok();
    }
}

/// Convert a mysql_async row into a generic row.
fn mysql_row_to_row(row: &mysql_async::Row) -> Row {
    row.columns_ref()
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let value = row
                .as_ref(i)
                .cloned()
                .map(mysql_to_sql_value)
                .unwrap_or(SqlValue::Null);
            (col.name_str().into_owned(), value)
        })
        .collect()
}

/// Convert SqlValue to a mysql_async parameter.
fn sql_value_to_mysql(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::NULL,
        SqlValue::Bool(b) => Value::from(*b),
        SqlValue::I64(i) => Value::from(*i),
        SqlValue::U64(u) => Value::from(*u),
        SqlValue::F32(f) => Value::from(*f),
        SqlValue::F64(f) => Value::from(*f),
        SqlValue::Text(s) => Value::from(s.as_str()),
        SqlValue::Bytes(b) => Value::Bytes(b.clone()),
        SqlValue::Decimal(d) => Value::from(d.to_string()),
        SqlValue::Date(d) => Value::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        SqlValue::Time(t) => Value::Time(
            false,
            0,
            t.hour() as u8,
            t.minute() as u8,
            t.second() as u8,
            t.nanosecond() / 1_000,
        ),
        SqlValue::DateTime(dt) => Value::Date(
            dt.year() as u16,
            dt.month() as u8,
            dt.day() as u8,
            dt.hour() as u8,
            dt.minute() as u8,
            dt.second() as u8,
            dt.nanosecond() / 1_000,
        ),
    }
}

/// Convert a value read through the binary protocol into SqlValue.
///
/// Byte strings that are valid UTF-8 become text. Zero dates and times
/// outside a single day have no chrono equivalent and are kept as text.
fn mysql_to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::NULL => SqlValue::Null,
        Value::Int(i) => SqlValue::I64(i),
        Value::UInt(u) => SqlValue::U64(u),
        Value::Float(f) => SqlValue::F32(f),
        Value::Double(f) => SqlValue::F64(f),
        Value::Bytes(b) => match String::from_utf8(b) {
            Ok(s) => SqlValue::Text(s),
            Err(e) => SqlValue::Bytes(e.into_bytes()),
        },
        Value::Date(y, mo, d, h, mi, s, us) => NaiveDate::from_ymd_opt(y.into(), mo.into(), d.into())
            .and_then(|date| date.and_hms_micro_opt(h.into(), mi.into(), s.into(), us))
            .map(SqlValue::DateTime)
            .unwrap_or_else(|| {
                SqlValue::Text(format!(
                    "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
                    y, mo, d, h, mi, s
                ))
            }),
        Value::Time(neg, days, h, mi, s, us) => {
            let time = (!neg && days == 0)
                .then(|| NaiveTime::from_hms_micro_opt(h.into(), mi.into(), s.into(), us))
                .flatten();
            match time {
                Some(t) => SqlValue::Time(t),
                None => SqlValue::Text(format!(
                    "{}{:02}:{:02}:{:02}",
                    if neg { "-" } else { "" },
                    u32::from(h) + days * 24,
                    mi,
                    s
                )),
            }
        }
    }
}

/// Text of a joined column; NULL reads as empty.
fn text_or_empty(value: SqlValue) -> String {
    match value {
        SqlValue::Null => String::new(),
        SqlValue::Text(s) => s,
        SqlValue::Bytes(b) => String::from_utf8_lossy(&b).into_owned(),
        other => other.to_string(),
    }
}
