//! MySQL/MariaDB source reader implementation.
//!
//! Implements the `SourceReader` trait for the legacy database.
//! Uses SQLx for connection pooling and async query execution.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row as _, ValueRef};
use tracing::{debug, info};

use super::quote_ident;
use crate::config::StoreConfig;
use crate::core::{Batch, Column, ReadOptions, Row, SourceReader, SqlValue, Table, ID_COLUMN};
use crate::error::{MigrateError, Result};

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// MySQL/MariaDB source reader implementation.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Create a new MySQL reader from configuration.
    pub async fn new(config: &StoreConfig, max_conns: u32) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::connectivity(config.role.label(), e))?;

        info!("Connected to MySQL source: {}", config.describe());

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Load columns for a table.
    async fn load_columns(&self, table: &str) -> Result<Vec<Column>> {
        // CAST to CHAR: information_schema may hand back VARBINARY depending on collation
        let query = r#"
            SELECT
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                CAST(COLUMN_TYPE AS CHAR(255)) AS COLUMN_TYPE,
                IF(IS_NULLABLE = 'YES', 1, 0) AS is_nullable
            FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::pool(e, "loading MySQL columns"))?;

        let columns = rows
            .iter()
            .map(|row| Column {
                name: row.get::<String, _>("COLUMN_NAME"),
                data_type: row.get::<String, _>("DATA_TYPE").to_lowercase(),
                column_type: row.get::<String, _>("COLUMN_TYPE").to_lowercase(),
                is_nullable: row.get::<i32, _>("is_nullable") == 1,
            })
            .collect();
        Ok(columns)
    }

    /// Convert a MySQL row into a generic row.
    fn to_row(table: &str, row: &MySqlRow, columns: &[Column]) -> Result<Row> {
        let mut out = Row::new();
        for (i, col) in columns.iter().enumerate() {
            let value = Self::decode(row, i, col)
                .map_err(|e| MigrateError::read(table, format!("column {}: {}", col.name, e)))?;
            out.set(col.name.clone(), value);
        }
        Ok(out)
    }

    /// Decode one cell based on the column's declared type.
    fn decode(row: &MySqlRow, i: usize, col: &Column) -> std::result::Result<SqlValue, sqlx::Error> {
        let is_null = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
        if is_null {
            return Ok(SqlValue::Null);
        }

        if col.is_boolean() {
            return row.try_get::<bool, _>(i).map(SqlValue::Bool);
        }

        let value = match col.data_type.as_str() {
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => {
                if col.is_unsigned() {
                    SqlValue::U64(row.try_get::<u64, _>(i)?)
                } else {
                    SqlValue::I64(row.try_get::<i64, _>(i)?)
                }
            }
            "bit" => SqlValue::Bool(row.try_get::<bool, _>(i)?),
            "float" => SqlValue::F32(row.try_get::<f32, _>(i)?),
            "double" | "real" => SqlValue::F64(row.try_get::<f64, _>(i)?),
            "decimal" | "numeric" => SqlValue::Decimal(row.try_get::<rust_decimal::Decimal, _>(i)?),
            "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => {
                SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?)
            }
            "date" | "time" | "datetime" | "timestamp" => {
                let decoded = match col.data_type.as_str() {
                    "date" => row.try_get::<NaiveDate, _>(i).map(SqlValue::Date),
                    "time" => row.try_get::<NaiveTime, _>(i).map(SqlValue::Time),
                    _ => row.try_get::<NaiveDateTime, _>(i).map(SqlValue::DateTime),
                };
                match decoded {
                    Ok(value) => value,
                    // zero dates and out-of-range times have no chrono form
                    Err(e) => {
                        let raw = row.try_get_unchecked::<Vec<u8>, _>(i)?;
                        temporal_as_text(&col.data_type, &raw).ok_or(e)?
                    }
                }
            }
            // char, varchar, text variants, enum, set, json, and anything unknown
            _ => match row.try_get::<String, _>(i) {
                Ok(s) => SqlValue::Text(s),
                Err(_) => SqlValue::Bytes(row.try_get::<Vec<u8>, _>(i)?),
            },
        };
        Ok(value)
    }
}

/// Render a temporal cell chrono cannot represent as MySQL would print it.
///
/// `raw` is either a text-protocol value or a binary-protocol payload with
/// its leading length byte. A zero-length payload is the zero value.
fn temporal_as_text(data_type: &str, raw: &[u8]) -> Option<SqlValue> {
    if let Ok(text) = std::str::from_utf8(raw) {
        if !text.is_empty() && text.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
            return Some(SqlValue::Text(text.to_string()));
        }
    }

    let (&len, rest) = raw.split_first()?;
    let p = rest.get(..usize::from(len))?;
    let byte = |i: usize| p.get(i).copied().unwrap_or(0);

    let text = if data_type == "time" {
        let negative = byte(0) == 1;
        let days = u32::from_le_bytes([byte(1), byte(2), byte(3), byte(4)]);
        format!(
            "{}{:02}:{:02}:{:02}",
            if negative { "-" } else { "" },
            days * 24 + u32::from(byte(5)),
            byte(6),
            byte(7)
        )
    } else {
        let date = format!(
            "{:04}-{:02}-{:02}",
            u16::from_le_bytes([byte(0), byte(1)]),
            byte(2),
            byte(3)
        );
        if data_type == "date" {
            date
        } else {
            format!("{} {:02}:{:02}:{:02}", date, byte(4), byte(5), byte(6))
        }
    };
    Some(SqlValue::Text(text))
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn probe(&self, table: &str) -> Result<()> {
        let query = format!("SELECT 1 FROM {} LIMIT 1", quote_ident(table));
        sqlx::query(&query)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MigrateError::read(table, e))?;
        Ok(())
    }

    async fn describe_table(&self, table: &str) -> Result<Table> {
        let columns = self.load_columns(table).await?;
        if columns.is_empty() {
            return Err(MigrateError::read(
                table,
                format!("table not found in schema '{}'", self.database),
            ));
        }
        debug!("{}: {} columns", table, columns.len());
        Ok(Table::new(table, columns))
    }

    async fn read_batch(&self, opts: &ReadOptions) -> Result<Batch> {
        let col_list = opts
            .columns
            .iter()
            .map(|c| quote_ident(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        let id = quote_ident(ID_COLUMN);

        let mut query = format!("SELECT {} FROM {}", col_list, quote_ident(&opts.table));
        if let Some(after) = opts.after_id {
            query.push_str(&format!(" WHERE {} > {}", id, after));
        }
        query.push_str(&format!(" ORDER BY {} LIMIT {}", id, opts.batch_size));

        let rows: Vec<MySqlRow> = sqlx::query(&query)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::read(&opts.table, e))?;

        let rows = rows
            .iter()
            .map(|row| Self::to_row(&opts.table, row, &opts.columns))
            .collect::<Result<Vec<_>>>()?;

        Ok(Batch::from_rows(rows, opts.batch_size))
    }

    async fn row_count(&self, table: &str) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        let row: MySqlRow = sqlx::query(&query)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MigrateError::read(table, e))?;
        Ok(row.get::<i64, _>(0))
    }

    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
