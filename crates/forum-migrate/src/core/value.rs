//! Row and value types shared by the drivers and the migration stages.
//!
//! Rows are kept generic: an ordered list of `(column, value)` pairs. The
//! per-table rules in [`crate::transform`] work on that shape without knowing
//! anything else about the table.

use std::fmt;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;

/// Name of the integer primary key every migrated table is paginated on.
pub const ID_COLUMN: &str = "id";

/// A single cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    /// SQL NULL.
    Null,

    /// Boolean value (MySQL `tinyint(1)`).
    Bool(bool),

    /// Signed integer of any width.
    I64(i64),

    /// Unsigned integer of any width.
    U64(u64),

    /// 32-bit floating point.
    F32(f32),

    /// 64-bit floating point.
    F64(f64),

    /// Exact decimal.
    Decimal(Decimal),

    /// Character data.
    Text(String),

    /// Binary data.
    Bytes(Vec<u8>),

    /// Date without time component.
    Date(NaiveDate),

    /// Time without date component.
    Time(NaiveTime),

    /// Timestamp without timezone.
    DateTime(NaiveDateTime),
}

impl SqlValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }

    /// Integer view of the value, if it has one.
    ///
    /// Numeric text is accepted so that ids read back as strings still work.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SqlValue::I64(v) => Some(*v),
            SqlValue::U64(v) => i64::try_from(*v).ok(),
            SqlValue::Bool(b) => Some(i64::from(*b)),
            SqlValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Borrow the value as text, if it is text.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            SqlValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Truthiness as MySQL evaluates it: non-zero numbers are true.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            SqlValue::Null => false,
            SqlValue::Bool(b) => *b,
            SqlValue::I64(v) => *v != 0,
            SqlValue::U64(v) => *v != 0,
            SqlValue::F32(v) => *v != 0.0,
            SqlValue::F64(v) => *v != 0.0,
            SqlValue::Decimal(d) => !d.is_zero(),
            SqlValue::Text(s) => s.trim().parse::<f64>().map(|v| v != 0.0).unwrap_or(false),
            SqlValue::Bytes(b) => b.iter().any(|&byte| byte != 0),
            SqlValue::Date(_) | SqlValue::Time(_) | SqlValue::DateTime(_) => true,
        }
    }
}

impl fmt::Display for SqlValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlValue::Null => f.write_str("NULL"),
            SqlValue::Bool(v) => write!(f, "{}", v),
            SqlValue::I64(v) => write!(f, "{}", v),
            SqlValue::U64(v) => write!(f, "{}", v),
            SqlValue::F32(v) => write!(f, "{}", v),
            SqlValue::F64(v) => write!(f, "{}", v),
            SqlValue::Decimal(v) => write!(f, "{}", v),
            SqlValue::Text(v) => f.write_str(v),
            SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            SqlValue::Date(v) => write!(f, "{}", v),
            SqlValue::Time(v) => write!(f, "{}", v),
            SqlValue::DateTime(v) => write!(f, "{}", v),
        }
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(i64::from(v))
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::Text(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::Text(v.to_string())
    }
}

impl From<Vec<u8>> for SqlValue {
    fn from(v: Vec<u8>) -> Self {
        SqlValue::Bytes(v)
    }
}

impl From<Decimal> for SqlValue {
    fn from(v: Decimal) -> Self {
        SqlValue::Decimal(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<NaiveTime> for SqlValue {
    fn from(v: NaiveTime) -> Self {
        SqlValue::Time(v)
    }
}

impl From<NaiveDateTime> for SqlValue {
    fn from(v: NaiveDateTime) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

/// An ordered mapping of column name to value.
///
/// Column order is preserved from the source query so inserts keep the
/// source layout. Lookups are linear; rows are a few dozen columns at most.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(String, SqlValue)>,
}

impl Row {
    /// Create an empty row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`Row::set`].
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Value of a column, if present.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Whether the row has the column.
    pub fn contains(&self, column: &str) -> bool {
        self.fields.iter().any(|(name, _)| name == column)
    }

    /// Set a column, replacing an existing value in place or appending.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Remove a column. Missing columns are ignored.
    pub fn remove(&mut self, column: &str) -> Option<SqlValue> {
        let pos = self.fields.iter().position(|(name, _)| name == column)?;
        Some(self.fields.remove(pos).1)
    }

    /// Rename a column in place, keeping its position.
    ///
    /// A missing `from` column leaves the row untouched. If `to` already
    /// exists it is replaced by the renamed value.
    pub fn rename(&mut self, from: &str, to: &str) {
        if from == to || !self.contains(from) {
            return;
        }
        self.remove(to);
        if let Some((name, _)) = self.fields.iter_mut().find(|(name, _)| name == from) {
            *name = to.to_string();
        }
    }

    /// The integer `id` of the row.
    pub fn id(&self) -> Option<i64> {
        self.get(ID_COLUMN).and_then(SqlValue::as_i64)
    }

    /// Text value of a column.
    pub fn text(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }

    /// Column names in order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// `(column, value)` pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl<K: Into<String>, V: Into<SqlValue>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

/// A batch of rows read in one round trip.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    /// Rows in this batch, in key order.
    pub rows: Vec<Row>,

    /// Last `id` value for keyset pagination continuity.
    pub last_key: Option<i64>,

    /// Whether this is the final batch for the table.
    pub is_last: bool,
}

impl Batch {
    /// Build a batch from rows read with a `LIMIT` of `batch_size`.
    ///
    /// A short read marks the batch as final.
    pub fn from_rows(rows: Vec<Row>, batch_size: usize) -> Self {
        let last_key = rows.last().and_then(Row::id);
        let is_last = rows.len() < batch_size;
        Self {
            rows,
            last_key,
            is_last,
        }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
