//! Table and column metadata read from the source store.

use serde::{Deserialize, Serialize};

use super::value::ID_COLUMN;

/// Table metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name.
    pub name: String,

    /// Column definitions, in ordinal order.
    pub columns: Vec<Column>,
}

impl Table {
    /// Create table metadata from its columns.
    pub fn new(name: impl Into<String>, columns: Vec<Column>) -> Self {
        Self {
            name: name.into(),
            columns,
        }
    }

    /// Column names in ordinal order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Find a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Whether the table can be paginated by its `id` column.
    pub fn supports_keyset_pagination(&self) -> bool {
        self.column(ID_COLUMN).is_some_and(Column::is_integer)
    }
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    /// Column name.
    pub name: String,

    /// Base data type, lower-cased (`int`, `varchar`, `longtext`, ...).
    pub data_type: String,

    /// Full column type (`tinyint(1)`, `int(10) unsigned`, ...).
    pub column_type: String,

    /// Whether the column accepts NULL.
    pub is_nullable: bool,
}

impl Column {
    /// Build a column from its base type; the full type defaults to the same.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        let data_type = data_type.into().to_lowercase();
        Self {
            name: name.into(),
            column_type: data_type.clone(),
            data_type,
            is_nullable: true,
        }
    }

    /// Whether this is an unsigned integer column.
    pub fn is_unsigned(&self) -> bool {
        self.column_type.to_lowercase().contains("unsigned")
    }

    /// Whether this is `tinyint(1)`, Laravel's boolean column.
    pub fn is_boolean(&self) -> bool {
        matches!(self.data_type.as_str(), "bool" | "boolean")
            || self.column_type.to_lowercase().starts_with("tinyint(1)")
    }

    /// Whether this is an integer column of any width.
    pub fn is_integer(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint"
        )
    }
}
