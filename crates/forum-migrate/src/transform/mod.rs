//! Per-table column rules applied to every copied row.
//!
//! The rule table is keyed by destination table. Rules are pure: a row is
//! transformed the same way whatever batch it arrives in, and a rule whose
//! column is absent from the row does nothing.

use crate::core::Row;

/// A single column operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    /// Remove the column.
    Drop(&'static str),
    /// Rename the column, keeping its value.
    Rename {
        from: &'static str,
        to: &'static str,
    },
}

impl FieldRule {
    /// Apply this rule to a row in place.
    pub fn apply(&self, row: &mut Row) {
        match *self {
            FieldRule::Drop(column) => {
                row.remove(column);
            }
            FieldRule::Rename { from, to } => row.rename(from, to),
        }
    }
}

const USERS_RULES: &[FieldRule] = &[FieldRule::Drop("api_token")];
const BOARDS_RULES: &[FieldRule] = &[FieldRule::Drop("order")];
const THREADS_RULES: &[FieldRule] = &[FieldRule::Rename {
    from: "category_id",
    to: "board_id",
}];
const REPLIES_RULES: &[FieldRule] = &[FieldRule::Rename {
    from: "discussion_id",
    to: "thread_id",
}];

/// Rules for a destination table. Unlisted tables are copied unchanged.
pub fn rules_for(dest_table: &str) -> &'static [FieldRule] {
    match dest_table {
        "users" => USERS_RULES,
        "boards" => BOARDS_RULES,
        "threads" => THREADS_RULES,
        "replies" => REPLIES_RULES,
        _ => &[],
    }
}

/// Transform a single row for insertion into `dest_table`.
#[must_use]
pub fn transform_row(mut row: Row, dest_table: &str) -> Row {
    for rule in rules_for(dest_table) {
        rule.apply(&mut row);
    }
    row
}

/// Transform every row of a batch for insertion into `dest_table`.
#[must_use]
pub fn transform_rows(rows: Vec<Row>, dest_table: &str) -> Vec<Row> {
    if rules_for(dest_table).is_empty() {
        return rows;
    }
    rows.into_iter()
        .map(|row| transform_row(row, dest_table))
        .collect()
}
