//! MySQL/MariaDB database driver.
//!
//! - [`MysqlReader`]: legacy (source) reader on SQLx
//! - [`MysqlWriter`]: next (destination) writer on mysql_async
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod reader;
mod writer;

pub use reader::MysqlReader;
pub use writer::MysqlWriter;

/// Quote a MySQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// Escape `LIKE` wildcards so the needle matches literally.
pub(crate) fn escape_like(needle: &str) -> String {
    let mut out = String::with_capacity(needle.len());
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
