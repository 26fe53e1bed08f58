//! Store drivers.
//!
//! - [`mysql`]: MySQL/MariaDB reader (SQLx) and writer (mysql_async)
//! - [`memory`]: in-memory store implementing both traits
//!
//! Both implement [`SourceReader`](crate::core::SourceReader) and
//! [`TargetWriter`](crate::core::TargetWriter); the stages never see which
//! one they run against.

pub mod memory;
pub mod mysql;

pub use memory::MemoryStore;
pub use mysql::{MysqlReader, MysqlWriter};
