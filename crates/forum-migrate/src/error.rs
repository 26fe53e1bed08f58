//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for migration operations.
///
/// Every variant is fatal: the orchestrator stops at the first error and
/// surfaces it with the stage it happened in.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Missing or invalid setting (environment variable, driver name, port).
    #[error("Configuration error: {0}")]
    Config(String),

    /// A configured store could not be read from.
    #[error("Cannot reach {store} database: {message}")]
    Connectivity { store: String, message: String },

    /// An application marker file expected by the pre-flight check is absent.
    #[error("Expected file not found: {}", path.display())]
    FilePrecondition { path: PathBuf },

    /// A batch insert into the destination failed.
    #[error("Insert into {table} failed: {message}")]
    Insert { table: String, message: String },

    /// An update or delete against the destination failed.
    #[error("Update of {table} failed: {message}")]
    Update { table: String, message: String },

    /// A required single-row lookup returned nothing.
    #[error("No row in {table} where {column} = '{value}'")]
    Lookup {
        table: String,
        column: String,
        value: String,
    },

    /// Reading a batch from either store failed.
    #[error("Read from {table} failed: {message}")]
    Read { table: String, message: String },

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Table has no `id` column to paginate on.
    #[error("Table {0} has no id column - keyset pagination requires one")]
    NoPrimaryKey(String),

    /// An error raised while running a named migration stage.
    #[error("{stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<MigrateError>,
    },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Connectivity error for the given store role.
    pub fn connectivity(store: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Connectivity {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Create an Insert error
    pub fn insert(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Insert {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create an Update error
    pub fn update(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Update {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Read error
    pub fn read(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Read {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Create a Lookup error
    pub fn lookup(
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        MigrateError::Lookup {
            table: table.into(),
            column: column.into(),
            value: value.into(),
        }
    }

    /// Wrap this error with the label of the stage that raised it.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        MigrateError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping stage wrappers.
    pub fn root(&self) -> &MigrateError {
        match self {
            MigrateError::Stage { source, .. } => source.root(),
            other => other,
        }
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self.root() {
            MigrateError::Config(_) => 2,
            MigrateError::Connectivity { .. } | MigrateError::Pool { .. } => 3,
            MigrateError::FilePrecondition { .. } => 4,
            MigrateError::Insert { .. } | MigrateError::Update { .. } => 5,
            MigrateError::Lookup { .. } => 6,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(MigrateError::Config("x".into()).exit_code(), 2);
        assert_eq!(MigrateError::connectivity("source", "refused").exit_code(), 3);
        assert_eq!(
            MigrateError::FilePrecondition {
                path: PathBuf::from("/srv/legacy/artisan")
            }
            .exit_code(),
            4
        );
        assert_eq!(MigrateError::insert("users", "dup").exit_code(), 5);
        assert_eq!(MigrateError::update("replies", "lock").exit_code(), 5);
        assert_eq!(MigrateError::lookup("boards", "slug", "olinux").exit_code(), 6);
        assert_eq!(MigrateError::NoPrimaryKey("pivot".into()).exit_code(), 1);
    }

    #[test]
    fn test_stage_wrapping_keeps_root_exit_code() {
        let err = MigrateError::lookup("boards", "slug", "random")
            .in_stage("Converting categories to boards");
        assert_eq!(err.exit_code(), 6);
        assert!(matches!(err.root(), MigrateError::Lookup { .. }));

        let msg = err.to_string();
        assert!(msg.starts_with("Converting categories to boards failed"));
        assert!(msg.contains("slug = 'random'"));
    }

    #[test]
    fn test_format_detailed_includes_cause() {
        let err = MigrateError::insert("replies", "Duplicate entry '1'").in_stage("Copying data");
        let detailed = err.format_detailed();
        assert!(detailed.starts_with("Error: Copying data failed"));
        assert!(detailed.contains("Caused by:\n  1: Insert into replies failed"));
    }
}
