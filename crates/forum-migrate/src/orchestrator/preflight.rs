//! Pre-flight checks run before any data moves.

use tracing::debug;

use crate::config::AppPaths;
use crate::error::{MigrateError, Result};

/// Both application checkouts must contain their marker file.
pub fn check_app_paths(paths: &AppPaths) -> Result<()> {
    for (var, marker) in paths.markers() {
        if !marker.exists() {
            return Err(MigrateError::FilePrecondition { path: marker });
        }
        debug!("{}: found {}", var, marker.display());
    }
    Ok(())
}
