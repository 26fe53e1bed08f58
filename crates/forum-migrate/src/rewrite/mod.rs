//! In-place rewrites of reply bodies on the destination store.
//!
//! - [`tags`]: strips paired markup tags the new renderer does not support
//! - [`quotes`]: expands `#p:<id>` references into attributed quote blocks

pub mod quotes;
pub mod tags;

use serde::{Deserialize, Serialize};

pub use quotes::{apply_rewrites, quote_block, PendingRewrites, QuoteFlattener};
pub use tags::{PairedTag, TagStripper};

/// Table whose bodies are rewritten.
pub const REPLIES: &str = "replies";

/// Column holding the rewritten text.
pub const BODY: &str = "body";

/// Counters from one rewrite pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewriteStats {
    /// Rows matched by the scan filter.
    pub rows_scanned: u64,

    /// Rows written back.
    pub rows_rewritten: u64,
}
