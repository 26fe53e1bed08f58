//! Paired tag stripping.

use std::borrow::Cow;

use regex::Regex;
use tracing::{debug, info};

use super::{RewriteStats, BODY, REPLIES};
use crate::core::{Row, ScanOptions, ScanOrder, TargetWriter, DEFAULT_BATCH_SIZE};
use crate::error::{MigrateError, Result};

/// A `[name]...[/name]` tag pair.
#[derive(Debug, Clone)]
pub struct PairedTag {
    name: String,
    pattern: Regex,
}

impl PairedTag {
    /// Build the matcher for a tag name.
    ///
    /// Matching is case-sensitive, non-greedy, and spans newlines.
    pub fn new(name: &str) -> Result<Self> {
        let escaped = regex::escape(name);
        let pattern = Regex::new(&format!(r"(?s)\[{0}\](.*?)\[/{0}\]", escaped))
            .map_err(|e| MigrateError::Config(format!("invalid tag name '{}': {}", name, e)))?;
        Ok(Self {
            name: name.to_string(),
            pattern,
        })
    }

    /// Tag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opening tag, used as the scan filter.
    pub fn opening(&self) -> String {
        format!("[{}]", self.name)
    }

    /// Replace every tag pair with its inner content.
    pub fn strip<'a>(&self, body: &'a str) -> Cow<'a, str> {
        self.pattern.replace_all(body, "${1}")
    }
}

/// Removes one paired tag from every reply body that contains it.
pub struct TagStripper {
    tag: PairedTag,
    batch_size: usize,
}

impl TagStripper {
    /// Create a stripper for `tag`.
    pub fn new(tag: PairedTag) -> Self {
        Self {
            tag,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the scan batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Scan replies in ascending id order and write back each changed body.
    pub async fn run(&self, target: &dyn TargetWriter) -> Result<RewriteStats> {
        let mut stats = RewriteStats::default();
        let mut opts = ScanOptions::containing(REPLIES, BODY, self.tag.opening())
            .with_order(ScanOrder::Ascending)
            .with_batch_size(self.batch_size);

        loop {
            let batch = target.scan_batch(&opts).await?;
            if batch.is_empty() {
                break;
            }

            for row in &batch.rows {
                let (Some(id), Some(body)) = (row.id(), row.text(BODY)) else {
                    continue;
                };
                stats.rows_scanned += 1;

                // unpaired opening tags leave the body as it was
                if let Cow::Owned(stripped) = self.tag.strip(body) {
                    target
                        .update_by_id(REPLIES, id, &Row::new().with(BODY, stripped))
                        .await?;
                    stats.rows_rewritten += 1;
                }
            }

            debug!(
                "[{}] batch done, last id {:?}",
                self.tag.name(),
                batch.last_key
            );
            if batch.is_last {
                break;
            }
            opts.advance(&batch);
        }

        info!(
            "stripped [{}] from {} of {} replies",
            self.tag.name(),
            stats.rows_rewritten,
            stats.rows_scanned
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;

    fn center() -> PairedTag {
        PairedTag::new("center").unwrap()
    }

    #[test]
    fn test_strip_spans_newlines() {
        assert_eq!(
            center().strip("pre[center]mid\nmore[/center]post"),
            "premid\nmorepost"
        );
    }

    #[test]
    fn test_strip_is_non_greedy() {
        assert_eq!(
            center().strip("[center]a[/center] x [center]b[/center]"),
            "a x b"
        );
    }

    #[test]
    fn test_strip_leaves_other_text_borrowed() {
        let tag = center();
        assert!(matches!(tag.strip("no tags here"), Cow::Borrowed(_)));
        assert!(matches!(tag.strip("[center]unclosed"), Cow::Borrowed(_)));
        assert!(matches!(tag.strip("[CENTER]x[/CENTER]"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_tag_name_is_escaped() {
        let tag = PairedTag::new("a.b").unwrap();
        assert_eq!(tag.strip("[a.b]x[/a.b][axb]y[/axb]"), "x[axb]y[/axb]");
        assert_eq!(tag.opening(), "[a.b]");
    }

    #[tokio::test]
    async fn test_stripper_rewrites_matching_rows() {
        let store = MemoryStore::new();
        store.create_table("replies", &["id", "body"]);
        store.seed(
            "replies",
            [
                Row::new().with("id", 1).with("body", "[center]hi[/center]"),
                Row::new().with("id", 2).with("body", "plain"),
                Row::new().with("id", 3).with("body", "[center]dangling"),
                Row::new()
                    .with("id", 4)
                    .with("body", "a[center]b\nc[/center]d"),
            ],
        );

        let stats = TagStripper::new(center())
            .with_batch_size(1)
            .run(&store)
            .await
            .unwrap();

        assert_eq!(stats.rows_scanned, 3);
        assert_eq!(stats.rows_rewritten, 2);
        assert_eq!(store.row("replies", 1).unwrap().text("body"), Some("hi"));
        assert_eq!(store.row("replies", 2).unwrap().text("body"), Some("plain"));
        assert_eq!(
            store.row("replies", 3).unwrap().text("body"),
            Some("[center]dangling")
        );
        assert_eq!(store.row("replies", 4).unwrap().text("body"), Some("ab\ncd"));
    }
}
