//! Quote flattening.
//!
//! A reply may reference another one with a `#p:<id>` token. Each token whose
//! target exists and sits in a public thread is replaced by the target's body
//! as a `> ` quote block followed by an attribution line.
//!
//! The pass has two phases. [`QuoteFlattener::scan`] only reads and returns
//! the new bodies; [`apply_rewrites`] writes them. Every quote therefore
//! embeds the target body as it was before the pass, including when two
//! replies reference each other.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, info};

use super::{BODY, REPLIES};
use crate::core::{QuotedReply, Row, ScanOptions, ScanOrder, TargetWriter, DEFAULT_BATCH_SIZE};
use crate::error::Result;

/// Literal marker every reference starts with; also the scan filter.
pub const QUOTE_MARKER: &str = "#p:";

static QUOTE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#p:[A-Za-z0-9_-]*").expect("quote token pattern"));

/// Render a reply as a quote block with attribution.
pub fn quote_block(reply: &QuotedReply) -> String {
    let quoted: Vec<String> = reply.body.split('\n').map(|l| format!("> {}", l)).collect();
    format!(
        "{}\n>\n> – <cite>@{}</cite>\n",
        quoted.join("\n"),
        reply.author
    )
}

/// New bodies computed by a scan, in scan order (descending id).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingRewrites {
    rewrites: Vec<(i64, String)>,
    scanned: u64,
}

impl PendingRewrites {
    /// Replies examined by the scan.
    pub fn scanned(&self) -> u64 {
        self.scanned
    }

    /// Number of rows to rewrite.
    pub fn len(&self) -> usize {
        self.rewrites.len()
    }

    /// Whether nothing needs rewriting.
    pub fn is_empty(&self) -> bool {
        self.rewrites.is_empty()
    }

    /// New body for a reply, if it is rewritten.
    pub fn get(&self, id: i64) -> Option<&str> {
        self.rewrites
            .iter()
            .find(|(rid, _)| *rid == id)
            .map(|(_, body)| body.as_str())
    }

    /// `(id, body)` pairs in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (i64, &str)> {
        self.rewrites.iter().map(|(id, body)| (*id, body.as_str()))
    }
}

/// Finds `#p:` references and computes their replacements.
pub struct QuoteFlattener {
    batch_size: usize,
}

impl Default for QuoteFlattener {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteFlattener {
    pub fn new() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Set the scan batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Phase 1: scan replies in descending id order. Performs no writes.
    pub async fn scan(&self, target: &dyn TargetWriter) -> Result<PendingRewrites> {
        let mut pending = PendingRewrites::default();
        let mut opts = ScanOptions::containing(REPLIES, BODY, QUOTE_MARKER)
            .with_order(ScanOrder::Descending)
            .with_batch_size(self.batch_size);

        loop {
            let batch = target.scan_batch(&opts).await?;
            if batch.is_empty() {
                break;
            }

            for row in &batch.rows {
                pending.scanned += 1;
                if let Some(rewrite) = self.flatten_row(target, row).await? {
                    pending.rewrites.push(rewrite);
                }
            }

            if batch.is_last {
                break;
            }
            opts.advance(&batch);
        }

        info!(
            "found {} replies with quotes to flatten ({} scanned)",
            pending.len(),
            pending.scanned
        );
        Ok(pending)
    }

    async fn flatten_row(
        &self,
        target: &dyn TargetWriter,
        row: &Row,
    ) -> Result<Option<(i64, String)>> {
        let (Some(id), Some(body)) = (row.id(), row.text(BODY)) else {
            return Ok(None);
        };

        let mut resolved: HashMap<i64, Option<String>> = HashMap::new();
        let mut out = String::with_capacity(body.len());
        let mut last = 0;
        let mut changed = false;

        for m in QUOTE_TOKEN.find_iter(body) {
            out.push_str(&body[last..m.start()]);
            last = m.end();

            let token = m.as_str();
            // unparsable ids never match a row
            let Ok(target_id) = token[QUOTE_MARKER.len()..].parse::<i64>() else {
                out.push_str(token);
                continue;
            };
            if target_id == id {
                out.push_str(token);
                continue;
            }

            let block = match resolved.get(&target_id) {
                Some(block) => block.clone(),
                None => {
                    let block = target
                        .find_quoted_reply(target_id)
                        .await?
                        .filter(|reply| !reply.private)
                        .map(|reply| quote_block(&reply));
                    resolved.insert(target_id, block.clone());
                    block
                }
            };

            match block {
                Some(block) => {
                    out.push_str(&block);
                    changed = true;
                }
                None => {
                    debug!("reply {}: {} is missing or private, kept as is", id, token);
                    out.push_str(token);
                }
            }
        }
        out.push_str(&body[last..]);

        Ok(changed.then_some((id, out)))
    }
}

/// Phase 2: write every pending body, in recorded order.
pub async fn apply_rewrites(target: &dyn TargetWriter, pending: &PendingRewrites) -> Result<u64> {
    let mut written = 0;
    for (id, body) in pending.iter() {
        target
            .update_by_id(REPLIES, id, &Row::new().with(BODY, body))
            .await?;
        written += 1;
    }
    info!("flattened quotes in {} replies", written);
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;

    fn reply(id: i64, thread_id: i64, body: &str) -> Row {
        Row::new()
            .with("id", id)
            .with("thread_id", thread_id)
            .with("user_id", 1)
            .with("body", body)
    }

    fn forum(replies: Vec<Row>) -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("users", &["id", "name"]);
        store.create_table("threads", &["id", "private"]);
        store.create_table("replies", &["id", "thread_id", "user_id", "body"]);
        store.seed("users", [Row::new().with("id", 1).with("name", "alice")]);
        store.seed(
            "threads",
            [
                Row::new().with("id", 1).with("private", false),
                Row::new().with("id", 2).with("private", true),
            ],
        );
        store.seed("replies", replies);
        store
    }

    async fn flatten(store: &MemoryStore) -> PendingRewrites {
        let pending = QuoteFlattener::new()
            .with_batch_size(2)
            .scan(store)
            .await
            .unwrap();
        apply_rewrites(store, &pending).await.unwrap();
        pending
    }

    fn body(store: &MemoryStore, id: i64) -> String {
        store
            .row("replies", id)
            .and_then(|r| r.text("body").map(str::to_string))
            .unwrap()
    }

    #[test]
    fn test_quote_block_format() {
        let reply = QuotedReply {
            id: 1,
            body: "hello".into(),
            author: "alice".into(),
            private: false,
        };
        assert_eq!(quote_block(&reply), "> hello\n>\n> – <cite>@alice</cite>\n");

        let multi = QuotedReply {
            body: "a\nb".into(),
            ..reply
        };
        assert_eq!(quote_block(&multi), "> a\n> b\n>\n> – <cite>@alice</cite>\n");
    }

    #[tokio::test]
    async fn test_reference_is_expanded() {
        let store = forum(vec![reply(1, 1, "hello"), reply(2, 1, "#p:1 indeed")]);
        flatten(&store).await;
        assert_eq!(
            body(&store, 2),
            "> hello\n>\n> – <cite>@alice</cite>\n indeed"
        );
    }

    #[tokio::test]
    async fn test_self_reference_is_kept() {
        let store = forum(vec![reply(5, 1, "see #p:5")]);
        let pending = flatten(&store).await;
        assert!(pending.is_empty());
        assert_eq!(body(&store, 5), "see #p:5");
    }

    #[tokio::test]
    async fn test_private_and_missing_targets_are_kept() {
        let store = forum(vec![
            reply(1, 2, "secret"),
            reply(2, 1, "#p:1 and #p:404 and #p:abc"),
        ]);
        let pending = flatten(&store).await;
        assert!(pending.is_empty());
        assert_eq!(body(&store, 2), "#p:1 and #p:404 and #p:abc");
    }

    #[tokio::test]
    async fn test_longer_id_is_not_rewritten_by_prefix() {
        let store = forum(vec![
            reply(1, 1, "one"),
            reply(12, 1, "twelve"),
            reply(20, 1, "#p:1 #p:12 #p:1"),
        ]);
        flatten(&store).await;
        let one = "> one\n>\n> – <cite>@alice</cite>\n";
        let twelve = "> twelve\n>\n> – <cite>@alice</cite>\n";
        assert_eq!(body(&store, 20), format!("{} {} {}", one, twelve, one));
    }

    #[tokio::test]
    async fn test_mutual_references_quote_original_bodies() {
        let store = forum(vec![reply(1, 1, "A #p:2"), reply(2, 1, "B #p:1")]);
        let pending = flatten(&store).await;

        // descending scan order
        let ids: Vec<i64> = pending.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![2, 1]);

        assert_eq!(
            body(&store, 1),
            "A > B #p:1\n>\n> – <cite>@alice</cite>\n"
        );
        assert_eq!(
            body(&store, 2),
            "B > A #p:2\n>\n> – <cite>@alice</cite>\n"
        );
    }

    #[tokio::test]
    async fn test_scan_does_not_write() {
        let store = forum(vec![reply(1, 1, "hello"), reply(2, 1, "#p:1")]);
        let pending = QuoteFlattener::new().scan(&store).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending.get(2).is_some());
        assert_eq!(body(&store, 2), "#p:1");
    }
}
