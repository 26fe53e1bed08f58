//! Category remapper: renames copied boards and folds retired boards into
//! the catch-all board.
//!
//! Runs against the destination store only, after every table is copied.
//! Ordering is strict: every rename finishes before any merge slug is
//! resolved, and every merge id plus the catch-all id is resolved before the
//! first thread is reassigned.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::{Row, SqlValue, TargetWriter};
use crate::error::{MigrateError, Result};

const BOARDS: &str = "boards";
const THREADS: &str = "threads";
const SLUG: &str = "slug";

/// A board rename keyed by its legacy slug.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardRename {
    pub from_slug: &'static str,
    pub slug: &'static str,
    pub name: &'static str,
    /// `None` leaves the description untouched.
    pub description: Option<&'static str>,
}

impl BoardRename {
    /// Column changes written for this rename.
    pub fn changes(&self) -> Row {
        let mut row = Row::new().with("slug", self.slug).with("name", self.name);
        if let Some(description) = self.description {
            row.set("description", description);
        }
        row
    }
}

/// Renames, in application order.
pub const BOARD_RENAMES: &[BoardRename] = &[
    BoardRename {
        from_slug: "annonces",
        slug: "mod",
        name: "Annonces",
        description: Some("Annonces de la plateforme et de la modération"),
    },
    BoardRename {
        from_slug: "general",
        slug: "random",
        name: "Random",
        description: Some("Tout ce qui ne correspond à aucune autre board"),
    },
    BoardRename {
        from_slug: "jeux",
        slug: "games",
        name: "Jeux",
        description: Some("thread sur les jeux vidéos"),
    },
    BoardRename {
        from_slug: "nsfw",
        slug: "nsfw",
        name: "NSFW",
        description: None,
    },
    BoardRename {
        from_slug: "tech",
        slug: "dev",
        name: "Développement",
        description: None,
    },
    BoardRename {
        from_slug: "anime",
        slug: "anime",
        name: "Anime & Manga",
        description: None,
    },
    BoardRename {
        from_slug: "pol",
        slug: "pol",
        name: "Politiquement incorrect",
        description: None,
    },
];

/// Boards folded into [`CATCH_ALL_SLUG`], in merge order.
pub const MERGED_BOARD_SLUGS: &[&str] = &["lifehacks", "shitpost", "partage-vidéo", "olinux"];

/// Board that receives the threads of merged boards.
pub const CATCH_ALL_SLUG: &str = "random";

/// Counters from one remap run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemapStats {
    /// Board rows touched by renames.
    pub boards_renamed: u64,
    /// Threads moved to the catch-all board.
    pub threads_reassigned: u64,
    /// Merged boards deleted.
    pub boards_deleted: u64,
}

/// Rename boards, then merge the retired ones into the catch-all board.
pub async fn remap_boards(target: &dyn TargetWriter) -> Result<RemapStats> {
    let mut stats = RemapStats::default();

    for rename in BOARD_RENAMES {
        let n = target
            .update_where_eq(
                BOARDS,
                SLUG,
                &SqlValue::from(rename.from_slug),
                &rename.changes(),
            )
            .await?;
        if n == 0 {
            debug!("no board with slug '{}', rename skipped", rename.from_slug);
        }
        stats.boards_renamed += n;
    }

    let mut merged = Vec::with_capacity(MERGED_BOARD_SLUGS.len());
    for slug in MERGED_BOARD_SLUGS {
        merged.push((*slug, resolve_slug(target, slug).await?));
    }
    let catch_all = resolve_slug(target, CATCH_ALL_SLUG).await?;

    for (slug, id) in merged {
        let moved = target
            .update_where_eq(
                THREADS,
                "board_id",
                &SqlValue::I64(id),
                &Row::new().with("board_id", catch_all),
            )
            .await?;
        let deleted = target.delete_by_id(BOARDS, id).await?;
        if deleted == 0 {
            warn!("board '{}' (id {}) was already gone", slug, id);
        }
        stats.boards_deleted += deleted;
        info!(
            "merged board '{}' into '{}' ({} threads moved)",
            slug, CATCH_ALL_SLUG, moved
        );
        stats.threads_reassigned += moved;
    }

    Ok(stats)
}

async fn resolve_slug(target: &dyn TargetWriter, slug: &str) -> Result<i64> {
    target
        .find_id_by(BOARDS, SLUG, &SqlValue::from(slug))
        .await?
        .ok_or_else(|| MigrateError::lookup(BOARDS, SLUG, slug))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::memory::MemoryStore;

    const SLUGS: &[&str] = &[
        "annonces",
        "general",
        "jeux",
        "tech",
        "lifehacks",
        "shitpost",
        "partage-vidéo",
        "olinux",
    ];

    fn board(id: i64, slug: &str) -> Row {
        Row::new()
            .with("id", id)
            .with("slug", slug)
            .with("name", slug)
            .with("description", "legacy")
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("boards", &["id", "slug", "name", "description"]);
        store.create_table("threads", &["id", "board_id", "private"]);
        store.seed(
            "boards",
            SLUGS
                .iter()
                .enumerate()
                .map(|(i, slug)| board(i as i64 + 1, slug)),
        );
        // one thread per board
        store.seed(
            "threads",
            (1..=SLUGS.len() as i64).map(|id| Row::new().with("id", id * 10).with("board_id", id)),
        );
        store
    }

    #[tokio::test]
    async fn test_merge_cascade() {
        let store = store();
        let stats = remap_boards(&store).await.unwrap();

        // lifehacks, shitpost, partage-vidéo, olinux are gone
        assert_eq!(store.ids("boards"), vec![1, 2, 3, 4]);
        assert_eq!(stats.boards_deleted, 4);
        assert_eq!(stats.threads_reassigned, 4);
        assert_eq!(stats.boards_renamed, 4);

        for id in [50, 60, 70, 80] {
            let thread = store.row("threads", id).unwrap();
            assert_eq!(thread.get("board_id"), Some(&SqlValue::I64(2)));
        }
        assert_eq!(
            store.row("threads", 30).unwrap().get("board_id"),
            Some(&SqlValue::I64(3))
        );
    }

    #[tokio::test]
    async fn test_renames_keep_description_when_absent() {
        let store = store();
        remap_boards(&store).await.unwrap();

        let random = store.row("boards", 2).unwrap();
        assert_eq!(random.text("slug"), Some("random"));
        assert_eq!(random.text("name"), Some("Random"));
        assert_eq!(
            random.text("description"),
            Some("Tout ce qui ne correspond à aucune autre board")
        );

        let dev = store.row("boards", 4).unwrap();
        assert_eq!(dev.text("slug"), Some("dev"));
        assert_eq!(dev.text("name"), Some("Développement"));
        assert_eq!(dev.text("description"), Some("legacy"));
    }

    #[tokio::test]
    async fn test_missing_merge_slug_is_lookup_error() {
        let store = store();
        store.delete_by_id("boards", 7).await.unwrap();

        let err = remap_boards(&store).await.unwrap_err();
        assert!(matches!(
            err,
            MigrateError::Lookup { ref value, .. } if value == "partage-vidéo"
        ));
        // nothing reassigned before every id is resolved
        assert_eq!(
            store.row("threads", 50).unwrap().get("board_id"),
            Some(&SqlValue::I64(5))
        );
        assert!(store.row("boards", 5).is_some());
    }

    #[tokio::test]
    async fn test_missing_catch_all_is_lookup_error() {
        let store = store();
        store.delete_by_id("boards", 2).await.unwrap();

        let err = remap_boards(&store).await.unwrap_err();
        assert!(matches!(err, MigrateError::Lookup { ref value, .. } if value == "random"));
        assert_eq!(store.ids("boards").len(), 7);
    }

    #[test]
    fn test_rename_changes() {
        let nsfw = BOARD_RENAMES[3].changes();
        assert_eq!(nsfw.columns().collect::<Vec<_>>(), vec!["slug", "name"]);
        let annonces = BOARD_RENAMES[0].changes();
        assert!(annonces.contains("description"));
    }
}
