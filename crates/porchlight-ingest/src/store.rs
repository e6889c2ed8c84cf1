//! SQLite-backed index store.
//!
//! The store owns exclusive write access to the two post tables and the
//! stream-cursor table. Mutations arrive as per-event batches and are
//! applied in one transaction with a fixed internal order: deletions
//! first, then conflict-tolerant inserts. Re-inserting an existing uri is
//! a no-op, which is what makes reprocessing an already-seen event safe.

use crate::error::Result;
use crate::schema;
use chrono::Utc;
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::path::Path;

/// A row staged for the keyword-filtered table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredPost {
    pub uri: String,
    pub cid: String,
    pub indexed_at: String,
}

/// A row staged for the classified site table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SitePost {
    pub uri: String,
    pub cid: String,
    pub handle: String,
    pub indexed_at: String,
}

/// Mutations produced by processing one commit event.
#[derive(Debug, Clone, Default)]
pub struct MutationBatch {
    /// URIs to remove from both post tables.
    pub deletes: Vec<String>,
    /// Inserts for the keyword-filtered table.
    pub filtered: Vec<FilteredPost>,
    /// Inserts for the classified site table.
    pub site: Vec<SitePost>,
}

impl MutationBatch {
    pub fn is_empty(&self) -> bool {
        self.deletes.is_empty() && self.filtered.is_empty() && self.site.is_empty()
    }
}

/// SQLite index store.
///
/// Thread-safe: the connection is protected by a mutex so the serve layer
/// and the checkpointer can share it via `Arc<IndexStore>`.
pub struct IndexStore {
    conn: Mutex<Connection>,
}

impl IndexStore {
    /// Open or create an index database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        tracing::info!("Opening index store at {}", path.display());
        let conn = Connection::open(path)?;

        // WAL mode so serve-side readers never block the write path
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        schema::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Consume the store, returning the underlying connection.
    pub fn into_connection(self) -> Connection {
        self.conn.into_inner()
    }

    /// Apply one event's mutations in a single transaction.
    ///
    /// Deletions are applied to BOTH tables before any insert of the same
    /// batch, so a create-then-delete for the same uri within one event
    /// leaves no row. Inserts use `INSERT OR IGNORE`: an existing uri wins
    /// and the new row is dropped silently.
    pub fn apply(&self, batch: &MutationBatch) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for uri in &batch.deletes {
            tx.execute("DELETE FROM filtered_post WHERE uri = ?", params![uri])?;
            tx.execute("DELETE FROM site_post WHERE uri = ?", params![uri])?;
        }

        for post in &batch.filtered {
            tx.execute(
                "INSERT OR IGNORE INTO filtered_post (uri, cid, indexed_at)
                 VALUES (?, ?, ?)",
                params![post.uri, post.cid, post.indexed_at],
            )?;
        }

        for post in &batch.site {
            tx.execute(
                "INSERT OR IGNORE INTO site_post (uri, cid, handle, indexed_at)
                 VALUES (?, ?, ?, ?)",
                params![post.uri, post.cid, post.handle, post.indexed_at],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    /// Read the persisted resume position for a stream, if any.
    pub fn load_cursor(&self, stream_id: &str) -> Result<Option<i64>> {
        let conn = self.conn.lock();
        let position = conn
            .query_row(
                "SELECT position FROM stream_cursor WHERE stream_id = ?",
                params![stream_id],
                |row| row.get(0),
            )
            .ok();
        Ok(position)
    }

    /// Persist the current stream position (single-row upsert).
    pub fn save_cursor(&self, stream_id: &str, position: i64) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO stream_cursor (stream_id, position, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(stream_id) DO UPDATE SET
                 position = excluded.position,
                 updated_at = excluded.updated_at",
            params![stream_id, position, Utc::now().timestamp()],
        )?;
        Ok(())
    }

    /// Number of rows in the keyword-filtered table.
    pub fn filtered_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM filtered_post", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of rows in the classified site table.
    pub fn site_count(&self) -> Result<u64> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM site_post", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Whether a uri is present in the site table (test/diagnostic helper).
    pub fn site_contains(&self, uri: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM site_post WHERE uri = ?",
            params![uri],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Whether a uri is present in the filtered table (test/diagnostic helper).
    pub fn filtered_contains(&self, uri: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM filtered_post WHERE uri = ?",
            params![uri],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filtered(uri: &str) -> FilteredPost {
        FilteredPost {
            uri: uri.to_string(),
            cid: "cid-1".to_string(),
            indexed_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    fn site(uri: &str) -> SitePost {
        SitePost {
            uri: uri.to_string(),
            cid: "cid-1".to_string(),
            handle: "dominik.social".to_string(),
            indexed_at: "2024-05-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_insert_is_idempotent() {
        let store = IndexStore::open_in_memory().unwrap();
        let batch = MutationBatch {
            filtered: vec![filtered("at://a/post/1")],
            site: vec![site("at://a/post/1")],
            ..Default::default()
        };

        store.apply(&batch).unwrap();
        store.apply(&batch).unwrap();

        assert_eq!(store.filtered_count().unwrap(), 1);
        assert_eq!(store.site_count().unwrap(), 1);
    }

    #[test]
    fn test_deletes_applied_before_inserts() {
        let store = IndexStore::open_in_memory().unwrap();

        store
            .apply(&MutationBatch {
                filtered: vec![filtered("at://a/post/1")],
                ..Default::default()
            })
            .unwrap();

        // Delete and re-insert the same uri in one batch. Because the
        // delete runs first, the insert is not ignored and the new cid
        // replaces the old row.
        let mut replacement = filtered("at://a/post/1");
        replacement.cid = "cid-2".to_string();
        store
            .apply(&MutationBatch {
                deletes: vec!["at://a/post/1".to_string()],
                filtered: vec![replacement],
                ..Default::default()
            })
            .unwrap();

        let conn = store.conn.lock();
        let cid: String = conn
            .query_row(
                "SELECT cid FROM filtered_post WHERE uri = ?",
                params!["at://a/post/1"],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(cid, "cid-2");
    }

    #[test]
    fn test_delete_removes_from_both_tables() {
        let store = IndexStore::open_in_memory().unwrap();
        store
            .apply(&MutationBatch {
                filtered: vec![filtered("at://a/post/1")],
                site: vec![site("at://a/post/1")],
                ..Default::default()
            })
            .unwrap();

        store
            .apply(&MutationBatch {
                deletes: vec!["at://a/post/1".to_string()],
                ..Default::default()
            })
            .unwrap();

        assert_eq!(store.filtered_count().unwrap(), 0);
        assert_eq!(store.site_count().unwrap(), 0);
    }

    #[test]
    fn test_delete_unknown_uri_is_noop() {
        let store = IndexStore::open_in_memory().unwrap();
        let batch = MutationBatch {
            deletes: vec!["at://never/post/9".to_string()],
            ..Default::default()
        };
        store.apply(&batch).unwrap();
        assert_eq!(store.filtered_count().unwrap(), 0);
    }

    #[test]
    fn test_cursor_upsert_and_load() {
        let store = IndexStore::open_in_memory().unwrap();

        assert_eq!(store.load_cursor("firehose").unwrap(), None);

        store.save_cursor("firehose", 100).unwrap();
        assert_eq!(store.load_cursor("firehose").unwrap(), Some(100));

        store.save_cursor("firehose", 250).unwrap();
        assert_eq!(store.load_cursor("firehose").unwrap(), Some(250));

        // One row per stream id
        let other = store.load_cursor("backfill").unwrap();
        assert_eq!(other, None);
    }
}
