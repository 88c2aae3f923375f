//! Content lifecycle: add, soft delete, reactivate, publishing toggle,
//! history listing, and the append-only post log.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::types::{Content, ContentStatus, ContentType, PostLogEntry};
use rusqlite::params;

use crate::db::{Database, parse_ts};

/// Shared SELECT column list for content queries — single source of truth.
const CONTENT_SELECT: &str = "SELECT id, content_type, file_id, text, caption, status, publishing_enabled, created_at, created_by FROM content";

/// Map a database row to a Content struct.
fn row_to_content(row: &rusqlite::Row) -> rusqlite::Result<Content> {
    let type_str: String = row.get(1)?;
    let status_str: String = row.get(5)?;
    let file_id: Option<String> = row.get(2)?;
    let text: Option<String> = row.get(3)?;
    let caption: Option<String> = row.get(4)?;
    Ok(Content {
        id: row.get(0)?,
        content_type: ContentType::parse(&type_str).unwrap_or(ContentType::Text),
        file_id: file_id.filter(|s| !s.is_empty()),
        text: text.filter(|s| !s.is_empty()),
        caption: caption.filter(|s| !s.is_empty()),
        status: if status_str == "deleted" {
            ContentStatus::Deleted
        } else {
            ContentStatus::Active
        },
        publishing_enabled: row.get::<_, i64>(6)? != 0,
        created_at: parse_ts(&row.get::<_, String>(7)?),
        created_by: row.get(8)?,
    })
}

/// Store for postable items. Content rows are independent — adding one
/// never deactivates another; the binding table is the only coupling to
/// posting slots.
#[derive(Clone)]
pub struct ContentStore {
    db: Database,
}

impl ContentStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new active, publishing-enabled item.
    pub fn add(
        &self,
        content_type: ContentType,
        created_by: i64,
        file_id: Option<&str>,
        text: Option<&str>,
        caption: Option<&str>,
    ) -> Result<Content> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO content (content_type, file_id, text, caption, status, publishing_enabled, created_by)
             VALUES (?1, ?2, ?3, ?4, 'active', 1, ?5)",
            params![content_type.as_str(), file_id, text, caption, created_by],
        )
        .map_err(|e| PostPilotError::Storage(format!("Insert content: {e}")))?;
        let id = conn.last_insert_rowid();
        tracing::info!("Content #{id} added ({})", content_type.as_str());

        conn.query_row(
            &format!("{CONTENT_SELECT} WHERE id = ?1"),
            params![id],
            row_to_content,
        )
        .map_err(|e| PostPilotError::Storage(format!("Read back content: {e}")))
    }

    /// Get an item by id.
    pub fn get(&self, id: i64) -> Result<Option<Content>> {
        let conn = self.db.lock()?;
        match conn.query_row(
            &format!("{CONTENT_SELECT} WHERE id = ?1"),
            params![id],
            row_to_content,
        ) {
            Ok(c) => Ok(Some(c)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PostPilotError::Storage(format!("Get content: {e}"))),
        }
    }

    /// All items, deleted included, newest first.
    pub fn list_history(&self, limit: usize) -> Result<Vec<Content>> {
        self.list_where("", limit)
    }

    /// Active items only, newest first.
    pub fn list_active(&self, limit: usize) -> Result<Vec<Content>> {
        self.list_where("WHERE status = 'active'", limit)
    }

    fn list_where(&self, filter: &str, limit: usize) -> Result<Vec<Content>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{CONTENT_SELECT} {filter} ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let items = stmt
            .query_map(params![limit as i64], row_to_content)
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(items)
    }

    /// Soft-delete: active → deleted, and remove any schedule binding that
    /// references this item. False if unknown or already deleted.
    pub fn soft_delete(&self, id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE content SET status = 'deleted' WHERE id = ?1 AND status = 'active'",
                params![id],
            )
            .map_err(|e| PostPilotError::Storage(format!("Delete content: {e}")))?;
        conn.execute(
            "DELETE FROM schedule_content_binding WHERE content_id = ?1",
            params![id],
        )
        .map_err(|e| PostPilotError::Storage(format!("Unbind content: {e}")))?;
        if changed > 0 {
            tracing::info!("Content #{id} soft-deleted");
        }
        Ok(changed > 0)
    }

    /// Restore a soft-deleted item. False if unknown or already active.
    pub fn reactivate(&self, id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE content SET status = 'active' WHERE id = ?1 AND status = 'deleted'",
                params![id],
            )
            .map_err(|e| PostPilotError::Storage(format!("Reactivate content: {e}")))?;
        Ok(changed > 0)
    }

    /// Toggle dispatch for an item without touching its lifecycle state.
    pub fn set_publishing_enabled(&self, id: i64, enabled: bool) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE content SET publishing_enabled = ?1 WHERE id = ?2",
                params![enabled as i64, id],
            )
            .map_err(|e| PostPilotError::Storage(format!("Set publishing: {e}")))?;
        Ok(changed > 0)
    }

    /// Latest publish time per content id, computed from the post log.
    /// Ids that were never published are absent from the map.
    pub fn last_published_at(&self, ids: &[i64]) -> Result<HashMap<i64, DateTime<Utc>>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.db.lock()?;
        let placeholders = vec!["?"; ids.len()].join(",");
        let mut stmt = conn
            .prepare(&format!(
                "SELECT content_id, MAX(posted_at) FROM posts_log
                 WHERE content_id IN ({placeholders}) GROUP BY content_id"
            ))
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(ids.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .map(|(id, raw)| (id, parse_ts(&raw)))
            .collect();
        Ok(rows)
    }

    /// Append a post-log row for a successful publish. The log is the sole
    /// idempotence anchor: one row per successful transport call.
    pub fn log_post(&self, content_id: i64, chat_id: i64, message_id: i64) -> Result<i64> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO posts_log (content_id, chat_id, message_id) VALUES (?1, ?2, ?3)",
            params![content_id, chat_id, message_id],
        )
        .map_err(|e| PostPilotError::Storage(format!("Log post: {e}")))?;
        Ok(conn.last_insert_rowid())
    }

    /// Recent post-log entries, newest first.
    pub fn recent_posts(&self, limit: usize) -> Result<Vec<PostLogEntry>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, content_id, chat_id, message_id, posted_at FROM posts_log
                 ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let entries = stmt
            .query_map(params![limit as i64], |row| {
                Ok(PostLogEntry {
                    id: row.get(0)?,
                    content_id: row.get(1)?,
                    chat_id: row.get(2)?,
                    message_id: row.get(3)?,
                    posted_at: parse_ts(&row.get::<_, String>(4)?),
                })
            })
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(entries)
    }

    /// Number of post-log rows for one content id.
    pub fn post_count(&self, content_id: i64) -> Result<u32> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM posts_log WHERE content_id = ?1",
            params![content_id],
            |row| row.get(0),
        )
        .map_err(|e| PostPilotError::Storage(format!("Count posts: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::ScheduleStore;

    fn store() -> ContentStore {
        ContentStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_add_and_get() {
        let store = store();
        let c = store
            .add(ContentType::Photo, 42, Some("file-abc"), None, Some("Sale!"))
            .unwrap();
        assert_eq!(c.content_type, ContentType::Photo);
        assert_eq!(c.status, ContentStatus::Active);
        assert!(c.publishing_enabled);
        assert_eq!(c.created_by, 42);

        let fetched = store.get(c.id).unwrap().unwrap();
        assert_eq!(fetched.file_id.as_deref(), Some("file-abc"));
        assert_eq!(fetched.caption.as_deref(), Some("Sale!"));
        assert!(store.get(9999).unwrap().is_none());
    }

    #[test]
    fn test_add_keeps_siblings_active() {
        let store = store();
        let a = store.add(ContentType::Text, 1, None, Some("first"), None).unwrap();
        let b = store.add(ContentType::Text, 1, None, Some("second"), None).unwrap();
        // Independent multi-item model: both stay active
        assert_eq!(store.get(a.id).unwrap().unwrap().status, ContentStatus::Active);
        assert_eq!(store.get(b.id).unwrap().unwrap().status, ContentStatus::Active);
        assert_eq!(store.list_active(10).unwrap().len(), 2);
    }

    #[test]
    fn test_soft_delete_and_reactivate() {
        let store = store();
        let c = store.add(ContentType::Text, 1, None, Some("hi"), None).unwrap();

        assert!(store.soft_delete(c.id).unwrap());
        assert_eq!(store.get(c.id).unwrap().unwrap().status, ContentStatus::Deleted);
        // Already deleted → false, row still there
        assert!(!store.soft_delete(c.id).unwrap());
        assert!(store.get(c.id).unwrap().is_some());
        // Unknown id → false
        assert!(!store.soft_delete(12345).unwrap());

        assert!(store.reactivate(c.id).unwrap());
        assert_eq!(store.get(c.id).unwrap().unwrap().status, ContentStatus::Active);
        assert!(!store.reactivate(c.id).unwrap());
    }

    #[test]
    fn test_delete_cascades_binding() {
        let db = Database::open_in_memory().unwrap();
        let content = ContentStore::new(db.clone());
        let schedules = ScheduleStore::new(db);

        let c = content.add(ContentType::Text, 1, None, Some("hi"), None).unwrap();
        let sid = schedules.add("09:00").unwrap().unwrap();
        assert!(schedules.bind_content(sid, c.id).unwrap());
        assert_eq!(schedules.bound_content(sid).unwrap(), Some(c.id));

        assert!(content.soft_delete(c.id).unwrap());
        assert_eq!(schedules.bound_content(sid).unwrap(), None);
    }

    #[test]
    fn test_history_includes_deleted() {
        let store = store();
        let a = store.add(ContentType::Text, 1, None, Some("a"), None).unwrap();
        store.add(ContentType::Text, 1, None, Some("b"), None).unwrap();
        store.soft_delete(a.id).unwrap();

        assert_eq!(store.list_history(10).unwrap().len(), 2);
        assert_eq!(store.list_active(10).unwrap().len(), 1);
    }

    #[test]
    fn test_publishing_toggle() {
        let store = store();
        let c = store.add(ContentType::Text, 1, None, Some("hi"), None).unwrap();
        assert!(store.set_publishing_enabled(c.id, false).unwrap());
        let c = store.get(c.id).unwrap().unwrap();
        assert!(!c.publishing_enabled);
        assert_eq!(c.status, ContentStatus::Active);
        assert!(!store.set_publishing_enabled(999, false).unwrap());
    }

    #[test]
    fn test_last_published_at() {
        let store = store();
        let a = store.add(ContentType::Text, 1, None, Some("a"), None).unwrap();
        let b = store.add(ContentType::Text, 1, None, Some("b"), None).unwrap();
        store.log_post(a.id, -100, 1).unwrap();
        store.log_post(a.id, -100, 2).unwrap();

        let map = store.last_published_at(&[a.id, b.id]).unwrap();
        assert!(map.contains_key(&a.id));
        // Never published → absent, not zero
        assert!(!map.contains_key(&b.id));
        assert!(store.last_published_at(&[]).unwrap().is_empty());
        assert_eq!(store.post_count(a.id).unwrap(), 2);
    }
}
