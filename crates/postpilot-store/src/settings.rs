//! Process-wide key/value settings with documented defaults, read on every
//! posting decision.

use postpilot_core::error::{PostPilotError, Result};
use rusqlite::params;

use crate::db::Database;

pub const KEY_TARGET_CHAT: &str = "target_chat_id";
pub const KEY_ADMIN_CHAT: &str = "admin_chat_id";
pub const KEY_POSTING_ENABLED: &str = "posting_enabled";
pub const KEY_BANNER_FILE: &str = "banner_file_id";

/// Default for an absent key: posting off, no targets, no banner.
fn default_for(key: &str) -> &'static str {
    match key {
        KEY_TARGET_CHAT | KEY_ADMIN_CHAT | KEY_POSTING_ENABLED => "0",
        _ => "",
    }
}

/// Upsert-only settings store.
#[derive(Clone)]
pub struct SettingsStore {
    db: Database,
}

impl SettingsStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Raw value, falling back to the documented default when absent.
    pub fn get(&self, key: &str) -> Result<String> {
        let conn = self.db.lock()?;
        match conn.query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        ) {
            Ok(v) => Ok(v),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(default_for(key).to_string()),
            Err(e) => Err(PostPilotError::Storage(format!("Get setting: {e}"))),
        }
    }

    /// Upsert a value.
    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = CURRENT_TIMESTAMP",
            params![key, value],
        )
        .map_err(|e| PostPilotError::Storage(format!("Set setting: {e}")))?;
        Ok(())
    }

    // ── Typed accessors ──────────────────────────────────────

    /// Target chat for scheduled posts. None when unset or zero.
    pub fn target_chat_id(&self) -> Result<Option<i64>> {
        self.chat_id(KEY_TARGET_CHAT)
    }

    pub fn set_target_chat_id(&self, chat_id: i64) -> Result<()> {
        self.set(KEY_TARGET_CHAT, &chat_id.to_string())
    }

    /// Chat that receives lead notifications. None when unset or zero.
    pub fn admin_chat_id(&self) -> Result<Option<i64>> {
        self.chat_id(KEY_ADMIN_CHAT)
    }

    pub fn set_admin_chat_id(&self, chat_id: i64) -> Result<()> {
        self.set(KEY_ADMIN_CHAT, &chat_id.to_string())
    }

    fn chat_id(&self, key: &str) -> Result<Option<i64>> {
        let raw = self.get(key)?;
        Ok(raw.parse::<i64>().ok().filter(|n| *n != 0))
    }

    /// Global posting switch; defaults to off.
    pub fn posting_enabled(&self) -> Result<bool> {
        let raw = self.get(KEY_POSTING_ENABLED)?;
        Ok(raw == "1" || raw.eq_ignore_ascii_case("true"))
    }

    pub fn set_posting_enabled(&self, enabled: bool) -> Result<()> {
        self.set(KEY_POSTING_ENABLED, if enabled { "1" } else { "0" })
    }

    /// Banner asset shown in welcome flows. None when unset.
    pub fn banner_file_id(&self) -> Result<Option<String>> {
        let raw = self.get(KEY_BANNER_FILE)?;
        Ok((!raw.is_empty()).then_some(raw))
    }

    pub fn set_banner_file_id(&self, file_id: &str) -> Result<()> {
        self.set(KEY_BANNER_FILE, file_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SettingsStore {
        SettingsStore::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_defaults_when_absent() {
        let store = store();
        assert_eq!(store.target_chat_id().unwrap(), None);
        assert_eq!(store.admin_chat_id().unwrap(), None);
        assert!(!store.posting_enabled().unwrap());
        assert_eq!(store.banner_file_id().unwrap(), None);
        assert_eq!(store.get("unknown_key").unwrap(), "");
    }

    #[test]
    fn test_upsert_and_typed_read() {
        let store = store();
        store.set_target_chat_id(-1001234).unwrap();
        assert_eq!(store.target_chat_id().unwrap(), Some(-1001234));
        store.set_target_chat_id(0).unwrap();
        assert_eq!(store.target_chat_id().unwrap(), None);

        store.set_posting_enabled(true).unwrap();
        assert!(store.posting_enabled().unwrap());
        store.set(KEY_POSTING_ENABLED, "true").unwrap();
        assert!(store.posting_enabled().unwrap());
        store.set_posting_enabled(false).unwrap();
        assert!(!store.posting_enabled().unwrap());

        store.set_banner_file_id("banner-1").unwrap();
        assert_eq!(store.banner_file_id().unwrap().as_deref(), Some("banner-1"));
    }

    #[test]
    fn test_garbage_chat_id_is_none() {
        let store = store();
        store.set(KEY_TARGET_CHAT, "not-a-number").unwrap();
        assert_eq!(store.target_chat_id().unwrap(), None);
    }
}
