//! Customer identity registration and lookup.

use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::types::UserRecord;
use rusqlite::params;

use crate::db::{Database, parse_ts};

const USER_SELECT: &str =
    "SELECT id, telegram_id, username, first_name, last_name, created_at FROM users";

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<UserRecord> {
    Ok(UserRecord {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        created_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

/// Directory of customers who have contacted the bot.
#[derive(Clone)]
pub struct UserDirectory {
    db: Database,
}

impl UserDirectory {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Look up by Telegram id, inserting on first contact.
    pub fn get_or_create(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<UserRecord> {
        let conn = self.db.lock()?;
        if let Ok(user) = conn.query_row(
            &format!("{USER_SELECT} WHERE telegram_id = ?1"),
            params![telegram_id],
            row_to_user,
        ) {
            return Ok(user);
        }
        conn.execute(
            "INSERT INTO users (telegram_id, username, first_name, last_name) VALUES (?1, ?2, ?3, ?4)",
            params![telegram_id, username, first_name, last_name],
        )
        .map_err(|e| PostPilotError::Storage(format!("Insert user: {e}")))?;
        let id = conn.last_insert_rowid();
        conn.query_row(&format!("{USER_SELECT} WHERE id = ?1"), params![id], row_to_user)
            .map_err(|e| PostPilotError::Storage(format!("Read back user: {e}")))
    }

    /// Look up by Telegram id.
    pub fn get_by_telegram_id(&self, telegram_id: i64) -> Result<Option<UserRecord>> {
        let conn = self.db.lock()?;
        match conn.query_row(
            &format!("{USER_SELECT} WHERE telegram_id = ?1"),
            params![telegram_id],
            row_to_user,
        ) {
            Ok(u) => Ok(Some(u)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PostPilotError::Storage(format!("Get user: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_or_create_idempotent() {
        let dir = UserDirectory::new(Database::open_in_memory().unwrap());
        let a = dir.get_or_create(100, Some("alice"), Some("Alice"), None).unwrap();
        let b = dir.get_or_create(100, Some("alice2"), None, None).unwrap();
        // Same row on repeat contact; profile fields are not overwritten
        assert_eq!(a.id, b.id);
        assert_eq!(b.username.as_deref(), Some("alice"));

        assert!(dir.get_by_telegram_id(100).unwrap().is_some());
        assert!(dir.get_by_telegram_id(200).unwrap().is_none());
    }
}
