//! Admin registry and the centralized authorization predicate.
//!
//! Admins live in the database; owners come from configuration and are
//! never stored. Both satisfy the same predicate used by every mutating
//! path driven by a human actor.

use std::collections::HashSet;

use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::types::AdminIdentity;
use rusqlite::params;

use crate::db::{Database, parse_ts};

fn row_to_admin(row: &rusqlite::Row) -> rusqlite::Result<AdminIdentity> {
    Ok(AdminIdentity {
        id: row.get(0)?,
        telegram_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        added_at: parse_ts(&row.get::<_, String>(5)?),
    })
}

/// Persisted admin set, keyed by Telegram id.
#[derive(Clone)]
pub struct AdminRegistry {
    db: Database,
}

impl AdminRegistry {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add an admin. False when the id is already registered.
    pub fn add(
        &self,
        telegram_id: i64,
        username: Option<&str>,
        first_name: Option<&str>,
        last_name: Option<&str>,
    ) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO admins (telegram_id, username, first_name, last_name)
                 VALUES (?1, ?2, ?3, ?4)",
                params![telegram_id, username, first_name, last_name],
            )
            .map_err(|e| PostPilotError::Storage(format!("Insert admin: {e}")))?;
        if changed > 0 {
            tracing::info!("Admin {telegram_id} added");
        }
        Ok(changed > 0)
    }

    /// Remove an admin. False when the id was not registered.
    pub fn remove(&self, telegram_id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute("DELETE FROM admins WHERE telegram_id = ?1", params![telegram_id])
            .map_err(|e| PostPilotError::Storage(format!("Delete admin: {e}")))?;
        Ok(changed > 0)
    }

    /// All admins, oldest first.
    pub fn list(&self) -> Result<Vec<AdminIdentity>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, telegram_id, username, first_name, last_name, added_at
                 FROM admins ORDER BY added_at, id",
            )
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let admins = stmt
            .query_map([], row_to_admin)
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(admins)
    }

    /// Membership check.
    pub fn is_admin(&self, telegram_id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        match conn.query_row(
            "SELECT 1 FROM admins WHERE telegram_id = ?1",
            params![telegram_id],
            |_| Ok(()),
        ) {
            Ok(()) => Ok(true),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(false),
            Err(e) => Err(PostPilotError::Storage(format!("Is admin: {e}"))),
        }
    }
}

/// The single authorization predicate: owner (config) OR admin (registry).
#[derive(Clone)]
pub struct Authorizer {
    owners: HashSet<i64>,
    registry: AdminRegistry,
}

impl Authorizer {
    pub fn new(owner_ids: &[i64], registry: AdminRegistry) -> Self {
        Self {
            owners: owner_ids.iter().copied().collect(),
            registry,
        }
    }

    /// Owners are configuration-level; they pass without a registry row.
    pub fn is_owner(&self, telegram_id: i64) -> bool {
        self.owners.contains(&telegram_id)
    }

    /// Gate for every human-driven mutation.
    pub fn is_authorized(&self, telegram_id: i64) -> Result<bool> {
        if self.is_owner(telegram_id) {
            return Ok(true);
        }
        self.registry.is_admin(telegram_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> AdminRegistry {
        AdminRegistry::new(Database::open_in_memory().unwrap())
    }

    #[test]
    fn test_add_remove_duplicate() {
        let reg = registry();
        assert!(reg.add(100, Some("bob"), None, None).unwrap());
        assert!(!reg.add(100, Some("bob"), None, None).unwrap());
        assert!(reg.is_admin(100).unwrap());
        assert_eq!(reg.list().unwrap().len(), 1);

        assert!(reg.remove(100).unwrap());
        assert!(!reg.remove(100).unwrap());
        assert!(!reg.is_admin(100).unwrap());
    }

    #[test]
    fn test_authorizer_predicate() {
        let reg = registry();
        reg.add(200, None, None, None).unwrap();
        let auth = Authorizer::new(&[999], reg);

        assert!(auth.is_owner(999));
        assert!(auth.is_authorized(999).unwrap());
        assert!(!auth.is_owner(200));
        assert!(auth.is_authorized(200).unwrap());
        assert!(!auth.is_authorized(300).unwrap());
    }
}
