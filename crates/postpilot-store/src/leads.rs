//! Leads: intake inserts, the exactly-once take transition, the answered
//! flag, and rate-window counting.

use chrono::{DateTime, Utc};
use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::types::{Lead, LeadStatus};
use rusqlite::params;

use crate::db::{Database, format_ts, parse_ts};

const LEAD_SELECT: &str = "SELECT id, user_id, telegram_user_id, message_text, source_content_id, status, taken_by_telegram_id, answered, answered_at, phone_number, created_at FROM leads";

fn row_to_lead(row: &rusqlite::Row) -> rusqlite::Result<Lead> {
    let status_str: String = row.get(5)?;
    Ok(Lead {
        id: row.get(0)?,
        user_id: row.get(1)?,
        telegram_user_id: row.get(2)?,
        message_text: row.get(3)?,
        source_content_id: row.get(4)?,
        status: if status_str == "taken" {
            LeadStatus::Taken
        } else {
            LeadStatus::Pending
        },
        taken_by: row.get(6)?,
        answered: row.get::<_, i64>(7)? != 0,
        answered_at: row.get::<_, Option<String>>(8)?.map(|s| parse_ts(&s)),
        phone: row.get(9)?,
        created_at: parse_ts(&row.get::<_, String>(10)?),
    })
}

/// Store for captured customer contacts.
#[derive(Clone)]
pub struct LeadStore {
    db: Database,
}

impl LeadStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new pending lead. Rate limiting happens before this call;
    /// the insert itself always succeeds.
    pub fn create(
        &self,
        user_id: i64,
        telegram_user_id: i64,
        message_text: &str,
        source_content_id: Option<i64>,
        phone: Option<&str>,
    ) -> Result<Lead> {
        let conn = self.db.lock()?;
        conn.execute(
            "INSERT INTO leads (user_id, telegram_user_id, message_text, source_content_id, status, phone_number, answered)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, 0)",
            params![user_id, telegram_user_id, message_text, source_content_id, phone],
        )
        .map_err(|e| PostPilotError::Storage(format!("Insert lead: {e}")))?;
        let id = conn.last_insert_rowid();
        tracing::info!("Lead #{id} created from user {telegram_user_id}");

        conn.query_row(&format!("{LEAD_SELECT} WHERE id = ?1"), params![id], row_to_lead)
            .map_err(|e| PostPilotError::Storage(format!("Read back lead: {e}")))
    }

    /// Get a lead by id.
    pub fn get(&self, id: i64) -> Result<Option<Lead>> {
        let conn = self.db.lock()?;
        match conn.query_row(&format!("{LEAD_SELECT} WHERE id = ?1"), params![id], row_to_lead) {
            Ok(l) => Ok(Some(l)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PostPilotError::Storage(format!("Get lead: {e}"))),
        }
    }

    /// Claim a lead for one admin. A single conditional update guarded by
    /// `status = 'pending'`: true only for the call that made the
    /// transition, so two admins can never both win.
    pub fn take(&self, lead_id: i64, by_telegram_id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE leads SET status = 'taken', taken_by_telegram_id = ?1
                 WHERE id = ?2 AND status = 'pending'",
                params![by_telegram_id, lead_id],
            )
            .map_err(|e| PostPilotError::Storage(format!("Take lead: {e}")))?;
        if changed > 0 {
            tracing::info!("Lead #{lead_id} taken by {by_telegram_id}");
        }
        Ok(changed > 0)
    }

    /// Mark a lead answered. Not exclusive: succeeds for any caller while
    /// the lead exists. Backfills `taken_by` only when unset and promotes
    /// pending → taken, never the reverse.
    pub fn mark_answered(&self, lead_id: i64, by_telegram_id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE leads
                 SET answered = 1,
                     answered_at = ?1,
                     taken_by_telegram_id = COALESCE(taken_by_telegram_id, ?2),
                     status = CASE WHEN status = 'pending' THEN 'taken' ELSE status END
                 WHERE id = ?3",
                params![format_ts(Utc::now()), by_telegram_id, lead_id],
            )
            .map_err(|e| PostPilotError::Storage(format!("Mark answered: {e}")))?;
        Ok(changed > 0)
    }

    /// Leads created by one user at or after `since` — the rate-window
    /// input. Advisory only; the check-then-act in intake is not atomic.
    pub fn count_since(&self, telegram_user_id: i64, since: DateTime<Utc>) -> Result<u32> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT COUNT(*) FROM leads WHERE telegram_user_id = ?1 AND created_at >= ?2",
            params![telegram_user_id, format_ts(since)],
            |row| row.get(0),
        )
        .map_err(|e| PostPilotError::Storage(format!("Count leads: {e}")))
    }

    /// Unanswered leads, newest first.
    pub fn list_unanswered(&self, limit: usize) -> Result<Vec<Lead>> {
        self.list_where("WHERE answered = 0", limit)
    }

    /// Most recent leads regardless of state, newest first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<Lead>> {
        self.list_where("", limit)
    }

    fn list_where(&self, filter: &str, limit: usize) -> Result<Vec<Lead>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(&format!(
                "{LEAD_SELECT} {filter} ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let leads = stmt
            .query_map(params![limit as i64], row_to_lead)
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(leads)
    }
}
