//! Posting schedules: daily "HH:MM" slots, unique per time, each optionally
//! bound to one content item.

use postpilot_core::error::{PostPilotError, Result};
use postpilot_core::types::Schedule;
use rusqlite::params;

use crate::db::{Database, parse_ts};

/// Validate and normalize a time-of-day string. Accepts "H:MM" and "HH:MM",
/// returns zero-padded "HH:MM"; None when out of range or malformed.
pub fn parse_time(s: &str) -> Option<String> {
    let s = s.trim();
    let (h, m) = s.split_once(':')?;
    if h.is_empty() || h.len() > 2 || m.len() != 2 {
        return None;
    }
    if !h.bytes().all(|b| b.is_ascii_digit()) || !m.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(format!("{hour:02}:{minute:02}"))
}

fn row_to_schedule(row: &rusqlite::Row) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        id: row.get(0)?,
        time_str: row.get(1)?,
        enabled: row.get::<_, i64>(2)? != 0,
        created_at: parse_ts(&row.get::<_, String>(3)?),
    })
}

const SCHEDULE_SELECT: &str = "SELECT id, time_str, enabled, created_at FROM schedules";

/// Store for posting slots and their content bindings.
#[derive(Clone)]
pub struct ScheduleStore {
    db: Database,
}

impl ScheduleStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Add a posting time. `Ok(None)` when the normalized time already
    /// exists (conditional insert, not upsert); `Validation` error when the
    /// string is malformed.
    pub fn add(&self, time: &str) -> Result<Option<i64>> {
        let normalized = parse_time(time)
            .ok_or_else(|| PostPilotError::Validation(format!("Invalid time: '{time}'")))?;
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO schedules (time_str, enabled) VALUES (?1, 1)",
                params![normalized],
            )
            .map_err(|e| PostPilotError::Storage(format!("Insert schedule: {e}")))?;
        if changed == 0 {
            tracing::debug!("Schedule {normalized} already exists");
            return Ok(None);
        }
        let id = conn.last_insert_rowid();
        tracing::info!("Schedule #{id} added at {normalized}");
        Ok(Some(id))
    }

    /// Remove a slot by time string, along with its binding.
    pub fn remove(&self, time: &str) -> Result<bool> {
        let Some(normalized) = parse_time(time) else {
            return Ok(false);
        };
        let conn = self.db.lock()?;
        let id: Option<i64> = conn
            .query_row(
                "SELECT id FROM schedules WHERE time_str = ?1",
                params![normalized],
                |row| row.get(0),
            )
            .ok();
        let Some(id) = id else {
            return Ok(false);
        };
        conn.execute(
            "DELETE FROM schedule_content_binding WHERE schedule_id = ?1",
            params![id],
        )
        .map_err(|e| PostPilotError::Storage(format!("Unbind schedule: {e}")))?;
        conn.execute("DELETE FROM schedules WHERE id = ?1", params![id])
            .map_err(|e| PostPilotError::Storage(format!("Delete schedule: {e}")))?;
        tracing::info!("Schedule #{id} ({normalized}) removed");
        Ok(true)
    }

    /// Get a slot by id.
    pub fn get(&self, id: i64) -> Result<Option<Schedule>> {
        let conn = self.db.lock()?;
        match conn.query_row(
            &format!("{SCHEDULE_SELECT} WHERE id = ?1"),
            params![id],
            row_to_schedule,
        ) {
            Ok(s) => Ok(Some(s)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PostPilotError::Storage(format!("Get schedule: {e}"))),
        }
    }

    /// All slots, ascending by time of day.
    pub fn list(&self) -> Result<Vec<Schedule>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(&format!("{SCHEDULE_SELECT} ORDER BY time_str"))
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let schedules = stmt
            .query_map([], row_to_schedule)
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(schedules)
    }

    /// Enable or disable a slot without removing it.
    pub fn set_enabled(&self, time: &str, enabled: bool) -> Result<bool> {
        let Some(normalized) = parse_time(time) else {
            return Ok(false);
        };
        let conn = self.db.lock()?;
        let changed = conn
            .execute(
                "UPDATE schedules SET enabled = ?1 WHERE time_str = ?2",
                params![enabled as i64, normalized],
            )
            .map_err(|e| PostPilotError::Storage(format!("Set enabled: {e}")))?;
        Ok(changed > 0)
    }

    // ── Content binding ──────────────────────────────────────

    /// Bind a content item to a slot; replaces any prior binding for that
    /// slot (last write wins). False when the slot does not exist.
    pub fn bind_content(&self, schedule_id: i64, content_id: i64) -> Result<bool> {
        let conn = self.db.lock()?;
        let exists: bool = conn
            .query_row(
                "SELECT 1 FROM schedules WHERE id = ?1",
                params![schedule_id],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if !exists {
            return Ok(false);
        }
        conn.execute(
            "INSERT INTO schedule_content_binding (schedule_id, content_id) VALUES (?1, ?2)
             ON CONFLICT(schedule_id) DO UPDATE SET content_id = excluded.content_id",
            params![schedule_id, content_id],
        )
        .map_err(|e| PostPilotError::Storage(format!("Bind content: {e}")))?;
        tracing::info!("Schedule #{schedule_id} now posts content #{content_id}");
        Ok(true)
    }

    /// Content currently bound to a slot, if any.
    pub fn bound_content(&self, schedule_id: i64) -> Result<Option<i64>> {
        let conn = self.db.lock()?;
        match conn.query_row(
            "SELECT content_id FROM schedule_content_binding WHERE schedule_id = ?1",
            params![schedule_id],
            |row| row.get(0),
        ) {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(PostPilotError::Storage(format!("Bound content: {e}"))),
        }
    }

    /// All slots a content item is bound to.
    pub fn bound_schedules(&self, content_id: i64) -> Result<Vec<i64>> {
        let conn = self.db.lock()?;
        let mut stmt = conn
            .prepare(
                "SELECT schedule_id FROM schedule_content_binding WHERE content_id = ?1
                 ORDER BY schedule_id",
            )
            .map_err(|e| PostPilotError::Storage(format!("Prepare: {e}")))?;
        let ids = stmt
            .query_map(params![content_id], |row| row.get(0))
            .map_err(|e| PostPilotError::Storage(format!("Query: {e}")))?
            .filter_map(|r| r.ok())
            .collect();
        Ok(ids)
    }
}
