//! Shared SQLite handle — open, pragmas, and migration-less schema init.

use chrono::{DateTime, NaiveDateTime, Utc};
use postpilot_core::error::{PostPilotError, Result};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Cloneable handle to the process-wide SQLite connection. One writer
/// process owns the file; every store operation is a short transaction
/// under the connection mutex.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)
            .map_err(|e| PostPilotError::Storage(format!("DB open: {e}")))?;

        // WAL allows concurrent readers and avoids "database is locked".
        // foreign_keys is pinned OFF to match SQLite's standard default, which
        // the bundled build otherwise overrides (SQLITE_DEFAULT_FOREIGN_KEYS=1).
        conn.execute_batch(
            "PRAGMA foreign_keys = OFF;
             PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )
        .map_err(|e| PostPilotError::Storage(format!("DB pragma: {e}")))?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        tracing::info!("Database ready: {}", path.display());
        Ok(db)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| PostPilotError::Storage(format!("DB open: {e}")))?;
        // Match SQLite's standard default; the bundled build defaults it ON.
        conn.execute_batch("PRAGMA foreign_keys = OFF;")
            .map_err(|e| PostPilotError::Storage(format!("DB pragma: {e}")))?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Lock the connection for a store operation.
    pub(crate) fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| PostPilotError::Storage(format!("DB lock: {e}")))
    }

    /// Create tables if they do not exist.
    fn migrate(&self) -> Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER UNIQUE NOT NULL,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS admins (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_id INTEGER UNIQUE NOT NULL,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                added_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS content (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_type TEXT NOT NULL CHECK(content_type IN ('photo', 'video', 'text')),
                file_id TEXT,
                text TEXT,
                caption TEXT,
                status TEXT NOT NULL DEFAULT 'active' CHECK(status IN ('active', 'deleted')),
                publishing_enabled INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                created_by INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schedules (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                time_str TEXT NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            -- One bound content item per schedule slot; upsert replaces.
            CREATE TABLE IF NOT EXISTS schedule_content_binding (
                schedule_id INTEGER PRIMARY KEY,
                content_id INTEGER NOT NULL,
                FOREIGN KEY (schedule_id) REFERENCES schedules(id),
                FOREIGN KEY (content_id) REFERENCES content(id)
            );

            -- Append-only; never mutated or deleted.
            CREATE TABLE IF NOT EXISTS posts_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content_id INTEGER NOT NULL,
                chat_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                posted_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (content_id) REFERENCES content(id)
            );

            CREATE TABLE IF NOT EXISTS leads (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                telegram_user_id INTEGER NOT NULL,
                message_text TEXT NOT NULL,
                source_content_id INTEGER,
                status TEXT NOT NULL DEFAULT 'pending' CHECK(status IN ('pending', 'taken')),
                taken_by_telegram_id INTEGER,
                answered INTEGER NOT NULL DEFAULT 0,
                answered_at TIMESTAMP,
                phone_number TEXT,
                created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id),
                FOREIGN KEY (source_content_id) REFERENCES content(id)
            );

            CREATE TABLE IF NOT EXISTS settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT UNIQUE NOT NULL,
                value TEXT NOT NULL,
                updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE UNIQUE INDEX IF NOT EXISTS idx_schedules_time ON schedules(time_str);
            CREATE INDEX IF NOT EXISTS idx_content_status ON content(status);
            CREATE INDEX IF NOT EXISTS idx_leads_status ON leads(status);
            CREATE INDEX IF NOT EXISTS idx_leads_user_created ON leads(telegram_user_id, created_at);
            CREATE INDEX IF NOT EXISTS idx_posts_log_content ON posts_log(content_id);
        ",
        )
        .map_err(|e| PostPilotError::Storage(format!("Migration: {e}")))?;

        // Column back-fills for databases created before these fields existed
        // (safe to fail when the column is already there)
        let alter_stmts = [
            "ALTER TABLE content ADD COLUMN publishing_enabled INTEGER NOT NULL DEFAULT 1",
            "ALTER TABLE leads ADD COLUMN answered INTEGER NOT NULL DEFAULT 0",
            "ALTER TABLE leads ADD COLUMN answered_at TIMESTAMP",
            "ALTER TABLE leads ADD COLUMN phone_number TEXT",
        ];
        for stmt in &alter_stmts {
            let _ = conn.execute(stmt, []);
        }

        Ok(())
    }
}

/// Parse a SQLite timestamp ("YYYY-MM-DD HH:MM:SS" from CURRENT_TIMESTAMP,
/// RFC 3339 as fallback) into a UTC datetime.
pub(crate) fn parse_ts(raw: &str) -> DateTime<Utc> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return naive.and_utc();
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Format a UTC datetime the way SQLite's CURRENT_TIMESTAMP does, so string
/// comparison against stored values is reliable.
pub(crate) fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}
