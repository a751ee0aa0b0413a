//! SQLite persistence.
//!
//! Raw SQL with rusqlite, no ORM. Each table has a repository struct whose
//! functions take a `&Connection`; the `Database` handle owns the file path
//! and opens short-lived connections on demand.

pub mod audit;
pub mod meetings;
pub mod participants;
pub mod shares;

pub use audit::AuditRepository;
pub use meetings::{MeetingRecord, MeetingRepository, NewMeeting};
pub use participants::{NewParticipant, ParticipantRecord, ParticipantRepository};
pub use shares::{ShareRecord, ShareRepository};

use crate::error::Result;
use rusqlite::Connection;
use std::path::PathBuf;

/// Handle to the SQLite database file.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn open_default() -> anyhow::Result<Self> {
        let path = crate::global::db_file()?;
        Ok(Self::open(path)?)
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let db = Self { path: path.into() };
        // Run migrations eagerly so startup fails fast on a broken file.
        db.conn()?;
        Ok(db)
    }

    pub fn conn(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migrate(&conn)?;
        Ok(conn)
    }
}

pub fn migrate(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS meetings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            company_name TEXT NOT NULL,
            company_orgnr TEXT,
            company_address TEXT,
            meeting_datetime TEXT NOT NULL,
            meeting_location TEXT NOT NULL,
            chair_name TEXT NOT NULL,
            quorum_ok INTEGER NOT NULL DEFAULT 1,
            agenda_text TEXT,
            state TEXT NOT NULL DEFAULT 'created',
            consent_confirmed INTEGER NOT NULL DEFAULT 0,
            consent_at TEXT,
            consent_ip TEXT,
            consent_user_agent TEXT,
            audio_path TEXT,
            transcript TEXT,
            words_json TEXT,
            diarization_json TEXT,
            minutes_content TEXT,
            actions_content TEXT,
            decisions_content TEXT,
            pdf_minutes_path TEXT,
            pdf_actions_path TEXT,
            pdf_decisions_path TEXT,
            retention_until INTEGER,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_state ON meetings(state)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_meetings_retention
         ON meetings(retention_until) WHERE retention_until IS NOT NULL",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS participants (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            role TEXT NOT NULL,
            email TEXT,
            is_board_member INTEGER NOT NULL DEFAULT 0,
            is_present INTEGER NOT NULL DEFAULT 1,
            speaker_label TEXT,
            enrollment_clip_path TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_participants_meeting ON participants(meeting_id)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS shares (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER NOT NULL REFERENCES meetings(id) ON DELETE CASCADE,
            token TEXT NOT NULL UNIQUE,
            audience TEXT NOT NULL,
            expires_at INTEGER,
            opened_count INTEGER NOT NULL DEFAULT 0,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            meeting_id INTEGER REFERENCES meetings(id) ON DELETE CASCADE,
            action TEXT NOT NULL,
            meta_json TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    Ok(())
}

#[cfg(test)]
pub(crate) fn test_conn() -> Connection {
    let conn = Connection::open_in_memory().unwrap();
    conn.pragma_update(None, "foreign_keys", true).unwrap();
    migrate(&conn).unwrap();
    conn
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrate_creates_tables() {
        let conn = test_conn();
        for table in ["meetings", "participants", "shares", "audit_log"] {
            let count: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 1, "missing table {}", table);
        }
    }

    #[test]
    fn test_migrate_is_idempotent() {
        let conn = test_conn();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
    }
}
