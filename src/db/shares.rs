//! Share link persistence.
//!
//! Rows are immutable after creation except for the opened counter.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::share::Audience;

#[derive(Debug, Clone)]
pub struct ShareRecord {
    pub id: i64,
    pub meeting_id: i64,
    pub token: String,
    pub audience: Audience,
    /// Epoch seconds; null means the link never expires.
    pub expires_at: Option<i64>,
    pub opened_count: i64,
    pub created_at: String,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ShareRecord> {
    let audience_str: String = row.get(3)?;
    Ok(ShareRecord {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        token: row.get(2)?,
        audience: Audience::parse(&audience_str).unwrap_or(Audience::Minutes),
        expires_at: row.get(4)?,
        opened_count: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub struct ShareRepository;

impl ShareRepository {
    pub fn insert(
        conn: &Connection,
        meeting_id: i64,
        token: &str,
        audience: Audience,
        expires_at: Option<i64>,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO shares (meeting_id, token, audience, expires_at) \
             VALUES (?1, ?2, ?3, ?4)",
            params![meeting_id, token, audience.as_str(), expires_at],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get_by_token(conn: &Connection, token: &str) -> Result<Option<ShareRecord>> {
        let record = conn
            .query_row(
                "SELECT id, meeting_id, token, audience, expires_at, opened_count, created_at \
                 FROM shares WHERE token = ?1",
                params![token],
                from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Best-effort view counter; not atomic with the read.
    pub fn increment_opened(conn: &Connection, id: i64) -> Result<()> {
        conn.execute(
            "UPDATE shares SET opened_count = opened_count + 1 WHERE id = ?1",
            params![id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::tests::sample_meeting;
    use crate::db::{test_conn, MeetingRepository};

    #[test]
    fn test_insert_and_get_by_token() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        ShareRepository::insert(&conn, meeting_id, "tok-1", Audience::All, None).unwrap();

        let share = ShareRepository::get_by_token(&conn, "tok-1").unwrap().unwrap();
        assert_eq!(share.meeting_id, meeting_id);
        assert_eq!(share.audience, Audience::All);
        assert_eq!(share.opened_count, 0);
        assert!(share.expires_at.is_none());

        assert!(ShareRepository::get_by_token(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_token_uniqueness() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        ShareRepository::insert(&conn, meeting_id, "tok-1", Audience::Minutes, None).unwrap();
        let dup = ShareRepository::insert(&conn, meeting_id, "tok-1", Audience::Actions, None);
        assert!(dup.is_err());
    }

    #[test]
    fn test_increment_opened() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        let id = ShareRepository::insert(&conn, meeting_id, "tok", Audience::Minutes, None)
            .unwrap();

        ShareRepository::increment_opened(&conn, id).unwrap();
        ShareRepository::increment_opened(&conn, id).unwrap();

        let share = ShareRepository::get_by_token(&conn, "tok").unwrap().unwrap();
        assert_eq!(share.opened_count, 2);
    }
}
