//! Append-only audit trail.

use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub id: i64,
    pub meeting_id: Option<i64>,
    pub action: String,
    pub meta_json: Option<String>,
    pub created_at: String,
}

pub struct AuditRepository;

impl AuditRepository {
    pub fn log(
        conn: &Connection,
        action: &str,
        meeting_id: Option<i64>,
        meta: Option<Value>,
    ) -> Result<()> {
        conn.execute(
            "INSERT INTO audit_log (meeting_id, action, meta_json) VALUES (?1, ?2, ?3)",
            params![meeting_id, action, meta.map(|m| m.to_string())],
        )?;
        Ok(())
    }

    pub fn list_for_meeting(conn: &Connection, meeting_id: i64) -> Result<Vec<AuditEntry>> {
        let mut stmt = conn.prepare(
            "SELECT id, meeting_id, action, meta_json, created_at \
             FROM audit_log WHERE meeting_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![meeting_id], |row| {
            Ok(AuditEntry {
                id: row.get(0)?,
                meeting_id: row.get(1)?,
                action: row.get(2)?,
                meta_json: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::tests::sample_meeting;
    use crate::db::{test_conn, MeetingRepository};
    use serde_json::json;

    #[test]
    fn test_log_and_list() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        AuditRepository::log(&conn, "meeting.created", Some(meeting_id), None).unwrap();
        AuditRepository::log(
            &conn,
            "audio.uploaded",
            Some(meeting_id),
            Some(json!({"chunk_count": 3, "file_size": 1024})),
        )
        .unwrap();

        let entries = AuditRepository::list_for_meeting(&conn, meeting_id).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].action, "meeting.created");
        assert!(entries[1].meta_json.as_deref().unwrap().contains("chunk_count"));
    }

    #[test]
    fn test_cascade_delete_with_meeting() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        AuditRepository::log(&conn, "meeting.created", Some(meeting_id), None).unwrap();

        MeetingRepository::delete(&conn, meeting_id).unwrap();
        assert!(AuditRepository::list_for_meeting(&conn, meeting_id)
            .unwrap()
            .is_empty());
    }
}
