//! Participant persistence.
//!
//! Rows are created at meeting creation or via the add-participants
//! operation and are never mutated afterwards, except to assign a speaker
//! label once the mapping heuristic has run.

use rusqlite::{params, Connection, Row};

use crate::error::Result;
use crate::meeting::Role;

#[derive(Debug, Clone)]
pub struct ParticipantRecord {
    pub id: i64,
    pub meeting_id: i64,
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub is_board_member: bool,
    pub is_present: bool,
    pub speaker_label: Option<String>,
    pub enrollment_clip_path: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewParticipant {
    pub name: String,
    pub role: Role,
    pub email: Option<String>,
    pub is_present: bool,
}

fn from_row(row: &Row<'_>) -> rusqlite::Result<ParticipantRecord> {
    let role_str: String = row.get(3)?;
    Ok(ParticipantRecord {
        id: row.get(0)?,
        meeting_id: row.get(1)?,
        name: row.get(2)?,
        role: Role::parse(&role_str).unwrap_or(Role::Observer),
        email: row.get(4)?,
        is_board_member: row.get(5)?,
        is_present: row.get(6)?,
        speaker_label: row.get(7)?,
        enrollment_clip_path: row.get(8)?,
    })
}

pub struct ParticipantRepository;

impl ParticipantRepository {
    pub fn insert(conn: &Connection, meeting_id: i64, participant: &NewParticipant) -> Result<i64> {
        conn.execute(
            "INSERT INTO participants (meeting_id, name, role, email, is_board_member, \
             is_present) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                meeting_id,
                participant.name,
                participant.role.as_str(),
                participant.email,
                participant.role.is_board_member(),
                participant.is_present,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list_for_meeting(conn: &Connection, meeting_id: i64) -> Result<Vec<ParticipantRecord>> {
        let mut stmt = conn.prepare(
            "SELECT id, meeting_id, name, role, email, is_board_member, is_present, \
             speaker_label, enrollment_clip_path \
             FROM participants WHERE meeting_id = ?1 ORDER BY id",
        )?;
        let rows = stmt.query_map(params![meeting_id], from_row)?;
        let mut participants = Vec::new();
        for row in rows {
            participants.push(row?);
        }
        Ok(participants)
    }

    pub fn set_speaker_label(conn: &Connection, participant_id: i64, label: &str) -> Result<()> {
        conn.execute(
            "UPDATE participants SET speaker_label = ?1 WHERE id = ?2",
            params![label, participant_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::tests::sample_meeting;
    use crate::db::{test_conn, MeetingRepository};

    fn participant(name: &str, role: Role) -> NewParticipant {
        NewParticipant {
            name: name.to_string(),
            role,
            email: None,
            is_present: true,
        }
    }

    #[test]
    fn test_insert_derives_board_membership() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        ParticipantRepository::insert(&conn, meeting_id, &participant("Kari", Role::Chair))
            .unwrap();
        ParticipantRepository::insert(&conn, meeting_id, &participant("Ola", Role::Observer))
            .unwrap();

        let list = ParticipantRepository::list_for_meeting(&conn, meeting_id).unwrap();
        assert_eq!(list.len(), 2);
        assert!(list[0].is_board_member);
        assert!(!list[1].is_board_member);
        assert!(list.iter().all(|p| p.speaker_label.is_none()));
    }

    #[test]
    fn test_set_speaker_label() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        let pid = ParticipantRepository::insert(
            &conn,
            meeting_id,
            &participant("Kari", Role::Chair),
        )
        .unwrap();

        ParticipantRepository::set_speaker_label(&conn, pid, "SPK00").unwrap();
        let list = ParticipantRepository::list_for_meeting(&conn, meeting_id).unwrap();
        assert_eq!(list[0].speaker_label.as_deref(), Some("SPK00"));
    }

    #[test]
    fn test_cascade_delete_with_meeting() {
        let conn = test_conn();
        let meeting_id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        ParticipantRepository::insert(&conn, meeting_id, &participant("Kari", Role::Chair))
            .unwrap();

        MeetingRepository::delete(&conn, meeting_id).unwrap();
        let list = ParticipantRepository::list_for_meeting(&conn, meeting_id).unwrap();
        assert!(list.is_empty());
    }
}
