//! Meeting record persistence.
//!
//! All state changes go through `set_state`, which enforces the transition
//! table; a row can never reach an illegal state through this module.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{ReferentError, Result};
use crate::meeting::{DocumentType, MeetingState};

/// A meeting row.
#[derive(Debug, Clone)]
pub struct MeetingRecord {
    pub id: i64,
    pub company_name: String,
    pub company_orgnr: Option<String>,
    pub company_address: Option<String>,
    pub meeting_datetime: String,
    pub meeting_location: String,
    pub chair_name: String,
    pub quorum_ok: bool,
    pub agenda_text: Option<String>,
    pub state: MeetingState,
    pub consent_confirmed: bool,
    pub consent_at: Option<String>,
    pub audio_path: Option<String>,
    pub transcript: Option<String>,
    pub words_json: Option<String>,
    pub diarization_json: Option<String>,
    pub minutes_content: Option<String>,
    pub actions_content: Option<String>,
    pub decisions_content: Option<String>,
    pub pdf_minutes_path: Option<String>,
    pub pdf_actions_path: Option<String>,
    pub pdf_decisions_path: Option<String>,
    /// Epoch seconds; set only for demo meetings.
    pub retention_until: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

impl MeetingRecord {
    pub fn content(&self, doc_type: DocumentType) -> Option<&str> {
        match doc_type {
            DocumentType::Minutes => self.minutes_content.as_deref(),
            DocumentType::Actions => self.actions_content.as_deref(),
            DocumentType::Decisions => self.decisions_content.as_deref(),
        }
    }

    pub fn pdf_path(&self, doc_type: DocumentType) -> Option<&str> {
        match doc_type {
            DocumentType::Minutes => self.pdf_minutes_path.as_deref(),
            DocumentType::Actions => self.pdf_actions_path.as_deref(),
            DocumentType::Decisions => self.pdf_decisions_path.as_deref(),
        }
    }
}

/// Fields supplied at meeting creation.
#[derive(Debug, Clone)]
pub struct NewMeeting {
    pub company_name: String,
    pub company_orgnr: Option<String>,
    pub company_address: Option<String>,
    pub meeting_datetime: String,
    pub meeting_location: String,
    pub chair_name: String,
    pub quorum_ok: bool,
    pub agenda_text: Option<String>,
    pub retention_until: Option<DateTime<Utc>>,
}

const COLUMNS: &str = "id, company_name, company_orgnr, company_address, meeting_datetime, \
     meeting_location, chair_name, quorum_ok, agenda_text, state, consent_confirmed, \
     consent_at, audio_path, transcript, words_json, diarization_json, minutes_content, \
     actions_content, decisions_content, pdf_minutes_path, pdf_actions_path, \
     pdf_decisions_path, retention_until, created_at, updated_at";

fn from_row(row: &Row<'_>) -> rusqlite::Result<MeetingRecord> {
    let state_str: String = row.get(9)?;
    Ok(MeetingRecord {
        id: row.get(0)?,
        company_name: row.get(1)?,
        company_orgnr: row.get(2)?,
        company_address: row.get(3)?,
        meeting_datetime: row.get(4)?,
        meeting_location: row.get(5)?,
        chair_name: row.get(6)?,
        quorum_ok: row.get(7)?,
        agenda_text: row.get(8)?,
        state: MeetingState::parse(&state_str).unwrap_or(MeetingState::Failed),
        consent_confirmed: row.get(10)?,
        consent_at: row.get(11)?,
        audio_path: row.get(12)?,
        transcript: row.get(13)?,
        words_json: row.get(14)?,
        diarization_json: row.get(15)?,
        minutes_content: row.get(16)?,
        actions_content: row.get(17)?,
        decisions_content: row.get(18)?,
        pdf_minutes_path: row.get(19)?,
        pdf_actions_path: row.get(20)?,
        pdf_decisions_path: row.get(21)?,
        retention_until: row.get(22)?,
        created_at: row.get(23)?,
        updated_at: row.get(24)?,
    })
}

/// Repository for meeting rows.
pub struct MeetingRepository;

impl MeetingRepository {
    pub fn insert(conn: &Connection, meeting: &NewMeeting) -> Result<i64> {
        conn.execute(
            "INSERT INTO meetings (company_name, company_orgnr, company_address, \
             meeting_datetime, meeting_location, chair_name, quorum_ok, agenda_text, \
             state, retention_until) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                meeting.company_name,
                meeting.company_orgnr,
                meeting.company_address,
                meeting.meeting_datetime,
                meeting.meeting_location,
                meeting.chair_name,
                meeting.quorum_ok,
                meeting.agenda_text,
                MeetingState::Created.as_str(),
                meeting.retention_until.map(|t| t.timestamp()),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn get(conn: &Connection, id: i64) -> Result<Option<MeetingRecord>> {
        let record = conn
            .query_row(
                &format!("SELECT {COLUMNS} FROM meetings WHERE id = ?1"),
                params![id],
                from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Like `get`, but a missing row is an error.
    pub fn require(conn: &Connection, id: i64) -> Result<MeetingRecord> {
        Self::get(conn, id)?
            .ok_or_else(|| ReferentError::NotFound(format!("Meeting {id} not found")))
    }

    /// Advance the state, enforcing the transition table.
    pub fn set_state(conn: &Connection, id: i64, next: MeetingState) -> Result<()> {
        let current = Self::require(conn, id)?.state;
        if !current.can_transition_to(next) {
            return Err(ReferentError::Precondition(format!(
                "Meeting {id}: illegal state transition {} -> {}",
                current.as_str(),
                next.as_str()
            )));
        }
        conn.execute(
            "UPDATE meetings SET state = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![next.as_str(), id],
        )?;
        Ok(())
    }

    /// Move a non-terminal meeting to `failed`. No-op if already terminal.
    pub fn mark_failed(conn: &Connection, id: i64) -> Result<()> {
        let current = Self::require(conn, id)?.state;
        if current.can_transition_to(MeetingState::Failed) {
            conn.execute(
                "UPDATE meetings SET state = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                params![MeetingState::Failed.as_str(), id],
            )?;
        }
        Ok(())
    }

    pub fn confirm_consent(
        conn: &Connection,
        id: i64,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET consent_confirmed = 1, consent_at = ?1, consent_ip = ?2, \
             consent_user_agent = ?3, updated_at = CURRENT_TIMESTAMP WHERE id = ?4",
            params![Utc::now().to_rfc3339(), ip, user_agent, id],
        )?;
        Ok(())
    }

    pub fn set_audio_path(conn: &Connection, id: i64, audio_path: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET audio_path = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
            params![audio_path, id],
        )?;
        Ok(())
    }

    pub fn set_diarization(conn: &Connection, id: i64, diarization_json: &str) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET diarization_json = ?1, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ?2",
            params![diarization_json, id],
        )?;
        Ok(())
    }

    pub fn set_transcript(
        conn: &Connection,
        id: i64,
        transcript: &str,
        words_json: Option<&str>,
    ) -> Result<()> {
        conn.execute(
            "UPDATE meetings SET transcript = ?1, words_json = ?2, \
             updated_at = CURRENT_TIMESTAMP WHERE id = ?3",
            params![transcript, words_json, id],
        )?;
        Ok(())
    }

    pub fn set_content(
        conn: &Connection,
        id: i64,
        doc_type: DocumentType,
        content: &str,
    ) -> Result<()> {
        let column = match doc_type {
            DocumentType::Minutes => "minutes_content",
            DocumentType::Actions => "actions_content",
            DocumentType::Decisions => "decisions_content",
        };
        conn.execute(
            &format!(
                "UPDATE meetings SET {column} = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2"
            ),
            params![content, id],
        )?;
        Ok(())
    }

    /// Record a rendered PDF path. Rejected while the corresponding content
    /// field is still empty.
    pub fn set_pdf_path(
        conn: &Connection,
        id: i64,
        doc_type: DocumentType,
        path: &str,
    ) -> Result<()> {
        let record = Self::require(conn, id)?;
        if record.content(doc_type).map_or(true, str::is_empty) {
            return Err(ReferentError::Precondition(format!(
                "Meeting {id}: no {} content to attach a PDF to",
                doc_type.as_str()
            )));
        }
        let column = match doc_type {
            DocumentType::Minutes => "pdf_minutes_path",
            DocumentType::Actions => "pdf_actions_path",
            DocumentType::Decisions => "pdf_decisions_path",
        };
        conn.execute(
            &format!(
                "UPDATE meetings SET {column} = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2"
            ),
            params![path, id],
        )?;
        Ok(())
    }

    /// Meetings whose retention deadline has passed. Null deadlines are
    /// never selected, regardless of age.
    pub fn expired(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<MeetingRecord>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM meetings \
             WHERE retention_until IS NOT NULL AND retention_until <= ?1"
        ))?;
        let rows = stmt.query_map(params![now.timestamp()], from_row)?;
        let mut meetings = Vec::new();
        for row in rows {
            meetings.push(row?);
        }
        Ok(meetings)
    }

    /// Delete the row; participants, shares and audit entries cascade.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        conn.execute("DELETE FROM meetings WHERE id = ?1", params![id])?;
        Ok(())
    }
}
