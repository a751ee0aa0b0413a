//! Retention sweeps.
//!
//! Demo meetings carry a `retention_until` deadline. Once it passes, the
//! sweep deletes the meeting's stored blobs and then the database row;
//! participants, shares and audit entries go with it via cascade. Blob
//! deletion is best effort per meeting so one bad path never wedges the
//! whole sweep.

use chrono::{DateTime, Utc};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::db::{AuditRepository, Database, MeetingRecord, MeetingRepository, ParticipantRepository};
use crate::error::Result;
use crate::storage::Storage;

pub struct RetentionReaper {
    db: Database,
    storage: Storage,
}

impl RetentionReaper {
    pub fn new(db: Database, storage: Storage) -> Self {
        Self { db, storage }
    }

    /// Delete every meeting whose retention deadline is at or before `now`.
    /// Returns how many rows were removed. A failure on one meeting is
    /// logged and the sweep moves on.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<usize> {
        let conn = self.db.conn()?;
        let expired = MeetingRepository::expired(&conn, now)?;
        if expired.is_empty() {
            return Ok(0);
        }
        info!("Retention sweep: {} meeting(s) past deadline", expired.len());

        let mut removed = 0;
        for meeting in expired {
            match self.reap_one(&conn, &meeting) {
                Ok(()) => removed += 1,
                Err(e) => error!("Could not reap meeting {}: {}", meeting.id, e),
            }
        }
        Ok(removed)
    }

    fn reap_one(&self, conn: &rusqlite::Connection, meeting: &MeetingRecord) -> Result<()> {
        let mut keys: Vec<String> = Vec::new();
        if let Some(audio) = &meeting.audio_path {
            keys.push(audio.clone());
        }
        for doc_type in crate::meeting::DocumentType::ALL {
            if let Some(pdf) = meeting.pdf_path(doc_type) {
                keys.push(pdf.to_string());
            }
        }
        for participant in ParticipantRepository::list_for_meeting(conn, meeting.id)? {
            if let Some(clip) = participant.enrollment_clip_path {
                keys.push(clip);
            }
        }

        for key in keys {
            if let Err(e) = self.storage.delete(&key) {
                warn!("Blob {} not deleted for meeting {}: {}", key, meeting.id, e);
            }
        }
        // Leftover chunks from an upload that never finalized.
        let _ = self
            .storage
            .delete_dir(&crate::assembler::AudioAssembler::chunk_dir_key(meeting.id));

        AuditRepository::log(
            conn,
            "retention.deleted",
            None,
            Some(json!({ "meeting_id": meeting.id, "company": meeting.company_name })),
        )?;
        MeetingRepository::delete(conn, meeting.id)?;
        info!("Reaped expired meeting {}", meeting.id);
        Ok(())
    }

    /// Periodic sweep loop; runs until the process exits.
    pub async fn run(self, interval_seconds: u64) {
        let mut ticker = tokio::time::interval(Duration::from_secs(interval_seconds.max(1)));
        loop {
            ticker.tick().await;
            match self.sweep(Utc::now()) {
                Ok(0) => {}
                Ok(n) => info!("Retention sweep removed {} meeting(s)", n),
                Err(e) => error!("Retention sweep failed: {}", e),
            }
        }
    }
}
