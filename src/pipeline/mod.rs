//! The processing pipeline.
//!
//! Once a meeting's audio is assembled, the orchestrator walks it through
//! diarization, transcription, speaker mapping, document generation and PDF
//! rendering. Each stage persists its output before the state advances, so a
//! crash leaves the last completed stage on record. A stage error flips the
//! meeting to failed and a later finalize call may retry it from the top;
//! validation and precondition failures surface to the caller without
//! touching the row.

pub mod speaker_map;

pub use speaker_map::{map_speakers, SpeakerTarget};

use serde_json::json;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::db::{AuditRepository, Database, MeetingRepository, ParticipantRepository};
use crate::error::{ReferentError, Result};
use crate::meeting::{DocumentType, MeetingState};
use crate::services::{Diarizer, DocumentGenerator, MeetingContext, PdfRenderer, Transcriber};
use crate::storage::Storage;

/// In-process advisory lock, one slot per meeting id. Prevents two finalize
/// calls from running the pipeline concurrently for the same meeting.
#[derive(Clone, Default)]
pub struct PipelineLock {
    running: Arc<Mutex<HashSet<i64>>>,
}

impl PipelineLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to claim the slot for a meeting. Returns `None` when a run is
    /// already in flight.
    pub fn acquire(&self, meeting_id: i64) -> Option<PipelineGuard> {
        let mut running = self.running.lock().ok()?;
        if !running.insert(meeting_id) {
            return None;
        }
        Some(PipelineGuard {
            running: Arc::clone(&self.running),
            meeting_id,
        })
    }
}

pub struct PipelineGuard {
    running: Arc<Mutex<HashSet<i64>>>,
    meeting_id: i64,
}

impl Drop for PipelineGuard {
    fn drop(&mut self) {
        if let Ok(mut running) = self.running.lock() {
            running.remove(&self.meeting_id);
        }
    }
}

pub struct ProcessingOrchestrator {
    db: Database,
    storage: Storage,
    diarizer: Arc<dyn Diarizer>,
    transcriber: Arc<dyn Transcriber>,
    generator: Arc<dyn DocumentGenerator>,
    pdf_renderer: Arc<dyn PdfRenderer>,
    lock: PipelineLock,
    language: String,
}

impl ProcessingOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        storage: Storage,
        diarizer: Arc<dyn Diarizer>,
        transcriber: Arc<dyn Transcriber>,
        generator: Arc<dyn DocumentGenerator>,
        pdf_renderer: Arc<dyn PdfRenderer>,
        lock: PipelineLock,
        language: String,
    ) -> Self {
        Self {
            db,
            storage,
            diarizer,
            transcriber,
            generator,
            pdf_renderer,
            lock,
            language,
        }
    }

    /// Run the full pipeline for one meeting. On stage failure the meeting is
    /// marked failed and the error is returned to the caller.
    pub async fn run(&self, meeting_id: i64) -> Result<()> {
        let _guard = self.lock.acquire(meeting_id).ok_or_else(|| {
            ReferentError::Precondition(format!(
                "Meeting {meeting_id} is already being processed"
            ))
        })?;

        match self.run_stages(meeting_id).await {
            Ok(()) => {
                info!("Meeting {} processed successfully", meeting_id);
                Ok(())
            }
            // Validation and precondition failures carry no side effects:
            // the meeting stays in its current state.
            Err(e @ (ReferentError::Validation(_) | ReferentError::Precondition(_))) => Err(e),
            Err(e) => {
                error!("Processing failed for meeting {}: {}", meeting_id, e);
                if let Ok(conn) = self.db.conn() {
                    if let Err(mark_err) = MeetingRepository::mark_failed(&conn, meeting_id) {
                        error!("Could not mark meeting {} failed: {}", meeting_id, mark_err);
                    }
                    let _ = AuditRepository::log(
                        &conn,
                        "processing.failed",
                        Some(meeting_id),
                        Some(json!({ "error": e.to_string() })),
                    );
                }
                Err(e)
            }
        }
    }

    async fn run_stages(&self, meeting_id: i64) -> Result<()> {
        let conn = self.db.conn()?;
        let meeting = MeetingRepository::require(&conn, meeting_id)?;
        let audio_key = meeting.audio_path.clone().ok_or_else(|| {
            ReferentError::Precondition(format!("Meeting {meeting_id} has no assembled audio"))
        })?;
        let audio_path = self.storage.path(&audio_key);
        drop(conn);

        // Stage 1: diarization.
        let conn = self.db.conn()?;
        MeetingRepository::set_state(&conn, meeting_id, MeetingState::Diarizing)?;
        drop(conn);
        info!("Diarizing meeting {}", meeting_id);
        let segments = self.diarizer.diarize(&audio_path).await?;
        let conn = self.db.conn()?;
        MeetingRepository::set_diarization(&conn, meeting_id, &serde_json::to_string(&segments)?)?;
        drop(conn);

        // Stage 2: transcription.
        let conn = self.db.conn()?;
        MeetingRepository::set_state(&conn, meeting_id, MeetingState::Transcribing)?;
        drop(conn);
        info!("Transcribing meeting {}", meeting_id);
        let transcription = self.transcriber.transcribe(&audio_path, &self.language).await?;
        let words_json = transcription
            .words
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let conn = self.db.conn()?;
        MeetingRepository::set_transcript(
            &conn,
            meeting_id,
            &transcription.text,
            words_json.as_deref(),
        )?;

        // Speaker mapping is advisory; it never fails the run.
        let participants = ParticipantRepository::list_for_meeting(&conn, meeting_id)?;
        if !segments.is_empty() && !participants.is_empty() {
            for (label, target) in map_speakers(&segments, &participants) {
                if let SpeakerTarget::Participant(pid) = target {
                    if let Err(e) = ParticipantRepository::set_speaker_label(&conn, pid, &label) {
                        warn!("Could not store speaker label for {}: {}", pid, e);
                    }
                }
            }
        }
        drop(conn);

        // Stage 3: documents.
        let conn = self.db.conn()?;
        MeetingRepository::set_state(&conn, meeting_id, MeetingState::Summarizing)?;
        // Stage outputs above may have changed the row; work from fresh data.
        let meeting = MeetingRepository::require(&conn, meeting_id)?;
        drop(conn);
        let context = MeetingContext::from_records(&meeting, &participants);

        for doc_type in DocumentType::ALL {
            info!("Generating {} for meeting {}", doc_type.as_str(), meeting_id);
            let content = self
                .generator
                .generate(doc_type, &context, &transcription.text, &segments)
                .await?;
            let conn = self.db.conn()?;
            MeetingRepository::set_content(&conn, meeting_id, doc_type, &content)?;
            drop(conn);

            let html = crate::services::pdf::sanitized_html(&content);
            let pdf_bytes = self.pdf_renderer.render(doc_type, &context, &html).await?;
            let key = format!(
                "pdf/{}_{}_{}.pdf",
                doc_type.as_str(),
                meeting_id,
                chrono::Utc::now().format("%Y%m%d_%H%M%S")
            );
            self.storage.put(&key, &pdf_bytes)?;
            let conn = self.db.conn()?;
            MeetingRepository::set_pdf_path(&conn, meeting_id, doc_type, &key)?;
            drop(conn);
        }

        let conn = self.db.conn()?;
        MeetingRepository::set_state(&conn, meeting_id, MeetingState::Ready)?;
        AuditRepository::log(&conn, "processing.completed", Some(meeting_id), None)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::DiarizationSegment;

    #[test]
    fn test_lock_excludes_same_meeting() {
        let lock = PipelineLock::new();
        let guard = lock.acquire(7);
        assert!(guard.is_some());
        assert!(lock.acquire(7).is_none());
        drop(guard);
        assert!(lock.acquire(7).is_some());
    }

    #[test]
    fn test_lock_independent_per_meeting() {
        let lock = PipelineLock::new();
        let _a = lock.acquire(1).unwrap();
        assert!(lock.acquire(2).is_some());
    }

    #[test]
    fn test_segment_duration_never_negative() {
        let seg = DiarizationSegment {
            start: 5.0,
            end: 3.0,
            speaker: "SPK00".to_string(),
        };
        assert_eq!(seg.duration(), 0.0);
    }
}
