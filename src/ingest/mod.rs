//! Chunk upload ingestion.
//!
//! Accepts one sequence-numbered audio fragment at a time, persists it under
//! the meeting's chunk directory and, on the final chunk, synchronously
//! hands the whole set to the assembler.

use rusqlite::Connection;
use tracing::info;

use crate::assembler::AudioAssembler;
use crate::db::MeetingRepository;
use crate::error::{ReferentError, Result};
use crate::meeting::MeetingState;
use crate::storage::Storage;

pub const MAX_SEQUENCE: u32 = 10_000;
pub const MAX_CHUNK_BYTES: usize = 10 * 1024 * 1024;

/// Extensions accepted as-is; anything else is coerced to webm.
const ALLOWED_EXTENSIONS: [&str; 5] = ["webm", "ogg", "mp4", "wav", "mp3"];

/// Outcome of one accepted chunk upload.
#[derive(Debug)]
pub struct StoredChunk {
    pub seq: u32,
    pub key: String,
    /// Storage key of the assembled audio, set when this was the last chunk.
    pub assembled_key: Option<String>,
}

pub struct ChunkStore {
    storage: Storage,
    assembler: AudioAssembler,
}

impl ChunkStore {
    pub fn new(storage: Storage, assembler: AudioAssembler) -> Self {
        Self { storage, assembler }
    }

    /// Validate and persist one uploaded chunk.
    ///
    /// Preconditions are checked in a fixed order: meeting exists, state
    /// accepts uploads, consent confirmed, sniffed media type allowed,
    /// sequence and size within bounds. A duplicate sequence number silently
    /// overwrites the previous chunk (last write wins; concurrent uploads of
    /// the same index race, which is accepted).
    pub fn store_chunk(
        &self,
        conn: &Connection,
        meeting_id: i64,
        seq: u32,
        is_last: bool,
        filename: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredChunk> {
        let meeting = MeetingRepository::require(conn, meeting_id)?;

        if !meeting.state.accepts_uploads() {
            return Err(ReferentError::Precondition(format!(
                "Meeting {} is not in an uploadable state (current: {})",
                meeting_id,
                meeting.state.as_str()
            )));
        }

        if !meeting.consent_confirmed {
            return Err(ReferentError::ConsentRequired);
        }

        if sniff_media_type(bytes).is_none() {
            return Err(ReferentError::Validation(
                "Uploaded chunk is not a recognized audio/video container".to_string(),
            ));
        }

        if seq > MAX_SEQUENCE {
            return Err(ReferentError::Validation(format!(
                "Sequence number {seq} exceeds maximum {MAX_SEQUENCE}"
            )));
        }

        if bytes.is_empty() || bytes.len() > MAX_CHUNK_BYTES {
            return Err(ReferentError::Validation(format!(
                "Chunk size {} outside accepted range (1..={MAX_CHUNK_BYTES} bytes)",
                bytes.len()
            )));
        }

        if meeting.state == MeetingState::Created {
            MeetingRepository::set_state(conn, meeting_id, MeetingState::Uploading)?;
        }

        let extension = sanitize_extension(filename);
        let key = format!(
            "{}/chunk_{:05}.{}",
            AudioAssembler::chunk_dir_key(meeting_id),
            seq,
            extension
        );
        self.storage.put(&key, bytes)?;

        info!(
            "Stored chunk {} for meeting {} ({} bytes, last: {})",
            seq,
            meeting_id,
            bytes.len(),
            is_last
        );

        let assembled_key = if is_last {
            Some(self.assembler.assemble(conn, meeting_id)?)
        } else {
            None
        };

        Ok(StoredChunk {
            seq,
            key,
            assembled_key,
        })
    }

    /// Assemble without a final chunk marker; used by finalize when the
    /// client never sent `is_last`.
    pub fn assemble(&self, conn: &Connection, meeting_id: i64) -> Result<String> {
        self.assembler.assemble(conn, meeting_id)
    }
}

/// Keep the client's extension only when it is on the allow-list; coerce
/// everything else to the default container.
fn sanitize_extension(filename: Option<&str>) -> &'static str {
    let ext = filename
        .and_then(|name| name.rsplit('.').next())
        .map(|e| e.to_lowercase());
    match ext.as_deref() {
        Some(e) => ALLOWED_EXTENSIONS
            .iter()
            .find(|allowed| **allowed == e)
            .copied()
            .unwrap_or("webm"),
        None => "webm",
    }
}

/// Sniff the container type from magic bytes. Returns the canonical media
/// type for allow-listed containers, None for everything else.
fn sniff_media_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        // EBML header: WebM or Matroska.
        return Some("audio/webm");
    }
    if bytes.starts_with(b"OggS") {
        return Some("audio/ogg");
    }
    if bytes.starts_with(b"RIFF") && &bytes[8..12] == b"WAVE" {
        return Some("audio/wav");
    }
    if &bytes[4..8] == b"ftyp" {
        return Some("audio/mp4");
    }
    if bytes.starts_with(b"ID3") || (bytes[0] == 0xFF && bytes[1] & 0xE0 == 0xE0) {
        return Some("audio/mpeg");
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::tests::sample_meeting;
    use crate::db::test_conn;

    const WEBM_MAGIC: &[u8] = &[0x1A, 0x45, 0xDF, 0xA3, 0, 0, 0, 0, 0, 0, 0, 0];

    fn setup() -> (tempfile::TempDir, ChunkStore, Connection, i64) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let assembler = AudioAssembler::new(storage.clone(), "ffmpeg".to_string(), false);
        let store = ChunkStore::new(storage, assembler);

        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();
        MeetingRepository::confirm_consent(&conn, id, None, None).unwrap();
        (dir, store, conn, id)
    }

    #[test]
    fn test_first_chunk_transitions_to_uploading() {
        let (_dir, store, conn, id) = setup();

        let stored = store
            .store_chunk(&conn, id, 0, false, Some("blob.webm"), WEBM_MAGIC)
            .unwrap();
        assert_eq!(stored.seq, 0);
        assert!(stored.assembled_key.is_none());
        assert_eq!(
            MeetingRepository::require(&conn, id).unwrap().state,
            MeetingState::Uploading
        );
    }

    #[test]
    fn test_missing_meeting() {
        let (_dir, store, conn, _id) = setup();
        let err = store.store_chunk(&conn, 999, 0, false, None, WEBM_MAGIC);
        assert!(matches!(err, Err(ReferentError::NotFound(_))));
    }

    #[test]
    fn test_consent_required() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let assembler = AudioAssembler::new(storage.clone(), "ffmpeg".to_string(), false);
        let store = ChunkStore::new(storage, assembler);
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        let err = store.store_chunk(&conn, id, 0, false, None, WEBM_MAGIC);
        assert!(matches!(err, Err(ReferentError::ConsentRequired)));
        // No state mutation on rejection.
        assert_eq!(
            MeetingRepository::require(&conn, id).unwrap().state,
            MeetingState::Created
        );
    }

    #[test]
    fn test_rejects_wrong_state() {
        let (_dir, store, conn, id) = setup();
        MeetingRepository::set_state(&conn, id, MeetingState::Uploading).unwrap();
        MeetingRepository::set_state(&conn, id, MeetingState::Diarizing).unwrap();

        let err = store.store_chunk(&conn, id, 0, false, None, WEBM_MAGIC);
        assert!(matches!(err, Err(ReferentError::Precondition(_))));
    }

    #[test]
    fn test_rejects_unknown_content() {
        let (_dir, store, conn, id) = setup();
        let err = store.store_chunk(&conn, id, 0, false, None, b"<html>not audio</html>");
        assert!(matches!(err, Err(ReferentError::Validation(_))));
    }

    #[test]
    fn test_rejects_out_of_range_sequence() {
        let (_dir, store, conn, id) = setup();
        let err = store.store_chunk(&conn, id, MAX_SEQUENCE + 1, false, None, WEBM_MAGIC);
        assert!(matches!(err, Err(ReferentError::Validation(_))));
    }

    #[test]
    fn test_duplicate_sequence_overwrites() {
        let (dir, store, conn, id) = setup();
        let storage = Storage::new(dir.path());

        let mut second = WEBM_MAGIC.to_vec();
        second.extend_from_slice(b"v2");

        store
            .store_chunk(&conn, id, 3, false, Some("a.webm"), WEBM_MAGIC)
            .unwrap();
        let stored = store
            .store_chunk(&conn, id, 3, false, Some("a.webm"), &second)
            .unwrap();

        assert_eq!(storage.get(&stored.key).unwrap(), second);
    }

    #[test]
    fn test_sanitize_extension() {
        assert_eq!(sanitize_extension(Some("chunk.ogg")), "ogg");
        assert_eq!(sanitize_extension(Some("chunk.WAV")), "wav");
        assert_eq!(sanitize_extension(Some("chunk.exe")), "webm");
        assert_eq!(sanitize_extension(Some("no-extension")), "webm");
        assert_eq!(sanitize_extension(None), "webm");
    }

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(WEBM_MAGIC), Some("audio/webm"));
        assert_eq!(
            sniff_media_type(b"OggS\x00\x00\x00\x00\x00\x00\x00\x00"),
            Some("audio/ogg")
        );
        assert_eq!(
            sniff_media_type(b"RIFF\x24\x00\x00\x00WAVEfmt "),
            Some("audio/wav")
        );
        assert_eq!(
            sniff_media_type(b"\x00\x00\x00\x20ftypisom\x00\x00\x02\x00"),
            Some("audio/mp4")
        );
        assert_eq!(
            sniff_media_type(b"ID3\x04\x00\x00\x00\x00\x00\x00\x00\x00"),
            Some("audio/mpeg")
        );
        assert_eq!(sniff_media_type(b"plain text here"), None);
        assert_eq!(sniff_media_type(b"short"), None);
    }
}
