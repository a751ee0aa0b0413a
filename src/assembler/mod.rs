//! Chunk reassembly.
//!
//! Merges the stored chunk files of one meeting into a single playable
//! audio file. Concatenation is delegated to ffmpeg's concat demuxer, driven
//! by a generated playlist file. WAV input is re-encoded to mono/16 kHz/
//! 16-bit PCM (the contract expected by the transcription service); other
//! containers are stream-copied.
//!
//! When ffmpeg fails, a raw byte concatenation can take over, but only when
//! explicitly enabled: it is only byte-correct for containers without
//! per-file headers, so the output is not guaranteed playable. The audit
//! entry records which path produced the file.

use regex::Regex;
use rusqlite::Connection;
use serde_json::json;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tracing::{error, info, warn};

use crate::db::{AuditRepository, MeetingRepository};
use crate::error::{ReferentError, Result};
use crate::storage::Storage;

/// How the assembled file was produced, recorded in the audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConcatMethod {
    Ffmpeg,
    ByteConcat,
}

impl ConcatMethod {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Ffmpeg => "ffmpeg",
            Self::ByteConcat => "byte-concat",
        }
    }
}

pub struct AudioAssembler {
    storage: Storage,
    ffmpeg_path: String,
    allow_lossy_fallback: bool,
}

impl AudioAssembler {
    pub fn new(storage: Storage, ffmpeg_path: String, allow_lossy_fallback: bool) -> Self {
        Self {
            storage,
            ffmpeg_path,
            allow_lossy_fallback,
        }
    }

    pub fn chunk_dir_key(meeting_id: i64) -> String {
        format!("audio/chunks/{meeting_id}")
    }

    /// Assemble all stored chunks for a meeting into one audio file.
    ///
    /// On success the chunk directory is deleted, `audio_path` is set and an
    /// audit entry is written. On failure `audio_path` stays unset.
    pub fn assemble(&self, conn: &Connection, meeting_id: i64) -> Result<String> {
        let chunk_dir = Self::chunk_dir_key(meeting_id);
        let mut chunks = self.storage.list_dir(&chunk_dir)?;

        if chunks.is_empty() {
            return Err(ReferentError::Assembly(format!(
                "No audio chunks found for meeting {meeting_id}"
            )));
        }

        sort_chunks(&mut chunks);
        info!(
            "Assembling {} chunks for meeting {}",
            chunks.len(),
            meeting_id
        );

        // The first chunk's container decides the output format. Uncompressed
        // WAV gets re-encoded to the transcriber's expected format; everything
        // else is stream-copied as-is.
        let is_wav = chunks[0].to_lowercase().ends_with(".wav");
        let final_ext = if is_wav { "wav" } else { "webm" };
        let final_key = format!(
            "audio/meeting_{}_{}.{}",
            meeting_id,
            chrono::Utc::now().format("%Y%m%d_%H%M%S"),
            final_ext
        );

        let chunk_paths: Vec<PathBuf> = chunks
            .iter()
            .map(|name| self.storage.path(&format!("{chunk_dir}/{name}")))
            .collect();
        let output = self.storage.path(&final_key);
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let method = self.concatenate(&chunk_paths, &output, meeting_id, is_wav)?;

        if !output.exists() || std::fs::metadata(&output)?.len() == 0 {
            let _ = std::fs::remove_file(&output);
            return Err(ReferentError::Assembly(
                "Audio assembly produced empty or missing file".to_string(),
            ));
        }

        self.storage.delete_dir(&chunk_dir)?;
        MeetingRepository::set_audio_path(conn, meeting_id, &final_key)?;
        AuditRepository::log(
            conn,
            "audio.uploaded",
            Some(meeting_id),
            Some(json!({
                "chunk_count": chunks.len(),
                "file_size": std::fs::metadata(&output)?.len(),
                "method": method.as_str(),
            })),
        )?;

        Ok(final_key)
    }

    /// Run ffmpeg over a generated playlist; fall back to raw byte
    /// concatenation when allowed.
    fn concatenate(
        &self,
        chunks: &[PathBuf],
        output: &PathBuf,
        meeting_id: i64,
        is_wav: bool,
    ) -> Result<ConcatMethod> {
        for chunk in chunks {
            if !chunk.exists() {
                return Err(ReferentError::Assembly(format!(
                    "Chunk file not found: {}",
                    chunk.display()
                )));
            }
        }

        let playlist_path = std::env::temp_dir().join(format!("referent_concat_{meeting_id}.txt"));
        std::fs::write(&playlist_path, playlist(chunks))?;

        let mut cmd = Command::new(&self.ffmpeg_path);
        cmd.args(["-f", "concat", "-safe", "0", "-i"])
            .arg(&playlist_path);
        if is_wav {
            // Whisper contract: mono, 16 kHz, 16-bit linear PCM.
            cmd.args(["-ar", "16000", "-ac", "1", "-c:a", "pcm_s16le"]);
        } else {
            cmd.args(["-c", "copy"]);
        }
        cmd.arg("-y").arg(output);

        let result = cmd.output();
        let _ = std::fs::remove_file(&playlist_path);

        match result {
            Ok(out) if out.status.success() => Ok(ConcatMethod::Ffmpeg),
            Ok(out) => {
                error!(
                    "ffmpeg concatenation failed for meeting {} (status {}): {}",
                    meeting_id,
                    out.status,
                    String::from_utf8_lossy(&out.stderr).trim()
                );
                self.byte_concat_fallback(chunks, output, meeting_id)
            }
            Err(e) => {
                error!("Failed to run ffmpeg for meeting {}: {}", meeting_id, e);
                self.byte_concat_fallback(chunks, output, meeting_id)
            }
        }
    }

    fn byte_concat_fallback(
        &self,
        chunks: &[PathBuf],
        output: &PathBuf,
        meeting_id: i64,
    ) -> Result<ConcatMethod> {
        if !self.allow_lossy_fallback {
            // ffmpeg may have left a partial output behind (-y truncates
            // before it fails); don't leave it around.
            let _ = std::fs::remove_file(output);
            return Err(ReferentError::Assembly(format!(
                "ffmpeg concatenation failed for meeting {meeting_id} and lossy fallback is disabled"
            )));
        }

        warn!(
            "Falling back to byte concatenation for meeting {} (output may not be playable)",
            meeting_id
        );

        let mut file = std::fs::File::create(output)?;
        for chunk in chunks {
            match std::fs::read(chunk) {
                Ok(bytes) => file.write_all(&bytes)?,
                Err(e) => {
                    error!("Cannot read chunk {}: {}", chunk.display(), e);
                }
            }
        }
        Ok(ConcatMethod::ByteConcat)
    }
}

/// Sort chunk file names by the numeric sequence parsed out of them.
/// Names that do not match the pattern sort as sequence 0; ties keep their
/// original enumeration order.
fn sort_chunks(names: &mut [String]) {
    let pattern = Regex::new(r"chunk_(\d+)\.\w+$").unwrap();
    names.sort_by_key(|name| {
        pattern
            .captures(name)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
            .unwrap_or(0)
    });
}

/// ffmpeg concat demuxer playlist: one quoted absolute path per line,
/// single quotes escaped for the demuxer's quoting rules.
fn playlist(chunks: &[PathBuf]) -> String {
    let mut content = String::new();
    for chunk in chunks {
        let escaped = chunk.to_string_lossy().replace('\'', "'\\''");
        content.push_str(&format!("file '{}'\n", escaped));
    }
    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::meetings::tests::sample_meeting;
    use crate::db::test_conn;

    #[test]
    fn test_sort_chunks_numeric_not_lexicographic() {
        let mut names = vec![
            "chunk_00010.webm".to_string(),
            "chunk_00002.webm".to_string(),
            "chunk_00000.webm".to_string(),
        ];
        sort_chunks(&mut names);
        assert_eq!(
            names,
            vec!["chunk_00000.webm", "chunk_00002.webm", "chunk_00010.webm"]
        );
    }

    #[test]
    fn test_sort_chunks_unparseable_ties_to_front_stably() {
        let mut names = vec![
            "chunk_00001.webm".to_string(),
            "stray.webm".to_string(),
            "noise.bin".to_string(),
        ];
        sort_chunks(&mut names);
        // Both unparseable names count as sequence 0 and keep their order.
        assert_eq!(names, vec!["stray.webm", "noise.bin", "chunk_00001.webm"]);
    }

    #[test]
    fn test_playlist_quotes_and_escapes() {
        let chunks = vec![
            PathBuf::from("/tmp/a.webm"),
            PathBuf::from("/tmp/it's.webm"),
        ];
        let list = playlist(&chunks);
        assert_eq!(
            list,
            "file '/tmp/a.webm'\nfile '/tmp/it'\\''s.webm'\n"
        );
    }

    #[test]
    fn test_assemble_empty_is_error_and_leaves_audio_path_unset() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        let assembler = AudioAssembler::new(storage, "ffmpeg".to_string(), true);
        let err = assembler.assemble(&conn, id);
        assert!(matches!(err, Err(ReferentError::Assembly(_))));

        let meeting = MeetingRepository::require(&conn, id).unwrap();
        assert!(meeting.audio_path.is_none());
    }

    #[test]
    fn test_assemble_byte_fallback_orders_by_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        // Uploaded out of order: 2, 0, 1.
        let chunk_dir = AudioAssembler::chunk_dir_key(id);
        storage
            .put(&format!("{chunk_dir}/chunk_00002.webm"), b"CC")
            .unwrap();
        storage
            .put(&format!("{chunk_dir}/chunk_00000.webm"), b"AA")
            .unwrap();
        storage
            .put(&format!("{chunk_dir}/chunk_00001.webm"), b"BB")
            .unwrap();

        // A bogus ffmpeg path forces the fallback, which is enabled here.
        let assembler =
            AudioAssembler::new(storage.clone(), "/nonexistent/ffmpeg".to_string(), true);
        let key = assembler.assemble(&conn, id).unwrap();

        assert_eq!(storage.get(&key).unwrap(), b"AABBCC");
        // Chunk directory is gone, audio path is set, audit records the method.
        assert!(storage.list_dir(&chunk_dir).unwrap().is_empty());
        let meeting = MeetingRepository::require(&conn, id).unwrap();
        assert_eq!(meeting.audio_path.as_deref(), Some(key.as_str()));

        let entries = AuditRepository::list_for_meeting(&conn, id).unwrap();
        let audit = entries.last().unwrap();
        assert_eq!(audit.action, "audio.uploaded");
        assert!(audit.meta_json.as_deref().unwrap().contains("byte-concat"));
    }

    #[test]
    fn test_assemble_no_fallback_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::new(dir.path());
        let conn = test_conn();
        let id = MeetingRepository::insert(&conn, &sample_meeting()).unwrap();

        let chunk_dir = AudioAssembler::chunk_dir_key(id);
        storage
            .put(&format!("{chunk_dir}/chunk_00000.webm"), b"AA")
            .unwrap();

        let assembler =
            AudioAssembler::new(storage.clone(), "/nonexistent/ffmpeg".to_string(), false);
        let err = assembler.assemble(&conn, id);
        assert!(matches!(err, Err(ReferentError::Assembly(_))));

        // Chunks are preserved for a retry; nothing was persisted.
        assert_eq!(storage.list_dir(&chunk_dir).unwrap().len(), 1);
        assert!(MeetingRepository::require(&conn, id)
            .unwrap()
            .audio_path
            .is_none());
        // No partial output file is left in the audio directory either.
        assert_eq!(storage.list_dir("audio").unwrap(), Vec::<String>::new());
    }
}
