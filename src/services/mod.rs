//! External collaborator seams.
//!
//! The pipeline talks to four collaborators through traits so the
//! orchestrator can be exercised with fakes: a diarization service, a
//! transcription service, an AI document generator and a PDF renderer.
//! The HTTP implementations live in the submodules.

pub mod diarizer;
pub mod generator;
pub mod pdf;
pub mod transcriber;

pub use diarizer::HttpDiarizer;
pub use generator::OpenAiGenerator;
pub use pdf::HttpPdfRenderer;
pub use transcriber::WhisperTranscriber;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::db::{MeetingRecord, ParticipantRecord};
use crate::error::Result;
use crate::meeting::{DocumentType, Role};

/// One diarized span of audio attributed to an anonymous speaker label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

impl DiarizationSegment {
    pub fn duration(&self) -> f64 {
        (self.end - self.start).max(0.0)
    }
}

#[async_trait]
pub trait Diarizer: Send + Sync {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>>;
}

/// Transcription output; word/segment detail is carried opaquely.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcription {
    pub text: String,
    pub language: String,
    pub duration_seconds: Option<f64>,
    pub words: Option<serde_json::Value>,
    pub segments: Option<serde_json::Value>,
}

#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<Transcription>;
}

/// Meeting metadata passed to the generator and the PDF renderer.
#[derive(Debug, Clone, Serialize)]
pub struct MeetingContext {
    pub company_name: String,
    pub company_orgnr: Option<String>,
    pub company_address: Option<String>,
    pub meeting_datetime: String,
    pub meeting_location: String,
    pub chair_name: String,
    pub quorum_ok: bool,
    pub agenda_text: Option<String>,
    pub participants: Vec<ParticipantSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    pub name: String,
    pub role: Role,
    pub is_present: bool,
}

impl MeetingContext {
    pub fn from_records(meeting: &MeetingRecord, participants: &[ParticipantRecord]) -> Self {
        Self {
            company_name: meeting.company_name.clone(),
            company_orgnr: meeting.company_orgnr.clone(),
            company_address: meeting.company_address.clone(),
            meeting_datetime: meeting.meeting_datetime.clone(),
            meeting_location: meeting.meeting_location.clone(),
            chair_name: meeting.chair_name.clone(),
            quorum_ok: meeting.quorum_ok,
            agenda_text: meeting.agenda_text.clone(),
            participants: participants
                .iter()
                .map(|p| ParticipantSummary {
                    name: p.name.clone(),
                    role: p.role,
                    is_present: p.is_present,
                })
                .collect(),
        }
    }
}

#[async_trait]
pub trait DocumentGenerator: Send + Sync {
    /// Generate one document type from the transcript. Calls are made once
    /// per document type; the diarization context is advisory.
    async fn generate(
        &self,
        doc_type: DocumentType,
        context: &MeetingContext,
        transcript: &str,
        diarization: &[DiarizationSegment],
    ) -> Result<String>;
}

#[async_trait]
pub trait PdfRenderer: Send + Sync {
    /// Render sanitized HTML content to PDF bytes.
    async fn render(
        &self,
        doc_type: DocumentType,
        context: &MeetingContext,
        html: &str,
    ) -> Result<Vec<u8>>;
}
