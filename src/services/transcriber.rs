//! Whisper transcription client.
//!
//! Multipart upload against the OpenAI audio transcription API, requesting
//! verbose JSON with word and segment timestamps.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use super::{Transcriber, Transcription};
use crate::error::{ReferentError, Result};

/// Whisper rejects inputs above 25 MB; checked before calling out.
const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct WhisperResponse {
    text: String,
    language: Option<String>,
    duration: Option<f64>,
    words: Option<serde_json::Value>,
    segments: Option<serde_json::Value>,
}

pub struct WhisperTranscriber {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl WhisperTranscriber {
    pub fn new(api_endpoint: &str, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(TRANSCRIBE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/audio/transcriptions", api_endpoint.trim_end_matches('/')),
            api_key,
            model: "whisper-1".to_string(),
        })
    }
}

#[async_trait]
impl Transcriber for WhisperTranscriber {
    async fn transcribe(&self, audio_path: &Path, language: &str) -> Result<Transcription> {
        let bytes = tokio::fs::read(audio_path).await.map_err(|e| {
            ReferentError::ExternalService(format!(
                "Audio file not readable: {}: {e}",
                audio_path.display()
            ))
        })?;
        if bytes.is_empty() {
            return Err(ReferentError::ExternalService(
                "Audio file is empty".to_string(),
            ));
        }
        if bytes.len() > MAX_AUDIO_BYTES {
            return Err(ReferentError::Validation(format!(
                "Audio file too large for transcription: {:.2}MB (max 25MB)",
                bytes.len() as f64 / 1024.0 / 1024.0
            )));
        }

        info!(
            "Transcribing audio: {} ({} bytes, language {})",
            audio_path.display(),
            bytes.len(),
            language
        );

        let filename = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.wav".to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename))
            .text("model", self.model.clone())
            .text("language", language.to_string())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word")
            .text("timestamp_granularities[]", "segment");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                ReferentError::ExternalService(format!("Transcription request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ReferentError::ExternalService(format!("Transcription response unreadable: {e}"))
        })?;

        if !status.is_success() {
            error!("Whisper API error (HTTP {}): {}", status, body);
            return Err(ReferentError::ExternalService(format!(
                "Whisper API error (HTTP {status})"
            )));
        }

        let parsed: WhisperResponse = serde_json::from_str(&body).map_err(|e| {
            ReferentError::ExternalService(format!("Invalid Whisper response: {e}"))
        })?;

        info!(
            "Transcription successful: {} chars, duration {:?}",
            parsed.text.len(),
            parsed.duration
        );

        Ok(Transcription {
            text: parsed.text,
            language: parsed.language.unwrap_or_else(|| language.to_string()),
            duration_seconds: parsed.duration,
            words: parsed.words,
            segments: parsed.segments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parsing_with_optional_fields() {
        let body = r#"{"text": "Møtet er satt.", "language": "norwegian", "duration": 12.5}"#;
        let parsed: WhisperResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.text, "Møtet er satt.");
        assert!(parsed.words.is_none());

        let minimal = r#"{"text": ""}"#;
        let parsed: WhisperResponse = serde_json::from_str(minimal).unwrap();
        assert!(parsed.language.is_none());
    }

    #[tokio::test]
    async fn test_oversized_input_rejected_before_calling_out() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.wav");
        std::fs::write(&path, vec![0u8; MAX_AUDIO_BYTES + 1]).unwrap();

        // Endpoint is unroutable; the size check must fire first.
        let transcriber =
            WhisperTranscriber::new("http://127.0.0.1:1", "key".to_string()).unwrap();
        let err = transcriber.transcribe(&path, "no").await;
        assert!(matches!(err, Err(ReferentError::Validation(_))));
    }
}
