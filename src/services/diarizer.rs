//! HTTP diarization client.
//!
//! Posts the assembled audio file as multipart form data and expects an
//! ordered list of `{start, end, speaker}` segments back, either bare or
//! wrapped in a `segments` field.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info};

use super::{DiarizationSegment, Diarizer};
use crate::error::{ReferentError, Result};

/// Diarization can take minutes on long recordings.
const DIARIZE_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DiarizeResponse {
    Wrapped { segments: Vec<DiarizationSegment> },
    Bare(Vec<DiarizationSegment>),
}

pub struct HttpDiarizer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpDiarizer {
    pub fn new(endpoint: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(DIARIZE_TIMEOUT)
            .build()?;
        Ok(Self { client, endpoint })
    }
}

#[async_trait]
impl Diarizer for HttpDiarizer {
    async fn diarize(&self, audio_path: &Path) -> Result<Vec<DiarizationSegment>> {
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

        info!(
            "Starting diarization: {} ({} bytes)",
            audio_path.display(),
            bytes.len()
        );

        let filename = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio".to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name(filename));

        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| ReferentError::ExternalService(format!("Diarization request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ReferentError::ExternalService(format!("Diarization response unreadable: {e}")))?;

        if !status.is_success() {
            error!("Diarization API error (HTTP {}): {}", status, body);
            return Err(ReferentError::ExternalService(format!(
                "Diarization API error (HTTP {status})"
            )));
        }

        let parsed: DiarizeResponse = serde_json::from_str(&body).map_err(|e| {
            ReferentError::ExternalService(format!("Invalid diarization response: {e}"))
        })?;
        let segments = match parsed {
            DiarizeResponse::Wrapped { segments } => segments,
            DiarizeResponse::Bare(segments) => segments,
        };

        info!("Diarization successful: {} segments", segments.len());
        Ok(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_parses_bare_and_wrapped() {
        let bare = r#"[{"start": 0.0, "end": 5.2, "speaker": "SPK00"}]"#;
        let wrapped = r#"{"segments": [{"start": 0.0, "end": 5.2, "speaker": "SPK00"}]}"#;

        for body in [bare, wrapped] {
            let parsed: DiarizeResponse = serde_json::from_str(body).unwrap();
            let segments = match parsed {
                DiarizeResponse::Wrapped { segments } => segments,
                DiarizeResponse::Bare(segments) => segments,
            };
            assert_eq!(segments.len(), 1);
            assert_eq!(segments[0].speaker, "SPK00");
        }
    }

    #[test]
    fn test_segment_duration_is_non_negative() {
        let segment = DiarizationSegment {
            start: 10.0,
            end: 8.0,
            speaker: "SPK00".to_string(),
        };
        assert_eq!(segment.duration(), 0.0);
    }
}
