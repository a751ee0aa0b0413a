//! AI document generation.
//!
//! One chat-completion call per document type. The prompts produce formal
//! Norwegian board documents (protokoll, tiltaksliste, vedtakslogg) and only
//! admit facts present in the transcript.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};

use super::{DiarizationSegment, DocumentGenerator, MeetingContext};
use crate::error::{ReferentError, Result};
use crate::meeting::DocumentType;

const GENERATE_TIMEOUT: Duration = Duration::from_secs(120);

const SECRETARY_PROMPT: &str = "Du er sekretær for et norsk styremøte. Skriv presise, \
korrekte og nøkterne dokumenter på bokmål. Ta kun med fakta som fremgår av transkripsjonen.";

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct OpenAiGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiGenerator {
    pub fn new(api_endpoint: &str, api_key: String, model: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(GENERATE_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", api_endpoint.trim_end_matches('/')),
            api_key,
            model,
        })
    }

    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "model": self.model,
                "messages": messages,
                "temperature": 0.3,
            }))
            .send()
            .await
            .map_err(|e| {
                ReferentError::ExternalService(format!("Chat completion request failed: {e}"))
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ReferentError::ExternalService(format!("Chat completion response unreadable: {e}"))
        })?;

        if !status.is_success() {
            error!("Chat API error (HTTP {}): {}", status, body);
            return Err(ReferentError::ExternalService(format!(
                "Chat API error (HTTP {status})"
            )));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| ReferentError::ExternalService(format!("Invalid chat response: {e}")))?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|content| !content.is_empty())
            .ok_or_else(|| {
                ReferentError::ExternalService("Chat response contained no content".to_string())
            })
    }
}

#[async_trait]
impl DocumentGenerator for OpenAiGenerator {
    async fn generate(
        &self,
        doc_type: DocumentType,
        context: &MeetingContext,
        transcript: &str,
        diarization: &[DiarizationSegment],
    ) -> Result<String> {
        if transcript.is_empty() {
            return Err(ReferentError::Precondition(format!(
                "Transcript cannot be empty for {} generation",
                doc_type.as_str()
            )));
        }

        info!(
            "Generating {} for {} ({} transcript chars, {} diarization segments)",
            doc_type.as_str(),
            context.company_name,
            transcript.len(),
            diarization.len()
        );

        let user_prompt = match doc_type {
            DocumentType::Minutes => minutes_prompt(context, transcript),
            DocumentType::Actions => actions_prompt(transcript),
            DocumentType::Decisions => decisions_prompt(transcript),
        };

        let content = self
            .chat(vec![
                ChatMessage {
                    role: "system",
                    content: SECRETARY_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ])
            .await?;

        info!("{} generated: {} chars", doc_type.as_str(), content.len());
        Ok(content)
    }
}

fn participants_list(context: &MeetingContext) -> String {
    context
        .participants
        .iter()
        .map(|p| {
            format!(
                "{} ({}){}",
                p.name,
                p.role.as_str(),
                if p.is_present {
                    " - Tilstede"
                } else {
                    " - Fraværende"
                }
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn minutes_prompt(context: &MeetingContext, transcript: &str) -> String {
    let mut prompt = String::from(
        "Generer et formelt møtereferat (protokoll) basert på følgende informasjon:\n\n",
    );
    prompt.push_str("SELSKAP:\n");
    prompt.push_str(&format!("Navn: {}\n", context.company_name));
    prompt.push_str(&format!(
        "Org.nr: {}\n",
        context.company_orgnr.as_deref().unwrap_or("")
    ));
    prompt.push_str(&format!(
        "Adresse: {}\n\n",
        context.company_address.as_deref().unwrap_or("")
    ));
    prompt.push_str("MØTE:\n");
    prompt.push_str(&format!("Dato/tid: {}\n", context.meeting_datetime));
    prompt.push_str(&format!("Sted: {}\n", context.meeting_location));
    prompt.push_str(&format!("Møteleder: {}\n", context.chair_name));
    prompt.push_str(&format!(
        "Beslutningsdyktig: {}\n\n",
        if context.quorum_ok { "Ja" } else { "Nei" }
    ));
    prompt.push_str(&format!("DELTAKERE:\n{}\n\n", participants_list(context)));
    if let Some(agenda) = context.agenda_text.as_deref().filter(|a| !a.is_empty()) {
        prompt.push_str(&format!("AGENDA:\n{agenda}\n\n"));
    }
    prompt.push_str(&format!("TRANSKRIPSJON:\n{transcript}\n\n"));
    prompt.push_str(
        "Formater referatet med følgende seksjoner:\n\
         1. INNLEDNING (selskap, orgnr, adresse, møtedato/sted, møteleder, protokollfører, innkalling & beslutningsdyktighet)\n\
         2. TILSTEDE/FRAVÆR\n\
         3. AGENDA / SAKSOVERSIKT\n\
         4. SAKER (Sak 1, 2, …: Kort drøfting, VEDTAK, eventuelle avstemningsresultat og habilitetsnotater)\n\
         5. EVENTUELT\n\
         6. NESTE MØTE\n\
         7. SIGNATURFELT (styreleder + protokollfører)\n",
    );
    prompt
}

fn actions_prompt(transcript: &str) -> String {
    format!(
        "Basert på følgende møtetranskripsjon, identifiser alle tiltak/handlingspunkter som ble avtalt.\n\n\
         TRANSKRIPSJON:\n{transcript}\n\n\
         Lag en tabell med kolonner: TILTAK | ANSVARLIG | FRIST | STATUS\n\
         Status skal alltid være 'Ny' for alle tiltak.\n\
         Hvis frist eller ansvarlig ikke er eksplisitt nevnt, bruk 'Ikke spesifisert'.\n"
    )
}

fn decisions_prompt(transcript: &str) -> String {
    format!(
        "Basert på følgende møtetranskripsjon, identifiser alle formelle beslutninger/vedtak.\n\n\
         TRANSKRIPSJON:\n{transcript}\n\n\
         For hvert vedtak, oppgi:\n\
         - SAK (nummer og tittel)\n\
         - VEDTAKSTEKST (presis formulering)\n\
         - AVSTEMNING (for/mot/avholdende hvis nevnt, ellers 'Enstemmig')\n\
         - IKRAFTTREDELSE (hvis nevnt)\n\
         - HABILITET (hvis noen erklærte seg inhabil)\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::meeting::Role;
    use crate::services::ParticipantSummary;

    fn context() -> MeetingContext {
        MeetingContext {
            company_name: "Fjellheim AS".to_string(),
            company_orgnr: Some("987654321".to_string()),
            company_address: None,
            meeting_datetime: "2026-03-12T10:00:00Z".to_string(),
            meeting_location: "Digitalt møte".to_string(),
            chair_name: "Kari Nordmann".to_string(),
            quorum_ok: true,
            agenda_text: None,
            participants: vec![
                ParticipantSummary {
                    name: "Kari Nordmann".to_string(),
                    role: Role::Chair,
                    is_present: true,
                },
                ParticipantSummary {
                    name: "Ola Hansen".to_string(),
                    role: Role::BoardMember,
                    is_present: false,
                },
            ],
        }
    }

    #[test]
    fn test_minutes_prompt_carries_meeting_data() {
        let prompt = minutes_prompt(&context(), "Møtet er satt.");
        assert!(prompt.contains("Fjellheim AS"));
        assert!(prompt.contains("987654321"));
        assert!(prompt.contains("Kari Nordmann (chair) - Tilstede"));
        assert!(prompt.contains("Ola Hansen (board_member) - Fraværende"));
        assert!(prompt.contains("Møtet er satt."));
        // No agenda section when the agenda is empty.
        assert!(!prompt.contains("AGENDA:\n"));
    }

    #[test]
    fn test_actions_and_decisions_prompts() {
        assert!(actions_prompt("tekst").contains("TILTAK | ANSVARLIG | FRIST | STATUS"));
        assert!(decisions_prompt("tekst").contains("VEDTAKSTEKST"));
    }

    #[test]
    fn test_chat_response_parsing() {
        let body = r#"{"choices": [{"message": {"content": "Referat"}}]}"#;
        let parsed: ChatResponse = serde_json::from_str(body).unwrap();
        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("Referat")
        );
    }
}
