//! Meeting lifecycle endpoints.
//!
//! Creation, participants, consent, chunked upload, finalization, status
//! polling and PDF download. Database and ffmpeg work is synchronous, so
//! handlers push it onto the blocking pool.

use axum::{
    extract::{Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use chrono::{TimeDelta, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info};

use super::super::error::{ApiError, ApiResult};
use super::super::AppState;
use crate::db::{AuditRepository, MeetingRepository, NewMeeting, NewParticipant, ParticipantRepository};
use crate::error::ReferentError;
use crate::meeting::{DocumentType, MeetingState, Role};

const MAX_NAME_LEN: usize = 255;
const MAX_PARTICIPANTS: usize = 50;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/meetings", post(create_meeting))
        .route("/meetings/:id/participants", post(add_participants))
        .route("/meetings/:id/consent", post(confirm_consent))
        .route("/meetings/:id/upload", post(upload_chunk))
        .route("/meetings/:id/finalize", post(finalize))
        .route("/meetings/:id/status", get(meeting_status))
        .route("/meetings/:id/download/:doc_type", get(download))
        .route("/meetings/:id/share", post(create_share))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct ParticipantRequest {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub is_present: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct CreateMeetingRequest {
    pub company_name: String,
    #[serde(default)]
    pub company_orgnr: Option<String>,
    #[serde(default)]
    pub company_address: Option<String>,
    pub meeting_datetime: String,
    pub meeting_location: String,
    pub chair_name: String,
    #[serde(default = "default_true")]
    pub quorum_ok: bool,
    #[serde(default)]
    pub agenda_text: Option<String>,
    #[serde(default)]
    pub participants: Vec<ParticipantRequest>,
    /// Demo meetings are deleted after the configured retention window.
    #[serde(default)]
    pub demo: bool,
}

fn validated_participant(req: &ParticipantRequest) -> Result<NewParticipant, ApiError> {
    if req.name.trim().is_empty() || req.name.len() > MAX_NAME_LEN {
        return Err(ApiError::bad_request("Participant name is required"));
    }
    let role = Role::parse(&req.role)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown role '{}'", req.role)))?;
    Ok(NewParticipant {
        name: req.name.trim().to_string(),
        role,
        email: req.email.clone(),
        is_present: req.is_present,
    })
}

async fn create_meeting(
    State(state): State<AppState>,
    Json(req): Json<CreateMeetingRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if req.company_name.trim().is_empty() || req.company_name.len() > MAX_NAME_LEN {
        return Err(ApiError::bad_request("company_name is required (max 255 chars)"));
    }
    if let Some(orgnr) = &req.company_orgnr {
        if orgnr.len() != 9 || !orgnr.chars().all(|c| c.is_ascii_digit()) {
            return Err(ApiError::bad_request(
                "company_orgnr must be exactly 9 digits",
            ));
        }
    }
    if req.chair_name.trim().is_empty() {
        return Err(ApiError::bad_request("chair_name is required"));
    }
    if req.participants.is_empty() || req.participants.len() > MAX_PARTICIPANTS {
        return Err(ApiError::bad_request(format!(
            "Between 1 and {MAX_PARTICIPANTS} participants required"
        )));
    }
    let participants: Vec<NewParticipant> = req
        .participants
        .iter()
        .map(validated_participant)
        .collect::<Result<_, _>>()?;

    let retention_until = if req.demo {
        Some(Utc::now() + TimeDelta::hours(state.demo_retention_hours))
    } else {
        None
    };

    let meeting = NewMeeting {
        company_name: req.company_name.trim().to_string(),
        company_orgnr: req.company_orgnr,
        company_address: req.company_address,
        meeting_datetime: req.meeting_datetime,
        meeting_location: req.meeting_location,
        chair_name: req.chair_name.trim().to_string(),
        quorum_ok: req.quorum_ok,
        agenda_text: req.agenda_text,
        retention_until,
    };

    let conn = state.db.conn().map_err(ApiError::from)?;
    let meeting_id = MeetingRepository::insert(&conn, &meeting).map_err(ApiError::from)?;
    for participant in &participants {
        ParticipantRepository::insert(&conn, meeting_id, participant).map_err(ApiError::from)?;
    }
    AuditRepository::log(
        &conn,
        "meeting.created",
        Some(meeting_id),
        Some(json!({ "demo": req.demo, "participants": participants.len() })),
    )
    .map_err(ApiError::from)?;

    info!("Created meeting {} for {}", meeting_id, meeting.company_name);
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": meeting_id,
            "state": MeetingState::Created.as_str(),
            "retention_until": retention_until.map(|t| t.timestamp()),
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AddParticipantsRequest {
    pub participants: Vec<ParticipantRequest>,
}

async fn add_participants(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<AddParticipantsRequest>,
) -> ApiResult<Json<Value>> {
    if req.participants.is_empty() {
        return Err(ApiError::bad_request("No participants given"));
    }
    let new_participants: Vec<NewParticipant> = req
        .participants
        .iter()
        .map(validated_participant)
        .collect::<Result<_, _>>()?;

    let conn = state.db.conn().map_err(ApiError::from)?;
    MeetingRepository::require(&conn, id).map_err(ApiError::from)?;
    let existing = ParticipantRepository::list_for_meeting(&conn, id).map_err(ApiError::from)?;
    if existing.len() + new_participants.len() > MAX_PARTICIPANTS {
        return Err(ApiError::bad_request(format!(
            "A meeting holds at most {MAX_PARTICIPANTS} participants"
        )));
    }
    let mut ids = Vec::with_capacity(new_participants.len());
    for participant in &new_participants {
        ids.push(ParticipantRepository::insert(&conn, id, participant).map_err(ApiError::from)?);
    }
    AuditRepository::log(
        &conn,
        "participants.added",
        Some(id),
        Some(json!({ "count": ids.len() })),
    )
    .map_err(ApiError::from)?;

    Ok(Json(json!({ "added": ids })))
}

async fn confirm_consent(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    headers: axum::http::HeaderMap,
) -> ApiResult<Json<Value>> {
    let ip = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.split(',').next().unwrap_or(v).trim().to_string());
    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let conn = state.db.conn().map_err(ApiError::from)?;
    MeetingRepository::require(&conn, id).map_err(ApiError::from)?;
    MeetingRepository::confirm_consent(&conn, id, ip.as_deref(), user_agent.as_deref())
        .map_err(ApiError::from)?;
    AuditRepository::log(
        &conn,
        "consent.confirmed",
        Some(id),
        Some(json!({ "ip": ip })),
    )
    .map_err(ApiError::from)?;

    Ok(Json(json!({ "success": true })))
}

async fn upload_chunk(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let mut chunk: Option<(Option<String>, Vec<u8>)> = None;
    let mut seq: Option<u32> = None;
    let mut is_last = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {e}")))?
    {
        match field.name().unwrap_or_default() {
            "chunk" => {
                let filename = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("Unreadable chunk: {e}")))?;
                chunk = Some((filename, bytes.to_vec()));
            }
            "seq" => {
                let text = field.text().await.unwrap_or_default();
                seq = Some(
                    text.parse()
                        .map_err(|_| ApiError::bad_request("seq must be a number"))?,
                );
            }
            "is_last" => {
                let text = field.text().await.unwrap_or_default();
                is_last = matches!(text.as_str(), "1" | "true");
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        chunk.ok_or_else(|| ApiError::bad_request("Missing 'chunk' file field"))?;
    let seq = seq.ok_or_else(|| ApiError::bad_request("Missing 'seq' field"))?;

    let db = state.db.clone();
    let chunks = state.chunks.clone();
    let stored = tokio::task::spawn_blocking(move || {
        let conn = db.conn()?;
        chunks.store_chunk(&conn, id, seq, is_last, filename.as_deref(), &bytes)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Upload task failed: {e}")))??;

    Ok(Json(json!({
        "seq": stored.seq,
        "stored": stored.key,
        "assembled": stored.assembled_key,
    })))
}

async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let db = state.db.clone();
    let chunks = state.chunks.clone();
    // Assemble here when the client never flagged a last chunk; retry after
    // failure reuses the already-assembled audio.
    tokio::task::spawn_blocking(move || {
        let conn = db.conn()?;
        let meeting = MeetingRepository::require(&conn, id)?;
        match meeting.state {
            MeetingState::Uploading if meeting.audio_path.is_none() => {
                chunks.assemble(&conn, id)?;
            }
            MeetingState::Uploading | MeetingState::Failed => {
                if meeting.audio_path.is_none() {
                    return Err(ReferentError::Precondition(format!(
                        "Meeting {id} has no audio to process"
                    )));
                }
            }
            other => {
                return Err(ReferentError::Precondition(format!(
                    "Meeting {id} cannot be finalized in state '{}'",
                    other.as_str()
                )));
            }
        }
        AuditRepository::log(&conn, "processing.started", Some(id), None)
    })
    .await
    .map_err(|e| ApiError::internal(format!("Finalize task failed: {e}")))??;

    let orchestrator = state.orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run(id).await {
            error!("Background processing of meeting {} failed: {}", id, e);
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "id": id, "processing": true })),
    ))
}

async fn meeting_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let conn = state.db.conn().map_err(ApiError::from)?;
    let meeting = MeetingRepository::require(&conn, id).map_err(ApiError::from)?;

    Ok(Json(json!({
        "id": meeting.id,
        "state": meeting.state.as_str(),
        "is_ready": meeting.state == MeetingState::Ready,
        "has_failed": meeting.state == MeetingState::Failed,
        "is_processing": meeting.state.is_processing(),
        "consent_confirmed": meeting.consent_confirmed,
        "has_audio": meeting.audio_path.is_some(),
        "created_at": meeting.created_at,
        "updated_at": meeting.updated_at,
        "retention_until": meeting.retention_until,
    })))
}

fn parse_doc_type(s: &str) -> Result<DocumentType, ApiError> {
    // "pdf" is the legacy alias for the minutes document.
    if s == "pdf" {
        return Ok(DocumentType::Minutes);
    }
    DocumentType::parse(s).ok_or_else(|| ApiError::bad_request(format!("Unknown document type '{s}'")))
}

async fn download(
    State(state): State<AppState>,
    Path((id, doc_type)): Path<(i64, String)>,
) -> ApiResult<impl IntoResponse> {
    let doc_type = parse_doc_type(&doc_type)?;

    let conn = state.db.conn().map_err(ApiError::from)?;
    let meeting = MeetingRepository::require(&conn, id).map_err(ApiError::from)?;
    let key = meeting
        .pdf_path(doc_type)
        .ok_or_else(|| ApiError::not_found(format!("No {} PDF available", doc_type.as_str())))?;
    let bytes = state.storage.get(key).map_err(ApiError::from)?;
    AuditRepository::log(
        &conn,
        "document.downloaded",
        Some(id),
        Some(json!({ "doc_type": doc_type.as_str() })),
    )
    .map_err(ApiError::from)?;

    let disposition = format!(
        "attachment; filename=\"{}_{}.pdf\"",
        doc_type.as_str(),
        meeting.id
    );
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

#[derive(Debug, Deserialize)]
pub struct CreateShareRequest {
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default)]
    pub ttl_hours: Option<i64>,
}

fn default_audience() -> String {
    "all".to_string()
}

async fn create_share(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateShareRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let audience = crate::share::Audience::parse(&req.audience)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown audience '{}'", req.audience)))?;

    let created = state
        .shares
        .create(id, audience, req.ttl_hours)
        .map_err(ApiError::from)?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "token": created.token,
            "url": created.url,
            "audience": created.audience.as_str(),
            "expires_at": created.expires_at,
        })),
    ))
}
