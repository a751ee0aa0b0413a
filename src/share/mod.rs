//! Share links.
//!
//! A share link is an unguessable token granting read access to a subset of
//! a meeting's generated documents, optionally time-limited. Tokens are never
//! reused and expiry is checked at view and download time, so revocation is a
//! matter of letting the clock run out.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{AuditRepository, Database, MeetingRecord, MeetingRepository, ShareRepository};
use crate::error::{ReferentError, Result};
use crate::meeting::DocumentType;
use crate::storage::Storage;

pub const MAX_TTL_HOURS: i64 = 8760;

/// Which generated documents a share link exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    Minutes,
    Actions,
    Decisions,
    All,
}

impl Audience {
    pub fn as_str(&self) -> &'static str {
        match self {
            Audience::Minutes => "minutes",
            Audience::Actions => "actions",
            Audience::Decisions => "decisions",
            Audience::All => "all",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minutes" => Some(Audience::Minutes),
            "actions" => Some(Audience::Actions),
            "decisions" => Some(Audience::Decisions),
            "all" => Some(Audience::All),
            _ => None,
        }
    }

    pub fn permits(&self, doc_type: DocumentType) -> bool {
        match self {
            Audience::All => true,
            Audience::Minutes => doc_type == DocumentType::Minutes,
            Audience::Actions => doc_type == DocumentType::Actions,
            Audience::Decisions => doc_type == DocumentType::Decisions,
        }
    }
}

/// Share view payload: meeting metadata plus the document contents the
/// link's audience permits.
#[derive(Debug, Serialize)]
pub struct ShareView {
    pub company_name: String,
    pub company_orgnr: Option<String>,
    pub meeting_datetime: String,
    pub meeting_location: String,
    pub chair_name: String,
    pub audience: Audience,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minutes_pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions_pdf_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decisions_pdf_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedShare {
    pub token: String,
    pub url: String,
    pub audience: Audience,
    pub expires_at: Option<i64>,
}

pub struct ShareTokenIssuer {
    db: Database,
    storage: Storage,
    public_url: String,
}

impl ShareTokenIssuer {
    pub fn new(db: Database, storage: Storage, public_url: String) -> Self {
        Self {
            db,
            storage,
            public_url,
        }
    }

    /// Issue a new token for a meeting. `ttl_hours` of `None` means the
    /// link never expires.
    pub fn create(
        &self,
        meeting_id: i64,
        audience: Audience,
        ttl_hours: Option<i64>,
    ) -> Result<CreatedShare> {
        if let Some(hours) = ttl_hours {
            if !(1..=MAX_TTL_HOURS).contains(&hours) {
                return Err(ReferentError::Validation(format!(
                    "Share TTL must be between 1 and {MAX_TTL_HOURS} hours"
                )));
            }
        }

        let conn = self.db.conn()?;
        MeetingRepository::require(&conn, meeting_id)?;

        let token = Uuid::new_v4().to_string();
        let expires_at = ttl_hours.map(|hours| Utc::now().timestamp() + hours * 3600);
        ShareRepository::insert(&conn, meeting_id, &token, audience, expires_at)?;
        AuditRepository::log(
            &conn,
            "share.created",
            Some(meeting_id),
            Some(json!({ "audience": audience.as_str(), "ttl_hours": ttl_hours })),
        )?;
        info!("Created share link for meeting {}", meeting_id);

        Ok(CreatedShare {
            url: format!("{}/del/{}", self.public_url.trim_end_matches('/'), token),
            token,
            audience,
            expires_at,
        })
    }

    /// Resolve a token to the content its audience permits. Unknown tokens
    /// and tokens for deleted meetings both come back as not-found, expired
    /// tokens as their own error so the caller can say so.
    pub fn view(&self, token: &str) -> Result<ShareView> {
        let conn = self.db.conn()?;
        let share = ShareRepository::get_by_token(&conn, token)?
            .ok_or_else(|| ReferentError::NotFound("Unknown share link".to_string()))?;
        if let Some(expires_at) = share.expires_at {
            if Utc::now().timestamp() >= expires_at {
                return Err(ReferentError::ShareExpired);
            }
        }
        let meeting = MeetingRepository::require(&conn, share.meeting_id)
            .map_err(|_| ReferentError::NotFound("Unknown share link".to_string()))?;

        if let Err(e) = ShareRepository::increment_opened(&conn, share.id) {
            warn!("Could not count share open for {}: {}", share.id, e);
        }

        Ok(self.view_of(&meeting, share.audience, token))
    }

    fn view_of(&self, meeting: &MeetingRecord, audience: Audience, token: &str) -> ShareView {
        let pick = |doc_type| {
            audience
                .permits(doc_type)
                .then(|| meeting.content(doc_type).map(str::to_string))
                .flatten()
        };
        // Download URL only when the PDF actually exists and the audience
        // covers it.
        let pdf_url = |doc_type: DocumentType| {
            (audience.permits(doc_type) && meeting.pdf_path(doc_type).is_some()).then(|| {
                format!(
                    "{}/share/{}/download/{}",
                    self.public_url.trim_end_matches('/'),
                    token,
                    doc_type.as_str()
                )
            })
        };
        ShareView {
            company_name: meeting.company_name.clone(),
            company_orgnr: meeting.company_orgnr.clone(),
            meeting_datetime: meeting.meeting_datetime.clone(),
            meeting_location: meeting.meeting_location.clone(),
            chair_name: meeting.chair_name.clone(),
            audience,
            minutes: pick(DocumentType::Minutes),
            actions: pick(DocumentType::Actions),
            decisions: pick(DocumentType::Decisions),
            minutes_pdf_url: pdf_url(DocumentType::Minutes),
            actions_pdf_url: pdf_url(DocumentType::Actions),
            decisions_pdf_url: pdf_url(DocumentType::Decisions),
        }
    }

    /// Fetch a rendered PDF through a share link.
    pub fn download(&self, token: &str, doc_type: DocumentType) -> Result<Vec<u8>> {
        let conn = self.db.conn()?;
        let share = ShareRepository::get_by_token(&conn, token)?
            .ok_or_else(|| ReferentError::NotFound("Unknown share link".to_string()))?;
        if let Some(expires_at) = share.expires_at {
            if Utc::now().timestamp() >= expires_at {
                return Err(ReferentError::ShareExpired);
            }
        }
        if !share.audience.permits(doc_type) {
            return Err(ReferentError::Forbidden(format!(
                "This link does not include the {} document",
                doc_type.as_str()
            )));
        }
        let meeting = MeetingRepository::require(&conn, share.meeting_id)
            .map_err(|_| ReferentError::NotFound("Unknown share link".to_string()))?;
        let key = meeting.pdf_path(doc_type).ok_or_else(|| {
            ReferentError::NotFound(format!("No {} PDF available", doc_type.as_str()))
        })?;

        let bytes = self.storage.get(key)?;
        AuditRepository::log(
            &conn,
            "share.downloaded",
            Some(share.meeting_id),
            Some(json!({ "doc_type": doc_type.as_str() })),
        )?;
        Ok(bytes)
    }
}
