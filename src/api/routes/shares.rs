//! Anonymous share link endpoints.
//!
//! No authentication here: possession of the token is the credential.

use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};

use super::super::error::{ApiError, ApiResult};
use super::super::AppState;
use crate::meeting::DocumentType;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/share/:token", get(view_share))
        .route("/share/:token/download/:doc_type", get(download_shared))
        .with_state(state)
}

async fn view_share(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> ApiResult<Json<crate::share::ShareView>> {
    let view = state.shares.view(&token).map_err(ApiError::from)?;
    Ok(Json(view))
}

async fn download_shared(
    State(state): State<AppState>,
    Path((token, doc_type)): Path<(String, String)>,
) -> ApiResult<impl IntoResponse> {
    let doc_type = DocumentType::parse(&doc_type)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown document type '{doc_type}'")))?;

    let bytes = state
        .shares
        .download(&token, doc_type)
        .map_err(ApiError::from)?;

    let disposition = format!("attachment; filename=\"{}.pdf\"", doc_type.as_str());
    Ok((
        [
            (header::CONTENT_TYPE, "application/pdf".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
