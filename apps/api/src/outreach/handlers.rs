//! Axum route handlers for the Outreach API.
//!
//! Every handler runs admission (rate limit, then bot verification) before
//! doing any extraction or LLM work.

use axum::{
    extract::{Multipart, State},
    http::HeaderMap,
    Json,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admission::admit;
use crate::errors::AppError;
use crate::outreach::extract::{ensure_pdf, fetch_page_text, parse_source_url, pdf_text};
use crate::outreach::prompts::{build_outreach_prompt, SourceKind, OUTREACH_SYSTEM};
use crate::rate_limit::ClientIdentity;
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TextOutreachRequest {
    pub text: String,
    pub turnstile_token: Option<String>,
    #[serde(default)]
    pub sender_context: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UrlOutreachRequest {
    pub url: String,
    pub turnstile_token: Option<String>,
    #[serde(default)]
    pub sender_context: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OutreachResponse {
    pub message: String,
}

/// Fields collected from the multipart upload form.
#[derive(Debug, Default)]
struct FileUpload {
    file: Option<Bytes>,
    file_content_type: Option<String>,
    file_name: Option<String>,
    turnstile_token: Option<String>,
    sender_context: Option<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/outreach/text
pub async fn handle_text_outreach(
    State(state): State<AppState>,
    identity: ClientIdentity,
    Json(request): Json<TextOutreachRequest>,
) -> Result<(HeaderMap, Json<OutreachResponse>), AppError> {
    let admission = admit(&state, &identity, request.turnstile_token.as_deref()).await?;

    if request.text.trim().is_empty() {
        return Err(AppError::Validation("text cannot be empty".to_string()));
    }

    let message = generate(
        &state,
        SourceKind::Text,
        &request.text,
        request.sender_context.as_deref(),
    )
    .await?;

    Ok((admission.headers(), Json(OutreachResponse { message })))
}

/// POST /api/outreach/file
///
/// Multipart form: `file` (PDF), `turnstile_token`, optional `sender_context`.
pub async fn handle_file_outreach(
    State(state): State<AppState>,
    identity: ClientIdentity,
    multipart: Multipart,
) -> Result<(HeaderMap, Json<OutreachResponse>), AppError> {
    let upload = read_upload(multipart).await?;
    let admission = admit(&state, &identity, upload.turnstile_token.as_deref()).await?;

    let file = upload
        .file
        .ok_or_else(|| AppError::Validation("A PDF file is required".to_string()))?;
    ensure_pdf(
        &file,
        upload.file_content_type.as_deref(),
        upload.file_name.as_deref(),
    )?;
    let profile = pdf_text(file).await?;

    let message = generate(
        &state,
        SourceKind::Pdf,
        &profile,
        upload.sender_context.as_deref(),
    )
    .await?;

    Ok((admission.headers(), Json(OutreachResponse { message })))
}

/// POST /api/outreach/url
pub async fn handle_url_outreach(
    State(state): State<AppState>,
    identity: ClientIdentity,
    Json(request): Json<UrlOutreachRequest>,
) -> Result<(HeaderMap, Json<OutreachResponse>), AppError> {
    let admission = admit(&state, &identity, request.turnstile_token.as_deref()).await?;

    let url = parse_source_url(&request.url)?;
    let profile = fetch_page_text(&state.http, &url).await?;

    let message = generate(
        &state,
        SourceKind::Url,
        &profile,
        request.sender_context.as_deref(),
    )
    .await?;

    Ok((admission.headers(), Json(OutreachResponse { message })))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn generate(
    state: &AppState,
    kind: SourceKind,
    profile: &str,
    sender_context: Option<&str>,
) -> Result<String, AppError> {
    let prompt = build_outreach_prompt(kind, profile, sender_context);
    let message = state.llm.complete(&prompt, OUTREACH_SYSTEM).await?;
    info!(source = ?kind, chars = message.len(), "Outreach message generated");
    Ok(message.trim().to_string())
}

async fn read_upload(mut multipart: Multipart) -> Result<FileUpload, AppError> {
    let mut upload = FileUpload::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                upload.file_content_type = field.content_type().map(str::to_string);
                upload.file_name = field.file_name().map(str::to_string);
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
                upload.file = Some(bytes);
            }
            "turnstile_token" | "sender_context" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Invalid form field: {e}")))?;
                if name == "turnstile_token" {
                    upload.turnstile_token = Some(value);
                } else {
                    upload.sender_context = Some(value);
                }
            }
            _ => {}
        }
    }

    Ok(upload)
}
