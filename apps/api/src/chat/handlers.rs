use axum::{extract::State, http::HeaderMap, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::admission::admit;
use crate::chat::prompts::{build_conversation, MARKET_INTEL_SYSTEM};
use crate::errors::AppError;
use crate::llm_client::ChatMessage;
use crate::rate_limit::ClientIdentity;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
    pub turnstile_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub answer: String,
}

/// POST /api/chat
pub async fn handle_chat(
    State(state): State<AppState>,
    identity: ClientIdentity,
    Json(request): Json<ChatRequest>,
) -> Result<(HeaderMap, Json<ChatResponse>), AppError> {
    let admission = admit(&state, &identity, request.turnstile_token.as_deref()).await?;

    if request.query.trim().is_empty() {
        return Err(AppError::Validation("query cannot be empty".to_string()));
    }

    let messages = build_conversation(&request.history, &request.query);
    let answer = state.llm.converse(MARKET_INTEL_SYSTEM, &messages).await?;
    info!(turns = messages.len(), "Market intelligence answer generated");

    Ok((
        admission.headers(),
        Json(ChatResponse {
            answer: answer.trim().to_string(),
        }),
    ))
}
