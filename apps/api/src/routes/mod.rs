pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::chat::handlers::handle_chat;
use crate::outreach::extract::MAX_PDF_BYTES;
use crate::outreach::handlers::{handle_file_outreach, handle_text_outreach, handle_url_outreach};
use crate::state::AppState;

/// Headroom for multipart framing and the small text fields around the PDF.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Outreach API
        .route("/api/outreach/text", post(handle_text_outreach))
        .route(
            "/api/outreach/file",
            post(handle_file_outreach)
                .layer(DefaultBodyLimit::max(MAX_PDF_BYTES + MULTIPART_OVERHEAD_BYTES)),
        )
        .route("/api/outreach/url", post(handle_url_outreach))
        // Market intelligence
        .route("/api/chat", post(handle_chat))
        .with_state(state)
}
