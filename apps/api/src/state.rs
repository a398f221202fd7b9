use std::sync::Arc;

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::rate_limit::RateLimiter;
use crate::verification::TokenVerifier;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub llm: LlmClient,
    /// Plain HTTP client for fetching profile URLs.
    pub http: reqwest::Client,
    /// Sliding-window limiter. Runs as a no-op when no store is configured.
    pub rate_limiter: RateLimiter,
    /// Pluggable bot verification. Default: TurnstileVerifier.
    pub verifier: Arc<dyn TokenVerifier>,
    pub config: Config,
}
