use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use outreach_api::config::Config;
use outreach_api::llm_client::{self, LlmClient};
use outreach_api::rate_limit::RateLimiter;
use outreach_api::routes::build_router;
use outreach_api::state::AppState;
use outreach_api::store::RedisStore;
use outreach_api::verification::TurnstileVerifier;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "outreach_api={},tower_http={}",
                &config.rust_log, &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Outreach API v{}", env!("CARGO_PKG_VERSION"));

    // Rate limiter: Redis when configured, otherwise a no-op
    let rate_limiter = match &config.redis_url {
        Some(url) => {
            let store = RedisStore::open(url).await?;
            info!(
                "Rate limiter backed by Redis ({} requests / {}s)",
                config.rate_limit.max_requests, config.rate_limit.window_secs
            );
            RateLimiter::new(Arc::new(store), config.rate_limit.clone())
        }
        None => {
            warn!("REDIS_URL not set; rate limiting is disabled");
            RateLimiter::disabled(config.rate_limit.clone())
        }
    };

    // Bot verification
    let verifier = TurnstileVerifier::new(config.turnstile_secret_key.clone())?;
    if verifier.is_bypassed() {
        warn!("Turnstile secret is the dev sentinel; bot verification is bypassed");
    }

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        config.anthropic_api_url.clone(),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(concat!("outreach-api/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // Build app state
    let state = AppState {
        llm,
        http,
        rate_limiter,
        verifier: Arc::new(verifier),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
