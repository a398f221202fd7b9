//! Bot verification gate (Cloudflare Turnstile).
//!
//! Unlike the rate limiter this gate fails CLOSED: any network, status or
//! parse failure is reported as a failed verification.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

const SITEVERIFY_URL: &str = "https://challenges.cloudflare.com/turnstile/v0/siteverify";

/// Secret value that marks a local/dev deployment. Verification is skipped.
pub const DEV_BYPASS_SECRET: &str = "dev-bypass";

/// Validates a one-time proof-of-humanity token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> bool;
}

#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

#[derive(Clone)]
pub struct TurnstileVerifier {
    client: Client,
    secret: String,
    endpoint: String,
}

impl TurnstileVerifier {
    pub fn new(secret: String) -> anyhow::Result<Self> {
        Self::with_endpoint(secret, SITEVERIFY_URL.to_string())
    }

    pub fn with_endpoint(secret: String, endpoint: String) -> anyhow::Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(Duration::from_secs(10)).build()?,
            secret,
            endpoint,
        })
    }

    pub fn is_bypassed(&self) -> bool {
        self.secret == DEV_BYPASS_SECRET
    }

    async fn siteverify(
        &self,
        token: &str,
        remote_ip: Option<&str>,
    ) -> Result<SiteverifyResponse, reqwest::Error> {
        let mut form = vec![("secret", self.secret.as_str()), ("response", token)];
        if let Some(ip) = remote_ip {
            form.push(("remoteip", ip));
        }

        self.client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await?
            .error_for_status()?
            .json::<SiteverifyResponse>()
            .await
    }
}

#[async_trait]
impl TokenVerifier for TurnstileVerifier {
    async fn verify(&self, token: Option<&str>, remote_ip: Option<&str>) -> bool {
        if self.is_bypassed() {
            return true;
        }

        let Some(token) = token.map(str::trim).filter(|t| !t.is_empty()) else {
            debug!("Verification token missing");
            return false;
        };

        match self.siteverify(token, remote_ip).await {
            Ok(body) if body.success => true,
            Ok(body) => {
                debug!(error_codes = ?body.error_codes, "Verification rejected");
                false
            }
            Err(e) => {
                warn!("Verification service error: {e}");
                false
            }
        }
    }
}
