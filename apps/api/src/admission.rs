//! Request admission shared by every generation endpoint:
//! rate limiter first, then bot verification.

use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::errors::AppError;
use crate::rate_limit::{ClientIdentity, RateLimitDecision};
use crate::state::AppState;

/// Quota information for an admitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: i64,
}

impl Admission {
    /// `X-RateLimit-*` headers describing the caller's quota.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(self.limit),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(self.remaining),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(self.reset_at),
        );
        headers
    }
}

/// Admits a request from `identity` carrying `token`, or returns the error to
/// relay. Rate-limited requests never reach the verification service.
pub async fn admit(
    state: &AppState,
    identity: &ClientIdentity,
    token: Option<&str>,
) -> Result<Admission, AppError> {
    let admission = match state.rate_limiter.check(identity.as_str()).await {
        RateLimitDecision::Allowed {
            remaining,
            reset_at,
        } => Admission {
            limit: state.rate_limiter.config().max_requests,
            remaining,
            reset_at,
        },
        RateLimitDecision::Limited { retry_after, error } => {
            return Err(AppError::RateLimited {
                retry_after,
                message: error,
            })
        }
    };

    if !state.verifier.verify(token, identity.remote_ip()).await {
        tracing::info!(identity = identity.as_str(), "Bot verification failed");
        return Err(AppError::VerificationFailed);
    }

    Ok(admission)
}
