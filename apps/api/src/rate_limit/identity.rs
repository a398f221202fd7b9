//! Client identity used as the rate-limit key.

use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts, http::HeaderMap};

/// Sentinel identity when no address header is present.
/// All such clients share one bucket.
pub const UNKNOWN_IDENTITY: &str = "unknown";

/// Set by the edge proxy; the leftmost entry is the originating client.
const FORWARDED_FOR: &str = "x-forwarded-for";
/// Best-effort fallback; clients can set this themselves.
const REAL_IP: &str = "x-real-ip";

/// The network identity of the caller, derived from proxy headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity(pub String);

impl ClientIdentity {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let identity = header_value(headers, FORWARDED_FOR)
            .and_then(|v| v.split(',').next().map(str::trim).map(str::to_string))
            .filter(|v| !v.is_empty())
            .or_else(|| header_value(headers, REAL_IP).map(str::to_string))
            .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string());

        Self(identity)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The address to forward to the verification service, if one is known.
    pub fn remote_ip(&self) -> Option<&str> {
        (self.0 != UNKNOWN_IDENTITY).then_some(self.0.as_str())
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

#[async_trait]
impl<S> FromRequestParts<S> for ClientIdentity
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers))
    }
}
