use anyhow::{Context, Result};

use crate::rate_limit::RateLimitConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Optional. When unset the rate limiter runs in no-op mode.
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub anthropic_api_url: Option<String>,
    /// Turnstile secret. The sentinel `dev-bypass` disables verification.
    pub turnstile_secret_key: String,
    pub rate_limit: RateLimitConfig,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let defaults = RateLimitConfig::default();

        Ok(Config {
            redis_url: optional_env("REDIS_URL"),
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            anthropic_api_url: optional_env("ANTHROPIC_API_URL"),
            turnstile_secret_key: require_env("TURNSTILE_SECRET_KEY")?,
            rate_limit: RateLimitConfig {
                max_requests: parse_positive_env(
                    "RATE_LIMIT_MAX_REQUESTS",
                    defaults.max_requests,
                )?,
                window_secs: parse_positive_env("RATE_LIMIT_WINDOW_SECS", defaults.window_secs)?,
                ..defaults
            },
            port: parse_env("PORT", 8080u16).context("PORT must be a valid port number")?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional_env(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Environment variable '{key}' has an invalid value: {raw}")),
        None => Ok(default),
    }
}

/// Like `parse_env`, but zero is rejected.
fn parse_positive_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Default + PartialEq,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let value = parse_env(key, default)?;
    anyhow::ensure!(
        value != T::default(),
        "Environment variable '{key}' must be greater than zero"
    );
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test owns its variable names; tests run in parallel.

    #[test]
    fn test_parse_positive_env_uses_default_when_unset() {
        assert_eq!(parse_positive_env("OUTREACH_TEST_UNSET_LIMIT", 20u32).unwrap(), 20);
    }

    #[test]
    fn test_parse_positive_env_accepts_override() {
        std::env::set_var("OUTREACH_TEST_WINDOW_OVERRIDE", " 30 ");
        assert_eq!(
            parse_positive_env("OUTREACH_TEST_WINDOW_OVERRIDE", 60u64).unwrap(),
            30
        );
    }

    #[test]
    fn test_parse_positive_env_rejects_zero() {
        std::env::set_var("OUTREACH_TEST_ZERO_WINDOW", "0");
        let err = parse_positive_env("OUTREACH_TEST_ZERO_WINDOW", 60u64).unwrap_err();
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_parse_positive_env_rejects_negative() {
        std::env::set_var("OUTREACH_TEST_NEGATIVE_MAX", "-5");
        assert!(parse_positive_env("OUTREACH_TEST_NEGATIVE_MAX", 20u32).is_err());
    }
}
