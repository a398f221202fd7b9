//! Sliding-window rate limiter backed by the shared key-value store.
//!
//! Each client identity owns one record, `ratelimit:<identity>`, holding the
//! timestamps of its admitted requests. Expired timestamps are pruned on every
//! check; the store TTL (window + grace) is the only garbage collection.
//!
//! The read-modify-write is not atomic. Two concurrent requests from the same
//! identity can both read the pre-update record and both be admitted, so the
//! bound of `max_requests` per window is approximate under concurrency.
//!
//! Store failures fail OPEN: the limiter is a cost control, not a security
//! boundary.

use std::sync::Arc;

use serde::{ser::SerializeStruct, Deserialize, Serialize, Serializer};
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::{KvStore, StoreError};

pub mod identity;

pub use identity::ClientIdentity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Maximum admitted requests per window.
    pub max_requests: u32,
    /// Trailing window length in seconds.
    pub window_secs: u64,
    /// Added to the window to form the store TTL.
    pub ttl_grace_secs: u64,
    pub key_prefix: String,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 20,
            window_secs: 60,
            ttl_grace_secs: 10,
            key_prefix: "ratelimit".to_string(),
        }
    }
}

impl RateLimitConfig {
    pub fn ttl_secs(&self) -> u64 {
        self.window_secs + self.ttl_grace_secs
    }
}

/// Outcome of an admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed { remaining: u32, reset_at: i64 },
    Limited { retry_after: u64, error: String },
}

impl RateLimitDecision {
    fn allowed(remaining: u32, reset_at: i64) -> Self {
        Self::Allowed {
            remaining,
            reset_at,
        }
    }

    fn limited(retry_after: u64) -> Self {
        Self::Limited {
            retry_after,
            error: format!("Too many requests. Please try again in {retry_after} seconds."),
        }
    }

    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn remaining(&self) -> u32 {
        match self {
            Self::Allowed { remaining, .. } => *remaining,
            Self::Limited { .. } => 0,
        }
    }
}

// Wire shape: `{allowed, remaining, resetAt}` or `{allowed, error, retryAfter, remaining}`.
impl Serialize for RateLimitDecision {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Allowed {
                remaining,
                reset_at,
            } => {
                let mut s = serializer.serialize_struct("RateLimitDecision", 3)?;
                s.serialize_field("allowed", &true)?;
                s.serialize_field("remaining", remaining)?;
                s.serialize_field("resetAt", reset_at)?;
                s.end()
            }
            Self::Limited { retry_after, error } => {
                let mut s = serializer.serialize_struct("RateLimitDecision", 4)?;
                s.serialize_field("allowed", &false)?;
                s.serialize_field("error", error)?;
                s.serialize_field("retryAfter", retry_after)?;
                s.serialize_field("remaining", &0u32)?;
                s.end()
            }
        }
    }
}

/// Stored form of one identity's window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct RateWindow {
    timestamps: Vec<i64>,
}

/// Applies the sliding-window rule to `timestamps` at time `now`.
///
/// Returns the decision and, when admitted, the pruned window with `now`
/// appended. A rejection never produces a write.
fn evaluate(
    mut timestamps: Vec<i64>,
    now: i64,
    config: &RateLimitConfig,
) -> (RateLimitDecision, Option<RateWindow>) {
    let window = config.window_secs as i64;
    let window_start = now - window;

    timestamps.retain(|&ts| ts > window_start);

    if timestamps.len() >= config.max_requests as usize {
        let oldest = timestamps.iter().copied().min().unwrap_or(now);
        let retry_after = (oldest + window - now).max(1) as u64;
        return (RateLimitDecision::limited(retry_after), None);
    }

    timestamps.push(now);
    let remaining = config
        .max_requests
        .saturating_sub(timestamps.len() as u32);

    (
        RateLimitDecision::allowed(remaining, now + window),
        Some(RateWindow { timestamps }),
    )
}

/// Per-identity sliding-window limiter. Cheap to clone.
#[derive(Clone)]
pub struct RateLimiter {
    store: Option<Arc<dyn KvStore>>,
    clock: Arc<dyn Clock>,
    config: RateLimitConfig,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn KvStore>, config: RateLimitConfig) -> Self {
        Self {
            store: Some(store),
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// A limiter with no backing store. Every check is admitted.
    pub fn disabled(config: RateLimitConfig) -> Self {
        Self {
            store: None,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_some()
    }

    fn key(&self, identity: &str) -> String {
        format!("{}:{}", self.config.key_prefix, identity)
    }

    /// Admits or rejects one request from `identity`. Never fails.
    pub async fn check(&self, identity: &str) -> RateLimitDecision {
        let now = self.clock.now_secs();

        let Some(store) = &self.store else {
            return self.open_decision(now);
        };

        match self.check_with_store(store.as_ref(), identity, now).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(identity, error = %e, "Rate limit store failed, admitting request");
                self.open_decision(now)
            }
        }
    }

    async fn check_with_store(
        &self,
        store: &dyn KvStore,
        identity: &str,
        now: i64,
    ) -> Result<RateLimitDecision, StoreError> {
        let key = self.key(identity);

        let window = match store.get(&key).await? {
            Some(value) => {
                serde_json::from_value::<RateWindow>(value).map_err(|e| StoreError::Malformed {
                    key: key.clone(),
                    message: e.to_string(),
                })?
            }
            None => RateWindow::default(),
        };

        let (decision, updated) = evaluate(window.timestamps, now, &self.config);

        match (&decision, updated) {
            (RateLimitDecision::Allowed { remaining, .. }, Some(updated)) => {
                let value = serde_json::to_value(&updated).map_err(|e| StoreError::Malformed {
                    key: key.clone(),
                    message: e.to_string(),
                })?;
                // A failed write still admits; the next check just sees a shorter window.
                if let Err(e) = store.put(&key, &value, self.config.ttl_secs()).await {
                    warn!(identity, error = %e, "Failed to persist rate limit window");
                }
                debug!(identity, remaining, "Request admitted");
            }
            (RateLimitDecision::Limited { retry_after, .. }, _) => {
                info!(identity, retry_after, "Request rate limited");
            }
            _ => {}
        }

        Ok(decision)
    }

    fn open_decision(&self, now: i64) -> RateLimitDecision {
        RateLimitDecision::allowed(
            self.config.max_requests,
            now + self.config.window_secs as i64,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use serde_json::json;

    fn limiter_at(start: i64) -> (RateLimiter, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(MemoryStore::with_clock(clock.clone()));
        let limiter =
            RateLimiter::new(store.clone(), RateLimitConfig::default()).with_clock(clock.clone());
        (limiter, clock, store)
    }

    struct FailingStore;

    #[async_trait]
    impl KvStore for FailingStore {
        async fn get(&self, _key: &str) -> Result<Option<serde_json::Value>, StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }

        async fn put(
            &self,
            _key: &str,
            _value: &serde_json::Value,
            _ttl_secs: u64,
        ) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("connection refused".to_string()))
        }
    }

    #[test]
    fn test_evaluate_prunes_timestamps_at_window_start() {
        let config = RateLimitConfig::default();
        let (decision, updated) = evaluate(vec![40, 41, 50], 100, &config);

        assert!(decision.is_allowed());
        // 40 == window_start is dropped, 41 survives
        assert_eq!(updated.unwrap().timestamps, vec![41, 50, 100]);
    }

    #[test]
    fn test_evaluate_rejection_does_not_write() {
        let config = RateLimitConfig {
            max_requests: 2,
            ..RateLimitConfig::default()
        };
        let (decision, updated) = evaluate(vec![10, 20], 30, &config);

        assert_eq!(decision, RateLimitDecision::limited(40));
        assert!(updated.is_none());
    }

    #[test]
    fn test_retry_after_is_at_least_one() {
        let config = RateLimitConfig {
            max_requests: 1,
            ..RateLimitConfig::default()
        };
        // 42 is the oldest survivor at 101 and leaves the window at 102
        let (decision, _) = evaluate(vec![42], 101, &config);
        match decision {
            RateLimitDecision::Limited { retry_after, .. } => assert_eq!(retry_after, 1),
            other => panic!("expected Limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_remaining_decreases_by_one_per_admitted_request() {
        let (limiter, clock, _) = limiter_at(1_000);

        for expected in (0..20).rev() {
            let decision = limiter.check("1.2.3.4").await;
            assert!(decision.is_allowed());
            assert_eq!(decision.remaining(), expected);
            clock.advance(1);
        }
    }

    #[tokio::test]
    async fn test_request_over_limit_is_rejected() {
        let (limiter, _, _) = limiter_at(1_000);

        for _ in 0..20 {
            assert!(limiter.check("1.2.3.4").await.is_allowed());
        }

        let decision = limiter.check("1.2.3.4").await;
        assert_eq!(decision.remaining(), 0);
        match decision {
            RateLimitDecision::Limited { retry_after, .. } => assert!(retry_after >= 1),
            other => panic!("expected Limited, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejected_attempts_are_not_counted() {
        let (limiter, clock, store) = limiter_at(0);

        for _ in 0..20 {
            limiter.check("a").await;
        }
        for _ in 0..5 {
            assert!(!limiter.check("a").await.is_allowed());
        }

        let stored = store.get("ratelimit:a").await.unwrap().unwrap();
        assert_eq!(stored["timestamps"].as_array().unwrap().len(), 20);

        clock.set(60);
        assert!(limiter.check("a").await.is_allowed());
    }

    #[tokio::test]
    async fn test_admitted_again_after_retry_after_elapses() {
        let (limiter, clock, _) = limiter_at(0);

        for t in 0..20 {
            clock.set(t);
            limiter.check("1.2.3.4").await;
        }

        clock.set(25);
        let retry_after = match limiter.check("1.2.3.4").await {
            RateLimitDecision::Limited { retry_after, .. } => retry_after,
            other => panic!("expected Limited, got {other:?}"),
        };
        assert_eq!(retry_after, 35);

        clock.advance(retry_after as i64);
        let decision = limiter.check("1.2.3.4").await;
        assert!(decision.is_allowed());
        // t=0 has left the window; 19 survivors plus this request
        assert_eq!(decision.remaining(), 0);
    }

    #[tokio::test]
    async fn test_identities_are_isolated() {
        let (limiter, _, _) = limiter_at(500);

        for _ in 0..20 {
            limiter.check("10.0.0.1").await;
        }
        assert!(!limiter.check("10.0.0.1").await.is_allowed());

        let other = limiter.check("10.0.0.2").await;
        assert!(other.is_allowed());
        assert_eq!(other.remaining(), 19);
    }

    #[tokio::test]
    async fn test_store_failure_fails_open() {
        let limiter = RateLimiter::new(Arc::new(FailingStore), RateLimitConfig::default())
            .with_clock(Arc::new(ManualClock::new(100)));

        for _ in 0..30 {
            let decision = limiter.check("1.2.3.4").await;
            assert!(decision.is_allowed());
        }
    }

    #[tokio::test]
    async fn test_malformed_record_fails_open() {
        let (limiter, _, store) = limiter_at(100);
        store
            .put("ratelimit:1.2.3.4", &json!({"timestamps": "not-a-list"}), 70)
            .await
            .unwrap();

        let decision = limiter.check("1.2.3.4").await;
        assert_eq!(
            decision,
            RateLimitDecision::Allowed {
                remaining: 20,
                reset_at: 160,
            }
        );
    }

    #[tokio::test]
    async fn test_disabled_limiter_always_admits() {
        let limiter = RateLimiter::disabled(RateLimitConfig::default());
        assert!(!limiter.is_enabled());

        for _ in 0..100 {
            assert!(limiter.check("1.2.3.4").await.is_allowed());
        }
    }

    #[tokio::test]
    async fn test_record_written_with_window_plus_grace_ttl() {
        let (limiter, clock, store) = limiter_at(0);

        limiter.check("1.2.3.4").await;
        clock.set(69);
        assert!(store.get("ratelimit:1.2.3.4").await.unwrap().is_some());
        clock.set(70);
        assert!(store.get("ratelimit:1.2.3.4").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_saturated_client_recovers_after_window() {
        let (limiter, clock, _) = limiter_at(0);

        for _ in 0..20 {
            assert!(limiter.check("1.2.3.4").await.is_allowed());
        }

        clock.set(20);
        match limiter.check("1.2.3.4").await {
            RateLimitDecision::Limited { retry_after, .. } => assert_eq!(retry_after, 40),
            other => panic!("expected Limited, got {other:?}"),
        }

        clock.set(61);
        let decision = limiter.check("1.2.3.4").await;
        assert!(decision.is_allowed());
        assert_eq!(decision.remaining(), 19);
    }

    #[test]
    fn test_decision_serializes_to_wire_shape() {
        let allowed = serde_json::to_value(RateLimitDecision::allowed(3, 160)).unwrap();
        assert_eq!(allowed, json!({"allowed": true, "remaining": 3, "resetAt": 160}));

        let limited = serde_json::to_value(RateLimitDecision::limited(40)).unwrap();
        assert_eq!(limited["allowed"], json!(false));
        assert_eq!(limited["retryAfter"], json!(40));
        assert_eq!(limited["remaining"], json!(0));
        assert!(limited["error"].as_str().unwrap().contains("40 seconds"));
    }
}
