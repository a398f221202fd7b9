//! Single-flight request lock for a client session.
//!
//! Serializes the "get a verification token, then send the request" cycle so
//! that one session never has two cycles in flight. A concurrent `acquire`
//! is rejected, never queued.
//!
//! ```text
//!   Idle ──acquire──▶ Acquiring ──deliver_token──▶ Holding
//!    ▲                    │                           │
//!    └──────timeout───────┘◀──────release(id)─────────┘
//! ```
//!
//! Every acquisition gets a fresh holder id. Only the holder that owns the
//! current id can move the lock back to `Idle`, so a late release from an
//! abandoned cycle cannot free a newer one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;
use uuid::Uuid;

/// How long `acquire` waits for the verification widget.
pub const TOKEN_TIMEOUT: Duration = Duration::from_secs(10);

/// Side effects the lock drives on the session's UI.
pub trait SessionUi: Send + Sync {
    /// Enables or disables every control that can start a request.
    fn set_controls_enabled(&self, enabled: bool);

    /// Asks the verification widget for a fresh token. The widget answers
    /// later through [`RequestLock::deliver_token`].
    fn request_token(&self);
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("A request is already in progress. Please wait.")]
    InProgress,

    #[error("Verification timed out. Please try again.")]
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Acquiring,
    Holding,
}

/// A successful acquisition. `holder_id` must be passed back to `release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquired {
    pub token: String,
    pub holder_id: Uuid,
}

#[derive(Default)]
struct Inner {
    holder_id: Option<Uuid>,
    token: Option<String>,
    waiter: Option<oneshot::Sender<String>>,
}

/// Session-scoped lock controller. Share it behind an `Arc`.
pub struct RequestLock {
    inner: Mutex<Inner>,
    ui: Arc<dyn SessionUi>,
    timeout: Duration,
}

impl RequestLock {
    pub fn new(ui: Arc<dyn SessionUi>) -> Self {
        Self::with_timeout(ui, TOKEN_TIMEOUT)
    }

    pub fn with_timeout(ui: Arc<dyn SessionUi>, timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ui,
            timeout,
        }
    }

    pub fn state(&self) -> LockState {
        let inner = self.inner.lock();
        match (&inner.holder_id, &inner.waiter) {
            (None, _) => LockState::Idle,
            (Some(_), Some(_)) => LockState::Acquiring,
            (Some(_), None) => LockState::Holding,
        }
    }

    /// The most recently delivered token, if any.
    pub fn cached_token(&self) -> Option<String> {
        self.inner.lock().token.clone()
    }

    /// Takes the lock and waits for a fresh verification token.
    pub async fn acquire(&self) -> Result<Acquired, LockError> {
        let holder_id = Uuid::new_v4();

        let rx = {
            let mut inner = self.inner.lock();
            if inner.holder_id.is_some() {
                return Err(LockError::InProgress);
            }
            let (tx, rx) = oneshot::channel();
            inner.holder_id = Some(holder_id);
            inner.token = None;
            inner.waiter = Some(tx);
            rx
        };

        // Dropping this future mid-wait must not strand the lock.
        let mut guard = HolderGuard::new(self, holder_id);

        self.ui.set_controls_enabled(false);
        self.ui.request_token();

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(token)) => {
                guard.disarm();
                debug!(%holder_id, "Verification token acquired");
                Ok(Acquired { token, holder_id })
            }
            _ => {
                debug!(%holder_id, "Timed out waiting for verification token");
                Err(LockError::Timeout)
            }
        }
    }

    /// Completion callback of the verification widget.
    pub fn deliver_token(&self, token: String) {
        let mut inner = self.inner.lock();
        inner.token = Some(token.clone());
        if let Some(waiter) = inner.waiter.take() {
            if waiter.send(token).is_err() {
                debug!("Token arrived after the acquisition gave up");
            }
        }
    }

    /// Returns the lock to `Idle` and drops the cached token if `holder_id`
    /// is the current holder. Stale or repeated releases are no-ops.
    pub fn release(&self, holder_id: Uuid) {
        if self.clear_holder(holder_id) {
            self.ui.set_controls_enabled(true);
        } else {
            debug!(%holder_id, "Ignoring release from a stale holder");
        }
    }

    /// Acquires, runs `f` with the token, and releases even if `f` panics or
    /// the returned future is dropped.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, LockError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = T>,
    {
        let Acquired { token, holder_id } = self.acquire().await?;
        let _guard = HolderGuard::new(self, holder_id);
        Ok(f(token).await)
    }

    fn clear_holder(&self, holder_id: Uuid) -> bool {
        let mut inner = self.inner.lock();
        if inner.holder_id != Some(holder_id) {
            return false;
        }
        inner.holder_id = None;
        inner.token = None;
        inner.waiter = None;
        true
    }
}

/// Releases `holder_id` on drop unless disarmed.
struct HolderGuard<'a> {
    lock: &'a RequestLock,
    holder_id: Uuid,
    armed: bool,
}

impl<'a> HolderGuard<'a> {
    fn new(lock: &'a RequestLock, holder_id: Uuid) -> Self {
        Self {
            lock,
            holder_id,
            armed: true,
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for HolderGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.lock.release(self.holder_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingUi {
        controls_disabled: AtomicBool,
        token_requests: AtomicUsize,
    }

    impl SessionUi for RecordingUi {
        fn set_controls_enabled(&self, enabled: bool) {
            self.controls_disabled.store(!enabled, Ordering::SeqCst);
        }

        fn request_token(&self) {
            self.token_requests.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn new_lock() -> (Arc<RequestLock>, Arc<RecordingUi>) {
        let ui = Arc::new(RecordingUi::default());
        (Arc::new(RequestLock::new(ui.clone())), ui)
    }

    async fn wait_for_state(lock: &RequestLock, state: LockState) {
        while lock.state() != state {
            tokio::task::yield_now().await;
        }
    }

    /// Runs `acquire` on a task and answers it with `token`.
    async fn acquire_with(lock: &Arc<RequestLock>, token: &str) -> Acquired {
        let task = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await })
        };
        wait_for_state(lock, LockState::Acquiring).await;
        lock.deliver_token(token.to_string());
        task.await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_acquire_resolves_with_delivered_token() {
        let (lock, ui) = new_lock();
        assert_eq!(lock.state(), LockState::Idle);

        let acquired = acquire_with(&lock, "tok-1").await;

        assert_eq!(acquired.token, "tok-1");
        assert_eq!(lock.state(), LockState::Holding);
        assert!(ui.controls_disabled.load(Ordering::SeqCst));
        assert_eq!(ui.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_while_held_is_rejected_without_touching_token() {
        let (lock, ui) = new_lock();
        acquire_with(&lock, "tok-a").await;

        let err = lock.acquire().await.unwrap_err();

        assert_eq!(err, LockError::InProgress);
        assert_eq!(err.to_string(), "A request is already in progress. Please wait.");
        assert_eq!(lock.cached_token().as_deref(), Some("tok-a"));
        assert_eq!(lock.state(), LockState::Holding);
        assert_eq!(ui.token_requests.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_acquire_while_acquiring_is_rejected() {
        let (lock, _) = new_lock();
        let task = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await })
        };
        wait_for_state(&lock, LockState::Acquiring).await;

        assert_eq!(lock.acquire().await.unwrap_err(), LockError::InProgress);

        lock.deliver_token("tok".to_string());
        assert!(task.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_release_returns_to_idle_and_enables_controls() {
        let (lock, ui) = new_lock();
        let acquired = acquire_with(&lock, "tok").await;

        assert_eq!(lock.cached_token().as_deref(), Some("tok"));

        lock.release(acquired.holder_id);

        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.cached_token(), None);
        assert!(!ui.controls_disabled.load(Ordering::SeqCst));

        // Idempotent
        lock.release(acquired.holder_id);
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[tokio::test]
    async fn test_stale_release_does_not_affect_current_holder() {
        let (lock, ui) = new_lock();
        let first = acquire_with(&lock, "tok-1").await;
        lock.release(first.holder_id);

        let second = acquire_with(&lock, "tok-2").await;
        lock.release(first.holder_id);
        lock.release(Uuid::new_v4());

        assert_eq!(lock.state(), LockState::Holding);
        assert_eq!(lock.cached_token().as_deref(), Some("tok-2"));
        assert!(ui.controls_disabled.load(Ordering::SeqCst));

        lock.release(second.holder_id);
        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.cached_token(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_returns_lock_to_idle() {
        let (lock, ui) = new_lock();

        let err = lock.acquire().await.unwrap_err();

        assert_eq!(err, LockError::Timeout);
        assert_eq!(err.to_string(), "Verification timed out. Please try again.");
        assert_eq!(lock.state(), LockState::Idle);
        assert!(!ui.controls_disabled.load(Ordering::SeqCst));

        // A fresh acquisition works straight away
        let acquired = acquire_with(&lock, "tok-late").await;
        assert_eq!(acquired.token, "tok-late");
        assert_eq!(ui.token_requests.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_token_after_timeout_is_only_cached() {
        let (lock, _) = new_lock();
        assert_eq!(lock.acquire().await.unwrap_err(), LockError::Timeout);

        lock.deliver_token("late".to_string());

        assert_eq!(lock.state(), LockState::Idle);
        assert_eq!(lock.cached_token().as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn test_acquire_clears_previous_token() {
        let (lock, _) = new_lock();
        lock.deliver_token("old".to_string());

        let task = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.acquire().await })
        };
        wait_for_state(&lock, LockState::Acquiring).await;
        assert_eq!(lock.cached_token(), None);

        lock.deliver_token("new".to_string());
        assert_eq!(task.await.unwrap().unwrap().token, "new");
    }

    #[tokio::test]
    async fn test_run_releases_after_completion() {
        let (lock, _) = new_lock();
        let task = {
            let lock = lock.clone();
            tokio::spawn(async move { lock.run(|token| async move { token.len() }).await })
        };
        wait_for_state(&lock, LockState::Acquiring).await;
        lock.deliver_token("abcd".to_string());

        assert_eq!(task.await.unwrap(), Ok(4));
        assert_eq!(lock.state(), LockState::Idle);
    }

    #[tokio::test]
    async fn test_run_releases_when_cancelled() {
        let (lock, _) = new_lock();
        let task = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.run(|_| std::future::pending::<()>()).await
            })
        };
        wait_for_state(&lock, LockState::Acquiring).await;
        lock.deliver_token("tok".to_string());
        wait_for_state(&lock, LockState::Holding).await;

        task.abort();
        let _ = task.await;

        assert_eq!(lock.state(), LockState::Idle);
    }
}
