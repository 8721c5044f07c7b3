//! One-shot timer that refreshes the access token before it expires

use crate::error::AuthError;
use crate::lock;
use crate::tokens::TokenStore;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Performs one refresh; the returned future resolves when it is done
pub type RefreshCallback = Arc<dyn Fn() -> BoxFuture<'static, Result<(), AuthError>> + Send + Sync>;

/// Re-arming right after a refresh never waits less than this, so a server
/// handing out lifetimes shorter than the buffer cannot cause a refresh storm.
const MIN_REARM_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Firing,
}

struct Inner {
    state: SchedulerState,
    callback: Option<RefreshCallback>,
    timer: Option<JoinHandle<()>>,
    /// Bumped by `start` and `stop`; completions from older generations are dropped
    generation: u64,
}

impl Inner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

struct Shared {
    tokens: TokenStore,
    inner: Mutex<Inner>,
}

/// Keeps at most one refresh timer armed
#[derive(Clone)]
pub struct RefreshScheduler {
    shared: Arc<Shared>,
}

impl fmt::Debug for RefreshScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshScheduler")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl RefreshScheduler {
    pub fn new(tokens: TokenStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                tokens,
                inner: Mutex::new(Inner {
                    state: SchedulerState::Idle,
                    callback: None,
                    timer: None,
                    generation: 0,
                }),
            }),
        }
    }

    fn from_weak(weak: &Weak<Shared>) -> Option<Self> {
        weak.upgrade().map(|shared| Self { shared })
    }

    pub fn state(&self) -> SchedulerState {
        lock(&self.shared.inner).state
    }

    /// Replace any armed timer and schedule `callback` ahead of expiry
    ///
    /// When the tokens are already past expiry the callback is invoked before
    /// this returns.
    pub fn start(&self, callback: RefreshCallback) {
        let generation = {
            let mut inner = lock(&self.shared.inner);
            inner.cancel_timer();
            inner.generation += 1;
            inner.callback = Some(callback);
            inner.state = SchedulerState::Armed;
            inner.generation
        };

        if self.shared.tokens.time_until_expiration().is_zero() {
            debug!("tokens already expired, refreshing immediately");
            self.fire(generation);
        } else {
            self.arm(generation, Duration::ZERO);
        }
    }

    /// Cancel the timer and forget the callback
    pub fn stop(&self) {
        let mut inner = lock(&self.shared.inner);
        inner.cancel_timer();
        inner.generation += 1;
        inner.callback = None;
        if inner.state != SchedulerState::Idle {
            debug!("refresh scheduler stopped");
        }
        inner.state = SchedulerState::Idle;
    }

    /// Fire now instead of waiting for the timer if the token is due
    ///
    /// Returns whether a refresh was started.
    pub fn check_and_refresh_now(&self) -> bool {
        if !self.shared.tokens.needs_refresh() {
            return false;
        }
        let generation = {
            let mut inner = lock(&self.shared.inner);
            if inner.state != SchedulerState::Armed || inner.callback.is_none() {
                return false;
            }
            inner.cancel_timer();
            inner.generation
        };
        self.fire(generation);
        true
    }

    fn arm(&self, generation: u64, min_delay: Duration) {
        let delay = self
            .shared
            .tokens
            .time_until_expiration()
            .saturating_sub(self.shared.tokens.refresh_buffer())
            .max(min_delay);

        let mut inner = lock(&self.shared.inner);
        if inner.generation != generation || inner.state != SchedulerState::Armed {
            return;
        }

        debug!(delay_ms = delay.as_millis(), "refresh timer armed");
        let weak = Arc::downgrade(&self.shared);
        let deadline = tokio::time::Instant::now() + delay;
        inner.timer = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            if let Some(scheduler) = Self::from_weak(&weak) {
                scheduler.fire(generation);
            }
        }));
    }

    fn fire(&self, generation: u64) {
        let callback = {
            let mut inner = lock(&self.shared.inner);
            if inner.generation != generation || inner.state != SchedulerState::Armed {
                return;
            }
            let Some(callback) = inner.callback.clone() else {
                inner.state = SchedulerState::Idle;
                return;
            };
            inner.state = SchedulerState::Firing;
            // Detach rather than abort: the callback may stop this scheduler
            // from inside the refresh it is running.
            inner.timer = None;
            callback
        };

        let refresh = callback();
        let weak = Arc::downgrade(&self.shared);
        tokio::spawn(async move {
            let result = refresh.await;
            if let Some(scheduler) = Self::from_weak(&weak) {
                scheduler.complete(generation, result);
            }
        });
    }

    fn complete(&self, generation: u64, result: Result<(), AuthError>) {
        {
            let mut inner = lock(&self.shared.inner);
            if inner.generation != generation || inner.state != SchedulerState::Firing {
                debug!("ignoring refresh completion for a stopped schedule");
                return;
            }
            match result {
                Ok(()) => inner.state = SchedulerState::Armed,
                Err(error) => {
                    warn!(%error, "scheduled token refresh failed, not rescheduling");
                    inner.state = SchedulerState::Idle;
                    inner.callback = None;
                    return;
                }
            }
        }
        self.arm(generation, MIN_REARM_DELAY);
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        lock(&self.inner).cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, MonotonicClock};
    use crate::storage::MemoryStore;
    use futures::FutureExt;
    use shiftclock_core::TokenPair;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BUFFER: Duration = Duration::from_secs(300);

    struct Fixture {
        tokens: TokenStore,
        clock: Arc<MonotonicClock>,
        scheduler: RefreshScheduler,
        calls: Arc<AtomicUsize>,
    }

    impl Fixture {
        fn new() -> Self {
            let clock = Arc::new(MonotonicClock::starting_at(1_000_000));
            let tokens = TokenStore::new(
                Some(Arc::new(MemoryStore::new())),
                clock.clone(),
                BUFFER,
            );
            Self {
                scheduler: RefreshScheduler::new(tokens.clone()),
                tokens,
                clock,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn store_expiring_in(&self, lifetime: Duration) {
            let expires_at = self.clock.now_ms() + i64::try_from(lifetime.as_millis()).unwrap();
            self.tokens
                .set_tokens(&TokenPair::new("access", Some("refresh".into()), expires_at));
        }

        /// Callback that counts calls and, on success, issues a fresh 10 minute token
        fn callback(&self, succeed: bool) -> RefreshCallback {
            let calls = self.calls.clone();
            let tokens = self.tokens.clone();
            let clock = self.clock.clone();
            Arc::new(move || {
                calls.fetch_add(1, Ordering::SeqCst);
                let tokens = tokens.clone();
                let clock = clock.clone();
                async move {
                    if succeed {
                        tokens.set_tokens(&TokenPair::new(
                            "access-next",
                            Some("refresh-next".into()),
                            clock.now_ms() + 600_000,
                        ));
                        Ok(())
                    } else {
                        Err(AuthError::InvalidCredentials)
                    }
                }
                .boxed()
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_tokens_fire_before_start_returns() {
        let fx = Fixture::new();
        fx.store_expiring_in(Duration::ZERO);

        fx.scheduler.start(fx.callback(true));
        assert_eq!(fx.calls(), 1);
        assert_eq!(fx.scheduler.state(), SchedulerState::Firing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fires_refresh_buffer_before_expiry() {
        let fx = Fixture::new();
        fx.store_expiring_in(BUFFER + Duration::from_secs(10));

        fx.scheduler.start(fx.callback(true));
        assert_eq!(fx.scheduler.state(), SchedulerState::Armed);

        tokio::time::sleep(Duration::from_millis(9_500)).await;
        assert_eq!(fx.calls(), 0);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.calls(), 1);
        assert_eq!(fx.scheduler.state(), SchedulerState::Armed);
        assert_eq!(fx.tokens.get_access_token().as_deref(), Some("access-next"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_rearms_from_new_expiry() {
        let fx = Fixture::new();
        fx.store_expiring_in(BUFFER);

        fx.scheduler.start(fx.callback(true));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(fx.calls(), 1);

        // New token lives 10 minutes, so the next fire is 5 minutes out.
        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(fx.calls(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(fx.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_goes_idle_without_retry() {
        let fx = Fixture::new();
        fx.store_expiring_in(BUFFER + Duration::from_secs(1));

        fx.scheduler.start(fx.callback(false));
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(fx.calls(), 1);
        assert_eq!(fx.scheduler.state(), SchedulerState::Idle);

        tokio::time::sleep(Duration::from_secs(3_600)).await;
        assert_eq!(fx.calls(), 1);
        assert!(!fx.scheduler.check_and_refresh_now());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_pending_timer() {
        let fx = Fixture::new();
        fx.store_expiring_in(BUFFER + Duration::from_secs(5));

        fx.scheduler.start(fx.callback(true));
        fx.scheduler.stop();
        fx.scheduler.stop();
        assert_eq!(fx.scheduler.state(), SchedulerState::Idle);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_replaces_previous_timer() {
        let fx = Fixture::new();
        fx.store_expiring_in(BUFFER + Duration::from_secs(5));

        fx.scheduler.start(fx.callback(true));
        fx.scheduler.start(fx.callback(true));

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(fx.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_and_refresh_now() {
        let fx = Fixture::new();
        fx.store_expiring_in(Duration::from_secs(3_600));
        fx.scheduler.start(fx.callback(true));
        assert!(!fx.scheduler.check_and_refresh_now());
        assert_eq!(fx.calls(), 0);

        // Token shortened behind the scheduler's back.
        fx.store_expiring_in(Duration::from_secs(60));
        assert!(fx.scheduler.check_and_refresh_now());
        assert_eq!(fx.calls(), 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(fx.scheduler.state(), SchedulerState::Armed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_and_refresh_now_without_callback_is_noop() {
        let fx = Fixture::new();
        fx.store_expiring_in(Duration::from_secs(60));
        assert!(!fx.scheduler.check_and_refresh_now());
        assert_eq!(fx.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_completion_is_ignored_after_stop() {
        let fx = Fixture::new();
        fx.store_expiring_in(Duration::ZERO);

        let calls = fx.calls.clone();
        let slow: RefreshCallback = Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(())
            }
            .boxed()
        });

        fx.scheduler.start(slow);
        fx.scheduler.stop();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(fx.calls(), 1);
        assert_eq!(fx.scheduler.state(), SchedulerState::Idle);
    }
}
