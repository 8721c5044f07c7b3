//! Idle and absolute session timeout detection

use crate::clock::Clock;
use crate::lock;
use serde::{Deserialize, Serialize};
use shiftclock_core::SessionConfig;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

const EVENT_CAPACITY: usize = 16;

/// `interval` panics on a zero period
const MIN_CHECK_PERIOD: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeoutReason {
    Idle,
    Session,
}

impl fmt::Display for TimeoutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Session => write!(f, "session"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Inactive,
    Active,
    Warning(TimeoutReason),
    TimedOut(TimeoutReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The session ends in `remaining` unless the user acts
    Warning {
        reason: TimeoutReason,
        remaining: Duration,
    },
    /// Sent once monitoring has stopped; the receiver is expected to log out
    TimedOut { reason: TimeoutReason },
}

/// Snapshot of the activity timestamps, in unix milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityState {
    pub last_activity_at: i64,
    pub session_started_at: Option<i64>,
    pub warning_active: bool,
}

struct Inner {
    state: MonitorState,
    activity: ActivityState,
    idle_warned: bool,
    session_warned: bool,
    checks: Vec<JoinHandle<()>>,
    generation: u64,
}

impl Inner {
    fn cancel_checks(&mut self) {
        for check in self.checks.drain(..) {
            check.abort();
        }
    }

    const fn is_monitoring(&self) -> bool {
        matches!(self.state, MonitorState::Active | MonitorState::Warning(_))
    }
}

struct Shared {
    config: SessionConfig,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<SessionEvent>,
    inner: Mutex<Inner>,
}

impl Drop for Shared {
    fn drop(&mut self) {
        lock(&self.inner).cancel_checks();
    }
}

/// Watches user activity and session age, emitting warnings and timeouts
#[derive(Clone)]
pub struct SessionMonitor {
    shared: Arc<Shared>,
}

impl fmt::Debug for SessionMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMonitor")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl SessionMonitor {
    pub fn new(config: SessionConfig, clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            shared: Arc::new(Shared {
                config,
                clock,
                events,
                inner: Mutex::new(Inner {
                    state: MonitorState::Inactive,
                    activity: ActivityState::default(),
                    idle_warned: false,
                    session_warned: false,
                    checks: Vec::new(),
                    generation: 0,
                }),
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    pub fn state(&self) -> MonitorState {
        lock(&self.shared.inner).state
    }

    pub fn activity(&self) -> ActivityState {
        lock(&self.shared.inner).activity
    }

    /// Begin a new monitored session, replacing any checks already running
    pub fn start_monitoring(&self) {
        let now = self.shared.clock.now_ms();
        let mut inner = lock(&self.shared.inner);
        inner.cancel_checks();
        inner.generation += 1;
        inner.state = MonitorState::Active;
        inner.activity = ActivityState {
            last_activity_at: now,
            session_started_at: Some(now),
            warning_active: false,
        };
        inner.idle_warned = false;
        inner.session_warned = false;

        let generation = inner.generation;
        let config = &self.shared.config;
        inner.checks = vec![
            self.spawn_check(generation, TimeoutReason::Idle, config.idle_check_interval()),
            self.spawn_check(
                generation,
                TimeoutReason::Session,
                config.session_check_interval(),
            ),
        ];
        debug!("session monitoring started");
    }

    pub fn stop_monitoring(&self) {
        let mut inner = lock(&self.shared.inner);
        inner.cancel_checks();
        inner.generation += 1;
        if inner.state != MonitorState::Inactive {
            debug!("session monitoring stopped");
        }
        inner.state = MonitorState::Inactive;
        inner.activity = ActivityState::default();
        inner.idle_warned = false;
        inner.session_warned = false;
    }

    /// Reset the idle clock; an idle or session warning is dismissed
    ///
    /// The session-length clock keeps running, so its warning may be
    /// raised again only if it was never raised for this session.
    pub fn record_activity(&self) {
        let now = self.shared.clock.now_ms();
        let mut inner = lock(&self.shared.inner);
        if !inner.is_monitoring() {
            return;
        }
        inner.activity.last_activity_at = now;
        inner.idle_warned = false;
        if let MonitorState::Warning(reason) = inner.state {
            debug!(%reason, "warning dismissed by activity");
            inner.state = MonitorState::Active;
            inner.activity.warning_active = false;
        }
    }

    /// Activity plus an explicit dismissal of any pending warning
    pub fn extend_session(&self) {
        self.record_activity();
        let mut inner = lock(&self.shared.inner);
        if inner.is_monitoring() {
            inner.activity.warning_active = false;
            inner.state = MonitorState::Active;
        }
    }

    fn spawn_check(
        &self,
        generation: u64,
        reason: TimeoutReason,
        period: Duration,
    ) -> JoinHandle<()> {
        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let period = period.max(MIN_CHECK_PERIOD);
        let first_tick = Instant::now() + period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(first_tick, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(shared) = weak.upgrade() else {
                    break;
                };
                let monitor = Self { shared };
                if !monitor.run_check(generation, reason) {
                    break;
                }
            }
        })
    }

    /// Evaluate one timeout; returns whether the check should keep running
    fn run_check(&self, generation: u64, reason: TimeoutReason) -> bool {
        let config = &self.shared.config;
        let (timeout, lead) = match reason {
            TimeoutReason::Idle => (config.idle_timeout(), config.idle_warning_lead()),
            TimeoutReason::Session => (config.session_timeout(), config.session_warning_lead()),
        };
        let now = self.shared.clock.now_ms();

        let event = {
            let mut guard = lock(&self.shared.inner);
            let inner = &mut *guard;
            if inner.generation != generation || !inner.is_monitoring() {
                return false;
            }
            let since = match reason {
                TimeoutReason::Idle => inner.activity.last_activity_at,
                TimeoutReason::Session => inner
                    .activity
                    .session_started_at
                    .unwrap_or(inner.activity.last_activity_at),
            };
            let elapsed = Duration::from_millis(u64::try_from(now - since).unwrap_or(0));

            if elapsed >= timeout {
                inner.state = MonitorState::TimedOut(reason);
                inner.activity.warning_active = false;
                inner.generation += 1;
                inner.cancel_checks();
                Some(SessionEvent::TimedOut { reason })
            } else if elapsed >= timeout.saturating_sub(lead) {
                let warned = match reason {
                    TimeoutReason::Idle => &mut inner.idle_warned,
                    TimeoutReason::Session => &mut inner.session_warned,
                };
                if *warned {
                    None
                } else {
                    *warned = true;
                    inner.state = MonitorState::Warning(reason);
                    inner.activity.warning_active = true;
                    Some(SessionEvent::Warning {
                        reason,
                        remaining: timeout - elapsed,
                    })
                }
            } else {
                None
            }
        };

        match event {
            Some(event @ SessionEvent::TimedOut { .. }) => {
                info!(%reason, "session timed out");
                // No subscribers is fine.
                let _ = self.shared.events.send(event);
                false
            }
            Some(event) => {
                debug!(%reason, "session timeout warning");
                let _ = self.shared.events.send(event);
                true
            }
            None => true,
        }
    }
}
