//! Session and token lifecycle for Shiftclock front ends
//!
//! [`AuthCoordinator`] owns the signed-in session. It persists tokens through
//! [`TokenStore`], keeps them fresh with a [`RefreshScheduler`] and ends the
//! session when the [`SessionMonitor`] reports an idle or absolute timeout.
//!
//! All timers run on the ambient tokio runtime, so coordinators must be built
//! from within one.

pub mod auth;
pub mod clock;
pub mod config;
pub mod error;
pub mod monitor;
pub mod refresh;
pub mod services;
pub mod storage;
pub mod tokens;

pub use auth::{AuthCoordinator, AuthCoordinatorBuilder, AuthState, AuthStatus, Language};
pub use clock::{Clock, MonotonicClock};
pub use error::AuthError;
pub use monitor::{ActivityState, MonitorState, SessionEvent, SessionMonitor, TimeoutReason};
pub use refresh::{RefreshCallback, RefreshScheduler, SchedulerState};
pub use services::{AuthApi, Credentials, HttpAuthApi, InMemoryAuthApi};
pub use storage::{FileStore, KeyValueStore, MemoryStore, StorageError};
pub use tokens::TokenStore;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
