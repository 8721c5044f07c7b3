//! Signed-in session ownership and lifecycle

use super::error_messages::{Language, timeout_message};
use crate::clock::{Clock, MonotonicClock};
use crate::config::StorageKeys;
use crate::error::AuthError;
use crate::lock;
use crate::monitor::{MonitorState, SessionEvent, SessionMonitor};
use crate::refresh::{RefreshCallback, RefreshScheduler};
use crate::services::{AuthApi, Credentials};
use crate::storage::{KeyValueStore, MemoryStore, read_key, remove_key, write_key};
use crate::tokens::TokenStore;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use shiftclock_core::{
    Capability, CoreResult, GuardDecision, PermissionEvaluator, RenderPass, Role,
    RouteRequirement, Session, SessionConfig, TokenPair, evaluate_route,
};
use shiftclock_http::types::LoginResponse;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthStatus {
    #[default]
    Anonymous,
    Authenticating,
    Authenticated,
}

/// Snapshot published to subscribers on every change
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AuthState {
    pub status: AuthStatus,
    pub session: Option<Session>,
    /// Localized message describing the last failure
    pub error: Option<String>,
}

type SharedRefresh = Shared<BoxFuture<'static, Result<(), AuthError>>>;

struct InFlightRefresh {
    epoch: u64,
    id: u64,
    future: SharedRefresh,
}

struct Inner {
    api: Arc<dyn AuthApi>,
    backend: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    tokens: TokenStore,
    scheduler: RefreshScheduler,
    monitor: SessionMonitor,
    language: Language,
    state_tx: watch::Sender<AuthState>,
    /// Bumped whenever a session begins or ends; work started under an older
    /// epoch must not touch storage
    epoch: Mutex<u64>,
    refresh: Mutex<Option<InFlightRefresh>>,
    next_refresh_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(listener) = lock(&self.listener).take() {
            listener.abort();
        }
        self.scheduler.stop();
        self.monitor.stop_monitoring();
    }
}

/// Owns the signed-in session and keeps its tokens and timers consistent
#[derive(Clone)]
pub struct AuthCoordinator {
    inner: Arc<Inner>,
}

impl fmt::Debug for AuthCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCoordinator")
            .field("status", &self.state().status)
            .field("scheduler", &self.inner.scheduler)
            .field("monitor", &self.inner.monitor)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AuthCoordinator`]
pub struct AuthCoordinatorBuilder {
    api: Arc<dyn AuthApi>,
    store: Option<Arc<dyn KeyValueStore>>,
    clock: Option<Arc<dyn Clock>>,
    config: SessionConfig,
    language: Language,
}

impl AuthCoordinatorBuilder {
    /// Persist session state in `store`; without one nothing survives a restart
    #[must_use]
    pub fn store(mut self, store: Arc<dyn KeyValueStore>) -> Self {
        self.store = Some(store);
        self
    }

    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub const fn language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Build the coordinator and restore any persisted session
    ///
    /// Without a store, tokens live in memory for the lifetime of the
    /// coordinator. Must be called from within a tokio runtime.
    pub fn build(self) -> CoreResult<AuthCoordinator> {
        self.config.validate()?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let tokens = TokenStore::new(
            Some(store.clone()),
            clock.clone(),
            self.config.refresh_buffer(),
        );
        let (state_tx, _) = watch::channel(AuthState::default());

        let coordinator = AuthCoordinator {
            inner: Arc::new(Inner {
                api: self.api,
                backend: store,
                scheduler: RefreshScheduler::new(tokens.clone()),
                monitor: SessionMonitor::new(self.config, clock.clone()),
                clock,
                tokens,
                language: self.language,
                state_tx,
                epoch: Mutex::new(0),
                refresh: Mutex::new(None),
                next_refresh_id: AtomicU64::new(0),
                listener: Mutex::new(None),
            }),
        };

        let listener = coordinator.spawn_timeout_listener();
        *lock(&coordinator.inner.listener) = Some(listener);
        coordinator.reconcile();
        Ok(coordinator)
    }
}

impl AuthCoordinator {
    pub fn builder(api: Arc<dyn AuthApi>) -> AuthCoordinatorBuilder {
        AuthCoordinatorBuilder {
            api,
            store: None,
            clock: None,
            config: SessionConfig::default(),
            language: Language::default(),
        }
    }

    fn from_weak(weak: &Weak<Inner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    fn epoch(&self) -> u64 {
        *lock(&self.inner.epoch)
    }

    fn backend(&self) -> Option<&dyn KeyValueStore> {
        Some(self.inner.backend.as_ref())
    }

    // Queries

    pub fn state(&self) -> AuthState {
        self.inner.state_tx.borrow().clone()
    }

    /// Receive every published state change
    pub fn subscribe(&self) -> watch::Receiver<AuthState> {
        self.inner.state_tx.subscribe()
    }

    /// Warnings and timeouts from the session monitor
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.monitor.subscribe()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.state_tx.borrow().status == AuthStatus::Authenticated
    }

    pub fn current_user(&self) -> Option<Session> {
        self.inner.state_tx.borrow().session.clone()
    }

    pub fn last_error(&self) -> Option<String> {
        self.inner.state_tx.borrow().error.clone()
    }

    pub fn clear_error(&self) {
        self.set_error(None);
    }

    pub fn language(&self) -> Language {
        self.inner.language
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.inner.tokens
    }

    pub fn monitor(&self) -> &SessionMonitor {
        &self.inner.monitor
    }

    pub fn scheduler(&self) -> &RefreshScheduler {
        &self.inner.scheduler
    }

    // Permissions

    /// Evaluator for the signed-in user's role, `None` when anonymous
    pub fn permissions(&self) -> Option<PermissionEvaluator> {
        self.current_user()
            .map(|session| PermissionEvaluator::for_role(session.role))
    }

    pub fn role(&self) -> Option<Role> {
        self.current_user().map(|session| session.role)
    }

    pub fn has_capability(&self, capability: Capability) -> bool {
        self.permissions()
            .is_some_and(|permissions| permissions.can(capability))
    }

    pub fn can_access_dashboard(&self) -> bool {
        self.permissions()
            .is_some_and(|permissions| permissions.can_access_dashboard())
    }

    pub fn guard(&self, requirement: RouteRequirement, pass: RenderPass) -> GuardDecision {
        evaluate_route(requirement, self.current_user().as_ref(), pass)
    }

    // Activity

    pub fn record_activity(&self) {
        self.inner.monitor.record_activity();
    }

    pub fn extend_session(&self) {
        self.inner.monitor.extend_session();
    }

    /// Refresh immediately if the token is inside the refresh buffer
    pub fn check_and_refresh_now(&self) -> bool {
        self.inner.scheduler.check_and_refresh_now()
    }

    // Lifecycle

    pub async fn login(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        if self.is_authenticated() {
            self.logout().await;
        }

        let epoch = self.epoch();
        self.inner.state_tx.send_modify(|state| {
            state.status = AuthStatus::Authenticating;
            state.error = None;
        });
        debug!(email = %credentials.email, "signing in");

        let outcome = match self.inner.api.login(credentials).await {
            Ok(response) => self.session_from_response(response),
            Err(error) => Err(error.into()),
        };

        if self.epoch() != epoch {
            debug!("sign-in superseded before it completed");
            return Err(AuthError::SessionEnded);
        }

        match outcome {
            Ok((session, pair)) => {
                info!(user_id = %session.user_id, role = %session.role, "signed in");
                self.establish(session.clone(), Some(&pair));
                Ok(session)
            }
            Err(error) => {
                warn!(%error, "sign-in failed");
                self.inner.state_tx.send_replace(AuthState {
                    status: AuthStatus::Anonymous,
                    session: None,
                    error: Some(error.user_message(self.inner.language).to_string()),
                });
                Err(error)
            }
        }
    }

    /// End the session locally, then ask the server to revoke the refresh token
    ///
    /// Always leaves the coordinator anonymous; revocation failures are only
    /// logged.
    pub async fn logout(&self) {
        let refresh_token = self.inner.tokens.get_refresh_token();
        let was_authenticated = self.is_authenticated();
        self.end_session();

        if refresh_token.is_none() && !was_authenticated {
            return;
        }
        info!("signed out");
        if let Err(error) = self.inner.api.logout(refresh_token).await {
            warn!(%error, "failed to revoke refresh token");
        }
    }

    /// Exchange the refresh token for a new access token
    ///
    /// Concurrent callers share a single request and observe the same result.
    /// A failed refresh ends the session.
    pub async fn refresh(&self) -> Result<(), AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        self.refresh_future().await
    }

    /// Access token for an outgoing request, refreshed first if it is due
    pub async fn valid_access_token(&self) -> Result<String, AuthError> {
        if !self.is_authenticated() {
            return Err(AuthError::NotAuthenticated);
        }
        if self.inner.tokens.needs_refresh() {
            self.refresh().await?;
        }
        self.inner
            .tokens
            .get_access_token()
            .ok_or(AuthError::NotAuthenticated)
    }

    fn session_from_response(
        &self,
        response: LoginResponse,
    ) -> Result<(Session, TokenPair), AuthError> {
        let LoginResponse {
            user,
            access_token,
            refresh_token,
            expires_in,
        } = response;
        let role = user.role.parse::<Role>().map_err(AuthError::InvalidResponse)?;
        let session = Session {
            user_id: user.id,
            email: user.email,
            display_name: user.name,
            role,
            company_id: user.company_id,
        };
        let pair = TokenPair::from_expires_in(
            access_token,
            refresh_token,
            expires_in,
            self.inner.clock.now_ms(),
        );
        Ok((session, pair))
    }

    /// Publish `session` and start its timers, persisting `pair` when given
    fn establish(&self, session: Session, pair: Option<&TokenPair>) {
        {
            let mut epoch = lock(&self.inner.epoch);
            *epoch += 1;
            if let Some(pair) = pair {
                self.inner.tokens.set_tokens(pair);
                match serde_json::to_string(&session) {
                    Ok(record) => write_key(self.backend(), StorageKeys::USER, &record),
                    Err(error) => warn!(%error, "failed to serialize user record"),
                }
            }
            self.inner.state_tx.send_replace(AuthState {
                status: AuthStatus::Authenticated,
                session: Some(session),
                error: None,
            });
        }

        self.inner.monitor.start_monitoring();
        self.inner.scheduler.start(self.refresh_callback());
    }

    /// Stop timers and forget everything about the current session
    fn end_session(&self) {
        let mut epoch = lock(&self.inner.epoch);
        *epoch += 1;
        self.inner.monitor.stop_monitoring();
        self.inner.scheduler.stop();
        self.inner.tokens.clear();
        remove_key(self.backend(), StorageKeys::USER);
        self.inner.state_tx.send_replace(AuthState::default());
    }

    fn set_error(&self, error: Option<String>) {
        self.inner.state_tx.send_if_modified(|state| {
            if state.error == error {
                false
            } else {
                state.error = error;
                true
            }
        });
    }

    fn refresh_callback(&self) -> RefreshCallback {
        let weak = Arc::downgrade(&self.inner);
        Arc::new(move || match Self::from_weak(&weak) {
            Some(coordinator) => coordinator.refresh_future().boxed(),
            None => futures::future::ready(Err(AuthError::SessionEnded)).boxed(),
        })
    }

    /// Join the refresh already running for this session or start one
    fn refresh_future(&self) -> SharedRefresh {
        let epoch = self.epoch();
        let mut slot = lock(&self.inner.refresh);
        if let Some(in_flight) = slot.as_ref() {
            if in_flight.epoch == epoch {
                return in_flight.future.clone();
            }
        }

        let id = self.inner.next_refresh_id.fetch_add(1, Ordering::Relaxed);
        let weak = Arc::downgrade(&self.inner);
        let future = async move {
            let Some(coordinator) = Self::from_weak(&weak) else {
                return Err(AuthError::SessionEnded);
            };
            let result = coordinator.perform_refresh(epoch).await;
            coordinator.finish_refresh(id);
            result
        }
        .boxed()
        .shared();

        *slot = Some(InFlightRefresh {
            epoch,
            id,
            future: future.clone(),
        });
        future
    }

    fn finish_refresh(&self, id: u64) {
        let mut slot = lock(&self.inner.refresh);
        if slot.as_ref().is_some_and(|in_flight| in_flight.id == id) {
            *slot = None;
        }
    }

    async fn perform_refresh(&self, epoch: u64) -> Result<(), AuthError> {
        let Some(refresh_token) = self.inner.tokens.get_refresh_token() else {
            return Err(self.fail_refresh(epoch, AuthError::NoRefreshToken).await);
        };

        debug!("refreshing access token");
        let response = match self.inner.api.refresh(&refresh_token).await {
            Ok(response) => response,
            Err(error) => return Err(self.fail_refresh(epoch, error.into()).await),
        };

        let current = lock(&self.inner.epoch);
        if *current != epoch {
            debug!("discarding refresh result for an ended session");
            return Err(AuthError::SessionEnded);
        }
        // Servers that do not rotate omit the refresh token; keep the one we have.
        let next_refresh = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .unwrap_or(refresh_token);
        self.inner.tokens.set_tokens(&TokenPair::from_expires_in(
            response.access_token,
            Some(next_refresh),
            response.expires_in,
            self.inner.clock.now_ms(),
        ));
        drop(current);

        info!("access token refreshed");
        Ok(())
    }

    async fn fail_refresh(&self, epoch: u64, error: AuthError) -> AuthError {
        if self.epoch() != epoch {
            return AuthError::SessionEnded;
        }
        warn!(%error, "token refresh failed, ending session");
        self.logout().await;
        self.set_error(Some(error.user_message(self.inner.language).to_string()));
        error
    }

    // Startup

    /// Restore a persisted session, or discard whatever partial state is left
    fn reconcile(&self) {
        match self.load_user_record() {
            Some(session) if !self.inner.tokens.is_expired() => {
                info!(user_id = %session.user_id, "restored persisted session");
                self.establish(session, None);
            }
            Some(_) => {
                debug!("persisted session expired");
                self.discard_persisted_state();
            }
            None => self.discard_persisted_state(),
        }
    }

    fn load_user_record(&self) -> Option<Session> {
        let raw = read_key(self.backend(), StorageKeys::USER)?;
        match serde_json::from_str(&raw) {
            Ok(session) => Some(session),
            Err(error) => {
                warn!(%error, "discarding corrupt user record");
                None
            }
        }
    }

    fn discard_persisted_state(&self) {
        self.inner.tokens.clear();
        remove_key(self.backend(), StorageKeys::USER);
    }

    fn spawn_timeout_listener(&self) -> JoinHandle<()> {
        let mut events = self.inner.monitor.subscribe();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(SessionEvent::TimedOut { reason }) => {
                        let Some(coordinator) = Self::from_weak(&weak) else {
                            break;
                        };
                        // A newer session may have started since the event was sent.
                        if coordinator.inner.monitor.state() != MonitorState::TimedOut(reason) {
                            continue;
                        }
                        info!(%reason, "ending timed out session");
                        coordinator.logout().await;
                        let message = timeout_message(reason, coordinator.inner.language);
                        coordinator.set_error(Some(message.to_string()));
                    }
                    Ok(SessionEvent::Warning { reason, remaining }) => {
                        debug!(%reason, remaining_secs = remaining.as_secs(), "session expiring soon");
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "missed session monitor events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}
