//! In-memory authentication backend for offline use and tests

use super::auth::{AuthApi, Credentials};
use crate::lock;
use async_trait::async_trait;
use shiftclock_core::Role;
use shiftclock_http::ClientError;
use shiftclock_http::types::{LoginResponse, RefreshResponse, UserDto};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Accepts any well-formed email and derives the role from its local part
///
/// `admin@…` signs in as a super admin, `manager@…` and `company@…` as a
/// company admin, anyone else as an employee. An empty password or the
/// password `invalid` is rejected.
#[derive(Debug)]
pub struct InMemoryAuthApi {
    token_lifetime: Duration,
    latency: Duration,
    /// Live refresh tokens and the user they belong to
    sessions: Mutex<HashMap<String, UserDto>>,
    fail_refresh: AtomicBool,
    login_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    logout_calls: AtomicUsize,
}

impl Default for InMemoryAuthApi {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuthApi {
    pub fn new() -> Self {
        Self {
            token_lifetime: DEFAULT_TOKEN_LIFETIME,
            latency: Duration::ZERO,
            sessions: Mutex::new(HashMap::new()),
            fail_refresh: AtomicBool::new(false),
            login_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            logout_calls: AtomicUsize::new(0),
        }
    }

    /// Lifetime of issued access tokens, rounded down to whole seconds
    #[must_use]
    pub const fn with_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.token_lifetime = lifetime;
        self
    }

    /// Delay applied to every call
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Make every refresh fail with 401 until reset
    pub fn set_fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    /// Invalidate every issued refresh token
    pub fn revoke_all(&self) {
        lock(&self.sessions).clear();
    }

    pub fn active_sessions(&self) -> usize {
        lock(&self.sessions).len()
    }

    pub fn login_calls(&self) -> usize {
        self.login_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn issue_refresh_token(&self, user: UserDto) -> String {
        let token = format!("refresh-{}", Uuid::new_v4());
        lock(&self.sessions).insert(token.clone(), user);
        token
    }

    fn access_token() -> String {
        format!("access-{}", Uuid::new_v4())
    }

    const fn expires_in(&self) -> u64 {
        self.token_lifetime.as_secs()
    }
}

/// Role granted to a mock account
pub fn role_for_email(email: &str) -> Role {
    let local = email.split('@').next().unwrap_or_default();
    match local.to_ascii_lowercase().as_str() {
        "admin" => Role::SuperAdmin,
        "manager" | "company" => Role::CompanyAdmin,
        _ => Role::Employee,
    }
}

fn display_name(local: &str) -> String {
    local
        .split(['.', '_', '-'])
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn user_for(email: &str) -> Result<UserDto, ClientError> {
    let email = email.trim();
    let (local, domain) = email
        .split_once('@')
        .filter(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .ok_or_else(|| ClientError::BadRequest(format!("invalid email address: {email}")))?;

    let role = role_for_email(email);
    Ok(UserDto {
        id: format!("user-{}", local.to_ascii_lowercase()),
        email: email.to_string(),
        name: display_name(local),
        role: role.as_str().to_string(),
        company_id: (role != Role::SuperAdmin).then(|| format!("company-{domain}")),
    })
}

#[async_trait]
impl AuthApi for InMemoryAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ClientError> {
        self.login_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if credentials.password.is_empty() || credentials.password == "invalid" {
            return Err(ClientError::AuthenticationFailed(
                "invalid email or password".into(),
            ));
        }
        let user = user_for(&credentials.email)?;
        tracing::debug!(email = %user.email, role = %user.role, "mock login");

        Ok(LoginResponse {
            access_token: Self::access_token(),
            refresh_token: Some(self.issue_refresh_token(user.clone())),
            expires_in: self.expires_in(),
            user,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(ClientError::AuthenticationFailed(
                "refresh token rejected".into(),
            ));
        }
        let user = lock(&self.sessions)
            .remove(refresh_token)
            .ok_or_else(|| ClientError::AuthenticationFailed("unknown refresh token".into()))?;

        Ok(RefreshResponse {
            access_token: Self::access_token(),
            refresh_token: Some(self.issue_refresh_token(user)),
            expires_in: self.expires_in(),
        })
    }

    async fn logout(&self, refresh_token: Option<String>) -> Result<(), ClientError> {
        self.logout_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        if let Some(token) = refresh_token {
            lock(&self.sessions).remove(&token);
        }
        Ok(())
    }
}
