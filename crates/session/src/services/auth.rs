//! Authentication endpoint seam

use async_trait::async_trait;
use shiftclock_core::ApiConfig;
use shiftclock_http::types::{LoginRequest, LoginResponse, RefreshResponse};
use shiftclock_http::{ApiClient, ClientError};

/// Email/password pair submitted at login
pub type Credentials = LoginRequest;

/// Calls made by the coordinator against the authentication backend
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ClientError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError>;

    /// Revoke the refresh token server-side
    async fn logout(&self, refresh_token: Option<String>) -> Result<(), ClientError>;
}

/// `AuthApi` over the HTTP endpoints
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    client: ApiClient,
}

impl HttpAuthApi {
    pub const fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn from_config(config: &ApiConfig) -> Result<Self, ClientError> {
        let client = ApiClient::builder()
            .base_url(&config.base_url)
            .timeout(config.timeout())
            .build()?;
        Ok(Self::new(client))
    }

    pub const fn client(&self) -> &ApiClient {
        &self.client
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, credentials: &Credentials) -> Result<LoginResponse, ClientError> {
        self.client.login(credentials).await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        self.client.refresh(refresh_token).await
    }

    async fn logout(&self, refresh_token: Option<String>) -> Result<(), ClientError> {
        self.client.logout(refresh_token.as_deref()).await
    }
}
