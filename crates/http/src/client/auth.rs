//! Authentication API client methods

use super::{ApiClient, ClientError};
use crate::types::{
    LoginRequest, LoginResponse, LogoutRequest, RefreshRequest, RefreshResponse,
};

impl ApiClient {
    /// Exchange credentials for a user record and token pair
    pub async fn login(&self, request: &LoginRequest) -> Result<LoginResponse, ClientError> {
        let req = self
            .request(reqwest::Method::POST, "/auth/login")
            .json(request);
        self.execute(req).await
    }

    /// Exchange a refresh token for a new access token
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let req = self
            .request(reqwest::Method::POST, "/auth/refresh")
            .json(&RefreshRequest {
                refresh_token: refresh_token.to_string(),
            });
        self.execute(req).await
    }

    /// Ask the server to revoke a refresh token
    pub async fn logout(&self, refresh_token: Option<&str>) -> Result<(), ClientError> {
        let req = self
            .request(reqwest::Method::POST, "/auth/logout")
            .json(&LogoutRequest {
                refresh_token: refresh_token.map(str::to_string),
            });
        self.execute_empty(req).await
    }
}
