//! Authentication errors surfaced to callers

use crate::auth::error_messages::{Language, user_message};
use shiftclock_http::ClientError;
use thiserror::Error;

/// Failures of login, refresh and token access
///
/// Cloneable so that every caller sharing one in-flight refresh observes the
/// same outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// No response from the server
    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Permission denied")]
    Forbidden,

    #[error("Authentication endpoint not found")]
    NotFound,

    #[error("Server error {status}")]
    Server { status: u16 },

    #[error("Request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Not authenticated")]
    NotAuthenticated,

    /// The session was ended or replaced while the operation was in flight
    #[error("Session ended")]
    SessionEnded,
}

impl AuthError {
    pub fn user_message(&self, language: Language) -> &'static str {
        user_message(self, language)
    }
}

impl From<ClientError> for AuthError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::AuthenticationFailed(_) => Self::InvalidCredentials,
            ClientError::Forbidden(_) => Self::Forbidden,
            ClientError::NotFound(_) => Self::NotFound,
            ClientError::ServerError { status, .. } if status >= 500 => Self::Server { status },
            ClientError::ServerError { status, message } => Self::Rejected { status, message },
            ClientError::BadRequest(message) => Self::Rejected {
                status: 400,
                message,
            },
            ClientError::Serialization(e) => Self::InvalidResponse(e.to_string()),
            ClientError::Configuration(message) => Self::Network(message),
            ClientError::Request(e) if e.is_decode() => Self::InvalidResponse(e.to_string()),
            ClientError::Request(e) => Self::Network(e.to_string()),
        }
    }
}
