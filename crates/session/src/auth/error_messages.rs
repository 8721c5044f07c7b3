//! User-friendly error message mappings

use crate::error::AuthError;
use crate::monitor::TimeoutReason;
use serde::{Deserialize, Serialize};

/// Language of user-facing messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "en")]
    English,
    #[serde(rename = "es")]
    Spanish,
}

impl Language {
    /// Pick a language from a BCP 47 tag such as `es-MX`
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim().to_ascii_lowercase().starts_with("es") {
            Self::Spanish
        } else {
            Self::English
        }
    }
}

/// Convert an auth failure into a message fit for the login form
pub fn user_message(error: &AuthError, language: Language) -> &'static str {
    match (error, language) {
        (AuthError::Network(_), Language::English) => {
            "Unable to reach the server. Check your connection and try again."
        }
        (AuthError::Network(_), Language::Spanish) => {
            "No se pudo conectar con el servidor. Revisa tu conexión e inténtalo de nuevo."
        }
        (AuthError::InvalidCredentials, Language::English) => "Incorrect email or password.",
        (AuthError::InvalidCredentials, Language::Spanish) => {
            "Correo electrónico o contraseña incorrectos."
        }
        (AuthError::Forbidden, Language::English) => {
            "You do not have permission to perform this action."
        }
        (AuthError::Forbidden, Language::Spanish) => {
            "No tienes permiso para realizar esta acción."
        }
        (AuthError::NotFound, Language::English) => {
            "The authentication service is not available at the configured address."
        }
        (AuthError::NotFound, Language::Spanish) => {
            "El servicio de autenticación no está disponible en la dirección configurada."
        }
        (AuthError::Server { .. }, Language::English) => {
            "The server ran into a problem. Please try again in a few minutes."
        }
        (AuthError::Server { .. }, Language::Spanish) => {
            "El servidor tuvo un problema. Inténtalo de nuevo en unos minutos."
        }
        (AuthError::Rejected { .. } | AuthError::InvalidResponse(_), Language::English) => {
            "The request could not be completed."
        }
        (AuthError::Rejected { .. } | AuthError::InvalidResponse(_), Language::Spanish) => {
            "No se pudo completar la solicitud."
        }
        (
            AuthError::NoRefreshToken | AuthError::NotAuthenticated | AuthError::SessionEnded,
            Language::English,
        ) => "Your session has ended. Please sign in again.",
        (
            AuthError::NoRefreshToken | AuthError::NotAuthenticated | AuthError::SessionEnded,
            Language::Spanish,
        ) => "Tu sesión ha terminado. Inicia sesión de nuevo.",
    }
}

/// Message shown after the monitor forced a logout
pub const fn timeout_message(reason: TimeoutReason, language: Language) -> &'static str {
    match (reason, language) {
        (TimeoutReason::Idle, Language::English) => {
            "You were signed out after a period of inactivity."
        }
        (TimeoutReason::Idle, Language::Spanish) => {
            "Se cerró tu sesión por inactividad."
        }
        (TimeoutReason::Session, Language::English) => {
            "Your session reached its maximum length. Please sign in again."
        }
        (TimeoutReason::Session, Language::Spanish) => {
            "Tu sesión alcanzó su duración máxima. Inicia sesión de nuevo."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_language_from_tag() {
        assert_eq!(Language::from_tag("es-MX"), Language::Spanish);
        assert_eq!(Language::from_tag("ES"), Language::Spanish);
        assert_eq!(Language::from_tag("en-GB"), Language::English);
        assert_eq!(Language::from_tag("fr"), Language::English);
    }

    #[test]
    fn test_credential_and_network_failures_read_differently() {
        let network = user_message(&AuthError::Network("refused".into()), Language::English);
        let credentials = user_message(&AuthError::InvalidCredentials, Language::English);
        assert_ne!(network, credentials);
        assert!(!network.contains("refused"));
    }

    #[test]
    fn test_spanish_messages() {
        assert_eq!(
            AuthError::InvalidCredentials.user_message(Language::Spanish),
            "Correo electrónico o contraseña incorrectos."
        );
        assert!(timeout_message(TimeoutReason::Idle, Language::Spanish).contains("inactividad"));
    }
}
