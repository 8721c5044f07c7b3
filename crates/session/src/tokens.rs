//! Persisted access/refresh token pair

use crate::clock::Clock;
use crate::config::StorageKeys;
use crate::storage::{KeyValueStore, read_key, remove_key, write_key};
use shiftclock_core::TokenPair;
use std::sync::Arc;
use std::time::Duration;

/// Reads and writes the token pair; without a backend every call is a no-op
/// that reports "no tokens"
#[derive(Debug, Clone)]
pub struct TokenStore {
    backend: Option<Arc<dyn KeyValueStore>>,
    clock: Arc<dyn Clock>,
    refresh_buffer: Duration,
}

impl TokenStore {
    pub fn new(
        backend: Option<Arc<dyn KeyValueStore>>,
        clock: Arc<dyn Clock>,
        refresh_buffer: Duration,
    ) -> Self {
        Self {
            backend,
            clock,
            refresh_buffer,
        }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub const fn refresh_buffer(&self) -> Duration {
        self.refresh_buffer
    }

    fn backend(&self) -> Option<&dyn KeyValueStore> {
        self.backend.as_deref()
    }

    pub fn set_tokens(&self, pair: &TokenPair) {
        write_key(self.backend(), StorageKeys::ACCESS_TOKEN, &pair.access_token);
        write_key(
            self.backend(),
            StorageKeys::EXPIRES_AT,
            &pair.expires_at.to_string(),
        );
        match pair.refresh_token.as_deref() {
            Some(refresh) if !refresh.is_empty() => {
                write_key(self.backend(), StorageKeys::REFRESH_TOKEN, refresh);
            }
            _ => remove_key(self.backend(), StorageKeys::REFRESH_TOKEN),
        }
    }

    /// The stored pair, or `None` if any required field is missing or the
    /// expiry is not a number
    pub fn get_tokens(&self) -> Option<TokenPair> {
        let access_token = read_key(self.backend(), StorageKeys::ACCESS_TOKEN)?;
        let raw_expiry = read_key(self.backend(), StorageKeys::EXPIRES_AT)?;
        let Ok(expires_at) = raw_expiry.trim().parse::<i64>() else {
            tracing::debug!(raw_expiry, "ignoring token pair with unparsable expiry");
            return None;
        };

        Some(TokenPair {
            access_token,
            refresh_token: self.get_refresh_token(),
            expires_at,
        })
    }

    pub fn get_access_token(&self) -> Option<String> {
        self.get_tokens().map(|pair| pair.access_token)
    }

    pub fn get_refresh_token(&self) -> Option<String> {
        read_key(self.backend(), StorageKeys::REFRESH_TOKEN).filter(|token| !token.is_empty())
    }

    /// True when there are no tokens or expiry is within the refresh buffer
    pub fn is_expired(&self) -> bool {
        let Some(pair) = self.get_tokens() else {
            return true;
        };
        let buffer_ms = i64::try_from(self.refresh_buffer.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_ms() >= pair.expires_at.saturating_sub(buffer_ms)
    }

    /// Time left until the real expiry; zero when there are no tokens
    pub fn time_until_expiration(&self) -> Duration {
        self.get_tokens().map_or(Duration::ZERO, |pair| {
            let remaining = pair.expires_at.saturating_sub(self.clock.now_ms());
            Duration::from_millis(u64::try_from(remaining).unwrap_or(0))
        })
    }

    /// True only when a refresh token exists and expiry is within the buffer
    pub fn needs_refresh(&self) -> bool {
        self.get_refresh_token().is_some() && self.time_until_expiration() <= self.refresh_buffer
    }

    pub fn clear(&self) {
        remove_key(self.backend(), StorageKeys::ACCESS_TOKEN);
        remove_key(self.backend(), StorageKeys::REFRESH_TOKEN);
        remove_key(self.backend(), StorageKeys::EXPIRES_AT);
    }
}
