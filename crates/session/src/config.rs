//! Persistent storage layout

/// Keys under which auth state is persisted
pub struct StorageKeys;

impl StorageKeys {
    pub const ACCESS_TOKEN: &'static str = "auth.access_token";
    pub const REFRESH_TOKEN: &'static str = "auth.refresh_token";
    pub const EXPIRES_AT: &'static str = "auth.expires_at";

    /// Serialized `Session` of the signed-in user
    pub const USER: &'static str = "auth.user";
}
