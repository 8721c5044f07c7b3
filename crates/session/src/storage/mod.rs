//! Key-value persistence for auth state
//!
//! Browsers expose `localStorage`; native hosts get a JSON file. Both are
//! synchronous string maps, which is all the token lifecycle needs.

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored data is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Synchronous string key-value store
pub trait KeyValueStore: Send + Sync + fmt::Debug {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing a missing key is not an error
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

// Storage failures are treated as absence; callers never see them.

pub(crate) fn read_key(backend: Option<&dyn KeyValueStore>, key: &str) -> Option<String> {
    match backend?.get(key) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(key, %error, "failed to read from storage");
            None
        }
    }
}

pub(crate) fn write_key(backend: Option<&dyn KeyValueStore>, key: &str, value: &str) {
    if let Some(backend) = backend {
        if let Err(error) = backend.set(key, value) {
            tracing::warn!(key, %error, "failed to write to storage");
        }
    }
}

pub(crate) fn remove_key(backend: Option<&dyn KeyValueStore>, key: &str) {
    if let Some(backend) = backend {
        if let Err(error) = backend.remove(key) {
            tracing::warn!(key, %error, "failed to remove from storage");
        }
    }
}
