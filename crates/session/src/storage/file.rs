use super::{KeyValueStore, StorageError};
use crate::lock;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// JSON-object file holding the key-value map, rewritten on every mutation
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_guard: Mutex<()>,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_guard: Mutex::new(()),
        }
    }

    /// Store `file_name` inside `data_dir`, or the platform data directory
    ///
    /// Returns `None` when no data directory can be determined.
    pub fn in_data_dir(data_dir: Option<&Path>, file_name: &str) -> Option<Self> {
        let dir = match data_dir {
            Some(dir) => dir.to_path_buf(),
            None => Self::default_data_dir()?,
        };
        Some(Self::new(dir.join(file_name)))
    }

    pub fn default_data_dir() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "shiftclock").map(|dirs| dirs.data_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read(&self.path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(BTreeMap::new()),
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load for a mutation; a corrupt file is replaced rather than preserved
    fn load_for_update(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match self.load() {
            Err(StorageError::Corrupt(error)) => {
                tracing::warn!(path = %self.path.display(), %error, "discarding corrupt store file");
                Ok(BTreeMap::new())
            }
            other => other,
        }
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let _guard = lock(&self.write_guard);
        let mut entries = self.load_for_update()?;
        entries.insert(key.to_string(), value.to_string());
        self.persist(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = lock(&self.write_guard);
        if !self.path.exists() {
            return Ok(());
        }
        let mut entries = self.load_for_update()?;
        entries.remove(key);
        self.persist(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let store = FileStore::new(&path);
        store.set("auth.access_token", "abc").unwrap();
        store.set("auth.expires_at", "42").unwrap();

        let reopened = FileStore::new(&path);
        assert_eq!(reopened.get("auth.access_token").unwrap().as_deref(), Some("abc"));
        assert_eq!(reopened.get("auth.expires_at").unwrap().as_deref(), Some("42"));
        assert_eq!(reopened.get("missing").unwrap(), None);
    }

    #[test]
    fn test_remove_missing_key_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store.remove("auth.user").unwrap();
        assert!(!store.path().exists());
    }

    #[test]
    fn test_remove_deletes_key() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("session.json"));
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
    }

    #[test]
    fn test_corrupt_file_reads_as_error_and_is_replaced_on_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = FileStore::new(&path);
        assert!(matches!(store.get("a"), Err(StorageError::Corrupt(_))));

        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);

        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_in_data_dir_uses_explicit_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::in_data_dir(Some(dir.path()), "state.json").unwrap();
        assert_eq!(store.path(), dir.path().join("state.json"));
    }
}
