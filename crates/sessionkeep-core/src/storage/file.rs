use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::DurableStore;
use crate::error::StorageError;

/// Session file name in the storage directory
const SESSION_FILE: &str = "session.json";

/// Key-value storage backed by a single JSON object on disk.
///
/// The file is read once when opened and rewritten on every change. When the
/// last key is removed the file itself is deleted.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FileStorage {
    /// Open (or lazily create) `session.json` inside `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = dir.as_ref().join(SESSION_FILE);
        let entries = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            BTreeMap::new()
        };
        debug!(?path, keys = entries.len(), "Opened session file");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Undo an in-memory change whose write to disk failed.
    fn restore(&mut self, key: &str, previous: Option<String>) {
        match previous {
            Some(value) => self.entries.insert(key.to_string(), value),
            None => self.entries.remove(key),
        };
    }

    fn flush(&self) -> Result<(), StorageError> {
        if self.entries.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path)?;
            }
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&self.entries)?;
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

impl DurableStore for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        let previous = self.entries.insert(key.to_string(), value.to_string());
        if let Err(e) = self.flush() {
            self.restore(key, previous);
            return Err(e);
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        if let Some(previous) = self.entries.remove(key) {
            if let Err(e) = self.flush() {
                self.restore(key, Some(previous));
                return Err(e);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entries_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();

        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set("token", "abc123").unwrap();
        storage.set("expirationTime", "2030-01-01T00:00:00.000Z").unwrap();

        let reopened = FileStorage::open(dir.path()).unwrap();
        assert_eq!(reopened.get("token").unwrap().as_deref(), Some("abc123"));
        assert_eq!(
            reopened.get("expirationTime").unwrap().as_deref(),
            Some("2030-01-01T00:00:00.000Z")
        );
    }

    #[test]
    fn test_file_removed_when_empty() {
        let dir = tempfile::tempdir().unwrap();

        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set("token", "abc123").unwrap();
        assert!(storage.path().exists());

        storage.remove("token").unwrap();
        assert!(!storage.path().exists());

        // Removing again is a no-op
        storage.remove("token").unwrap();
    }

    #[test]
    fn test_creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");

        let mut storage = FileStorage::open(&nested).unwrap();
        storage.set("token", "abc123").unwrap();
        assert!(nested.join(SESSION_FILE).exists());
    }

    #[test]
    fn test_failed_write_keeps_previous_value() {
        let dir = tempfile::tempdir().unwrap();
        let mut storage = FileStorage::open(dir.path()).unwrap();
        storage.set("token", "abc123").unwrap();

        // A directory where the file should be makes every write fail
        std::fs::remove_file(storage.path()).unwrap();
        std::fs::create_dir(storage.path()).unwrap();

        assert!(storage.set("token", "def456").is_err());
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("abc123"));

        assert!(storage.set("expirationTime", "1792152000000").is_err());
        assert_eq!(storage.get("expirationTime").unwrap(), None);

        assert!(storage.remove("token").is_err());
        assert_eq!(storage.get("token").unwrap().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SESSION_FILE), "not json").unwrap();

        let result = FileStorage::open(dir.path());
        assert!(matches!(result, Err(StorageError::Serialization(_))));
    }
}
