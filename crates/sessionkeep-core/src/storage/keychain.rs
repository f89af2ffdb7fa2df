use std::collections::{hash_map, HashMap};

use keyring::Entry;

use super::DurableStore;
use crate::error::StorageError;

/// Default keychain service name
pub const DEFAULT_SERVICE_NAME: &str = "sessionkeep";

/// Storage backed by the OS keychain, one entry per key.
///
/// Entries written through this handle are kept open and reused, so
/// credential stores that key on the entry object rather than on
/// service/user still read back what was written.
#[derive(Debug)]
pub struct KeyringStorage {
    service: String,
    entries: HashMap<String, Entry>,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            entries: HashMap::new(),
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn open_entry(&self, key: &str) -> Result<Entry, StorageError> {
        Ok(Entry::new(&self.service, key)?)
    }

    fn cached_entry(&mut self, key: &str) -> Result<&Entry, StorageError> {
        match self.entries.entry(key.to_string()) {
            hash_map::Entry::Occupied(slot) => Ok(&*slot.into_mut()),
            hash_map::Entry::Vacant(slot) => Ok(&*slot.insert(Entry::new(&self.service, key)?)),
        }
    }
}

impl Default for KeyringStorage {
    fn default() -> Self {
        Self::new(DEFAULT_SERVICE_NAME)
    }
}

fn read_password(entry: &Entry) -> Result<Option<String>, StorageError> {
    match entry.get_password() {
        Ok(value) => Ok(Some(value)),
        Err(keyring::Error::NoEntry) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl DurableStore for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.entries.get(key) {
            Some(entry) => read_password(entry),
            None => read_password(&self.open_entry(key)?),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.cached_entry(key)?.set_password(value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        let result = self.cached_entry(key)?.delete_credential();
        self.entries.remove(key);
        match result {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
