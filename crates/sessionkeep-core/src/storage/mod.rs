//! Durable key-value storage for session entries.
//!
//! This module provides:
//! - `DurableStore`: the string-to-string map the session store persists into
//! - `MemoryStorage`: process-local map, shared between clones
//! - `FileStorage`: JSON file in the cache directory
//! - `KeyringStorage`: one OS keychain entry per key

pub mod file;
pub mod keychain;
pub mod memory;

pub use file::FileStorage;
pub use keychain::KeyringStorage;
pub use memory::MemoryStorage;

use crate::error::StorageError;

/// A durable map of string keys to string values that outlives the process.
pub trait DurableStore: Send + 'static {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
}

impl DurableStore for Box<dyn DurableStore> {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).set(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}
