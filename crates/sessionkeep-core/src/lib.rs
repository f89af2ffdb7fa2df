//! Core library for sessionkeep.
//!
//! Holds a client-side authentication token together with its expiration,
//! persists both in a durable key-value store, and logs out automatically
//! once the token expires.

pub mod auth;
pub mod config;
pub mod error;
pub mod storage;

pub use auth::{RestoredSession, SessionData, SessionSnapshot, SessionStore};
pub use config::{Config, StorageBackend};
pub use error::StorageError;
pub use storage::{DurableStore, FileStorage, KeyringStorage, MemoryStorage};
