//! Authentication session management.
//!
//! This module provides:
//! - `SessionData`: a token paired with its absolute expiration time
//! - `SessionStore`: the live session, persisted to a `DurableStore` and
//!   logged out automatically when the token expires
//!
//! Stored sessions with six seconds or less remaining are discarded on
//! start-up rather than restored.

pub mod session;
pub mod store;

pub use session::{format_expiration, parse_expiration, SessionData};
pub use store::{RestoredSession, SessionSnapshot, SessionStore, DEFAULT_EXPIRATION_MARGIN_MS};
