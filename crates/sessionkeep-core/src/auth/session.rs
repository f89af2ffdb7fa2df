use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Storage key holding the bearer token
pub const TOKEN_KEY: &str = "token";

/// Storage key holding the token's absolute expiration time
pub const EXPIRATION_KEY: &str = "expirationTime";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub token: String,
    pub expiration_time: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, expiration_time: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            expiration_time,
        }
    }

    /// Time left until expiry. Negative once the token has expired.
    pub fn time_until_expiry(&self) -> Duration {
        remaining_duration(self.expiration_time)
    }

    pub fn is_expired(&self) -> bool {
        self.time_until_expiry() <= Duration::zero()
    }

    /// Expiration in the form written to durable storage.
    pub fn expiration_string(&self) -> String {
        format_expiration(self.expiration_time)
    }
}

/// `expiration_time - now`, without clamping.
pub fn remaining_duration(expiration_time: DateTime<Utc>) -> Duration {
    expiration_time - Utc::now()
}

/// Format an expiration as an RFC 3339 UTC timestamp with milliseconds,
/// e.g. `2026-10-16T12:00:00.000Z`.
pub fn format_expiration(expiration_time: DateTime<Utc>) -> String {
    expiration_time.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored expiration value.
///
/// Accepts an RFC 3339 timestamp or a decimal count of milliseconds since the
/// Unix epoch. Anything else yields `None`.
pub fn parse_expiration(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(millis) = raw.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis);
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
