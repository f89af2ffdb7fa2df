use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::session::{
    format_expiration, parse_expiration, remaining_duration, SessionData, EXPIRATION_KEY,
    TOKEN_KEY,
};
use crate::storage::DurableStore;

/// A stored session with this little time left (or less) is discarded on
/// start-up instead of being restored.
pub const DEFAULT_EXPIRATION_MARGIN_MS: i64 = 6000;

/// The value UI consumers observe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub token: Option<String>,
    pub is_logged_in: bool,
}

impl SessionSnapshot {
    fn of(session: Option<&SessionData>) -> Self {
        match session {
            Some(data) => Self {
                token: Some(data.token.clone()),
                is_logged_in: !data.token.is_empty(),
            },
            None => Self::default(),
        }
    }
}

/// A session recovered from durable storage by [`SessionStore::initialize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoredSession {
    pub token: String,
    pub duration: Duration,
}

struct LogoutTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

struct State<S> {
    storage: S,
    session: Option<SessionData>,
    timer: Option<LogoutTimer>,
    generation: u64,
    margin: Duration,
}

struct Shared<S> {
    state: Mutex<State<S>>,
    snapshot: watch::Sender<SessionSnapshot>,
}

/// Holds the current authentication token, mirrors it into durable storage,
/// and logs out automatically when it expires.
///
/// Cloning yields another handle onto the same session.
pub struct SessionStore<S: DurableStore> {
    shared: Arc<Shared<S>>,
}

impl<S: DurableStore> Clone for SessionStore<S> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<S: DurableStore> SessionStore<S> {
    /// Create a logged-out store. Call [`initialize`](Self::initialize) to
    /// pick up a session left in `storage` by a previous run.
    pub fn new(storage: S) -> Self {
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    storage,
                    session: None,
                    timer: None,
                    generation: 0,
                    margin: Duration::milliseconds(DEFAULT_EXPIRATION_MARGIN_MS),
                }),
                snapshot,
            }),
        }
    }

    pub fn with_expiration_margin(self, margin: Duration) -> Self {
        self.shared.lock().margin = margin;
        self
    }

    /// Restore the session persisted in durable storage.
    ///
    /// A stored session with a missing token, a missing or unparseable
    /// expiration, or no more than the expiration margin left is wiped from
    /// storage and the store ends up logged out.
    pub fn initialize(&self) -> Option<RestoredSession> {
        let mut state = self.shared.lock();

        let token = read_key(&state.storage, TOKEN_KEY).filter(|t| !t.is_empty());
        let expiration = read_key(&state.storage, EXPIRATION_KEY)
            .as_deref()
            .and_then(parse_expiration);

        let (token, expiration_time) = match (token, expiration) {
            (Some(token), Some(expiration_time)) => (token, expiration_time),
            (token, expiration) => {
                debug!(
                    has_token = token.is_some(),
                    has_expiration = expiration.is_some(),
                    "Stored session incomplete, discarding"
                );
                self.shared.clear(&mut state);
                return None;
            }
        };

        let remaining = remaining_duration(expiration_time);
        if remaining <= state.margin {
            debug!(
                remaining_ms = remaining.num_milliseconds(),
                margin_ms = state.margin.num_milliseconds(),
                "Stored session expired or about to expire, discarding"
            );
            self.shared.clear(&mut state);
            return None;
        }

        state.session = Some(SessionData::new(token.clone(), expiration_time));
        self.shared.schedule_logout(&mut state, remaining);
        self.shared.publish(&state);
        info!(remaining_secs = remaining.num_seconds(), "Session restored");

        Some(RestoredSession {
            token,
            duration: remaining,
        })
    }

    /// Start a session, persist it, and (re)arm the auto-logout timer.
    ///
    /// An expiration in the past is accepted; the timer then fires right away.
    /// An empty token cannot form a session and logs out instead.
    pub fn login(&self, token: impl Into<String>, expiration_time: DateTime<Utc>) {
        let token = token.into();
        if token.is_empty() {
            warn!("Login with empty token, logging out instead");
            self.logout();
            return;
        }

        let mut state = self.shared.lock();
        let data = SessionData::new(token, expiration_time);

        if let Err(e) = state.storage.set(TOKEN_KEY, &data.token) {
            warn!(error = %e, "Failed to persist token");
        }
        let expiration = format_expiration(expiration_time);
        if let Err(e) = state.storage.set(EXPIRATION_KEY, &expiration) {
            warn!(error = %e, "Failed to persist expiration time");
        }

        let remaining = data.time_until_expiry();
        state.session = Some(data);
        self.shared.schedule_logout(&mut state, remaining);
        self.shared.publish(&state);
        info!(%expiration, remaining_secs = remaining.num_seconds(), "Logged in");
    }

    /// End the session, wipe it from storage and cancel the pending timer.
    /// Safe to call when already logged out.
    pub fn logout(&self) {
        let mut state = self.shared.lock();
        let was_logged_in = state.session.is_some();
        self.shared.clear(&mut state);
        if was_logged_in {
            info!("Logged out");
        }
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(|d| !d.token.is_empty())
            .unwrap_or(false)
    }

    pub fn token(&self) -> Option<String> {
        self.shared.lock().session.as_ref().map(|d| d.token.clone())
    }

    /// Time left on the current session, if any. Negative when the timer is
    /// about to fire.
    pub fn remaining(&self) -> Option<Duration> {
        self.shared
            .lock()
            .session
            .as_ref()
            .map(SessionData::time_until_expiry)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.shared.snapshot.borrow().clone()
    }

    /// Observe every change of the session snapshot.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.shared.snapshot.subscribe()
    }
}

impl<S: DurableStore> Shared<S> {
    fn lock(&self) -> MutexGuard<'_, State<S>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Notify subscribers only when the snapshot actually changed.
    fn publish(&self, state: &State<S>) {
        let snapshot = SessionSnapshot::of(state.session.as_ref());
        self.snapshot.send_if_modified(|current| {
            if *current == snapshot {
                return false;
            }
            *current = snapshot;
            true
        });
    }

    fn clear(&self, state: &mut State<S>) {
        state.session = None;
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
            debug!(generation = timer.generation, "Cancelled logout timer");
        }
        for key in [TOKEN_KEY, EXPIRATION_KEY] {
            if let Err(e) = state.storage.remove(key) {
                warn!(key, error = %e, "Failed to remove stored session key");
            }
        }
        self.publish(state);
    }

    /// Replace any pending timer with one that fires after `remaining`.
    fn schedule_logout(self: &Arc<Self>, state: &mut State<S>, remaining: Duration) {
        if let Some(previous) = state.timer.take() {
            previous.handle.abort();
            debug!(generation = previous.generation, "Replaced logout timer");
        }

        let runtime = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, auto-logout not scheduled");
                return;
            }
        };

        state.generation += 1;
        let generation = state.generation;
        let delay = remaining.to_std().unwrap_or_default();
        let shared = Arc::downgrade(self);

        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(generation);
            }
        });

        debug!(generation, delay_ms = delay.as_millis() as u64, "Scheduled logout timer");
        state.timer = Some(LogoutTimer { generation, handle });
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        match state.timer.as_ref() {
            Some(timer) if timer.generation == generation => {}
            _ => {
                debug!(generation, "Ignoring superseded logout timer");
                return;
            }
        }
        // The firing task is the one running this; nothing left to abort.
        state.timer = None;
        self.clear(&mut state);
        info!("Session expired, logged out");
    }
}

impl<S> Drop for Shared<S> {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = state.timer.take() {
            timer.handle.abort();
        }
    }
}

fn read_key<S: DurableStore>(storage: &S, key: &str) -> Option<String> {
    match storage.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(key, error = %e, "Failed to read stored session key");
            None
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
