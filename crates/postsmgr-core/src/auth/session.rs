use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::SessionSlot;
use crate::models::User;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionData {
    pub token: String,
    #[serde(default)]
    pub user: Option<User>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: impl Into<String>, user: Option<User>) -> Self {
        Self {
            token: token.into(),
            user,
            created_at: Utc::now(),
        }
    }

    /// Minutes since the session was created (for display)
    pub fn age_minutes(&self) -> i64 {
        (Utc::now() - self.created_at).num_minutes().max(0)
    }
}

impl std::fmt::Debug for SessionData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionData")
            .field("token", &"[REDACTED]")
            .field("user", &self.user)
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// Owner of the current token and user.
///
/// Reads borrow the latest value without waiting. Every transition updates
/// memory, writes the slot, and notifies subscribers before returning.
pub struct SessionStore {
    slot: Box<dyn SessionSlot>,
    state: watch::Sender<Option<SessionData>>,
    // Serializes transitions so memory and slot agree
    write_lock: Mutex<()>,
}

impl SessionStore {
    /// An anonymous store backed by `slot`. The slot is not read.
    pub fn new(slot: impl SessionSlot + 'static) -> Self {
        let (state, _) = watch::channel(None);
        Self {
            slot: Box::new(slot),
            state,
            write_lock: Mutex::new(()),
        }
    }

    /// A store that keeps nothing beyond the process.
    pub fn in_memory() -> Self {
        Self::new(super::MemorySlot::new())
    }

    /// Build a store and restore whatever session `slot` holds.
    ///
    /// An unreadable or empty-token slot leaves the store anonymous.
    pub fn restore(slot: impl SessionSlot + 'static) -> Self {
        let store = Self::new(slot);
        match store.slot.load() {
            Ok(Some(data)) if !data.token.is_empty() => {
                debug!(user = ?data.user.as_ref().map(|u| u.id), "Session restored");
                store.state.send_replace(Some(data));
            }
            Ok(Some(_)) => {
                warn!("Stored session has an empty token, ignoring");
            }
            Ok(None) => debug!("No stored session"),
            Err(e) => warn!(error = %e, "Failed to load stored session"),
        }
        store
    }

    /// The bearer token, if authenticated.
    pub fn get_token(&self) -> Option<String> {
        self.state.borrow().as_ref().map(|d| d.token.clone())
    }

    /// The signed-in user, if known.
    pub fn user(&self) -> Option<User> {
        self.state.borrow().as_ref().and_then(|d| d.user.clone())
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_some()
    }

    /// Start a session, replacing any existing one.
    pub fn set_session(&self, token: impl Into<String>, user: User) {
        let data = SessionData::new(token, Some(user));
        let _guard = self.lock_writes();

        self.state.send_replace(Some(data.clone()));
        if let Err(e) = self.slot.store(&data) {
            warn!(error = %e, "Failed to persist session");
        }
        info!(user_id = data.user.as_ref().map(|u| u.id), "Session started");
    }

    /// Replace the user of the current session. Anonymous stores are left alone.
    pub fn set_user(&self, user: User) -> bool {
        let _guard = self.lock_writes();

        let changed = self.state.send_if_modified(|state| match state {
            Some(data) if data.user.as_ref() != Some(&user) => {
                data.user = Some(user);
                true
            }
            _ => false,
        });
        if changed {
            if let Some(data) = self.snapshot() {
                if let Err(e) = self.slot.store(&data) {
                    warn!(error = %e, "Failed to persist session");
                }
            }
        }
        changed
    }

    /// End the session.
    ///
    /// Returns true only for the call that actually removed a session, so
    /// concurrent callers see exactly one transition.
    pub fn clear_session(&self) -> bool {
        let _guard = self.lock_writes();

        let cleared = self.state.send_if_modified(|state| state.take().is_some());
        if let Err(e) = self.slot.remove() {
            warn!(error = %e, "Failed to remove persisted session");
        }
        if cleared {
            info!("Session cleared");
        }
        cleared
    }

    /// Observe session changes. The receiver starts at the current value.
    pub fn subscribe(&self) -> watch::Receiver<Option<SessionData>> {
        self.state.subscribe()
    }

    fn lock_writes(&self) -> std::sync::MutexGuard<'_, ()> {
        // A panic while holding the guard cannot leave () inconsistent
        self.write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
