//! In-memory session store with idle expiry.
//!
//! Sessions are keyed by an opaque identifier carried in a cookie. Each entry
//! holds the authenticated profiles (one per client name), the pending
//! indirect authentication requests (at most one per client name), and a
//! free-form attribute map. The store is the only mutable state shared across
//! requests; a `DashMap` gives session-scoped atomicity for the
//! read-modify-write sequences the pipeline needs, and pending-request
//! consumption is a single atomic take so duplicate callbacks cannot both
//! succeed.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::client::UserProfile;

/// Opaque identifier correlating requests from one browser
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for SessionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Transient record of an in-flight indirect authentication flow
///
/// Written when a challenge redirect is issued; consumed exactly once by the
/// callback handler. Starting a new flow for the same client name overwrites
/// the prior record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PendingAuthRequest {
    /// Client that initiated the flow
    pub client_name: String,

    /// URL the browser originally asked for, to redirect back to
    pub original_url: String,

    /// Anti-forgery token the callback must echo
    pub correlation_token: String,
}

/// One browser session's state
#[derive(Debug, Default)]
struct SessionEntry {
    /// Authenticated profiles, keyed by client name
    profiles: HashMap<String, UserProfile>,

    /// In-flight indirect flows, keyed by client name
    pending: HashMap<String, PendingAuthRequest>,

    /// Free-form key/value attributes
    attributes: HashMap<String, serde_json::Value>,

    last_accessed: DateTime<Utc>,
}

impl SessionEntry {
    fn new() -> Self {
        Self {
            last_accessed: Utc::now(),
            ..Default::default()
        }
    }

    fn is_expired(&self, idle_timeout: Duration) -> bool {
        Utc::now() - self.last_accessed > idle_timeout
    }

    fn touch(&mut self) {
        self.last_accessed = Utc::now();
    }
}

/// Concurrent session store, shared by all request handlers
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<SessionId, SessionEntry>,
    idle_timeout: Duration,
}

impl SessionStore {
    /// Create a store whose sessions expire after the given idle seconds
    pub fn new(idle_timeout_secs: u64) -> Self {
        Self {
            sessions: DashMap::new(),
            idle_timeout: Duration::seconds(idle_timeout_secs as i64),
        }
    }

    /// Create a fresh session and return its identifier
    pub fn create(&self) -> SessionId {
        let id = SessionId::generate();
        self.sessions.insert(id, SessionEntry::new());
        id
    }

    /// Check that a session exists and has not idled out, refreshing its
    /// last-access time. Expired entries are dropped on the spot.
    pub fn validate(&self, id: SessionId) -> bool {
        let expired = match self.sessions.get_mut(&id) {
            Some(mut entry) => {
                if entry.is_expired(self.idle_timeout) {
                    true
                } else {
                    entry.touch();
                    return true;
                }
            }
            None => return false,
        };
        if expired {
            self.sessions.remove(&id);
        }
        false
    }

    /// Get the profile stored for a client name
    pub fn get_profile(&self, id: SessionId, client_name: &str) -> Option<UserProfile> {
        self.sessions
            .get(&id)
            .and_then(|entry| entry.profiles.get(client_name).cloned())
    }

    /// Store a profile under its client name
    pub fn put_profile(&self, id: SessionId, profile: UserProfile) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.profiles.insert(profile.client_name.clone(), profile);
        }
    }

    /// Whether the session holds any profile at all, for any client
    pub fn has_any_profile(&self, id: SessionId) -> bool {
        self.sessions
            .get(&id)
            .map(|entry| !entry.profiles.is_empty())
            .unwrap_or(false)
    }

    /// All profiles in the session
    pub fn profiles(&self, id: SessionId) -> Vec<UserProfile> {
        self.sessions
            .get(&id)
            .map(|entry| entry.profiles.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Remove every profile from the session (logout), keeping the session
    pub fn clear_profiles(&self, id: SessionId) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.profiles.clear();
        }
    }

    /// Record a pending indirect flow, overwriting any prior one for the
    /// same client name
    pub fn put_pending(&self, id: SessionId, pending: PendingAuthRequest) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.pending.insert(pending.client_name.clone(), pending);
        }
    }

    /// Read a pending flow without consuming it
    pub fn peek_pending(&self, id: SessionId, client_name: &str) -> Option<PendingAuthRequest> {
        self.sessions
            .get(&id)
            .and_then(|entry| entry.pending.get(client_name).cloned())
    }

    /// Consume a pending flow.
    ///
    /// The removal happens under the session's shard lock, so of two
    /// concurrent callbacks racing for the same entry exactly one receives
    /// it; the other sees `None`.
    pub fn take_pending(&self, id: SessionId, client_name: &str) -> Option<PendingAuthRequest> {
        self.sessions
            .get_mut(&id)
            .and_then(|mut entry| entry.pending.remove(client_name))
    }

    /// Names of clients with a pending flow in this session
    pub fn pending_clients(&self, id: SessionId) -> Vec<String> {
        self.sessions
            .get(&id)
            .map(|entry| entry.pending.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Get a free-form session attribute
    pub fn get_attribute(&self, id: SessionId, key: &str) -> Option<serde_json::Value> {
        self.sessions
            .get(&id)
            .and_then(|entry| entry.attributes.get(key).cloned())
    }

    /// Set a free-form session attribute
    pub fn put_attribute(&self, id: SessionId, key: &str, value: serde_json::Value) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.attributes.insert(key.to_string(), value);
        }
    }

    /// Remove a free-form session attribute
    pub fn remove_attribute(&self, id: SessionId, key: &str) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.attributes.remove(key);
        }
    }

    /// Drop the whole session
    pub fn invalidate(&self, id: SessionId) {
        self.sessions.remove(&id);
    }

    /// Drop every idled-out session. Returns the number evicted.
    pub fn evict_expired(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, entry| !entry.is_expired(self.idle_timeout));
        before - self.sessions.len()
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}
