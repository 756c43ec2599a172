//! Per-request session handle.
//!
//! A `SessionContext` is created at the top of every handler from the
//! request's cookie header: it resolves the cookie to a live session or lazily
//! creates one, and everything downstream (pipeline, callback handler) talks
//! to the session through it rather than through a global table. When the
//! session was created for this request the handler must emit the matching
//! `Set-Cookie` header on the way out.

use axum::http::HeaderMap;
use std::sync::Arc;

use super::store::{PendingAuthRequest, SessionId, SessionStore};
use crate::client::UserProfile;

/// Handle onto one browser session for the duration of a request
#[derive(Clone)]
pub struct SessionContext {
    store: Arc<SessionStore>,
    id: SessionId,
    fresh: bool,
}

impl SessionContext {
    /// Resolve the session from request headers, creating one if the cookie
    /// is absent, unparseable, or names an expired session.
    pub fn from_request(store: Arc<SessionStore>, headers: &HeaderMap, cookie_name: &str) -> Self {
        let existing = headers
            .get("cookie")
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| Self::find_cookie(cookies, cookie_name))
            .and_then(|raw| raw.parse::<SessionId>().ok())
            .filter(|id| store.validate(*id));

        match existing {
            Some(id) => Self {
                store,
                id,
                fresh: false,
            },
            None => {
                let id = store.create();
                Self {
                    store,
                    id,
                    fresh: true,
                }
            }
        }
    }

    /// Extract one cookie's value from a Cookie header
    fn find_cookie<'a>(cookies: &'a str, name: &str) -> Option<&'a str> {
        cookies.split(';').find_map(|pair| {
            let (k, v) = pair.split_once('=')?;
            (k.trim() == name).then(|| v.trim())
        })
    }

    /// The session identifier
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Whether this session was created for the current request and needs a
    /// `Set-Cookie` on the response
    pub fn is_fresh(&self) -> bool {
        self.fresh
    }

    /// The `Set-Cookie` header value for this session
    pub fn cookie_value(&self, cookie_name: &str) -> String {
        format!("{}={}; Path=/; HttpOnly; SameSite=Lax", cookie_name, self.id)
    }

    pub fn get_profile(&self, client_name: &str) -> Option<UserProfile> {
        self.store.get_profile(self.id, client_name)
    }

    pub fn put_profile(&self, profile: UserProfile) {
        self.store.put_profile(self.id, profile);
    }

    pub fn has_any_profile(&self) -> bool {
        self.store.has_any_profile(self.id)
    }

    pub fn profiles(&self) -> Vec<UserProfile> {
        self.store.profiles(self.id)
    }

    pub fn clear_profiles(&self) {
        self.store.clear_profiles(self.id);
    }

    pub fn put_pending(&self, pending: PendingAuthRequest) {
        self.store.put_pending(self.id, pending);
    }

    pub fn peek_pending(&self, client_name: &str) -> Option<PendingAuthRequest> {
        self.store.peek_pending(self.id, client_name)
    }

    /// Atomically consume a pending flow; see `SessionStore::take_pending`
    pub fn take_pending(&self, client_name: &str) -> Option<PendingAuthRequest> {
        self.store.take_pending(self.id, client_name)
    }

    pub fn pending_clients(&self) -> Vec<String> {
        self.store.pending_clients(self.id)
    }

    pub fn invalidate(&self) {
        self.store.invalidate(self.id);
    }
}
