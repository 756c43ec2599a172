//! Indirect identity clients: a redirect to a provider, then a callback.
//!
//! `FormClient` sends the browser to a login form; the form posts the entered
//! credentials back to the callback endpoint. `IndirectBasicAuthClient` sends
//! the browser straight back to the callback and expects a Basic header on
//! the return request. Both generate a fresh correlation token at initiation
//! and refuse callbacks that do not echo it.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::json;
use std::collections::HashMap;

use super::direct::UserEntry;
use super::{CallbackPayload, Challenge, IndirectClient, RequestSnapshot, UserProfile};
use crate::core::error::{AuthError, AuthResult};

/// Length of generated correlation tokens
const CORRELATION_TOKEN_LEN: usize = 32;

/// Generate a fresh anti-forgery correlation token
fn new_correlation_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(CORRELATION_TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// Check a user table and build the resulting profile
fn check_user(
    client_name: &str,
    users: &HashMap<String, UserEntry>,
    username: &str,
    password: &str,
) -> AuthResult<UserProfile> {
    match users.get(username) {
        Some(entry) if entry.password == password => Ok(UserProfile::new(
            username.to_string(),
            client_name.to_string(),
        )
        .with_attribute("username", json!(username))
        .with_attribute("roles", json!(entry.roles))),
        _ => Err(AuthError::provider_rejected(format!(
            "verification failed for '{username}'"
        ))),
    }
}

/// Redirects to a credential-entry form; the form posts back to the callback
pub struct FormClient {
    name: String,
    /// Path of the login form page (the gateway's own `/loginForm` by default)
    login_url: String,
    users: HashMap<String, UserEntry>,
}

impl FormClient {
    pub fn new<S: Into<String>>(
        name: S,
        login_url: S,
        users: HashMap<String, UserEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            login_url: login_url.into(),
            users,
        }
    }
}

#[async_trait]
impl IndirectClient for FormClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, _request: &RequestSnapshot) -> AuthResult<Challenge> {
        let correlation_token = new_correlation_token();
        let location = format!(
            "{}?client_name={}&state={}",
            self.login_url,
            urlencoding::encode(&self.name),
            urlencoding::encode(&correlation_token),
        );
        Ok(Challenge {
            location,
            correlation_token,
        })
    }

    async fn complete(
        &self,
        payload: &CallbackPayload,
        correlation_token: &str,
    ) -> AuthResult<UserProfile> {
        let state = payload.param("state").unwrap_or_default();
        if state != correlation_token {
            return Err(AuthError::CorrelationMismatch);
        }

        let username = payload
            .param("username")
            .ok_or_else(|| AuthError::provider_rejected("form callback missing username"))?;
        let password = payload.param("password").unwrap_or_default();
        check_user(&self.name, &self.users, username, password)
    }
}

/// Challenges with a redirect back to the callback, expecting Basic credentials
///
/// The browser's credential prompt supplies the Authorization header on the
/// return request, so completion reads the callback's headers rather than its
/// parameters.
pub struct IndirectBasicAuthClient {
    name: String,
    callback_url: String,
    users: HashMap<String, UserEntry>,
}

impl IndirectBasicAuthClient {
    pub fn new<S: Into<String>>(
        name: S,
        callback_url: S,
        users: HashMap<String, UserEntry>,
    ) -> Self {
        Self {
            name: name.into(),
            callback_url: callback_url.into(),
            users,
        }
    }
}

#[async_trait]
impl IndirectClient for IndirectBasicAuthClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn begin(&self, _request: &RequestSnapshot) -> AuthResult<Challenge> {
        let correlation_token = new_correlation_token();
        let location = format!(
            "{}?client_name={}&state={}",
            self.callback_url,
            urlencoding::encode(&self.name),
            urlencoding::encode(&correlation_token),
        );
        Ok(Challenge {
            location,
            correlation_token,
        })
    }

    async fn complete(
        &self,
        payload: &CallbackPayload,
        correlation_token: &str,
    ) -> AuthResult<UserProfile> {
        let state = payload.param("state").unwrap_or_default();
        if state != correlation_token {
            return Err(AuthError::CorrelationMismatch);
        }

        let header = payload
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| AuthError::provider_rejected("no Basic credentials on callback"))?;
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or_else(|| AuthError::provider_rejected("callback authorization is not Basic"))?;
        let decoded = BASE64
            .decode(encoded.trim())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .ok_or_else(|| AuthError::provider_rejected("malformed Basic credentials"))?;
        let (username, password) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::provider_rejected("malformed Basic credentials"))?;

        check_user(&self.name, &self.users, username, password)
    }
}
