//! Direct identity clients: verification completes within the request.
//!
//! `DirectBasicAuthClient` checks an `Authorization: Basic` header against a
//! configured user table. `ParameterClient` validates a signed JWT carried as
//! a bearer header or request parameter, in the style of web-service callers.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde_json::json;
use std::collections::HashMap;

use super::{DirectClient, RequestSnapshot, UserProfile};
use crate::core::error::{AuthError, AuthResult};

/// A configured user: password plus the roles granted on login
#[derive(Debug, Clone)]
pub struct UserEntry {
    pub password: String,
    pub roles: Vec<String>,
}

/// Verifies `Authorization: Basic` credentials against a user table
pub struct DirectBasicAuthClient {
    name: String,
    users: HashMap<String, UserEntry>,
    persist_profile: bool,
}

impl DirectBasicAuthClient {
    pub fn new<S: Into<String>>(name: S, users: HashMap<String, UserEntry>) -> Self {
        Self {
            name: name.into(),
            users,
            persist_profile: false,
        }
    }

    /// Opt this client into writing its profiles to the session
    pub fn with_persist_profile(mut self, persist: bool) -> Self {
        self.persist_profile = persist;
        self
    }

    /// Decode a Basic header value into (username, password)
    fn decode_basic(header: &str) -> AuthResult<(String, String)> {
        let encoded = header
            .strip_prefix("Basic ")
            .ok_or(AuthError::NoCredentials)?;
        let decoded = BASE64
            .decode(encoded.trim())
            .map_err(|_| AuthError::invalid_credentials("malformed Basic authorization header"))?;
        let decoded = String::from_utf8(decoded)
            .map_err(|_| AuthError::invalid_credentials("non-UTF-8 Basic credentials"))?;
        let (user, pass) = decoded
            .split_once(':')
            .ok_or_else(|| AuthError::invalid_credentials("missing ':' in Basic credentials"))?;
        Ok((user.to_string(), pass.to_string()))
    }

    fn check(&self, username: &str, password: &str) -> AuthResult<UserProfile> {
        match self.users.get(username) {
            Some(entry) if entry.password == password => Ok(UserProfile::new(
                username.to_string(),
                self.name.clone(),
            )
            .with_attribute("username", json!(username))
            .with_attribute("roles", json!(entry.roles))),
            _ => Err(AuthError::invalid_credentials(format!(
                "bad username or password for '{username}'"
            ))),
        }
    }
}

#[async_trait]
impl DirectClient for DirectBasicAuthClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn persist_profile(&self) -> bool {
        self.persist_profile
    }

    async fn verify(&self, request: &RequestSnapshot) -> AuthResult<UserProfile> {
        let header = request
            .header("authorization")
            .ok_or(AuthError::NoCredentials)?;
        let (username, password) = Self::decode_basic(header)?;
        self.check(&username, &password)
    }
}

/// Validates a JWT carried as a bearer header or named request parameter
///
/// The subject claim becomes the profile id; all remaining claims become
/// profile attributes.
pub struct ParameterClient {
    name: String,
    /// Query parameter the token may arrive in (e.g. `token`)
    parameter: String,
    decoding_key: DecodingKey,
    validation: Validation,
    persist_profile: bool,
}

impl ParameterClient {
    pub fn new<S: Into<String>>(name: S, parameter: S, secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        Self {
            name: name.into(),
            parameter: parameter.into(),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            persist_profile: false,
        }
    }

    /// Opt this client into writing its profiles to the session
    pub fn with_persist_profile(mut self, persist: bool) -> Self {
        self.persist_profile = persist;
        self
    }

    /// Find the token in the bearer header or the configured parameter
    fn extract_token<'a>(&self, request: &'a RequestSnapshot) -> Option<&'a str> {
        if let Some(header) = request.header("authorization") {
            if let Some(token) = header.strip_prefix("Bearer ") {
                return Some(token.trim());
            }
        }
        request.param(&self.parameter)
    }
}

#[async_trait]
impl DirectClient for ParameterClient {
    fn name(&self) -> &str {
        &self.name
    }

    fn persist_profile(&self) -> bool {
        self.persist_profile
    }

    async fn verify(&self, request: &RequestSnapshot) -> AuthResult<UserProfile> {
        let token = self.extract_token(request).ok_or(AuthError::NoCredentials)?;

        let data = decode::<HashMap<String, serde_json::Value>>(
            token,
            &self.decoding_key,
            &self.validation,
        )
        .map_err(|e| AuthError::invalid_credentials(format!("JWT validation failed: {e}")))?;

        let mut claims = data.claims;
        let id = claims
            .remove("sub")
            .and_then(|v| v.as_str().map(String::from))
            .ok_or_else(|| AuthError::invalid_credentials("JWT has no subject claim"))?;

        let mut profile = UserProfile::new(id, self.name.clone());
        profile.attributes = claims;
        Ok(profile)
    }
}
