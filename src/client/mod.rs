//! # Identity Clients
//!
//! This module defines the polymorphic identity-verification strategies the
//! gateway orchestrates. A strategy is either *direct* (credentials are in the
//! request itself and verification completes within one request/response
//! cycle) or *indirect* (verification needs a redirect to a provider and a
//! later callback to complete). The two capability sets are kept on separate
//! traits and combined under the [`Client`] tagged variant, so a registered
//! client is never ambiguously both.
//!
//! Concrete strategies live in the `direct` and `indirect` submodules; the
//! `registry` submodule maps client names to instances and resolves ordered
//! candidate lists.

pub mod direct;
pub mod indirect;
pub mod registry;

pub use direct::{DirectBasicAuthClient, ParameterClient};
pub use indirect::{FormClient, IndirectBasicAuthClient};
pub use registry::ClientRegistry;

use async_trait::async_trait;
use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::core::error::AuthResult;

/// The authenticated identity produced by a successful verification
///
/// A profile carries a provider-qualified identifier plus a free-form
/// attribute map. Profiles are stored in the session keyed by client name, so
/// one browser session can hold several (one per provider).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserProfile {
    /// Unique identifier within the issuing client
    pub id: String,

    /// Name of the client that produced this profile
    pub client_name: String,

    /// Attributes reported by the provider (display name, roles, claims, ...)
    pub attributes: HashMap<String, serde_json::Value>,
}

impl UserProfile {
    /// Create a profile with no attributes
    pub fn new<S: Into<String>>(id: S, client_name: S) -> Self {
        Self {
            id: id.into(),
            client_name: client_name.into(),
            attributes: HashMap::new(),
        }
    }

    /// Provider-qualified identifier, unique across clients
    pub fn typed_id(&self) -> String {
        format!("{}#{}", self.client_name, self.id)
    }

    /// Set an attribute, consuming and returning self for chaining
    pub fn with_attribute<S: Into<String>>(mut self, name: S, value: serde_json::Value) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Check whether the profile's `roles` attribute contains a role
    pub fn has_role(&self, role: &str) -> bool {
        self.attributes
            .get("roles")
            .and_then(|v| v.as_array())
            .map(|roles| roles.iter().any(|r| r.as_str() == Some(role)))
            .unwrap_or(false)
    }

    /// Get a string attribute by name
    pub fn attribute_str(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(|v| v.as_str())
    }
}

/// Immutable snapshot of the parts of a request the pipeline needs
///
/// Handlers build one of these up front so strategies and authorizers never
/// touch the live hyper request.
#[derive(Debug, Clone)]
pub struct RequestSnapshot {
    /// Path component of the request URI
    pub path: String,

    /// Raw query string, if any
    pub query: Option<String>,

    /// Request headers
    pub headers: HeaderMap,

    /// Parsed query parameters
    pub params: HashMap<String, String>,
}

impl RequestSnapshot {
    /// Reconstruct the originally requested URL (path plus query)
    ///
    /// This is what gets recorded in a pending authentication request so the
    /// callback can send the browser back where it started.
    pub fn original_url(&self) -> String {
        match &self.query {
            Some(q) if !q.is_empty() => format!("{}?{}", self.path, q),
            _ => self.path.clone(),
        }
    }

    /// Get a header value as a string, if present and valid UTF-8
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Get a query parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// The redirect a strategy issues to start an indirect flow
#[derive(Debug, Clone)]
pub struct Challenge {
    /// Absolute or relative URL of the provider's authorization endpoint
    pub location: String,

    /// Anti-forgery token tying this initiation to its later callback
    pub correlation_token: String,
}

/// The payload delivered to the callback endpoint by the provider
///
/// Query parameters (GET return) and form fields (POST return) are merged
/// into one parameter map; headers are kept for strategies that complete from
/// header material.
#[derive(Debug, Clone, Default)]
pub struct CallbackPayload {
    /// Merged query and form parameters
    pub params: HashMap<String, String>,

    /// Headers of the callback request
    pub headers: HeaderMap,
}

impl CallbackPayload {
    /// Name of the client this callback targets, when the protocol echoes it
    pub fn client_name(&self) -> Option<&str> {
        self.params.get("client_name").map(String::as_str)
    }

    /// Get a parameter by name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }
}

/// A strategy that verifies credentials carried by the request itself
#[async_trait]
pub trait DirectClient: Send + Sync {
    /// Unique client name used in configuration and session keys
    fn name(&self) -> &str;

    /// Whether a profile produced by this client should be written to the
    /// session. Direct verification is stateless per request by default.
    fn persist_profile(&self) -> bool {
        false
    }

    /// Verify the request's credentials.
    ///
    /// Returns `NoCredentials` when the request carries nothing this client
    /// can use, `InvalidCredentials` when it carries credentials that fail
    /// verification.
    async fn verify(&self, request: &RequestSnapshot) -> AuthResult<UserProfile>;
}

/// A strategy that needs a provider redirect and a later callback
#[async_trait]
pub trait IndirectClient: Send + Sync {
    /// Unique client name used in configuration and session keys
    fn name(&self) -> &str;

    /// Start the flow: produce the provider redirect and a fresh correlation
    /// token. The caller records the pending request in the session.
    fn begin(&self, request: &RequestSnapshot) -> AuthResult<Challenge>;

    /// Complete the flow from the callback payload.
    ///
    /// `correlation_token` is the value recorded at initiation; strategies
    /// must fail with `CorrelationMismatch` when the payload does not echo it
    /// and `ProviderRejected` when the provider reports failure.
    async fn complete(
        &self,
        payload: &CallbackPayload,
        correlation_token: &str,
    ) -> AuthResult<UserProfile>;
}

/// A registered identity client, tagged by capability
#[derive(Clone)]
pub enum Client {
    /// Synchronous, in-request verification
    Direct(Arc<dyn DirectClient>),
    /// Redirect-then-callback verification
    Indirect(Arc<dyn IndirectClient>),
}

impl Client {
    /// The client's registered name
    pub fn name(&self) -> &str {
        match self {
            Client::Direct(c) => c.name(),
            Client::Indirect(c) => c.name(),
        }
    }

    /// Whether this is a direct strategy
    pub fn is_direct(&self) -> bool {
        matches!(self, Client::Direct(_))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Client::Direct(c) => write!(f, "Client::Direct({})", c.name()),
            Client::Indirect(c) => write!(f, "Client::Indirect({})", c.name()),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_typed_id_is_provider_qualified() {
        let profile = UserProfile::new("alice", "FormClient");
        assert_eq!(profile.typed_id(), "FormClient#alice");
    }

    #[test]
    fn test_has_role_reads_roles_attribute() {
        let profile = UserProfile::new("alice", "FormClient")
            .with_attribute("roles", json!(["ROLE_USER", "ROLE_ADMIN"]));
        assert!(profile.has_role("ROLE_ADMIN"));
        assert!(!profile.has_role("ROLE_SUPERUSER"));

        let bare = UserProfile::new("bob", "FormClient");
        assert!(!bare.has_role("ROLE_USER"));
    }

    #[test]
    fn test_original_url_preserves_query() {
        let mut snap = test_support::snapshot("/facebook/index.html");
        assert_eq!(snap.original_url(), "/facebook/index.html");

        snap.query = Some("tab=2".to_string());
        assert_eq!(snap.original_url(), "/facebook/index.html?tab=2");
    }
}
