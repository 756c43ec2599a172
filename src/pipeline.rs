//! # Authentication Decision Pipeline
//!
//! The per-request state machine at the heart of the gateway. Every request
//! to a protected resource enters unchecked and leaves in exactly one of
//! three states: authenticated (a profile is bound and the authorizer, if
//! any, approved), challenge issued (a pending flow was recorded and the
//! browser is redirected to a provider), or denied (handed to the failure
//! router with a definite reason).
//!
//! Candidate clients are tried strictly in configured order. A profile
//! already in the session wins first (first match, not a union across
//! clients). Failing that, every direct candidate gets to inspect the
//! request's own credentials before the first indirect candidate is allowed
//! to issue a redirect, so a web-service caller with a Basic header never
//! gets bounced to a login form just because the form client is listed too.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::authz::AuthorizerRegistry;
use crate::client::{Client, RequestSnapshot, UserProfile};
use crate::core::error::AuthError;
use crate::session::{PendingAuthRequest, SessionContext};

/// A protected resource: its path, ordered candidate clients, and an
/// optional authorizer gating access after authentication
///
/// Built once from configuration; the comma-separated client list is parsed
/// and resolved at startup, never per request.
#[derive(Debug, Clone)]
pub struct ProtectedRule {
    pub path: String,
    pub clients: Vec<Client>,
    pub authorizer: Option<String>,
}

/// Terminal state of the pipeline for one request
#[derive(Debug)]
pub enum Decision {
    /// Identity established and authorized; the resource handler may run
    Authenticated(UserProfile),

    /// An indirect flow was started; redirect the browser to the provider
    Challenge { location: String },

    /// The request is rejected with this reason
    Denied(AuthError),
}

/// Executes the decision algorithm against the registries
pub struct AuthPipeline {
    authorizers: Arc<AuthorizerRegistry>,
}

impl AuthPipeline {
    pub fn new(authorizers: Arc<AuthorizerRegistry>) -> Self {
        Self { authorizers }
    }

    /// Decide the outcome for one request against one protected rule
    pub async fn decide(
        &self,
        rule: &ProtectedRule,
        session: &SessionContext,
        request: &RequestSnapshot,
    ) -> Decision {
        // A profile already in the session satisfies the request; candidates
        // are checked in order and the first hit stops the scan.
        for client in &rule.clients {
            if let Some(profile) = session.get_profile(client.name()) {
                debug!(client = client.name(), user = %profile.typed_id(), "session profile matched");
                return self.authorize(rule, profile, request);
            }
        }

        // Empty candidate list: authentication required but no strategy to
        // obtain it. Any existing profile passes; otherwise there is nothing
        // to challenge with.
        if rule.clients.is_empty() {
            if let Some(profile) = session.profiles().into_iter().next() {
                debug!(user = %profile.typed_id(), "any-client rule satisfied from session");
                return self.authorize(rule, profile, request);
            }
            return Decision::Denied(AuthError::NotAuthenticated);
        }

        // Direct candidates inspect the request's own credentials, in order.
        for client in &rule.clients {
            let direct = match client {
                Client::Direct(direct) => direct,
                Client::Indirect(_) => continue,
            };
            match direct.verify(request).await {
                Ok(profile) => {
                    debug!(client = direct.name(), user = %profile.typed_id(), "direct verification succeeded");
                    if direct.persist_profile() {
                        session.put_profile(profile.clone());
                    }
                    return self.authorize(rule, profile, request);
                }
                // Nothing this client could use; the next candidate may.
                Err(AuthError::NoCredentials) => continue,
                // Presented-but-wrong credentials are a definitive answer.
                Err(err @ AuthError::InvalidCredentials { .. }) => {
                    warn!(client = direct.name(), error = %err, "direct verification rejected credentials");
                    return Decision::Denied(err);
                }
                Err(err) => {
                    warn!(client = direct.name(), error = %err, "direct verification failed unexpectedly");
                    return Decision::Denied(AuthError::internal(format!(
                        "client '{}' failed: {err}",
                        direct.name()
                    )));
                }
            }
        }

        // No direct candidate produced an identity; the first indirect
        // candidate issues the challenge. This is the suspend point: state
        // goes into the session, the browser goes to the provider, and the
        // flow resumes on a later request to the callback endpoint.
        if let Some(Client::Indirect(indirect)) =
            rule.clients.iter().find(|c| !c.is_direct())
        {
            let challenge = match indirect.begin(request) {
                Ok(challenge) => challenge,
                Err(err) => {
                    warn!(client = indirect.name(), error = %err, "failed to start indirect flow");
                    return Decision::Denied(AuthError::internal(format!(
                        "client '{}' could not start a flow: {err}",
                        indirect.name()
                    )));
                }
            };
            session.put_pending(PendingAuthRequest {
                client_name: indirect.name().to_string(),
                original_url: request.original_url(),
                correlation_token: challenge.correlation_token,
            });
            debug!(client = indirect.name(), location = %challenge.location, "challenge issued");
            return Decision::Challenge {
                location: challenge.location,
            };
        }

        // Only direct candidates, and none saw usable credentials.
        Decision::Denied(AuthError::NoCredentials)
    }

    /// Gate an established identity through the rule's authorizer, if any
    fn authorize(
        &self,
        rule: &ProtectedRule,
        profile: UserProfile,
        request: &RequestSnapshot,
    ) -> Decision {
        if let Some(name) = &rule.authorizer {
            let authorizer = match self.authorizers.get(name) {
                Ok(authorizer) => authorizer,
                // Rules are validated at startup; reaching this means the
                // registries and rules went out of sync.
                Err(err) => return Decision::Denied(err),
            };
            if !authorizer.authorize(&profile, request) {
                warn!(authorizer = name.as_str(), user = %profile.typed_id(), "authorization denied");
                return Decision::Denied(AuthError::forbidden(format!(
                    "authorizer '{name}' denied access"
                )));
            }
        }
        Decision::Authenticated(profile)
    }
}
