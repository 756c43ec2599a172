//! # Callback Handler
//!
//! Completes in-flight indirect authentication flows. The provider returns
//! the browser to the callback endpoint (GET for redirect returns, POST for
//! form posts); this module finds the pending request the flow recorded,
//! hands the payload to the originating strategy together with the stored
//! correlation token, and on success stores the resulting profile and sends
//! the browser back to the originally requested URL.
//!
//! A pending request is consumed exactly once. The take is atomic against
//! concurrent callbacks for the same session, so a duplicate-tab submission
//! cannot complete the same flow twice; the loser sees `NoPendingRequest`.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::client::{CallbackPayload, Client, ClientRegistry, UserProfile};
use crate::core::error::{AuthError, AuthResult};
use crate::session::{PendingAuthRequest, SessionContext};

/// Completes indirect flows and produces the post-login redirect target
pub struct CallbackHandler {
    registry: Arc<ClientRegistry>,
    /// Redirect target when a pending request carries no original URL
    home_path: String,
}

impl CallbackHandler {
    pub fn new(registry: Arc<ClientRegistry>, home_path: String) -> Self {
        Self {
            registry,
            home_path,
        }
    }

    /// Handle one callback. Returns the URL to redirect the browser to.
    pub async fn handle(
        &self,
        session: &SessionContext,
        payload: &CallbackPayload,
    ) -> AuthResult<String> {
        match payload.client_name() {
            Some(name) => self.complete_named(session, payload, name).await,
            None => self.complete_probing(session, payload).await,
        }
    }

    /// The callback names its client: consume that pending entry up front.
    ///
    /// Consuming before completion means a failed completion also burns the
    /// correlation token. A consumed token is never retryable.
    async fn complete_named(
        &self,
        session: &SessionContext,
        payload: &CallbackPayload,
        name: &str,
    ) -> AuthResult<String> {
        let pending = session
            .take_pending(name)
            .ok_or(AuthError::NoPendingRequest)?;
        let client = self.indirect_client(name)?;

        match client.complete(payload, &pending.correlation_token).await {
            Ok(profile) => Ok(self.finish(session, &pending, profile)),
            Err(err) => {
                warn!(client = name, error = %err, "callback completion failed");
                Err(err)
            }
        }
    }

    /// No client name in the payload: test each pending flow against it.
    ///
    /// With a single pending flow it is treated as the originating one and
    /// consumed whatever the outcome. With several, a probe that fails with a
    /// correlation mismatch leaves its entry in place for the login it
    /// actually belongs to; any other failure means the token matched, so the
    /// entry is consumed like a named completion would be.
    async fn complete_probing(
        &self,
        session: &SessionContext,
        payload: &CallbackPayload,
    ) -> AuthResult<String> {
        let candidates = session.pending_clients();
        if candidates.is_empty() {
            return Err(AuthError::NoPendingRequest);
        }

        if let [only] = candidates.as_slice() {
            return self.complete_named(session, payload, only).await;
        }

        let mut last_err = AuthError::NoPendingRequest;
        for name in &candidates {
            let Some(pending) = session.peek_pending(name) else {
                continue;
            };
            let client = self.indirect_client(name)?;
            match client.complete(payload, &pending.correlation_token).await {
                Ok(profile) => {
                    // Re-take atomically; a concurrent callback may have won.
                    let pending = session
                        .take_pending(name)
                        .ok_or(AuthError::NoPendingRequest)?;
                    return Ok(self.finish(session, &pending, profile));
                }
                Err(AuthError::CorrelationMismatch) => {
                    debug!(client = name.as_str(), "callback probe did not match");
                    last_err = AuthError::CorrelationMismatch;
                }
                // Strategies check the correlation token first, so this flow
                // originated the callback: burn its token with the failure.
                Err(err) => {
                    warn!(client = name.as_str(), error = %err, "callback completion failed");
                    session.take_pending(name);
                    return Err(err);
                }
            }
        }
        Err(last_err)
    }

    /// Store the profile, log, and compute the redirect target
    fn finish(
        &self,
        session: &SessionContext,
        pending: &PendingAuthRequest,
        profile: UserProfile,
    ) -> String {
        debug!(client = pending.client_name.as_str(), user = %profile.typed_id(), "indirect flow completed");
        session.put_profile(profile);
        if pending.original_url.is_empty() {
            self.home_path.clone()
        } else {
            pending.original_url.clone()
        }
    }

    fn indirect_client(&self, name: &str) -> AuthResult<Arc<dyn crate::client::IndirectClient>> {
        match self.registry.get(name)? {
            Client::Indirect(client) => Ok(Arc::clone(client)),
            Client::Direct(_) => Err(AuthError::internal(format!(
                "pending request for direct client '{name}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::direct::UserEntry;
    use crate::client::indirect::FormClient;
    use crate::session::SessionStore;
    use axum::http::HeaderMap;
    use std::collections::HashMap;

    fn users() -> HashMap<String, UserEntry> {
        let mut users = HashMap::new();
        users.insert(
            "alice".to_string(),
            UserEntry {
                password: "alice-pw".to_string(),
                roles: vec!["ROLE_USER".to_string()],
            },
        );
        users
    }

    fn handler() -> CallbackHandler {
        let mut registry = ClientRegistry::new();
        registry
            .register(Client::Indirect(Arc::new(FormClient::new(
                "FormClient".to_string(),
                "/loginForm".to_string(),
                users(),
            ))))
            .unwrap();
        registry
            .register(Client::Indirect(Arc::new(FormClient::new(
                "OtherFormClient".to_string(),
                "/loginForm".to_string(),
                users(),
            ))))
            .unwrap();
        CallbackHandler::new(Arc::new(registry), "/".to_string())
    }

    fn session() -> SessionContext {
        SessionContext::from_request(
            Arc::new(SessionStore::new(3600)),
            &HeaderMap::new(),
            "gateway.sid",
        )
    }

    fn pending(client: &str, url: &str, token: &str) -> PendingAuthRequest {
        PendingAuthRequest {
            client_name: client.to_string(),
            original_url: url.to_string(),
            correlation_token: token.to_string(),
        }
    }

    fn payload(params: &[(&str, &str)]) -> CallbackPayload {
        CallbackPayload {
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            headers: HeaderMap::new(),
        }
    }

    #[tokio::test]
    async fn test_success_stores_profile_and_redirects_to_original_url() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-1"));

        let target = handler
            .handle(
                &session,
                &payload(&[
                    ("client_name", "FormClient"),
                    ("state", "tok-1"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(target, "/form/index.html");
        let profile = session.get_profile("FormClient").unwrap();
        assert_eq!(profile.id, "alice");
        assert!(session.pending_clients().is_empty());
    }

    #[tokio::test]
    async fn test_second_callback_with_same_token_fails() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-1"));

        let params = [
            ("client_name", "FormClient"),
            ("state", "tok-1"),
            ("username", "alice"),
            ("password", "alice-pw"),
        ];
        handler.handle(&session, &payload(&params)).await.unwrap();

        let err = handler
            .handle(&session, &payload(&params))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPendingRequest));
    }

    #[tokio::test]
    async fn test_stale_callback_without_pending_fails() {
        let handler = handler();
        let session = session();

        let err = handler
            .handle(
                &session,
                &payload(&[("client_name", "FormClient"), ("state", "tok-1")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::NoPendingRequest));
    }

    #[tokio::test]
    async fn test_failed_completion_consumes_pending() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-1"));

        let err = handler
            .handle(
                &session,
                &payload(&[
                    ("client_name", "FormClient"),
                    ("state", "tok-1"),
                    ("username", "alice"),
                    ("password", "wrong"),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderRejected { .. }));

        // The correlation token is burned: no retry.
        assert!(session.pending_clients().is_empty());
        assert!(!session.has_any_profile());
    }

    #[tokio::test]
    async fn test_correlation_mismatch_fails() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-1"));

        let err = handler
            .handle(
                &session,
                &payload(&[
                    ("client_name", "FormClient"),
                    ("state", "forged"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::CorrelationMismatch));
        assert!(session.pending_clients().is_empty());
    }

    #[tokio::test]
    async fn test_missing_original_url_falls_back_to_home() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "", "tok-1"));

        let target = handler
            .handle(
                &session,
                &payload(&[
                    ("client_name", "FormClient"),
                    ("state", "tok-1"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(target, "/");
    }

    #[tokio::test]
    async fn test_probing_resolves_single_pending_without_client_name() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-1"));

        let target = handler
            .handle(
                &session,
                &payload(&[
                    ("state", "tok-1"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await
            .unwrap();
        assert_eq!(target, "/form/index.html");
        assert!(session.get_profile("FormClient").is_some());
    }

    #[tokio::test]
    async fn test_probing_with_two_pending_consumes_only_match() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-form"));
        session.put_pending(pending("OtherFormClient", "/other/index.html", "tok-other"));

        let target = handler
            .handle(
                &session,
                &payload(&[
                    ("state", "tok-other"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await
            .unwrap();

        assert_eq!(target, "/other/index.html");
        assert!(session.get_profile("OtherFormClient").is_some());
        // The unrelated flow survives the probe.
        assert_eq!(session.pending_clients(), vec!["FormClient".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_probe_with_matching_token_burns_pending() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("FormClient", "/form/index.html", "tok-form"));
        session.put_pending(pending("OtherFormClient", "/other/index.html", "tok-other"));

        let err = handler
            .handle(
                &session,
                &payload(&[
                    ("state", "tok-form"),
                    ("username", "alice"),
                    ("password", "wrong"),
                ]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::ProviderRejected { .. }));

        // The matched flow was consumed with the failure; the unrelated one
        // survives.
        assert_eq!(
            session.pending_clients(),
            vec!["OtherFormClient".to_string()]
        );

        // The same token with the right password cannot complete anymore.
        let retry = handler
            .handle(
                &session,
                &payload(&[
                    ("state", "tok-form"),
                    ("username", "alice"),
                    ("password", "alice-pw"),
                ]),
            )
            .await;
        assert!(retry.is_err());
        assert!(session.get_profile("FormClient").is_none());
    }

    #[tokio::test]
    async fn test_unknown_client_name_on_callback() {
        let handler = handler();
        let session = session();
        session.put_pending(pending("GhostClient", "/x", "tok-1"));

        let err = handler
            .handle(
                &session,
                &payload(&[("client_name", "GhostClient"), ("state", "tok-1")]),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownClient { .. }));
    }
}
