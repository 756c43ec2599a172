//! # Authorizers
//!
//! Named predicates gating resource access after authentication succeeds.
//! Each authorizer decides over the authenticated profile plus the request;
//! the registry maps configured names to instances and, like the client
//! registry, is immutable after startup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::client::{RequestSnapshot, UserProfile};
use crate::core::error::{AuthError, AuthResult};

/// Predicate over an authenticated profile and the current request
pub trait Authorizer: Send + Sync + std::fmt::Debug {
    /// Name this authorizer is registered under
    fn name(&self) -> &str;

    /// Whether the profile may access the resource
    fn authorize(&self, profile: &UserProfile, request: &RequestSnapshot) -> bool;
}

/// Immutable mapping from authorizer name to predicate
#[derive(Debug, Default)]
pub struct AuthorizerRegistry {
    authorizers: HashMap<String, Arc<dyn Authorizer>>,
}

impl AuthorizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authorizer under its own name.
    ///
    /// Duplicate names are a configuration error.
    pub fn register(&mut self, authorizer: Arc<dyn Authorizer>) -> AuthResult<()> {
        let name = authorizer.name().to_string();
        if self.authorizers.contains_key(&name) {
            return Err(AuthError::config(format!(
                "duplicate authorizer name '{name}'"
            )));
        }
        self.authorizers.insert(name, authorizer);
        Ok(())
    }

    /// Look up an authorizer by name
    pub fn get(&self, name: &str) -> AuthResult<&Arc<dyn Authorizer>> {
        self.authorizers
            .get(name)
            .ok_or_else(|| AuthError::UnknownAuthorizer {
                name: name.to_string(),
            })
    }

    /// Whether an authorizer with this name is registered
    pub fn contains(&self, name: &str) -> bool {
        self.authorizers.contains_key(name)
    }
}

/// Grants access only to profiles carrying a specific role
#[derive(Debug)]
pub struct RequireRoleAuthorizer {
    name: String,
    role: String,
}

impl RequireRoleAuthorizer {
    pub fn new<S: Into<String>>(name: S, role: S) -> Self {
        Self {
            name: name.into(),
            role: role.into(),
        }
    }
}

impl Authorizer for RequireRoleAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorize(&self, profile: &UserProfile, _request: &RequestSnapshot) -> bool {
        profile.has_role(&self.role)
    }
}

/// Grants access only when a profile attribute equals an expected value
#[derive(Debug)]
pub struct RequireAttributeAuthorizer {
    name: String,
    attribute: String,
    expected: String,
}

impl RequireAttributeAuthorizer {
    pub fn new<S: Into<String>>(name: S, attribute: S, expected: S) -> Self {
        Self {
            name: name.into(),
            attribute: attribute.into(),
            expected: expected.into(),
        }
    }
}

impl Authorizer for RequireAttributeAuthorizer {
    fn name(&self) -> &str {
        &self.name
    }

    fn authorize(&self, profile: &UserProfile, _request: &RequestSnapshot) -> bool {
        profile
            .attribute_str(&self.attribute)
            .map(|value| value == self.expected)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_support::snapshot;
    use serde_json::json;

    #[test]
    fn test_require_role() {
        let authorizer = RequireRoleAuthorizer::new("admin", "ROLE_ADMIN");
        let request = snapshot("/facebookadmin/index.html");

        let admin = UserProfile::new("alice", "FormClient")
            .with_attribute("roles", json!(["ROLE_ADMIN"]));
        let user = UserProfile::new("bob", "FormClient")
            .with_attribute("roles", json!(["ROLE_USER"]));

        assert!(authorizer.authorize(&admin, &request));
        assert!(!authorizer.authorize(&user, &request));
    }

    #[test]
    fn test_require_attribute() {
        let authorizer = RequireAttributeAuthorizer::new("custom", "department", "engineering");
        let request = snapshot("/custom/index.html");

        let eng = UserProfile::new("alice", "FormClient")
            .with_attribute("department", json!("engineering"));
        let sales = UserProfile::new("bob", "FormClient")
            .with_attribute("department", json!("sales"));

        assert!(authorizer.authorize(&eng, &request));
        assert!(!authorizer.authorize(&sales, &request));
    }

    #[test]
    fn test_registry_lookup() {
        let mut registry = AuthorizerRegistry::new();
        registry
            .register(Arc::new(RequireRoleAuthorizer::new("admin", "ROLE_ADMIN")))
            .unwrap();

        assert!(registry.contains("admin"));
        assert!(registry.get("admin").is_ok());
        assert!(matches!(
            registry.get("nope").unwrap_err(),
            AuthError::UnknownAuthorizer { .. }
        ));
    }

    #[test]
    fn test_registry_duplicate_rejected() {
        let mut registry = AuthorizerRegistry::new();
        registry
            .register(Arc::new(RequireRoleAuthorizer::new("admin", "ROLE_ADMIN")))
            .unwrap();
        let err = registry
            .register(Arc::new(RequireRoleAuthorizer::new("admin", "ROLE_ROOT")))
            .unwrap_err();
        assert!(matches!(err, AuthError::Configuration { .. }));
    }
}
