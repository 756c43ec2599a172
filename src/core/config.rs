//! # Configuration Management
//!
//! Loads and validates the gateway configuration from YAML. Configuration is
//! the single source of the client registry, the authorizer registry, and the
//! protected-resource rules; all three are built here once at startup and are
//! immutable afterwards.
//!
//! Validation is deliberately strict: a rule naming an unregistered client or
//! authorizer fails startup, never a live request.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use crate::authz::{
    AuthorizerRegistry, RequireAttributeAuthorizer, RequireRoleAuthorizer,
};
use crate::client::direct::UserEntry;
use crate::client::{
    Client, ClientRegistry, DirectBasicAuthClient, FormClient, IndirectBasicAuthClient,
    ParameterClient,
};
use crate::core::error::{AuthError, AuthResult};
use crate::core::error_pages::ErrorPageConfig;
use crate::pipeline::ProtectedRule;

/// Top-level gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Session cookie and expiry settings
    pub session: SessionConfig,

    /// Well-known gateway paths
    pub paths: PathsConfig,

    /// Error page rendering settings
    pub error_pages: ErrorPageConfig,

    /// Token-generator page settings
    pub jwt: JwtConfig,

    /// Identity clients available to rules
    pub clients: Vec<ClientConfig>,

    /// Named authorization predicates available to rules
    pub authorizers: Vec<AuthorizerConfig>,

    /// Protected resources
    pub rules: Vec<RuleConfig>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            session: SessionConfig::default(),
            paths: PathsConfig::default(),
            error_pages: ErrorPageConfig::default(),
            jwt: JwtConfig::default(),
            clients: Vec::new(),
            authorizers: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Session cookie and expiry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Name of the session cookie
    pub cookie_name: String,

    /// Idle timeout in seconds before a session expires
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: "gateway.sid".to_string(),
            idle_timeout_secs: 1800,
        }
    }
}

/// Well-known gateway paths
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Callback endpoint completing indirect flows
    pub callback: String,

    /// Credential-entry form for form-based clients
    pub login_form: String,

    /// Fallback redirect target after login when no original URL is known
    pub home: String,

    /// Public landing page after logout
    pub after_logout: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            callback: "/callback".to_string(),
            login_form: "/loginForm".to_string(),
            home: "/".to_string(),
            after_logout: "/".to_string(),
        }
    }
}

/// Token-generator page settings
///
/// `/jwt.html` mints a signed bearer token for the authenticated user. Give
/// the secret the same value as the parameter client's so minted tokens are
/// accepted there. With no secret configured the page reports an error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: Option<String>,
}

/// A configured user for table-backed clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// An identity client declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClientConfig {
    /// Direct: `Authorization: Basic` against a user table
    DirectBasicAuth {
        name: String,
        users: Vec<UserConfig>,
        #[serde(default)]
        persist_profile: bool,
    },

    /// Direct: signed JWT as bearer header or request parameter
    Parameter {
        name: String,
        #[serde(default = "default_token_parameter")]
        parameter: String,
        secret: String,
        #[serde(default)]
        persist_profile: bool,
    },

    /// Indirect: redirect to a login form posting back to the callback
    Form {
        name: String,
        /// Login form location; the gateway's own form path by default
        #[serde(default)]
        login_url: Option<String>,
        users: Vec<UserConfig>,
    },

    /// Indirect: redirect back to the callback expecting Basic credentials
    IndirectBasicAuth {
        name: String,
        users: Vec<UserConfig>,
    },
}

fn default_token_parameter() -> String {
    "token".to_string()
}

impl ClientConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::DirectBasicAuth { name, .. } => name,
            Self::Parameter { name, .. } => name,
            Self::Form { name, .. } => name,
            Self::IndirectBasicAuth { name, .. } => name,
        }
    }
}

/// A named authorization predicate declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthorizerConfig {
    /// Requires a role in the profile's `roles` attribute
    RequireRole { name: String, role: String },

    /// Requires a profile attribute to equal a value
    RequireAttribute {
        name: String,
        attribute: String,
        value: String,
    },
}

/// A protected resource declaration
///
/// `clients` is the original comma-separated ordered candidate list; it is
/// parsed and resolved once when the rules are built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Exact request path to protect
    pub path: String,

    /// Comma-separated ordered client names; empty means "any authenticated"
    #[serde(default)]
    pub clients: String,

    /// Optional authorizer gating access after authentication
    #[serde(default)]
    pub authorizer: Option<String>,
}

impl GatewayConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> AuthResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml_str(content: &str) -> AuthResult<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        Ok(config)
    }

    /// Build the immutable registries and resolved rules.
    ///
    /// Fails when a rule references an unknown client or authorizer, when
    /// client or authorizer names collide, or when a client declaration is
    /// unusable.
    pub fn build(
        &self,
    ) -> AuthResult<(
        Arc<ClientRegistry>,
        Arc<AuthorizerRegistry>,
        Vec<Arc<ProtectedRule>>,
    )> {
        let mut clients = ClientRegistry::new();
        for declaration in &self.clients {
            clients.register(self.build_client(declaration))?;
        }

        let mut authorizers = AuthorizerRegistry::new();
        for declaration in &self.authorizers {
            match declaration {
                AuthorizerConfig::RequireRole { name, role } => authorizers
                    .register(Arc::new(RequireRoleAuthorizer::new(
                        name.clone(),
                        role.clone(),
                    )))?,
                AuthorizerConfig::RequireAttribute {
                    name,
                    attribute,
                    value,
                } => authorizers.register(Arc::new(RequireAttributeAuthorizer::new(
                    name.clone(),
                    attribute.clone(),
                    value.clone(),
                )))?,
            }
        }

        let mut rules = Vec::with_capacity(self.rules.len());
        let mut seen_paths = HashSet::new();
        for rule in &self.rules {
            // axum panics on duplicate route paths; catch them here instead.
            if !seen_paths.insert(rule.path.as_str()) {
                return Err(AuthError::config(format!(
                    "duplicate rule path '{}'",
                    rule.path
                )));
            }
            let names = ClientRegistry::parse_names(&rule.clients);
            let resolved = clients.resolve(&names)?;
            if let Some(authorizer) = &rule.authorizer {
                if !authorizers.contains(authorizer) {
                    return Err(AuthError::UnknownAuthorizer {
                        name: authorizer.clone(),
                    });
                }
            }
            rules.push(Arc::new(ProtectedRule {
                path: rule.path.clone(),
                clients: resolved,
                authorizer: rule.authorizer.clone(),
            }));
        }

        Ok((Arc::new(clients), Arc::new(authorizers), rules))
    }

    fn build_client(&self, declaration: &ClientConfig) -> Client {
        match declaration {
            ClientConfig::DirectBasicAuth {
                name,
                users,
                persist_profile,
            } => Client::Direct(Arc::new(
                DirectBasicAuthClient::new(name.clone(), user_table(users))
                    .with_persist_profile(*persist_profile),
            )),
            ClientConfig::Parameter {
                name,
                parameter,
                secret,
                persist_profile,
            } => Client::Direct(Arc::new(
                ParameterClient::new(name.clone(), parameter.clone(), secret)
                    .with_persist_profile(*persist_profile),
            )),
            ClientConfig::Form {
                name,
                login_url,
                users,
            } => Client::Indirect(Arc::new(FormClient::new(
                name.clone(),
                login_url
                    .clone()
                    .unwrap_or_else(|| self.paths.login_form.clone()),
                user_table(users),
            ))),
            ClientConfig::IndirectBasicAuth { name, users } => {
                Client::Indirect(Arc::new(IndirectBasicAuthClient::new(
                    name.clone(),
                    self.paths.callback.clone(),
                    user_table(users),
                )))
            }
        }
    }
}

fn user_table(users: &[UserConfig]) -> HashMap<String, UserEntry> {
    users
        .iter()
        .map(|u| {
            (
                u.username.clone(),
                UserEntry {
                    password: u.password.clone(),
                    roles: u.roles.clone(),
                },
            )
        })
        .collect()
}
