//! # Auth Gateway Library
//!
//! An HTTP authentication gateway: it fronts a set of protected resources,
//! decides per request whether the caller is authenticated, and when not,
//! delegates to one of several configured identity-verification strategies:
//! direct (credentials in the request itself) or indirect (redirect to a
//! provider, completed later on a callback endpoint). Once identity is
//! established, named authorizer predicates gate access, and every failure
//! maps to a deterministic HTTP outcome.
//!
//! ## Architecture Overview
//!
//! - `core`: error taxonomy with HTTP status mapping, configuration loading,
//!   and the failure router rendering status-coded error pages
//! - `session`: the concurrent session store and the per-request session
//!   handle everything above it receives
//! - `client`: the direct/indirect strategy traits, concrete clients, and the
//!   name-to-client registry with ordered list resolution
//! - `authz`: named authorization predicates and their registry
//! - `pipeline`: the per-request decision state machine
//! - `callback`: completion of in-flight indirect flows
//! - `gateway`: the axum server tying it all together

/// Error types, configuration, and failure routing
pub mod core;

/// Session store and per-request session context
pub mod session;

/// Identity clients: strategy traits, implementations, registry
pub mod client;

/// Authorization predicates and registry
pub mod authz;

/// The authentication decision pipeline
pub mod pipeline;

/// Callback handling for indirect flows
pub mod callback;

/// Gateway server and HTTP handlers
pub mod gateway;

// Re-export commonly used types so embedders can import from the crate root.

/// Main error and result types used throughout the gateway
pub use self::core::error::{AuthError, AuthResult};

/// Main configuration structure for the gateway
pub use self::core::config::GatewayConfig;

/// Failure routing (reason to HTTP response mapping)
pub use self::core::error_pages::{ErrorPageConfig, FailureRouter};

/// The authenticated identity produced by clients
pub use client::UserProfile;

/// Pipeline entry points
pub use pipeline::{AuthPipeline, Decision, ProtectedRule};

/// Server entry point
pub use gateway::server::GatewayServer;
