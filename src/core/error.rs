//! # Error Handling Module
//!
//! This module provides error handling for the authentication gateway using the
//! `thiserror` crate. It defines every failure mode the decision pipeline and
//! callback handler can produce and maps each one to the HTTP status code that
//! must be returned to clients.
//!
//! The mapping is part of the gateway's contract: missing or invalid
//! credentials are 401, a failed authorization predicate is 403, and anything
//! that goes wrong while completing a callback (or anything unanticipated) is
//! 500. Internal detail never reaches the response body; it only reaches the
//! server-side logs.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::convert::Infallible;
use thiserror::Error;

/// Main result type used throughout the gateway
///
/// Type alias so call sites can write `AuthResult<T>` instead of
/// `Result<T, AuthError>`.
pub type AuthResult<T> = Result<T, AuthError>;

/// All error conditions the gateway can produce
///
/// Each variant represents a different failure category. The `#[error("...")]`
/// attribute from `thiserror` implements `Display` with the given message.
#[derive(Debug, Error, Clone)]
pub enum AuthError {
    /// A configured rule names a client that is not registered.
    /// Configuration-time: this fails startup, never a live request.
    #[error("Unknown client: {name}")]
    UnknownClient { name: String },

    /// A configured rule names an authorizer that is not registered.
    /// Configuration-time, startup-fatal like `UnknownClient`.
    #[error("Unknown authorizer: {name}")]
    UnknownAuthorizer { name: String },

    /// A callback arrived with no matching pending authentication request
    /// in the session (stale, replayed, or already consumed).
    #[error("No pending authentication request for this callback")]
    NoPendingRequest,

    /// The correlation token echoed by the callback does not match the one
    /// recorded when the flow was initiated (anti-forgery check).
    #[error("Correlation token mismatch on callback")]
    CorrelationMismatch,

    /// The identity provider reported a failed verification.
    #[error("Provider rejected authentication: {reason}")]
    ProviderRejected { reason: String },

    /// The request carried no credentials a direct client could use.
    #[error("No credentials presented")]
    NoCredentials,

    /// Credentials were presented but failed verification.
    #[error("Invalid credentials: {reason}")]
    InvalidCredentials { reason: String },

    /// No principal in the session and no strategy available to obtain one.
    #[error("Authentication required")]
    NotAuthenticated,

    /// An authorizer predicate denied an authenticated principal.
    #[error("Access denied: {reason}")]
    Forbidden { reason: String },

    /// Configuration-related errors (invalid config, missing files, etc.)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Internal errors for unexpected failures during strategy execution
    #[error("Internal server error: {message}")]
    Internal { message: String },

    /// I/O errors (file operations, etc.)
    #[error("I/O error: {message}")]
    Io { message: String },

    /// YAML parsing errors for configuration files
    #[error("YAML error: {message}")]
    Yaml { message: String },
}

impl AuthError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an internal error with a custom message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an invalid-credentials error with a custom reason
    pub fn invalid_credentials<S: Into<String>>(reason: S) -> Self {
        Self::InvalidCredentials {
            reason: reason.into(),
        }
    }

    /// Create a forbidden error with a custom reason
    pub fn forbidden<S: Into<String>>(reason: S) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    /// Create a provider-rejected error with a custom reason
    pub fn provider_rejected<S: Into<String>>(reason: S) -> Self {
        Self::ProviderRejected {
            reason: reason.into(),
        }
    }

    /// Create an unknown-client error
    pub fn unknown_client<S: Into<String>>(name: S) -> Self {
        Self::UnknownClient { name: name.into() }
    }

    /// Get the HTTP status code for this error
    ///
    /// This is the failure-routing table: every error category resolves to
    /// exactly one status, so identical failures always produce identical
    /// responses.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotAuthenticated => StatusCode::UNAUTHORIZED,
            Self::NoCredentials => StatusCode::UNAUTHORIZED,
            Self::InvalidCredentials { .. } => StatusCode::UNAUTHORIZED,
            Self::Forbidden { .. } => StatusCode::FORBIDDEN,
            Self::NoPendingRequest => StatusCode::INTERNAL_SERVER_ERROR,
            Self::CorrelationMismatch => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ProviderRejected { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownClient { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UnknownAuthorizer { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Yaml { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Whether this error originated while completing an indirect callback
    pub fn is_callback_failure(&self) -> bool {
        matches!(
            self,
            Self::NoPendingRequest | Self::CorrelationMismatch | Self::ProviderRejected { .. }
        )
    }

    /// Get a string representation of the error type for API responses
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::UnknownClient { .. } => "unknown_client",
            Self::UnknownAuthorizer { .. } => "unknown_authorizer",
            Self::NoPendingRequest => "no_pending_request",
            Self::CorrelationMismatch => "correlation_mismatch",
            Self::ProviderRejected { .. } => "provider_rejected",
            Self::NoCredentials => "no_credentials",
            Self::InvalidCredentials { .. } => "invalid_credentials",
            Self::NotAuthenticated => "not_authenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::Configuration { .. } => "configuration_error",
            Self::Internal { .. } => "internal_error",
            Self::Io { .. } => "io_error",
            Self::Yaml { .. } => "yaml_error",
        }
    }

    /// Message that is safe to show in a response body
    ///
    /// Internal failures must not leak diagnostic detail to clients; they get
    /// a generic message. Everything else displays its normal message.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal { .. }
            | Self::Io { .. }
            | Self::Yaml { .. }
            | Self::Configuration { .. } => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

/// Implement conversion from Infallible for middleware compatibility
impl From<Infallible> for AuthError {
    fn from(infallible: Infallible) -> Self {
        match infallible {}
    }
}

/// Implement conversion from std::io::Error
impl From<std::io::Error> for AuthError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from serde_yaml::Error
impl From<serde_yaml::Error> for AuthError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Yaml {
            message: err.to_string(),
        }
    }
}

/// Implement conversion from tera::Error
impl From<tera::Error> for AuthError {
    fn from(err: tera::Error) -> Self {
        Self::Internal {
            message: format!("Template error: {err}"),
        }
    }
}

/// Implement `IntoResponse` so handlers can bubble errors with `?`
///
/// This is the JSON fallback used when an error escapes without going through
/// the failure router's content negotiation (API-style callers).
impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        let error_response = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.public_message(),
                "type": self.error_type(),
            }
        });

        (status, Json(error_response)).into_response()
    }
}
