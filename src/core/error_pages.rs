//! # Failure Router
//!
//! Maps every pipeline or callback failure to a deterministic HTTP response:
//! a status code from the error taxonomy plus a rendered error page. Supports
//! HTML pages (tera templates, with built-in defaults for 401, 403, and 500)
//! and JSON responses selected by content negotiation on the Accept header.
//!
//! Status defaulting: when a response status was already set earlier in the
//! pipeline it is preserved; when nothing set one, the error's own mapping
//! applies, and that mapping bottoms out at 500 for anything unanticipated.
//! An unset status on a failure path is itself an internal error.

use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use tera::{Context, Tera};
use tracing::{debug, warn};

use crate::core::error::{AuthError, AuthResult};

/// Error page configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorPageConfig {
    /// Brand name to display on error pages
    pub brand_name: String,

    /// Custom error messages by status code
    pub custom_messages: HashMap<u16, String>,
}

impl Default for ErrorPageConfig {
    fn default() -> Self {
        let mut custom_messages = HashMap::new();
        custom_messages.insert(
            401,
            "Unauthorized - Authentication is required to access this resource.".to_string(),
        );
        custom_messages.insert(
            403,
            "Forbidden - Access to this resource is denied.".to_string(),
        );
        custom_messages.insert(
            500,
            "Internal Server Error - Something went wrong on our end.".to_string(),
        );

        Self {
            brand_name: "Auth Gateway".to_string(),
            custom_messages,
        }
    }
}

/// Built-in error page template
const ERROR_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{{ status_code }} - {{ status_text }} | {{ brand_name }}</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; background: #f5f6fa; }
        .error-container { max-width: 480px; margin: 10vh auto; background: white; border-radius: 8px; padding: 2.5rem; box-shadow: 0 4px 12px rgba(0,0,0,0.08); text-align: center; }
        .error-code { font-size: 3.5rem; font-weight: bold; color: #e74c3c; }
        .error-title { font-size: 1.4rem; color: #2c3e50; margin: 0.5rem 0; }
        .error-message { color: #7f8c8d; line-height: 1.5; }
        .home-link { display: inline-block; margin-top: 1.5rem; color: #3498db; text-decoration: none; }
    </style>
</head>
<body>
    <div class="error-container">
        <div class="error-code">{{ status_code }}</div>
        <div class="error-title">{{ status_text }}</div>
        <p class="error-message">{{ message }}</p>
        <a class="home-link" href="/">Back to {{ brand_name }}</a>
    </div>
</body>
</html>"#;

/// Routes failures to status-coded error responses
pub struct FailureRouter {
    config: ErrorPageConfig,
    tera: Tera,
}

impl FailureRouter {
    /// Create a router with the built-in error template
    pub fn new(config: ErrorPageConfig) -> AuthResult<Self> {
        let mut tera = Tera::default();
        tera.add_raw_template("error.html", ERROR_TEMPLATE)?;
        Ok(Self { config, tera })
    }

    /// Route a failure to its response.
    ///
    /// `preset_status` is a status set by an earlier stage; a set status is
    /// always preserved. With none set, the error's own mapping decides.
    pub fn route(
        &self,
        error: &AuthError,
        preset_status: Option<StatusCode>,
        request_headers: &HeaderMap,
    ) -> Response {
        let status = preset_status.unwrap_or_else(|| error.status_code());
        if status.is_server_error() {
            warn!(error = %error, status = status.as_u16(), "routing failure");
        } else {
            debug!(error = %error, status = status.as_u16(), "routing failure");
        }
        self.render(
            status,
            &error.public_message(),
            error.error_type(),
            request_headers,
        )
    }

    /// Render an error response for a status, honoring Accept negotiation
    pub fn render(
        &self,
        status: StatusCode,
        message: &str,
        error_type: &str,
        request_headers: &HeaderMap,
    ) -> Response {
        let message = self
            .config
            .custom_messages
            .get(&status.as_u16())
            .cloned()
            .unwrap_or_else(|| message.to_string());

        if Self::wants_json(request_headers) {
            let body = json!({
                "error": {
                    "code": status.as_u16(),
                    "message": message,
                    "type": error_type,
                }
            });
            return (status, Json(body)).into_response();
        }

        let mut context = Context::new();
        context.insert("status_code", &status.as_u16());
        context.insert("status_text", status.canonical_reason().unwrap_or("Error"));
        context.insert("message", &message);
        context.insert("brand_name", &self.config.brand_name);

        match self.tera.render("error.html", &context) {
            Ok(html) => (status, Html(html)).into_response(),
            // The page failed to render; the status still must be right.
            Err(e) => {
                warn!(error = %e, "error template rendering failed");
                (status, message).into_response()
            }
        }
    }

    /// Whether the caller prefers a JSON error body
    fn wants_json(headers: &HeaderMap) -> bool {
        headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .map(|accept| accept.contains("application/json"))
            .unwrap_or(false)
    }
}
