//! # Gateway Server
//!
//! Assembles the axum application from configuration and runs it. Each
//! configured protected rule becomes a route through the decision pipeline;
//! the callback, logout, and login-form endpoints are mounted alongside, and
//! a public index page fronts the whole thing.
//!
//! Handlers here only adapt HTTP to the core components: they build the
//! session handle and request snapshot, invoke the pipeline or callback
//! handler, and translate the outcome (render, redirect, or failure route)
//! back into a response. No authentication logic lives at this layer.

use axum::body::Body;
use axum::extract::{Extension, Request, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tera::Tera;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use crate::callback::CallbackHandler;
use crate::client::{CallbackPayload, RequestSnapshot, UserProfile};
use crate::core::config::GatewayConfig;
use crate::core::error::{AuthError, AuthResult};
use crate::core::error_pages::FailureRouter;
use crate::pipeline::{AuthPipeline, Decision, ProtectedRule};
use crate::session::{SessionContext, SessionStore};

/// How often the expired-session sweeper runs
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Public index page
const INDEX_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>{{ brand_name }}</title></head>
<body>
    <h1>{{ brand_name }}</h1>
    <p>Public index. Protected resources require authentication.</p>
    <ul>
    {% for rule in rules %}<li><a href="{{ rule }}">{{ rule }}</a></li>
    {% endfor %}</ul>
</body>
</html>"#;

/// Credential-entry form for form-based indirect clients
///
/// Posts straight to the callback endpoint, echoing the client name and the
/// correlation token it was opened with.
const LOGIN_FORM_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Login | {{ brand_name }}</title></head>
<body>
    <h1>Login</h1>
    <form action="{{ callback_path }}" method="post">
        <input type="hidden" name="client_name" value="{{ client_name }}">
        <input type="hidden" name="state" value="{{ state }}">
        <label>Username <input type="text" name="username"></label>
        <label>Password <input type="password" name="password"></label>
        <button type="submit">Sign in</button>
    </form>
</body>
</html>"#;

/// Token-generator page for the JWT direct client
const JWT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Token | {{ brand_name }}</title></head>
<body>
    <h1>Generated token</h1>
    <p>Bearer token for <strong>{{ user }}</strong>:</p>
    <pre>{{ token }}</pre>
</body>
</html>"#;

/// Page shown once a protected resource is reached
const PROTECTED_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head><meta charset="UTF-8"><title>Protected | {{ brand_name }}</title></head>
<body>
    <h1>Protected resource</h1>
    <p>Authenticated as <strong>{{ user }}</strong> via <strong>{{ client }}</strong>.</p>
    <a href="{{ logout_path }}">Logout</a>
</body>
</html>"#;

/// Shared application state, cheap to clone per request
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GatewayConfig>,
    pub sessions: Arc<SessionStore>,
    pub pipeline: Arc<AuthPipeline>,
    pub callback: Arc<CallbackHandler>,
    pub failures: Arc<FailureRouter>,
    pub pages: Arc<Tera>,
    rule_paths: Arc<Vec<String>>,
}

/// The assembled gateway server
#[derive(Debug)]
pub struct GatewayServer {
    config: Arc<GatewayConfig>,
    app: Router,
    sessions: Arc<SessionStore>,
}

impl GatewayServer {
    /// Build the server from configuration.
    ///
    /// Fails on invalid configuration (unknown clients or authorizers in
    /// rules, duplicate names) so misconfiguration never reaches traffic.
    pub fn new(config: GatewayConfig) -> AuthResult<Self> {
        let config = Arc::new(config);
        let (clients, authorizers, rules) = config.build()?;

        let sessions = Arc::new(SessionStore::new(config.session.idle_timeout_secs));
        let pipeline = Arc::new(AuthPipeline::new(authorizers));
        let callback = Arc::new(CallbackHandler::new(clients, config.paths.home.clone()));
        let failures = Arc::new(FailureRouter::new(config.error_pages.clone())?);

        let mut pages = Tera::default();
        pages.add_raw_template("index.html", INDEX_TEMPLATE)?;
        pages.add_raw_template("login_form.html", LOGIN_FORM_TEMPLATE)?;
        pages.add_raw_template("protected.html", PROTECTED_TEMPLATE)?;
        pages.add_raw_template("jwt.html", JWT_TEMPLATE)?;

        let state = AppState {
            config: Arc::clone(&config),
            sessions: Arc::clone(&sessions),
            pipeline,
            callback,
            failures,
            pages: Arc::new(pages),
            rule_paths: Arc::new(rules.iter().map(|r| r.path.clone()).collect()),
        };

        let mut app = Router::new()
            .route("/", get(index))
            .route("/index.html", get(index))
            .route(&config.paths.callback, get(callback_endpoint).post(callback_endpoint))
            .route("/logout", get(logout))
            .route("/jwt.html", get(jwt_generator))
            .route(&config.paths.login_form, get(login_form));

        for rule in rules {
            debug!(path = rule.path.as_str(), clients = rule.clients.len(), "mounting protected route");
            let route = Router::new()
                .route(&rule.path, get(protected_resource).post(protected_resource))
                .layer(Extension(rule));
            app = app.merge(route);
        }

        let app = app
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        Ok(Self {
            config,
            app,
            sessions,
        })
    }

    /// The assembled router, for tests and embedding
    pub fn app(&self) -> Router {
        self.app.clone()
    }

    /// Bind and serve until the process is stopped
    pub async fn run(self) -> AuthResult<()> {
        let sessions = Arc::clone(&self.sessions);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
            loop {
                interval.tick().await;
                let evicted = sessions.evict_expired();
                if evicted > 0 {
                    debug!(evicted, "swept expired sessions");
                }
            }
        });

        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        info!(%addr, "auth gateway listening");
        axum::serve(listener, self.app)
            .await
            .map_err(|e| AuthError::internal(format!("server error: {e}")))?;
        Ok(())
    }
}

/// Capture the parts of a request the pipeline needs
fn snapshot(path: &str, query: Option<&str>, headers: &HeaderMap) -> RequestSnapshot {
    let params = query
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect::<HashMap<String, String>>()
        })
        .unwrap_or_default();
    RequestSnapshot {
        path: path.to_string(),
        query: query.map(String::from),
        headers: headers.clone(),
        params,
    }
}

/// 302 redirect to a location
fn found(location: &str) -> Response {
    match HeaderValue::from_str(location) {
        Ok(value) => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = StatusCode::FOUND;
            response.headers_mut().insert(header::LOCATION, value);
            response
        }
        Err(_) => {
            warn!(location, "redirect target is not a valid header value");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Attach the session cookie when the session was created on this request
fn with_session_cookie(
    mut response: Response,
    session: &SessionContext,
    state: &AppState,
) -> Response {
    if session.is_fresh() {
        if let Ok(value) =
            HeaderValue::from_str(&session.cookie_value(&state.config.session.cookie_name))
        {
            response.headers_mut().insert(header::SET_COOKIE, value);
        }
    }
    response
}

/// Run the decision pipeline for a protected route
async fn protected_resource(
    State(state): State<AppState>,
    Extension(rule): Extension<Arc<ProtectedRule>>,
    request: Request,
) -> Response {
    let headers = request.headers().clone();
    let session = SessionContext::from_request(
        Arc::clone(&state.sessions),
        &headers,
        &state.config.session.cookie_name,
    );
    let snap = snapshot(request.uri().path(), request.uri().query(), &headers);

    let response = match state.pipeline.decide(&rule, &session, &snap).await {
        Decision::Authenticated(profile) => render_protected(&state, &profile, &headers),
        Decision::Challenge { location } => found(&location),
        Decision::Denied(error) => state.failures.route(&error, None, &headers),
    };
    with_session_cookie(response, &session, &state)
}

/// Whether the caller prefers a JSON body
fn wants_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("application/json"))
        .unwrap_or(false)
}

/// Render the resource page for an authenticated profile
fn render_protected(state: &AppState, profile: &UserProfile, headers: &HeaderMap) -> Response {
    if wants_json(headers) {
        return Json(json!({
            "id": profile.typed_id(),
            "client": profile.client_name,
            "attributes": profile.attributes,
        }))
        .into_response();
    }

    let mut context = tera::Context::new();
    context.insert("brand_name", &state.config.error_pages.brand_name);
    context.insert("user", &profile.typed_id());
    context.insert("client", &profile.client_name);
    context.insert("logout_path", "/logout");
    match state.pages.render("protected.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(error = %e, "protected page rendering failed");
            state
                .failures
                .route(&AuthError::internal("page rendering failed"), None, headers)
        }
    }
}

/// Mint a signed bearer token for the authenticated user
///
/// Lets a browser user obtain a token for web-service calls against the
/// parameter client's endpoints.
async fn jwt_generator(State(state): State<AppState>, request: Request) -> Response {
    let headers = request.headers().clone();
    let session = SessionContext::from_request(
        Arc::clone(&state.sessions),
        &headers,
        &state.config.session.cookie_name,
    );

    let Some(profile) = session.profiles().into_iter().next() else {
        let response = state
            .failures
            .route(&AuthError::NotAuthenticated, None, &headers);
        return with_session_cookie(response, &session, &state);
    };

    let response = match mint_token(&state, &profile) {
        Ok(token) => render_jwt(&state, &profile, &token, &headers),
        Err(error) => state.failures.route(&error, None, &headers),
    };
    with_session_cookie(response, &session, &state)
}

/// Sign the profile into a token the parameter client accepts
fn mint_token(state: &AppState, profile: &UserProfile) -> AuthResult<String> {
    let secret = state
        .config
        .jwt
        .secret
        .as_deref()
        .ok_or_else(|| AuthError::config("no JWT signing secret configured"))?;

    let mut claims = serde_json::Map::new();
    claims.insert("sub".to_string(), json!(profile.id));
    claims.insert(
        "exp".to_string(),
        json!((chrono::Utc::now() + chrono::Duration::hours(1)).timestamp()),
    );
    for (name, value) in &profile.attributes {
        if !claims.contains_key(name) {
            claims.insert(name.clone(), value.clone());
        }
    }

    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AuthError::internal(format!("token signing failed: {e}")))
}

/// Render the minted token, honoring Accept negotiation
fn render_jwt(
    state: &AppState,
    profile: &UserProfile,
    token: &str,
    headers: &HeaderMap,
) -> Response {
    if wants_json(headers) {
        return Json(json!({ "token": token, "user": profile.typed_id() })).into_response();
    }

    let mut context = tera::Context::new();
    context.insert("brand_name", &state.config.error_pages.brand_name);
    context.insert("user", &profile.typed_id());
    context.insert("token", token);
    match state.pages.render("jwt.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(error = %e, "token page rendering failed");
            state
                .failures
                .route(&AuthError::internal("page rendering failed"), None, headers)
        }
    }
}

/// Complete an indirect flow on the callback endpoint (GET or POST)
async fn callback_endpoint(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let session = SessionContext::from_request(
        Arc::clone(&state.sessions),
        &parts.headers,
        &state.config.session.cookie_name,
    );

    let mut params: HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    // Merge form fields from a provider-initiated POST return.
    if parts.method == Method::POST && is_form_encoded(&parts.headers) {
        match axum::body::to_bytes(body, 64 * 1024).await {
            Ok(bytes) => {
                params.extend(
                    url::form_urlencoded::parse(&bytes)
                        .into_owned()
                        .collect::<HashMap<String, String>>(),
                );
            }
            Err(e) => {
                warn!(error = %e, "failed to read callback body");
                let error = AuthError::internal("unreadable callback body");
                let response = state.failures.route(&error, None, &parts.headers);
                return with_session_cookie(response, &session, &state);
            }
        }
    }

    let payload = CallbackPayload {
        params,
        headers: parts.headers.clone(),
    };

    let response = match state.callback.handle(&session, &payload).await {
        Ok(target) => found(&target),
        Err(error) => state.failures.route(&error, None, &parts.headers),
    };
    with_session_cookie(response, &session, &state)
}

fn is_form_encoded(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Drop every authenticated profile and send the browser to the landing page
async fn logout(State(state): State<AppState>, request: Request) -> Response {
    let session = SessionContext::from_request(
        Arc::clone(&state.sessions),
        request.headers(),
        &state.config.session.cookie_name,
    );
    session.clear_profiles();
    debug!(session = %session.id(), "profiles cleared on logout");
    let response = found(&state.config.paths.after_logout);
    with_session_cookie(response, &session, &state)
}

/// Render the credential-entry form for a form-based client
async fn login_form(State(state): State<AppState>, request: Request) -> Response {
    let params: HashMap<String, String> = request
        .uri()
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();

    let mut context = tera::Context::new();
    context.insert("brand_name", &state.config.error_pages.brand_name);
    context.insert("callback_path", &state.config.paths.callback);
    context.insert(
        "client_name",
        params.get("client_name").map(String::as_str).unwrap_or(""),
    );
    context.insert("state", params.get("state").map(String::as_str).unwrap_or(""));

    match state.pages.render("login_form.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(error = %e, "login form rendering failed");
            state.failures.route(
                &AuthError::internal("page rendering failed"),
                None,
                request.headers(),
            )
        }
    }
}

/// Public index listing the configured protected areas
async fn index(State(state): State<AppState>) -> Response {
    let mut context = tera::Context::new();
    context.insert("brand_name", &state.config.error_pages.brand_name);
    context.insert("rules", state.rule_paths.as_ref());
    match state.pages.render("index.html", &context) {
        Ok(html) => Html(html).into_response(),
        Err(e) => {
            warn!(error = %e, "index rendering failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
