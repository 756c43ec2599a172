//! End-to-end tests over the assembled gateway: challenge and callback flows,
//! direct credential checks, authorization gating, and failure routing.

use axum_test::{TestServer, TestServerConfig};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use http::header::AUTHORIZATION;
use http::{HeaderValue, StatusCode};

use auth_gateway::{GatewayConfig, GatewayServer};

const CONFIG: &str = r#"
session:
  cookie_name: gateway.sid
  idle_timeout_secs: 600
jwt:
  secret: test-secret
clients:
  - kind: form
    name: FormClient
    users:
      - username: alice
        password: alice-pw
        roles: [ROLE_USER]
      - username: root
        password: root-pw
        roles: [ROLE_ADMIN]
  - kind: direct_basic_auth
    name: DirectBasicAuthClient
    users:
      - username: ws
        password: ws-pw
  - kind: parameter
    name: ParameterClient
    parameter: token
    secret: test-secret
authorizers:
  - kind: require_role
    name: admin
    role: ROLE_ADMIN
rules:
  - path: /form/index.html
    clients: FormClient
  - path: /admin/index.html
    clients: FormClient
    authorizer: admin
  - path: /dba/index.html
    clients: "DirectBasicAuthClient, ParameterClient"
  - path: /mixed/index.html
    clients: "DirectBasicAuthClient, FormClient"
  - path: /protected/index.html
    clients: ""
"#;

fn server() -> TestServer {
    let config = GatewayConfig::from_yaml_str(CONFIG).unwrap();
    let gateway = GatewayServer::new(config).unwrap();
    TestServer::new_with_config(
        gateway.app(),
        TestServerConfig {
            save_cookies: true,
            ..TestServerConfig::default()
        },
    )
    .unwrap()
}

fn basic(user: &str, pass: &str) -> HeaderValue {
    let encoded = BASE64.encode(format!("{user}:{pass}"));
    HeaderValue::from_str(&format!("Basic {encoded}")).unwrap()
}

/// Pull a query parameter out of a redirect location
fn query_param(location: &str, name: &str) -> String {
    let query = location.split_once('?').map(|(_, q)| q).unwrap_or_default();
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
        .unwrap_or_else(|| panic!("no '{name}' in {location}"))
}

/// Run the full form login against the server, returning the final redirect
async fn form_login(server: &TestServer, path: &str, user: &str, pass: &str) -> String {
    let challenge = server.get(path).await;
    assert_eq!(challenge.status_code(), StatusCode::FOUND);
    let location = challenge.header("location").to_str().unwrap().to_string();
    assert!(location.starts_with("/loginForm?"));
    let state = query_param(&location, "state");

    let callback = server
        .post("/callback")
        .form(&[
            ("client_name", "FormClient"),
            ("state", state.as_str()),
            ("username", user),
            ("password", pass),
        ])
        .await;
    assert_eq!(callback.status_code(), StatusCode::FOUND);
    callback.header("location").to_str().unwrap().to_string()
}

#[tokio::test]
async fn form_flow_challenges_then_authenticates() {
    let server = server();

    let target = form_login(&server, "/form/index.html", "alice", "alice-pw").await;
    // Back to the originally requested resource.
    assert_eq!(target, "/form/index.html");

    let page = server.get("/form/index.html").await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("FormClient#alice"));
}

#[tokio::test]
async fn second_callback_with_same_token_fails() {
    let server = server();

    let challenge = server.get("/form/index.html").await;
    let location = challenge.header("location").to_str().unwrap().to_string();
    let state = query_param(&location, "state");
    let params = [
        ("client_name", "FormClient"),
        ("state", state.as_str()),
        ("username", "alice"),
        ("password", "alice-pw"),
    ];

    let first = server.post("/callback").form(&params).await;
    assert_eq!(first.status_code(), StatusCode::FOUND);

    // The pending request was consumed; the replay finds nothing.
    let second = server.post("/callback").form(&params).await;
    assert_eq!(second.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn stale_callback_is_an_error_page_not_a_crash() {
    let server = server();
    let response = server
        .post("/callback")
        .form(&[("client_name", "FormClient"), ("state", "stale")])
        .await;
    assert_eq!(response.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn wrong_form_password_burns_the_pending_request() {
    let server = server();

    let challenge = server.get("/form/index.html").await;
    let location = challenge.header("location").to_str().unwrap().to_string();
    let state = query_param(&location, "state");

    let bad = server
        .post("/callback")
        .form(&[
            ("client_name", "FormClient"),
            ("state", state.as_str()),
            ("username", "alice"),
            ("password", "wrong"),
        ])
        .await;
    assert_eq!(bad.status_code(), StatusCode::INTERNAL_SERVER_ERROR);

    // Even the right password cannot reuse the consumed token.
    let retry = server
        .post("/callback")
        .form(&[
            ("client_name", "FormClient"),
            ("state", state.as_str()),
            ("username", "alice"),
            ("password", "alice-pw"),
        ])
        .await;
    assert_eq!(retry.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn direct_basic_auth_accepts_valid_credentials() {
    let server = server();
    let response = server
        .get("/dba/index.html")
        .add_header(AUTHORIZATION, basic("ws", "ws-pw"))
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("DirectBasicAuthClient#ws"));
}

#[tokio::test]
async fn direct_basic_auth_rejects_invalid_credentials_with_401() {
    let server = server();
    let response = server
        .get("/dba/index.html")
        .add_header(AUTHORIZATION, basic("ws", "wrong"))
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);

    // No session mutation: a follow-up request is still unauthenticated.
    let followup = server.get("/dba/index.html").await;
    assert_eq!(followup.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn direct_only_rule_without_credentials_is_401() {
    let server = server();
    let response = server.get("/dba/index.html").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn jwt_parameter_client_is_tried_after_basic() {
    use jsonwebtoken::{encode, EncodingKey, Header};

    let server = server();
    let claims = serde_json::json!({ "sub": "svc", "roles": ["ROLE_USER"] });
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(b"test-secret"),
    )
    .unwrap();

    let response = server
        .get("/dba/index.html")
        .add_header(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("ParameterClient#svc"));
}

#[tokio::test]
async fn mixed_rule_redirects_only_when_no_direct_credentials() {
    let server = server();

    // With Basic credentials the direct candidate wins inline.
    let direct = server
        .get("/mixed/index.html")
        .add_header(AUTHORIZATION, basic("ws", "ws-pw"))
        .await;
    assert_eq!(direct.status_code(), StatusCode::OK);

    // Without credentials the indirect candidate challenges.
    let challenge = server.get("/mixed/index.html").await;
    assert_eq!(challenge.status_code(), StatusCode::FOUND);
    assert!(challenge
        .header("location")
        .to_str()
        .unwrap()
        .starts_with("/loginForm?"));
}

#[tokio::test]
async fn authorizer_denies_with_403_and_keeps_the_profile() {
    let server = server();
    form_login(&server, "/form/index.html", "alice", "alice-pw").await;

    // alice holds ROLE_USER only.
    let admin = server.get("/admin/index.html").await;
    assert_eq!(admin.status_code(), StatusCode::FORBIDDEN);

    // The profile survived the denial.
    let page = server.get("/form/index.html").await;
    assert_eq!(page.status_code(), StatusCode::OK);
    assert!(page.text().contains("FormClient#alice"));
}

#[tokio::test]
async fn authorizer_admits_matching_role() {
    let server = server();
    form_login(&server, "/admin/index.html", "root", "root-pw").await;

    let admin = server.get("/admin/index.html").await;
    assert_eq!(admin.status_code(), StatusCode::OK);
    assert!(admin.text().contains("FormClient#root"));
}

#[tokio::test]
async fn any_client_rule_requires_some_profile() {
    let server = server();

    // No profile at all: denied, and no challenge is possible.
    let denied = server.get("/protected/index.html").await;
    assert_eq!(denied.status_code(), StatusCode::UNAUTHORIZED);

    // A profile from any client satisfies the rule.
    form_login(&server, "/form/index.html", "alice", "alice-pw").await;
    let allowed = server.get("/protected/index.html").await;
    assert_eq!(allowed.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn logout_clears_profiles_and_redirects() {
    let server = server();
    form_login(&server, "/form/index.html", "alice", "alice-pw").await;

    let logout = server.get("/logout").await;
    assert_eq!(logout.status_code(), StatusCode::FOUND);
    assert_eq!(logout.header("location").to_str().unwrap(), "/");

    // Back to a challenge: the profile is gone.
    let after = server.get("/form/index.html").await;
    assert_eq!(after.status_code(), StatusCode::FOUND);
}

#[tokio::test]
async fn login_form_renders_with_flow_parameters() {
    let server = server();
    let response = server
        .get("/loginForm?client_name=FormClient&state=tok-1")
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    let body = response.text();
    assert!(body.contains(r#"name="client_name" value="FormClient""#));
    assert!(body.contains(r#"name="state" value="tok-1""#));
    assert!(body.contains(r#"action="/callback""#));
}

#[tokio::test]
async fn jwt_page_requires_authentication() {
    let server = server();
    let response = server.get("/jwt.html").await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn minted_token_is_accepted_by_the_parameter_client() {
    let server = server();
    form_login(&server, "/form/index.html", "alice", "alice-pw").await;

    let page = server
        .get("/jwt.html")
        .add_header(
            http::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        )
        .await;
    assert_eq!(page.status_code(), StatusCode::OK);
    let body: serde_json::Value = page.json();
    assert_eq!(body["user"], "FormClient#alice");
    let token = body["token"].as_str().unwrap().to_string();

    // The /dba rule holds no session profile for its clients, so the token
    // itself must authenticate.
    let response = server
        .get("/dba/index.html")
        .add_header(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("ParameterClient#alice"));
}

#[tokio::test]
async fn index_is_public() {
    let server = server();
    let response = server.get("/").await;
    assert_eq!(response.status_code(), StatusCode::OK);
}

#[tokio::test]
async fn json_is_negotiated_on_errors() {
    let server = server();
    let response = server
        .get("/dba/index.html")
        .add_header(
            http::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        )
        .await;
    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], 401);
}
