use crate::config::{ScopeSeed, UmaConfig};
use crate::create_app;
use crate::models::{AuthorizationGrant, UmaScopeType};
use crate::state::AppState;
use crate::uma::tokens;
use axum::body::Body;
use axum::Router;
use chrono::{Duration, Utc};
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use log::LevelFilter;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use tower::ServiceExt;

/// Test fixture for exercising the UMA endpoints against an in-memory store.
///
/// Seeds the Internal scopes `view`, `edit` and `delete` (the latter requiring
/// claims) plus the External scope `print`, and mints bearer grants on demand.
///
/// # Examples
///
/// ```rust
/// #[tokio::test]
/// async fn test_endpoint() {
///     let fixture = TestFixture::new().await;
///     let pat = fixture.protection_token("rs-client").await;
///     let resource = fixture.register_resource(&pat, &["view"]).await;
///
///     let response = fixture
///         .post("/uma/permission", &json!({ "resource_id": resource, "scopes": [fixture.scope_url("view")] }), Some(&pat))
///         .await;
///     response.assert_status(StatusCode::CREATED);
/// }
/// ```
pub struct TestFixture {
    /// The application router
    pub app: Router,
    /// Configuration settings
    pub config: UmaConfig,
    /// Application state shared with the router
    pub state: AppState,
}

impl TestFixture {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Creates a fixture after letting `customize` adjust the test configuration
    pub async fn with_config(customize: impl FnOnce(&mut UmaConfig)) -> Self {
        Self::setup_logger(LevelFilter::Debug);

        let mut config = UmaConfig::for_test();
        config.add_scopes_automatically = false;
        config.claims_required_scopes = vec!["https://as.example.com/scopes/delete".to_string()];
        config.scopes = vec![
            scope_seed("view", Some("View"), None),
            scope_seed("edit", None, None),
            scope_seed("delete", None, None),
            scope_seed("print", None, Some("https://rs.example.com/scopes/print")),
        ];
        customize(&mut config);

        let state = AppState::for_testing(&config).await;
        let app = create_app(state.clone()).await;

        Self { app, config, state }
    }

    /// Initializes the test logger with customized settings.
    pub fn setup_logger(level: LevelFilter) {
        let _ = env_logger::builder()
            .filter_level(level)
            .is_test(true)
            .try_init();
    }

    /// URL of an Internal scope
    pub fn scope_url(&self, id: &str) -> String {
        format!("{}/scopes/{id}", self.config.base_endpoint())
    }

    /// Registers a fresh bearer grant and returns its token
    pub async fn grant_token(&self, client_id: &str, user_id: &str, scope: UmaScopeType) -> String {
        let token = tokens::generate_secure_token();
        let grant = AuthorizationGrant {
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scopes: HashSet::from([scope.as_str().to_string()]),
            expires_at: Utc::now() + Duration::hours(1),
            token: String::new(),
        };
        self.state
            .grants
            .register(&token, &grant)
            .await
            .expect("Failed to register grant");
        token
    }

    /// PAT of a resource server
    pub async fn protection_token(&self, client_id: &str) -> String {
        self.grant_token(client_id, "resource-owner", UmaScopeType::Protection)
            .await
    }

    /// AAT of a client acting for `user_id`
    pub async fn authorization_token(&self, client_id: &str, user_id: &str) -> String {
        self.grant_token(client_id, user_id, UmaScopeType::Authorization)
            .await
    }

    /// Registers a resource set with the given Internal scopes and returns its id
    pub async fn register_resource(&self, pat: &str, scopes: &[&str]) -> String {
        let scope_urls: Vec<String> = scopes.iter().map(|scope| self.scope_url(scope)).collect();
        let response = self
            .post(
                "/uma/resource_set",
                &json!({ "name": "test resource", "scopes": scope_urls }),
                Some(pat),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json["_id"]
            .as_str()
            .expect("Missing resource id")
            .to_string()
    }

    /// Registers a permission and returns its ticket
    pub async fn register_permission(&self, pat: &str, resource_id: &str, scopes: &[&str]) -> String {
        let scope_urls: Vec<String> = scopes.iter().map(|scope| self.scope_url(scope)).collect();
        let response = self
            .post(
                "/uma/permission",
                &json!({ "resource_id": resource_id, "scopes": scope_urls }),
                Some(pat),
            )
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json["ticket"]
            .as_str()
            .expect("Missing ticket")
            .to_string()
    }

    /// Creates a request builder, adding the bearer token when given
    pub fn request_builder(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        token: Option<&str>,
    ) -> http::request::Builder {
        let mut builder = Request::builder().method(method).uri(uri.as_ref());
        builder = builder.header("Host", "rs.example.com");
        if let Some(token) = token {
            builder = builder.header("Authorization", format!("Bearer {}", token));
        }
        builder
    }

    /// Sends an unauthenticated GET request
    pub async fn get(&self, uri: impl AsRef<str>) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, None)
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    pub async fn get_with_token(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = self
            .request_builder(Method::GET, uri, Some(token))
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with a JSON body
    pub async fn post<T: Serialize>(
        &self,
        uri: impl AsRef<str>,
        body: &T,
        token: Option<&str>,
    ) -> TestResponse {
        self.send_json(Method::POST, uri, body, token).await
    }

    pub async fn put<T: Serialize>(&self, uri: impl AsRef<str>, body: &T, token: &str) -> TestResponse {
        self.send_json(Method::PUT, uri, body, Some(token)).await
    }

    pub async fn delete(&self, uri: impl AsRef<str>, token: &str) -> TestResponse {
        let request = self
            .request_builder(Method::DELETE, uri, Some(token))
            .body(Body::empty())
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a POST request with an urlencoded form body
    pub async fn post_form(
        &self,
        uri: impl AsRef<str>,
        fields: &[(&str, &str)],
        token: &str,
    ) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self
            .request_builder(Method::POST, uri, Some(token))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(Body::from(body))
            .expect("Failed to build request");

        self.send(request).await
    }

    async fn send_json<T: Serialize>(
        &self,
        method: Method,
        uri: impl AsRef<str>,
        body: &T,
        token: Option<&str>,
    ) -> TestResponse {
        let json_body = serde_json::to_vec(body).expect("Failed to serialize body to JSON");
        let request = self
            .request_builder(method, uri, token)
            .header("Content-Type", "application/json")
            .body(Body::from(json_body))
            .expect("Failed to build request");

        self.send(request).await
    }

    /// Sends a request and returns a TestResponse.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .app
            .clone()
            .oneshot(request)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();

        // Try to parse as JSON, defaulting to empty object if parsing fails or empty body
        let json = if !body.is_empty() {
            serde_json::from_slice(&body).unwrap_or_else(|_| json!({}))
        } else {
            json!({})
        };

        TestResponse { status, json }
    }
}

fn scope_seed(id: &str, display_name: Option<&str>, url: Option<&str>) -> ScopeSeed {
    ScopeSeed {
        id: id.to_string(),
        display_name: display_name.map(str::to_string),
        icon_uri: None,
        url: url.map(str::to_string),
    }
}

/// Response from a test request that provides convenient access to status and JSON body.
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Response body as JSON (if present and valid JSON)
    pub json: Value,
}

impl TestResponse {
    /// Asserts that the response has the expected status code.
    ///
    /// # Panics
    ///
    /// Panics if the status code doesn't match the expected value.
    pub fn assert_status(&self, expected: StatusCode) -> &Self {
        assert_eq!(
            self.status,
            expected,
            "Expected status {} but got {} with body: {}",
            expected,
            self.status,
            serde_json::to_string_pretty(&self.json).unwrap_or_default()
        );
        self
    }

    /// Asserts that the response status is OK (200).
    pub fn assert_ok(&self) -> &Self {
        self.assert_status(StatusCode::OK)
    }

    /// Converts the response body to the specified type.
    ///
    /// # Panics
    ///
    /// Panics if deserialization fails.
    pub fn json_as<T: DeserializeOwned>(&self) -> T {
        serde_json::from_value(self.json.clone()).expect("Failed to deserialize response JSON")
    }
}
