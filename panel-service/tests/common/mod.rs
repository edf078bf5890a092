//! Shared setup for panel-service integration tests.
//!
//! Every test gets its own in-memory store and a manual clock, and drives the
//! real router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    extract::ConnectInfo,
    http::{header, Request, StatusCode},
    Router,
};
use panel_service::{
    build_router,
    config::{
        Environment, JwtConfig, MongoConfig, PanelConfig, PasswordConfig, ProvisioningConfig,
        RateLimitConfig, SecurityConfig, StoreBackend, SwaggerConfig, SwaggerMode,
    },
    models::{Role, User},
    services::{Clock, ManualClock, MemoryStore, Store},
    utils::{Password, PasswordHasher},
    AppState,
};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const TEST_API_KEY: &str = "test-provision-key";
pub const PASSWORD: &str = "correct-horse-9";

pub fn test_config() -> PanelConfig {
    PanelConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "panel-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        store: StoreBackend::Memory,
        mongodb: MongoConfig {
            uri: "mongodb://localhost:27017".to_string(),
            database: "panel_test".to_string(),
        },
        jwt: JwtConfig {
            access_secret: "test-access-secret-0123456789abcdef".to_string(),
            refresh_secret: "test-refresh-secret-0123456789abcdef".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 30,
            setup_token_expiry_minutes: 15,
        },
        provisioning: ProvisioningConfig {
            api_key: TEST_API_KEY.to_string(),
            code_ttl_minutes: 15,
        },
        password: PasswordConfig {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Disabled,
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
            setup_attempts: 1000,
            setup_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: MemoryStore,
    pub clock: ManualClock,
    pub state: AppState,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: PanelConfig) -> Self {
        let store = MemoryStore::new();
        let clock = ManualClock::default();
        let state = AppState::new(
            config,
            Arc::new(store.clone()),
            Arc::new(clock.clone()) as Arc<dyn Clock>,
        )
        .expect("Failed to build app state");
        let router = build_router(state.clone())
            .await
            .expect("Failed to build router");

        Self {
            router,
            store,
            clock,
            state,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("Failed to read body");
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                Value::String(String::from_utf8_lossy(&bytes).into_owned())
            })
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json_request("POST", uri, token, &[], body).await
    }

    pub async fn put_json(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.json_request("PUT", uri, token, &[], body).await
    }

    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        headers: &[(&str, &str)],
        body: Value,
    ) -> (StatusCode, Value) {
        self.send(json_body_request(method, uri, token, headers, body))
            .await
    }

    /// Sends an unauthenticated JSON request as if the TCP peer were `peer`.
    pub async fn json_request_from(
        &self,
        peer: &str,
        method: &str,
        uri: &str,
        headers: &[(&str, &str)],
        body: Value,
    ) -> (StatusCode, Value) {
        let mut request = json_body_request(method, uri, None, headers, body);
        let addr: SocketAddr = peer.parse().expect("Invalid peer address");
        request.extensions_mut().insert(ConnectInfo(addr));
        self.send(request).await
    }

    /// Inserts a user directly and returns its id.
    pub async fn create_user(&self, email: &str, role: Role) -> String {
        let hasher = PasswordHasher::new(1024, 1, 1).unwrap();
        let hash = hasher
            .hash(&Password::new(PASSWORD.to_string()))
            .unwrap()
            .into_string();
        let user = User::new(email, hash, None, role, self.clock.now());
        self.store.insert_user(&user).await.unwrap();
        user.id
    }

    pub async fn login(&self, email: &str) -> String {
        let (status, body) = self
            .post_json(
                "/api/auth/login",
                None,
                serde_json::json!({ "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["access_token"].as_str().unwrap().to_string()
    }

    pub async fn superadmin_token(&self) -> String {
        self.create_user("root@example.com", Role::Superadmin).await;
        self.login("root@example.com").await
    }

    /// Issues a setup code for `slug` through the operator endpoint.
    pub async fn request_code(&self, site_name: &str, slug: &str) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            "/api/provision/request-code",
            None,
            &[("x-api-key", TEST_API_KEY)],
            serde_json::json!({ "site_name": site_name, "site_slug": slug }),
        )
        .await
    }

    pub async fn setup_login(&self, code: &str) -> (StatusCode, Value) {
        self.post_json(
            "/api/auth/setup-login",
            None,
            serde_json::json!({ "code": code }),
        )
        .await
    }

    pub async fn setup_register(&self, setup_token: &str, email: &str) -> (StatusCode, Value) {
        self.post_json(
            "/api/auth/setup-register",
            Some(setup_token),
            serde_json::json!({ "email": email, "password": PASSWORD, "name": "Ada" }),
        )
        .await
    }
}

fn json_body_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    headers: &[(&str, &str)],
    body: Value,
) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}
