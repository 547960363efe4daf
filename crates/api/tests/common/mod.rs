#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHasher, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, SET_COOKIE, USER_AGENT};
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use chrono::Utc;
use warden_api::config::ServerConfig;
use warden_api::router::build_app_router;
use warden_api::state::AppState;
use warden_core::clock::ManualClock;
use warden_core::config::SessionConfig;
use warden_core::engine::{Engine, Stores};
use warden_core::mailer::MemoryMailer;
use warden_core::memory::{MemoryRevocationStore, MemorySessionStore, MemoryUserDirectory};
use warden_core::roles::Role;
use warden_core::store::{CreateUser, UserAccount};

pub const PASSWORD: &str = "test_password_123!";

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config(device_cap: usize) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        secure_cookies: false,
        sweep_interval_secs: 300,
        public_url: "http://localhost:3000".to_string(),
        session: SessionConfig {
            access_secret: "test-access-secret".to_string(),
            refresh_secret: "test-refresh-secret".to_string(),
            access_ttl: Duration::from_secs(15 * 60),
            refresh_ttl: Duration::from_secs(7 * 24 * 3600),
            device_cap,
            store_timeout: Duration::from_secs(1),
            verification_ttl: Duration::from_secs(10 * 60),
        },
    }
}

/// The router plus handles on its in-memory backends.
pub struct TestApp {
    pub router: Router,
    pub users: Arc<MemoryUserDirectory>,
    pub sessions: Arc<MemorySessionStore>,
    pub mailer: Arc<MemoryMailer>,
    pub clock: Arc<ManualClock>,
}

impl TestApp {
    pub fn app(&self) -> Router {
        self.router.clone()
    }

    /// Provision an account whose password is [`PASSWORD`].
    pub async fn create_user(&self, email: &str, role: Role, is_verified: bool) -> UserAccount {
        self.users
            .insert(
                CreateUser {
                    email: email.to_string(),
                    name: "Test User".to_string(),
                    password_hash: cheap_hash(PASSWORD),
                    role,
                    is_verified,
                },
                Utc::now(),
            )
            .await
    }
}

/// Build the full application router with all middleware layers, backed by
/// in-memory stores and a manual clock.
pub fn build_test_app(device_cap: usize) -> TestApp {
    let config = test_config(device_cap);
    let users = Arc::new(MemoryUserDirectory::new());
    let sessions = Arc::new(MemorySessionStore::new());
    let mailer = Arc::new(MemoryMailer::new());
    let clock = Arc::new(ManualClock::new(Utc::now()));

    let stores = Stores {
        sessions: sessions.clone(),
        revocations: Arc::new(MemoryRevocationStore::new()),
        users: users.clone(),
    };
    let engine = Engine::new(config.session.clone(), stores, mailer.clone(), clock.clone());

    let state = AppState {
        pool: None,
        config: Arc::new(config.clone()),
        sessions: engine.sessions,
        identity: engine.identity,
        accounts: engine.accounts,
    };

    TestApp {
        router: build_app_router(state, &config),
        users,
        sessions,
        mailer,
        clock,
    }
}

/// Argon2id hash with minimal cost parameters to keep tests fast.
fn cheap_hash(password: &str) -> String {
    let params = Params::new(8, 1, 1, None).unwrap();
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
        .hash_password(password.as_bytes(), &salt)
        .unwrap()
        .to_string()
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

/// Send a request with optional JSON body and extra headers.
pub async fn send(
    app: Router,
    method: Method,
    uri: &str,
    headers: &[(&str, String)],
    body: Option<serde_json::Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    let body = match body {
        Some(json) => {
            builder = builder.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    app.oneshot(builder.body(body).unwrap()).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response {
    send(app, Method::GET, uri, &[], None).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response {
    send(app, Method::POST, uri, &[], Some(body)).await
}

pub async fn get_auth(app: Router, uri: &str, token: &str) -> Response {
    send(app, Method::GET, uri, &[bearer(token)], None).await
}

pub fn bearer(token: &str) -> (&'static str, String) {
    (AUTHORIZATION.as_str(), format!("Bearer {token}"))
}

pub fn cookies(pairs: &[(&str, &str)]) -> (&'static str, String) {
    let value = pairs
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("; ");
    (COOKIE.as_str(), value)
}

pub fn user_agent(agent: &str) -> (&'static str, String) {
    (USER_AGENT.as_str(), agent.to_string())
}

/// Log in from `device` and return the `data` payload.
pub async fn login(app: Router, email: &str, device: &str) -> serde_json::Value {
    let response = send(
        app,
        Method::POST,
        "/api/v1/auth/login",
        &[user_agent(device)],
        Some(serde_json::json!({ "email": email, "password": PASSWORD })),
    )
    .await;
    assert_eq!(response.status(), axum::http::StatusCode::OK);
    body_json(response).await["data"].clone()
}

/// All `Set-Cookie` header values of a response.
pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
