use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request},
    response::Response,
};
use chrono::Duration;
use serde_json::Value;

use shared_config::{AppConfig, Environment, StorageBackend};
use shared_database::store::NewUser;
use shared_database::{MemoryStore, Store};
use shared_models::auth::{Role, User};

use crate::jwt::issue_token;
use crate::state::AppState;

pub const TEST_JWT_SECRET: &str = "test-secret-key-for-jwt-validation-must-be-long-enough";

static NEXT_USER: AtomicU64 = AtomicU64::new(1);

pub fn test_config() -> AppConfig {
    AppConfig {
        environment: Environment::Development,
        port: 0,
        storage_backend: StorageBackend::Memory,
        database_url: String::new(),
        database_max_connections: 1,
        jwt_secret: TEST_JWT_SECRET.to_string(),
        jwt_expires_in: Duration::hours(1),
        cors_origin: None,
        bootstrap_admin: None,
    }
}

/// Signed-in account produced by [`TestApp::seed_user`].
pub struct TestUser {
    pub user: User,
    pub token: String,
}

impl TestUser {
    pub fn id(&self) -> i64 {
        self.user.id
    }
}

/// Application state over a fresh in-memory store.
pub struct TestApp {
    pub store: Arc<MemoryStore>,
    pub state: AppState,
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(test_config(), store.clone());
        Self { store, state }
    }

    /// Creates an active account for `role` with a placeholder hash and signs a token for it.
    pub async fn seed_user(&self, role: Role) -> TestUser {
        let n = NEXT_USER.fetch_add(1, Ordering::Relaxed);
        let user = self
            .store
            .create_user(NewUser {
                username: format!("{}{}", role.as_str(), n),
                email: format!("{}{}@clinic.test", role.as_str(), n),
                password_hash: "unused".to_string(),
                role,
                is_active: true,
            })
            .await
            .unwrap();
        let token = self.token_for(&user);
        TestUser { user, token }
    }

    pub fn token_for(&self, user: &User) -> String {
        issue_token(user.id, user.role, TEST_JWT_SECRET, Duration::hours(1)).unwrap()
    }
}

pub fn json_request(
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn get(uri: &str, token: &str) -> Request<Body> {
    json_request(Method::GET, uri, Some(token), None)
}

pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}
