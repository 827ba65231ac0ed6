// libs/auth-cell/tests/handlers_test.rs
use axum::http::{Method, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use auth_cell::auth_routes;
use shared_database::store::NewUser;
use shared_database::Store;
use shared_models::auth::Role;
use shared_utils::password::hash_password;
use shared_utils::test_utils::{get, json_request, read_json, TestApp};

async fn call(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = auth_routes(app.state.clone())
        .oneshot(json_request(method, uri, token, body))
        .await
        .unwrap();
    let status = response.status();
    (status, read_json(response).await)
}

async fn register(app: &TestApp, email: &str, password: &str) -> Value {
    let (status, body) = call(
        app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "username": "linh", "email": email, "password": password })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body
}

#[tokio::test]
async fn register_defaults_to_patient_role_and_returns_token() {
    let app = TestApp::new();
    let body = register(&app, "linh@clinic.test", "secret1").await;

    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["user"]["role"], "patient");
    assert_eq!(body["data"]["user"]["email"], "linh@clinic.test");
    assert!(body["data"]["user"].get("password_hash").is_none());
    assert!(body["data"]["token"].as_str().is_some_and(|t| !t.is_empty()));
}

#[tokio::test]
async fn register_rejects_duplicate_email() {
    let app = TestApp::new();
    register(&app, "dup@clinic.test", "secret1").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "username": "other", "email": "dup@clinic.test", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn register_validates_fields() {
    let app = TestApp::new();
    let (status, body) = call(
        &app,
        Method::POST,
        "/register",
        None,
        Some(json!({ "username": "x", "email": "not-an-email", "password": "123" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["errors"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["field"].as_str().unwrap())
        .collect();
    assert_eq!(fields, vec!["email", "password"]);
}

#[tokio::test]
async fn login_succeeds_with_correct_password() {
    let app = TestApp::new();
    register(&app, "login@clinic.test", "secret1").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": "login@clinic.test", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Login successful");
    assert!(body["data"]["token"].is_string());
}

#[tokio::test]
async fn login_failures_share_one_message() {
    let app = TestApp::new();
    register(&app, "known@clinic.test", "secret1").await;
    app.store
        .create_user(NewUser {
            username: "inactive".to_string(),
            email: "inactive@clinic.test".to_string(),
            password_hash: hash_password("secret1").unwrap(),
            role: Role::Nurse,
            is_active: false,
        })
        .await
        .unwrap();

    for (email, password) in [
        ("known@clinic.test", "wrong-password"),
        ("nobody@clinic.test", "secret1"),
        ("inactive@clinic.test", "secret1"),
    ] {
        let (status, body) = call(
            &app,
            Method::POST,
            "/login",
            None,
            Some(json!({ "email": email, "password": password })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{}", email);
        assert_eq!(body["message"], "Invalid email or password");
    }
}

#[tokio::test]
async fn profile_requires_token() {
    let app = TestApp::new();
    let (status, body) = call(&app, Method::GET, "/profile", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Access token required");

    let (status, body) = call(&app, Method::GET, "/profile", Some("not.a.jwt"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token");
}

#[tokio::test]
async fn profile_returns_current_user() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;

    let response = auth_routes(app.state.clone())
        .oneshot(get("/profile", &admin.token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = read_json(response).await;
    assert_eq!(body["data"]["id"], admin.id());
    assert_eq!(body["data"]["role"], "admin");
    assert!(body["data"].get("staff_info").is_none());
}

#[tokio::test]
async fn update_profile_keeps_unspecified_fields() {
    let app = TestApp::new();
    let user = app.seed_user(Role::Receptionist).await;

    let (status, body) = call(
        &app,
        Method::PUT,
        "/profile",
        Some(&user.token),
        Some(json!({ "username": "front-desk" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["username"], "front-desk");
    assert_eq!(body["data"]["email"], user.user.email.as_str());
}

#[tokio::test]
async fn change_password_verifies_current_password() {
    let app = TestApp::new();
    let registered = register(&app, "change@clinic.test", "secret1").await;
    let token = registered["data"]["token"].as_str().unwrap().to_string();

    let (status, _) = call(
        &app,
        Method::POST,
        "/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "wrong1", "newPassword": "secret2" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = call(
        &app,
        Method::POST,
        "/change-password",
        Some(&token),
        Some(json!({ "currentPassword": "secret1", "newPassword": "secret2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Password changed successfully");

    let (status, _) = call(
        &app,
        Method::POST,
        "/login",
        None,
        Some(json!({ "email": "change@clinic.test", "password": "secret2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn deactivated_user_token_is_rejected() {
    let app = TestApp::new();
    let user = app
        .store
        .create_user(NewUser {
            username: "gone".to_string(),
            email: "gone@clinic.test".to_string(),
            password_hash: "unused".to_string(),
            role: Role::Doctor,
            is_active: false,
        })
        .await
        .unwrap();
    let token = app.token_for(&user);

    let (status, body) = call(&app, Method::GET, "/profile", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Account is deactivated");
}
