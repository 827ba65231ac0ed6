// libs/monitoring-cell/tests/health_test.rs
use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use monitoring_cell::monitoring_routes;
use shared_utils::test_utils::{read_json, TestApp};

#[tokio::test]
async fn health_reports_connected_store() {
    let app = TestApp::new();

    let response = monitoring_routes(app.state.clone())
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["database"], "connected");
    assert_eq!(body["components"][0]["component"], "database");
    assert!(body["timestamp"].is_string());
}
