// libs/staff-cell/tests/handlers_test.rs
use axum::http::{Method, StatusCode};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use tower::ServiceExt;

use shared_database::Store;
use shared_models::auth::Role;
use shared_models::directory::ScheduleEntry;
use shared_utils::test_utils::{get, json_request, read_json, TestApp};
use staff_cell::staff_routes;

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = staff_routes(app.state.clone())
        .oneshot(json_request(method, uri, Some(token), body))
        .await
        .unwrap();
    let status = response.status();
    (status, read_json(response).await)
}

fn staff_body(username: &str, phone: &str, staff_type: &str) -> Value {
    json!({
        "username": username,
        "email": format!("{}@clinic.test", username),
        "password": "secret1",
        "full_name": format!("Staff {}", username),
        "phone": phone,
        "date_of_birth": "1985-01-20",
        "staff_type": staff_type,
        "specialization": "Cardiology",
        "salary": 15000000,
    })
}

async fn create(
    app: &TestApp,
    token: &str,
    username: &str,
    phone: &str,
    staff_type: &str,
) -> Value {
    let body = staff_body(username, phone, staff_type);
    let (status, body) = send(app, Method::POST, "/", token, Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["data"].clone()
}

#[tokio::test]
async fn admin_creates_staff_with_linked_account() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;

    let staff = create(&app, &admin.token, "hoa", "0987654321", "doctor").await;
    assert_eq!(staff["staff_type"], "doctor");
    assert_eq!(staff["username"], "hoa");
    assert_eq!(staff["email"], "hoa@clinic.test");
    assert_eq!(staff["is_active"], true);
    assert_eq!(staff["status"], "active");
    assert!(staff["age"].as_u64().is_some());

    let user_id = staff["user_id"].as_i64().unwrap();
    let user = app.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::Doctor);
    assert_ne!(user.password_hash, "secret1");
}

#[tokio::test]
async fn only_admin_manages_staff() {
    let app = TestApp::new();
    let receptionist = app.seed_user(Role::Receptionist).await;

    let (status, _) = send(
        &app,
        Method::POST,
        "/",
        &receptionist.token,
        Some(staff_body("lan", "0987654321", "nurse")),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn duplicate_email_or_phone_conflicts() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    create(&app, &admin.token, "hoa", "0987654321", "doctor").await;

    let same_email = staff_body("hoa", "0987000000", "nurse");
    let (status, _) = send(&app, Method::POST, "/", &admin.token, Some(same_email)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let same_phone = staff_body("minh", "0987654321", "nurse");
    let (status, _) = send(&app, Method::POST, "/", &admin.token, Some(same_phone)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn typed_listings_force_staff_type() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    create(&app, &admin.token, "hoa", "0987654321", "doctor").await;
    create(&app, &admin.token, "lan", "0987654322", "nurse").await;
    create(&app, &admin.token, "tuan", "0987654323", "technician").await;

    let response = staff_routes(app.state.clone())
        .oneshot(get("/doctors?staff_type=nurse", &admin.token))
        .await
        .unwrap();
    let body = read_json(response).await;
    assert_eq!(body["data"]["pagination"]["total"], 1);
    assert_eq!(body["data"]["data"][0]["username"], "hoa");

    let response = staff_routes(app.state.clone())
        .oneshot(get("/nurses", &admin.token))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["data"]["data"][0]["username"], "lan");

    let response = staff_routes(app.state.clone())
        .oneshot(get("/technicians", &admin.token))
        .await
        .unwrap();
    assert_eq!(read_json(response).await["data"]["data"][0]["username"], "tuan");

    let response = staff_routes(app.state.clone()).oneshot(get("/", &admin.token)).await.unwrap();
    assert_eq!(read_json(response).await["data"]["pagination"]["total"], 3);
}

#[tokio::test]
async fn update_keeps_other_fields() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    let staff = create(&app, &admin.token, "hoa", "0987654321", "doctor").await;
    let uri = format!("/{}", staff["id"]);

    let changes = json!({ "status": "on_leave" });
    let (status, body) = send(&app, Method::PUT, &uri, &admin.token, Some(changes)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "on_leave");
    assert_eq!(body["data"]["specialization"], "Cardiology");
    assert_eq!(body["data"]["phone"], "0987654321");
}

#[tokio::test]
async fn delete_deactivates_account() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    let staff = create(&app, &admin.token, "hoa", "0987654321", "nurse").await;
    let uri = format!("/{}", staff["id"]);

    let (status, body) = send(&app, Method::DELETE, &uri, &admin.token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Staff deleted successfully");

    let user = app
        .store
        .find_user_by_id(staff["user_id"].as_i64().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(!user.is_active);

    let (status, _) = send(&app, Method::GET, &uri, &admin.token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn schedule_filters_by_date_range() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    let staff = create(&app, &admin.token, "hoa", "0987654321", "doctor").await;
    let staff_id = staff["id"].as_i64().unwrap();

    for day in [1, 10, 20] {
        app.store
            .seed_schedule(ScheduleEntry {
                id: 0,
                staff_id,
                clinic_id: None,
                work_date: NaiveDate::from_ymd_opt(2024, 7, day).unwrap(),
                start_time: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
                end_time: NaiveTime::from_hms_opt(12, 0, 0).unwrap(),
                shift_type: Some("morning".to_string()),
                notes: None,
                room_number: None,
                room_name: None,
            })
            .await;
    }

    let uri = format!("/{}/schedule?start_date=2024-07-05&end_date=2024-07-20", staff_id);
    let (status, body) = send(&app, Method::GET, &uri, &admin.token, None).await;
    assert_eq!(status, StatusCode::OK);
    let entries = body["data"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["work_date"], "2024-07-10");

    let (status, _) = send(&app, Method::GET, "/999/schedule", &admin.token, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn departments_include_head_doctor_name() {
    let app = TestApp::new();
    let admin = app.seed_user(Role::Admin).await;
    let staff = create(&app, &admin.token, "hoa", "0987654321", "doctor").await;
    app.store
        .seed_department("Cardiology", None, staff["id"].as_i64())
        .await;

    let (status, body) = send(&app, Method::GET, "/departments", &admin.token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["name"], "Cardiology");
    assert_eq!(body["data"][0]["head_doctor_name"], "Staff hoa");
}
