use axum::{routing::get, Json, Router};
use serde_json::{json, Value};

use appointment_cell::appointment_routes;
use auth_cell::auth_routes;
use clinic_cell::clinic_routes;
use monitoring_cell::monitoring_routes;
use patient_cell::patient_routes;
use revenue_cell::revenue_routes;
use shared_models::error::AppError;
use shared_utils::AppState;
use staff_cell::staff_routes;

const API_PREFIX: &str = "/api/v1";

pub fn create_router(state: AppState) -> Router {
    let api = Router::new()
        .nest("/auth", auth_routes(state.clone()))
        .nest("/patients", patient_routes(state.clone()))
        .nest("/staff", staff_routes(state.clone()))
        .nest("/clinics", clinic_routes(state.clone()))
        .nest("/appointments", appointment_routes(state.clone()))
        .nest("/revenue", revenue_routes(state.clone()));

    Router::new()
        .route("/", get(welcome))
        .merge(monitoring_routes(state))
        .nest(API_PREFIX, api)
        .fallback(not_found)
}

async fn welcome() -> Json<Value> {
    Json(json!({
        "success": true,
        "message": "Healthcare Management API",
        "version": env!("CARGO_PKG_VERSION"),
        "api": API_PREFIX,
        "endpoints": {
            "auth": format!("{}/auth", API_PREFIX),
            "patients": format!("{}/patients", API_PREFIX),
            "staff": format!("{}/staff", API_PREFIX),
            "clinics": format!("{}/clinics", API_PREFIX),
            "appointments": format!("{}/appointments", API_PREFIX),
            "revenue": format!("{}/revenue", API_PREFIX),
            "health": "/health",
        },
    }))
}

async fn not_found() -> AppError {
    AppError::NotFound("Route not found".to_string())
}
