// =====================================================================================
// MONITORING HANDLERS
// =====================================================================================

use axum::{extract::State, http::StatusCode, Json};

use shared_utils::AppState;

use crate::models::HealthReport;
use crate::services::HealthMonitorService;

/// 200 while the store answers, 503 otherwise.
#[axum::debug_handler]
pub async fn get_health_status(State(state): State<AppState>) -> (StatusCode, Json<HealthReport>) {
    let report = HealthMonitorService::new(&state).check().await;

    let status = if report.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(report))
}
