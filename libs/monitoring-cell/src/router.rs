// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use axum::{routing::get, Router};

use shared_utils::AppState;

use crate::handlers::get_health_status;
use crate::services::health::mark_started;

pub fn monitoring_routes(state: AppState) -> Router {
    mark_started();

    Router::new()
        .route("/health", get(get_health_status))
        .with_state(state)
}
