use axum::{
    middleware,
    routing::{get, patch},
    Router,
};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn revenue_routes(state: AppState) -> Router {
    Router::new()
        .route("/invoices", get(handlers::list_invoices).post(handlers::create_invoice))
        .route("/invoices/{id}", get(handlers::get_invoice))
        .route("/invoices/{id}/payment", patch(handlers::update_payment))
        .route("/stats", get(handlers::revenue_stats))
        .route("/insurance-claims", get(handlers::list_insurance_claims))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
