use axum::{middleware, routing::get, Router};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn clinic_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::list_clinics).post(handlers::create_clinic))
        .route(
            "/{id}",
            get(handlers::get_clinic)
                .put(handlers::update_clinic)
                .delete(handlers::delete_clinic),
        )
        .route("/{id}/schedule", get(handlers::get_clinic_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
