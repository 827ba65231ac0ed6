use axum::{middleware, routing::get, Router};

use shared_utils::extractor::auth_middleware;
use shared_utils::AppState;

use crate::handlers;

pub fn staff_routes(state: AppState) -> Router {
    Router::new()
        .route("/", get(handlers::list_staff).post(handlers::create_staff))
        // Typed listings
        .route("/doctors", get(handlers::list_doctors))
        .route("/nurses", get(handlers::list_nurses))
        .route("/technicians", get(handlers::list_technicians))
        .route("/departments", get(handlers::list_departments))
        .route(
            "/{id}",
            get(handlers::get_staff)
                .put(handlers::update_staff)
                .delete(handlers::delete_staff),
        )
        .route("/{id}/schedule", get(handlers::get_staff_schedule))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
}
