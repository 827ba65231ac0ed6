use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use axum_extra::typed_header::{TypedHeader, TypedHeaderRejection};
use headers::{authorization::Bearer, Authorization};
use tracing::debug;

use shared_models::auth::AuthUser;
use shared_models::error::AppError;

use crate::jwt::validate_token;
use crate::state::AppState;

/// Resolves the bearer token to an active user and stores it as an `AuthUser` extension.
pub async fn auth_middleware(
    State(state): State<AppState>,
    bearer: Result<TypedHeader<Authorization<Bearer>>, TypedHeaderRejection>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let TypedHeader(auth) = bearer.map_err(|rejection| {
        if rejection.is_missing() {
            AppError::Unauthorized("Access token required".to_string())
        } else {
            AppError::Unauthorized("Invalid authorization header format".to_string())
        }
    })?;

    let token = auth.token().trim();
    if token.is_empty() {
        return Err(AppError::Unauthorized("Access token required".to_string()));
    }

    let claims = validate_token(token, &state.config.jwt_secret)
        .map_err(AppError::Unauthorized)?;

    let user_id: i64 = claims
        .sub
        .parse()
        .map_err(|_| AppError::Unauthorized("Invalid token".to_string()))?;

    let user = state
        .store
        .find_user_by_id(user_id)
        .await?
        .ok_or_else(|| AppError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        debug!("Rejected token for deactivated user {}", user.id);
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    request.extensions_mut().insert(AuthUser::from(&user));
    Ok(next.run(request).await)
}
