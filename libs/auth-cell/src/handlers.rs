use axum::extract::{Extension, State};

use shared_models::auth::{AuthPayload, AuthUser, User};
use shared_models::error::AppError;
use shared_models::response::ApiResponse;
use shared_utils::validation::ValidatedJson;
use shared_utils::AppState;

use crate::models::{
    ChangePasswordRequest, LoginRequest, ProfileResponse, RegisterRequest, UpdateProfileRequest,
};
use crate::services::AuthService;

#[axum::debug_handler]
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<RegisterRequest>,
) -> Result<ApiResponse<AuthPayload>, AppError> {
    let payload = AuthService::new(&state).register(request).await?;
    Ok(ApiResponse::created("Registration successful", payload))
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<LoginRequest>,
) -> Result<ApiResponse<AuthPayload>, AppError> {
    let payload = AuthService::new(&state).login(request).await?;
    Ok(ApiResponse::ok("Login successful", payload))
}

#[axum::debug_handler]
pub async fn get_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<ApiResponse<ProfileResponse>, AppError> {
    let profile = AuthService::new(&state).profile(user.id).await?;
    Ok(ApiResponse::ok("Profile retrieved successfully", profile))
}

#[axum::debug_handler]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<UpdateProfileRequest>,
) -> Result<ApiResponse<User>, AppError> {
    let updated = AuthService::new(&state).update_profile(user.id, request).await?;
    Ok(ApiResponse::ok("Profile updated successfully", updated))
}

#[axum::debug_handler]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<ChangePasswordRequest>,
) -> Result<ApiResponse<()>, AppError> {
    AuthService::new(&state).change_password(user.id, request).await?;
    Ok(ApiResponse::message("Password changed successfully"))
}
