use axum::extract::{Extension, Path, State};

use shared_models::appointment::AppointmentDetails;
use shared_models::auth::{AuthUser, Capability};
use shared_models::directory::ClinicDetails;
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Page};
use shared_utils::validation::{ApiQuery, ValidatedJson};
use shared_utils::AppState;

use crate::models::{ClinicListQuery, ClinicScheduleQuery, CreateClinicRequest, UpdateClinicRequest};
use crate::services::ClinicService;

#[axum::debug_handler]
pub async fn list_clinics(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ClinicListQuery>,
) -> Result<ApiResponse<Page<ClinicDetails>>, AppError> {
    let clinics = ClinicService::new(&state).list_clinics(query).await?;
    Ok(ApiResponse::ok("Clinics retrieved successfully", clinics))
}

#[axum::debug_handler]
pub async fn get_clinic(
    State(state): State<AppState>,
    Path(clinic_id): Path<i64>,
) -> Result<ApiResponse<ClinicDetails>, AppError> {
    let clinic = ClinicService::new(&state).get_clinic(clinic_id).await?;
    Ok(ApiResponse::ok("Clinic retrieved successfully", clinic))
}

#[axum::debug_handler]
pub async fn create_clinic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<CreateClinicRequest>,
) -> Result<ApiResponse<ClinicDetails>, AppError> {
    user.require(Capability::ManageClinics)?;

    let clinic = ClinicService::new(&state).create_clinic(request).await?;
    Ok(ApiResponse::created("Clinic created successfully", clinic))
}

#[axum::debug_handler]
pub async fn update_clinic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(clinic_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateClinicRequest>,
) -> Result<ApiResponse<ClinicDetails>, AppError> {
    user.require(Capability::ManageClinics)?;

    let clinic = ClinicService::new(&state).update_clinic(clinic_id, request).await?;
    Ok(ApiResponse::ok("Clinic updated successfully", clinic))
}

#[axum::debug_handler]
pub async fn delete_clinic(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(clinic_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    user.require(Capability::ManageClinics)?;

    ClinicService::new(&state).delete_clinic(clinic_id).await?;
    Ok(ApiResponse::message("Clinic deleted successfully"))
}

#[axum::debug_handler]
pub async fn get_clinic_schedule(
    State(state): State<AppState>,
    Path(clinic_id): Path<i64>,
    ApiQuery(query): ApiQuery<ClinicScheduleQuery>,
) -> Result<ApiResponse<Vec<AppointmentDetails>>, AppError> {
    let schedule = ClinicService::new(&state).schedule(clinic_id, query).await?;
    Ok(ApiResponse::ok("Clinic schedule retrieved successfully", schedule))
}
