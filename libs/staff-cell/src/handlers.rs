use axum::extract::{Extension, Path, State};

use shared_models::auth::{AuthUser, Capability};
use shared_models::directory::{DepartmentDetails, ScheduleEntry, StaffType, StaffView};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Page};
use shared_utils::validation::{ApiQuery, ValidatedJson};
use shared_utils::AppState;

use crate::models::{CreateStaffRequest, ScheduleQuery, StaffListQuery, UpdateStaffRequest};
use crate::services::StaffService;

#[axum::debug_handler]
pub async fn list_staff(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StaffListQuery>,
) -> Result<ApiResponse<Page<StaffView>>, AppError> {
    let staff = StaffService::new(&state).list_staff(query, None).await?;
    Ok(ApiResponse::ok("Staff retrieved successfully", staff))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StaffListQuery>,
) -> Result<ApiResponse<Page<StaffView>>, AppError> {
    let doctors = StaffService::new(&state)
        .list_staff(query, Some(StaffType::Doctor))
        .await?;
    Ok(ApiResponse::ok("Doctors retrieved successfully", doctors))
}

#[axum::debug_handler]
pub async fn list_nurses(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StaffListQuery>,
) -> Result<ApiResponse<Page<StaffView>>, AppError> {
    let nurses = StaffService::new(&state)
        .list_staff(query, Some(StaffType::Nurse))
        .await?;
    Ok(ApiResponse::ok("Nurses retrieved successfully", nurses))
}

#[axum::debug_handler]
pub async fn list_technicians(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<StaffListQuery>,
) -> Result<ApiResponse<Page<StaffView>>, AppError> {
    let technicians = StaffService::new(&state)
        .list_staff(query, Some(StaffType::Technician))
        .await?;
    Ok(ApiResponse::ok("Technicians retrieved successfully", technicians))
}

#[axum::debug_handler]
pub async fn get_staff(
    State(state): State<AppState>,
    Path(staff_id): Path<i64>,
) -> Result<ApiResponse<StaffView>, AppError> {
    let staff = StaffService::new(&state).get_staff(staff_id).await?;
    Ok(ApiResponse::ok("Staff retrieved successfully", staff))
}

#[axum::debug_handler]
pub async fn create_staff(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<CreateStaffRequest>,
) -> Result<ApiResponse<StaffView>, AppError> {
    user.require(Capability::ManageStaff)?;

    let staff = StaffService::new(&state).create_staff(request).await?;
    Ok(ApiResponse::created("Staff created successfully", staff))
}

#[axum::debug_handler]
pub async fn update_staff(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(staff_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateStaffRequest>,
) -> Result<ApiResponse<StaffView>, AppError> {
    user.require(Capability::ManageStaff)?;

    let staff = StaffService::new(&state).update_staff(staff_id, request).await?;
    Ok(ApiResponse::ok("Staff updated successfully", staff))
}

#[axum::debug_handler]
pub async fn delete_staff(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(staff_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    user.require(Capability::ManageStaff)?;

    StaffService::new(&state).delete_staff(staff_id).await?;
    Ok(ApiResponse::message("Staff deleted successfully"))
}

#[axum::debug_handler]
pub async fn get_staff_schedule(
    State(state): State<AppState>,
    Path(staff_id): Path<i64>,
    ApiQuery(query): ApiQuery<ScheduleQuery>,
) -> Result<ApiResponse<Vec<ScheduleEntry>>, AppError> {
    let schedule = StaffService::new(&state).schedule(staff_id, query).await?;
    Ok(ApiResponse::ok("Schedule retrieved successfully", schedule))
}

#[axum::debug_handler]
pub async fn list_departments(
    State(state): State<AppState>,
) -> Result<ApiResponse<Vec<DepartmentDetails>>, AppError> {
    let departments = StaffService::new(&state).departments().await?;
    Ok(ApiResponse::ok("Departments retrieved successfully", departments))
}
