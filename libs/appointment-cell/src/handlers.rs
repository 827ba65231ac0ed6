// libs/appointment-cell/src/handlers.rs
use axum::extract::{Extension, Path, State};

use shared_models::appointment::{Appointment, AppointmentDetails};
use shared_models::auth::{AuthUser, Capability};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Page};
use shared_utils::validation::{ApiQuery, ValidatedJson};
use shared_utils::AppState;

use crate::models::{
    AppointmentListQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};
use crate::services::BookingService;

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<AppointmentListQuery>,
) -> Result<ApiResponse<Page<AppointmentDetails>>, AppError> {
    let appointments = BookingService::new(&state).list_appointments(query, None).await?;
    Ok(ApiResponse::ok("Appointments retrieved successfully", appointments))
}

#[axum::debug_handler]
pub async fn list_appointments_by_status(
    State(state): State<AppState>,
    Path(status): Path<String>,
    ApiQuery(query): ApiQuery<AppointmentListQuery>,
) -> Result<ApiResponse<Page<AppointmentDetails>>, AppError> {
    let appointments = BookingService::new(&state).list_by_status(&status, query).await?;
    Ok(ApiResponse::ok("Appointments retrieved successfully", appointments))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
) -> Result<ApiResponse<AppointmentDetails>, AppError> {
    let appointment = BookingService::new(&state).get_appointment(appointment_id).await?;
    Ok(ApiResponse::ok("Appointment retrieved successfully", appointment))
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<CreateAppointmentRequest>,
) -> Result<ApiResponse<Appointment>, AppError> {
    user.require(Capability::ManageAppointments)?;

    let appointment = BookingService::new(&state).book(request, user.id).await?;
    Ok(ApiResponse::created("Appointment created successfully", appointment))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdateAppointmentRequest>,
) -> Result<ApiResponse<Appointment>, AppError> {
    user.require(Capability::ManageAppointments)?;

    let appointment = BookingService::new(&state).update(appointment_id, request).await?;
    Ok(ApiResponse::ok("Appointment updated successfully", appointment))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(appointment_id): Path<i64>,
    request: Option<ValidatedJson<CancelAppointmentRequest>>,
) -> Result<ApiResponse<Appointment>, AppError> {
    let request = request.map(|ValidatedJson(request)| request).unwrap_or_default();

    let appointment = BookingService::new(&state).cancel(appointment_id, request).await?;
    Ok(ApiResponse::ok("Appointment cancelled successfully", appointment))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(appointment_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    user.require(Capability::DeleteAppointments)?;

    BookingService::new(&state).delete(appointment_id).await?;
    Ok(ApiResponse::message("Appointment deleted successfully"))
}
