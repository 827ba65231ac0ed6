use axum::extract::{Extension, Path, State};

use shared_models::auth::{AuthUser, Capability};
use shared_models::directory::{MedicalRecordDetails, PatientView};
use shared_models::error::AppError;
use shared_models::response::{ApiResponse, Page};
use shared_utils::validation::{ApiQuery, ValidatedJson};
use shared_utils::AppState;

use crate::models::{CreatePatientRequest, PatientListQuery, UpdatePatientRequest};
use crate::services::PatientService;

#[axum::debug_handler]
pub async fn list_patients(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PatientListQuery>,
) -> Result<ApiResponse<Page<PatientView>>, AppError> {
    let patients = PatientService::new(&state).list_patients(query).await?;
    Ok(ApiResponse::ok("Patients retrieved successfully", patients))
}

#[axum::debug_handler]
pub async fn get_patient(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<ApiResponse<PatientView>, AppError> {
    let patient = PatientService::new(&state).get_patient(patient_id).await?;
    Ok(ApiResponse::ok("Patient retrieved successfully", patient))
}

#[axum::debug_handler]
pub async fn create_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ValidatedJson(request): ValidatedJson<CreatePatientRequest>,
) -> Result<ApiResponse<PatientView>, AppError> {
    user.require(Capability::ManagePatients)?;

    let patient = PatientService::new(&state).create_patient(request).await?;
    Ok(ApiResponse::created("Patient created successfully", patient))
}

#[axum::debug_handler]
pub async fn update_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
    ValidatedJson(request): ValidatedJson<UpdatePatientRequest>,
) -> Result<ApiResponse<PatientView>, AppError> {
    user.require(Capability::ManagePatients)?;

    let patient = PatientService::new(&state).update_patient(patient_id, request).await?;
    Ok(ApiResponse::ok("Patient updated successfully", patient))
}

#[axum::debug_handler]
pub async fn delete_patient(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(patient_id): Path<i64>,
) -> Result<ApiResponse<()>, AppError> {
    user.require(Capability::DeletePatients)?;

    PatientService::new(&state).delete_patient(patient_id).await?;
    Ok(ApiResponse::message("Patient deleted successfully"))
}

#[axum::debug_handler]
pub async fn get_medical_history(
    State(state): State<AppState>,
    Path(patient_id): Path<i64>,
) -> Result<ApiResponse<Vec<MedicalRecordDetails>>, AppError> {
    let records = PatientService::new(&state).medical_history(patient_id).await?;
    Ok(ApiResponse::ok("Medical history retrieved successfully", records))
}
