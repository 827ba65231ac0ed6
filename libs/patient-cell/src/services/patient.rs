use std::sync::Arc;

use tracing::{debug, info, instrument};

use shared_database::store::PATIENT_NOT_FOUND;
use shared_database::Store;
use shared_models::directory::{MedicalRecordDetails, PatientView};
use shared_models::error::AppError;
use shared_models::response::Page;
use shared_utils::AppState;

use crate::models::{CreatePatientRequest, PatientListQuery, UpdatePatientRequest};

pub struct PatientService {
    store: Arc<dyn Store>,
}

impl PatientService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn list_patients(
        &self,
        query: PatientListQuery,
    ) -> Result<Page<PatientView>, AppError> {
        let page = query.page();
        let (patients, total) = self.store.list_patients(query.filter(), page).await?;
        debug!("Listed {} of {} patients", patients.len(), total);
        Ok(Page::new(patients, total, page).map(PatientView::from))
    }

    pub async fn get_patient(&self, id: i64) -> Result<PatientView, AppError> {
        self.store
            .find_patient(id)
            .await?
            .map(PatientView::from)
            .ok_or_else(|| AppError::NotFound(PATIENT_NOT_FOUND.to_string()))
    }

    #[instrument(skip(self, request))]
    pub async fn create_patient(
        &self,
        request: CreatePatientRequest,
    ) -> Result<PatientView, AppError> {
        let patient = self.store.create_patient(request.into()).await?;
        info!("Created patient {} ({})", patient.id, patient.patient_code);
        Ok(patient.into())
    }

    #[instrument(skip(self, request))]
    pub async fn update_patient(
        &self,
        id: i64,
        request: UpdatePatientRequest,
    ) -> Result<PatientView, AppError> {
        let patient = self.store.update_patient(id, request.into()).await?;
        debug!("Updated patient {}", patient.id);
        Ok(patient.into())
    }

    #[instrument(skip(self))]
    pub async fn delete_patient(&self, id: i64) -> Result<(), AppError> {
        self.store.delete_patient(id).await?;
        info!("Deleted patient {}", id);
        Ok(())
    }

    pub async fn medical_history(&self, id: i64) -> Result<Vec<MedicalRecordDetails>, AppError> {
        if self.store.find_patient(id).await?.is_none() {
            return Err(AppError::NotFound(PATIENT_NOT_FOUND.to_string()));
        }

        Ok(self.store.medical_history(id).await?)
    }
}
