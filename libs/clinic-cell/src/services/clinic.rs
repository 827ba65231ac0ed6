use std::sync::Arc;

use tracing::{debug, info, instrument};

use shared_database::store::CLINIC_NOT_FOUND;
use shared_database::Store;
use shared_models::appointment::AppointmentDetails;
use shared_models::directory::ClinicDetails;
use shared_models::error::AppError;
use shared_models::response::Page;
use shared_utils::AppState;

use crate::models::{ClinicListQuery, ClinicScheduleQuery, CreateClinicRequest, UpdateClinicRequest};

pub struct ClinicService {
    store: Arc<dyn Store>,
}

impl ClinicService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn list_clinics(
        &self,
        query: ClinicListQuery,
    ) -> Result<Page<ClinicDetails>, AppError> {
        let page = query.page();
        let (clinics, total) = self.store.list_clinics(query.filter(), page).await?;
        Ok(Page::new(clinics, total, page))
    }

    pub async fn get_clinic(&self, id: i64) -> Result<ClinicDetails, AppError> {
        self.store
            .find_clinic(id)
            .await?
            .ok_or_else(|| AppError::NotFound(CLINIC_NOT_FOUND.to_string()))
    }

    #[instrument(skip(self, request), fields(room = %request.room_number))]
    pub async fn create_clinic(
        &self,
        request: CreateClinicRequest,
    ) -> Result<ClinicDetails, AppError> {
        let clinic = self.store.create_clinic(request.into()).await?;
        info!("Created clinic room {}", clinic.clinic.id);
        Ok(clinic)
    }

    #[instrument(skip(self, request))]
    pub async fn update_clinic(
        &self,
        id: i64,
        request: UpdateClinicRequest,
    ) -> Result<ClinicDetails, AppError> {
        let clinic = self.store.update_clinic(id, request.into()).await?;
        debug!("Updated clinic room {}", id);
        Ok(clinic)
    }

    #[instrument(skip(self))]
    pub async fn delete_clinic(&self, id: i64) -> Result<(), AppError> {
        self.store.delete_clinic(id).await?;
        info!("Deleted clinic room {}", id);
        Ok(())
    }

    /// Non-cancelled appointments booked into the room.
    pub async fn schedule(
        &self,
        id: i64,
        query: ClinicScheduleQuery,
    ) -> Result<Vec<AppointmentDetails>, AppError> {
        if self.store.find_clinic(id).await?.is_none() {
            return Err(AppError::NotFound(CLINIC_NOT_FOUND.to_string()));
        }

        Ok(self.store.clinic_schedule(id, query.date).await?)
    }
}
