// libs/appointment-cell/src/services/booking.rs
use std::str::FromStr;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use shared_database::Store;
use shared_models::appointment::{Appointment, AppointmentDetails, AppointmentStatus};
use shared_models::response::Page;
use shared_utils::AppState;

use crate::models::{
    AppointmentError, AppointmentListQuery, CancelAppointmentRequest, CreateAppointmentRequest,
    UpdateAppointmentRequest,
};

/// Books, reschedules and cancels appointments.
///
/// Reference checks, the slot rule and code generation run inside the store's
/// write, so two requests for the same slot cannot both succeed.
pub struct BookingService {
    store: Arc<dyn Store>,
}

impl BookingService {
    pub fn new(state: &AppState) -> Self {
        Self {
            store: state.store.clone(),
        }
    }

    pub async fn list_appointments(
        &self,
        query: AppointmentListQuery,
        forced_status: Option<AppointmentStatus>,
    ) -> Result<Page<AppointmentDetails>, AppointmentError> {
        let page = query.page();
        let (appointments, total) = self
            .store
            .list_appointments(query.filter(forced_status), page)
            .await?;
        debug!("Listed {} of {} appointments", appointments.len(), total);
        Ok(Page::new(appointments, total, page))
    }

    pub async fn list_by_status(
        &self,
        status: &str,
        query: AppointmentListQuery,
    ) -> Result<Page<AppointmentDetails>, AppointmentError> {
        let status = AppointmentStatus::from_str(status)
            .map_err(|_| AppointmentError::UnknownStatus(status.to_string()))?;
        self.list_appointments(query, Some(status)).await
    }

    pub async fn get_appointment(&self, id: i64) -> Result<AppointmentDetails, AppointmentError> {
        self.store
            .find_appointment(id)
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    #[instrument(skip(self, request), fields(patient_id = request.patient_id))]
    pub async fn book(
        &self,
        request: CreateAppointmentRequest,
        created_by: i64,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = request.into_new(created_by);
        let slot = appointment.slot();

        match self.store.create_appointment(appointment).await {
            Ok(created) => {
                info!(
                    "Booked appointment {} on {} at {}",
                    created.appointment_code, created.appointment_date, created.appointment_time
                );
                Ok(created)
            }
            Err(err) => {
                let err = AppointmentError::from(err);
                if matches!(err, AppointmentError::SlotTaken) {
                    warn!(
                        "Slot {} {} taken for doctor {:?} / room {:?}",
                        slot.date, slot.time, slot.doctor_id, slot.clinic_id
                    );
                }
                Err(err)
            }
        }
    }

    #[instrument(skip(self, request))]
    pub async fn update(
        &self,
        id: i64,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let updated = self.store.update_appointment(id, request.into()).await?;
        debug!("Updated appointment {} to status {}", id, updated.status);
        Ok(updated)
    }

    /// Sets the status to cancelled, which releases the slot.
    #[instrument(skip(self, request))]
    pub async fn cancel(
        &self,
        id: i64,
        request: CancelAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let cancelled = self.store.cancel_appointment(id, request.notes).await?;
        info!("Cancelled appointment {}", cancelled.appointment_code);
        Ok(cancelled)
    }

    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), AppointmentError> {
        self.store.delete_appointment(id).await?;
        info!("Deleted appointment {}", id);
        Ok(())
    }
}
