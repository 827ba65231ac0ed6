// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Deserializer};
use thiserror::Error;
use validator::Validate;

use shared_database::store::{
    AppointmentChanges, AppointmentFilter, NewAppointment, StoreError, APPOINTMENT_NOT_FOUND,
    SLOT_TAKEN,
};
use shared_models::appointment::AppointmentStatus;
use shared_models::error::AppError;
use shared_models::response::PageRequest;

// ==============================================================================
// REQUESTS
// ==============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateAppointmentRequest {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub clinic_id: Option<i64>,
    pub appointment_date: NaiveDate,
    #[serde(deserialize_with = "clock_time")]
    pub appointment_time: NaiveTime,
    pub status: Option<AppointmentStatus>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

impl CreateAppointmentRequest {
    pub fn into_new(self, created_by: i64) -> NewAppointment {
        NewAppointment {
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
            status: self.status.unwrap_or_default(),
            reason: self.reason,
            symptoms: self.symptoms,
            notes: self.notes,
            created_by: Some(created_by),
        }
    }
}

/// Partial update; the conflict rule is checked against the merged slot.
/// An explicit `null` doctor or clinic clears the assignment, an absent one keeps it.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateAppointmentRequest {
    pub patient_id: Option<i64>,
    #[serde(default, deserialize_with = "present")]
    pub doctor_id: Option<Option<i64>>,
    #[serde(default, deserialize_with = "present")]
    pub clinic_id: Option<Option<i64>>,
    pub appointment_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "optional_clock_time")]
    pub appointment_time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

impl From<UpdateAppointmentRequest> for AppointmentChanges {
    fn from(request: UpdateAppointmentRequest) -> Self {
        AppointmentChanges {
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            clinic_id: request.clinic_id,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            status: request.status,
            reason: request.reason,
            symptoms: request.symptoms,
            notes: request.notes,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct CancelAppointmentRequest {
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AppointmentListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub search: Option<String>,
}

impl AppointmentListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    pub fn filter(&self, forced_status: Option<AppointmentStatus>) -> AppointmentFilter {
        AppointmentFilter {
            status: forced_status.or(self.status),
            patient_id: self.patient_id,
            doctor_id: self.doctor_id,
            date: self.date,
            search: self.search.clone(),
        }
    }
}

/// Accepts `HH:MM` as well as `HH:MM:SS`.
pub fn parse_clock_time(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .ok()
}

fn clock_time<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
where
    D: Deserializer<'de>,
{
    let value = String::deserialize(deserializer)?;
    parse_clock_time(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid appointment time: {}", value)))
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn optional_clock_time<'de, D>(deserializer: D) -> Result<Option<NaiveTime>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(value) => parse_clock_time(&value).map(Some).ok_or_else(|| {
            serde::de::Error::custom(format!("invalid appointment time: {}", value))
        }),
        None => Ok(None),
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Invalid appointment status: {0}")]
    UnknownStatus(String),

    #[error("Doctor or clinic room is already booked at this time")]
    SlotTaken,

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AppointmentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) if msg == SLOT_TAKEN => AppointmentError::SlotTaken,
            StoreError::NotFound(msg) if msg == APPOINTMENT_NOT_FOUND => AppointmentError::NotFound,
            other => AppointmentError::Store(other),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound => AppError::NotFound(APPOINTMENT_NOT_FOUND.to_string()),
            AppointmentError::UnknownStatus(status) => {
                AppError::validation("status", format!("Invalid appointment status: {}", status))
            }
            AppointmentError::SlotTaken => AppError::Conflict(SLOT_TAKEN.to_string()),
            AppointmentError::Store(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn clock_time_accepts_short_form() {
        assert_eq!(parse_clock_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_clock_time("14:05:30"), NaiveTime::from_hms_opt(14, 5, 30));
        assert_eq!(parse_clock_time("25:00"), None);
        assert_eq!(parse_clock_time("nine"), None);
    }

    #[test]
    fn create_request_defaults_to_pending() {
        let request: CreateAppointmentRequest = serde_json::from_value(serde_json::json!({
            "patient_id": 1,
            "doctor_id": 2,
            "appointment_date": "2024-07-01",
            "appointment_time": "09:30",
        }))
        .unwrap();

        let new = request.into_new(7);
        assert_eq!(new.status, AppointmentStatus::Pending);
        assert_eq!(new.created_by, Some(7));
        assert_eq!(new.appointment_time, NaiveTime::from_hms_opt(9, 30, 0).unwrap());
    }

    #[test]
    fn update_request_time_is_optional() {
        let request: UpdateAppointmentRequest =
            serde_json::from_value(serde_json::json!({ "status": "confirmed" })).unwrap();
        assert!(request.appointment_time.is_none());

        let bad = serde_json::from_value::<UpdateAppointmentRequest>(
            serde_json::json!({ "appointment_time": "later" }),
        );
        assert!(bad.is_err());
    }

    #[test]
    fn null_assignment_differs_from_absent() {
        let request: UpdateAppointmentRequest =
            serde_json::from_value(serde_json::json!({ "doctor_id": null, "clinic_id": 4 }))
                .unwrap();
        assert_eq!(request.doctor_id, Some(None));
        assert_eq!(request.clinic_id, Some(Some(4)));

        let untouched: UpdateAppointmentRequest =
            serde_json::from_value(serde_json::json!({ "reason": "Check-up" })).unwrap();
        assert_eq!(untouched.doctor_id, None);
        assert_eq!(untouched.clinic_id, None);
    }

    #[test]
    fn store_conflicts_become_slot_errors() {
        let err = AppointmentError::from(StoreError::Conflict(SLOT_TAKEN.to_string()));
        assert_matches!(err, AppointmentError::SlotTaken);

        let err = AppointmentError::from(StoreError::NotFound("Patient not found".to_string()));
        assert_matches!(AppError::from(err), AppError::NotFound(msg) if msg == "Patient not found");
    }

    #[test]
    fn forced_status_overrides_query() {
        let query = AppointmentListQuery {
            status: Some(AppointmentStatus::Pending),
            ..Default::default()
        };
        assert_eq!(
            query.filter(Some(AppointmentStatus::Completed)).status,
            Some(AppointmentStatus::Completed)
        );
    }
}
