use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use shared_database::store::{
    NewPatient, PatientChanges, PatientFilter, PatientSort, SortOrder,
};
use shared_models::directory::Gender;
use shared_models::response::PageRequest;
use shared_utils::validation::{validate_not_blank, validate_phone};

#[derive(Debug, Deserialize, Validate)]
pub struct CreatePatientRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub citizen_id: Option<String>,
    pub insurance_number: Option<String>,
    pub emergency_contact: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub emergency_phone: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_history: Option<String>,
}

impl From<CreatePatientRequest> for NewPatient {
    fn from(request: CreatePatientRequest) -> Self {
        NewPatient {
            full_name: request.full_name.trim().to_string(),
            phone: request.phone,
            email: request.email,
            date_of_birth: request.date_of_birth,
            gender: request.gender,
            address: request.address,
            citizen_id: request.citizen_id,
            insurance_number: request.insurance_number,
            emergency_contact: request.emergency_contact,
            emergency_phone: request.emergency_phone,
            blood_type: request.blood_type,
            allergies: request.allergies,
            medical_history: request.medical_history,
        }
    }
}

/// Partial update; absent fields are left as stored.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdatePatientRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    #[validate(email(message = "Invalid email address"))]
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub citizen_id: Option<String>,
    pub insurance_number: Option<String>,
    pub emergency_contact: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub emergency_phone: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_history: Option<String>,
}

impl From<UpdatePatientRequest> for PatientChanges {
    fn from(request: UpdatePatientRequest) -> Self {
        PatientChanges {
            full_name: request.full_name.map(|name| name.trim().to_string()),
            phone: request.phone,
            email: request.email,
            date_of_birth: request.date_of_birth,
            gender: request.gender,
            address: request.address,
            citizen_id: request.citizen_id,
            insurance_number: request.insurance_number,
            emergency_contact: request.emergency_contact,
            emergency_phone: request.emergency_phone,
            blood_type: request.blood_type,
            allergies: request.allergies,
            medical_history: request.medical_history,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    FullName,
    DateOfBirth,
    CreatedAt,
    PatientCode,
}

impl From<SortField> for PatientSort {
    fn from(field: SortField) -> Self {
        match field {
            SortField::FullName => PatientSort::FullName,
            SortField::DateOfBirth => PatientSort::DateOfBirth,
            SortField::CreatedAt => PatientSort::CreatedAt,
            SortField::PatientCode => PatientSort::PatientCode,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Order {
    Asc,
    Desc,
}

impl From<Order> for SortOrder {
    fn from(order: Order) -> Self {
        match order {
            Order::Asc => SortOrder::Asc,
            Order::Desc => SortOrder::Desc,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct PatientListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub sort_by: Option<SortField>,
    pub order: Option<Order>,
}

impl PatientListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    pub fn filter(&self) -> PatientFilter {
        PatientFilter {
            search: self.search.clone(),
            sort_by: self.sort_by.map(Into::into).unwrap_or_default(),
            order: self.order.map(Into::into).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_query_defaults_to_newest_first() {
        let filter = PatientListQuery::default().filter();
        assert_eq!(filter.sort_by, PatientSort::CreatedAt);
        assert_eq!(filter.order, SortOrder::Desc);
    }

    #[test]
    fn create_request_checks_phone_and_name() {
        let request: CreatePatientRequest = serde_json::from_value(serde_json::json!({
            "full_name": "  ",
            "phone": "12345",
        }))
        .unwrap();

        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("full_name"));
        assert!(fields.contains_key("phone"));
    }

    #[test]
    fn update_request_ignores_absent_fields() {
        let request = UpdatePatientRequest {
            address: Some("12 Le Loi".to_string()),
            ..Default::default()
        };
        assert!(request.validate().is_ok());

        let changes = PatientChanges::from(request);
        assert!(changes.full_name.is_none());
        assert_eq!(changes.address.as_deref(), Some("12 Le Loi"));
    }
}
