use chrono::NaiveDate;
use serde::Deserialize;
use validator::Validate;

use shared_database::store::{ClinicChanges, ClinicFilter, NewClinic};
use shared_models::response::PageRequest;
use shared_utils::validation::validate_not_blank;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateClinicRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub room_number: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub room_name: String,
    pub department_id: Option<i64>,
    pub floor_number: Option<i32>,
    #[validate(range(min = 0, message = "Capacity must not be negative"))]
    pub capacity: Option<i32>,
    pub equipment: Option<String>,
    pub is_available: Option<bool>,
}

impl From<CreateClinicRequest> for NewClinic {
    fn from(request: CreateClinicRequest) -> Self {
        NewClinic {
            room_number: request.room_number.trim().to_string(),
            room_name: request.room_name.trim().to_string(),
            department_id: request.department_id,
            floor_number: request.floor_number,
            capacity: request.capacity,
            equipment: request.equipment,
            is_available: request.is_available.unwrap_or(true),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateClinicRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub room_number: Option<String>,
    #[validate(custom(function = "validate_not_blank"))]
    pub room_name: Option<String>,
    pub department_id: Option<i64>,
    pub floor_number: Option<i32>,
    #[validate(range(min = 0, message = "Capacity must not be negative"))]
    pub capacity: Option<i32>,
    pub equipment: Option<String>,
    pub is_available: Option<bool>,
}

impl From<UpdateClinicRequest> for ClinicChanges {
    fn from(request: UpdateClinicRequest) -> Self {
        ClinicChanges {
            room_number: request.room_number.map(|room| room.trim().to_string()),
            room_name: request.room_name.map(|name| name.trim().to_string()),
            department_id: request.department_id,
            floor_number: request.floor_number,
            capacity: request.capacity,
            equipment: request.equipment,
            is_available: request.is_available,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ClinicListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub is_available: Option<bool>,
    pub floor_number: Option<i32>,
}

impl ClinicListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    pub fn filter(&self) -> ClinicFilter {
        ClinicFilter {
            search: self.search.clone(),
            is_available: self.is_available,
            floor_number: self.floor_number,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ClinicScheduleQuery {
    pub date: Option<NaiveDate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rooms_are_available_unless_stated() {
        let request: CreateClinicRequest = serde_json::from_value(serde_json::json!({
            "room_number": " P101 ",
            "room_name": "General consultation",
        }))
        .unwrap();

        let clinic = NewClinic::from(request);
        assert!(clinic.is_available);
        assert_eq!(clinic.room_number, "P101");
    }

    #[test]
    fn negative_capacity_is_rejected() {
        let request = UpdateClinicRequest {
            capacity: Some(-1),
            ..Default::default()
        };
        assert!(request.validate().is_err());
    }
}
