use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use validator::Validate;

use shared_database::store::{NewStaff, NewUser, StaffChanges, StaffFilter};
use shared_models::billing::DateRange;
use shared_models::directory::{Gender, StaffStatus, StaffType};
use shared_models::response::PageRequest;
use shared_utils::validation::{validate_non_negative, validate_not_blank, validate_phone};

/// Account and staff record created together.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateStaffRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub username: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: String,
    #[validate(custom(function = "validate_phone"))]
    pub phone: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizen_id: Option<String>,
    pub staff_type: StaffType,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub department_id: Option<i64>,
    #[validate(custom(function = "validate_non_negative"))]
    pub salary: Option<Decimal>,
    pub hire_date: Option<NaiveDate>,
    pub status: Option<StaffStatus>,
}

impl CreateStaffRequest {
    /// Splits the request into the account (password already hashed) and the staff row.
    pub fn into_parts(self, password_hash: String) -> (NewUser, NewStaff) {
        let user = NewUser {
            username: self.username.trim().to_string(),
            email: self.email,
            password_hash,
            role: self.staff_type.role(),
            is_active: true,
        };
        let staff = NewStaff {
            full_name: self.full_name.trim().to_string(),
            phone: self.phone,
            address: self.address,
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            citizen_id: self.citizen_id,
            staff_type: self.staff_type,
            specialization: self.specialization,
            license_number: self.license_number,
            department_id: self.department_id,
            salary: self.salary,
            hire_date: self.hire_date,
            status: self.status.unwrap_or_default(),
        };
        (user, staff)
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateStaffRequest {
    #[validate(custom(function = "validate_not_blank"))]
    pub full_name: Option<String>,
    #[validate(custom(function = "validate_phone"))]
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizen_id: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub department_id: Option<i64>,
    #[validate(custom(function = "validate_non_negative"))]
    pub salary: Option<Decimal>,
    pub status: Option<StaffStatus>,
}

impl From<UpdateStaffRequest> for StaffChanges {
    fn from(request: UpdateStaffRequest) -> Self {
        StaffChanges {
            full_name: request.full_name.map(|name| name.trim().to_string()),
            phone: request.phone,
            address: request.address,
            date_of_birth: request.date_of_birth,
            gender: request.gender,
            citizen_id: request.citizen_id,
            specialization: request.specialization,
            license_number: request.license_number,
            department_id: request.department_id,
            salary: request.salary,
            status: request.status,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct StaffListQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub search: Option<String>,
    pub staff_type: Option<StaffType>,
    pub status: Option<StaffStatus>,
    pub department_id: Option<i64>,
}

impl StaffListQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest::new(self.page, self.limit)
    }

    /// `forced_type` overrides any `staff_type` given in the query string.
    pub fn filter(&self, forced_type: Option<StaffType>) -> StaffFilter {
        StaffFilter {
            search: self.search.clone(),
            staff_type: forced_type.or(self.staff_type),
            status: self.status,
            department_id: self.department_id,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ScheduleQuery {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl ScheduleQuery {
    pub fn range(&self) -> DateRange {
        DateRange::new(self.start_date, self.end_date)
    }
}
