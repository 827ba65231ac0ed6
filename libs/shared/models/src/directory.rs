use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::auth::Role;

// ==============================================================================
// SHARED ENUMS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl Gender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Gender::Male => "male",
            Gender::Female => "female",
            Gender::Other => "other",
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "male" => Ok(Gender::Male),
            "female" => Ok(Gender::Female),
            "other" => Ok(Gender::Other),
            _ => Err(format!("unknown gender: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffType {
    Doctor,
    Nurse,
    Technician,
    Receptionist,
    Accountant,
}

impl StaffType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffType::Doctor => "doctor",
            StaffType::Nurse => "nurse",
            StaffType::Technician => "technician",
            StaffType::Receptionist => "receptionist",
            StaffType::Accountant => "accountant",
        }
    }

    /// The account role granted to a newly created staff member.
    pub fn role(&self) -> Role {
        match self {
            StaffType::Doctor => Role::Doctor,
            StaffType::Nurse => Role::Nurse,
            StaffType::Technician => Role::Technician,
            StaffType::Receptionist => Role::Receptionist,
            StaffType::Accountant => Role::Accountant,
        }
    }
}

impl fmt::Display for StaffType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StaffType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "doctor" => Ok(StaffType::Doctor),
            "nurse" => Ok(StaffType::Nurse),
            "technician" => Ok(StaffType::Technician),
            "receptionist" => Ok(StaffType::Receptionist),
            "accountant" => Ok(StaffType::Accountant),
            _ => Err(format!("unknown staff type: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StaffStatus {
    #[default]
    Active,
    Inactive,
    OnLeave,
}

impl StaffStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffStatus::Active => "active",
            StaffStatus::Inactive => "inactive",
            StaffStatus::OnLeave => "on_leave",
        }
    }
}

impl FromStr for StaffStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(StaffStatus::Active),
            "inactive" => Ok(StaffStatus::Inactive),
            "on_leave" => Ok(StaffStatus::OnLeave),
            _ => Err(format!("unknown staff status: {}", s)),
        }
    }
}

/// Completed years between `date_of_birth` and `today`; `None` for a birth date in the future.
pub fn age_on(date_of_birth: NaiveDate, today: NaiveDate) -> Option<u32> {
    if date_of_birth > today {
        return None;
    }

    let mut years = today.year() - date_of_birth.year();
    if (today.month(), today.day()) < (date_of_birth.month(), date_of_birth.day()) {
        years -= 1;
    }

    u32::try_from(years).ok()
}

pub fn age_today(date_of_birth: Option<NaiveDate>) -> Option<u32> {
    date_of_birth.and_then(|dob| age_on(dob, Utc::now().date_naive()))
}

// ==============================================================================
// PATIENTS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Patient {
    pub id: i64,
    pub patient_code: String,
    pub full_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub address: Option<String>,
    pub citizen_id: Option<String>,
    pub insurance_number: Option<String>,
    pub emergency_contact: Option<String>,
    pub emergency_phone: Option<String>,
    pub blood_type: Option<String>,
    pub allergies: Option<String>,
    pub medical_history: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn age(&self) -> Option<u32> {
        age_today(self.date_of_birth)
    }
}

/// Patient payload with the derived age attached.
#[derive(Debug, Clone, Serialize)]
pub struct PatientView {
    #[serde(flatten)]
    pub patient: Patient,
    pub age: Option<u32>,
}

impl From<Patient> for PatientView {
    fn from(patient: Patient) -> Self {
        let age = patient.age();
        Self { patient, age }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicalRecordDetails {
    pub id: i64,
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub prescription: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub doctor_name: Option<String>,
}

// ==============================================================================
// STAFF
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Staff {
    pub id: i64,
    pub user_id: Option<i64>,
    pub full_name: String,
    pub phone: String,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizen_id: Option<String>,
    pub staff_type: StaffType,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub department_id: Option<i64>,
    pub salary: Option<Decimal>,
    pub hire_date: Option<NaiveDate>,
    pub status: StaffStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Staff row joined with its account and department.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaffDetails {
    #[serde(flatten)]
    pub staff: Staff,
    pub username: Option<String>,
    pub email: Option<String>,
    pub is_active: Option<bool>,
    pub department_name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaffView {
    #[serde(flatten)]
    pub details: StaffDetails,
    pub age: Option<u32>,
}

impl From<StaffDetails> for StaffView {
    fn from(details: StaffDetails) -> Self {
        let age = age_today(details.staff.date_of_birth);
        Self { details, age }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepartmentDetails {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub head_doctor_id: Option<i64>,
    pub head_doctor_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub staff_id: i64,
    pub clinic_id: Option<i64>,
    pub work_date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub shift_type: Option<String>,
    pub notes: Option<String>,
    pub room_number: Option<String>,
    pub room_name: Option<String>,
}

// ==============================================================================
// CLINIC ROOMS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clinic {
    pub id: i64,
    pub room_number: String,
    pub room_name: String,
    pub department_id: Option<i64>,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub equipment: Option<String>,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClinicDetails {
    #[serde(flatten)]
    pub clinic: Clinic,
    pub department_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn age_respects_birthday_boundary() {
        let dob = date(1990, 6, 15);
        assert_eq!(age_on(dob, date(2024, 6, 14)), Some(33));
        assert_eq!(age_on(dob, date(2024, 6, 15)), Some(34));
        assert_eq!(age_on(dob, date(2024, 12, 31)), Some(34));
    }

    #[test]
    fn age_for_leap_day_birth() {
        let dob = date(2000, 2, 29);
        assert_eq!(age_on(dob, date(2023, 2, 28)), Some(22));
        assert_eq!(age_on(dob, date(2023, 3, 1)), Some(23));
        assert_eq!(age_on(dob, date(2024, 2, 29)), Some(24));
    }

    #[test]
    fn future_birth_date_has_no_age() {
        assert_eq!(age_on(date(2030, 1, 1), date(2024, 1, 1)), None);
        assert_eq!(age_on(date(2024, 1, 1), date(2024, 1, 1)), Some(0));
    }

    #[test]
    fn staff_type_grants_matching_role() {
        assert_eq!(StaffType::Doctor.role(), Role::Doctor);
        assert_eq!(StaffType::Accountant.role(), Role::Accountant);
        assert_eq!("on_leave".parse::<StaffStatus>(), Ok(StaffStatus::OnLeave));
    }
}
