use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use shared_models::appointment::{Appointment, AppointmentDetails, AppointmentStatus, Slot};
use shared_models::auth::{Role, User};
use shared_models::billing::{
    DateRange, InsuranceClaim, Invoice, InvoiceDetails, PaymentStatus, RevenueStats,
};
use shared_models::directory::{
    Clinic, ClinicDetails, DepartmentDetails, Gender, MedicalRecordDetails, Patient,
    ScheduleEntry, Staff, StaffDetails, StaffStatus, StaffType,
};
use shared_models::error::AppError;
use shared_models::response::PageRequest;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => AppError::NotFound(msg),
            StoreError::Conflict(msg) => AppError::Conflict(msg),
            StoreError::Database(msg) => AppError::Internal(msg),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

// Messages shared by both backends so callers see the same text.
pub const PATIENT_NOT_FOUND: &str = "Patient not found";
pub const DOCTOR_NOT_FOUND: &str = "Doctor not found";
pub const STAFF_NOT_FOUND: &str = "Staff not found";
pub const CLINIC_NOT_FOUND: &str = "Clinic not found";
pub const APPOINTMENT_NOT_FOUND: &str = "Appointment not found";
pub const INVOICE_NOT_FOUND: &str = "Invoice not found";
pub const USER_NOT_FOUND: &str = "User not found";
pub const DEPARTMENT_NOT_FOUND: &str = "Department not found";
pub const SLOT_TAKEN: &str = "Doctor or clinic room is already booked at this time";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

// ==============================================================================
// USERS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: Role,
    pub is_active: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileChanges {
    pub username: Option<String>,
    pub email: Option<String>,
}

// ==============================================================================
// PATIENTS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewPatient {
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
}

/// Partial update: `None` leaves the stored value unchanged.
#[derive(Debug, Clone, Default)]
pub struct PatientChanges {
    pub full_name: Option<String>,
    pub phone: Option<String>,
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
}

impl PatientChanges {
    pub fn apply_to(&self, patient: &mut Patient) {
        overwrite(&mut patient.full_name, &self.full_name);
        overwrite(&mut patient.phone, &self.phone);
        overwrite_opt(&mut patient.email, &self.email);
        overwrite_opt(&mut patient.date_of_birth, &self.date_of_birth);
        overwrite_opt(&mut patient.gender, &self.gender);
        overwrite_opt(&mut patient.address, &self.address);
        overwrite_opt(&mut patient.citizen_id, &self.citizen_id);
        overwrite_opt(&mut patient.insurance_number, &self.insurance_number);
        overwrite_opt(&mut patient.emergency_contact, &self.emergency_contact);
        overwrite_opt(&mut patient.emergency_phone, &self.emergency_phone);
        overwrite_opt(&mut patient.blood_type, &self.blood_type);
        overwrite_opt(&mut patient.allergies, &self.allergies);
        overwrite_opt(&mut patient.medical_history, &self.medical_history);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PatientSort {
    FullName,
    DateOfBirth,
    #[default]
    CreatedAt,
    PatientCode,
}

impl PatientSort {
    pub fn column(&self) -> &'static str {
        match self {
            PatientSort::FullName => "full_name",
            PatientSort::DateOfBirth => "date_of_birth",
            PatientSort::CreatedAt => "created_at",
            PatientSort::PatientCode => "patient_code",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub search: Option<String>,
    pub sort_by: PatientSort,
    pub order: SortOrder,
}

// ==============================================================================
// STAFF
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewStaff {
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
}

#[derive(Debug, Clone, Default)]
pub struct StaffChanges {
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<Gender>,
    pub citizen_id: Option<String>,
    pub specialization: Option<String>,
    pub license_number: Option<String>,
    pub department_id: Option<i64>,
    pub salary: Option<Decimal>,
    pub status: Option<StaffStatus>,
}

impl StaffChanges {
    pub fn apply_to(&self, staff: &mut Staff) {
        overwrite(&mut staff.full_name, &self.full_name);
        overwrite(&mut staff.phone, &self.phone);
        overwrite_opt(&mut staff.address, &self.address);
        overwrite_opt(&mut staff.date_of_birth, &self.date_of_birth);
        overwrite_opt(&mut staff.gender, &self.gender);
        overwrite_opt(&mut staff.citizen_id, &self.citizen_id);
        overwrite_opt(&mut staff.specialization, &self.specialization);
        overwrite_opt(&mut staff.license_number, &self.license_number);
        overwrite_opt(&mut staff.department_id, &self.department_id);
        overwrite_opt(&mut staff.salary, &self.salary);
        overwrite(&mut staff.status, &self.status);
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaffFilter {
    pub search: Option<String>,
    pub staff_type: Option<StaffType>,
    pub status: Option<StaffStatus>,
    pub department_id: Option<i64>,
}

// ==============================================================================
// CLINICS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewClinic {
    pub room_number: String,
    pub room_name: String,
    pub department_id: Option<i64>,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub equipment: Option<String>,
    pub is_available: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ClinicChanges {
    pub room_number: Option<String>,
    pub room_name: Option<String>,
    pub department_id: Option<i64>,
    pub floor_number: Option<i32>,
    pub capacity: Option<i32>,
    pub equipment: Option<String>,
    pub is_available: Option<bool>,
}

impl ClinicChanges {
    pub fn apply_to(&self, clinic: &mut Clinic) {
        overwrite(&mut clinic.room_number, &self.room_number);
        overwrite(&mut clinic.room_name, &self.room_name);
        overwrite_opt(&mut clinic.department_id, &self.department_id);
        overwrite_opt(&mut clinic.floor_number, &self.floor_number);
        overwrite_opt(&mut clinic.capacity, &self.capacity);
        overwrite_opt(&mut clinic.equipment, &self.equipment);
        overwrite(&mut clinic.is_available, &self.is_available);
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClinicFilter {
    pub search: Option<String>,
    pub is_available: Option<bool>,
    pub floor_number: Option<i32>,
}

// ==============================================================================
// APPOINTMENTS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub doctor_id: Option<i64>,
    pub clinic_id: Option<i64>,
    pub appointment_date: NaiveDate,
    pub appointment_time: NaiveTime,
    pub status: AppointmentStatus,
    pub reason: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

impl NewAppointment {
    pub fn slot(&self) -> Slot {
        Slot {
            date: self.appointment_date,
            time: self.appointment_time,
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentChanges {
    pub patient_id: Option<i64>,
    /// `Some(None)` unassigns the doctor.
    pub doctor_id: Option<Option<i64>>,
    /// `Some(None)` unassigns the room.
    pub clinic_id: Option<Option<i64>>,
    pub appointment_date: Option<NaiveDate>,
    pub appointment_time: Option<NaiveTime>,
    pub status: Option<AppointmentStatus>,
    pub reason: Option<String>,
    pub symptoms: Option<String>,
    pub notes: Option<String>,
}

impl AppointmentChanges {
    /// The stored appointment with these changes laid over it.
    pub fn merged(&self, current: &Appointment, now: DateTime<Utc>) -> Appointment {
        let mut next = current.clone();
        overwrite(&mut next.patient_id, &self.patient_id);
        overwrite(&mut next.doctor_id, &self.doctor_id);
        overwrite(&mut next.clinic_id, &self.clinic_id);
        overwrite(&mut next.appointment_date, &self.appointment_date);
        overwrite(&mut next.appointment_time, &self.appointment_time);
        overwrite(&mut next.status, &self.status);
        overwrite_opt(&mut next.reason, &self.reason);
        overwrite_opt(&mut next.symptoms, &self.symptoms);
        overwrite_opt(&mut next.notes, &self.notes);
        next.updated_at = now;
        next
    }
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub status: Option<AppointmentStatus>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub search: Option<String>,
}

// ==============================================================================
// INVOICES
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewInvoice {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub total_amount: Decimal,
    pub discount: Decimal,
    pub services: Vec<serde_json::Value>,
    pub notes: Option<String>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct PaymentUpdate {
    pub paid_amount: Option<Decimal>,
    pub payment_method: Option<String>,
    pub payment_status: Option<PaymentStatus>,
}

impl PaymentUpdate {
    /// Applies the payment, deriving the status unless one was given.
    pub fn apply_to(&self, invoice: &mut Invoice) {
        let paid_amount = self.paid_amount.unwrap_or(invoice.paid_amount);
        invoice.payment_status =
            PaymentStatus::resolve(self.payment_status, paid_amount, invoice.payable());
        invoice.paid_amount = paid_amount;
        overwrite_opt(&mut invoice.payment_method, &self.payment_method);
    }
}

#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub payment_status: Option<PaymentStatus>,
    pub patient_id: Option<i64>,
    pub range: DateRange,
}

fn overwrite<T: Clone>(slot: &mut T, value: &Option<T>) {
    if let Some(value) = value {
        *slot = value.clone();
    }
}

fn overwrite_opt<T: Clone>(slot: &mut Option<T>, value: &Option<T>) {
    if value.is_some() {
        *slot = value.clone();
    }
}

/// Storage port for every table the API touches.
///
/// Each mutating method is atomic: uniqueness checks, reference checks and the
/// appointment slot rule are evaluated in the same unit of work as the write.
#[async_trait]
pub trait Store: Send + Sync {
    async fn ping(&self) -> StoreResult<()>;

    async fn close(&self) {}

    // users
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;
    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;
    async fn update_user_profile(&self, id: i64, changes: ProfileChanges) -> StoreResult<User>;
    async fn update_password(&self, id: i64, password_hash: String) -> StoreResult<()>;

    // patients
    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient>;
    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>>;
    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Patient>, i64)>;
    async fn update_patient(&self, id: i64, changes: PatientChanges) -> StoreResult<Patient>;
    async fn delete_patient(&self, id: i64) -> StoreResult<()>;
    async fn medical_history(&self, patient_id: i64) -> StoreResult<Vec<MedicalRecordDetails>>;

    // staff
    async fn create_staff(&self, user: NewUser, staff: NewStaff) -> StoreResult<StaffDetails>;
    async fn find_staff(&self, id: i64) -> StoreResult<Option<StaffDetails>>;
    async fn find_staff_by_user(&self, user_id: i64) -> StoreResult<Option<StaffDetails>>;
    async fn list_staff(
        &self,
        filter: StaffFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<StaffDetails>, i64)>;
    async fn update_staff(&self, id: i64, changes: StaffChanges) -> StoreResult<StaffDetails>;
    async fn delete_staff(&self, id: i64) -> StoreResult<()>;
    async fn staff_schedule(&self, staff_id: i64, range: DateRange)
        -> StoreResult<Vec<ScheduleEntry>>;
    async fn list_departments(&self) -> StoreResult<Vec<DepartmentDetails>>;

    // clinics
    async fn create_clinic(&self, clinic: NewClinic) -> StoreResult<ClinicDetails>;
    async fn find_clinic(&self, id: i64) -> StoreResult<Option<ClinicDetails>>;
    async fn list_clinics(
        &self,
        filter: ClinicFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<ClinicDetails>, i64)>;
    async fn update_clinic(&self, id: i64, changes: ClinicChanges) -> StoreResult<ClinicDetails>;
    async fn delete_clinic(&self, id: i64) -> StoreResult<()>;
    async fn clinic_schedule(
        &self,
        clinic_id: i64,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<AppointmentDetails>>;

    // appointments
    async fn create_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment>;
    async fn find_appointment(&self, id: i64) -> StoreResult<Option<AppointmentDetails>>;
    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AppointmentDetails>, i64)>;
    async fn update_appointment(
        &self,
        id: i64,
        changes: AppointmentChanges,
    ) -> StoreResult<Appointment>;
    async fn cancel_appointment(&self, id: i64, notes: Option<String>) -> StoreResult<Appointment>;
    async fn delete_appointment(&self, id: i64) -> StoreResult<()>;

    // invoices
    async fn create_invoice(&self, invoice: NewInvoice) -> StoreResult<Invoice>;
    async fn find_invoice(&self, id: i64) -> StoreResult<Option<InvoiceDetails>>;
    async fn list_invoices(
        &self,
        filter: InvoiceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<InvoiceDetails>, i64)>;
    async fn record_payment(&self, id: i64, payment: PaymentUpdate) -> StoreResult<Invoice>;
    async fn revenue_stats(&self, range: DateRange) -> StoreResult<RevenueStats>;
    async fn list_insurance_claims(
        &self,
        status: Option<String>,
        page: PageRequest,
    ) -> StoreResult<(Vec<InsuranceClaim>, i64)>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice(total: i64, discount: i64, paid: i64) -> Invoice {
        Invoice {
            id: 1,
            invoice_code: "INV000001".to_string(),
            appointment_id: None,
            patient_id: 1,
            total_amount: Decimal::from(total),
            discount: Decimal::from(discount),
            paid_amount: Decimal::from(paid),
            payment_status: PaymentStatus::Unpaid,
            payment_method: None,
            services: Vec::new(),
            notes: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn payment_without_amount_keeps_existing_paid() {
        let mut inv = invoice(500, 50, 450);
        PaymentUpdate::default().apply_to(&mut inv);
        assert_eq!(inv.paid_amount, Decimal::from(450));
        assert_eq!(inv.payment_status, PaymentStatus::Paid);
    }

    #[test]
    fn payment_derives_partial_and_records_method() {
        let mut inv = invoice(500, 50, 0);
        PaymentUpdate {
            paid_amount: Some(Decimal::from(200)),
            payment_method: Some("cash".to_string()),
            payment_status: None,
        }
        .apply_to(&mut inv);
        assert_eq!(inv.payment_status, PaymentStatus::Partial);
        assert_eq!(inv.payment_method.as_deref(), Some("cash"));
    }

    #[test]
    fn explicit_payment_status_wins() {
        let mut inv = invoice(500, 0, 0);
        PaymentUpdate {
            paid_amount: Some(Decimal::from(500)),
            payment_method: None,
            payment_status: Some(PaymentStatus::Refunded),
        }
        .apply_to(&mut inv);
        assert_eq!(inv.payment_status, PaymentStatus::Refunded);
    }

    #[test]
    fn store_errors_map_to_taxonomy() {
        assert!(matches!(
            AppError::from(StoreError::Conflict(SLOT_TAKEN.to_string())),
            AppError::Conflict(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::NotFound(PATIENT_NOT_FOUND.to_string())),
            AppError::NotFound(_)
        ));
        assert!(matches!(
            AppError::from(StoreError::Database("boom".to_string())),
            AppError::Internal(_)
        ));
    }
}
