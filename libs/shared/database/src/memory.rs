use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use shared_models::appointment::{Appointment, AppointmentDetails, AppointmentStatus};
use shared_models::auth::User;
use shared_models::billing::{DateRange, InsuranceClaim, Invoice, InvoiceDetails, RevenueStats};
use shared_models::codes::{
    generate_code, next_ordinal, APPOINTMENT_CODE_PREFIX, INVOICE_CODE_PREFIX,
    PATIENT_CODE_PREFIX,
};
use shared_models::directory::{
    Clinic, ClinicDetails, DepartmentDetails, MedicalRecordDetails, Patient, ScheduleEntry,
    Staff, StaffDetails, StaffType,
};
use shared_models::response::PageRequest;

use crate::store::*;

/// In-process store used by tests and `STORAGE_BACKEND=memory`.
///
/// All tables sit behind one lock; every mutating call holds the write guard
/// from its first check to its last write.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

#[derive(Default)]
struct Tables {
    users: BTreeMap<i64, User>,
    patients: BTreeMap<i64, Patient>,
    staff: BTreeMap<i64, Staff>,
    departments: BTreeMap<i64, DepartmentDetails>,
    schedules: BTreeMap<i64, ScheduleEntry>,
    clinics: BTreeMap<i64, Clinic>,
    appointments: BTreeMap<i64, Appointment>,
    invoices: BTreeMap<i64, Invoice>,
    medical_records: BTreeMap<i64, MedicalRecordDetails>,
    insurance_claims: BTreeMap<i64, InsuranceClaim>,
    sequences: HashMap<&'static str, i64>,
    issued_codes: HashMap<&'static str, i64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn seed_department(
        &self,
        name: &str,
        description: Option<&str>,
        head_doctor_id: Option<i64>,
    ) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("departments");
        tables.departments.insert(
            id,
            DepartmentDetails {
                id,
                name: name.to_string(),
                description: description.map(str::to_string),
                head_doctor_id,
                head_doctor_name: None,
            },
        );
        id
    }

    pub async fn seed_schedule(&self, mut entry: ScheduleEntry) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("staff_schedules");
        entry.id = id;
        tables.schedules.insert(id, entry);
        id
    }

    pub async fn seed_medical_record(&self, mut record: MedicalRecordDetails) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("medical_records");
        record.id = id;
        tables.medical_records.insert(id, record);
        id
    }

    pub async fn seed_insurance_claim(&self, mut claim: InsuranceClaim) -> i64 {
        let mut tables = self.tables.write().await;
        let id = tables.next_id("insurance_claims");
        claim.id = id;
        tables.insurance_claims.insert(id, claim);
        id
    }
}

impl Tables {
    fn next_id(&mut self, table: &'static str) -> i64 {
        let id = self.sequences.entry(table).or_insert(0);
        *id += 1;
        *id
    }

    fn next_code(&mut self, prefix: &'static str, row_count: usize) -> String {
        let highest = self.issued_codes.get(prefix).copied().unwrap_or(0);
        let ordinal = next_ordinal(row_count as i64, highest);
        self.issued_codes.insert(prefix, ordinal);
        generate_code(prefix, ordinal)
    }

    fn ensure_user_unique(
        &self,
        username: &str,
        email: &str,
        except: Option<i64>,
    ) -> StoreResult<()> {
        let taken = self.users.values().any(|user| {
            Some(user.id) != except && (user.username == username || user.email == email)
        });
        if taken {
            return Err(StoreError::Conflict("Username or email already exists".to_string()));
        }
        Ok(())
    }

    fn ensure_patient_unique(
        &self,
        phone: &str,
        citizen_id: Option<&str>,
        except: Option<i64>,
    ) -> StoreResult<()> {
        for patient in self.patients.values().filter(|p| Some(p.id) != except) {
            if patient.phone == phone {
                return Err(StoreError::Conflict("Phone number already exists".to_string()));
            }
            if citizen_id.is_some() && patient.citizen_id.as_deref() == citizen_id {
                return Err(StoreError::Conflict("Citizen ID already exists".to_string()));
            }
        }
        Ok(())
    }

    fn ensure_staff_unique(
        &self,
        phone: &str,
        citizen_id: Option<&str>,
        except: Option<i64>,
    ) -> StoreResult<()> {
        for staff in self.staff.values().filter(|s| Some(s.id) != except) {
            if staff.phone == phone {
                return Err(StoreError::Conflict("Phone number already exists".to_string()));
            }
            if citizen_id.is_some() && staff.citizen_id.as_deref() == citizen_id {
                return Err(StoreError::Conflict("Citizen ID already exists".to_string()));
            }
        }
        Ok(())
    }

    fn ensure_room_unique(&self, room_number: &str, except: Option<i64>) -> StoreResult<()> {
        let taken = self
            .clinics
            .values()
            .any(|clinic| Some(clinic.id) != except && clinic.room_number == room_number);
        if taken {
            return Err(StoreError::Conflict("Room number already exists".to_string()));
        }
        Ok(())
    }

    fn ensure_department(&self, department_id: Option<i64>) -> StoreResult<()> {
        match department_id {
            Some(id) if !self.departments.contains_key(&id) => {
                Err(StoreError::NotFound(DEPARTMENT_NOT_FOUND.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn ensure_patient(&self, patient_id: i64) -> StoreResult<()> {
        if self.patients.contains_key(&patient_id) {
            Ok(())
        } else {
            Err(StoreError::NotFound(PATIENT_NOT_FOUND.to_string()))
        }
    }

    fn ensure_doctor(&self, doctor_id: Option<i64>) -> StoreResult<()> {
        match doctor_id {
            Some(id) => match self.staff.get(&id) {
                Some(staff) if staff.staff_type == StaffType::Doctor => Ok(()),
                _ => Err(StoreError::NotFound(DOCTOR_NOT_FOUND.to_string())),
            },
            None => Ok(()),
        }
    }

    fn ensure_clinic(&self, clinic_id: Option<i64>) -> StoreResult<()> {
        match clinic_id {
            Some(id) if !self.clinics.contains_key(&id) => {
                Err(StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))
            }
            _ => Ok(()),
        }
    }

    fn department_name(&self, department_id: Option<i64>) -> Option<String> {
        department_id
            .and_then(|id| self.departments.get(&id))
            .map(|department| department.name.clone())
    }

    fn staff_details(&self, staff: &Staff) -> StaffDetails {
        let user = staff.user_id.and_then(|id| self.users.get(&id));
        StaffDetails {
            staff: staff.clone(),
            username: user.map(|u| u.username.clone()),
            email: user.map(|u| u.email.clone()),
            is_active: user.map(|u| u.is_active),
            department_name: self.department_name(staff.department_id),
        }
    }

    fn clinic_details(&self, clinic: &Clinic) -> ClinicDetails {
        ClinicDetails {
            clinic: clinic.clone(),
            department_name: self.department_name(clinic.department_id),
        }
    }

    fn appointment_details(&self, appointment: &Appointment) -> AppointmentDetails {
        let patient = self.patients.get(&appointment.patient_id);
        let doctor = appointment.doctor_id.and_then(|id| self.staff.get(&id));
        let clinic = appointment.clinic_id.and_then(|id| self.clinics.get(&id));
        AppointmentDetails {
            appointment: appointment.clone(),
            patient_name: patient.map(|p| p.full_name.clone()),
            patient_phone: patient.map(|p| p.phone.clone()),
            patient_code: patient.map(|p| p.patient_code.clone()),
            doctor_name: doctor.map(|d| d.full_name.clone()),
            room_number: clinic.map(|c| c.room_number.clone()),
            room_name: clinic.map(|c| c.room_name.clone()),
        }
    }

    fn invoice_details(&self, invoice: &Invoice) -> InvoiceDetails {
        let patient = self.patients.get(&invoice.patient_id);
        InvoiceDetails {
            invoice: invoice.clone(),
            patient_name: patient.map(|p| p.full_name.clone()),
            patient_phone: patient.map(|p| p.phone.clone()),
            appointment_code: invoice
                .appointment_id
                .and_then(|id| self.appointments.get(&id))
                .map(|a| a.appointment_code.clone()),
        }
    }

    fn appointment_blocked(&self, appointment: &Appointment, exclude_id: Option<i64>) -> bool {
        let slot = appointment.slot();
        appointment.status.is_active()
            && self
                .appointments
                .values()
                .any(|existing| existing.blocks(&slot, exclude_id))
    }
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn opt_contains_ci(haystack: Option<&str>, needle: &str) -> bool {
    haystack.map_or(false, |value| contains_ci(value, needle))
}

fn search_term(search: Option<String>) -> Option<String> {
    search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
}

fn paginate<T>(rows: Vec<T>, page: PageRequest) -> (Vec<T>, i64) {
    let total = rows.len() as i64;
    let data = rows
        .into_iter()
        .skip(page.offset() as usize)
        .take(page.limit as usize)
        .collect();
    (data, total)
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    // ---------------------------------------------------------------- users

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        tables.ensure_user_unique(&user.username, &user.email, None)?;

        let now = Utc::now();
        let id = tables.next_id("users");
        let created = User {
            id,
            username: user.username,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            is_active: user.is_active,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(id, created.clone());
        debug!("Created user {} with role {}", id, created.role);
        Ok(created)
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|user| user.email == email).cloned())
    }

    async fn update_user_profile(&self, id: i64, changes: ProfileChanges) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let current = tables
            .users
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(USER_NOT_FOUND.to_string()))?;

        let username = changes.username.unwrap_or(current.username);
        let email = changes.email.unwrap_or(current.email);
        tables.ensure_user_unique(&username, &email, Some(id))?;

        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(USER_NOT_FOUND.to_string()))?;
        user.username = username;
        user.email = email;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn update_password(&self, id: i64, password_hash: String) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let user = tables
            .users
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(USER_NOT_FOUND.to_string()))?;
        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(())
    }

    // ------------------------------------------------------------- patients

    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let mut tables = self.tables.write().await;
        tables.ensure_patient_unique(&patient.phone, patient.citizen_id.as_deref(), None)?;

        let now = Utc::now();
        let row_count = tables.patients.len();
        let patient_code = tables.next_code(PATIENT_CODE_PREFIX, row_count);
        let id = tables.next_id("patients");
        let created = Patient {
            id,
            patient_code,
            full_name: patient.full_name,
            phone: patient.phone,
            email: patient.email,
            date_of_birth: patient.date_of_birth,
            gender: patient.gender,
            address: patient.address,
            citizen_id: patient.citizen_id,
            insurance_number: patient.insurance_number,
            emergency_contact: patient.emergency_contact,
            emergency_phone: patient.emergency_phone,
            blood_type: patient.blood_type,
            allergies: patient.allergies,
            medical_history: patient.medical_history,
            created_at: now,
            updated_at: now,
        };
        tables.patients.insert(id, created.clone());
        Ok(created)
    }

    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>> {
        Ok(self.tables.read().await.patients.get(&id).cloned())
    }

    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Patient>, i64)> {
        let tables = self.tables.read().await;
        let search = search_term(filter.search);

        let mut rows: Vec<Patient> = tables
            .patients
            .values()
            .filter(|p| {
                search.as_deref().map_or(true, |term| {
                    contains_ci(&p.full_name, term)
                        || contains_ci(&p.phone, term)
                        || contains_ci(&p.patient_code, term)
                        || opt_contains_ci(p.email.as_deref(), term)
                        || opt_contains_ci(p.citizen_id.as_deref(), term)
                })
            })
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ordering = match filter.sort_by {
                PatientSort::FullName => a.full_name.cmp(&b.full_name),
                PatientSort::DateOfBirth => a.date_of_birth.cmp(&b.date_of_birth),
                PatientSort::CreatedAt => a.created_at.cmp(&b.created_at),
                PatientSort::PatientCode => a.patient_code.cmp(&b.patient_code),
            }
            .then(a.id.cmp(&b.id));
            match filter.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });

        Ok(paginate(rows, page))
    }

    async fn update_patient(&self, id: i64, changes: PatientChanges) -> StoreResult<Patient> {
        let mut tables = self.tables.write().await;
        let mut patient = tables
            .patients
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(PATIENT_NOT_FOUND.to_string()))?;

        changes.apply_to(&mut patient);
        tables.ensure_patient_unique(&patient.phone, patient.citizen_id.as_deref(), Some(id))?;

        patient.updated_at = Utc::now();
        tables.patients.insert(id, patient.clone());
        Ok(patient)
    }

    async fn delete_patient(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.patients.contains_key(&id) {
            return Err(StoreError::NotFound(PATIENT_NOT_FOUND.to_string()));
        }
        if tables.appointments.values().any(|a| a.patient_id == id) {
            return Err(StoreError::Conflict(
                "Cannot delete patient with existing appointments".to_string(),
            ));
        }
        if tables.invoices.values().any(|i| i.patient_id == id) {
            return Err(StoreError::Conflict(
                "Cannot delete patient with existing invoices".to_string(),
            ));
        }

        tables.medical_records.retain(|_, record| record.patient_id != id);
        tables.insurance_claims.retain(|_, claim| claim.patient_id != id);
        tables.patients.remove(&id);
        Ok(())
    }

    async fn medical_history(&self, patient_id: i64) -> StoreResult<Vec<MedicalRecordDetails>> {
        let tables = self.tables.read().await;
        let mut records: Vec<MedicalRecordDetails> = tables
            .medical_records
            .values()
            .filter(|record| record.patient_id == patient_id)
            .map(|record| {
                let mut record = record.clone();
                let appointment = record.appointment_id.and_then(|id| tables.appointments.get(&id));
                record.appointment_date = appointment.map(|a| a.appointment_date);
                record.appointment_time = appointment.map(|a| a.appointment_time);
                record.doctor_name = record
                    .doctor_id
                    .and_then(|id| tables.staff.get(&id))
                    .map(|s| s.full_name.clone());
                record
            })
            .collect();

        records.sort_by_key(|r| Reverse((r.appointment_date, r.appointment_time, r.created_at)));
        Ok(records)
    }

    // ---------------------------------------------------------------- staff

    async fn create_staff(&self, user: NewUser, staff: NewStaff) -> StoreResult<StaffDetails> {
        let mut tables = self.tables.write().await;
        tables.ensure_user_unique(&user.username, &user.email, None)?;
        tables.ensure_staff_unique(&staff.phone, staff.citizen_id.as_deref(), None)?;
        tables.ensure_department(staff.department_id)?;

        let now = Utc::now();
        let user_id = tables.next_id("users");
        tables.users.insert(
            user_id,
            User {
                id: user_id,
                username: user.username,
                email: user.email,
                password_hash: user.password_hash,
                role: user.role,
                is_active: user.is_active,
                created_at: now,
                updated_at: now,
            },
        );

        let id = tables.next_id("staff");
        let created = Staff {
            id,
            user_id: Some(user_id),
            full_name: staff.full_name,
            phone: staff.phone,
            address: staff.address,
            date_of_birth: staff.date_of_birth,
            gender: staff.gender,
            citizen_id: staff.citizen_id,
            staff_type: staff.staff_type,
            specialization: staff.specialization,
            license_number: staff.license_number,
            department_id: staff.department_id,
            salary: staff.salary,
            hire_date: staff.hire_date,
            status: staff.status,
            created_at: now,
            updated_at: now,
        };
        tables.staff.insert(id, created.clone());
        Ok(tables.staff_details(&created))
    }

    async fn find_staff(&self, id: i64) -> StoreResult<Option<StaffDetails>> {
        let tables = self.tables.read().await;
        Ok(tables.staff.get(&id).map(|staff| tables.staff_details(staff)))
    }

    async fn find_staff_by_user(&self, user_id: i64) -> StoreResult<Option<StaffDetails>> {
        let tables = self.tables.read().await;
        Ok(tables
            .staff
            .values()
            .find(|staff| staff.user_id == Some(user_id))
            .map(|staff| tables.staff_details(staff)))
    }

    async fn list_staff(
        &self,
        filter: StaffFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<StaffDetails>, i64)> {
        let tables = self.tables.read().await;
        let search = search_term(filter.search);

        let mut rows: Vec<&Staff> = tables
            .staff
            .values()
            .filter(|s| filter.staff_type.map_or(true, |t| s.staff_type == t))
            .filter(|s| filter.status.map_or(true, |status| s.status == status))
            .filter(|s| filter.department_id.map_or(true, |d| s.department_id == Some(d)))
            .filter(|s| {
                search.as_deref().map_or(true, |term| {
                    contains_ci(&s.full_name, term)
                        || contains_ci(&s.phone, term)
                        || opt_contains_ci(s.citizen_id.as_deref(), term)
                })
            })
            .collect();
        rows.sort_by_key(|s| Reverse((s.created_at, s.id)));

        let details = rows.into_iter().map(|s| tables.staff_details(s)).collect();
        Ok(paginate(details, page))
    }

    async fn update_staff(&self, id: i64, changes: StaffChanges) -> StoreResult<StaffDetails> {
        let mut tables = self.tables.write().await;
        let mut staff = tables
            .staff
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(STAFF_NOT_FOUND.to_string()))?;

        changes.apply_to(&mut staff);
        tables.ensure_staff_unique(&staff.phone, staff.citizen_id.as_deref(), Some(id))?;
        tables.ensure_department(changes.department_id)?;

        staff.updated_at = Utc::now();
        tables.staff.insert(id, staff.clone());
        Ok(tables.staff_details(&staff))
    }

    async fn delete_staff(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let staff = tables
            .staff
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(STAFF_NOT_FOUND.to_string()))?;

        if tables.appointments.values().any(|a| a.doctor_id == Some(id)) {
            return Err(StoreError::Conflict(
                "Cannot delete staff member with existing appointments".to_string(),
            ));
        }

        tables.schedules.retain(|_, entry| entry.staff_id != id);
        for department in tables.departments.values_mut() {
            if department.head_doctor_id == Some(id) {
                department.head_doctor_id = None;
            }
        }
        for record in tables.medical_records.values_mut() {
            if record.doctor_id == Some(id) {
                record.doctor_id = None;
            }
        }
        tables.staff.remove(&id);

        if let Some(user) = staff.user_id.and_then(|user_id| tables.users.get_mut(&user_id)) {
            user.is_active = false;
            user.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn staff_schedule(
        &self,
        staff_id: i64,
        range: DateRange,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let tables = self.tables.read().await;
        let mut entries: Vec<ScheduleEntry> = tables
            .schedules
            .values()
            .filter(|entry| entry.staff_id == staff_id && range.contains_date(entry.work_date))
            .map(|entry| {
                let mut entry = entry.clone();
                let clinic = entry.clinic_id.and_then(|id| tables.clinics.get(&id));
                entry.room_number = clinic.map(|c| c.room_number.clone());
                entry.room_name = clinic.map(|c| c.room_name.clone());
                entry
            })
            .collect();

        entries.sort_by_key(|entry| (entry.work_date, entry.start_time));
        Ok(entries)
    }

    async fn list_departments(&self) -> StoreResult<Vec<DepartmentDetails>> {
        let tables = self.tables.read().await;
        let mut departments: Vec<DepartmentDetails> = tables
            .departments
            .values()
            .map(|department| {
                let mut department = department.clone();
                department.head_doctor_name = department
                    .head_doctor_id
                    .and_then(|id| tables.staff.get(&id))
                    .map(|s| s.full_name.clone());
                department
            })
            .collect();

        departments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(departments)
    }

    // -------------------------------------------------------------- clinics

    async fn create_clinic(&self, clinic: NewClinic) -> StoreResult<ClinicDetails> {
        let mut tables = self.tables.write().await;
        tables.ensure_room_unique(&clinic.room_number, None)?;
        tables.ensure_department(clinic.department_id)?;

        let now = Utc::now();
        let id = tables.next_id("clinics");
        let created = Clinic {
            id,
            room_number: clinic.room_number,
            room_name: clinic.room_name,
            department_id: clinic.department_id,
            floor_number: clinic.floor_number,
            capacity: clinic.capacity,
            equipment: clinic.equipment,
            is_available: clinic.is_available,
            created_at: now,
            updated_at: now,
        };
        tables.clinics.insert(id, created.clone());
        Ok(tables.clinic_details(&created))
    }

    async fn find_clinic(&self, id: i64) -> StoreResult<Option<ClinicDetails>> {
        let tables = self.tables.read().await;
        Ok(tables.clinics.get(&id).map(|clinic| tables.clinic_details(clinic)))
    }

    async fn list_clinics(
        &self,
        filter: ClinicFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<ClinicDetails>, i64)> {
        let tables = self.tables.read().await;
        let search = search_term(filter.search);

        let mut rows: Vec<&Clinic> = tables
            .clinics
            .values()
            .filter(|c| filter.is_available.map_or(true, |available| c.is_available == available))
            .filter(|c| filter.floor_number.map_or(true, |floor| c.floor_number == Some(floor)))
            .filter(|c| {
                search.as_deref().map_or(true, |term| {
                    contains_ci(&c.room_number, term) || contains_ci(&c.room_name, term)
                })
            })
            .collect();
        // Unknown floors sort last.
        rows.sort_by(|a, b| {
            (a.floor_number.is_none(), a.floor_number, &a.room_number)
                .cmp(&(b.floor_number.is_none(), b.floor_number, &b.room_number))
        });

        let details = rows.into_iter().map(|c| tables.clinic_details(c)).collect();
        Ok(paginate(details, page))
    }

    async fn update_clinic(&self, id: i64, changes: ClinicChanges) -> StoreResult<ClinicDetails> {
        let mut tables = self.tables.write().await;
        let mut clinic = tables
            .clinics
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))?;

        changes.apply_to(&mut clinic);
        tables.ensure_room_unique(&clinic.room_number, Some(id))?;
        tables.ensure_department(changes.department_id)?;

        clinic.updated_at = Utc::now();
        tables.clinics.insert(id, clinic.clone());
        Ok(tables.clinic_details(&clinic))
    }

    async fn delete_clinic(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.clinics.contains_key(&id) {
            return Err(StoreError::NotFound(CLINIC_NOT_FOUND.to_string()));
        }
        if tables.appointments.values().any(|a| a.clinic_id == Some(id)) {
            return Err(StoreError::Conflict(
                "Cannot delete clinic with existing appointments".to_string(),
            ));
        }

        for entry in tables.schedules.values_mut() {
            if entry.clinic_id == Some(id) {
                entry.clinic_id = None;
            }
        }
        tables.clinics.remove(&id);
        Ok(())
    }

    async fn clinic_schedule(
        &self,
        clinic_id: i64,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<AppointmentDetails>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Appointment> = tables
            .appointments
            .values()
            .filter(|a| a.clinic_id == Some(clinic_id))
            .filter(|a| a.status != AppointmentStatus::Cancelled)
            .filter(|a| date.map_or(true, |d| a.appointment_date == d))
            .collect();
        rows.sort_by_key(|a| (a.appointment_date, a.appointment_time, a.id));

        Ok(rows.into_iter().map(|a| tables.appointment_details(a)).collect())
    }

    // --------------------------------------------------------- appointments

    async fn create_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        tables.ensure_patient(appointment.patient_id)?;
        tables.ensure_doctor(appointment.doctor_id)?;
        tables.ensure_clinic(appointment.clinic_id)?;

        let now = Utc::now();
        let row_count = tables.appointments.len();
        let mut created = Appointment {
            id: 0,
            appointment_code: String::new(),
            patient_id: appointment.patient_id,
            doctor_id: appointment.doctor_id,
            clinic_id: appointment.clinic_id,
            appointment_date: appointment.appointment_date,
            appointment_time: appointment.appointment_time,
            status: appointment.status,
            reason: appointment.reason,
            symptoms: appointment.symptoms,
            notes: appointment.notes,
            created_by: appointment.created_by,
            created_at: now,
            updated_at: now,
        };

        if tables.appointment_blocked(&created, None) {
            return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
        }

        created.id = tables.next_id("appointments");
        created.appointment_code = tables.next_code(APPOINTMENT_CODE_PREFIX, row_count);
        tables.appointments.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_appointment(&self, id: i64) -> StoreResult<Option<AppointmentDetails>> {
        let tables = self.tables.read().await;
        Ok(tables
            .appointments
            .get(&id)
            .map(|appointment| tables.appointment_details(appointment)))
    }

    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AppointmentDetails>, i64)> {
        let tables = self.tables.read().await;
        let search = search_term(filter.search);

        let mut rows: Vec<AppointmentDetails> = tables
            .appointments
            .values()
            .filter(|a| filter.status.map_or(true, |s| a.status == s))
            .filter(|a| filter.patient_id.map_or(true, |p| a.patient_id == p))
            .filter(|a| filter.doctor_id.map_or(true, |d| a.doctor_id == Some(d)))
            .filter(|a| filter.date.map_or(true, |d| a.appointment_date == d))
            .map(|a| tables.appointment_details(a))
            .filter(|details| {
                search.as_deref().map_or(true, |term| {
                    contains_ci(&details.appointment.appointment_code, term)
                        || opt_contains_ci(details.patient_name.as_deref(), term)
                })
            })
            .collect();
        rows.sort_by_key(|d| {
            Reverse((
                d.appointment.appointment_date,
                d.appointment.appointment_time,
                d.appointment.id,
            ))
        });

        Ok(paginate(rows, page))
    }

    async fn update_appointment(
        &self,
        id: i64,
        changes: AppointmentChanges,
    ) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        let current = tables
            .appointments
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()))?;

        if let Some(patient_id) = changes.patient_id {
            tables.ensure_patient(patient_id)?;
        }
        tables.ensure_doctor(changes.doctor_id.flatten())?;
        tables.ensure_clinic(changes.clinic_id.flatten())?;

        let updated = changes.merged(&current, Utc::now());
        if tables.appointment_blocked(&updated, Some(id)) {
            return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
        }

        tables.appointments.insert(id, updated.clone());
        Ok(updated)
    }

    async fn cancel_appointment(&self, id: i64, notes: Option<String>) -> StoreResult<Appointment> {
        let mut tables = self.tables.write().await;
        let appointment = tables
            .appointments
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()))?;

        appointment.status = AppointmentStatus::Cancelled;
        if notes.is_some() {
            appointment.notes = notes;
        }
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete_appointment(&self, id: i64) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.appointments.remove(&id).is_none() {
            return Err(StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()));
        }

        for invoice in tables.invoices.values_mut() {
            if invoice.appointment_id == Some(id) {
                invoice.appointment_id = None;
            }
        }
        for record in tables.medical_records.values_mut() {
            if record.appointment_id == Some(id) {
                record.appointment_id = None;
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------- invoices

    async fn create_invoice(&self, invoice: NewInvoice) -> StoreResult<Invoice> {
        let mut tables = self.tables.write().await;
        tables.ensure_patient(invoice.patient_id)?;
        if let Some(appointment_id) = invoice.appointment_id {
            if !tables.appointments.contains_key(&appointment_id) {
                return Err(StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()));
            }
        }

        let now = Utc::now();
        let row_count = tables.invoices.len();
        let invoice_code = tables.next_code(INVOICE_CODE_PREFIX, row_count);
        let id = tables.next_id("invoices");
        let created = Invoice {
            id,
            invoice_code,
            appointment_id: invoice.appointment_id,
            patient_id: invoice.patient_id,
            total_amount: invoice.total_amount,
            discount: invoice.discount,
            paid_amount: Default::default(),
            payment_status: Default::default(),
            payment_method: None,
            services: invoice.services,
            notes: invoice.notes,
            created_by: invoice.created_by,
            created_at: now,
            updated_at: now,
        };
        tables.invoices.insert(id, created.clone());
        Ok(created)
    }

    async fn find_invoice(&self, id: i64) -> StoreResult<Option<InvoiceDetails>> {
        let tables = self.tables.read().await;
        Ok(tables.invoices.get(&id).map(|invoice| tables.invoice_details(invoice)))
    }

    async fn list_invoices(
        &self,
        filter: InvoiceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<InvoiceDetails>, i64)> {
        let tables = self.tables.read().await;
        let mut rows: Vec<&Invoice> = tables
            .invoices
            .values()
            .filter(|i| filter.payment_status.map_or(true, |s| i.payment_status == s))
            .filter(|i| filter.patient_id.map_or(true, |p| i.patient_id == p))
            .filter(|i| filter.range.contains(i.created_at))
            .collect();
        rows.sort_by_key(|i| Reverse((i.created_at, i.id)));

        let details = rows.into_iter().map(|i| tables.invoice_details(i)).collect();
        Ok(paginate(details, page))
    }

    async fn record_payment(&self, id: i64, payment: PaymentUpdate) -> StoreResult<Invoice> {
        let mut tables = self.tables.write().await;
        let invoice = tables
            .invoices
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(INVOICE_NOT_FOUND.to_string()))?;

        payment.apply_to(invoice);
        invoice.updated_at = Utc::now();
        Ok(invoice.clone())
    }

    async fn revenue_stats(&self, range: DateRange) -> StoreResult<RevenueStats> {
        let tables = self.tables.read().await;
        Ok(RevenueStats::from_invoices(
            tables.invoices.values().filter(|i| range.contains(i.created_at)),
        ))
    }

    async fn list_insurance_claims(
        &self,
        status: Option<String>,
        page: PageRequest,
    ) -> StoreResult<(Vec<InsuranceClaim>, i64)> {
        let tables = self.tables.read().await;
        let mut rows: Vec<InsuranceClaim> = tables
            .insurance_claims
            .values()
            .filter(|claim| status.as_deref().map_or(true, |s| claim.status == s))
            .map(|claim| {
                let mut claim = claim.clone();
                let patient = tables.patients.get(&claim.patient_id);
                claim.patient_name = patient.map(|p| p.full_name.clone());
                claim.insurance_number = patient.and_then(|p| p.insurance_number.clone());
                claim.invoice_code = claim
                    .invoice_id
                    .and_then(|id| tables.invoices.get(&id))
                    .map(|i| i.invoice_code.clone());
                claim
            })
            .collect();
        rows.sort_by_key(|claim| Reverse((claim.created_at, claim.id)));

        Ok(paginate(rows, page))
    }
}
