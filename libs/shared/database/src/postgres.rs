use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{FromRow, Postgres, QueryBuilder};
use tracing::{debug, error, info, instrument};

use shared_models::appointment::{Appointment, AppointmentDetails, AppointmentStatus};
use shared_models::auth::User;
use shared_models::billing::{
    DateRange, InsuranceClaim, Invoice, InvoiceDetails, RevenueStats, RevenueSummary,
    StatusBreakdown,
};
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

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            match db_err.code().as_deref() {
                Some(UNIQUE_VIOLATION) => {
                    return StoreError::Conflict(unique_violation_message(db_err.constraint()))
                }
                Some(FOREIGN_KEY_VIOLATION) => {
                    return StoreError::Conflict(
                        "Record is referenced by other records".to_string(),
                    )
                }
                _ => {}
            }
        }

        error!("Database error: {}", err);
        StoreError::Database(err.to_string())
    }
}

fn unique_violation_message(constraint: Option<&str>) -> String {
    let constraint = constraint.unwrap_or_default();
    let message = if constraint.contains("_slot_") {
        SLOT_TAKEN
    } else if constraint.contains("phone") {
        "Phone number already exists"
    } else if constraint.contains("citizen_id") {
        "Citizen ID already exists"
    } else if constraint.contains("room_number") {
        "Room number already exists"
    } else if constraint.starts_with("users_") {
        "Username or email already exists"
    } else {
        "Record already exists"
    };
    message.to_string()
}

fn parse<T: FromStr<Err = String>>(value: &str) -> StoreResult<T> {
    value.parse().map_err(StoreError::Database)
}

fn parse_opt<T: FromStr<Err = String>>(value: Option<String>) -> StoreResult<Option<T>> {
    value.as_deref().map(parse).transpose()
}

// ==============================================================================
// ROWS
// ==============================================================================

#[derive(FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    role: String,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = StoreError;

    fn try_from(row: UserRow) -> StoreResult<Self> {
        Ok(User {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: parse(&row.role)?,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PatientRow {
    id: i64,
    patient_code: String,
    full_name: String,
    phone: String,
    email: Option<String>,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
    address: Option<String>,
    citizen_id: Option<String>,
    insurance_number: Option<String>,
    emergency_contact: Option<String>,
    emergency_phone: Option<String>,
    blood_type: Option<String>,
    allergies: Option<String>,
    medical_history: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PatientRow> for Patient {
    type Error = StoreError;

    fn try_from(row: PatientRow) -> StoreResult<Self> {
        Ok(Patient {
            id: row.id,
            patient_code: row.patient_code,
            full_name: row.full_name,
            phone: row.phone,
            email: row.email,
            date_of_birth: row.date_of_birth,
            gender: parse_opt(row.gender)?,
            address: row.address,
            citizen_id: row.citizen_id,
            insurance_number: row.insurance_number,
            emergency_contact: row.emergency_contact,
            emergency_phone: row.emergency_phone,
            blood_type: row.blood_type,
            allergies: row.allergies,
            medical_history: row.medical_history,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct StaffRow {
    id: i64,
    user_id: Option<i64>,
    full_name: String,
    phone: String,
    address: Option<String>,
    date_of_birth: Option<NaiveDate>,
    gender: Option<String>,
    citizen_id: Option<String>,
    staff_type: String,
    specialization: Option<String>,
    license_number: Option<String>,
    department_id: Option<i64>,
    salary: Option<Decimal>,
    hire_date: Option<NaiveDate>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    username: Option<String>,
    email: Option<String>,
    is_active: Option<bool>,
    department_name: Option<String>,
}

impl TryFrom<StaffRow> for StaffDetails {
    type Error = StoreError;

    fn try_from(row: StaffRow) -> StoreResult<Self> {
        Ok(StaffDetails {
            staff: Staff {
                id: row.id,
                user_id: row.user_id,
                full_name: row.full_name,
                phone: row.phone,
                address: row.address,
                date_of_birth: row.date_of_birth,
                gender: parse_opt(row.gender)?,
                citizen_id: row.citizen_id,
                staff_type: parse(&row.staff_type)?,
                specialization: row.specialization,
                license_number: row.license_number,
                department_id: row.department_id,
                salary: row.salary,
                hire_date: row.hire_date,
                status: parse(&row.status)?,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            username: row.username,
            email: row.email,
            is_active: row.is_active,
            department_name: row.department_name,
        })
    }
}

#[derive(FromRow)]
struct ClinicRow {
    id: i64,
    room_number: String,
    room_name: String,
    department_id: Option<i64>,
    floor_number: Option<i32>,
    capacity: Option<i32>,
    equipment: Option<String>,
    is_available: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    department_name: Option<String>,
}

impl From<ClinicRow> for ClinicDetails {
    fn from(row: ClinicRow) -> Self {
        ClinicDetails {
            clinic: Clinic {
                id: row.id,
                room_number: row.room_number,
                room_name: row.room_name,
                department_id: row.department_id,
                floor_number: row.floor_number,
                capacity: row.capacity,
                equipment: row.equipment,
                is_available: row.is_available,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
            department_name: row.department_name,
        }
    }
}

#[derive(FromRow)]
struct AppointmentRow {
    id: i64,
    appointment_code: String,
    patient_id: i64,
    doctor_id: Option<i64>,
    clinic_id: Option<i64>,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    status: String,
    reason: Option<String>,
    symptoms: Option<String>,
    notes: Option<String>,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = StoreError;

    fn try_from(row: AppointmentRow) -> StoreResult<Self> {
        Ok(Appointment {
            id: row.id,
            appointment_code: row.appointment_code,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            clinic_id: row.clinic_id,
            appointment_date: row.appointment_date,
            appointment_time: row.appointment_time,
            status: parse(&row.status)?,
            reason: row.reason,
            symptoms: row.symptoms,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct AppointmentDetailsRow {
    #[sqlx(flatten)]
    appointment: AppointmentRow,
    patient_name: Option<String>,
    patient_phone: Option<String>,
    patient_code: Option<String>,
    doctor_name: Option<String>,
    room_number: Option<String>,
    room_name: Option<String>,
}

impl TryFrom<AppointmentDetailsRow> for AppointmentDetails {
    type Error = StoreError;

    fn try_from(row: AppointmentDetailsRow) -> StoreResult<Self> {
        Ok(AppointmentDetails {
            appointment: row.appointment.try_into()?,
            patient_name: row.patient_name,
            patient_phone: row.patient_phone,
            patient_code: row.patient_code,
            doctor_name: row.doctor_name,
            room_number: row.room_number,
            room_name: row.room_name,
        })
    }
}

#[derive(FromRow)]
struct InvoiceRow {
    id: i64,
    invoice_code: String,
    appointment_id: Option<i64>,
    patient_id: i64,
    total_amount: Decimal,
    discount: Decimal,
    paid_amount: Decimal,
    payment_status: String,
    payment_method: Option<String>,
    services: Json<Vec<serde_json::Value>>,
    notes: Option<String>,
    created_by: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<InvoiceRow> for Invoice {
    type Error = StoreError;

    fn try_from(row: InvoiceRow) -> StoreResult<Self> {
        Ok(Invoice {
            id: row.id,
            invoice_code: row.invoice_code,
            appointment_id: row.appointment_id,
            patient_id: row.patient_id,
            total_amount: row.total_amount,
            discount: row.discount,
            paid_amount: row.paid_amount,
            payment_status: parse(&row.payment_status)?,
            payment_method: row.payment_method,
            services: row.services.0,
            notes: row.notes,
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct InvoiceDetailsRow {
    #[sqlx(flatten)]
    invoice: InvoiceRow,
    patient_name: Option<String>,
    patient_phone: Option<String>,
    appointment_code: Option<String>,
}

impl TryFrom<InvoiceDetailsRow> for InvoiceDetails {
    type Error = StoreError;

    fn try_from(row: InvoiceDetailsRow) -> StoreResult<Self> {
        Ok(InvoiceDetails {
            invoice: row.invoice.try_into()?,
            patient_name: row.patient_name,
            patient_phone: row.patient_phone,
            appointment_code: row.appointment_code,
        })
    }
}

#[derive(FromRow)]
struct ScheduleRow {
    id: i64,
    staff_id: i64,
    clinic_id: Option<i64>,
    work_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    shift_type: Option<String>,
    notes: Option<String>,
    room_number: Option<String>,
    room_name: Option<String>,
}

impl From<ScheduleRow> for ScheduleEntry {
    fn from(row: ScheduleRow) -> Self {
        ScheduleEntry {
            id: row.id,
            staff_id: row.staff_id,
            clinic_id: row.clinic_id,
            work_date: row.work_date,
            start_time: row.start_time,
            end_time: row.end_time,
            shift_type: row.shift_type,
            notes: row.notes,
            room_number: row.room_number,
            room_name: row.room_name,
        }
    }
}

#[derive(FromRow)]
struct DepartmentRow {
    id: i64,
    name: String,
    description: Option<String>,
    head_doctor_id: Option<i64>,
    head_doctor_name: Option<String>,
}

impl From<DepartmentRow> for DepartmentDetails {
    fn from(row: DepartmentRow) -> Self {
        DepartmentDetails {
            id: row.id,
            name: row.name,
            description: row.description,
            head_doctor_id: row.head_doctor_id,
            head_doctor_name: row.head_doctor_name,
        }
    }
}

#[derive(FromRow)]
struct MedicalRecordRow {
    id: i64,
    patient_id: i64,
    appointment_id: Option<i64>,
    doctor_id: Option<i64>,
    diagnosis: Option<String>,
    treatment: Option<String>,
    prescription: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    appointment_date: Option<NaiveDate>,
    appointment_time: Option<NaiveTime>,
    doctor_name: Option<String>,
}

impl From<MedicalRecordRow> for MedicalRecordDetails {
    fn from(row: MedicalRecordRow) -> Self {
        MedicalRecordDetails {
            id: row.id,
            patient_id: row.patient_id,
            appointment_id: row.appointment_id,
            doctor_id: row.doctor_id,
            diagnosis: row.diagnosis,
            treatment: row.treatment,
            prescription: row.prescription,
            notes: row.notes,
            created_at: row.created_at,
            appointment_date: row.appointment_date,
            appointment_time: row.appointment_time,
            doctor_name: row.doctor_name,
        }
    }
}

#[derive(FromRow)]
struct ClaimRow {
    id: i64,
    invoice_id: Option<i64>,
    patient_id: i64,
    claim_amount: Decimal,
    approved_amount: Option<Decimal>,
    status: String,
    submitted_at: Option<DateTime<Utc>>,
    processed_at: Option<DateTime<Utc>>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    patient_name: Option<String>,
    insurance_number: Option<String>,
    invoice_code: Option<String>,
}

impl From<ClaimRow> for InsuranceClaim {
    fn from(row: ClaimRow) -> Self {
        InsuranceClaim {
            id: row.id,
            invoice_id: row.invoice_id,
            patient_id: row.patient_id,
            insurance_number: row.insurance_number,
            claim_amount: row.claim_amount,
            approved_amount: row.approved_amount,
            status: row.status,
            submitted_at: row.submitted_at,
            processed_at: row.processed_at,
            notes: row.notes,
            created_at: row.created_at,
            patient_name: row.patient_name,
            invoice_code: row.invoice_code,
        }
    }
}

#[derive(FromRow)]
struct SummaryRow {
    total_invoices: i64,
    gross_revenue: Decimal,
    total_discount: Decimal,
    total_paid: Decimal,
}

#[derive(FromRow)]
struct BreakdownRow {
    payment_status: String,
    count: i64,
    amount: Decimal,
}

fn convert_all<R, T>(rows: Vec<R>) -> StoreResult<Vec<T>>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

// ==============================================================================
// SQL
// ==============================================================================

const USER_COLUMNS: &str =
    "id, username, email, password_hash, role, is_active, created_at, updated_at";

const PATIENT_COLUMNS: &str = "id, patient_code, full_name, phone, email, date_of_birth, gender, \
     address, citizen_id, insurance_number, emergency_contact, emergency_phone, blood_type, \
     allergies, medical_history, created_at, updated_at";

const STAFF_SELECT: &str = "SELECT s.id, s.user_id, s.full_name, s.phone, s.address, \
     s.date_of_birth, s.gender, s.citizen_id, s.staff_type, s.specialization, s.license_number, \
     s.department_id, s.salary, s.hire_date, s.status, s.created_at, s.updated_at, \
     u.username, u.email, u.is_active, d.name AS department_name \
     FROM staff s \
     LEFT JOIN users u ON s.user_id = u.id \
     LEFT JOIN departments d ON s.department_id = d.id";

const CLINIC_SELECT: &str = "SELECT c.id, c.room_number, c.room_name, c.department_id, \
     c.floor_number, c.capacity, c.equipment, c.is_available, c.created_at, c.updated_at, \
     d.name AS department_name \
     FROM clinics c \
     LEFT JOIN departments d ON c.department_id = d.id";

const APPOINTMENT_COLUMNS: &str = "id, appointment_code, patient_id, doctor_id, clinic_id, \
     appointment_date, appointment_time, status, reason, symptoms, notes, created_by, \
     created_at, updated_at";

const APPOINTMENT_SELECT: &str = "SELECT a.id, a.appointment_code, a.patient_id, a.doctor_id, \
     a.clinic_id, a.appointment_date, a.appointment_time, a.status, a.reason, a.symptoms, \
     a.notes, a.created_by, a.created_at, a.updated_at, \
     p.full_name AS patient_name, p.phone AS patient_phone, p.patient_code, \
     s.full_name AS doctor_name, c.room_number, c.room_name \
     FROM appointments a \
     LEFT JOIN patients p ON a.patient_id = p.id \
     LEFT JOIN staff s ON a.doctor_id = s.id \
     LEFT JOIN clinics c ON a.clinic_id = c.id";

const INVOICE_COLUMNS: &str = "id, invoice_code, appointment_id, patient_id, total_amount, \
     discount, paid_amount, payment_status, payment_method, services, notes, created_by, \
     created_at, updated_at";

const INVOICE_SELECT: &str = "SELECT i.id, i.invoice_code, i.appointment_id, i.patient_id, \
     i.total_amount, i.discount, i.paid_amount, i.payment_status, i.payment_method, i.services, \
     i.notes, i.created_by, i.created_at, i.updated_at, \
     p.full_name AS patient_name, p.phone AS patient_phone, a.appointment_code \
     FROM invoices i \
     LEFT JOIN patients p ON i.patient_id = p.id \
     LEFT JOIN appointments a ON i.appointment_id = a.id";

const SLOT_CONFLICT_SQL: &str = "SELECT EXISTS (\
     SELECT 1 FROM appointments \
     WHERE ($1::BIGINT IS NULL OR id <> $1) \
     AND appointment_date = $2 AND appointment_time = $3 \
     AND (doctor_id = $4 OR clinic_id = $5) \
     AND status NOT IN ('cancelled', 'no_show'))";

fn like_pattern(search: Option<String>) -> Option<String> {
    search
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .map(|s| format!("%{}%", s))
}

fn push_page(qb: &mut QueryBuilder<'_, Postgres>, page: PageRequest) {
    qb.push(" LIMIT ")
        .push_bind(i64::from(page.limit))
        .push(" OFFSET ")
        .push_bind(page.offset() as i64);
}

fn push_created_range(qb: &mut QueryBuilder<'_, Postgres>, column: &str, range: DateRange) {
    if let Some(start) = range.start {
        qb.push(format!(" AND ({} AT TIME ZONE 'UTC')::date >= ", column))
            .push_bind(start);
    }
    if let Some(end) = range.end {
        qb.push(format!(" AND ({} AT TIME ZONE 'UTC')::date <= ", column))
            .push_bind(end);
    }
}

/// Issues the next code for `prefix`, given a statement counting the table's rows.
async fn next_code(
    conn: &mut PgConnection,
    count_sql: &'static str,
    prefix: &'static str,
) -> StoreResult<String> {
    let row_count: i64 = sqlx::query_scalar(count_sql).fetch_one(&mut *conn).await?;
    let highest: i64 =
        sqlx::query_scalar("SELECT last_ordinal FROM code_sequences WHERE prefix = $1")
            .bind(prefix)
            .fetch_optional(&mut *conn)
            .await?
            .unwrap_or(0);

    let ordinal = next_ordinal(row_count, highest);
    sqlx::query(
        "INSERT INTO code_sequences (prefix, last_ordinal) VALUES ($1, $2) \
         ON CONFLICT (prefix) DO UPDATE SET last_ordinal = EXCLUDED.last_ordinal",
    )
    .bind(prefix)
    .bind(ordinal)
    .execute(&mut *conn)
    .await?;

    Ok(generate_code(prefix, ordinal))
}

async fn lock_tables(conn: &mut PgConnection, statement: &'static str) -> StoreResult<()> {
    sqlx::query(statement).execute(conn).await?;
    Ok(())
}

async fn ensure_unique_user(
    conn: &mut PgConnection,
    username: &str,
    email: &str,
    except: Option<i64>,
) -> StoreResult<()> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM users \
         WHERE (username = $1 OR email = $2) AND ($3::BIGINT IS NULL OR id <> $3))",
    )
    .bind(username)
    .bind(email)
    .bind(except)
    .fetch_one(conn)
    .await?;

    if taken {
        return Err(StoreError::Conflict("Username or email already exists".to_string()));
    }
    Ok(())
}

/// Phone and citizen id uniqueness for `patients` or `staff`.
async fn ensure_unique_person(
    conn: &mut PgConnection,
    table: &'static str,
    phone: &str,
    citizen_id: Option<&str>,
    except: Option<i64>,
) -> StoreResult<()> {
    let mut qb = QueryBuilder::<Postgres>::new("SELECT phone = ");
    qb.push_bind(phone.to_string())
        .push(" FROM ")
        .push(table)
        .push(" WHERE (phone = ")
        .push_bind(phone.to_string())
        .push(" OR citizen_id = ")
        .push_bind(citizen_id.map(str::to_string))
        .push(") AND (")
        .push_bind(except)
        .push("::BIGINT IS NULL OR id <> ")
        .push_bind(except)
        .push(") LIMIT 1");

    let clash: Option<bool> = qb.build_query_scalar().fetch_optional(conn).await?;
    match clash {
        Some(true) => Err(StoreError::Conflict("Phone number already exists".to_string())),
        Some(false) => Err(StoreError::Conflict("Citizen ID already exists".to_string())),
        None => Ok(()),
    }
}

async fn ensure_department(conn: &mut PgConnection, department_id: Option<i64>) -> StoreResult<()> {
    let Some(id) = department_id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM departments WHERE id = $1)")
        .bind(id)
        .fetch_one(conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(DEPARTMENT_NOT_FOUND.to_string()))
    }
}

async fn ensure_patient(conn: &mut PgConnection, patient_id: i64) -> StoreResult<()> {
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1)")
        .bind(patient_id)
        .fetch_one(conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(PATIENT_NOT_FOUND.to_string()))
    }
}

async fn ensure_doctor(conn: &mut PgConnection, doctor_id: Option<i64>) -> StoreResult<()> {
    let Some(id) = doctor_id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM staff WHERE id = $1 AND staff_type = $2)",
    )
    .bind(id)
    .bind(StaffType::Doctor.as_str())
    .fetch_one(conn)
    .await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(DOCTOR_NOT_FOUND.to_string()))
    }
}

async fn ensure_clinic(conn: &mut PgConnection, clinic_id: Option<i64>) -> StoreResult<()> {
    let Some(id) = clinic_id else {
        return Ok(());
    };
    let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM clinics WHERE id = $1)")
        .bind(id)
        .fetch_one(conn)
        .await?;
    if exists {
        Ok(())
    } else {
        Err(StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))
    }
}

async fn ensure_slot_free(conn: &mut PgConnection, appointment: &Appointment) -> StoreResult<()> {
    if !appointment.status.is_active() {
        return Ok(());
    }
    let exclude = (appointment.id > 0).then_some(appointment.id);
    let taken: bool = sqlx::query_scalar(SLOT_CONFLICT_SQL)
        .bind(exclude)
        .bind(appointment.appointment_date)
        .bind(appointment.appointment_time)
        .bind(appointment.doctor_id)
        .bind(appointment.clinic_id)
        .fetch_one(conn)
        .await?;

    if taken {
        return Err(StoreError::Conflict(SLOT_TAKEN.to_string()));
    }
    Ok(())
}

// ==============================================================================
// STORE
// ==============================================================================

pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(5))
            .connect(database_url)
            .await?;

        info!("Connected to PostgreSQL (max {} connections)", max_connections);
        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        info!("Database migrations applied");
        Ok(())
    }

    async fn fetch_staff(
        &self,
        clause: &'static str,
        id: i64,
    ) -> StoreResult<Option<StaffDetails>> {
        let row: Option<StaffRow> = sqlx::query_as(&format!("{} WHERE {}", STAFF_SELECT, clause))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(StaffDetails::try_from).transpose()
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }

    // ---------------------------------------------------------------- users

    #[instrument(skip(self, user), fields(username = %user.username))]
    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_unique_user(&mut tx, &user.username, &user.email, None).await?;

        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (username, email, password_hash, role, is_active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE id = $1", USER_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {} FROM users WHERE email = $1", USER_COLUMNS))
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;
        row.map(User::try_from).transpose()
    }

    async fn update_user_profile(&self, id: i64, changes: ProfileChanges) -> StoreResult<User> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE users IN SHARE ROW EXCLUSIVE MODE").await?;

        let current: User = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {} FROM users WHERE id = $1",
            USER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(USER_NOT_FOUND.to_string()))?
        .try_into()?;

        let username = changes.username.unwrap_or(current.username);
        let email = changes.email.unwrap_or(current.email);
        ensure_unique_user(&mut tx, &username, &email, Some(id)).await?;

        let row: UserRow = sqlx::query_as(&format!(
            "UPDATE users SET username = $1, email = $2, updated_at = NOW() \
             WHERE id = $3 RETURNING {}",
            USER_COLUMNS
        ))
        .bind(&username)
        .bind(&email)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    #[instrument(skip(self, password_hash))]
    async fn update_password(&self, id: i64, password_hash: String) -> StoreResult<()> {
        let result =
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(USER_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------- patients

    async fn create_patient(&self, patient: NewPatient) -> StoreResult<Patient> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE patients IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_unique_person(
            &mut tx,
            "patients",
            &patient.phone,
            patient.citizen_id.as_deref(),
            None,
        )
        .await?;

        let patient_code =
            next_code(&mut tx, "SELECT COUNT(*) FROM patients", PATIENT_CODE_PREFIX).await?;

        let row: PatientRow = sqlx::query_as(&format!(
            "INSERT INTO patients (patient_code, full_name, phone, email, date_of_birth, gender, \
             address, citizen_id, insurance_number, emergency_contact, emergency_phone, \
             blood_type, allergies, medical_history) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING {}",
            PATIENT_COLUMNS
        ))
        .bind(&patient_code)
        .bind(&patient.full_name)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(patient.date_of_birth)
        .bind(patient.gender.map(|g| g.as_str()))
        .bind(&patient.address)
        .bind(&patient.citizen_id)
        .bind(&patient.insurance_number)
        .bind(&patient.emergency_contact)
        .bind(&patient.emergency_phone)
        .bind(&patient.blood_type)
        .bind(&patient.allergies)
        .bind(&patient.medical_history)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!("Created patient {}", patient_code);
        row.try_into()
    }

    async fn find_patient(&self, id: i64) -> StoreResult<Option<Patient>> {
        let row: Option<PatientRow> =
            sqlx::query_as(&format!("SELECT {} FROM patients WHERE id = $1", PATIENT_COLUMNS))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(Patient::try_from).transpose()
    }

    async fn list_patients(
        &self,
        filter: PatientFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<Patient>, i64)> {
        let pattern = like_pattern(filter.search);
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(pattern) = &pattern {
                qb.push(" AND (full_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR phone ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR email ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR patient_code ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR citizen_id ILIKE ")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM patients");
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select =
            QueryBuilder::<Postgres>::new(format!("SELECT {} FROM patients", PATIENT_COLUMNS));
        push_where(&mut select);
        select.push(format!(
            " ORDER BY {} {} NULLS LAST, id {}",
            filter.sort_by.column(),
            filter.order.as_sql(),
            filter.order.as_sql()
        ));
        push_page(&mut select, page);
        let rows: Vec<PatientRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((convert_all(rows)?, total))
    }

    async fn update_patient(&self, id: i64, changes: PatientChanges) -> StoreResult<Patient> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE patients IN SHARE ROW EXCLUSIVE MODE").await?;

        let mut patient: Patient = sqlx::query_as::<_, PatientRow>(&format!(
            "SELECT {} FROM patients WHERE id = $1",
            PATIENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(PATIENT_NOT_FOUND.to_string()))?
        .try_into()?;

        changes.apply_to(&mut patient);
        ensure_unique_person(
            &mut tx,
            "patients",
            &patient.phone,
            patient.citizen_id.as_deref(),
            Some(id),
        )
        .await?;

        let row: PatientRow = sqlx::query_as(&format!(
            "UPDATE patients SET full_name = $1, phone = $2, email = $3, date_of_birth = $4, \
             gender = $5, address = $6, citizen_id = $7, insurance_number = $8, \
             emergency_contact = $9, emergency_phone = $10, blood_type = $11, allergies = $12, \
             medical_history = $13, updated_at = NOW() WHERE id = $14 RETURNING {}",
            PATIENT_COLUMNS
        ))
        .bind(&patient.full_name)
        .bind(&patient.phone)
        .bind(&patient.email)
        .bind(patient.date_of_birth)
        .bind(patient.gender.map(|g| g.as_str()))
        .bind(&patient.address)
        .bind(&patient.citizen_id)
        .bind(&patient.insurance_number)
        .bind(&patient.emergency_contact)
        .bind(&patient.emergency_phone)
        .bind(&patient.blood_type)
        .bind(&patient.allergies)
        .bind(&patient.medical_history)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn delete_patient(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_tables(
            &mut tx,
            "LOCK TABLE patients, appointments, invoices IN SHARE ROW EXCLUSIVE MODE",
        )
        .await?;

        let (exists, appointments, invoices): (bool, bool, bool) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM patients WHERE id = $1), \
             EXISTS (SELECT 1 FROM appointments WHERE patient_id = $1), \
             EXISTS (SELECT 1 FROM invoices WHERE patient_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if !exists {
            return Err(StoreError::NotFound(PATIENT_NOT_FOUND.to_string()));
        }
        if appointments {
            return Err(StoreError::Conflict(
                "Cannot delete patient with existing appointments".to_string(),
            ));
        }
        if invoices {
            return Err(StoreError::Conflict(
                "Cannot delete patient with existing invoices".to_string(),
            ));
        }

        sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn medical_history(&self, patient_id: i64) -> StoreResult<Vec<MedicalRecordDetails>> {
        let rows: Vec<MedicalRecordRow> = sqlx::query_as(
            "SELECT mr.id, mr.patient_id, mr.appointment_id, mr.doctor_id, mr.diagnosis, \
             mr.treatment, mr.prescription, mr.notes, mr.created_at, \
             a.appointment_date, a.appointment_time, s.full_name AS doctor_name \
             FROM medical_records mr \
             LEFT JOIN appointments a ON mr.appointment_id = a.id \
             LEFT JOIN staff s ON mr.doctor_id = s.id \
             WHERE mr.patient_id = $1 \
             ORDER BY a.appointment_date DESC NULLS LAST, a.appointment_time DESC NULLS LAST, \
             mr.created_at DESC",
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    // ---------------------------------------------------------------- staff

    #[instrument(skip(self, user, staff), fields(username = %user.username))]
    async fn create_staff(&self, user: NewUser, staff: NewStaff) -> StoreResult<StaffDetails> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE users, staff IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_unique_user(&mut tx, &user.username, &user.email, None).await?;
        ensure_unique_person(&mut tx, "staff", &staff.phone, staff.citizen_id.as_deref(), None)
            .await?;
        ensure_department(&mut tx, staff.department_id).await?;

        let user_id: i64 = sqlx::query_scalar(
            "INSERT INTO users (username, email, password_hash, role, is_active) \
             VALUES ($1, $2, $3, $4, $5) RETURNING id",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.is_active)
        .fetch_one(&mut *tx)
        .await?;

        let staff_id: i64 = sqlx::query_scalar(
            "INSERT INTO staff (user_id, full_name, phone, address, date_of_birth, gender, \
             citizen_id, staff_type, specialization, license_number, department_id, salary, \
             hire_date, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14) RETURNING id",
        )
        .bind(user_id)
        .bind(&staff.full_name)
        .bind(&staff.phone)
        .bind(&staff.address)
        .bind(staff.date_of_birth)
        .bind(staff.gender.map(|g| g.as_str()))
        .bind(&staff.citizen_id)
        .bind(staff.staff_type.as_str())
        .bind(&staff.specialization)
        .bind(&staff.license_number)
        .bind(staff.department_id)
        .bind(staff.salary)
        .bind(staff.hire_date)
        .bind(staff.status.as_str())
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        self.fetch_staff("s.id = $1", staff_id)
            .await?
            .ok_or_else(|| StoreError::NotFound(STAFF_NOT_FOUND.to_string()))
    }

    async fn find_staff(&self, id: i64) -> StoreResult<Option<StaffDetails>> {
        self.fetch_staff("s.id = $1", id).await
    }

    async fn find_staff_by_user(&self, user_id: i64) -> StoreResult<Option<StaffDetails>> {
        self.fetch_staff("s.user_id = $1", user_id).await
    }

    async fn list_staff(
        &self,
        filter: StaffFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<StaffDetails>, i64)> {
        let pattern = like_pattern(filter.search.clone());
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(staff_type) = filter.staff_type {
                qb.push(" AND s.staff_type = ").push_bind(staff_type.as_str());
            }
            if let Some(status) = filter.status {
                qb.push(" AND s.status = ").push_bind(status.as_str());
            }
            if let Some(department_id) = filter.department_id {
                qb.push(" AND s.department_id = ").push_bind(department_id);
            }
            if let Some(pattern) = &pattern {
                qb.push(" AND (s.full_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR s.phone ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR s.citizen_id ILIKE ")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM staff s");
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(STAFF_SELECT);
        push_where(&mut select);
        select.push(" ORDER BY s.created_at DESC, s.id DESC");
        push_page(&mut select, page);
        let rows: Vec<StaffRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((convert_all(rows)?, total))
    }

    async fn update_staff(&self, id: i64, changes: StaffChanges) -> StoreResult<StaffDetails> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE staff IN SHARE ROW EXCLUSIVE MODE").await?;

        let current: Option<StaffRow> =
            sqlx::query_as(&format!("{} WHERE s.id = $1", STAFF_SELECT))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut staff = StaffDetails::try_from(
            current.ok_or_else(|| StoreError::NotFound(STAFF_NOT_FOUND.to_string()))?,
        )?
        .staff;

        changes.apply_to(&mut staff);
        ensure_unique_person(&mut tx, "staff", &staff.phone, staff.citizen_id.as_deref(), Some(id))
            .await?;
        ensure_department(&mut tx, changes.department_id).await?;

        sqlx::query(
            "UPDATE staff SET full_name = $1, phone = $2, address = $3, date_of_birth = $4, \
             gender = $5, citizen_id = $6, specialization = $7, license_number = $8, \
             department_id = $9, salary = $10, status = $11, updated_at = NOW() WHERE id = $12",
        )
        .bind(&staff.full_name)
        .bind(&staff.phone)
        .bind(&staff.address)
        .bind(staff.date_of_birth)
        .bind(staff.gender.map(|g| g.as_str()))
        .bind(&staff.citizen_id)
        .bind(&staff.specialization)
        .bind(&staff.license_number)
        .bind(staff.department_id)
        .bind(staff.salary)
        .bind(staff.status.as_str())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.fetch_staff("s.id = $1", id)
            .await?
            .ok_or_else(|| StoreError::NotFound(STAFF_NOT_FOUND.to_string()))
    }

    async fn delete_staff(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE staff, appointments IN SHARE ROW EXCLUSIVE MODE").await?;

        let user_id: Option<Option<i64>> =
            sqlx::query_scalar("SELECT user_id FROM staff WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(user_id) = user_id else {
            return Err(StoreError::NotFound(STAFF_NOT_FOUND.to_string()));
        };

        let booked: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM appointments WHERE doctor_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await?;
        if booked {
            return Err(StoreError::Conflict(
                "Cannot delete staff member with existing appointments".to_string(),
            ));
        }

        sqlx::query("DELETE FROM staff WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if let Some(user_id) = user_id {
            sqlx::query("UPDATE users SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn staff_schedule(
        &self,
        staff_id: i64,
        range: DateRange,
    ) -> StoreResult<Vec<ScheduleEntry>> {
        let rows: Vec<ScheduleRow> = sqlx::query_as(
            "SELECT ss.id, ss.staff_id, ss.clinic_id, ss.work_date, ss.start_time, ss.end_time, \
             ss.shift_type, ss.notes, c.room_number, c.room_name \
             FROM staff_schedules ss \
             LEFT JOIN clinics c ON ss.clinic_id = c.id \
             WHERE ss.staff_id = $1 \
             AND ($2::DATE IS NULL OR ss.work_date >= $2) \
             AND ($3::DATE IS NULL OR ss.work_date <= $3) \
             ORDER BY ss.work_date, ss.start_time",
        )
        .bind(staff_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_departments(&self) -> StoreResult<Vec<DepartmentDetails>> {
        let rows: Vec<DepartmentRow> = sqlx::query_as(
            "SELECT d.id, d.name, d.description, d.head_doctor_id, \
             s.full_name AS head_doctor_name \
             FROM departments d \
             LEFT JOIN staff s ON d.head_doctor_id = s.id \
             ORDER BY d.name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    // -------------------------------------------------------------- clinics

    async fn create_clinic(&self, clinic: NewClinic) -> StoreResult<ClinicDetails> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE clinics IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_unique_room(&mut tx, &clinic.room_number, None).await?;
        ensure_department(&mut tx, clinic.department_id).await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO clinics (room_number, room_name, department_id, floor_number, \
             capacity, equipment, is_available) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING id",
        )
        .bind(&clinic.room_number)
        .bind(&clinic.room_name)
        .bind(clinic.department_id)
        .bind(clinic.floor_number)
        .bind(clinic.capacity)
        .bind(&clinic.equipment)
        .bind(clinic.is_available)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        self.find_clinic(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))
    }

    async fn find_clinic(&self, id: i64) -> StoreResult<Option<ClinicDetails>> {
        let row: Option<ClinicRow> = sqlx::query_as(&format!("{} WHERE c.id = $1", CLINIC_SELECT))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_clinics(
        &self,
        filter: ClinicFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<ClinicDetails>, i64)> {
        let pattern = like_pattern(filter.search.clone());
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(available) = filter.is_available {
                qb.push(" AND c.is_available = ").push_bind(available);
            }
            if let Some(floor) = filter.floor_number {
                qb.push(" AND c.floor_number = ").push_bind(floor);
            }
            if let Some(pattern) = &pattern {
                qb.push(" AND (c.room_number ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR c.room_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM clinics c");
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(CLINIC_SELECT);
        push_where(&mut select);
        select.push(" ORDER BY c.floor_number NULLS LAST, c.room_number");
        push_page(&mut select, page);
        let rows: Vec<ClinicRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }

    async fn update_clinic(&self, id: i64, changes: ClinicChanges) -> StoreResult<ClinicDetails> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE clinics IN SHARE ROW EXCLUSIVE MODE").await?;

        let current: Option<ClinicRow> =
            sqlx::query_as(&format!("{} WHERE c.id = $1", CLINIC_SELECT))
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let mut clinic = ClinicDetails::from(
            current.ok_or_else(|| StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))?,
        )
        .clinic;

        changes.apply_to(&mut clinic);
        ensure_unique_room(&mut tx, &clinic.room_number, Some(id)).await?;
        ensure_department(&mut tx, changes.department_id).await?;

        sqlx::query(
            "UPDATE clinics SET room_number = $1, room_name = $2, department_id = $3, \
             floor_number = $4, capacity = $5, equipment = $6, is_available = $7, \
             updated_at = NOW() WHERE id = $8",
        )
        .bind(&clinic.room_number)
        .bind(&clinic.room_name)
        .bind(clinic.department_id)
        .bind(clinic.floor_number)
        .bind(clinic.capacity)
        .bind(&clinic.equipment)
        .bind(clinic.is_available)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        self.find_clinic(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(CLINIC_NOT_FOUND.to_string()))
    }

    async fn delete_clinic(&self, id: i64) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE clinics, appointments IN SHARE ROW EXCLUSIVE MODE").await?;

        let (exists, booked): (bool, bool) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM clinics WHERE id = $1), \
             EXISTS (SELECT 1 FROM appointments WHERE clinic_id = $1)",
        )
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        if !exists {
            return Err(StoreError::NotFound(CLINIC_NOT_FOUND.to_string()));
        }
        if booked {
            return Err(StoreError::Conflict(
                "Cannot delete clinic with existing appointments".to_string(),
            ));
        }

        sqlx::query("DELETE FROM clinics WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn clinic_schedule(
        &self,
        clinic_id: i64,
        date: Option<NaiveDate>,
    ) -> StoreResult<Vec<AppointmentDetails>> {
        let rows: Vec<AppointmentDetailsRow> = sqlx::query_as(&format!(
            "{} WHERE a.clinic_id = $1 AND a.status <> $2 \
             AND ($3::DATE IS NULL OR a.appointment_date = $3) \
             ORDER BY a.appointment_date, a.appointment_time, a.id",
            APPOINTMENT_SELECT
        ))
        .bind(clinic_id)
        .bind(AppointmentStatus::Cancelled.as_str())
        .bind(date)
        .fetch_all(&self.pool)
        .await?;

        convert_all(rows)
    }

    // --------------------------------------------------------- appointments

    async fn create_appointment(&self, appointment: NewAppointment) -> StoreResult<Appointment> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE appointments IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_patient(&mut tx, appointment.patient_id).await?;
        ensure_doctor(&mut tx, appointment.doctor_id).await?;
        ensure_clinic(&mut tx, appointment.clinic_id).await?;

        let now = Utc::now();
        let candidate = Appointment {
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
        ensure_slot_free(&mut tx, &candidate).await?;

        let code =
            next_code(&mut tx, "SELECT COUNT(*) FROM appointments", APPOINTMENT_CODE_PREFIX).await?;

        let row: AppointmentRow = sqlx::query_as(&format!(
            "INSERT INTO appointments (appointment_code, patient_id, doctor_id, clinic_id, \
             appointment_date, appointment_time, status, reason, symptoms, notes, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {}",
            APPOINTMENT_COLUMNS
        ))
        .bind(&code)
        .bind(candidate.patient_id)
        .bind(candidate.doctor_id)
        .bind(candidate.clinic_id)
        .bind(candidate.appointment_date)
        .bind(candidate.appointment_time)
        .bind(candidate.status.as_str())
        .bind(&candidate.reason)
        .bind(&candidate.symptoms)
        .bind(&candidate.notes)
        .bind(candidate.created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_appointment(&self, id: i64) -> StoreResult<Option<AppointmentDetails>> {
        let row: Option<AppointmentDetailsRow> =
            sqlx::query_as(&format!("{} WHERE a.id = $1", APPOINTMENT_SELECT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(AppointmentDetails::try_from).transpose()
    }

    async fn list_appointments(
        &self,
        filter: AppointmentFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<AppointmentDetails>, i64)> {
        let pattern = like_pattern(filter.search.clone());
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(status) = filter.status {
                qb.push(" AND a.status = ").push_bind(status.as_str());
            }
            if let Some(patient_id) = filter.patient_id {
                qb.push(" AND a.patient_id = ").push_bind(patient_id);
            }
            if let Some(doctor_id) = filter.doctor_id {
                qb.push(" AND a.doctor_id = ").push_bind(doctor_id);
            }
            if let Some(date) = filter.date {
                qb.push(" AND a.appointment_date = ").push_bind(date);
            }
            if let Some(pattern) = &pattern {
                qb.push(" AND (p.full_name ILIKE ")
                    .push_bind(pattern.clone())
                    .push(" OR a.appointment_code ILIKE ")
                    .push_bind(pattern.clone())
                    .push(")");
            }
        };

        let mut count = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) FROM appointments a LEFT JOIN patients p ON a.patient_id = p.id",
        );
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(APPOINTMENT_SELECT);
        push_where(&mut select);
        select.push(" ORDER BY a.appointment_date DESC, a.appointment_time DESC, a.id DESC");
        push_page(&mut select, page);
        let rows: Vec<AppointmentDetailsRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((convert_all(rows)?, total))
    }

    async fn update_appointment(
        &self,
        id: i64,
        changes: AppointmentChanges,
    ) -> StoreResult<Appointment> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE appointments IN SHARE ROW EXCLUSIVE MODE").await?;

        let current: Appointment = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {} FROM appointments WHERE id = $1",
            APPOINTMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()))?
        .try_into()?;

        if let Some(patient_id) = changes.patient_id {
            ensure_patient(&mut tx, patient_id).await?;
        }
        ensure_doctor(&mut tx, changes.doctor_id.flatten()).await?;
        ensure_clinic(&mut tx, changes.clinic_id.flatten()).await?;

        let updated = changes.merged(&current, Utc::now());
        ensure_slot_free(&mut tx, &updated).await?;

        let row: AppointmentRow = sqlx::query_as(&format!(
            "UPDATE appointments SET patient_id = $1, doctor_id = $2, clinic_id = $3, \
             appointment_date = $4, appointment_time = $5, status = $6, reason = $7, \
             symptoms = $8, notes = $9, updated_at = NOW() WHERE id = $10 RETURNING {}",
            APPOINTMENT_COLUMNS
        ))
        .bind(updated.patient_id)
        .bind(updated.doctor_id)
        .bind(updated.clinic_id)
        .bind(updated.appointment_date)
        .bind(updated.appointment_time)
        .bind(updated.status.as_str())
        .bind(&updated.reason)
        .bind(&updated.symptoms)
        .bind(&updated.notes)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn cancel_appointment(&self, id: i64, notes: Option<String>) -> StoreResult<Appointment> {
        let row: Option<AppointmentRow> = sqlx::query_as(&format!(
            "UPDATE appointments SET status = $1, notes = COALESCE($2, notes), \
             updated_at = NOW() WHERE id = $3 RETURNING {}",
            APPOINTMENT_COLUMNS
        ))
        .bind(AppointmentStatus::Cancelled.as_str())
        .bind(notes)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()))?
            .try_into()
    }

    async fn delete_appointment(&self, id: i64) -> StoreResult<()> {
        let result = sqlx::query("DELETE FROM appointments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------- invoices

    async fn create_invoice(&self, invoice: NewInvoice) -> StoreResult<Invoice> {
        let mut tx = self.pool.begin().await?;
        lock_tables(&mut tx, "LOCK TABLE invoices IN SHARE ROW EXCLUSIVE MODE").await?;
        ensure_patient(&mut tx, invoice.patient_id).await?;
        if let Some(appointment_id) = invoice.appointment_id {
            let exists: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM appointments WHERE id = $1)")
                    .bind(appointment_id)
                    .fetch_one(&mut *tx)
                    .await?;
            if !exists {
                return Err(StoreError::NotFound(APPOINTMENT_NOT_FOUND.to_string()));
            }
        }

        let code = next_code(&mut tx, "SELECT COUNT(*) FROM invoices", INVOICE_CODE_PREFIX).await?;

        let row: InvoiceRow = sqlx::query_as(&format!(
            "INSERT INTO invoices (invoice_code, appointment_id, patient_id, total_amount, \
             discount, services, notes, created_by) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(&code)
        .bind(invoice.appointment_id)
        .bind(invoice.patient_id)
        .bind(invoice.total_amount)
        .bind(invoice.discount)
        .bind(Json(&invoice.services))
        .bind(&invoice.notes)
        .bind(invoice.created_by)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn find_invoice(&self, id: i64) -> StoreResult<Option<InvoiceDetails>> {
        let row: Option<InvoiceDetailsRow> =
            sqlx::query_as(&format!("{} WHERE i.id = $1", INVOICE_SELECT))
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        row.map(InvoiceDetails::try_from).transpose()
    }

    async fn list_invoices(
        &self,
        filter: InvoiceFilter,
        page: PageRequest,
    ) -> StoreResult<(Vec<InvoiceDetails>, i64)> {
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(status) = filter.payment_status {
                qb.push(" AND i.payment_status = ").push_bind(status.as_str());
            }
            if let Some(patient_id) = filter.patient_id {
                qb.push(" AND i.patient_id = ").push_bind(patient_id);
            }
            push_created_range(qb, "i.created_at", filter.range);
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM invoices i");
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(INVOICE_SELECT);
        push_where(&mut select);
        select.push(" ORDER BY i.created_at DESC, i.id DESC");
        push_page(&mut select, page);
        let rows: Vec<InvoiceDetailsRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((convert_all(rows)?, total))
    }

    async fn record_payment(&self, id: i64, payment: PaymentUpdate) -> StoreResult<Invoice> {
        let mut tx = self.pool.begin().await?;

        let mut invoice: Invoice = sqlx::query_as::<_, InvoiceRow>(&format!(
            "SELECT {} FROM invoices WHERE id = $1 FOR UPDATE",
            INVOICE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::NotFound(INVOICE_NOT_FOUND.to_string()))?
        .try_into()?;

        payment.apply_to(&mut invoice);

        let row: InvoiceRow = sqlx::query_as(&format!(
            "UPDATE invoices SET paid_amount = $1, payment_status = $2, payment_method = $3, \
             updated_at = NOW() WHERE id = $4 RETURNING {}",
            INVOICE_COLUMNS
        ))
        .bind(invoice.paid_amount)
        .bind(invoice.payment_status.as_str())
        .bind(&invoice.payment_method)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    async fn revenue_stats(&self, range: DateRange) -> StoreResult<RevenueStats> {
        let mut summary_query = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*) AS total_invoices, \
             COALESCE(SUM(total_amount), 0) AS gross_revenue, \
             COALESCE(SUM(discount), 0) AS total_discount, \
             COALESCE(SUM(paid_amount), 0) AS total_paid \
             FROM invoices WHERE TRUE",
        );
        push_created_range(&mut summary_query, "created_at", range);
        let totals: SummaryRow = summary_query.build_query_as().fetch_one(&self.pool).await?;

        let mut breakdown_query = QueryBuilder::<Postgres>::new(
            "SELECT payment_status, COUNT(*) AS count, \
             COALESCE(SUM(total_amount - discount), 0) AS amount \
             FROM invoices WHERE TRUE",
        );
        push_created_range(&mut breakdown_query, "created_at", range);
        breakdown_query.push(" GROUP BY payment_status ORDER BY payment_status");
        let rows: Vec<BreakdownRow> = breakdown_query.build_query_as().fetch_all(&self.pool).await?;

        let net_revenue = totals.gross_revenue - totals.total_discount;
        let summary = RevenueSummary {
            total_invoices: totals.total_invoices,
            gross_revenue: totals.gross_revenue,
            total_discount: totals.total_discount,
            net_revenue,
            total_paid: totals.total_paid,
            total_outstanding: net_revenue - totals.total_paid,
        };

        let by_status = rows
            .into_iter()
            .map(|row| {
                Ok(StatusBreakdown {
                    payment_status: parse(&row.payment_status)?,
                    count: row.count,
                    amount: row.amount,
                })
            })
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(RevenueStats { summary, by_status })
    }

    async fn list_insurance_claims(
        &self,
        status: Option<String>,
        page: PageRequest,
    ) -> StoreResult<(Vec<InsuranceClaim>, i64)> {
        let push_where = |qb: &mut QueryBuilder<'_, Postgres>| {
            qb.push(" WHERE TRUE");
            if let Some(status) = &status {
                qb.push(" AND ic.status = ").push_bind(status.clone());
            }
        };

        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM insurance_claims ic");
        push_where(&mut count);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut select = QueryBuilder::<Postgres>::new(
            "SELECT ic.id, ic.invoice_id, ic.patient_id, ic.claim_amount, ic.approved_amount, \
             ic.status, ic.submitted_at, ic.processed_at, ic.notes, ic.created_at, \
             p.full_name AS patient_name, p.insurance_number, i.invoice_code \
             FROM insurance_claims ic \
             LEFT JOIN patients p ON ic.patient_id = p.id \
             LEFT JOIN invoices i ON ic.invoice_id = i.id",
        );
        push_where(&mut select);
        select.push(" ORDER BY ic.created_at DESC, ic.id DESC");
        push_page(&mut select, page);
        let rows: Vec<ClaimRow> = select.build_query_as().fetch_all(&self.pool).await?;

        Ok((rows.into_iter().map(Into::into).collect(), total))
    }
}

async fn ensure_unique_room(
    conn: &mut PgConnection,
    room_number: &str,
    except: Option<i64>,
) -> StoreResult<()> {
    let taken: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM clinics \
         WHERE room_number = $1 AND ($2::BIGINT IS NULL OR id <> $2))",
    )
    .bind(room_number)
    .bind(except)
    .fetch_one(conn)
    .await?;

    if taken {
        return Err(StoreError::Conflict("Room number already exists".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violations_name_the_field() {
        let message = |constraint| unique_violation_message(Some(constraint));
        assert_eq!(message("patients_phone_key"), "Phone number already exists");
        assert_eq!(message("staff_citizen_id_key"), "Citizen ID already exists");
        assert_eq!(message("clinics_room_number_key"), "Room number already exists");
        assert_eq!(message("appointments_doctor_slot_key"), SLOT_TAKEN);
        assert_eq!(message("users_email_key"), "Username or email already exists");
        assert_eq!(unique_violation_message(None), "Record already exists");
    }

    #[test]
    fn like_pattern_skips_blank_search() {
        assert_eq!(like_pattern(Some("  ".to_string())), None);
        assert_eq!(like_pattern(Some(" an ".to_string())).as_deref(), Some("%an%"));
    }
}
