// libs/shared/database/tests/postgres_store_test.rs
//
// Runs against a real PostgreSQL database. Skipped unless LIVE_INTEGRATION_TESTS=true
// and DATABASE_URL points at a database the tests may write to.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::LazyLock;

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, MutexGuard};

use shared_database::store::*;
use shared_database::PostgresStore;
use shared_models::appointment::AppointmentStatus;
use shared_models::auth::Role;
use shared_models::codes::parse_ordinal;
use shared_models::directory::{StaffStatus, StaffType};

// Code ordinals are asserted as consecutive, so tests must not interleave writes.
static SERIAL: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

static RUN: LazyLock<i64> = LazyLock::new(|| Utc::now().timestamp() % 100_000);
static NEXT: AtomicU64 = AtomicU64::new(0);

fn should_run_live_tests() -> bool {
    std::env::var("LIVE_INTEGRATION_TESTS").unwrap_or_default() == "true"
}

struct Live {
    store: PostgresStore,
    url: String,
    _serial: MutexGuard<'static, ()>,
}

async fn live() -> Option<Live> {
    if !should_run_live_tests() {
        println!("Skipping live PostgreSQL tests (set LIVE_INTEGRATION_TESTS=true to enable)");
        return None;
    }
    let url = std::env::var("DATABASE_URL").ok()?;

    let serial = SERIAL.lock().await;
    let store = PostgresStore::connect(&url, 2).await.unwrap();
    store.migrate().await.unwrap();
    Some(Live {
        store,
        url,
        _serial: serial,
    })
}

/// Distinct across runs and within one run.
fn unique() -> String {
    format!("{:05}{:03}", *RUN, NEXT.fetch_add(1, Ordering::Relaxed) % 1000)
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2031, 5, 12).unwrap()
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn new_patient(phone: String) -> NewPatient {
    NewPatient {
        full_name: "Le Van Live".to_string(),
        phone,
        email: None,
        date_of_birth: None,
        gender: None,
        address: None,
        citizen_id: None,
        insurance_number: None,
        emergency_contact: None,
        emergency_phone: None,
        blood_type: None,
        allergies: None,
        medical_history: None,
    }
}

fn new_user(tag: &str, role: Role) -> NewUser {
    NewUser {
        username: format!("live{}", tag),
        email: format!("live{}@clinic.test", tag),
        password_hash: "hash".to_string(),
        role,
        is_active: true,
    }
}

fn new_doctor(phone: String) -> NewStaff {
    NewStaff {
        full_name: "Pham Live".to_string(),
        phone,
        address: None,
        date_of_birth: None,
        gender: None,
        citizen_id: None,
        staff_type: StaffType::Doctor,
        specialization: None,
        license_number: None,
        department_id: None,
        salary: None,
        hire_date: None,
        status: StaffStatus::Active,
    }
}

fn booking(patient_id: i64, doctor_id: Option<i64>, clinic_id: Option<i64>) -> NewAppointment {
    NewAppointment {
        patient_id,
        doctor_id,
        clinic_id,
        appointment_date: date(),
        appointment_time: time(8, 0),
        status: AppointmentStatus::Pending,
        reason: None,
        symptoms: None,
        notes: None,
        created_by: None,
    }
}

struct Seeded {
    patient_id: i64,
    doctor_id: i64,
    clinic_id: i64,
}

async fn seed(store: &PostgresStore) -> Seeded {
    let patient = store
        .create_patient(new_patient(format!("07{}", unique())))
        .await
        .unwrap();
    let doctor = store
        .create_staff(
            new_user(&unique(), Role::Doctor),
            new_doctor(format!("06{}", unique())),
        )
        .await
        .unwrap();
    let clinic = store
        .create_clinic(NewClinic {
            room_number: format!("L{}", unique()),
            room_name: "Live room".to_string(),
            department_id: None,
            floor_number: Some(9),
            capacity: None,
            equipment: None,
            is_available: true,
        })
        .await
        .unwrap();

    Seeded {
        patient_id: patient.id,
        doctor_id: doctor.staff.id,
        clinic_id: clinic.clinic.id,
    }
}

#[tokio::test]
async fn double_booking_a_doctor_is_rejected() {
    let Some(live) = live().await else { return };
    let s = seed(&live.store).await;

    live.store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), None))
        .await
        .unwrap();
    let err = live
        .store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), None))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == SLOT_TAKEN);

    live.store
        .create_appointment(booking(s.patient_id, None, Some(s.clinic_id)))
        .await
        .unwrap();
    let err = live
        .store
        .create_appointment(booking(s.patient_id, None, Some(s.clinic_id)))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == SLOT_TAKEN);
}

#[tokio::test]
async fn cancel_and_no_show_free_the_slot() {
    let Some(live) = live().await else { return };
    let s = seed(&live.store).await;

    let first = live
        .store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), Some(s.clinic_id)))
        .await
        .unwrap();
    live.store.cancel_appointment(first.id, None).await.unwrap();

    let second = live
        .store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), Some(s.clinic_id)))
        .await
        .unwrap();
    live.store
        .update_appointment(
            second.id,
            AppointmentChanges {
                status: Some(AppointmentStatus::NoShow),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let third = live
        .store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), Some(s.clinic_id)))
        .await
        .unwrap();
    assert_eq!(third.status, AppointmentStatus::Pending);

    // Re-activating the no-show would now collide with the third booking.
    let err = live
        .store
        .update_appointment(
            second.id,
            AppointmentChanges {
                status: Some(AppointmentStatus::Confirmed),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == SLOT_TAKEN);
}

#[tokio::test]
async fn codes_are_sequential_per_prefix() {
    let Some(live) = live().await else { return };
    let s = seed(&live.store).await;

    let next_patient = live
        .store
        .create_patient(new_patient(format!("07{}", unique())))
        .await
        .unwrap();
    let seeded_patient = live.store.find_patient(s.patient_id).await.unwrap().unwrap();
    assert_eq!(
        parse_ordinal("BN", &next_patient.patient_code),
        parse_ordinal("BN", &seeded_patient.patient_code).map(|n| n + 1)
    );

    let first = live
        .store
        .create_appointment(booking(s.patient_id, None, None))
        .await
        .unwrap();
    let second = live
        .store
        .create_appointment(booking(s.patient_id, None, None))
        .await
        .unwrap();
    assert_eq!(
        parse_ordinal("APT", &second.appointment_code),
        parse_ordinal("APT", &first.appointment_code).map(|n| n + 1)
    );

    // A deleted code is never handed out again.
    live.store.delete_appointment(second.id).await.unwrap();
    let third = live
        .store
        .create_appointment(booking(s.patient_id, None, None))
        .await
        .unwrap();
    assert_eq!(
        parse_ordinal("APT", &third.appointment_code),
        parse_ordinal("APT", &second.appointment_code).map(|n| n + 1)
    );

    let invoice = |total: i64| NewInvoice {
        patient_id: s.patient_id,
        appointment_id: None,
        total_amount: Decimal::from(total),
        discount: Decimal::ZERO,
        services: Vec::new(),
        notes: None,
        created_by: None,
    };
    let a = live.store.create_invoice(invoice(100)).await.unwrap();
    let b = live.store.create_invoice(invoice(200)).await.unwrap();
    assert_eq!(
        parse_ordinal("INV", &b.invoice_code),
        parse_ordinal("INV", &a.invoice_code).map(|n| n + 1)
    );
}

#[tokio::test]
async fn duplicates_are_conflicts() {
    let Some(live) = live().await else { return };

    let tag = unique();
    live.store.create_user(new_user(&tag, Role::Receptionist)).await.unwrap();
    let mut same_email = new_user(&unique(), Role::Receptionist);
    same_email.email = format!("live{}@clinic.test", tag);
    let err = live.store.create_user(same_email).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == "Username or email already exists");

    let phone = format!("07{}", unique());
    live.store.create_patient(new_patient(phone.clone())).await.unwrap();
    let err = live.store.create_patient(new_patient(phone)).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == "Phone number already exists");
}

#[tokio::test]
async fn unique_indexes_back_the_store_checks() {
    let Some(live) = live().await else { return };
    let s = seed(&live.store).await;
    let pool = sqlx::PgPool::connect(&live.url).await.unwrap();

    live.store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), None))
        .await
        .unwrap();

    // Writes that bypass the store are still stopped by the partial indexes.
    let raw = sqlx::query(
        "INSERT INTO appointments \
         (appointment_code, patient_id, doctor_id, appointment_date, appointment_time) \
         VALUES ($1, $2, $3, $4, $5)",
    )
    .bind(format!("RAW{}", unique()))
    .bind(s.patient_id)
    .bind(s.doctor_id)
    .bind(date())
    .bind(time(8, 0))
    .execute(&pool)
    .await
    .unwrap_err();
    assert_matches!(StoreError::from(raw), StoreError::Conflict(msg) if msg == SLOT_TAKEN);

    let seeded = live.store.find_patient(s.patient_id).await.unwrap().unwrap();
    let raw = sqlx::query(
        "INSERT INTO patients (patient_code, full_name, phone) VALUES ($1, $2, $3)",
    )
    .bind(format!("RAW{}", unique()))
    .bind("Raw Insert")
    .bind(&seeded.phone)
    .execute(&pool)
    .await
    .unwrap_err();
    assert_matches!(
        StoreError::from(raw),
        StoreError::Conflict(msg) if msg == "Phone number already exists"
    );

    pool.close().await;
}

#[tokio::test]
async fn deletes_are_blocked_by_dependents() {
    let Some(live) = live().await else { return };
    let s = seed(&live.store).await;

    let appointment = live
        .store
        .create_appointment(booking(s.patient_id, Some(s.doctor_id), Some(s.clinic_id)))
        .await
        .unwrap();

    let err = live.store.delete_patient(s.patient_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg.contains("appointments"));
    let err = live.store.delete_staff(s.doctor_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg.contains("appointments"));
    let err = live.store.delete_clinic(s.clinic_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg.contains("appointments"));

    live.store.delete_appointment(appointment.id).await.unwrap();
    live.store.delete_clinic(s.clinic_id).await.unwrap();
    live.store.delete_staff(s.doctor_id).await.unwrap();
    live.store.delete_patient(s.patient_id).await.unwrap();
    assert!(live.store.find_patient(s.patient_id).await.unwrap().is_none());
}
