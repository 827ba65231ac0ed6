// libs/shared/database/tests/memory_store_test.rs

use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;

use shared_database::store::*;
use shared_database::MemoryStore;
use shared_models::appointment::AppointmentStatus;
use shared_models::auth::Role;
use shared_models::billing::{DateRange, PaymentStatus};
use shared_models::directory::{MedicalRecordDetails, StaffStatus, StaffType};
use shared_models::response::PageRequest;

fn date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 7, day).unwrap()
}

fn time(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn new_patient(name: &str, phone: &str) -> NewPatient {
    NewPatient {
        full_name: name.to_string(),
        phone: phone.to_string(),
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

fn new_user(username: &str, role: Role) -> NewUser {
    NewUser {
        username: username.to_string(),
        email: format!("{}@clinic.test", username),
        password_hash: "hash".to_string(),
        role,
        is_active: true,
    }
}

fn new_staff(name: &str, phone: &str, staff_type: StaffType) -> NewStaff {
    NewStaff {
        full_name: name.to_string(),
        phone: phone.to_string(),
        address: None,
        date_of_birth: None,
        gender: None,
        citizen_id: None,
        staff_type,
        specialization: None,
        license_number: None,
        department_id: None,
        salary: None,
        hire_date: None,
        status: StaffStatus::Active,
    }
}

fn new_clinic(room: &str, floor: Option<i32>) -> NewClinic {
    NewClinic {
        room_number: room.to_string(),
        room_name: format!("Room {}", room),
        department_id: None,
        floor_number: floor,
        capacity: None,
        equipment: None,
        is_available: true,
    }
}

fn booking(patient_id: i64, doctor_id: Option<i64>, clinic_id: Option<i64>) -> NewAppointment {
    NewAppointment {
        patient_id,
        doctor_id,
        clinic_id,
        appointment_date: date(1),
        appointment_time: time(9, 30),
        status: AppointmentStatus::Pending,
        reason: None,
        symptoms: None,
        notes: None,
        created_by: None,
    }
}

fn new_invoice(patient_id: i64, total: i64, discount: i64) -> NewInvoice {
    NewInvoice {
        patient_id,
        appointment_id: None,
        total_amount: Decimal::from(total),
        discount: Decimal::from(discount),
        services: Vec::new(),
        notes: None,
        created_by: None,
    }
}

struct Fixture {
    store: MemoryStore,
    patient_id: i64,
    doctor_id: i64,
    clinic_id: i64,
}

async fn fixture() -> Fixture {
    let store = MemoryStore::new();
    let patient = store
        .create_patient(new_patient("Nguyen Van A", "0901234567"))
        .await
        .unwrap();
    let doctor = store
        .create_staff(
            new_user("dr.tran", Role::Doctor),
            new_staff("Tran Thi B", "0907654321", StaffType::Doctor),
        )
        .await
        .unwrap();
    let clinic = store.create_clinic(new_clinic("101", Some(1))).await.unwrap();

    Fixture {
        store,
        patient_id: patient.id,
        doctor_id: doctor.staff.id,
        clinic_id: clinic.clinic.id,
    }
}

#[tokio::test]
async fn seventh_patient_gets_sequential_code() {
    let store = MemoryStore::new();
    let mut last = None;
    for n in 0..7 {
        let patient = store
            .create_patient(new_patient(&format!("Patient {}", n), &format!("090000000{}", n)))
            .await
            .unwrap();
        last = Some(patient);
    }

    assert_eq!(last.unwrap().patient_code, "BN000007");
}

#[tokio::test]
async fn deleted_appointment_code_is_not_reissued() {
    let f = fixture().await;
    let first = f.store.create_appointment(booking(f.patient_id, None, None)).await.unwrap();
    let second = f.store.create_appointment(booking(f.patient_id, None, None)).await.unwrap();
    assert_eq!(first.appointment_code, "APT000001");
    assert_eq!(second.appointment_code, "APT000002");

    f.store.delete_appointment(first.id).await.unwrap();
    let third = f.store.create_appointment(booking(f.patient_id, None, None)).await.unwrap();
    assert_eq!(third.appointment_code, "APT000003");
}

#[tokio::test]
async fn duplicate_patient_phone_is_a_conflict() {
    let f = fixture().await;
    let err = f
        .store
        .create_patient(new_patient("Someone Else", "0901234567"))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == "Phone number already exists");
}

#[tokio::test]
async fn same_doctor_same_slot_is_rejected() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();

    let err = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg == SLOT_TAKEN);
}

#[tokio::test]
async fn rejected_booking_does_not_use_up_an_id() {
    let f = fixture().await;
    let first = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();
    f.store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap_err();

    let mut later = booking(f.patient_id, Some(f.doctor_id), None);
    later.appointment_time = time(10, 0);
    let second = f.store.create_appointment(later).await.unwrap();

    assert_eq!(second.id, first.id + 1);
    assert_eq!(second.appointment_code, "APT000002");
}

#[tokio::test]
async fn same_room_same_slot_is_rejected() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, None, Some(f.clinic_id)))
        .await
        .unwrap();

    let err = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), Some(f.clinic_id)))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(_));
}

#[tokio::test]
async fn cancelling_frees_the_slot() {
    let f = fixture().await;
    let first = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), Some(f.clinic_id)))
        .await
        .unwrap();

    let cancelled = f
        .store
        .cancel_appointment(first.id, Some("Patient called".to_string()))
        .await
        .unwrap();
    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    assert_eq!(cancelled.notes.as_deref(), Some("Patient called"));

    let rebooked = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), Some(f.clinic_id)))
        .await;
    assert!(rebooked.is_ok());
}

#[tokio::test]
async fn updating_an_appointment_in_place_is_not_a_conflict() {
    let f = fixture().await;
    let appointment = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();

    let updated = f
        .store
        .update_appointment(
            appointment.id,
            AppointmentChanges {
                status: Some(AppointmentStatus::Confirmed),
                reason: Some("Follow-up".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, AppointmentStatus::Confirmed);
    assert_eq!(updated.appointment_time, time(9, 30));
}

#[tokio::test]
async fn moving_onto_a_booked_slot_is_rejected() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();
    let mut later = booking(f.patient_id, Some(f.doctor_id), None);
    later.appointment_time = time(10, 0);
    let later = f.store.create_appointment(later).await.unwrap();

    let err = f
        .store
        .update_appointment(
            later.id,
            AppointmentChanges {
                appointment_time: Some(time(9, 30)),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Conflict(_));
}

#[tokio::test]
async fn unassigning_the_doctor_frees_their_slot() {
    let f = fixture().await;
    let first = f
        .store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), Some(f.clinic_id)))
        .await
        .unwrap();

    let updated = f
        .store
        .update_appointment(
            first.id,
            AppointmentChanges {
                doctor_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.doctor_id, None);
    assert_eq!(updated.clinic_id, Some(f.clinic_id));

    f.store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();
}

#[tokio::test]
async fn booking_with_a_non_doctor_fails() {
    let f = fixture().await;
    let nurse = f
        .store
        .create_staff(
            new_user("nurse.le", Role::Nurse),
            new_staff("Le Thi C", "0911111111", StaffType::Nurse),
        )
        .await
        .unwrap();

    let err = f
        .store
        .create_appointment(booking(f.patient_id, Some(nurse.staff.id), None))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound(msg) if msg == DOCTOR_NOT_FOUND);
}

#[tokio::test]
async fn patient_with_appointments_cannot_be_deleted() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, None, None))
        .await
        .unwrap();

    let err = f.store.delete_patient(f.patient_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(msg) if msg.contains("appointments"));
}

#[tokio::test]
async fn patient_delete_removes_medical_records() {
    let f = fixture().await;
    f.store
        .seed_medical_record(MedicalRecordDetails {
            id: 0,
            patient_id: f.patient_id,
            appointment_id: None,
            doctor_id: Some(f.doctor_id),
            diagnosis: Some("Flu".to_string()),
            treatment: None,
            prescription: None,
            notes: None,
            created_at: Utc::now(),
            appointment_date: None,
            appointment_time: None,
            doctor_name: None,
        })
        .await;
    assert_eq!(f.store.medical_history(f.patient_id).await.unwrap().len(), 1);

    f.store.delete_patient(f.patient_id).await.unwrap();
    assert!(f.store.find_patient(f.patient_id).await.unwrap().is_none());
    assert!(f.store.medical_history(f.patient_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn clinic_with_appointments_cannot_be_deleted() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, None, Some(f.clinic_id)))
        .await
        .unwrap();

    let err = f.store.delete_clinic(f.clinic_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(_));
}

#[tokio::test]
async fn deleting_staff_deactivates_the_account() {
    let f = fixture().await;
    let nurse = f
        .store
        .create_staff(
            new_user("nurse.pham", Role::Nurse),
            new_staff("Pham Van D", "0922222222", StaffType::Nurse),
        )
        .await
        .unwrap();
    let user_id = nurse.staff.user_id.unwrap();

    f.store.delete_staff(nurse.staff.id).await.unwrap();

    assert!(f.store.find_staff(nurse.staff.id).await.unwrap().is_none());
    let user = f.store.find_user_by_id(user_id).await.unwrap().unwrap();
    assert!(!user.is_active);
}

#[tokio::test]
async fn doctor_with_appointments_cannot_be_deleted() {
    let f = fixture().await;
    f.store
        .create_appointment(booking(f.patient_id, Some(f.doctor_id), None))
        .await
        .unwrap();

    let err = f.store.delete_staff(f.doctor_id).await.unwrap_err();
    assert_matches!(err, StoreError::Conflict(_));
}

#[tokio::test]
async fn payment_status_follows_paid_amount() {
    let f = fixture().await;
    let invoice = f.store.create_invoice(new_invoice(f.patient_id, 500, 50)).await.unwrap();
    assert_eq!(invoice.invoice_code, "INV000001");
    assert_eq!(invoice.payment_status, PaymentStatus::Unpaid);

    let partial = f
        .store
        .record_payment(
            invoice.id,
            PaymentUpdate {
                paid_amount: Some(Decimal::from(200)),
                payment_method: Some("cash".to_string()),
                payment_status: None,
            },
        )
        .await
        .unwrap();
    assert_eq!(partial.payment_status, PaymentStatus::Partial);

    let paid = f
        .store
        .record_payment(
            invoice.id,
            PaymentUpdate {
                paid_amount: Some(Decimal::from(450)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(paid.payment_status, PaymentStatus::Paid);
    assert_eq!(paid.payment_method.as_deref(), Some("cash"));
}

#[tokio::test]
async fn invoice_for_unknown_patient_is_not_found() {
    let store = MemoryStore::new();
    let err = store.create_invoice(new_invoice(42, 100, 0)).await.unwrap_err();
    assert_matches!(err, StoreError::NotFound(msg) if msg == PATIENT_NOT_FOUND);
}

#[tokio::test]
async fn revenue_stats_cover_todays_invoices() {
    let f = fixture().await;
    let first = f.store.create_invoice(new_invoice(f.patient_id, 500, 50)).await.unwrap();
    f.store.create_invoice(new_invoice(f.patient_id, 300, 0)).await.unwrap();
    f.store
        .record_payment(
            first.id,
            PaymentUpdate {
                paid_amount: Some(Decimal::from(450)),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let today = Utc::now().date_naive();
    let stats = f
        .store
        .revenue_stats(DateRange::new(Some(today), Some(today)))
        .await
        .unwrap();
    assert_eq!(stats.summary.total_invoices, 2);
    assert_eq!(stats.summary.net_revenue, Decimal::from(750));
    assert_eq!(stats.summary.total_outstanding, Decimal::from(300));

    let paid = stats
        .by_status
        .iter()
        .find(|entry| entry.payment_status == PaymentStatus::Paid)
        .unwrap();
    assert_eq!(paid.count, 1);
    assert_eq!(paid.amount, Decimal::from(450));

    let yesterday = today.pred_opt().unwrap();
    let empty = f
        .store
        .revenue_stats(DateRange::new(None, Some(yesterday)))
        .await
        .unwrap();
    assert_eq!(empty.summary.total_invoices, 0);
}

#[tokio::test]
async fn lists_paginate_with_totals() {
    let store = MemoryStore::new();
    for n in 0..12 {
        store
            .create_patient(new_patient(&format!("Patient {:02}", n), &format!("09100000{:02}", n)))
            .await
            .unwrap();
    }

    let (page, total) = store
        .list_patients(
            PatientFilter {
                sort_by: PatientSort::PatientCode,
                order: SortOrder::Asc,
                ..Default::default()
            },
            PageRequest::new(Some(2), Some(5)),
        )
        .await
        .unwrap();
    assert_eq!(total, 12);
    assert_eq!(page.len(), 5);
    assert_eq!(page[0].patient_code, "BN000006");

    let (found, total) = store
        .list_patients(
            PatientFilter {
                search: Some("patient 07".to_string()),
                ..Default::default()
            },
            PageRequest::default(),
        )
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(found[0].full_name, "Patient 07");
}

#[tokio::test]
async fn clinics_sort_by_floor_with_unknown_floor_last() {
    let store = MemoryStore::new();
    store.create_clinic(new_clinic("B1", None)).await.unwrap();
    store.create_clinic(new_clinic("201", Some(2))).await.unwrap();
    store.create_clinic(new_clinic("101", Some(1))).await.unwrap();

    let (clinics, _) = store
        .list_clinics(ClinicFilter::default(), PageRequest::default())
        .await
        .unwrap();
    let rooms: Vec<&str> = clinics.iter().map(|c| c.clinic.room_number.as_str()).collect();
    assert_eq!(rooms, vec!["101", "201", "B1"]);
}
