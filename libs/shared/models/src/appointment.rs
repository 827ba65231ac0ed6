use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    #[default]
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 5] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
        AppointmentStatus::NoShow,
    ];

    /// Statuses that no longer hold their slot.
    pub const RELEASED: [AppointmentStatus; 2] =
        [AppointmentStatus::Cancelled, AppointmentStatus::NoShow];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn is_active(&self) -> bool {
        !Self::RELEASED.contains(self)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown appointment status: {}", s))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub appointment_code: String,
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
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn slot(&self) -> Slot {
        Slot {
            date: self.appointment_date,
            time: self.appointment_time,
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
        }
    }

    /// Whether this appointment blocks `slot` for anyone other than itself.
    pub fn blocks(&self, slot: &Slot, exclude_id: Option<i64>) -> bool {
        exclude_id != Some(self.id) && self.status.is_active() && self.slot().collides_with(slot)
    }
}

/// A fixed (date, time) booking held by a doctor and/or a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub doctor_id: Option<i64>,
    pub clinic_id: Option<i64>,
}

impl Slot {
    /// Exact date and time equality, plus a shared doctor or a shared room.
    /// An absent doctor or room never matches another absent one.
    pub fn collides_with(&self, other: &Slot) -> bool {
        if self.date != other.date || self.time != other.time {
            return false;
        }

        let same_doctor = matches!((self.doctor_id, other.doctor_id), (Some(a), Some(b)) if a == b);
        let same_clinic = matches!((self.clinic_id, other.clinic_id), (Some(a), Some(b)) if a == b);

        same_doctor || same_clinic
    }
}

/// Appointment joined with the names shown in listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentDetails {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub patient_name: Option<String>,
    pub patient_phone: Option<String>,
    pub patient_code: Option<String>,
    pub doctor_name: Option<String>,
    pub room_number: Option<String>,
    pub room_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(doctor_id: Option<i64>, clinic_id: Option<i64>) -> Slot {
        Slot {
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
            doctor_id,
            clinic_id,
        }
    }

    fn appointment(id: i64, status: AppointmentStatus, doctor_id: Option<i64>) -> Appointment {
        let s = slot(doctor_id, None);
        Appointment {
            id,
            appointment_code: format!("APT{:06}", id),
            patient_id: 1,
            doctor_id,
            clinic_id: None,
            appointment_date: s.date,
            appointment_time: s.time,
            status,
            reason: None,
            symptoms: None,
            notes: None,
            created_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn released_statuses_are_inactive() {
        assert!(AppointmentStatus::Pending.is_active());
        assert!(AppointmentStatus::Confirmed.is_active());
        assert!(AppointmentStatus::Completed.is_active());
        assert!(!AppointmentStatus::Cancelled.is_active());
        assert!(!AppointmentStatus::NoShow.is_active());
    }

    #[test]
    fn status_parses_snake_case() {
        assert_eq!("no_show".parse::<AppointmentStatus>(), Ok(AppointmentStatus::NoShow));
        assert!("noshow".parse::<AppointmentStatus>().is_err());
    }

    #[test]
    fn same_doctor_or_room_collides() {
        assert!(slot(Some(1), None).collides_with(&slot(Some(1), Some(9))));
        assert!(slot(Some(1), Some(3)).collides_with(&slot(Some(2), Some(3))));
        assert!(!slot(Some(1), Some(3)).collides_with(&slot(Some(2), Some(4))));
    }

    #[test]
    fn missing_references_never_collide() {
        assert!(!slot(None, None).collides_with(&slot(None, None)));
        assert!(!slot(Some(1), None).collides_with(&slot(None, Some(1))));
    }

    #[test]
    fn different_time_does_not_collide() {
        let mut later = slot(Some(1), None);
        later.time = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(!slot(Some(1), None).collides_with(&later));
    }

    #[test]
    fn cancelled_and_self_do_not_block() {
        let requested = slot(Some(5), None);
        assert!(appointment(1, AppointmentStatus::Confirmed, Some(5)).blocks(&requested, None));
        assert!(!appointment(1, AppointmentStatus::Cancelled, Some(5)).blocks(&requested, None));
        assert!(!appointment(1, AppointmentStatus::Confirmed, Some(5)).blocks(&requested, Some(1)));
    }
}
