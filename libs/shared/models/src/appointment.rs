use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A bookable time slot between a professional and a client (or guest).
///
/// `client_id = None` together with `status = Available` marks an open slot
/// that a client may claim. Guest contact fields are only populated when no
/// registered client is attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub professional_id: Uuid,
    pub client_id: Option<Uuid>,
    pub guest_name: Option<String>,
    pub guest_email: Option<String>,
    pub guest_phone: Option<String>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub status: AppointmentStatus,
    pub total_cost: Option<Decimal>,
    pub signal_paid: bool,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn start_at(&self) -> NaiveDateTime {
        self.date.and_time(self.start_time)
    }

    /// Exclusive end of the slot window. Computed on the full datetime so a
    /// slot ending past midnight does not wrap around.
    pub fn end_at(&self) -> NaiveDateTime {
        self.start_at() + chrono::Duration::minutes(self.duration_minutes as i64)
    }

    pub fn is_open_slot(&self) -> bool {
        self.status == AppointmentStatus::Available && self.client_id.is_none()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Available,
    PendingStaffApproval,
    Scheduled,
    Confirmed,
    RejectedByStaff,
    CancelledByClient,
    CancelledByStaff,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Statuses that block the professional's calendar. Completed and no-show
    /// appointments keep occupying their historical slot.
    pub const OCCUPYING: [AppointmentStatus; 5] = [
        AppointmentStatus::PendingStaffApproval,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
    ];

    pub fn is_occupying(&self) -> bool {
        Self::OCCUPYING.contains(self)
    }

    /// Terminal statuses admit no further lifecycle transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AppointmentStatus::RejectedByStaff
                | AppointmentStatus::CancelledByClient
                | AppointmentStatus::CancelledByStaff
                | AppointmentStatus::Completed
                | AppointmentStatus::NoShow
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Available => "available",
            AppointmentStatus::PendingStaffApproval => "pending_staff_approval",
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::RejectedByStaff => "rejected_by_staff",
            AppointmentStatus::CancelledByClient => "cancelled_by_client",
            AppointmentStatus::CancelledByStaff => "cancelled_by_staff",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// PostgREST `status=in.(...)` filter value for the occupying set.
    pub fn occupying_filter() -> String {
        Self::OCCUPYING
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn occupying_set_matches_terminal_overlap() {
        // completed and no_show are both occupying and terminal
        assert!(AppointmentStatus::Completed.is_occupying());
        assert!(AppointmentStatus::Completed.is_terminal());
        assert!(AppointmentStatus::NoShow.is_occupying());
        assert!(AppointmentStatus::NoShow.is_terminal());

        // available and cancelled/rejected never occupy the calendar
        assert!(!AppointmentStatus::Available.is_occupying());
        assert!(!AppointmentStatus::CancelledByClient.is_occupying());
        assert!(!AppointmentStatus::CancelledByStaff.is_occupying());
        assert!(!AppointmentStatus::RejectedByStaff.is_occupying());
    }

    #[test]
    fn occupying_filter_is_stable() {
        assert_eq!(
            AppointmentStatus::occupying_filter(),
            "pending_staff_approval,scheduled,confirmed,completed,no_show"
        );
    }

    #[test]
    fn end_at_does_not_wrap_past_midnight() {
        let appointment = Appointment {
            id: Uuid::new_v4(),
            professional_id: Uuid::new_v4(),
            client_id: None,
            guest_name: None,
            guest_email: None,
            guest_phone: None,
            date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
            start_time: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
            duration_minutes: 60,
            status: AppointmentStatus::Available,
            total_cost: None,
            signal_paid: false,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert!(appointment.end_at() > appointment.start_at());
        assert_eq!(
            appointment.end_at().date(),
            NaiveDate::from_ymd_opt(2025, 1, 11).unwrap()
        );
    }
}
