// libs/appointment-cell/src/models.rs
use chrono::{NaiveDate, NaiveTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::appointment::AppointmentStatus;

// ==============================================================================
// COLLABORATOR MODELS
// ==============================================================================

/// Read-only view of a staff professional, used for existence checks and for
/// naming them in deposit descriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Professional {
    pub id: Uuid,
    pub full_name: String,
    pub is_active: bool,
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Admin-created appointment: an open slot when no client is attached, a
/// scheduled booking otherwise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub professional_id: Uuid,
    pub client_id: Option<Uuid>,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestAppointmentRequest {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub notes: Option<String>,
}

/// Unauthenticated visitor request, identified by contact fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestRequestAppointmentRequest {
    pub professional_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub duration_minutes: i32,
    pub guest_name: String,
    pub guest_email: String,
    pub guest_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RespondToRequestRequest {
    pub decision: RequestDecision,
    pub total_cost: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RequestDecision {
    Accept,
    Reject,
}

/// Admin edit. `clear_client` detaches the current client (and resets the
/// financial fields); supplying `client_id` attaches one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub professional_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    #[serde(default)]
    pub clear_client: bool,
    pub date: Option<NaiveDate>,
    pub start_time: Option<NaiveTime>,
    pub duration_minutes: Option<i32>,
    pub status: Option<AppointmentStatus>,
    pub total_cost: Option<Decimal>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppointmentSearchQuery {
    pub professional_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Professional not found")]
    ProfessionalNotFound,

    #[error("Not authorized: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Slot conflicts with appointment {appointment_id} ({status})")]
    Conflict {
        appointment_id: Uuid,
        status: AppointmentStatus,
    },

    #[error("Slot is being booked by another caller, try again")]
    SlotContention,

    #[error("Appointment cannot be modified in current status: {0}")]
    InvalidStatusTransition(AppointmentStatus),

    #[error("Deposit issuance failed: {0}")]
    DepositIssuance(String),

    #[error("Database error: {0}")]
    Database(String),
}
