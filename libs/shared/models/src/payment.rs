use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// A money movement record. Deposits ("signal" payments) are created
/// exclusively by the deposit issuer as a side effect of an appointment
/// transition and are never deleted automatically.
///
/// The linked resource is stored as the nullable
/// `related_resource_type`/`related_resource_id` column pair; use
/// [`Payment::subject`] for the typed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payment {
    pub id: Uuid,
    pub amount: Decimal,
    pub status: PaymentStatus,
    pub category: PaymentCategory,
    pub related_resource_type: Option<RelatedResourceType>,
    pub related_resource_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub issued_by_staff_id: Option<Uuid>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Typed view of the resource columns, so consumers match exhaustively
    /// instead of comparing strings.
    pub fn subject(&self) -> Option<PaymentSubject> {
        match (self.related_resource_type, self.related_resource_id) {
            (Some(RelatedResourceType::Appointment), Some(id)) => {
                Some(PaymentSubject::Appointment(id))
            }
            _ => None,
        }
    }

    /// Decompose a subject back into its column pair.
    pub fn subject_columns(
        subject: Option<PaymentSubject>,
    ) -> (Option<RelatedResourceType>, Option<Uuid>) {
        match subject {
            Some(PaymentSubject::Appointment(id)) => {
                (Some(RelatedResourceType::Appointment), Some(id))
            }
            None => (None, None),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Cancelled,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentCategory {
    Deposit,
    Manual,
    Session,
}

impl fmt::Display for PaymentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PaymentCategory::Deposit => write!(f, "deposit"),
            PaymentCategory::Manual => write!(f, "manual"),
            PaymentCategory::Session => write!(f, "session"),
        }
    }
}

/// Kind tag of the resource a payment is attached to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RelatedResourceType {
    Appointment,
}

/// What a payment is attached to. Serialized in API requests as a tagged
/// object; stored in rows as the resource column pair.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(
    tag = "related_resource_type",
    content = "related_resource_id",
    rename_all = "snake_case"
)]
pub enum PaymentSubject {
    Appointment(Uuid),
}
