// libs/payment-cell/src/models.rs
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::payment::{PaymentCategory, PaymentStatus, PaymentSubject};

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

/// Staff-recorded payment (e.g. a cash payment taken at the desk).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordPaymentRequest {
    pub amount: Decimal,
    pub category: PaymentCategory,
    pub subject: Option<PaymentSubject>,
    pub client_id: Option<Uuid>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdatePaymentStatusRequest {
    pub status: PaymentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentSearchQuery {
    pub client_id: Option<Uuid>,
    pub status: Option<PaymentStatus>,
    pub category: Option<PaymentCategory>,
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment not found")]
    NotFound,

    #[error("Not authorized: {0}")]
    PermissionDenied(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Payment cannot change status from {0}")]
    InvalidStatusTransition(PaymentStatus),

    #[error("Database error: {0}")]
    Database(String),
}
