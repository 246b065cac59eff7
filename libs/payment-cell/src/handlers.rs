// libs/payment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::extractor::caller_from_user;

use crate::models::{
    PaymentError, PaymentSearchQuery, RecordPaymentRequest, UpdatePaymentStatusRequest,
};
use crate::services::payments::PaymentService;

fn map_payment_error(e: PaymentError) -> AppError {
    match e {
        PaymentError::NotFound => AppError::NotFound("Payment not found".to_string()),
        PaymentError::PermissionDenied(msg) => AppError::Forbidden(msg),
        PaymentError::Validation(msg) => AppError::ValidationError(msg),
        PaymentError::InvalidStatusTransition(status) => {
            AppError::BadRequest(format!("Payment cannot change status from {}", status))
        }
        PaymentError::Database(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn list_payments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<PaymentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = PaymentService::new(&state);

    let payments = service
        .list_payments(caller, query, auth.token())
        .await
        .map_err(map_payment_error)?;

    let count = payments.len();
    Ok(Json(json!({
        "payments": payments,
        "count": count,
    })))
}

#[axum::debug_handler]
pub async fn get_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = PaymentService::new(&state);

    let payment = service
        .get_payment(caller, payment_id, auth.token())
        .await
        .map_err(map_payment_error)?;

    Ok(Json(json!({ "payment": payment })))
}

#[axum::debug_handler]
pub async fn record_payment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = PaymentService::new(&state);

    let payment = service
        .record_payment(caller, request, auth.token())
        .await
        .map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
    })))
}

/// Status update endpoint; marking a deposit paid here is what drives the
/// linked appointment to `confirmed`.
#[axum::debug_handler]
pub async fn update_payment_status(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(payment_id): Path<Uuid>,
    Json(request): Json<UpdatePaymentStatusRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = PaymentService::new(&state);

    let payment = service
        .update_payment_status(caller, payment_id, request.status, auth.token())
        .await
        .map_err(map_payment_error)?;

    Ok(Json(json!({
        "success": true,
        "payment": payment,
    })))
}
