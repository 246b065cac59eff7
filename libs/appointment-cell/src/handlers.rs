// libs/appointment-cell/src/handlers.rs
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
    AppointmentError, AppointmentSearchQuery, CreateAppointmentRequest,
    GuestRequestAppointmentRequest, RequestAppointmentRequest, RespondToRequestRequest,
    UpdateAppointmentRequest,
};
use crate::services::scheduling::AppointmentSchedulingService;

fn map_appointment_error(e: AppointmentError) -> AppError {
    match e {
        AppointmentError::NotFound => AppError::NotFound("Appointment not found".to_string()),
        AppointmentError::ProfessionalNotFound => {
            AppError::NotFound("Professional not found".to_string())
        }
        AppointmentError::PermissionDenied(msg) => AppError::Forbidden(msg),
        AppointmentError::Validation(msg) => AppError::ValidationError(msg),
        AppointmentError::Conflict {
            appointment_id,
            status,
        } => AppError::Conflict(format!(
            "Time slot conflicts with appointment {} ({})",
            appointment_id, status
        )),
        AppointmentError::SlotContention => {
            AppError::Conflict("Slot is being booked by another caller, try again".to_string())
        }
        AppointmentError::InvalidStatusTransition(status) => AppError::BadRequest(format!(
            "Appointment cannot be modified in current status: {}",
            status
        )),
        AppointmentError::DepositIssuance(msg) => {
            AppError::Internal(format!("Deposit issuance failed: {}", msg))
        }
        AppointmentError::Database(msg) => AppError::Database(msg),
    }
}

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .create_appointment(caller, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn request_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Json(request): Json<RequestAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .request_appointment(caller, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

/// Public endpoint: visitors without an account request a slot by leaving
/// their contact details.
#[axum::debug_handler]
pub async fn guest_request_appointment(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<GuestRequestAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .guest_request_appointment(request)
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn respond_to_request(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<RespondToRequestRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .respond_to_request(caller, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Query(query): Query<AppointmentSearchQuery>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointments = service
        .list_appointments(caller, query, auth.token())
        .await
        .map_err(map_appointment_error)?;

    let count = appointments.len();
    Ok(Json(json!({
        "appointments": appointments,
        "count": count,
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .get_appointment(caller, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({ "appointment": appointment })))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .update_appointment(caller, appointment_id, request, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    service
        .delete_appointment(caller, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "deleted": appointment_id,
    })))
}

#[axum::debug_handler]
pub async fn book_slot(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .client_book_slot(caller, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}

#[axum::debug_handler]
pub async fn cancel_booking(
    State(state): State<Arc<AppConfig>>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Extension(user): Extension<User>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let caller = caller_from_user(&user)?;
    let service = AppointmentSchedulingService::new(&state);

    let appointment = service
        .client_cancel_booking(caller, appointment_id, auth.token())
        .await
        .map_err(map_appointment_error)?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
    })))
}
