// libs/appointment-cell/src/services/scheduling.rs
use chrono::Utc;
use regex::Regex;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use payment_cell::services::deposit::DepositIssueService;
use shared_config::AppConfig;
use shared_database::outbox::NotificationOutbox;
use shared_database::supabase::SupabaseClient;
use shared_models::appointment::{Appointment, AppointmentStatus};
use shared_models::auth::{Caller, Role};

use crate::models::{
    AppointmentError, AppointmentSearchQuery, CreateAppointmentRequest,
    GuestRequestAppointmentRequest, Professional, RequestAppointmentRequest, RequestDecision,
    RespondToRequestRequest, UpdateAppointmentRequest,
};
use crate::services::conflict::ConflictDetectionService;
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockService;

/// Orchestrates the appointment lifecycle: role/ownership guards, slot
/// locking, conflict detection, persistence, deposit issuance and outbound
/// notifications, in that order.
pub struct AppointmentSchedulingService {
    supabase: Arc<SupabaseClient>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    lock_service: SlotLockService,
    deposit_service: DepositIssueService,
    outbox: NotificationOutbox,
}

impl AppointmentSchedulingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));

        Self {
            conflict_service: ConflictDetectionService::new(Arc::clone(&supabase)),
            lifecycle_service: AppointmentLifecycleService::new(),
            lock_service: SlotLockService::new(Arc::clone(&supabase)),
            deposit_service: DepositIssueService::new(Arc::clone(&supabase)),
            outbox: NotificationOutbox::new(Arc::clone(&supabase)),
            supabase,
        }
    }

    // ==========================================================================
    // CREATE PATHS
    // ==========================================================================

    /// Admin-created appointment: an open slot, or a scheduled booking when a
    /// client is attached (which then owes a deposit).
    pub async fn create_appointment(
        &self,
        caller: Caller,
        request: CreateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !caller.is_admin() {
            return Err(AppointmentError::PermissionDenied(
                "Only admins may create appointments directly".to_string(),
            ));
        }

        validate_duration(request.duration_minutes)?;

        let status = if request.client_id.is_some() {
            require_positive_cost(request.total_cost)?;
            AppointmentStatus::Scheduled
        } else {
            AppointmentStatus::Available
        };

        let professional = self
            .get_professional(request.professional_id, Some(auth_token))
            .await?;

        let lock_key = self
            .lock_service
            .acquire(request.professional_id, request.date)
            .await?;

        let outcome = async {
            if let Some(existing) = self
                .conflict_service
                .find_conflict(
                    request.professional_id,
                    request.date,
                    request.start_time,
                    request.duration_minutes,
                    None,
                    Some(auth_token),
                )
                .await?
            {
                return Err(conflict_error(&existing));
            }

            let appointment = Appointment {
                id: Uuid::new_v4(),
                professional_id: request.professional_id,
                client_id: request.client_id,
                guest_name: None,
                guest_email: None,
                guest_phone: None,
                date: request.date,
                start_time: request.start_time,
                duration_minutes: request.duration_minutes,
                status,
                total_cost: request.total_cost,
                signal_paid: false,
                notes: request.notes.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };

            let created = self.insert_appointment(&appointment, Some(auth_token)).await?;

            // A freshly scheduled booking owes its deposit immediately.
            if created.status == AppointmentStatus::Scheduled {
                self.issue_deposit_for(&created, &professional, Some(caller.id), auth_token)
                    .await?;
            }

            Ok(created)
        }
        .await;

        self.release_lock(&lock_key).await;

        let created = outcome?;
        info!("Appointment {} created by admin {}", created.id, caller.id);

        self.outbox
            .publish(
                "appointment_created",
                created.client_id,
                json!({ "appointment_id": created.id, "professional_id": created.professional_id }),
            )
            .await;

        Ok(created)
    }

    /// Client-initiated request, held for staff approval.
    pub async fn request_appointment(
        &self,
        caller: Caller,
        request: RequestAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if caller.role != Role::Client {
            return Err(AppointmentError::PermissionDenied(
                "Only clients may request appointments".to_string(),
            ));
        }

        validate_duration(request.duration_minutes)?;

        self.get_professional(request.professional_id, Some(auth_token))
            .await?;

        let lock_key = self
            .lock_service
            .acquire(request.professional_id, request.date)
            .await?;

        let outcome = async {
            if let Some(existing) = self
                .conflict_service
                .find_conflict(
                    request.professional_id,
                    request.date,
                    request.start_time,
                    request.duration_minutes,
                    None,
                    Some(auth_token),
                )
                .await?
            {
                return Err(conflict_error(&existing));
            }

            // The caller may not hold another active booking over this window.
            if let Some(own) = self
                .conflict_service
                .find_client_conflict(
                    caller.id,
                    request.date,
                    request.start_time,
                    request.duration_minutes,
                    None,
                    Some(auth_token),
                )
                .await?
            {
                return Err(conflict_error(&own));
            }

            let appointment = Appointment {
                id: Uuid::new_v4(),
                professional_id: request.professional_id,
                client_id: Some(caller.id),
                guest_name: None,
                guest_email: None,
                guest_phone: None,
                date: request.date,
                start_time: request.start_time,
                duration_minutes: request.duration_minutes,
                status: AppointmentStatus::PendingStaffApproval,
                total_cost: None,
                signal_paid: false,
                notes: request.notes.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };

            self.insert_appointment(&appointment, Some(auth_token)).await
        }
        .await;

        self.release_lock(&lock_key).await;

        let created = outcome?;
        info!(
            "Appointment request {} submitted by client {}",
            created.id, caller.id
        );

        self.outbox
            .publish(
                "appointment_requested",
                Some(created.professional_id),
                json!({ "appointment_id": created.id }),
            )
            .await;

        Ok(created)
    }

    /// Visitor-initiated request; identified by contact fields, no account.
    pub async fn guest_request_appointment(
        &self,
        request: GuestRequestAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        validate_duration(request.duration_minutes)?;

        if request.guest_name.trim().is_empty() {
            return Err(AppointmentError::Validation(
                "Guest name is required".to_string(),
            ));
        }
        validate_email(&request.guest_email)?;

        self.get_professional(request.professional_id, None).await?;

        let lock_key = self
            .lock_service
            .acquire(request.professional_id, request.date)
            .await?;

        let outcome = async {
            if let Some(existing) = self
                .conflict_service
                .find_conflict(
                    request.professional_id,
                    request.date,
                    request.start_time,
                    request.duration_minutes,
                    None,
                    None,
                )
                .await?
            {
                return Err(conflict_error(&existing));
            }

            let appointment = Appointment {
                id: Uuid::new_v4(),
                professional_id: request.professional_id,
                client_id: None,
                guest_name: Some(request.guest_name.clone()),
                guest_email: Some(request.guest_email.clone()),
                guest_phone: request.guest_phone.clone(),
                date: request.date,
                start_time: request.start_time,
                duration_minutes: request.duration_minutes,
                status: AppointmentStatus::PendingStaffApproval,
                total_cost: None,
                signal_paid: false,
                notes: request.notes.clone(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            };

            self.insert_appointment(&appointment, None).await
        }
        .await;

        self.release_lock(&lock_key).await;

        let created = outcome?;
        info!("Guest appointment request {} submitted", created.id);

        self.outbox
            .publish(
                "appointment_requested",
                Some(created.professional_id),
                json!({ "appointment_id": created.id, "guest": true }),
            )
            .await;

        Ok(created)
    }

    // ==========================================================================
    // STAFF DECISIONS
    // ==========================================================================

    /// Approve or reject a pending request. Approval re-checks the slot
    /// (excluding the request itself) and issues the deposit.
    pub async fn respond_to_request(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        request: RespondToRequestRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load_appointment(appointment_id, Some(auth_token)).await?;

        if appointment.status != AppointmentStatus::PendingStaffApproval {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let is_own_calendar =
            caller.role == Role::Professional && caller.id == appointment.professional_id;
        if !caller.is_admin() && !is_own_calendar {
            return Err(AppointmentError::PermissionDenied(
                "Only the professional or an admin may respond to this request".to_string(),
            ));
        }

        match request.decision {
            RequestDecision::Reject => {
                self.lifecycle_service.validate_status_transition(
                    appointment.status,
                    AppointmentStatus::RejectedByStaff,
                )?;

                let updated = self
                    .patch_appointment(
                        appointment_id,
                        json!({
                            "status": AppointmentStatus::RejectedByStaff,
                            "updated_at": Utc::now().to_rfc3339(),
                        }),
                        Some(auth_token),
                    )
                    .await?;

                info!("Request {} rejected by {}", appointment_id, caller.id);

                self.outbox
                    .publish(
                        "appointment_rejected",
                        updated.client_id,
                        json!({ "appointment_id": updated.id }),
                    )
                    .await;

                Ok(updated)
            }
            RequestDecision::Accept => {
                let total_cost = request.total_cost.or(appointment.total_cost);
                require_positive_cost(total_cost)?;

                self.lifecycle_service.validate_status_transition(
                    appointment.status,
                    AppointmentStatus::Scheduled,
                )?;

                let professional = self
                    .get_professional(appointment.professional_id, Some(auth_token))
                    .await?;

                let lock_key = self
                    .lock_service
                    .acquire(appointment.professional_id, appointment.date)
                    .await?;

                let outcome = async {
                    // Another booking may have landed since the request came in.
                    if let Some(existing) = self
                        .conflict_service
                        .find_conflict(
                            appointment.professional_id,
                            appointment.date,
                            appointment.start_time,
                            appointment.duration_minutes,
                            Some(appointment.id),
                            Some(auth_token),
                        )
                        .await?
                    {
                        return Err(conflict_error(&existing));
                    }

                    let updated = self
                        .patch_appointment(
                            appointment_id,
                            json!({
                                "status": AppointmentStatus::Scheduled,
                                "total_cost": total_cost,
                                "updated_at": Utc::now().to_rfc3339(),
                            }),
                            Some(auth_token),
                        )
                        .await?;

                    self.issue_deposit_for(&updated, &professional, Some(caller.id), auth_token)
                        .await?;

                    Ok(updated)
                }
                .await;

                self.release_lock(&lock_key).await;

                let updated = outcome?;
                info!("Request {} approved by {}", appointment_id, caller.id);

                self.outbox
                    .publish(
                        "appointment_approved",
                        updated.client_id,
                        json!({ "appointment_id": updated.id }),
                    )
                    .await;

                Ok(updated)
            }
        }
    }

    // ==========================================================================
    // CLIENT SLOT ACTIONS
    // ==========================================================================

    /// A client claims an open slot.
    pub async fn client_book_slot(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if caller.role != Role::Client {
            return Err(AppointmentError::PermissionDenied(
                "Only clients may book open slots".to_string(),
            ));
        }

        let appointment = self.load_appointment(appointment_id, Some(auth_token)).await?;

        // Only an unclaimed open slot may be taken.
        if !appointment.is_open_slot() {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        self.lifecycle_service
            .validate_status_transition(appointment.status, AppointmentStatus::Scheduled)?;

        let professional = self
            .get_professional(appointment.professional_id, Some(auth_token))
            .await?;

        let lock_key = self
            .lock_service
            .acquire(appointment.professional_id, appointment.date)
            .await?;

        let outcome = async {
            // An open slot does not occupy the calendar, so an approved
            // request may have landed on top of it since it was published.
            if let Some(existing) = self
                .conflict_service
                .find_conflict(
                    appointment.professional_id,
                    appointment.date,
                    appointment.start_time,
                    appointment.duration_minutes,
                    Some(appointment.id),
                    Some(auth_token),
                )
                .await?
            {
                return Err(conflict_error(&existing));
            }

            if let Some(own) = self
                .conflict_service
                .find_client_conflict(
                    caller.id,
                    appointment.date,
                    appointment.start_time,
                    appointment.duration_minutes,
                    Some(appointment.id),
                    Some(auth_token),
                )
                .await?
            {
                return Err(conflict_error(&own));
            }

            let updated = self
                .patch_appointment(
                    appointment_id,
                    json!({
                        "client_id": caller.id,
                        "status": AppointmentStatus::Scheduled,
                        "updated_at": Utc::now().to_rfc3339(),
                    }),
                    Some(auth_token),
                )
                .await?;

            if updated.total_cost.unwrap_or(Decimal::ZERO) > Decimal::ZERO {
                self.issue_deposit_for(&updated, &professional, None, auth_token)
                    .await?;
            }

            Ok(updated)
        }
        .await;

        self.release_lock(&lock_key).await;

        let updated = outcome?;
        info!("Slot {} booked by client {}", appointment_id, caller.id);

        self.outbox
            .publish(
                "slot_booked",
                Some(updated.professional_id),
                json!({ "appointment_id": updated.id }),
            )
            .await;

        Ok(updated)
    }

    /// Client cancellation. An unpaid booking frees the slot back to
    /// `available`; a paid one is closed as `cancelled_by_client` and the
    /// deposit is deliberately left untouched.
    pub async fn client_cancel_booking(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load_appointment(appointment_id, Some(auth_token)).await?;

        if appointment.client_id != Some(caller.id) {
            return Err(AppointmentError::PermissionDenied(
                "Only the booked client may cancel this appointment".to_string(),
            ));
        }

        if !matches!(
            appointment.status,
            AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
        ) {
            return Err(AppointmentError::InvalidStatusTransition(appointment.status));
        }

        let updated = if appointment.signal_paid {
            self.lifecycle_service.validate_status_transition(
                appointment.status,
                AppointmentStatus::CancelledByClient,
            )?;

            self.patch_appointment(
                appointment_id,
                json!({
                    "status": AppointmentStatus::CancelledByClient,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                Some(auth_token),
            )
            .await?
        } else {
            self.lifecycle_service
                .validate_status_transition(appointment.status, AppointmentStatus::Available)?;

            // A pending deposit dies with the booking.
            self.deposit_service
                .cancel_pending_deposit(appointment_id, auth_token)
                .await
                .map_err(|e| AppointmentError::DepositIssuance(e.to_string()))?;

            self.patch_appointment(
                appointment_id,
                json!({
                    "status": AppointmentStatus::Available,
                    "client_id": Value::Null,
                    "total_cost": Value::Null,
                    "signal_paid": false,
                    "updated_at": Utc::now().to_rfc3339(),
                }),
                Some(auth_token),
            )
            .await?
        };

        info!(
            "Appointment {} cancelled by client {} (now {})",
            appointment_id, caller.id, updated.status
        );

        self.outbox
            .publish(
                "appointment_cancelled",
                Some(updated.professional_id),
                json!({ "appointment_id": updated.id, "by": "client" }),
            )
            .await;

        Ok(updated)
    }

    // ==========================================================================
    // ADMIN EDITS
    // ==========================================================================

    /// Admin field edit with status recalculation. Moving the slot re-runs
    /// conflict detection against everyone but the appointment itself.
    pub async fn update_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if !caller.is_admin() {
            return Err(AppointmentError::PermissionDenied(
                "Only admins may update appointments".to_string(),
            ));
        }

        let current = self.load_appointment(appointment_id, Some(auth_token)).await?;

        if request.clear_client && request.client_id.is_some() {
            return Err(AppointmentError::Validation(
                "Cannot clear and attach a client in the same update".to_string(),
            ));
        }

        // Merge target slot fields.
        let professional_id = request.professional_id.unwrap_or(current.professional_id);
        let date = request.date.unwrap_or(current.date);
        let start_time = request.start_time.unwrap_or(current.start_time);
        let duration_minutes = request.duration_minutes.unwrap_or(current.duration_minutes);
        validate_duration(duration_minutes)?;

        if request.professional_id.is_some() && professional_id != current.professional_id {
            self.get_professional(professional_id, Some(auth_token)).await?;
        }

        let slot_moved = professional_id != current.professional_id
            || date != current.date
            || start_time != current.start_time
            || duration_minutes != current.duration_minutes;

        let mut patch = json!({
            "professional_id": professional_id,
            "date": date,
            "start_time": start_time,
            "duration_minutes": duration_minutes,
            "updated_at": Utc::now().to_rfc3339(),
        });
        if let Some(notes) = &request.notes {
            patch["notes"] = json!(notes);
        }
        if let Some(total_cost) = request.total_cost {
            patch["total_cost"] = json!(total_cost);
        }

        // Field-diff status rules.
        let mut new_status = current.status;
        if request.clear_client {
            patch["client_id"] = Value::Null;
            patch["total_cost"] = Value::Null;
            patch["signal_paid"] = json!(false);
            if matches!(
                current.status,
                AppointmentStatus::Scheduled | AppointmentStatus::Confirmed
            ) {
                new_status = AppointmentStatus::Available;
            }
        } else if let Some(client_id) = request.client_id {
            patch["client_id"] = json!(client_id);
            if current.client_id.is_none() && current.status == AppointmentStatus::Available {
                let cost = request.total_cost.or(current.total_cost);
                require_positive_cost(cost)?;
                new_status = AppointmentStatus::Scheduled;
            }
        }

        if let Some(requested_status) = request.status {
            if requested_status != current.status {
                // Confirmation is driven by the deposit settling, never set
                // directly on an unpaid booking.
                if requested_status == AppointmentStatus::Confirmed && !current.signal_paid {
                    return Err(AppointmentError::Validation(
                        "Appointments are confirmed by paying the deposit".to_string(),
                    ));
                }
                self.lifecycle_service
                    .validate_status_transition(current.status, requested_status)?;
                new_status = requested_status;
            }
        }

        if new_status != current.status {
            patch["status"] = json!(new_status);
        }

        // Re-check the calendar whenever the row will occupy a window it did
        // not occupy before: either the slot moved, or a non-occupying row
        // (e.g. an open slot gaining a client) becomes occupying.
        let needs_conflict_check = new_status.is_occupying()
            && (slot_moved || !current.status.is_occupying());

        let lock_key = if needs_conflict_check {
            Some(self.lock_service.acquire(professional_id, date).await?)
        } else {
            None
        };

        let outcome = async {
            if needs_conflict_check {
                if let Some(existing) = self
                    .conflict_service
                    .find_conflict(
                        professional_id,
                        date,
                        start_time,
                        duration_minutes,
                        Some(appointment_id),
                        Some(auth_token),
                    )
                    .await?
                {
                    return Err(conflict_error(&existing));
                }
            }

            if request.clear_client {
                // An orphaned pending deposit would never be payable.
                self.deposit_service
                    .cancel_pending_deposit(appointment_id, auth_token)
                    .await
                    .map_err(|e| AppointmentError::DepositIssuance(e.to_string()))?;
            }

            let updated = self
                .patch_appointment(appointment_id, patch, Some(auth_token))
                .await?;

            if updated.status == AppointmentStatus::Scheduled
                && updated.client_id.is_some()
                && updated.total_cost.unwrap_or(Decimal::ZERO) > Decimal::ZERO
            {
                let professional = self
                    .get_professional(updated.professional_id, Some(auth_token))
                    .await?;
                self.issue_deposit_for(&updated, &professional, Some(caller.id), auth_token)
                    .await?;
            }

            Ok(updated)
        }
        .await;

        if let Some(lock_key) = lock_key {
            self.release_lock(&lock_key).await;
        }

        let updated = outcome?;
        info!("Appointment {} updated by admin {}", appointment_id, caller.id);

        self.outbox
            .publish(
                "appointment_updated",
                updated.client_id,
                json!({ "appointment_id": updated.id }),
            )
            .await;

        Ok(updated)
    }

    /// Admin-only removal. The deposit payment record is kept for audit.
    pub async fn delete_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        if !caller.is_admin() {
            return Err(AppointmentError::PermissionDenied(
                "Only admins may delete appointments".to_string(),
            ));
        }

        // Confirm it exists so deletion of a stale id surfaces as not-found.
        self.load_appointment(appointment_id, Some(auth_token)).await?;

        let _response: Value = self
            .supabase
            .request(
                Method::DELETE,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        info!("Appointment {} deleted by admin {}", appointment_id, caller.id);
        Ok(())
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    /// List with role-dependent visibility: admins see everything, everyone
    /// else sees their own calendar plus open slots.
    pub async fn list_appointments(
        &self,
        caller: Caller,
        query: AppointmentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let mut filters = Vec::new();

        if let Some(professional_id) = query.professional_id {
            filters.push(format!("professional_id=eq.{}", professional_id));
        }
        if let Some(client_id) = query.client_id {
            filters.push(format!("client_id=eq.{}", client_id));
        }
        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(from_date) = query.from_date {
            filters.push(format!("date=gte.{}", from_date));
        }
        if let Some(to_date) = query.to_date {
            filters.push(format!("date=lte.{}", to_date));
        }

        match caller.role {
            Role::Admin => {}
            Role::Professional => {
                filters.push(format!(
                    "or=(professional_id.eq.{},status.eq.available)",
                    caller.id
                ));
            }
            Role::Client => {
                filters.push(format!("or=(client_id.eq.{},status.eq.available)", caller.id));
            }
        }

        filters.push("order=date.asc,start_time.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", filters.join("&"));

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))
    }

    pub async fn get_appointment(
        &self,
        caller: Caller,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load_appointment(appointment_id, Some(auth_token)).await?;

        let visible = match caller.role {
            Role::Admin => true,
            Role::Professional => {
                appointment.professional_id == caller.id
                    || appointment.status == AppointmentStatus::Available
            }
            Role::Client => {
                appointment.client_id == Some(caller.id)
                    || appointment.status == AppointmentStatus::Available
            }
        };

        if !visible {
            return Err(AppointmentError::PermissionDenied(
                "Not authorized to view this appointment".to_string(),
            ));
        }

        Ok(appointment)
    }

    // ==========================================================================
    // PRIVATE HELPERS
    // ==========================================================================

    async fn issue_deposit_for(
        &self,
        appointment: &Appointment,
        professional: &Professional,
        requesting_staff_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<(), AppointmentError> {
        self.deposit_service
            .issue_deposit(
                appointment,
                &professional.full_name,
                requesting_staff_id,
                auth_token,
            )
            .await
            .map_err(|e| AppointmentError::DepositIssuance(e.to_string()))?;
        Ok(())
    }

    async fn get_professional(
        &self,
        professional_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Professional, AppointmentError> {
        let professionals: Vec<Professional> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/professionals?id=eq.{}", professional_id),
                auth_token,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        let professional = professionals
            .into_iter()
            .next()
            .ok_or(AppointmentError::ProfessionalNotFound)?;

        if !professional.is_active {
            return Err(AppointmentError::ProfessionalNotFound);
        }

        Ok(professional)
    }

    async fn load_appointment(
        &self,
        appointment_id: Uuid,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        debug!("Loading appointment {}", appointment_id);

        let appointments: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                auth_token,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        appointments
            .into_iter()
            .next()
            .ok_or(AppointmentError::NotFound)
    }

    async fn insert_appointment(
        &self,
        appointment: &Appointment,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(appointment)
            .map_err(|e| AppointmentError::Database(format!("Failed to serialize: {}", e)))?;

        let created: Vec<Appointment> = self
            .supabase
            .request(Method::POST, "/rest/v1/appointments", auth_token, Some(body))
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        created.into_iter().next().ok_or_else(|| {
            AppointmentError::Database("Appointment creation returned no row".to_string())
        })
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        patch: Value,
        auth_token: Option<&str>,
    ) -> Result<Appointment, AppointmentError> {
        let updated: Vec<Appointment> = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                auth_token,
                Some(patch),
            )
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        updated.into_iter().next().ok_or(AppointmentError::NotFound)
    }

    async fn release_lock(&self, lock_key: &str) {
        // Expiry reclaims the lock if the delete fails; do not mask the
        // operation's own result.
        if let Err(e) = self.lock_service.release(lock_key).await {
            warn!("Failed to release slot lock {}: {}", lock_key, e);
        }
    }
}

fn conflict_error(existing: &Appointment) -> AppointmentError {
    AppointmentError::Conflict {
        appointment_id: existing.id,
        status: existing.status,
    }
}

fn validate_duration(duration_minutes: i32) -> Result<(), AppointmentError> {
    if duration_minutes <= 0 {
        return Err(AppointmentError::Validation(
            "Duration must be positive".to_string(),
        ));
    }
    Ok(())
}

fn require_positive_cost(total_cost: Option<Decimal>) -> Result<(), AppointmentError> {
    match total_cost {
        Some(cost) if cost > Decimal::ZERO => Ok(()),
        Some(_) => Err(AppointmentError::Validation(
            "Total cost must be positive".to_string(),
        )),
        None => Err(AppointmentError::Validation(
            "Total cost is required when a client is attached".to_string(),
        )),
    }
}

fn validate_email(email: &str) -> Result<(), AppointmentError> {
    let re = Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}$")
        .expect("email pattern is valid");
    if !re.is_match(email) {
        return Err(AppointmentError::Validation(format!(
            "Invalid guest email: {}",
            email
        )));
    }
    Ok(())
}
