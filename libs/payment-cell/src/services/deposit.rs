// libs/payment-cell/src/services/deposit.rs
use chrono::Utc;
use reqwest::Method;
use rust_decimal::{Decimal, RoundingStrategy};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::appointment::{Appointment, AppointmentStatus};
use shared_models::payment::{Payment, PaymentCategory, PaymentStatus, PaymentSubject};

use crate::models::PaymentError;

/// Share of the total cost collected up front as the booking deposit.
fn deposit_rate() -> Decimal {
    Decimal::new(20, 2) // 0.20
}

/// Deposit amount for a given total cost, rounded to cents. A result of zero
/// means no deposit is owed.
pub fn deposit_amount(total_cost: Decimal) -> Decimal {
    (total_cost * deposit_rate()).round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub struct DepositIssueService {
    supabase: Arc<SupabaseClient>,
}

impl DepositIssueService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Create the deposit payment for an appointment that just entered a
    /// booked-but-unpaid state. Idempotent: an existing pending deposit is
    /// returned unchanged, an existing paid deposit triggers a
    /// synchronization of the appointment instead of a duplicate.
    ///
    /// The professional's display name is passed in explicitly; the issuer
    /// never mutates or re-fetches the appointment entity it was given.
    pub async fn issue_deposit(
        &self,
        appointment: &Appointment,
        professional_name: &str,
        requesting_staff_id: Option<Uuid>,
        auth_token: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let Some(client_id) = appointment.client_id else {
            debug!(
                "No deposit issued for appointment {}: no client attached",
                appointment.id
            );
            return Ok(None);
        };
        let Some(total_cost) = appointment.total_cost else {
            debug!(
                "No deposit issued for appointment {}: no total cost set",
                appointment.id
            );
            return Ok(None);
        };

        let amount = deposit_amount(total_cost);
        if amount <= Decimal::ZERO {
            info!(
                "Computed deposit for appointment {} is {} - skipping issuance",
                appointment.id, amount
            );
            return Ok(None);
        }

        // Idempotency: look for a deposit already tied to this appointment.
        if let Some(existing) = self.find_deposit(appointment.id, auth_token).await? {
            match existing.status {
                PaymentStatus::Pending => {
                    debug!(
                        "Pending deposit {} already exists for appointment {}",
                        existing.id, appointment.id
                    );
                    return Ok(Some(existing));
                }
                PaymentStatus::Paid => {
                    self.synchronize_paid_appointment(appointment, auth_token)
                        .await?;
                    return Ok(Some(existing));
                }
                PaymentStatus::Cancelled | PaymentStatus::Rejected => {
                    // A dead deposit does not satisfy the booking; issue anew.
                    debug!(
                        "Deposit {} for appointment {} is {}, issuing a new one",
                        existing.id, appointment.id, existing.status
                    );
                }
            }
        }

        let (resource_type, resource_id) =
            Payment::subject_columns(Some(PaymentSubject::Appointment(appointment.id)));
        let payment = Payment {
            id: Uuid::new_v4(),
            amount,
            status: PaymentStatus::Pending,
            category: PaymentCategory::Deposit,
            related_resource_type: resource_type,
            related_resource_id: resource_id,
            client_id: Some(client_id),
            issued_by_staff_id: requesting_staff_id,
            description: Some(format!(
                "Booking deposit for appointment on {} at {} with {}",
                appointment.date, appointment.start_time, professional_name
            )),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let created: Vec<Payment> = self
            .supabase
            .request(
                Method::POST,
                "/rest/v1/payments",
                Some(auth_token),
                Some(serde_json::to_value(&payment).map_err(|e| {
                    PaymentError::Database(format!("Failed to serialize payment: {}", e))
                })?),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        let created = created
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database("Deposit creation returned no row".to_string()))?;

        info!(
            "Issued deposit {} of {} for appointment {}",
            created.id, created.amount, appointment.id
        );
        Ok(Some(created))
    }

    /// Cancel a still-pending deposit when the client releases the slot. A
    /// paid deposit is never reversed here.
    pub async fn cancel_pending_deposit(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let Some(existing) = self.find_deposit(appointment_id, auth_token).await? else {
            return Ok(None);
        };

        if existing.status != PaymentStatus::Pending {
            debug!(
                "Deposit {} for appointment {} is {}, leaving untouched",
                existing.id, appointment_id, existing.status
            );
            return Ok(None);
        }

        let updated: Vec<Payment> = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/payments?id=eq.{}", existing.id),
                Some(auth_token),
                Some(json!({
                    "status": PaymentStatus::Cancelled,
                    "updated_at": Utc::now().to_rfc3339(),
                })),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        info!(
            "Cancelled pending deposit {} for appointment {}",
            existing.id, appointment_id
        );
        Ok(updated.into_iter().next())
    }

    /// Look up the deposit payment attached to an appointment. Ordered by
    /// creation so re-issued deposits resolve to the most recent record.
    async fn find_deposit(
        &self,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<Option<Payment>, PaymentError> {
        let path = format!(
            "/rest/v1/payments?category=eq.deposit&related_resource_type=eq.appointment&related_resource_id=eq.{}&order=created_at.desc",
            appointment_id
        );

        let payments: Vec<Payment> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        Ok(payments.into_iter().next())
    }

    /// The deposit was already paid but the appointment does not reflect it
    /// yet. Bring the appointment back in line (signal flag, and promotion to
    /// confirmed when still merely scheduled).
    async fn synchronize_paid_appointment(
        &self,
        appointment: &Appointment,
        auth_token: &str,
    ) -> Result<(), PaymentError> {
        let mut patch = json!({
            "signal_paid": true,
            "updated_at": Utc::now().to_rfc3339(),
        });

        if appointment.status == AppointmentStatus::Scheduled {
            patch["status"] = json!(AppointmentStatus::Confirmed);
        }

        warn!(
            "Appointment {} had a paid deposit but signal_paid={}; synchronizing",
            appointment.id, appointment.signal_paid
        );

        let _updated: Vec<Appointment> = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment.id),
                Some(auth_token),
                Some(patch),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        Ok(())
    }
}
