// libs/payment-cell/src/services/reconcile.rs
use chrono::Utc;
use reqwest::Method;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::appointment::{Appointment, AppointmentStatus};
use shared_models::payment::{Payment, PaymentCategory, PaymentStatus, PaymentSubject};

use crate::models::PaymentError;

/// Reacts to payment status changes. The single place that flips an
/// appointment's `signal_paid` flag when its deposit settles.
pub struct PaymentReconciliationService {
    supabase: Arc<SupabaseClient>,
}

impl PaymentReconciliationService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Called after a payment row has been persisted with a new status.
    /// Only a transition *to* paid on a deposit tied to an appointment has
    /// any effect; everything else is ignored.
    pub async fn on_payment_status_changed(
        &self,
        payment: &Payment,
        previous_status: PaymentStatus,
        auth_token: &str,
    ) -> Result<(), PaymentError> {
        if payment.status != PaymentStatus::Paid || previous_status == PaymentStatus::Paid {
            return Ok(());
        }

        if payment.category != PaymentCategory::Deposit {
            return Ok(());
        }

        let Some(subject) = payment.subject() else {
            debug!("Paid deposit {} has no linked resource", payment.id);
            return Ok(());
        };

        match subject {
            PaymentSubject::Appointment(appointment_id) => {
                self.settle_appointment_deposit(payment.id, appointment_id, auth_token)
                    .await
            }
        }
    }

    async fn settle_appointment_deposit(
        &self,
        payment_id: Uuid,
        appointment_id: Uuid,
        auth_token: &str,
    ) -> Result<(), PaymentError> {
        let appointments: Vec<Appointment> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        let Some(appointment) = appointments.into_iter().next() else {
            // Deposits outlive deleted appointments (audit trail), so a
            // dangling link is not an error.
            warn!(
                "Paid deposit {} references missing appointment {}",
                payment_id, appointment_id
            );
            return Ok(());
        };

        let mut patch = json!({
            "signal_paid": true,
            "updated_at": Utc::now().to_rfc3339(),
        });

        // Promote a scheduled booking to confirmed; never touch the status of
        // a terminal or already-confirmed appointment.
        if appointment.status == AppointmentStatus::Scheduled {
            patch["status"] = json!(AppointmentStatus::Confirmed);
        } else if appointment.status.is_terminal() {
            debug!(
                "Appointment {} is {}; recording deposit as paid without status change",
                appointment.id, appointment.status
            );
        }

        let _updated: Vec<Appointment> = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/appointments?id=eq.{}", appointment_id),
                Some(auth_token),
                Some(patch),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        info!(
            "Deposit {} settled; appointment {} marked signal_paid",
            payment_id, appointment_id
        );
        Ok(())
    }
}
