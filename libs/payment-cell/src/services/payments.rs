// libs/payment-cell/src/services/payments.rs
use chrono::Utc;
use reqwest::Method;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_database::outbox::NotificationOutbox;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{Caller, Role};
use shared_models::payment::{Payment, PaymentStatus};

use crate::models::{PaymentError, PaymentSearchQuery, RecordPaymentRequest};
use crate::services::reconcile::PaymentReconciliationService;

pub struct PaymentService {
    supabase: Arc<SupabaseClient>,
    reconciler: PaymentReconciliationService,
    outbox: NotificationOutbox,
}

impl PaymentService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let reconciler = PaymentReconciliationService::new(Arc::clone(&supabase));
        let outbox = NotificationOutbox::new(Arc::clone(&supabase));

        Self {
            supabase,
            reconciler,
            outbox,
        }
    }

    pub async fn get_payment(
        &self,
        caller: Caller,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self.load_payment(payment_id, auth_token).await?;

        if !caller.is_staff() && payment.client_id != Some(caller.id) {
            return Err(PaymentError::PermissionDenied(
                "Clients may only view their own payments".to_string(),
            ));
        }

        Ok(payment)
    }

    /// Staff see every payment; clients only their own.
    pub async fn list_payments(
        &self,
        caller: Caller,
        query: PaymentSearchQuery,
        auth_token: &str,
    ) -> Result<Vec<Payment>, PaymentError> {
        let mut filters = Vec::new();

        match caller.role {
            Role::Admin | Role::Professional => {
                if let Some(client_id) = query.client_id {
                    filters.push(format!("client_id=eq.{}", client_id));
                }
            }
            Role::Client => {
                filters.push(format!("client_id=eq.{}", caller.id));
            }
        }

        if let Some(status) = query.status {
            filters.push(format!("status=eq.{}", status));
        }
        if let Some(category) = query.category {
            filters.push(format!("category=eq.{}", category));
        }

        let mut path = "/rest/v1/payments".to_string();
        filters.push("order=created_at.desc".to_string());
        path.push('?');
        path.push_str(&filters.join("&"));

        self.supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))
    }

    /// Staff-recorded payment, e.g. a session fee taken manually. Deposits
    /// are never created through this path; the issuer owns those.
    pub async fn record_payment(
        &self,
        caller: Caller,
        request: RecordPaymentRequest,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        if !caller.is_staff() {
            return Err(PaymentError::PermissionDenied(
                "Only staff may record payments".to_string(),
            ));
        }

        if request.amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(
                "Payment amount must be positive".to_string(),
            ));
        }

        let (resource_type, resource_id) = Payment::subject_columns(request.subject);
        let payment = Payment {
            id: Uuid::new_v4(),
            amount: request.amount,
            status: PaymentStatus::Pending,
            category: request.category,
            related_resource_type: resource_type,
            related_resource_id: resource_id,
            client_id: request.client_id,
            issued_by_staff_id: Some(caller.id),
            description: request.description,
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

        created
            .into_iter()
            .next()
            .ok_or_else(|| PaymentError::Database("Payment creation returned no row".to_string()))
    }

    /// Move a payment to a new status and run reconciliation: marking a
    /// deposit paid here advances the linked appointment.
    pub async fn update_payment_status(
        &self,
        caller: Caller,
        payment_id: Uuid,
        new_status: PaymentStatus,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        let payment = self.load_payment(payment_id, auth_token).await?;

        if !caller.is_staff() {
            // Clients may settle their own pending payments, nothing else.
            if payment.client_id != Some(caller.id) {
                return Err(PaymentError::PermissionDenied(
                    "Clients may only act on their own payments".to_string(),
                ));
            }
            if new_status != PaymentStatus::Paid {
                return Err(PaymentError::PermissionDenied(
                    "Clients may only mark payments as paid".to_string(),
                ));
            }
        }

        if payment.status != PaymentStatus::Pending {
            return Err(PaymentError::InvalidStatusTransition(payment.status));
        }
        if new_status == PaymentStatus::Pending {
            return Err(PaymentError::Validation(
                "Payment is already pending".to_string(),
            ));
        }

        let previous_status = payment.status;

        let updated: Vec<Payment> = self
            .supabase
            .request(
                Method::PATCH,
                &format!("/rest/v1/payments?id=eq.{}", payment_id),
                Some(auth_token),
                Some(json!({
                    "status": new_status,
                    "updated_at": Utc::now().to_rfc3339(),
                })),
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        let updated = updated
            .into_iter()
            .next()
            .ok_or(PaymentError::NotFound)?;

        info!(
            "Payment {} moved from {} to {}",
            payment_id, previous_status, updated.status
        );

        self.reconciler
            .on_payment_status_changed(&updated, previous_status, auth_token)
            .await?;

        if updated.status == PaymentStatus::Paid {
            self.outbox
                .publish(
                    "payment_paid",
                    updated.client_id,
                    json!({ "payment_id": updated.id, "amount": updated.amount }),
                )
                .await;
        }

        Ok(updated)
    }

    async fn load_payment(
        &self,
        payment_id: Uuid,
        auth_token: &str,
    ) -> Result<Payment, PaymentError> {
        debug!("Loading payment {}", payment_id);

        let payments: Vec<Payment> = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/payments?id=eq.{}", payment_id),
                Some(auth_token),
                None,
            )
            .await
            .map_err(|e| PaymentError::Database(e.to_string()))?;

        payments.into_iter().next().ok_or(PaymentError::NotFound)
    }
}
