use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::supabase::SupabaseClient;

/// Outbound notification events, written to a `notification_outbox` table
/// after the domain write succeeds. Delivery is handled by a separate
/// dispatcher; a failed insert must never fail the triggering operation.
pub struct NotificationOutbox {
    supabase: Arc<SupabaseClient>,
}

impl NotificationOutbox {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Fire-and-forget publish. Failures are logged and swallowed.
    pub async fn publish(&self, event: &str, recipient_id: Option<Uuid>, payload: Value) {
        let row = json!({
            "id": Uuid::new_v4(),
            "event": event,
            "recipient_id": recipient_id,
            "payload": payload,
            "created_at": chrono::Utc::now().to_rfc3339(),
        });

        match self
            .supabase
            .request::<Value>(Method::POST, "/rest/v1/notification_outbox", None, Some(row))
            .await
        {
            Ok(_) => debug!("Notification event queued: {}", event),
            Err(e) => warn!("Failed to queue notification event {}: {}", event, e),
        }
    }
}
