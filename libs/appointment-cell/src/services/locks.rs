// libs/appointment-cell/src/services/locks.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Per-professional-per-day slot lock, backed by a `scheduling_locks` table
/// with a unique key. Closes the read-then-write race between the conflict
/// check and the appointment write: the second writer fails to insert the
/// lock row and backs off.
pub struct SlotLockService {
    supabase: Arc<SupabaseClient>,
    lock_timeout_seconds: i64,
    max_retry_attempts: u32,
}

impl SlotLockService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            lock_timeout_seconds: 30,
            max_retry_attempts: 3,
        }
    }

    pub fn lock_key(professional_id: Uuid, date: NaiveDate) -> String {
        format!("slot_{}_{}", professional_id, date)
    }

    /// Acquire the calendar lock for a professional's day, retrying with
    /// backoff. Returns the lock key to release.
    pub async fn acquire(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
    ) -> Result<String, AppointmentError> {
        let lock_key = Self::lock_key(professional_id, date);

        for attempt in 1..=self.max_retry_attempts {
            debug!(
                "Slot lock attempt {} for {} on {}",
                attempt, professional_id, date
            );

            if self.try_insert_lock(&lock_key, professional_id).await? {
                return Ok(lock_key);
            }

            // The lock row exists; reclaim it if its holder expired.
            if self.cleanup_if_expired(&lock_key).await?
                && self.try_insert_lock(&lock_key, professional_id).await?
            {
                return Ok(lock_key);
            }

            if attempt < self.max_retry_attempts {
                tokio::time::sleep(std::time::Duration::from_millis(100 * attempt as u64)).await;
            }
        }

        warn!("Slot lock contention on {}", lock_key);
        Err(AppointmentError::SlotContention)
    }

    /// Best-effort release. Callers log failures; an unreleased lock is
    /// reclaimed after expiry.
    pub async fn release(&self, lock_key: &str) -> Result<(), AppointmentError> {
        let _response: Value = self
            .supabase
            .request(
                Method::DELETE,
                &format!("/rest/v1/scheduling_locks?lock_key=eq.{}", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock released: {}", lock_key);
        Ok(())
    }

    async fn try_insert_lock(
        &self,
        lock_key: &str,
        professional_id: Uuid,
    ) -> Result<bool, AppointmentError> {
        let lock_data = json!({
            "lock_key": lock_key,
            "professional_id": professional_id,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + Duration::seconds(self.lock_timeout_seconds)).to_rfc3339(),
            "process_id": format!("scheduler_{}", Uuid::new_v4()),
        });

        match self
            .supabase
            .request::<Value>(
                Method::POST,
                "/rest/v1/scheduling_locks",
                None,
                Some(lock_data),
            )
            .await
        {
            Ok(_) => {
                debug!("Slot lock acquired: {}", lock_key);
                Ok(true)
            }
            // Unique-key violation: another caller holds the lock.
            Err(_) => Ok(false),
        }
    }

    async fn cleanup_if_expired(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        let response: Value = self
            .supabase
            .request(
                Method::GET,
                &format!("/rest/v1/scheduling_locks?lock_key=eq.{}&select=*", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Database(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = response.as_array().and_then(|locks| locks.first()) {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        warn!("Reclaiming expired slot lock: {}", lock_key);
                        self.release(lock_key).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}
