// libs/appointment-cell/src/services/conflict.rs
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use reqwest::Method;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;
use shared_models::appointment::{Appointment, AppointmentStatus};

use crate::models::AppointmentError;

/// Half-open interval overlap: `[s1, e1)` and `[s2, e2)` intersect iff
/// `s1 < e2 && s2 < e1`. Touching endpoints never conflict.
pub fn windows_overlap(
    start1: NaiveDateTime,
    end1: NaiveDateTime,
    start2: NaiveDateTime,
    end2: NaiveDateTime,
) -> bool {
    start1 < end2 && start2 < end1
}

pub struct ConflictDetectionService {
    supabase: Arc<SupabaseClient>,
}

impl ConflictDetectionService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Find the first occupying appointment of a professional whose window
    /// overlaps the requested one. Candidates are ordered by id so the
    /// reported conflict is deterministic. Pure read, no side effects.
    pub async fn find_conflict(
        &self,
        professional_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let filter = format!("professional_id=eq.{}", professional_id);
        self.find_overlapping(
            &filter,
            date,
            start_time,
            duration_minutes,
            exclude_appointment_id,
            auth_token,
        )
        .await
    }

    /// Same overlap scan, but against the client's own occupying bookings:
    /// a caller may not hold two bookings over the same window.
    pub async fn find_client_conflict(
        &self,
        client_id: Uuid,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let filter = format!("client_id=eq.{}", client_id);
        self.find_overlapping(
            &filter,
            date,
            start_time,
            duration_minutes,
            exclude_appointment_id,
            auth_token,
        )
        .await
    }

    async fn find_overlapping(
        &self,
        owner_filter: &str,
        date: NaiveDate,
        start_time: NaiveTime,
        duration_minutes: i32,
        exclude_appointment_id: Option<Uuid>,
        auth_token: Option<&str>,
    ) -> Result<Option<Appointment>, AppointmentError> {
        if duration_minutes <= 0 {
            return Err(AppointmentError::Validation(
                "Duration must be positive".to_string(),
            ));
        }

        let requested_start = date.and_time(start_time);
        let requested_end =
            requested_start + chrono::Duration::minutes(duration_minutes as i64);

        let mut query_parts = vec![
            owner_filter.to_string(),
            format!("date=eq.{}", date),
            format!("status=in.({})", AppointmentStatus::occupying_filter()),
        ];

        if let Some(exclude_id) = exclude_appointment_id {
            query_parts.push(format!("id=neq.{}", exclude_id));
        }

        let path = format!(
            "/rest/v1/appointments?{}&order=id.asc",
            query_parts.join("&")
        );

        let candidates: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AppointmentError::Database(e.to_string()))?;

        debug!(
            "Conflict scan over {} candidates for {} {}-{}",
            candidates.len(),
            date,
            requested_start.time(),
            requested_end.time()
        );

        for candidate in candidates {
            if windows_overlap(
                requested_start,
                requested_end,
                candidate.start_at(),
                candidate.end_at(),
            ) {
                warn!(
                    "Conflict detected: appointment {} ({}) occupies {} {}-{}",
                    candidate.id,
                    candidate.status,
                    candidate.date,
                    candidate.start_time,
                    candidate.end_at().time()
                );
                return Ok(Some(candidate));
            }
        }

        Ok(None)
    }
}
