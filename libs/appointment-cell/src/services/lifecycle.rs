// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, warn};

use shared_models::appointment::AppointmentStatus;

use crate::models::AppointmentError;

/// Owns the legal status transitions of an appointment. The table is fixed
/// domain policy, not configuration; role and conflict guards are enforced
/// by the scheduling service before a transition is applied.
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!(
            "Validating status transition from {} to {}",
            current_status, new_status
        );

        if !self
            .valid_transitions(current_status)
            .contains(&new_status)
        {
            warn!(
                "Invalid status transition attempted: {} -> {}",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition(current_status));
        }

        Ok(())
    }

    /// All statuses reachable from the given one.
    pub fn valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            // Open slot: claimed by a client (or admin attaching one), or
            // retired by staff.
            AppointmentStatus::Available => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::CancelledByStaff,
            ],
            AppointmentStatus::PendingStaffApproval => vec![
                AppointmentStatus::Scheduled,
                AppointmentStatus::RejectedByStaff,
                AppointmentStatus::CancelledByClient,
                AppointmentStatus::CancelledByStaff,
            ],
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::Confirmed,
                // Unpaid client cancellation frees the slot again.
                AppointmentStatus::Available,
                AppointmentStatus::CancelledByClient,
                AppointmentStatus::CancelledByStaff,
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::Confirmed => vec![
                AppointmentStatus::CancelledByClient,
                AppointmentStatus::CancelledByStaff,
                AppointmentStatus::Completed,
                AppointmentStatus::NoShow,
            ],
            // Terminal states - no transitions allowed
            AppointmentStatus::RejectedByStaff => vec![],
            AppointmentStatus::CancelledByClient => vec![],
            AppointmentStatus::CancelledByStaff => vec![],
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::NoShow => vec![],
        }
    }
}

impl Default for AppointmentLifecycleService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const ALL: [AppointmentStatus; 9] = [
        AppointmentStatus::Available,
        AppointmentStatus::PendingStaffApproval,
        AppointmentStatus::Scheduled,
        AppointmentStatus::Confirmed,
        AppointmentStatus::RejectedByStaff,
        AppointmentStatus::CancelledByClient,
        AppointmentStatus::CancelledByStaff,
        AppointmentStatus::Completed,
        AppointmentStatus::NoShow,
    ];

    #[test]
    fn terminal_states_admit_no_transitions() {
        let lifecycle = AppointmentLifecycleService::new();
        for status in ALL {
            if status.is_terminal() {
                assert!(
                    lifecycle.valid_transitions(status).is_empty(),
                    "{} should be terminal",
                    status
                );
                for target in ALL {
                    assert_matches!(
                        lifecycle.validate_status_transition(status, target),
                        Err(AppointmentError::InvalidStatusTransition(_))
                    );
                }
            }
        }
    }

    #[test]
    fn pending_request_can_only_be_resolved() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(
                AppointmentStatus::PendingStaffApproval,
                AppointmentStatus::Scheduled
            )
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(
                AppointmentStatus::PendingStaffApproval,
                AppointmentStatus::RejectedByStaff
            )
            .is_ok());
        assert_matches!(
            lifecycle.validate_status_transition(
                AppointmentStatus::PendingStaffApproval,
                AppointmentStatus::Confirmed
            ),
            Err(AppointmentError::InvalidStatusTransition(
                AppointmentStatus::PendingStaffApproval
            ))
        );
    }

    #[test]
    fn scheduled_can_free_the_slot_but_confirmed_cannot() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_transition(
                AppointmentStatus::Scheduled,
                AppointmentStatus::Available
            )
            .is_ok());
        // once confirmed (deposit paid) the slot is never silently freed
        assert_matches!(
            lifecycle.validate_status_transition(
                AppointmentStatus::Confirmed,
                AppointmentStatus::Available
            ),
            Err(AppointmentError::InvalidStatusTransition(
                AppointmentStatus::Confirmed
            ))
        );
    }

    #[test]
    fn confirmation_only_from_scheduled() {
        let lifecycle = AppointmentLifecycleService::new();
        for status in ALL {
            let allowed = lifecycle
                .valid_transitions(status)
                .contains(&AppointmentStatus::Confirmed);
            assert_eq!(allowed, status == AppointmentStatus::Scheduled);
        }
    }
}
