// libs/appointment-cell/src/services/lifecycle.rs
use chrono::NaiveDate;
use tracing::{debug, warn};

use shared_models::session::Role;

use crate::models::{AppointmentStatus, NormalizedAppointment, TransitionAction, TransitionError};

/// Role-gated appointment lifecycle. Pure: nothing here touches the network
/// or the working set.
#[derive(Debug, Clone, Copy, Default)]
pub struct AppointmentStatusMachine;

impl AppointmentStatusMachine {
    pub fn new() -> Self {
        Self
    }

    /// All statuses reachable in one step from `current`, regardless of role.
    pub fn get_valid_transitions(&self, current: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current {
            AppointmentStatus::Pending => vec![AppointmentStatus::Scheduled, AppointmentStatus::Cancelled],
            AppointmentStatus::Scheduled => vec![
                AppointmentStatus::CheckedIn,
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::CheckedIn => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }

    /// Checks `action` against the appointment's current status, the actor's
    /// role and (for check-in) the calendar, returning the target status.
    pub fn validate(
        &self,
        appointment: &NormalizedAppointment,
        action: TransitionAction,
        role: Role,
        today: NaiveDate,
    ) -> Result<AppointmentStatus, TransitionError> {
        let from = appointment.status;

        if let Some(reason) = self.rejection(appointment, action, role, today) {
            warn!(
                "Rejected {} on appointment {} ({}) by {}: {}",
                action, appointment.identity, from, role, reason
            );
            return Err(TransitionError::InvalidTransition { from, action, reason });
        }

        let target = action.target();
        debug!("Transition validated: {} -> {} on appointment {}", from, target, appointment.identity);
        Ok(target)
    }

    /// The appointment after `action`, or why it cannot happen.
    pub fn transition(
        &self,
        appointment: &NormalizedAppointment,
        action: TransitionAction,
        role: Role,
        today: NaiveDate,
    ) -> Result<NormalizedAppointment, TransitionError> {
        let target = self.validate(appointment, action, role, today)?;
        Ok(appointment.with_status(target))
    }

    /// Actions the UI should offer this role for this appointment today.
    pub fn legal_actions(
        &self,
        appointment: &NormalizedAppointment,
        role: Role,
        today: NaiveDate,
    ) -> Vec<TransitionAction> {
        TransitionAction::ALL
            .into_iter()
            .filter(|action| self.rejection(appointment, *action, role, today).is_none())
            .collect()
    }

    // Why `action` is not allowed, or `None` when it is.
    fn rejection(
        &self,
        appointment: &NormalizedAppointment,
        action: TransitionAction,
        role: Role,
        today: NaiveDate,
    ) -> Option<String> {
        let from = appointment.status;

        if from.is_terminal() {
            return Some(format!("appointment is already {}", from));
        }

        match action {
            TransitionAction::Confirm => {
                if from != AppointmentStatus::Pending {
                    return Some("only pending appointments can be confirmed".into());
                }
                if !matches!(role, Role::Doctor | Role::Admin) {
                    return Some("only a doctor or an admin can confirm".into());
                }
            }
            TransitionAction::CheckIn => {
                if from != AppointmentStatus::Scheduled {
                    return Some("only scheduled appointments can be checked in".into());
                }
                if role != Role::Doctor {
                    return Some("only the doctor can check a patient in".into());
                }
                if !appointment.is_on(today) {
                    return Some(match appointment.date {
                        Some(date) => format!("check-in is only possible on {}", date),
                        None => "appointment has no scheduled date".into(),
                    });
                }
            }
            TransitionAction::Complete => {
                if !matches!(from, AppointmentStatus::Scheduled | AppointmentStatus::CheckedIn) {
                    return Some("only scheduled or checked-in appointments can be completed".into());
                }
                if role != Role::Doctor {
                    return Some("only the doctor can complete an appointment".into());
                }
            }
            TransitionAction::Cancel => {
                if !matches!(role, Role::Doctor | Role::Admin) {
                    return Some("only a doctor or an admin can cancel".into());
                }
            }
        }

        let target = action.target();
        if !self.get_valid_transitions(from).contains(&target) {
            return Some(format!("{} cannot move to {}", from, target));
        }

        None
    }
}
