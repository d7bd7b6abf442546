// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use thiserror::Error;

use reference_cell::{ReferenceRole, ReferenceSource, ResolvedDisplay};
use shared_models::error::AppError;
use shared_utils::time::format_ui_time;

// ==============================================================================
// STATUS & ACTIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum AppointmentStatus {
    #[serde(alias = "pending", alias = "PENDING")]
    Pending,

    #[serde(alias = "scheduled", alias = "SCHEDULED", alias = "confirmed", alias = "Confirmed")]
    Scheduled,

    #[serde(
        alias = "checkedin",
        alias = "checked_in",
        alias = "checked-in",
        alias = "CHECKED_IN",
        alias = "Checked In"
    )]
    CheckedIn,

    #[serde(alias = "completed", alias = "COMPLETED", alias = "done")]
    Completed,

    #[serde(alias = "cancelled", alias = "CANCELLED", alias = "canceled", alias = "Canceled")]
    Cancelled,
}

impl AppointmentStatus {
    /// Case-insensitive and separator-insensitive; `None` for anything outside the set.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let folded: String = raw
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .flat_map(char::to_lowercase)
            .collect();

        match folded.as_str() {
            "pending" => Some(AppointmentStatus::Pending),
            "scheduled" | "confirmed" => Some(AppointmentStatus::Scheduled),
            "checkedin" => Some(AppointmentStatus::CheckedIn),
            "completed" | "done" => Some(AppointmentStatus::Completed),
            "cancelled" | "canceled" => Some(AppointmentStatus::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl Default for AppointmentStatus {
    fn default() -> Self {
        AppointmentStatus::Pending
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Pending => write!(f, "Pending"),
            AppointmentStatus::Scheduled => write!(f, "Scheduled"),
            AppointmentStatus::CheckedIn => write!(f, "CheckedIn"),
            AppointmentStatus::Completed => write!(f, "Completed"),
            AppointmentStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

impl FromStr for AppointmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_lenient(s).ok_or_else(|| format!("Unknown appointment status: {}", s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum TransitionAction {
    #[serde(alias = "confirm")]
    Confirm,

    #[serde(alias = "check_in", alias = "checkin", alias = "check-in")]
    CheckIn,

    #[serde(alias = "complete")]
    Complete,

    #[serde(alias = "cancel")]
    Cancel,
}

impl TransitionAction {
    pub const ALL: [TransitionAction; 4] = [
        TransitionAction::Confirm,
        TransitionAction::CheckIn,
        TransitionAction::Complete,
        TransitionAction::Cancel,
    ];

    pub fn target(&self) -> AppointmentStatus {
        match self {
            TransitionAction::Confirm => AppointmentStatus::Scheduled,
            TransitionAction::CheckIn => AppointmentStatus::CheckedIn,
            TransitionAction::Complete => AppointmentStatus::Completed,
            TransitionAction::Cancel => AppointmentStatus::Cancelled,
        }
    }
}

impl fmt::Display for TransitionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionAction::Confirm => write!(f, "confirm"),
            TransitionAction::CheckIn => write!(f, "check in"),
            TransitionAction::Complete => write!(f, "complete"),
            TransitionAction::Cancel => write!(f, "cancel"),
        }
    }
}

// ==============================================================================
// NORMALIZED APPOINTMENT
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedAppointment {
    pub identity: String,
    pub patient_ref: Option<String>,
    pub doctor_ref: Option<String>,
    pub date: Option<NaiveDate>,
    #[serde(serialize_with = "serialize_ui_time")]
    pub time: Option<NaiveTime>,
    #[serde(rename = "type")]
    pub appointment_type: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    /// The record as the backend sent it; write-backs start from this.
    #[serde(skip)]
    pub raw: Value,
}

impl NormalizedAppointment {
    pub fn with_status(&self, status: AppointmentStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }

    pub fn is_on(&self, day: NaiveDate) -> bool {
        self.date == Some(day)
    }
}

impl ReferenceSource for NormalizedAppointment {
    fn reference(&self, role: ReferenceRole) -> Option<String> {
        match role {
            ReferenceRole::Patient => self.patient_ref.clone(),
            ReferenceRole::Doctor => self.doctor_ref.clone(),
        }
    }
}

fn serialize_ui_time<S: Serializer>(time: &Option<NaiveTime>, serializer: S) -> Result<S::Ok, S::Error> {
    match time {
        Some(time) => serializer.serialize_str(&format_ui_time(*time)),
        None => serializer.serialize_none(),
    }
}

/// One row of the appointment list as handed to the view layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentRow {
    pub appointment: NormalizedAppointment,
    pub patient: ResolvedDisplay,
    pub doctor: ResolvedDisplay,
    pub legal_actions: Vec<TransitionAction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadSummary {
    pub appointments: usize,
    pub skipped: usize,
    pub patients: usize,
    pub doctors: usize,
    pub degraded: bool,
}

// ==============================================================================
// FILTERING
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DateBucket {
    #[default]
    All,
    Today,
    Tomorrow,
    #[serde(alias = "this_week", alias = "thisweek", alias = "week")]
    ThisWeek,
    #[serde(alias = "next_week", alias = "nextweek")]
    NextWeek,
}

impl DateBucket {
    /// `ThisWeek` is `[today, today + 7)`, `NextWeek` is `[today + 7, today + 14)`.
    pub fn contains(&self, date: Option<NaiveDate>, today: NaiveDate) -> bool {
        let date = match (self, date) {
            (DateBucket::All, _) => return true,
            (_, None) => return false,
            (_, Some(date)) => date,
        };

        let offset = (date - today).num_days();
        match self {
            DateBucket::All => true,
            DateBucket::Today => offset == 0,
            DateBucket::Tomorrow => offset == 1,
            DateBucket::ThisWeek => (0..7).contains(&offset),
            DateBucket::NextWeek => (7..14).contains(&offset),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AppointmentFilter {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub status: Option<AppointmentStatus>,
    #[serde(default, alias = "bucket")]
    pub date_bucket: DateBucket,
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Cannot {action} an appointment that is {from}: {reason}")]
    InvalidTransition {
        from: AppointmentStatus,
        action: TransitionAction,
        reason: String,
    },

    #[error("A status change for appointment {identity} is already in progress")]
    TransitionInProgress { identity: String },

    #[error("Server rejected the status change for appointment {identity}: {cause}")]
    TransitionRejected { identity: String, cause: String },

    #[error("Appointment {identity} not found")]
    NotFound { identity: String },
}

impl From<TransitionError> for AppError {
    fn from(error: TransitionError) -> Self {
        let message = error.to_string();
        match error {
            TransitionError::InvalidTransition { .. } => AppError::InvalidTransition(message),
            TransitionError::TransitionInProgress { .. } => AppError::Conflict(message),
            TransitionError::TransitionRejected { .. } => AppError::ExternalService(message),
            TransitionError::NotFound { .. } => AppError::NotFound(message),
        }
    }
}
