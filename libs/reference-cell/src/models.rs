// libs/reference-cell/src/models.rs
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ReferenceError;

pub const UNKNOWN_PATIENT: &str = "Unknown Patient";
pub const UNKNOWN_DOCTOR: &str = "Unknown Doctor";
pub const NO_PATIENT_ID: &str = "No patient ID";
pub const LOADING: &str = "Loading…";

// ==============================================================================
// RECORD VOCABULARY
// ==============================================================================

/// Which kind of backend record a lookup runs against. Alias tables differ per
/// kind: on an appointment `pId` is the patient reference, on a patient it is
/// the identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Patient,
    Doctor,
    Appointment,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKind::Patient => write!(f, "patient"),
            RecordKind::Doctor => write!(f, "doctor"),
            RecordKind::Appointment => write!(f, "appointment"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CanonicalField {
    Identity,
    DisplayName,
    FirstName,
    LastName,
    Age,
    Gender,
    BloodGroup,
    Contact,
    Email,
    Address,
    Specialization,
    Date,
    Time,
    Status,
    Type,
    Notes,
    PatientRef,
    DoctorRef,
}

/// The side of an appointment a reference points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceRole {
    Patient,
    Doctor,
}

impl ReferenceRole {
    pub fn reference_field(&self) -> CanonicalField {
        match self {
            ReferenceRole::Patient => CanonicalField::PatientRef,
            ReferenceRole::Doctor => CanonicalField::DoctorRef,
        }
    }

    pub fn collection(&self) -> CollectionKind {
        match self {
            ReferenceRole::Patient => CollectionKind::Patients,
            ReferenceRole::Doctor => CollectionKind::Doctors,
        }
    }

    pub fn record_kind(&self) -> RecordKind {
        self.collection().record_kind()
    }

    pub fn unknown_label(&self) -> &'static str {
        match self {
            ReferenceRole::Patient => UNKNOWN_PATIENT,
            ReferenceRole::Doctor => UNKNOWN_DOCTOR,
        }
    }

    /// Shown when an appointment carries no reference at all.
    pub fn missing_label(&self) -> &'static str {
        match self {
            ReferenceRole::Patient => NO_PATIENT_ID,
            ReferenceRole::Doctor => UNKNOWN_DOCTOR,
        }
    }
}

impl fmt::Display for ReferenceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReferenceRole::Patient => write!(f, "patient"),
            ReferenceRole::Doctor => write!(f, "doctor"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Patients,
    Doctors,
    Appointments,
}

impl CollectionKind {
    /// The kind of record a collection holds.
    pub fn record_kind(&self) -> RecordKind {
        match self {
            CollectionKind::Patients => RecordKind::Patient,
            CollectionKind::Doctors => RecordKind::Doctor,
            CollectionKind::Appointments => RecordKind::Appointment,
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Patients => write!(f, "patients"),
            CollectionKind::Doctors => write!(f, "doctors"),
            CollectionKind::Appointments => write!(f, "appointments"),
        }
    }
}

// ==============================================================================
// CANONICAL ENTITIES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalPatient {
    pub identity: String,
    pub display_name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub blood_group: Option<String>,
    pub contact: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
}

impl CanonicalPatient {
    /// A patient known only by identity and name, e.g. from the last-known-good directory.
    pub fn named(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            age: None,
            gender: None,
            blood_group: None,
            contact: None,
            email: None,
            address: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalDoctor {
    pub identity: String,
    pub display_name: String,
    pub specialization: Option<String>,
    pub contact: Option<String>,
}

impl CanonicalDoctor {
    pub fn named(identity: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            display_name: display_name.into(),
            specialization: None,
            contact: None,
        }
    }
}

pub fn is_placeholder_name(name: &str) -> bool {
    let name = name.trim();
    name.is_empty() || name == UNKNOWN_PATIENT || name == UNKNOWN_DOCTOR
}

/// Shared behaviour of patients and doctors as far as caching and resolution go.
pub trait CanonicalEntity: Clone + Send + Sync + 'static {
    const ROLE: ReferenceRole;

    fn normalize(record: &Value) -> Result<Self, ReferenceError>;

    fn named(identity: String, display_name: String) -> Self;

    fn identity(&self) -> &str;

    fn display_name(&self) -> &str;

    /// Secondary line for the UI (age/gender for patients, specialization for doctors).
    fn detail(&self) -> Option<String>;

    /// Copies every field that is missing here and present on `incoming`.
    /// Returns whether anything changed.
    fn fill_missing(&mut self, incoming: &Self) -> bool;

    fn with_identity(self, identity: String) -> Self;

    fn has_real_name(&self) -> bool {
        !is_placeholder_name(self.display_name())
    }
}

// ==============================================================================
// RESOLUTION OUTPUT
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionState {
    Ready,
    Loading,
    Fallback,
}

/// A display-ready reference for one side of an appointment row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedDisplay {
    pub value: String,
    pub identity: Option<String>,
    pub detail: Option<String>,
    pub state: ResolutionState,
}

impl ResolvedDisplay {
    pub fn ready(value: impl Into<String>, identity: Option<String>, detail: Option<String>) -> Self {
        Self {
            value: value.into(),
            identity,
            detail,
            state: ResolutionState::Ready,
        }
    }

    pub fn missing(role: ReferenceRole) -> Self {
        Self::ready(role.missing_label(), None, None)
    }

    pub fn loading(identity: String) -> Self {
        Self {
            value: LOADING.to_string(),
            identity: Some(identity),
            detail: None,
            state: ResolutionState::Loading,
        }
    }

    pub fn fallback(value: impl Into<String>, identity: String) -> Self {
        Self {
            value: value.into(),
            identity: Some(identity),
            detail: None,
            state: ResolutionState::Fallback,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state == ResolutionState::Ready
    }
}

// ==============================================================================
// BACKEND ENDPOINTS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionEndpoints {
    pub list: String,
    pub alternates: Vec<String>,
    /// Path template; `{id}` is replaced by the url-encoded identity.
    pub by_id: String,
}

impl CollectionEndpoints {
    fn standard(base: &str) -> Self {
        Self {
            list: format!("/{}", base),
            alternates: vec![format!("/{}/all", base), format!("/api/{}", base)],
            by_id: format!("/{}/{{id}}", base),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointCatalog {
    pub patients: CollectionEndpoints,
    pub doctors: CollectionEndpoints,
    pub appointments: CollectionEndpoints,
}

impl Default for EndpointCatalog {
    fn default() -> Self {
        Self {
            patients: CollectionEndpoints::standard("patients"),
            doctors: CollectionEndpoints::standard("doctors"),
            appointments: CollectionEndpoints::standard("appointments"),
        }
    }
}

impl EndpointCatalog {
    pub fn for_kind(&self, kind: CollectionKind) -> &CollectionEndpoints {
        match kind {
            CollectionKind::Patients => &self.patients,
            CollectionKind::Doctors => &self.doctors,
            CollectionKind::Appointments => &self.appointments,
        }
    }

    /// Primary list path first, then the alternates in order.
    pub fn list_paths(&self, kind: CollectionKind) -> Vec<&str> {
        let endpoints = self.for_kind(kind);
        std::iter::once(endpoints.list.as_str())
            .chain(endpoints.alternates.iter().map(String::as_str))
            .collect()
    }

    pub fn by_id(&self, kind: CollectionKind, identity: &str) -> String {
        self.for_kind(kind)
            .by_id
            .replace("{id}", &urlencoding::encode(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog_orders_primary_before_alternates() {
        let catalog = EndpointCatalog::default();
        assert_eq!(
            catalog.list_paths(CollectionKind::Doctors),
            vec!["/doctors", "/doctors/all", "/api/doctors"]
        );
    }

    #[test]
    fn by_id_encodes_identity() {
        let catalog = EndpointCatalog::default();
        assert_eq!(catalog.by_id(CollectionKind::Patients, "6"), "/patients/6");
        assert_eq!(catalog.by_id(CollectionKind::Patients, "P 6/a"), "/patients/P%206%2Fa");
    }

    #[test]
    fn placeholder_names_are_recognised() {
        assert!(is_placeholder_name(UNKNOWN_PATIENT));
        assert!(is_placeholder_name("  "));
        assert!(!is_placeholder_name("Nisha"));
    }
}
