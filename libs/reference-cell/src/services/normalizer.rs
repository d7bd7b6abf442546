// libs/reference-cell/src/services/normalizer.rs
use serde_json::Value;
use tracing::debug;

use crate::error::ReferenceError;
use crate::models::{
    is_placeholder_name, CanonicalDoctor, CanonicalEntity, CanonicalField, CanonicalPatient,
    RecordKind, ReferenceRole, UNKNOWN_DOCTOR, UNKNOWN_PATIENT,
};
use crate::services::fields::{resolve_string, resolve_u32};

pub fn normalize_patient(record: &Value) -> Result<CanonicalPatient, ReferenceError> {
    let kind = RecordKind::Patient;
    let identity = require_identity(record, kind)?;

    Ok(CanonicalPatient {
        display_name: compose_display_name(record, kind, UNKNOWN_PATIENT),
        age: resolve_u32(record, kind, CanonicalField::Age),
        gender: resolve_string(record, kind, CanonicalField::Gender),
        blood_group: resolve_string(record, kind, CanonicalField::BloodGroup),
        contact: resolve_string(record, kind, CanonicalField::Contact),
        email: resolve_string(record, kind, CanonicalField::Email),
        address: resolve_string(record, kind, CanonicalField::Address),
        identity,
    })
}

pub fn normalize_doctor(record: &Value) -> Result<CanonicalDoctor, ReferenceError> {
    let kind = RecordKind::Doctor;
    let identity = require_identity(record, kind)?;

    Ok(CanonicalDoctor {
        display_name: compose_display_name(record, kind, UNKNOWN_DOCTOR),
        specialization: resolve_string(record, kind, CanonicalField::Specialization),
        contact: resolve_string(record, kind, CanonicalField::Contact),
        identity,
    })
}

fn require_identity(record: &Value, kind: RecordKind) -> Result<String, ReferenceError> {
    resolve_string(record, kind, CanonicalField::Identity).ok_or_else(|| {
        debug!("No identity alias present on {} record", kind);
        ReferenceError::IdentityResolutionFailure { kind }
    })
}

/// Single name field, else first + last, else the fixed placeholder. Never empty.
pub fn compose_display_name(record: &Value, kind: RecordKind, placeholder: &str) -> String {
    if let Some(name) = resolve_string(record, kind, CanonicalField::DisplayName) {
        return name;
    }

    let parts: Vec<String> = [CanonicalField::FirstName, CanonicalField::LastName]
        .into_iter()
        .filter_map(|field| resolve_string(record, kind, field))
        .collect();

    if parts.is_empty() {
        placeholder.to_string()
    } else {
        parts.join(" ")
    }
}

fn fill<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) -> bool {
    match (slot.is_none(), incoming) {
        (true, Some(value)) => {
            *slot = Some(value.clone());
            true
        }
        _ => false,
    }
}

fn fill_name(slot: &mut String, incoming: &str) -> bool {
    if is_placeholder_name(slot) && !is_placeholder_name(incoming) {
        *slot = incoming.to_string();
        true
    } else {
        false
    }
}

impl CanonicalEntity for CanonicalPatient {
    const ROLE: ReferenceRole = ReferenceRole::Patient;

    fn normalize(record: &Value) -> Result<Self, ReferenceError> {
        normalize_patient(record)
    }

    fn named(identity: String, display_name: String) -> Self {
        CanonicalPatient::named(identity, display_name)
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn detail(&self) -> Option<String> {
        match (self.age, self.gender.as_deref()) {
            (Some(age), Some(gender)) => Some(format!("{} yrs, {}", age, gender)),
            (Some(age), None) => Some(format!("{} yrs", age)),
            (None, Some(gender)) => Some(gender.to_string()),
            (None, None) => None,
        }
    }

    fn fill_missing(&mut self, incoming: &Self) -> bool {
        // Non-short-circuiting so every field gets its chance.
        fill_name(&mut self.display_name, &incoming.display_name)
            | fill(&mut self.age, &incoming.age)
            | fill(&mut self.gender, &incoming.gender)
            | fill(&mut self.blood_group, &incoming.blood_group)
            | fill(&mut self.contact, &incoming.contact)
            | fill(&mut self.email, &incoming.email)
            | fill(&mut self.address, &incoming.address)
    }

    fn with_identity(mut self, identity: String) -> Self {
        self.identity = identity;
        self
    }
}

impl CanonicalEntity for CanonicalDoctor {
    const ROLE: ReferenceRole = ReferenceRole::Doctor;

    fn normalize(record: &Value) -> Result<Self, ReferenceError> {
        normalize_doctor(record)
    }

    fn named(identity: String, display_name: String) -> Self {
        CanonicalDoctor::named(identity, display_name)
    }

    fn identity(&self) -> &str {
        &self.identity
    }

    fn display_name(&self) -> &str {
        &self.display_name
    }

    fn detail(&self) -> Option<String> {
        self.specialization.clone()
    }

    fn fill_missing(&mut self, incoming: &Self) -> bool {
        fill_name(&mut self.display_name, &incoming.display_name)
            | fill(&mut self.specialization, &incoming.specialization)
            | fill(&mut self.contact, &incoming.contact)
    }

    fn with_identity(mut self, identity: String) -> Self {
        self.identity = identity;
        self
    }
}
