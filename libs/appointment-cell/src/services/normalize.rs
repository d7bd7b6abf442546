// libs/appointment-cell/src/services/normalize.rs
use serde_json::Value;
use tracing::{debug, warn};

use reference_cell::services::fields::resolve_string;
use reference_cell::{CanonicalField, RecordKind, ReferenceError};
use shared_utils::time::{parse_calendar_date, parse_clock_time};

use crate::models::{AppointmentStatus, NormalizedAppointment};

const KIND: RecordKind = RecordKind::Appointment;

pub fn normalize_appointment(record: &Value) -> Result<NormalizedAppointment, ReferenceError> {
    let identity = resolve_string(record, KIND, CanonicalField::Identity)
        .ok_or(ReferenceError::IdentityResolutionFailure { kind: KIND })?;

    let raw_date = resolve_string(record, KIND, CanonicalField::Date);
    let date = raw_date.as_deref().and_then(parse_calendar_date);
    if date.is_none() {
        debug!("Appointment {} has no usable date ({:?})", identity, raw_date);
    }

    let status = match resolve_string(record, KIND, CanonicalField::Status) {
        Some(raw) => AppointmentStatus::parse_lenient(&raw).unwrap_or_else(|| {
            debug!("Unknown status {:?} on appointment {}, treating as pending", raw, identity);
            AppointmentStatus::Pending
        }),
        None => AppointmentStatus::Pending,
    };

    Ok(NormalizedAppointment {
        patient_ref: resolve_string(record, KIND, CanonicalField::PatientRef),
        doctor_ref: resolve_string(record, KIND, CanonicalField::DoctorRef),
        date,
        time: resolve_string(record, KIND, CanonicalField::Time)
            .as_deref()
            .and_then(parse_clock_time),
        appointment_type: resolve_string(record, KIND, CanonicalField::Type),
        status,
        notes: resolve_string(record, KIND, CanonicalField::Notes),
        raw: record.clone(),
        identity,
    })
}

/// Normalizes every row that has an identity; returns the rows and how many were skipped.
pub fn normalize_appointments(records: &[Value]) -> (Vec<NormalizedAppointment>, usize) {
    let mut appointments = Vec::with_capacity(records.len());
    let mut skipped = 0;

    for record in records {
        match normalize_appointment(record) {
            Ok(appointment) => appointments.push(appointment),
            Err(e) => {
                skipped += 1;
                debug!("Skipping appointment row: {}", e);
            }
        }
    }

    if skipped > 0 {
        warn!("Skipped {} appointment rows without an identity", skipped);
    }

    (appointments, skipped)
}
