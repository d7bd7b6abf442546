// libs/appointment-cell/src/services/write_back.rs
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use reference_cell::services::fields::{aliases, resolve_string};
use reference_cell::{extract_single, CanonicalField, CollectionKind, EndpointCatalog, RecordKind};
use shared_database::ClinicBackend;
use shared_utils::time::{format_ui_time, to_backend_time};

use crate::models::{AppointmentStatus, NormalizedAppointment};

/// Pushes a status change to the backend: the targeted status endpoint first,
/// then a full-record replace when that fails.
pub struct StatusWriteBack {
    backend: Arc<dyn ClinicBackend>,
    endpoints: EndpointCatalog,
}

impl StatusWriteBack {
    pub fn new(backend: Arc<dyn ClinicBackend>, endpoints: EndpointCatalog) -> Self {
        Self { backend, endpoints }
    }

    /// Returns the status the server reports back, when it reports one.
    #[instrument(skip(self, appointment), fields(identity = %appointment.identity))]
    pub async fn write_status(
        &self,
        appointment: &NormalizedAppointment,
        status: AppointmentStatus,
    ) -> Result<Option<AppointmentStatus>, String> {
        let record_path = self.endpoints.by_id(CollectionKind::Appointments, &appointment.identity);
        let status_path = format!("{}/status?status={}", record_path, urlencoding::encode(&status.to_string()));

        let targeted_error = match self.backend.put(&status_path, None).await {
            Ok(body) => {
                debug!("Targeted status update accepted");
                return Ok(server_status(&body));
            }
            Err(e) => e.to_string(),
        };

        warn!("Targeted status update failed ({}), falling back to full replace", targeted_error);

        let body = full_replace_body(appointment, status);
        match self.backend.put(&record_path, Some(body)).await {
            Ok(body) => Ok(server_status(&body)),
            Err(e) => Err(format!(
                "status update failed: {}; full replace failed: {}",
                targeted_error, e
            )),
        }
    }
}

/// The stored record with canonical values written over it. Nested
/// `patient`/`doctor` objects collapse to their id fields and the time goes
/// out as `HH:MM:SS`.
pub fn full_replace_body(appointment: &NormalizedAppointment, status: AppointmentStatus) -> Value {
    let mut record = match &appointment.raw {
        Value::Object(map) => map.clone(),
        _ => Map::new(),
    };

    flatten_reference(&mut record, "patient", "patientId", appointment.patient_ref.as_deref());
    flatten_reference(&mut record, "doctor", "doctorId", appointment.doctor_ref.as_deref());

    set_field(&mut record, CanonicalField::Status, Value::String(status.to_string()));

    if let Some(date) = appointment.date {
        set_field(&mut record, CanonicalField::Date, Value::String(date.format("%Y-%m-%d").to_string()));
    }

    if let Some(time) = appointment.time.map(format_ui_time).as_deref().and_then(to_backend_time) {
        set_field(&mut record, CanonicalField::Time, Value::String(time));
    }

    if let Some(kind) = &appointment.appointment_type {
        set_field(&mut record, CanonicalField::Type, Value::String(kind.clone()));
    }

    if let Some(notes) = &appointment.notes {
        set_field(&mut record, CanonicalField::Notes, Value::String(notes.clone()));
    }

    Value::Object(record)
}

fn flatten_reference(record: &mut Map<String, Value>, nested_key: &str, id_key: &str, reference: Option<&str>) {
    if record.get(nested_key).is_some_and(Value::is_object) {
        record.remove(nested_key);
    }

    if let Some(reference) = reference {
        if !record.contains_key(id_key) {
            record.insert(id_key.to_string(), Value::String(reference.to_string()));
        }
    }
}

// Overwrites whichever top-level alias the record already uses, else the primary alias.
fn set_field(record: &mut Map<String, Value>, field: CanonicalField, value: Value) {
    let candidates: Vec<&str> = aliases(RecordKind::Appointment, field)
        .iter()
        .copied()
        .filter(|alias| !alias.contains('.'))
        .collect();

    let key = candidates
        .iter()
        .find(|alias| record.contains_key(**alias))
        .or_else(|| candidates.first())
        .map(|alias| alias.to_string());

    if let Some(key) = key {
        record.insert(key, value);
    }
}

fn server_status(body: &Value) -> Option<AppointmentStatus> {
    let record = extract_single(body)?;
    resolve_string(&record, RecordKind::Appointment, CanonicalField::Status)
        .and_then(|raw| AppointmentStatus::parse_lenient(&raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::normalize::normalize_appointment;
    use serde_json::json;
    use shared_utils::test_utils::MockClinicResponses;

    #[test]
    fn full_replace_flattens_nested_references() {
        let record = MockClinicResponses::nested_appointment_record(7, "6", "12", "2025-07-02", "Scheduled");
        let appointment = normalize_appointment(&record).expect("identity");

        let body = full_replace_body(&appointment, AppointmentStatus::Cancelled);

        assert!(body.get("patient").is_none());
        assert!(body.get("doctor").is_none());
        assert_eq!(body["patientId"], "6");
        assert_eq!(body["doctorId"], "12");
        assert_eq!(body["status"], "Cancelled");
        assert_eq!(body["time"], "10:30:00");
        assert_eq!(body["date"], "2025-07-02");
        assert_eq!(body["notes"], "bring reports");
        assert_eq!(body["appointmentId"], 7);
    }

    #[test]
    fn full_replace_keeps_unmodelled_fields_and_pads_time() {
        let mut record = MockClinicResponses::appointment_record(101, "6", "12", "2025-07-01", "Scheduled");
        record["roomNumber"] = json!("B-12");
        let appointment = normalize_appointment(&record).expect("identity");

        let body = full_replace_body(&appointment, AppointmentStatus::CheckedIn);

        assert_eq!(body["roomNumber"], "B-12");
        assert_eq!(body["appointmentTime"], "09:00:00");
        assert_eq!(body["status"], "CheckedIn");
        assert_eq!(body["pId"], "6");
        assert_eq!(body["patientId"], "6");
        assert!(body.get("time").is_none());
    }

    #[test]
    fn server_status_reads_common_envelopes() {
        assert_eq!(
            server_status(&json!({ "data": { "apId": 1, "status": "completed" } })),
            Some(AppointmentStatus::Completed)
        );
        assert_eq!(server_status(&json!({ "success": true, "message": "updated" })), None);
        assert_eq!(server_status(&Value::Null), None);
    }
}
