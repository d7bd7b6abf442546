// libs/reference-cell/src/services/fields.rs
//
// Ranked alias tables for every canonical field, per record kind. Nested
// aliases are dotted paths. Tables are data so they can be tested on their own.

use serde_json::{Map, Value};

use crate::models::{CanonicalField, RecordKind};

struct AliasTable {
    kind: RecordKind,
    field: CanonicalField,
    aliases: &'static [&'static str],
}

const fn table(
    kind: RecordKind,
    field: CanonicalField,
    aliases: &'static [&'static str],
) -> AliasTable {
    AliasTable { kind, field, aliases }
}

use CanonicalField as F;
use RecordKind as K;

static ALIAS_TABLES: &[AliasTable] = &[
    // Patients
    table(K::Patient, F::Identity, &["id", "pId", "P_ID", "patientId", "ID", "patient.id", "patient.pid", "patient_id", "identity"]),
    table(K::Patient, F::DisplayName, &["displayName", "name", "pName", "patientName", "fullName", "full_name", "patient_name", "patient.name", "patient.fullName"]),
    table(K::Patient, F::FirstName, &["firstName", "first_name", "fName", "patient.firstName", "patient.first_name"]),
    table(K::Patient, F::LastName, &["lastName", "last_name", "lName", "patient.lastName", "patient.last_name"]),
    table(K::Patient, F::Age, &["age", "pAge", "patientAge", "patient.age"]),
    table(K::Patient, F::Gender, &["gender", "pGender", "sex", "patient.gender"]),
    table(K::Patient, F::BloodGroup, &["bloodGroup", "blood_group", "pBloodGroup", "bloodType", "blood_type"]),
    table(K::Patient, F::Contact, &["contact", "pContact", "phone", "phoneNumber", "phone_number", "mobile", "contactNumber"]),
    table(K::Patient, F::Email, &["email", "pEmail", "emailId", "email_address"]),
    table(K::Patient, F::Address, &["address", "pAddress", "patient.address"]),
    // Doctors
    table(K::Doctor, F::Identity, &["id", "dId", "D_ID", "doctorId", "ID", "doctor.id", "doctor.did", "doctor_id", "identity"]),
    table(K::Doctor, F::DisplayName, &["displayName", "name", "dName", "doctorName", "fullName", "full_name", "doctor_name", "doctor.name"]),
    table(K::Doctor, F::FirstName, &["firstName", "first_name", "doctor.firstName", "doctor.first_name"]),
    table(K::Doctor, F::LastName, &["lastName", "last_name", "doctor.lastName", "doctor.last_name"]),
    table(K::Doctor, F::Specialization, &["specialization", "specialisation", "dSpecialization", "speciality", "specialty", "department"]),
    table(K::Doctor, F::Contact, &["contact", "dContact", "phone", "phoneNumber", "phone_number", "mobile"]),
    // Appointments
    table(K::Appointment, F::Identity, &["apId", "appointmentId", "AP_ID", "appointment_id", "id", "ID", "appointment.id", "identity"]),
    table(K::Appointment, F::Date, &["appointmentDate", "appointment_date", "date", "apDate", "scheduledDate"]),
    table(K::Appointment, F::Time, &["appointmentTime", "appointment_time", "time", "apTime", "scheduledTime", "timeSlot"]),
    table(K::Appointment, F::Status, &["status", "appointmentStatus", "apStatus", "state"]),
    table(K::Appointment, F::Type, &["type", "appointmentType", "appointment_type", "apType", "visitType"]),
    table(K::Appointment, F::Notes, &["notes", "note", "remarks", "reason", "description"]),
    table(K::Appointment, F::PatientRef, &["patientRef", "patientId", "pId", "P_ID", "patient_id", "patient.id", "patient.pid", "patient.pId", "patient.patientId"]),
    table(K::Appointment, F::DoctorRef, &["doctorRef", "doctorId", "dId", "D_ID", "doctor_id", "doctor.id", "doctor.did", "doctor.dId", "doctor.doctorId"]),
];

/// The ranked aliases for `field` on a record of `kind`; empty when the field
/// does not apply to that kind.
pub fn aliases(kind: RecordKind, field: CanonicalField) -> &'static [&'static str] {
    ALIAS_TABLES
        .iter()
        .find(|t| t.kind == kind && t.field == field)
        .map(|t| t.aliases)
        .unwrap_or(&[])
}

/// First present value among the aliases of `field`, or `None`.
///
/// Non-object records resolve to `None`. A value is present when it is not
/// `null` and not a blank string.
pub fn resolve(record: &Value, kind: RecordKind, field: CanonicalField) -> Option<&Value> {
    let object = record.as_object()?;

    aliases(kind, field)
        .iter()
        .find_map(|alias| lookup_path(object, alias).filter(|v| is_present(v)))
}

/// Resolved value as a trimmed string; numbers and booleans are stringified.
pub fn resolve_string(record: &Value, kind: RecordKind, field: CanonicalField) -> Option<String> {
    resolve(record, kind, field).and_then(value_to_string)
}

/// Resolved value as a whole number; accepts numbers and strings like `"34"` or `"34 yrs"`.
pub fn resolve_u32(record: &Value, kind: RecordKind, field: CanonicalField) -> Option<u32> {
    match resolve(record, kind, field)? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.trunc() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => {
            let digits: String = s.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// A by-id response without any identity alias gets the identity it was
/// requested under, so it normalizes the same as a record that carries one.
pub fn with_requested_identity(mut record: Value, kind: RecordKind, identity: &str) -> Value {
    if resolve_string(&record, kind, CanonicalField::Identity).is_none() {
        if let Some(object) = record.as_object_mut() {
            object.insert("identity".to_string(), Value::String(identity.to_string()));
        }
    }

    record
}

pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

fn lookup_path<'a>(object: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let first = segments.next()?;
    let mut current = lookup_key(object, first)?;

    for segment in segments {
        current = lookup_key(current.as_object()?, segment)?;
    }

    Some(current)
}

// Exact key first, then the first case-insensitive match.
fn lookup_key<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_patient_identity_alias_resolves() {
        for alias in aliases(K::Patient, F::Identity) {
            let record = match alias.split_once('.') {
                Some((outer, inner)) => json!({ outer: { inner: "6" } }),
                None => json!({ *alias: "6" }),
            };
            assert_eq!(
                resolve_string(&record, K::Patient, F::Identity).as_deref(),
                Some("6"),
                "alias {} should resolve",
                alias
            );
        }
    }

    #[test]
    fn record_without_alias_resolves_to_none() {
        let record = json!({ "name": "Nisha", "age": 30 });
        assert_eq!(resolve(&record, K::Patient, F::Identity), None);
        assert_eq!(resolve(&Value::Null, K::Patient, F::Identity), None);
        assert_eq!(resolve(&json!(["6"]), K::Patient, F::Identity), None);
    }

    #[test]
    fn alias_order_decides_between_present_keys() {
        let record = json!({ "patientId": "P-9", "pId": "6" });
        assert_eq!(resolve_string(&record, K::Patient, F::Identity).as_deref(), Some("6"));
    }

    #[test]
    fn exact_match_wins_over_case_insensitive() {
        let record = json!({ "PID": "upper", "pId": "exact" });
        assert_eq!(resolve_string(&record, K::Patient, F::Identity).as_deref(), Some("exact"));

        let record = json!({ "PATIENTID": "only-upper" });
        assert_eq!(resolve_string(&record, K::Patient, F::Identity).as_deref(), Some("only-upper"));
    }

    #[test]
    fn empty_strings_and_nulls_fall_through() {
        let record = json!({ "id": "", "pId": null, "P_ID": 6 });
        assert_eq!(resolve_string(&record, K::Patient, F::Identity).as_deref(), Some("6"));
    }

    #[test]
    fn appointment_kind_reads_patient_reference_not_identity() {
        let record = json!({ "pId": "6", "apId": 101 });
        assert_eq!(resolve_string(&record, K::Appointment, F::Identity).as_deref(), Some("101"));
        assert_eq!(resolve_string(&record, K::Appointment, F::PatientRef).as_deref(), Some("6"));
    }

    #[test]
    fn nested_reference_resolves() {
        let record = json!({ "doctor": { "id": 12, "name": "Dr. Rao" } });
        assert_eq!(resolve_string(&record, K::Appointment, F::DoctorRef).as_deref(), Some("12"));
    }

    #[test]
    fn inapplicable_field_has_no_aliases() {
        assert!(aliases(K::Doctor, F::BloodGroup).is_empty());
        assert_eq!(resolve(&json!({ "bloodGroup": "O+" }), K::Doctor, F::BloodGroup), None);
    }

    #[test]
    fn ages_parse_from_numbers_and_text() {
        assert_eq!(resolve_u32(&json!({ "age": 34 }), K::Patient, F::Age), Some(34));
        assert_eq!(resolve_u32(&json!({ "pAge": "41 yrs" }), K::Patient, F::Age), Some(41));
        assert_eq!(resolve_u32(&json!({ "age": 29.7 }), K::Patient, F::Age), Some(29));
        assert_eq!(resolve_u32(&json!({ "age": "unknown" }), K::Patient, F::Age), None);
    }

    #[test]
    fn requested_identity_fills_only_a_missing_identity() {
        let idless = with_requested_identity(json!({ "name": "Tanuj Kulal" }), K::Patient, "6");
        assert_eq!(resolve_string(&idless, K::Patient, F::Identity).as_deref(), Some("6"));

        let carried = with_requested_identity(json!({ "pId": "7" }), K::Patient, "6");
        assert_eq!(resolve_string(&carried, K::Patient, F::Identity).as_deref(), Some("7"));
        assert!(carried.get("identity").is_none());
    }
}
