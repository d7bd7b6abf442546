// libs/appointment-cell/src/services/filter.rs
use chrono::NaiveDate;

use reference_cell::{ReferenceLookup, ReferenceRole, ResolutionState};

use crate::models::{AppointmentFilter, NormalizedAppointment};

/// Appointments matching every criterion in `criteria`, in their original order.
///
/// The text query is matched case-insensitively against the resolved patient
/// and doctor names. Names still loading are not matched; last-known-good
/// fallbacks are.
pub fn filter(
    appointments: &[NormalizedAppointment],
    criteria: &AppointmentFilter,
    lookup: &dyn ReferenceLookup,
    today: NaiveDate,
) -> Vec<NormalizedAppointment> {
    let needle = criteria
        .query
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_lowercase);

    appointments
        .iter()
        .filter(|appointment| criteria.status.map_or(true, |status| appointment.status == status))
        .filter(|appointment| criteria.date_bucket.contains(appointment.date, today))
        .filter(|appointment| match &needle {
            Some(needle) => matches_query(appointment, needle, lookup),
            None => true,
        })
        .cloned()
        .collect()
}

fn matches_query(appointment: &NormalizedAppointment, needle: &str, lookup: &dyn ReferenceLookup) -> bool {
    [ReferenceRole::Patient, ReferenceRole::Doctor].into_iter().any(|role| {
        let display = lookup.display(appointment, role);
        display.state != ResolutionState::Loading && display.value.to_lowercase().contains(needle)
    })
}
