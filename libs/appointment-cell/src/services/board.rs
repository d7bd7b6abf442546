// libs/appointment-cell/src/services/board.rs
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{Local, NaiveDate};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use reference_cell::{
    normalize_doctor, normalize_patient, FallbackFetchChain, LazyReferenceResolver, ReferenceRole,
};
use shared_models::session::{Role, Session};

use crate::models::{
    AppointmentFilter, AppointmentRow, AppointmentStatus, LoadSummary, NormalizedAppointment,
    TransitionAction, TransitionError,
};
use crate::services::filter::filter;
use crate::services::lifecycle::AppointmentStatusMachine;
use crate::services::normalize::normalize_appointments;
use crate::services::write_back::StatusWriteBack;

type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

/// The session's working set of appointments plus everything needed to
/// display and transition them.
pub struct AppointmentBoard {
    resolver: Arc<LazyReferenceResolver>,
    chain: FallbackFetchChain,
    write_back: StatusWriteBack,
    machine: AppointmentStatusMachine,
    appointments: RwLock<Vec<NormalizedAppointment>>,
    transitions: Mutex<HashSet<String>>,
    load_lock: tokio::sync::Mutex<()>,
    loaded: AtomicBool,
    degraded: AtomicBool,
    clock: Clock,
}

impl AppointmentBoard {
    pub fn new(resolver: Arc<LazyReferenceResolver>) -> Self {
        let backend = resolver.backend();
        let endpoints = resolver.endpoints().clone();

        Self {
            chain: FallbackFetchChain::new(Arc::clone(&backend), endpoints.clone()),
            write_back: StatusWriteBack::new(backend, endpoints),
            machine: AppointmentStatusMachine::new(),
            appointments: RwLock::new(Vec::new()),
            transitions: Mutex::new(HashSet::new()),
            load_lock: tokio::sync::Mutex::new(()),
            loaded: AtomicBool::new(false),
            degraded: AtomicBool::new(false),
            clock: Arc::new(|| Local::now().date_naive()),
            resolver,
        }
    }

    /// Fixes "today" for check-in rules and date buckets.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDate + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn today(&self) -> NaiveDate {
        (self.clock)()
    }

    pub fn resolver(&self) -> &LazyReferenceResolver {
        &self.resolver
    }

    pub fn machine(&self) -> &AppointmentStatusMachine {
        &self.machine
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    /// Reloads the working set through the fetch chain and warms the
    /// reference caches. An unavailable appointment list leaves an empty,
    /// degraded working set rather than failing.
    ///
    /// Loads never overlap; a caller arriving mid-load waits for it and then
    /// runs its own.
    pub async fn load(&self) -> LoadSummary {
        let _loading = self.load_lock.lock().await;
        self.reload().await
    }

    /// Loads once. Concurrent first callers share a single load; later calls
    /// are no-ops until an explicit `load`.
    pub async fn ensure_loaded(&self) {
        if self.is_loaded() {
            return;
        }

        let _loading = self.load_lock.lock().await;
        if self.is_loaded() {
            debug!("Working set loaded while waiting");
            return;
        }

        self.reload().await;
    }

    #[instrument(skip(self))]
    async fn reload(&self) -> LoadSummary {
        let records = match self.chain.fetch_appointments().await {
            Ok(records) => records,
            Err(e) => {
                warn!("Appointment list unavailable: {}", e);
                self.replace_all(Vec::new(), true);
                return LoadSummary {
                    degraded: true,
                    ..LoadSummary::default()
                };
            }
        };

        let (appointments, skipped) = normalize_appointments(&records);
        self.seed_embedded_references(&records);

        // Embedded patients need no per-identity fallback.
        let patient_refs: Vec<String> = distinct_refs(&appointments, ReferenceRole::Patient)
            .into_iter()
            .filter(|identity| !self.resolver.patients().has(identity))
            .collect();

        let patients = self
            .chain
            .fetch_patients(self.resolver.patients(), &patient_refs)
            .await
            .map(|loaded| loaded.len())
            .unwrap_or_else(|e| {
                warn!("Patient list unavailable, resolving lazily: {}", e);
                0
            });

        let doctors = self
            .chain
            .fetch_doctors(self.resolver.doctors())
            .await
            .map(|loaded| loaded.len())
            .unwrap_or_else(|e| {
                warn!("Doctor list unavailable, resolving lazily: {}", e);
                0
            });

        let summary = LoadSummary {
            appointments: appointments.len(),
            skipped,
            patients,
            doctors,
            degraded: false,
        };

        self.replace_all(appointments, false);
        info!(
            "Loaded {} appointments ({} skipped), {} patients, {} doctors",
            summary.appointments, summary.skipped, summary.patients, summary.doctors
        );

        summary
    }

    pub fn get(&self, identity: &str) -> Option<NormalizedAppointment> {
        self.read()
            .iter()
            .find(|appointment| appointment.identity == identity)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appointments the session may see: its own as patient or doctor, all as admin.
    pub fn visible_to(&self, session: &Session) -> Vec<NormalizedAppointment> {
        self.read()
            .iter()
            .filter(|appointment| is_visible(appointment, session))
            .cloned()
            .collect()
    }

    /// Starts lookups for every patient and doctor the session can see,
    /// without building rows.
    pub fn prefetch_references(&self, session: &Session) {
        let visible = self.visible_to(session);
        for role in [ReferenceRole::Patient, ReferenceRole::Doctor] {
            let refs = distinct_refs(&visible, role);
            self.resolver.prefetch(refs.iter().map(String::as_str), role);
        }
    }

    pub fn search(&self, session: &Session, criteria: &AppointmentFilter) -> Vec<NormalizedAppointment> {
        filter(&self.visible_to(session), criteria, &*self.resolver, self.today())
    }

    /// Filtered rows with resolved names and the session's legal actions.
    pub fn rows(&self, session: &Session, criteria: &AppointmentFilter) -> Vec<AppointmentRow> {
        let today = self.today();
        self.search(session, criteria)
            .into_iter()
            .map(|appointment| self.row_for(appointment, session.role, today))
            .collect()
    }

    pub fn row(&self, identity: &str, session: &Session) -> Option<AppointmentRow> {
        self.get(identity)
            .filter(|appointment| is_visible(appointment, session))
            .map(|appointment| self.row_for(appointment, session.role, self.today()))
    }

    fn row_for(&self, appointment: NormalizedAppointment, role: Role, today: NaiveDate) -> AppointmentRow {
        AppointmentRow {
            patient: self.resolver.resolve_display(&appointment, ReferenceRole::Patient),
            doctor: self.resolver.resolve_display(&appointment, ReferenceRole::Doctor),
            legal_actions: self.machine.legal_actions(&appointment, role, today),
            appointment,
        }
    }

    /// Applies `action` optimistically, writes it back, and rolls back if the
    /// backend refuses. A status reported by the server wins over the local one.
    #[instrument(skip(self, session), fields(user = %session.user_id, role = %session.role))]
    pub async fn transition(
        &self,
        identity: &str,
        action: TransitionAction,
        session: &Session,
        today: NaiveDate,
    ) -> Result<NormalizedAppointment, TransitionError> {
        let _claim = TransitionClaim::acquire(&self.transitions, identity)?;

        let current = self
            .get(identity)
            .filter(|appointment| is_visible(appointment, session))
            .ok_or_else(|| TransitionError::NotFound {
            identity: identity.to_string(),
        })?;

        let optimistic = self.machine.transition(&current, action, session.role, today)?;
        self.set_status(identity, current.status, optimistic.status);
        debug!("Optimistically moved {} from {} to {}", identity, current.status, optimistic.status);

        match self.write_back.write_status(&optimistic, optimistic.status).await {
            Ok(server_status) => {
                let settled = server_status.unwrap_or(optimistic.status);
                if settled != optimistic.status {
                    warn!(
                        "Server reports {} for appointment {} after {}, keeping server value",
                        settled, identity, action
                    );
                    self.set_status(identity, optimistic.status, settled);
                }

                info!("Appointment {} is now {}", identity, settled);
                Ok(optimistic.with_status(settled))
            }
            Err(cause) => {
                self.set_status(identity, optimistic.status, current.status);
                warn!("Rolled appointment {} back to {}: {}", identity, current.status, cause);
                Err(TransitionError::TransitionRejected {
                    identity: identity.to_string(),
                    cause,
                })
            }
        }
    }

    pub fn transition_in_flight(&self, identity: &str) -> bool {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(identity)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<NormalizedAppointment>> {
        self.appointments.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn replace_all(&self, appointments: Vec<NormalizedAppointment>, degraded: bool) {
        *self.appointments.write().unwrap_or_else(PoisonError::into_inner) = appointments;
        self.degraded.store(degraded, Ordering::Release);
        self.loaded.store(true, Ordering::Release);
    }

    // Only moves the status if nobody replaced it in the meantime (e.g. a reload).
    fn set_status(&self, identity: &str, expected: AppointmentStatus, next: AppointmentStatus) {
        let mut appointments = self.appointments.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(appointment) = appointments
            .iter_mut()
            .find(|appointment| appointment.identity == identity && appointment.status == expected)
        {
            appointment.status = next;
        }
    }

    // Appointments that embed `patient`/`doctor` objects with names feed the caches directly.
    fn seed_embedded_references(&self, records: &[Value]) {
        for record in records {
            if let Some(patient) = record.get("patient").filter(|v| v.is_object()) {
                if let Ok(patient) = normalize_patient(patient) {
                    self.resolver.patients().upsert_merge(patient);
                }
            }
            if let Some(doctor) = record.get("doctor").filter(|v| v.is_object()) {
                if let Ok(doctor) = normalize_doctor(doctor) {
                    self.resolver.doctors().upsert_merge(doctor);
                }
            }
        }
    }
}

fn is_visible(appointment: &NormalizedAppointment, session: &Session) -> bool {
    match session.role {
        Role::Admin => true,
        Role::Patient => appointment.patient_ref.as_deref() == Some(session.user_id.as_str()),
        Role::Doctor => appointment.doctor_ref.as_deref() == Some(session.user_id.as_str()),
    }
}

fn distinct_refs(appointments: &[NormalizedAppointment], role: ReferenceRole) -> Vec<String> {
    let mut seen = HashSet::new();
    appointments
        .iter()
        .filter_map(|appointment| match role {
            ReferenceRole::Patient => appointment.patient_ref.clone(),
            ReferenceRole::Doctor => appointment.doctor_ref.clone(),
        })
        .filter(|identity| seen.insert(identity.clone()))
        .collect()
}

/// Marks an appointment as having a transition in flight until dropped.
struct TransitionClaim<'a> {
    transitions: &'a Mutex<HashSet<String>>,
    identity: String,
}

impl<'a> TransitionClaim<'a> {
    fn acquire(transitions: &'a Mutex<HashSet<String>>, identity: &str) -> Result<Self, TransitionError> {
        let mut in_flight = transitions.lock().unwrap_or_else(PoisonError::into_inner);
        if !in_flight.insert(identity.to_string()) {
            warn!("Transition already in flight for appointment {}", identity);
            return Err(TransitionError::TransitionInProgress {
                identity: identity.to_string(),
            });
        }

        Ok(Self {
            transitions,
            identity: identity.to_string(),
        })
    }
}

impl Drop for TransitionClaim<'_> {
    fn drop(&mut self) {
        self.transitions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.identity);
    }
}
