// libs/reference-cell/src/services/lazy.rs
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use futures::future::join_all;
use serde_json::Value;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use shared_database::ClinicBackend;

use crate::error::ReferenceError;
use crate::models::{
    CanonicalDoctor, CanonicalEntity, CanonicalPatient, EndpointCatalog,
    RecordKind, ReferenceRole, ResolvedDisplay,
};
use crate::services::cache::ReferenceCache;
use crate::services::directory::LastKnownGoodDirectory;
use crate::services::fetch_chain::fetch_single;
use crate::services::fields::{resolve_string, with_requested_identity};

/// Anything that can name the patient or doctor it points at.
pub trait ReferenceSource {
    fn reference(&self, role: ReferenceRole) -> Option<String>;
}

impl ReferenceSource for Value {
    fn reference(&self, role: ReferenceRole) -> Option<String> {
        resolve_string(self, RecordKind::Appointment, role.reference_field())
    }
}

/// Display lookup used by views that render references.
pub trait ReferenceLookup: Send + Sync {
    fn display(&self, source: &dyn ReferenceSource, role: ReferenceRole) -> ResolvedDisplay;
}

type TrackerKey = (ReferenceRole, String);

#[derive(Debug, Default)]
struct Tracker {
    in_flight: HashSet<TrackerKey>,
    failed: HashSet<TrackerKey>,
}

/// Resolves patient and doctor references to display values, fetching
/// uncached identities in the background.
///
/// At most one fetch per (role, identity) is in flight at a time. While it
/// runs the last-known-good name is shown if there is one, otherwise a
/// loading marker. Background tasks only hold weak handles to the caches, so
/// a completion that lands after the resolver is gone does nothing.
pub struct LazyReferenceResolver {
    backend: Arc<dyn ClinicBackend>,
    endpoints: EndpointCatalog,
    patients: Arc<ReferenceCache<CanonicalPatient>>,
    doctors: Arc<ReferenceCache<CanonicalDoctor>>,
    directory: Arc<LastKnownGoodDirectory>,
    tracker: Arc<Mutex<Tracker>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LazyReferenceResolver {
    pub fn new(
        backend: Arc<dyn ClinicBackend>,
        endpoints: EndpointCatalog,
        directory: Arc<LastKnownGoodDirectory>,
    ) -> Self {
        Self {
            backend,
            endpoints,
            patients: Arc::new(ReferenceCache::new()),
            doctors: Arc::new(ReferenceCache::new()),
            directory,
            tracker: Arc::new(Mutex::new(Tracker::default())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn backend(&self) -> Arc<dyn ClinicBackend> {
        Arc::clone(&self.backend)
    }

    pub fn endpoints(&self) -> &EndpointCatalog {
        &self.endpoints
    }

    pub fn patients(&self) -> &ReferenceCache<CanonicalPatient> {
        &self.patients
    }

    pub fn doctors(&self) -> &ReferenceCache<CanonicalDoctor> {
        &self.doctors
    }

    pub fn directory(&self) -> &LastKnownGoodDirectory {
        &self.directory
    }

    pub fn resolve_display<S: ReferenceSource + ?Sized>(
        &self,
        source: &S,
        role: ReferenceRole,
    ) -> ResolvedDisplay {
        match source.reference(role) {
            Some(identity) => self.resolve_identity(&identity, role),
            None => ResolvedDisplay::missing(role),
        }
    }

    pub fn resolve_identity(&self, identity: &str, role: ReferenceRole) -> ResolvedDisplay {
        match role {
            ReferenceRole::Patient => self.resolve_in(&self.patients, identity),
            ReferenceRole::Doctor => self.resolve_in(&self.doctors, identity),
        }
    }

    /// Starts fetches for every uncached identity without waiting for them.
    pub fn prefetch<'a, I>(&self, identities: I, role: ReferenceRole)
    where
        I: IntoIterator<Item = &'a str>,
    {
        for identity in identities {
            self.resolve_identity(identity, role);
        }
    }

    pub fn in_flight_count(&self) -> usize {
        self.lock_tracker().in_flight.len()
    }

    pub fn is_in_flight(&self, role: ReferenceRole, identity: &str) -> bool {
        self.lock_tracker()
            .in_flight
            .contains(&(role, identity.to_string()))
    }

    /// Waits until every fetch started so far (and any they led to) has completed.
    pub async fn settle(&self) {
        loop {
            let pending = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
            if pending.is_empty() {
                break;
            }

            for result in join_all(pending).await {
                if let Err(e) = result {
                    warn!("Reference fetch task ended abnormally: {}", e);
                }
            }
        }
    }

    fn lock_tracker(&self) -> std::sync::MutexGuard<'_, Tracker> {
        self.tracker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve_in<E: CanonicalEntity>(&self, cache: &Arc<ReferenceCache<E>>, identity: &str) -> ResolvedDisplay {
        if let Some(entity) = cache.get(identity) {
            return ready_display(&entity);
        }

        let role = E::ROLE;
        let key = (role, identity.to_string());

        let start_fetch = {
            let mut tracker = self.lock_tracker();

            if tracker.failed.contains(&key) {
                return ResolvedDisplay::ready(role.unknown_label(), Some(identity.to_string()), None);
            }

            if tracker.in_flight.contains(&key) {
                false
            } else {
                // A fetch may have landed between the first lookup and taking the lock.
                if let Some(entity) = cache.get(identity) {
                    return ready_display(&entity);
                }
                tracker.in_flight.insert(key);
                true
            }
        };

        if start_fetch {
            self.spawn_fetch(cache, identity.to_string());
        }

        self.pending_display(role, identity)
    }

    fn pending_display(&self, role: ReferenceRole, identity: &str) -> ResolvedDisplay {
        match self.directory.lookup(role, identity) {
            Some(name) => ResolvedDisplay::fallback(name, identity.to_string()),
            None => ResolvedDisplay::loading(identity.to_string()),
        }
    }

    fn spawn_fetch<E: CanonicalEntity>(&self, cache: &Arc<ReferenceCache<E>>, identity: String) {
        let role = E::ROLE;

        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available to fetch {} {}", role, identity);
                self.lock_tracker().in_flight.remove(&(role, identity));
                return;
            }
        };

        debug!("Fetching {} {} in the background", role, identity);

        let backend = Arc::clone(&self.backend);
        let path = self.endpoints.by_id(role.collection(), &identity);
        let cache = Arc::downgrade(cache);
        let directory = Arc::downgrade(&self.directory);
        let tracker = Arc::downgrade(&self.tracker);

        let task = handle.spawn(async move {
            let outcome = fetch_single(backend.as_ref(), &path).await;
            complete_fetch(cache, directory, tracker, identity, outcome);
        });

        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }
}

impl ReferenceLookup for LazyReferenceResolver {
    fn display(&self, source: &dyn ReferenceSource, role: ReferenceRole) -> ResolvedDisplay {
        self.resolve_display(source, role)
    }
}

fn ready_display<E: CanonicalEntity>(entity: &E) -> ResolvedDisplay {
    ResolvedDisplay::ready(
        entity.display_name(),
        Some(entity.identity().to_string()),
        entity.detail(),
    )
}

fn complete_fetch<E: CanonicalEntity>(
    cache: Weak<ReferenceCache<E>>,
    directory: Weak<LastKnownGoodDirectory>,
    tracker: Weak<Mutex<Tracker>>,
    identity: String,
    outcome: Result<Value, String>,
) {
    let (Some(cache), Some(directory), Some(tracker)) = (cache.upgrade(), directory.upgrade(), tracker.upgrade())
    else {
        debug!("Dropping late {} {} result, resolver is gone", E::ROLE, identity);
        return;
    };

    let role = E::ROLE;
    let normalized = outcome.and_then(|record| {
        E::normalize(&with_requested_identity(record, role.record_kind(), &identity)).map_err(|e| e.to_string())
    });

    let mut failed = false;

    match normalized {
        Ok(entity) => {
            let entity = entity.with_identity(identity.clone());
            let placeholder = !entity.has_real_name();

            directory.remember(role, &identity, entity.display_name());
            cache.upsert_merge(entity);

            if placeholder {
                if let Some(name) = directory.lookup(role, &identity) {
                    cache.upsert_merge(E::named(identity.clone(), name));
                }
            }
            info!("Resolved {} {}", role, identity);
        }
        Err(cause) => {
            let error = ReferenceError::ReferenceFetchFailure {
                role,
                identity: identity.clone(),
                cause,
            };
            warn!("{}", error);

            match directory.lookup(role, &identity) {
                Some(name) => {
                    cache.insert_if_absent(E::named(identity.clone(), name));
                }
                None => failed = true,
            }
        }
    }

    let key = (role, identity);
    let mut tracker = tracker.lock().unwrap_or_else(PoisonError::into_inner);
    tracker.in_flight.remove(&key);
    if failed {
        tracker.failed.insert(key);
    }
}

// A by-id response may omit the identity; the requested one stands in.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResolutionState, LOADING, NO_PATIENT_ID, UNKNOWN_DOCTOR};
    use serde_json::json;
    use shared_utils::test_utils::{MockClinicResponses, ScriptedBackend};

    fn resolver(backend: Arc<ScriptedBackend>, directory: LastKnownGoodDirectory) -> LazyReferenceResolver {
        LazyReferenceResolver::new(backend, EndpointCatalog::default(), Arc::new(directory))
    }

    #[test]
    fn value_sources_read_appointment_references() {
        let record = json!({ "apId": 101, "pId": "6", "doctor": { "id": 12 } });
        assert_eq!(record.reference(ReferenceRole::Patient).as_deref(), Some("6"));
        assert_eq!(record.reference(ReferenceRole::Doctor).as_deref(), Some("12"));
        assert_eq!(json!({ "apId": 1 }).reference(ReferenceRole::Patient), None);
    }

    #[tokio::test]
    async fn missing_references_use_sentinels() {
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend.clone(), LastKnownGoodDirectory::new());
        let record = json!({ "apId": 101 });

        let patient = resolver.resolve_display(&record, ReferenceRole::Patient);
        assert_eq!(patient.value, NO_PATIENT_ID);
        assert_eq!(patient.state, ResolutionState::Ready);

        let doctor = resolver.resolve_display(&record, ReferenceRole::Doctor);
        assert_eq!(doctor.value, UNKNOWN_DOCTOR);
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn cached_identity_resolves_without_fetching() {
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend.clone(), LastKnownGoodDirectory::new());

        let mut patient = CanonicalPatient::named("6", "Tanuj Kulal");
        patient.age = Some(34);
        resolver.patients().upsert_merge(patient);

        let display = resolver.resolve_identity("6", ReferenceRole::Patient);
        assert_eq!(display.value, "Tanuj Kulal");
        assert_eq!(display.detail.as_deref(), Some("34 yrs"));
        assert!(display.is_ready());
        assert_eq!(backend.total_calls(), 0);
    }

    #[tokio::test]
    async fn uncached_identity_shows_loading_then_resolves() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond("GET", "/doctors/12", MockClinicResponses::doctor_record("12", "Dr. Rao", "ENT"));
        let resolver = resolver(backend.clone(), LastKnownGoodDirectory::new());

        let first = resolver.resolve_identity("12", ReferenceRole::Doctor);
        assert_eq!(first.value, LOADING);
        assert_eq!(first.state, ResolutionState::Loading);

        resolver.settle().await;

        let second = resolver.resolve_identity("12", ReferenceRole::Doctor);
        assert_eq!(second.value, "Dr. Rao");
        assert_eq!(second.detail.as_deref(), Some("ENT"));
        assert_eq!(resolver.directory().lookup(ReferenceRole::Doctor, "12").as_deref(), Some("Dr. Rao"));
        assert_eq!(resolver.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn failed_fetch_without_directory_entry_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.fail("GET", "/patients/99", "Resource not found");
        let resolver = resolver(backend.clone(), LastKnownGoodDirectory::new());

        resolver.resolve_identity("99", ReferenceRole::Patient);
        resolver.settle().await;

        let display = resolver.resolve_identity("99", ReferenceRole::Patient);
        assert_eq!(display.value, "Unknown Patient");
        assert!(display.is_ready());
        assert_eq!(backend.calls("GET", "/patients/99"), 1);
    }

    #[tokio::test]
    async fn response_without_identity_keeps_requested_one() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.respond("GET", "/patients/6", json!({ "data": { "name": "Tanuj Kulal" } }));
        let resolver = resolver(backend, LastKnownGoodDirectory::new());

        resolver.resolve_identity("6", ReferenceRole::Patient);
        resolver.settle().await;

        assert_eq!(resolver.patients().get("6").expect("cached").display_name, "Tanuj Kulal");
    }

    #[test]
    fn no_runtime_leaves_nothing_in_flight() {
        let backend = Arc::new(ScriptedBackend::new());
        let resolver = resolver(backend, LastKnownGoodDirectory::new());

        let display = resolver.resolve_identity("6", ReferenceRole::Patient);
        assert_eq!(display.state, ResolutionState::Loading);
        assert_eq!(resolver.in_flight_count(), 0);
    }
}
