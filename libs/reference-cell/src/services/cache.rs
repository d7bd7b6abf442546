// libs/reference-cell/src/services/cache.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};

use tracing::debug;

use crate::models::CanonicalEntity;

#[derive(Debug, Clone)]
pub struct CacheEntry<E> {
    pub entity: E,
    /// Monotonic marker, bumped whenever a merge changes the stored entity.
    pub last_updated: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    Unchanged,
}

/// Session-lifetime store of canonical patients or doctors, keyed by identity.
///
/// Holds at most one entity per identity. Merging only fills fields the stored
/// entity is missing, so a known value is never replaced by an absent one.
pub struct ReferenceCache<E> {
    entries: RwLock<HashMap<String, CacheEntry<E>>>,
    clock: AtomicU64,
}

impl<E: CanonicalEntity> Default for ReferenceCache<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CanonicalEntity> ReferenceCache<E> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock: AtomicU64::new(0),
        }
    }

    pub fn get(&self, identity: &str) -> Option<E> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(identity)
            .map(|entry| entry.entity.clone())
    }

    pub fn has(&self, identity: &str) -> bool {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(identity)
    }

    /// Stores `entity` only when its identity is not cached yet.
    pub fn insert_if_absent(&self, entity: E) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.contains_key(entity.identity()) {
            return false;
        }

        let identity = entity.identity().to_string();
        let last_updated = self.tick();
        entries.insert(identity, CacheEntry { entity, last_updated });
        true
    }

    pub fn upsert_merge(&self, entity: E) -> MergeOutcome {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries.get_mut(entity.identity()) {
            Some(existing) => {
                if existing.entity.fill_missing(&entity) {
                    existing.last_updated = self.tick();
                    debug!("Merged missing fields into {} {}", E::ROLE, entity.identity());
                    MergeOutcome::Updated
                } else {
                    MergeOutcome::Unchanged
                }
            }
            None => {
                let identity = entity.identity().to_string();
                let last_updated = self.tick();
                entries.insert(identity, CacheEntry { entity, last_updated });
                MergeOutcome::Inserted
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }
}
