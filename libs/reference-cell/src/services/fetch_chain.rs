// libs/reference-cell/src/services/fetch_chain.rs
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use shared_database::ClinicBackend;

use crate::error::ReferenceError;
use crate::models::{
    CanonicalDoctor, CanonicalEntity, CanonicalField, CanonicalPatient, CollectionKind, EndpointCatalog,
};
use crate::services::cache::ReferenceCache;
use crate::services::fields::{resolve_string, with_requested_identity};

/// How a usable array was found in a list response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    DataEnvelope,
    BareArray,
    LargestArrayProperty,
}

impl fmt::Display for ResponseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseShape::DataEnvelope => write!(f, "data envelope"),
            ResponseShape::BareArray => write!(f, "bare array"),
            ResponseShape::LargestArrayProperty => write!(f, "largest array property"),
        }
    }
}

/// Retrieves a collection by trying each list endpoint and response shape in
/// order, then (for patients) one request per already-known identity.
///
/// Strategies run strictly one after another; a failing strategy is logged and
/// the next one is tried.
pub struct FallbackFetchChain {
    backend: Arc<dyn ClinicBackend>,
    endpoints: EndpointCatalog,
}

impl FallbackFetchChain {
    pub fn new(backend: Arc<dyn ClinicBackend>, endpoints: EndpointCatalog) -> Self {
        Self { backend, endpoints }
    }

    pub fn endpoints(&self) -> &EndpointCatalog {
        &self.endpoints
    }

    /// Raw records of `kind`. `known_refs` feeds the per-identity strategy and
    /// is only consulted for patients.
    #[instrument(skip(self, known_refs), fields(known_refs = known_refs.len()))]
    pub async fn fetch_collection(
        &self,
        kind: CollectionKind,
        known_refs: &[String],
    ) -> Result<Vec<Value>, ReferenceError> {
        for path in self.endpoints.list_paths(kind) {
            let body = match self.backend.get(path).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Fetching {} from {} failed: {}", kind, path, e);
                    continue;
                }
            };

            match extract_collection(&body) {
                Some((shape, records)) => {
                    info!("Loaded {} {} from {} ({})", records.len(), kind, path, shape);
                    return Ok(records);
                }
                None => warn!("Response from {} held no usable {} array", path, kind),
            }
        }

        if kind == CollectionKind::Patients && !known_refs.is_empty() {
            let records = self.fetch_each(kind, known_refs).await;
            if !records.is_empty() {
                info!(
                    "Loaded {} of {} referenced {} one by one",
                    records.len(),
                    known_refs.len(),
                    kind
                );
                return Ok(records);
            }
        }

        warn!("All retrieval strategies for {} exhausted", kind);
        Err(ReferenceError::CollectionUnavailable { kind })
    }

    /// Normalized entities of `E`'s collection, merged into `cache` as they load.
    /// Rows without a discoverable identity are skipped.
    pub async fn fetch_entities<E: CanonicalEntity>(
        &self,
        cache: &ReferenceCache<E>,
        known_refs: &[String],
    ) -> Result<Vec<E>, ReferenceError> {
        let kind = E::ROLE.collection();
        let records = self.fetch_collection(kind, known_refs).await?;

        let mut entities = Vec::with_capacity(records.len());
        let mut skipped = 0usize;

        for record in &records {
            match E::normalize(record) {
                Ok(entity) => {
                    cache.upsert_merge(entity.clone());
                    entities.push(entity);
                }
                Err(e) => {
                    skipped += 1;
                    debug!("Skipping {} row: {}", kind, e);
                }
            }
        }

        if skipped > 0 {
            warn!("Skipped {} {} rows without an identity", skipped, kind);
        }

        Ok(entities)
    }

    pub async fn fetch_patients(
        &self,
        cache: &ReferenceCache<CanonicalPatient>,
        known_refs: &[String],
    ) -> Result<Vec<CanonicalPatient>, ReferenceError> {
        self.fetch_entities(cache, known_refs).await
    }

    pub async fn fetch_doctors(
        &self,
        cache: &ReferenceCache<CanonicalDoctor>,
    ) -> Result<Vec<CanonicalDoctor>, ReferenceError> {
        self.fetch_entities(cache, &[]).await
    }

    pub async fn fetch_appointments(&self) -> Result<Vec<Value>, ReferenceError> {
        self.fetch_collection(CollectionKind::Appointments, &[]).await
    }

    pub async fn fetch_one(&self, kind: CollectionKind, identity: &str) -> Result<Value, String> {
        let path = self.endpoints.by_id(kind, identity);
        fetch_single(self.backend.as_ref(), &path).await
    }

    async fn fetch_each(&self, kind: CollectionKind, identities: &[String]) -> Vec<Value> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();

        for identity in identities.iter().filter(|id| seen.insert(id.as_str())) {
            match self.fetch_one(kind, identity).await {
                Ok(record) => {
                    let record = with_requested_identity(record, kind.record_kind(), identity);
                    if resolve_string(&record, kind.record_kind(), CanonicalField::Identity).is_some() {
                        records.push(record);
                    } else {
                        warn!("Per-identity response for {} {} is not a record", kind, identity);
                    }
                }
                Err(e) => warn!("Per-identity fetch of {} {} failed: {}", kind, identity, e),
            }
        }

        records
    }
}

/// GET `path` and pull one record out of whatever envelope it arrives in.
pub async fn fetch_single(backend: &dyn ClinicBackend, path: &str) -> Result<Value, String> {
    let body = backend.get(path).await.map_err(|e| e.to_string())?;
    extract_single(&body).ok_or_else(|| format!("no record in response from {}", path))
}

/// The first usable array in a list response, trying `{ data: [...] }`, a
/// bare array, then the object's largest array-valued property. Only object
/// elements count as records.
pub fn extract_collection(body: &Value) -> Option<(ResponseShape, Vec<Value>)> {
    if let Some(records) = body.get("data").and_then(records_of) {
        return Some((ResponseShape::DataEnvelope, records));
    }

    if let Some(records) = records_of(body) {
        return Some((ResponseShape::BareArray, records));
    }

    largest_array_property(body).map(|records| (ResponseShape::LargestArrayProperty, records))
}

/// One record out of `{ data: {...} }`, `{ data: [...] }`, a bare object or an array.
pub fn extract_single(body: &Value) -> Option<Value> {
    match body {
        Value::Object(map) => match map.get("data") {
            Some(Value::Object(inner)) if !inner.is_empty() => Some(Value::Object(inner.clone())),
            Some(Value::Array(items)) => first_object(items),
            _ if !map.is_empty() => Some(body.clone()),
            _ => None,
        },
        Value::Array(items) => first_object(items),
        _ => None,
    }
}

fn first_object(items: &[Value]) -> Option<Value> {
    items.iter().find(|item| item.is_object()).cloned()
}

fn records_of(value: &Value) -> Option<Vec<Value>> {
    let records: Vec<Value> = value
        .as_array()?
        .iter()
        .filter(|item| item.is_object())
        .cloned()
        .collect();

    (!records.is_empty()).then_some(records)
}

fn largest_array_property(body: &Value) -> Option<Vec<Value>> {
    let object = body.as_object()?;

    // Also look one level into a `data` object, e.g. `{ data: { patients: [...] } }`.
    let nested = object
        .get("data")
        .and_then(Value::as_object)
        .into_iter()
        .flat_map(|inner| inner.values());

    object
        .values()
        .chain(nested)
        .filter_map(records_of)
        .max_by_key(Vec::len)
}
