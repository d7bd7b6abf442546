use thiserror::Error;

use crate::models::{CollectionKind, RecordKind, ReferenceRole};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ReferenceError {
    #[error("No identity could be resolved for {kind} record")]
    IdentityResolutionFailure { kind: RecordKind },

    #[error("Every retrieval strategy for {kind} was exhausted")]
    CollectionUnavailable { kind: CollectionKind },

    #[error("Fetching {role} {identity} failed: {cause}")]
    ReferenceFetchFailure {
        role: ReferenceRole,
        identity: String,
        cause: String,
    },

    #[error("Invalid last-known-good directory: {0}")]
    DirectoryConfig(String),
}
