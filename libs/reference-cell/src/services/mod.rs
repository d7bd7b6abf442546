pub mod cache;
pub mod directory;
pub mod fetch_chain;
pub mod fields;
pub mod lazy;
pub mod normalizer;

pub use cache::{CacheEntry, MergeOutcome, ReferenceCache};
pub use directory::{DirectorySnapshot, LastKnownGoodDirectory};
pub use fetch_chain::{extract_collection, extract_single, fetch_single, FallbackFetchChain, ResponseShape};
pub use lazy::{LazyReferenceResolver, ReferenceLookup, ReferenceSource};
pub use normalizer::{compose_display_name, normalize_doctor, normalize_patient};
