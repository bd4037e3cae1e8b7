//! Reference Module
//!
//! Known RNA family exemplars: entries, the immutable similarity index over
//! them, the swappable holder readers query, and ingestion from storage.

pub mod entry;
pub mod index;
pub mod loader;
pub mod store;

pub use entry::{EntryId, ReferenceEntry, ReferenceHit};
pub use index::{IndexBuilder, IndexStats, Metric, ReferenceIndex, SimilarityResult};
pub use loader::{InMemorySource, JsonReferenceFile, ReferenceLoader, ReferenceRecord, ReferenceSource};
pub use store::{IndexSnapshot, SharedIndex};
