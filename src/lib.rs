//! Structure-aware RNA classification
//!
//! Classifies an RNA molecule from its sequence and dot-bracket secondary
//! structure by nearest-neighbor retrieval over a reference index:
//! - Validation and canonicalization of (sequence, structure) pairs
//! - Pairing maps and explainable structural features
//! - Fixed-dimension joint sequence/structure embeddings
//! - Hot-swappable reference index with top-k similarity search
//! - Family/subfamily aggregation with confidence scores

pub mod classifier;
pub mod config;
pub mod embedding;
pub mod error;
pub mod reference;
pub mod retrieval;
pub mod service;
pub mod structure;
pub mod telemetry;

// Re-exports for convenience
pub use classifier::{ClassificationResult, FamilySummary, SubfamilyResolution};
pub use config::Config;
pub use embedding::{Embedder, FeatureEmbedder};
pub use error::{ClassifyError, Result};
pub use reference::{Metric, ReferenceIndex, SharedIndex, SimilarityResult};
pub use service::{build_snapshot, RnaClassifier, ValidationReport};
pub use structure::{PairingMap, StructuralFeatures};
