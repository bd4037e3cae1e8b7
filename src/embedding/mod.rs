//! Representation Builder
//!
//! Turns a validated sequence plus its pairing map into a fixed-dimension
//! vector. Implementations are pluggable behind [`Embedder`]; every one of
//! them must be deterministic and return the same dimension for any length.

pub mod features;
pub mod projection;

pub use features::FeatureEmbedder;
pub use projection::{ProjectionEmbedder, ProjectionModel};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::structure::{CleanSequence, PairingMap};

/// A joint sequence + structure embedding
pub type Embedding = Vec<f32>;

/// Trait for representation functions
pub trait Embedder: Send + Sync {
    /// Embed a validated molecule
    fn embed(&self, sequence: &CleanSequence, pairing: &PairingMap) -> Result<Embedding>;

    /// Dimension of every vector this embedder returns
    fn dimension(&self) -> usize;

    /// Identifier recorded alongside persisted indexes
    fn name(&self) -> &str;
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Scale applied to the nucleotide-content block
    pub sequence_weight: f32,
    /// Scale applied to the structural and structural-context blocks
    pub structure_weight: f32,
    /// Optional JSON projection model applied on top of the feature vector
    pub projection_path: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            sequence_weight: 1.0,
            structure_weight: 1.0,
            projection_path: None,
        }
    }
}

/// Build the embedder described by `config`.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    let base = FeatureEmbedder::new(config.sequence_weight, config.structure_weight);
    match &config.projection_path {
        Some(path) => {
            info!("Initializing ProjectionEmbedder from {:?}", path);
            Ok(Arc::new(ProjectionEmbedder::new(path.clone(), base)?))
        }
        None => {
            info!("Initializing FeatureEmbedder (dimension {})", base.dimension());
            Ok(Arc::new(base))
        }
    }
}

/// L2-normalize in place; the zero vector is left untouched.
pub(crate) fn normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec {
            *x /= norm;
        }
    }
}
