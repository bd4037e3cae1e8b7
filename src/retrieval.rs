//! Retrieval Engine
//!
//! Bounds-checked top-k queries against whichever index is currently active.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{ClassifyError, Result};
use crate::reference::{Metric, ReferenceIndex, SharedIndex, SimilarityResult};

pub const DEFAULT_TOP_K: usize = 5;
pub const MAX_TOP_K: usize = 100;

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Metric for the index; `None` defers to the entries (cosine if they are silent)
    pub metric: Option<Metric>,
    pub default_top_k: usize,
    pub max_top_k: usize,
    /// Neighbors scoring below this are dropped
    pub min_similarity: Option<f32>,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            metric: None,
            default_top_k: DEFAULT_TOP_K,
            max_top_k: MAX_TOP_K,
            min_similarity: None,
        }
    }
}

pub struct Retriever {
    index: Arc<SharedIndex>,
    max_top_k: usize,
    min_similarity: Option<f32>,
}

impl Retriever {
    pub fn new(index: Arc<SharedIndex>, config: &IndexConfig) -> Self {
        Self {
            index,
            max_top_k: config.max_top_k,
            min_similarity: config.min_similarity,
        }
    }

    pub fn index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Bounds check on `k`, cheap enough to run before any embedding work.
    pub fn check_k(&self, k: usize) -> Result<()> {
        if k == 0 {
            return Err(ClassifyError::InvalidK { k });
        }
        if k > self.max_top_k {
            return Err(ClassifyError::KTooLarge {
                k,
                max: self.max_top_k,
            });
        }
        Ok(())
    }

    /// Nearest neighbors of `embedding` in the active index, best first.
    /// `k` must be in `1..=max_top_k`.
    pub fn retrieve_top_k(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        let index = self.index.snapshot();
        self.retrieve_from(&index, embedding, k)
    }

    /// Same as [`Retriever::retrieve_top_k`] against a snapshot the caller already holds.
    pub fn retrieve_from(
        &self,
        index: &ReferenceIndex,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<SimilarityResult>> {
        self.check_k(k)?;
        let mut results = index.query(embedding, k)?;

        if let Some(threshold) = self.min_similarity {
            let before = results.len();
            results.retain(|r| r.similarity >= threshold);
            if results.len() < before {
                debug!(
                    "Dropped {} neighbors below similarity {}",
                    before - results.len(),
                    threshold
                );
            }
        }
        Ok(results)
    }
}
