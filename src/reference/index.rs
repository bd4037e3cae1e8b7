//! Reference Index
//!
//! An arena of entries built once (append-only), then queried read-only.
//! Queries scan every entry in parallel via Rayon and return results ordered by
//! descending similarity, ties broken by insertion order.

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use super::entry::{EntryId, ReferenceEntry, ReferenceHit};
use crate::error::{ClassifyError, Result};

/// Similarity metric shared by every entry of an index
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Cosine similarity in [-1, 1]
    #[default]
    Cosine,
    /// Raw dot product (unbounded)
    DotProduct,
    /// `1 / (1 + euclidean distance)`, in (0, 1]
    Euclidean,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::DotProduct => "dot_product",
            Self::Euclidean => "euclidean",
        }
    }

    /// `a_norm` / `b_norm` are the precomputed L2 norms.
    fn similarity(self, a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
        match self {
            Self::Cosine => {
                if a_norm == 0.0 || b_norm == 0.0 {
                    0.0
                } else {
                    dot_product(a, b) / (a_norm * b_norm)
                }
            }
            Self::DotProduct => dot_product(a, b),
            Self::Euclidean => {
                let d: f32 = a
                    .iter()
                    .zip(b)
                    .map(|(x, y)| (x - y) * (x - y))
                    .sum::<f32>()
                    .sqrt();
                1.0 / (1.0 + d)
            }
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Metric {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "dot" | "dot_product" => Ok(Self::DotProduct),
            "euclidean" | "l2" => Ok(Self::Euclidean),
            other => Err(ClassifyError::Config(format!("unknown metric '{}'", other))),
        }
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// One neighbor returned by a query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarityResult {
    /// 1-based rank
    pub rank: usize,
    pub similarity: f32,
    pub entry: ReferenceHit,
}

/// Append-only build phase of a [`ReferenceIndex`]
#[derive(Debug, Default)]
pub struct IndexBuilder {
    metric: Option<Metric>,
    dimension: Option<usize>,
    entries: Vec<Arc<ReferenceEntry>>,
}

impl IndexBuilder {
    /// `metric: None` lets the first entry that states a metric decide, falling back to cosine.
    pub fn new(metric: Option<Metric>) -> Self {
        Self {
            metric,
            dimension: None,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn push(&mut self, entry: ReferenceEntry) -> Result<EntryId> {
        if entry.embedding.is_empty() {
            return Err(ClassifyError::InvalidRecord {
                id: entry.id,
                reason: "embedding is empty".to_string(),
            });
        }
        if entry.embedding.iter().any(|x| !x.is_finite()) {
            return Err(ClassifyError::InvalidRecord {
                id: entry.id,
                reason: "embedding contains non-finite values".to_string(),
            });
        }
        match self.dimension {
            Some(expected) if expected != entry.embedding.len() => {
                return Err(ClassifyError::DimensionMismatch {
                    expected,
                    actual: entry.embedding.len(),
                });
            }
            _ => self.dimension = Some(entry.embedding.len()),
        }
        match (self.metric, entry.metric) {
            (Some(expected), Some(found)) if expected != found => {
                return Err(ClassifyError::MixedMetrics {
                    expected: expected.to_string(),
                    found: found.to_string(),
                    entry: entry.id,
                });
            }
            (None, Some(found)) => self.metric = Some(found),
            _ => {}
        }

        let id = EntryId(self.entries.len());
        self.entries.push(Arc::new(entry));
        Ok(id)
    }

    pub fn build(self, embedder: Option<String>) -> ReferenceIndex {
        let norms = self.entries.iter().map(|e| l2_norm(&e.embedding)).collect();
        let index = ReferenceIndex {
            entries: self.entries,
            norms,
            metric: self.metric.unwrap_or_default(),
            dimension: self.dimension,
            embedder,
            loaded_at: Utc::now(),
        };
        info!(
            "Reference index built: {} entries, metric {}, dimension {:?}",
            index.len(),
            index.metric,
            index.dimension
        );
        index
    }
}

/// Immutable collection of reference entries
#[derive(Debug)]
pub struct ReferenceIndex {
    entries: Vec<Arc<ReferenceEntry>>,
    norms: Vec<f32>,
    metric: Metric,
    dimension: Option<usize>,
    embedder: Option<String>,
    loaded_at: DateTime<Utc>,
}

impl ReferenceIndex {
    /// Build an index from a sequence of entries in one pass.
    pub fn load(entries: impl IntoIterator<Item = ReferenceEntry>, metric: Option<Metric>) -> Result<Self> {
        let mut builder = IndexBuilder::new(metric);
        for entry in entries {
            builder.push(entry)?;
        }
        Ok(builder.build(None))
    }

    pub fn empty(metric: Metric) -> Self {
        IndexBuilder::new(Some(metric)).build(None)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn embedder(&self) -> Option<&str> {
        self.embedder.as_deref()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn get(&self, id: EntryId) -> Option<&ReferenceEntry> {
        self.entries.get(id.0).map(|e| e.as_ref())
    }

    pub fn entries(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter().map(|e| e.as_ref())
    }

    /// Top-`k` neighbors of `embedding`. `k` larger than the index returns every entry.
    pub fn query(&self, embedding: &[f32], k: usize) -> Result<Vec<SimilarityResult>> {
        if let Some(expected) = self.dimension {
            if expected != embedding.len() {
                return Err(ClassifyError::DimensionMismatch {
                    expected,
                    actual: embedding.len(),
                });
            }
        }
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(embedding);
        let metric = self.metric;

        let mut scored: Vec<(usize, f32)> = self
            .entries
            .par_iter()
            .zip(self.norms.par_iter())
            .enumerate()
            .map(|(i, (entry, norm))| {
                (i, metric.similarity(embedding, query_norm, &entry.embedding, *norm))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        debug!("Query scored {} entries, returning {}", self.entries.len(), scored.len());

        Ok(scored
            .into_iter()
            .enumerate()
            .map(|(rank, (i, similarity))| SimilarityResult {
                rank: rank + 1,
                similarity,
                entry: ReferenceHit::from_entry(EntryId(i), &self.entries[i]),
            })
            .collect())
    }

    pub fn stats(&self) -> IndexStats {
        let mut families = BTreeMap::new();
        for entry in &self.entries {
            *families.entry(entry.family.clone()).or_insert(0usize) += 1;
        }
        IndexStats {
            total_entries: self.entries.len(),
            families,
            metric: self.metric,
            dimension: self.dimension,
            embedder: self.embedder.clone(),
            loaded_at: self.loaded_at,
        }
    }
}

/// Summary of the active index
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub total_entries: usize,
    pub families: BTreeMap<String, usize>,
    pub metric: Metric,
    pub dimension: Option<usize>,
    pub embedder: Option<String>,
    pub loaded_at: DateTime<Utc>,
}
