//! Reference Entry types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::index::Metric;

/// Stable address of an entry inside one index arena (its insertion position)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub usize);

/// A known, annotated RNA exemplar
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceEntry {
    /// Unique identifier
    pub id: String,
    /// Family identifier (e.g. "tRNA", "RF00005")
    pub family: String,
    /// Subfamily / exemplar name
    pub subfamily: Option<String>,
    pub description: String,
    pub embedding: Vec<f32>,
    /// Structural feature tags
    pub tags: Vec<String>,
    /// Metric this embedding was produced for, when the source states one
    pub metric: Option<Metric>,
    /// SHA-256 of the sequence and structure the embedding was computed from
    pub content_hash: Option<String>,
}

impl ReferenceEntry {
    /// Create a new entry with a generated id
    pub fn new(family: impl Into<String>, embedding: Vec<f32>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            family: family.into(),
            subfamily: None,
            description: String::new(),
            embedding,
            tags: Vec::new(),
            metric: None,
            content_hash: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_subfamily(mut self, subfamily: impl Into<String>) -> Self {
        self.subfamily = Some(subfamily.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add tags to this entry, skipping ones already present
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        for tag in tags {
            if !self.tags.contains(&tag) {
                self.tags.push(tag);
            }
        }
        self
    }

    pub fn with_metric(mut self, metric: Metric) -> Self {
        self.metric = Some(metric);
        self
    }
}

/// Entry metadata as returned to callers (no embedding)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceHit {
    pub entry_id: EntryId,
    pub id: String,
    pub family: String,
    pub subfamily: Option<String>,
    pub description: String,
    pub tags: Vec<String>,
}

impl ReferenceHit {
    pub fn from_entry(entry_id: EntryId, entry: &ReferenceEntry) -> Self {
        Self {
            entry_id,
            id: entry.id.clone(),
            family: entry.family.clone(),
            subfamily: entry.subfamily.clone(),
            description: entry.description.clone(),
            tags: entry.tags.clone(),
        }
    }
}
