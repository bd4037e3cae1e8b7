//! Reference ingestion
//!
//! Reads reference records from a storage source and turns them into index
//! entries. Records without a precomputed embedding are validated, parsed and
//! embedded on the fly; records whose sequence+structure hash was already seen
//! are skipped.

use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::entry::ReferenceEntry;
use super::index::{IndexBuilder, Metric, ReferenceIndex};
use crate::embedding::Embedder;
use crate::error::{ClassifyError, Result};
use crate::structure::{validate_with, PairingMap, StructuralFeatures, ValidationLimits};

/// One record as produced by a storage source
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReferenceRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub family: String,
    #[serde(default)]
    pub subfamily: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub sequence: Option<String>,
    #[serde(default)]
    pub structure: Option<String>,
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub metric: Option<Metric>,
}

impl ReferenceRecord {
    fn label(&self, position: usize) -> String {
        self.id.clone().unwrap_or_else(|| format!("record #{}", position))
    }
}

/// Load-time source of reference records
pub trait ReferenceSource: Send + Sync {
    fn load_records(&self) -> Result<Vec<ReferenceRecord>>;

    /// Short description for logs
    fn describe(&self) -> String;
}

/// A JSON array of records, or one JSON record per line (`.jsonl`)
pub struct JsonReferenceFile {
    path: PathBuf,
}

impl JsonReferenceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ReferenceSource for JsonReferenceFile {
    fn load_records(&self) -> Result<Vec<ReferenceRecord>> {
        let text = std::fs::read_to_string(&self.path)?;
        let is_lines = self
            .path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("jsonl"));

        if is_lines {
            text.lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(n, line)| {
                    serde_json::from_str(line).map_err(|e| {
                        ClassifyError::Storage(format!("{:?} line {}: {}", self.path, n + 1, e))
                    })
                })
                .collect()
        } else {
            serde_json::from_str(&text)
                .map_err(|e| ClassifyError::Storage(format!("{:?}: {}", self.path, e)))
        }
    }

    fn describe(&self) -> String {
        format!("json file {:?}", self.path)
    }
}

/// Records already in memory
pub struct InMemorySource {
    records: Vec<ReferenceRecord>,
}

impl InMemorySource {
    pub fn new(records: Vec<ReferenceRecord>) -> Self {
        Self { records }
    }
}

impl ReferenceSource for InMemorySource {
    fn load_records(&self) -> Result<Vec<ReferenceRecord>> {
        Ok(self.records.clone())
    }

    fn describe(&self) -> String {
        format!("{} in-memory records", self.records.len())
    }
}

/// Builds indexes from sources using the active embedder
pub struct ReferenceLoader {
    embedder: Arc<dyn Embedder>,
    limits: ValidationLimits,
    metric: Option<Metric>,
}

impl ReferenceLoader {
    pub fn new(embedder: Arc<dyn Embedder>, limits: ValidationLimits, metric: Option<Metric>) -> Self {
        Self {
            embedder,
            limits,
            metric,
        }
    }

    pub fn build_index(&self, source: &dyn ReferenceSource) -> Result<ReferenceIndex> {
        let start = std::time::Instant::now();
        info!("Loading reference records from {}", source.describe());
        let records = source.load_records()?;

        let mut builder = IndexBuilder::new(self.metric);
        let mut seen = HashSet::new();
        let mut embedded = 0;
        let mut skipped = 0;

        for (position, record) in records.into_iter().enumerate() {
            match self.to_entry(record, position, &mut seen)? {
                Some((entry, computed)) => {
                    if computed {
                        embedded += 1;
                    }
                    builder.push(entry)?;
                }
                None => skipped += 1,
            }
        }

        info!(
            "Reference load complete: {} entries ({} embedded on load), {} duplicates skipped in {:?}",
            builder.len(),
            embedded,
            skipped,
            start.elapsed()
        );
        if builder.is_empty() {
            warn!("Reference index is empty; every classification will fail with no matches");
        }
        Ok(builder.build(Some(self.embedder.name().to_string())))
    }

    /// `None` for a duplicate; the flag is true when the embedding was computed here.
    fn to_entry(
        &self,
        record: ReferenceRecord,
        position: usize,
        seen: &mut HashSet<String>,
    ) -> Result<Option<(ReferenceEntry, bool)>> {
        let label = record.label(position);
        if record.family.trim().is_empty() {
            return Err(ClassifyError::InvalidRecord {
                id: label,
                reason: "family is empty".to_string(),
            });
        }

        let mut tags = record.tags.clone();
        let mut content_hash = None;

        let (embedding, computed) = match (&record.embedding, &record.sequence, &record.structure) {
            (_, Some(sequence), Some(structure)) => {
                let (seq, st) = validate_with(sequence, structure, &self.limits).map_err(|e| {
                    ClassifyError::InvalidRecord {
                        id: label.clone(),
                        reason: e.to_string(),
                    }
                })?;

                let hash = content_hash_of(seq.as_str(), st.as_str());
                if !seen.insert(hash.clone()) {
                    debug!("Skipping {} (duplicate content {})", label, &hash[..12]);
                    return Ok(None);
                }
                content_hash = Some(hash);

                let pairing = PairingMap::from_clean(&st);
                tags.extend(StructuralFeatures::from_pairing(&pairing, &seq).tags);

                match &record.embedding {
                    Some(precomputed) => (precomputed.clone(), false),
                    None => (self.embedder.embed(&seq, &pairing)?, true),
                }
            }
            (Some(precomputed), _, _) => (precomputed.clone(), false),
            _ => {
                return Err(ClassifyError::InvalidRecord {
                    id: label,
                    reason: "record needs an embedding or both sequence and structure".to_string(),
                })
            }
        };

        if embedding.len() != self.embedder.dimension() {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.embedder.dimension(),
                actual: embedding.len(),
            });
        }

        let mut entry = ReferenceEntry::new(record.family, embedding)
            .with_description(record.description)
            .with_tags(tags);
        if let Some(id) = record.id {
            entry = entry.with_id(id);
        }
        entry.subfamily = record.subfamily;
        entry.metric = record.metric;
        entry.content_hash = content_hash;
        Ok(Some((entry, computed)))
    }
}

/// SHA-256 over the cleaned sequence and structure
pub fn content_hash_of(sequence: &str, structure: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(sequence.as_bytes());
    hasher.update(b"\n");
    hasher.update(structure.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FeatureEmbedder;
    use tempfile::tempdir;

    fn loader() -> ReferenceLoader {
        ReferenceLoader::new(
            Arc::new(FeatureEmbedder::default()),
            ValidationLimits::default(),
            None,
        )
    }

    fn record(id: &str, family: &str, sequence: &str, structure: &str) -> ReferenceRecord {
        ReferenceRecord {
            id: Some(id.to_string()),
            family: family.to_string(),
            sequence: Some(sequence.to_string()),
            structure: Some(structure.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_embeds_records_on_load() {
        let source = InMemorySource::new(vec![
            record("hp", "hairpin", "GGGAUUUCC", "(((...)))"),
            record("open", "linear", "AUGCAUGCA", "........."),
        ]);
        let index = loader().build_index(&source).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.embedder(), Some("feature-v1"));

        let hp = index.entries().next().unwrap();
        assert!(hp.tags.contains(&"has_stem_loop".to_string()));
        assert!(hp.content_hash.is_some());
    }

    #[test]
    fn test_skips_duplicate_content() {
        let source = InMemorySource::new(vec![
            record("a", "hairpin", "GGGAUUUCC", "(((...)))"),
            record("b", "hairpin", "gggauuucc", "(((...)))"),
        ]);
        let index = loader().build_index(&source).unwrap();
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_invalid_record_is_reported() {
        let source = InMemorySource::new(vec![record("bad", "x", "AUGC", "(()")]);
        let err = loader().build_index(&source).unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidRecord { ref id, .. } if id == "bad"));

        let source = InMemorySource::new(vec![ReferenceRecord {
            family: "x".to_string(),
            ..Default::default()
        }]);
        assert_eq!(loader().build_index(&source).unwrap_err().code(), "invalid_record");
    }

    #[test]
    fn test_precomputed_embedding_dimension_checked() {
        let source = InMemorySource::new(vec![ReferenceRecord {
            family: "x".to_string(),
            embedding: Some(vec![1.0, 0.0]),
            ..Default::default()
        }]);
        assert_eq!(loader().build_index(&source).unwrap_err().code(), "dimension_mismatch");
    }

    #[test]
    fn test_json_and_jsonl_files() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let array = dir.path().join("refs.json");
        std::fs::write(
            &array,
            r#"[{"id": "t1", "family": "tRNA", "subfamily": "tRNA-Phe",
                 "sequence": "GGGAUUUCC", "structure": "(((...)))"}]"#,
        )?;
        let lines = dir.path().join("refs.jsonl");
        std::fs::write(
            &lines,
            "{\"family\": \"a\", \"sequence\": \"GGGAUUUCC\", \"structure\": \"(((...)))\"}\n\n\
             {\"family\": \"b\", \"sequence\": \"AUGCAUGCA\", \"structure\": \".........\"}\n",
        )?;

        let records = JsonReferenceFile::new(&array).load_records()?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subfamily.as_deref(), Some("tRNA-Phe"));
        assert_eq!(JsonReferenceFile::new(&lines).load_records()?.len(), 2);
        Ok(())
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash_of("AUGC", "...."), content_hash_of("AUGC", "...."));
        assert_ne!(content_hash_of("AUGC", "...."), content_hash_of("AUGC", "(..)"));
    }
}
