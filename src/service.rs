//! Classification service
//!
//! `RnaClassifier` wires validation, parsing, embedding, retrieval and
//! aggregation into the single request entry point, and owns the swappable
//! reference index.

use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::classifier::{Aggregator, ClassificationResult};
use crate::config::Config;
use crate::embedding::{build_embedder, Embedder};
use crate::error::{ClassifyError, Result};
use crate::reference::{
    IndexSnapshot, IndexStats, JsonReferenceFile, ReferenceIndex, ReferenceLoader, ReferenceSource,
    SharedIndex,
};
use crate::retrieval::Retriever;
use crate::structure::validator::{clean_sequence, clean_structure};
use crate::structure::{
    suggest_corrections, validate_with, PairingMap, SequenceStats, StructuralFeatures,
    ValidationLimits,
};

/// Outcome of a validation-only request
#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    /// Cleaned sequence, when it passed its own checks
    pub sequence: Option<String>,
    /// Cleaned structure, when it passed its own checks
    pub structure: Option<String>,
    pub length: usize,
    pub gc_content: Option<f64>,
    pub stats: Option<SequenceStats>,
    pub features: Option<StructuralFeatures>,
    pub errors: Vec<ClassifyError>,
    pub suggestions: Vec<String>,
}

pub struct RnaClassifier {
    embedder: Arc<dyn Embedder>,
    index: Arc<SharedIndex>,
    retriever: Retriever,
    aggregator: Aggregator,
    limits: ValidationLimits,
    config: Config,
}

impl RnaClassifier {
    pub fn new(index: ReferenceIndex, embedder: Arc<dyn Embedder>, config: Config) -> Self {
        let index = Arc::new(SharedIndex::new(index));
        Self {
            retriever: Retriever::new(Arc::clone(&index), &config.index),
            aggregator: Aggregator::new(config.aggregator.clone()),
            limits: config.validation,
            embedder,
            index,
            config,
        }
    }

    /// Build the embedder and the initial index. A snapshot is preferred over
    /// the reference records when the snapshot file exists.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = build_embedder(&config.embedding)?;

        let index = match (&config.snapshot_path, &config.reference_path) {
            (Some(snapshot), _) if snapshot.exists() => {
                info!("Restoring reference index from snapshot {:?}", snapshot);
                IndexSnapshot::read(snapshot)?.into_index(embedder.name(), embedder.dimension())?
            }
            (_, Some(records)) => {
                let loader = ReferenceLoader::new(
                    Arc::clone(&embedder),
                    config.validation,
                    config.index.metric,
                );
                loader.build_index(&JsonReferenceFile::new(records))?
            }
            _ => {
                warn!("No reference source configured; starting with an empty index");
                ReferenceIndex::empty(config.index.metric.unwrap_or_default())
            }
        };

        Ok(Self::new(index, embedder, config))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn Embedder> {
        &self.embedder
    }

    pub fn shared_index(&self) -> &Arc<SharedIndex> {
        &self.index
    }

    /// Classify one molecule against the active reference index.
    /// `k` defaults to the configured `default_top_k`.
    #[tracing::instrument(skip(self, sequence, structure), fields(length = sequence.len()))]
    pub fn classify_request(
        &self,
        sequence: &str,
        structure: &str,
        k: Option<usize>,
    ) -> Result<ClassificationResult> {
        let start = Instant::now();
        let k = k.unwrap_or(self.config.index.default_top_k);

        let result = self.run(sequence, structure, k);
        match &result {
            Ok(classification) => info!(
                "Classified as {} (confidence {:.3}, {} neighbors) in {:?}",
                classification.family,
                classification.confidence,
                classification.neighbors.len(),
                start.elapsed()
            ),
            Err(e) if e.is_client_error() => info!("Rejected request: {}", e),
            Err(e) => warn!("Classification failed: {}", e),
        }
        result
    }

    fn run(&self, sequence: &str, structure: &str, k: usize) -> Result<ClassificationResult> {
        let (sequence, structure) = validate_with(sequence, structure, &self.limits)?;
        self.retriever.check_k(k)?;
        let pairing = PairingMap::from_clean(&structure);
        let features = StructuralFeatures::from_pairing(&pairing, &sequence);
        let embedding = self.embedder.embed(&sequence, &pairing)?;

        let index = self.index.snapshot();
        let neighbors = self.retriever.retrieve_from(&index, &embedding, k)?;
        self.aggregator.classify(neighbors, index.metric(), features)
    }

    /// Run [`RnaClassifier::classify_request`] on the blocking pool.
    pub async fn classify_request_async(
        self: &Arc<Self>,
        sequence: String,
        structure: String,
        k: Option<usize>,
    ) -> Result<ClassificationResult> {
        let this = Arc::clone(self);
        tokio::task::spawn_blocking(move || this.classify_request(&sequence, &structure, k))
            .await
            .map_err(|e| ClassifyError::TaskFailed(e.to_string()))?
    }

    /// Check a request without touching the index. Sequence and structure are
    /// checked independently so both sides report their problems.
    pub fn validate_request(&self, sequence: &str, structure: &str) -> ValidationReport {
        let mut errors = Vec::new();

        let clean_seq = clean_sequence(sequence, &self.limits)
            .map_err(|e| errors.push(e))
            .ok();
        let clean_st = clean_structure(structure).map_err(|e| errors.push(e)).ok();

        let mut features = None;
        if let (Some(seq), Some(st)) = (&clean_seq, &clean_st) {
            if seq.len() != st.len() {
                errors.push(ClassifyError::LengthMismatch {
                    sequence_len: seq.len(),
                    structure_len: st.len(),
                });
            } else {
                features = Some(StructuralFeatures::from_pairing(&PairingMap::from_clean(st), seq));
            }
        }

        let stats = clean_seq.as_ref().map(SequenceStats::from_sequence);
        let suggestions = if clean_seq.is_none() {
            suggest_corrections(sequence)
        } else {
            Vec::new()
        };

        ValidationReport {
            is_valid: errors.is_empty(),
            length: clean_seq.as_ref().map_or(0, |s| s.len()),
            gc_content: stats.as_ref().map(|s| s.gc_content),
            sequence: clean_seq.map(|s| s.as_str().to_string()),
            structure: clean_st.map(|s| s.as_str().to_string()),
            stats,
            features,
            errors,
            suggestions,
        }
    }

    /// Build a fresh index from `source` and swap it in. Requests already
    /// running finish against the index they started with.
    pub fn reload(&self, source: &dyn ReferenceSource) -> Result<IndexStats> {
        let loader = ReferenceLoader::new(
            Arc::clone(&self.embedder),
            self.limits,
            self.config.index.metric,
        );
        let index = loader.build_index(source)?;
        let stats = index.stats();
        self.index.swap(index);
        Ok(stats)
    }

    pub fn load_snapshot(&self, path: &Path) -> Result<IndexStats> {
        let index = IndexSnapshot::read(path)?
            .into_index(self.embedder.name(), self.embedder.dimension())?;
        let stats = index.stats();
        self.index.swap(index);
        Ok(stats)
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<()> {
        IndexSnapshot::from_index(&self.index.snapshot()).save(path)
    }

    pub fn index_stats(&self) -> IndexStats {
        self.index.snapshot().stats()
    }
}

/// Embed every record in `records` with the configured embedder and persist
/// the resulting index to `output`.
pub fn build_snapshot(config: &Config, records: &Path, output: &Path) -> Result<IndexStats> {
    let start = Instant::now();
    let embedder = build_embedder(&config.embedding)?;
    let loader = ReferenceLoader::new(embedder, config.validation, config.index.metric);
    let index = loader.build_index(&JsonReferenceFile::new(records))?;

    IndexSnapshot::from_index(&index).save(output)?;
    let stats = index.stats();
    info!(
        "Wrote {} entries ({} families, metric {}) to {:?} in {:?}",
        stats.total_entries,
        stats.families.len(),
        stats.metric,
        output,
        start.elapsed()
    );
    Ok(stats)
}
