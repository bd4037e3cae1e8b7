//! Linear projection over the feature vector, loaded from a model file
//!
//! The model is held in memory and can be dropped with [`ProjectionEmbedder::hibernate`];
//! the next `embed` call reloads it. If the file is gone or malformed by then,
//! the call fails with `EmbeddingUnavailable`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

use super::features::FEATURE_DIMENSION;
use super::{normalize, Embedder, Embedding, FeatureEmbedder};
use crate::error::{ClassifyError, Result};
use crate::structure::{CleanSequence, PairingMap};

/// Serialized projection matrix: `weights[row][col]`, one row per output dimension
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionModel {
    pub name: String,
    pub input_dimension: usize,
    pub weights: Vec<Vec<f32>>,
    #[serde(default)]
    pub bias: Option<Vec<f32>>,
}

impl ProjectionModel {
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ClassifyError::EmbeddingUnavailable {
            reason: format!("cannot read projection model {:?}: {}", path, e),
        })?;
        let model: ProjectionModel =
            serde_json::from_str(&text).map_err(|e| ClassifyError::EmbeddingUnavailable {
                reason: format!("malformed projection model {:?}: {}", path, e),
            })?;
        model.check()?;
        Ok(model)
    }

    fn check(&self) -> Result<()> {
        let unavailable = |reason: String| Err(ClassifyError::EmbeddingUnavailable { reason });
        if self.input_dimension != FEATURE_DIMENSION {
            return unavailable(format!(
                "projection '{}' expects input dimension {}, feature vector has {}",
                self.name, self.input_dimension, FEATURE_DIMENSION
            ));
        }
        if self.weights.is_empty() {
            return unavailable(format!("projection '{}' has no output rows", self.name));
        }
        if let Some(row) = self.weights.iter().position(|r| r.len() != self.input_dimension) {
            return unavailable(format!(
                "projection '{}' row {} has width {}, expected {}",
                self.name,
                row,
                self.weights[row].len(),
                self.input_dimension
            ));
        }
        if let Some(bias) = &self.bias {
            if bias.len() != self.weights.len() {
                return unavailable(format!(
                    "projection '{}' bias has length {}, expected {}",
                    self.name,
                    bias.len(),
                    self.weights.len()
                ));
            }
        }
        Ok(())
    }

    pub fn output_dimension(&self) -> usize {
        self.weights.len()
    }

    fn apply(&self, input: &[f32]) -> Embedding {
        self.weights
            .iter()
            .enumerate()
            .map(|(row, w)| {
                let dot: f32 = w.iter().zip(input).map(|(a, b)| a * b).sum();
                dot + self.bias.as_ref().map_or(0.0, |b| b[row])
            })
            .collect()
    }
}

pub struct ProjectionEmbedder {
    path: PathBuf,
    base: FeatureEmbedder,
    name: String,
    output_dimension: usize,
    model: RwLock<Option<Arc<ProjectionModel>>>,
}

impl ProjectionEmbedder {
    /// Load the model eagerly so the output dimension is known up front.
    pub fn new(path: impl Into<PathBuf>, base: FeatureEmbedder) -> Result<Self> {
        let path = path.into();
        let model = ProjectionModel::from_file(&path)?;
        info!(
            "Loaded projection '{}' ({} -> {})",
            model.name,
            model.input_dimension,
            model.output_dimension()
        );
        Ok(Self {
            name: format!("projection:{}", model.name),
            output_dimension: model.output_dimension(),
            path,
            base,
            model: RwLock::new(Some(Arc::new(model))),
        })
    }

    /// Release the in-memory model.
    pub fn hibernate(&self) {
        if let Ok(mut guard) = self.model.write() {
            *guard = None;
        }
    }

    fn loaded_model(&self) -> Result<Arc<ProjectionModel>> {
        if let Some(model) = self.model.read().ok().and_then(|g| g.clone()) {
            return Ok(model);
        }

        debug!("Reloading projection model from {:?}", self.path);
        let model = ProjectionModel::from_file(&self.path).map_err(|e| {
            warn!("Projection model reload failed: {}", e);
            e
        })?;
        if model.output_dimension() != self.output_dimension {
            return Err(ClassifyError::EmbeddingUnavailable {
                reason: format!(
                    "projection output dimension changed from {} to {}",
                    self.output_dimension,
                    model.output_dimension()
                ),
            });
        }
        let model = Arc::new(model);
        let mut guard = self
            .model
            .write()
            .map_err(|_| ClassifyError::EmbeddingUnavailable {
                reason: "projection model lock poisoned".to_string(),
            })?;
        *guard = Some(model.clone());
        Ok(model)
    }
}

impl Embedder for ProjectionEmbedder {
    fn embed(&self, sequence: &CleanSequence, pairing: &PairingMap) -> Result<Embedding> {
        let model = self.loaded_model()?;
        let features = self.base.embed(sequence, pairing)?;
        let mut projected = model.apply(&features);
        normalize(&mut projected);
        Ok(projected)
    }

    fn dimension(&self) -> usize {
        self.output_dimension
    }

    fn name(&self) -> &str {
        &self.name
    }
}
