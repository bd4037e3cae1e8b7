//! Hand-crafted, length-normalized sequence + structure features

use super::{normalize, Embedder, Embedding};
use crate::error::Result;
use crate::structure::validator::{base_index, DEFAULT_MAX_SEQUENCE_LENGTH};
use crate::structure::{CleanSequence, PairingMap, PositionContext, StructuralFeatures};

/// Mononucleotide (4) + dinucleotide (16) frequencies + GC content
const SEQUENCE_BLOCK: usize = 4 + 16 + 1;
/// Fraction paired, pair composition (4), depth (2), loop densities (4), length
const STRUCTURE_BLOCK: usize = 1 + 4 + 2 + 4 + 1;
/// Base frequencies per structural context
const CONTEXT_BLOCK: usize = 4 * 4;

pub const FEATURE_DIMENSION: usize = SEQUENCE_BLOCK + STRUCTURE_BLOCK + CONTEXT_BLOCK;

/// Default representation: three feature blocks, weighted, then L2-normalized.
///
/// Every feature is a frequency or a bounded transform of a count, so the
/// dimension is fixed regardless of sequence length.
#[derive(Debug, Clone)]
pub struct FeatureEmbedder {
    sequence_weight: f32,
    structure_weight: f32,
}

impl FeatureEmbedder {
    pub fn new(sequence_weight: f32, structure_weight: f32) -> Self {
        Self {
            sequence_weight,
            structure_weight,
        }
    }

    /// Unnormalized, unweighted feature vector
    pub fn raw_features(&self, sequence: &CleanSequence, pairing: &PairingMap) -> Vec<f64> {
        let mut out = Vec::with_capacity(FEATURE_DIMENSION);
        sequence_block(sequence, &mut out);
        structure_block(sequence, pairing, &mut out);
        context_block(sequence, pairing, &mut out);
        out
    }
}

impl Default for FeatureEmbedder {
    fn default() -> Self {
        Self::new(1.0, 1.0)
    }
}

impl Embedder for FeatureEmbedder {
    fn embed(&self, sequence: &CleanSequence, pairing: &PairingMap) -> Result<Embedding> {
        let raw = self.raw_features(sequence, pairing);
        let mut embedding: Embedding = raw
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let weight = if i < SEQUENCE_BLOCK {
                    self.sequence_weight
                } else {
                    self.structure_weight
                };
                (*v as f32) * weight
            })
            .collect();
        normalize(&mut embedding);
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        FEATURE_DIMENSION
    }

    fn name(&self) -> &str {
        "feature-v1"
    }
}

fn squash(x: f64) -> f64 {
    x / (1.0 + x)
}

fn sequence_block(sequence: &CleanSequence, out: &mut Vec<f64>) {
    let bytes = sequence.as_bytes();
    let length = bytes.len().max(1) as f64;

    let mut mono = [0f64; 4];
    for b in bytes {
        if let Some(i) = base_index(*b) {
            mono[i] += 1.0;
        }
    }
    out.extend(mono.iter().map(|c| c / length));

    let mut di = [0f64; 16];
    for w in bytes.windows(2) {
        if let (Some(a), Some(b)) = (base_index(w[0]), base_index(w[1])) {
            di[a * 4 + b] += 1.0;
        }
    }
    let windows = bytes.len().saturating_sub(1);
    out.extend(di.iter().map(|c| if windows > 0 { c / windows as f64 } else { 0.0 }));

    out.push((mono[2] + mono[3]) / length);
}

fn structure_block(sequence: &CleanSequence, pairing: &PairingMap, out: &mut Vec<f64>) {
    let features = StructuralFeatures::from_pairing(pairing, sequence);
    let half = (features.length as f64 / 2.0).max(1.0);
    let pairs = features.pair_count as f64;

    out.push(features.fraction_paired);
    out.extend(features.pair_composition);
    out.push((features.max_depth as f64 / half).min(1.0));
    out.push((features.mean_depth / half).min(1.0));
    out.push(squash(features.stem_count as f64 / (1.0 + pairs / 10.0)));
    out.push(squash(features.hairpin_count as f64));
    out.push(squash(features.internal_loop_count as f64));
    out.push(squash(features.multiloop_count as f64));
    out.push(
        ((1.0 + features.length as f64).ln() / (1.0 + DEFAULT_MAX_SEQUENCE_LENGTH as f64).ln())
            .min(1.0),
    );
}

fn context_block(sequence: &CleanSequence, pairing: &PairingMap, out: &mut Vec<f64>) {
    let bytes = sequence.as_bytes();
    let length = bytes.len().max(1) as f64;
    let mut counts = [0f64; CONTEXT_BLOCK];
    for (i, b) in bytes.iter().enumerate() {
        if let Some(base) = base_index(*b) {
            counts[pairing.context(i).index() * 4 + base] += 1.0;
        }
    }
    debug_assert_eq!(PositionContext::ALL.len() * 4, CONTEXT_BLOCK);
    out.extend(counts.iter().map(|c| c / length));
}
