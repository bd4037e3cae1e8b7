//! Classification Aggregator
//!
//! Turns a ranked neighbor list into a family call with a confidence score and
//! an explanation: per-family breakdown, how the subfamily was chosen, and the
//! structural features of the query.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClassifyError, Result};
use crate::reference::{Metric, SimilarityResult};
use crate::structure::StructuralFeatures;

pub const DEFAULT_SUBFAMILY_MARGIN: f32 = 0.01;

/// How a raw similarity becomes a confidence in [0, 1]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceScaling {
    /// Clamp into [0, 1]; negative similarity means no confidence
    #[default]
    Clamp,
    /// Map [-1, 1] linearly onto [0, 1]
    Affine,
    /// Logistic squash, for unbounded metrics
    Sigmoid,
}

impl ConfidenceScaling {
    /// Metrics already bounded in [0, 1] (Euclidean) pass through unchanged.
    pub fn confidence(self, similarity: f32, metric: Metric) -> f32 {
        let scaled = match (metric, self) {
            (Metric::Euclidean, _) => similarity,
            (_, Self::Clamp) => similarity,
            (_, Self::Affine) => (similarity + 1.0) / 2.0,
            (_, Self::Sigmoid) => 1.0 / (1.0 + (-similarity).exp()),
        };
        scaled.clamp(0.0, 1.0)
    }
}

impl std::str::FromStr for ConfidenceScaling {
    type Err = ClassifyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "clamp" => Ok(Self::Clamp),
            "affine" => Ok(Self::Affine),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(ClassifyError::Config(format!("unknown confidence scaling '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    /// ε: neighbors within this distance of the top score vote on a subfamily tie
    pub subfamily_margin: f32,
    pub confidence_scaling: ConfidenceScaling,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            subfamily_margin: DEFAULT_SUBFAMILY_MARGIN,
            confidence_scaling: ConfidenceScaling::default(),
        }
    }
}

/// Neighbors of one family, in rank order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FamilySummary {
    pub family: String,
    pub count: usize,
    pub best_similarity: f32,
    pub mean_similarity: f32,
    pub ranks: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum SubfamilyResolution {
    /// Taken from the rank-1 neighbor
    TopMatch,
    /// Majority among primary-family neighbors within ε of the top score
    MarginVote { votes: usize, voters: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct ClassificationResult {
    pub family: String,
    pub subfamily: Option<String>,
    pub confidence: f32,
    pub top_similarity: f32,
    pub metric: Metric,
    pub subfamily_resolution: SubfamilyResolution,
    pub features: StructuralFeatures,
    pub families: Vec<FamilySummary>,
    pub neighbors: Vec<SimilarityResult>,
}

pub struct Aggregator {
    config: AggregatorConfig,
}

impl Aggregator {
    pub fn new(config: AggregatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AggregatorConfig {
        &self.config
    }

    pub fn classify(
        &self,
        neighbors: Vec<SimilarityResult>,
        metric: Metric,
        features: StructuralFeatures,
    ) -> Result<ClassificationResult> {
        let top = neighbors.first().ok_or(ClassifyError::NoReferenceMatches)?;
        let family = top.entry.family.clone();
        let top_similarity = top.similarity;

        let (subfamily, subfamily_resolution) = self.resolve_subfamily(&neighbors, &family);
        let confidence = self
            .config
            .confidence_scaling
            .confidence(top_similarity, metric);

        debug!(
            "Classified as {} / {:?} (confidence {:.3}, {} neighbors)",
            family,
            subfamily,
            confidence,
            neighbors.len()
        );

        Ok(ClassificationResult {
            families: partition_by_family(&neighbors),
            family,
            subfamily,
            confidence,
            top_similarity,
            metric,
            subfamily_resolution,
            features,
            neighbors,
        })
    }

    /// Only neighbors of the primary family count as ties or voters, so the
    /// subfamily always belongs to the reported family.
    fn resolve_subfamily(
        &self,
        neighbors: &[SimilarityResult],
        family: &str,
    ) -> (Option<String>, SubfamilyResolution) {
        let top = &neighbors[0];
        let top_score = top.similarity;
        let same_family = || neighbors.iter().filter(|n| n.entry.family == family);

        let tied = same_family()
            .any(|n| n.similarity == top_score && n.entry.subfamily != top.entry.subfamily);
        if !tied {
            return (top.entry.subfamily.clone(), SubfamilyResolution::TopMatch);
        }

        // (subfamily, votes, best similarity, best rank) in first-seen order
        let mut tally: Vec<(Option<String>, usize, f32, usize)> = Vec::new();
        let floor = top_score - self.config.subfamily_margin;
        let mut voters = 0;
        for n in same_family().filter(|n| n.similarity >= floor) {
            voters += 1;
            match tally.iter_mut().find(|t| t.0 == n.entry.subfamily) {
                Some(t) => {
                    t.1 += 1;
                    if n.similarity > t.2 {
                        t.2 = n.similarity;
                    }
                    t.3 = t.3.min(n.rank);
                }
                None => tally.push((n.entry.subfamily.clone(), 1, n.similarity, n.rank)),
            }
        }

        let winner = tally.into_iter().reduce(|best, t| {
            let better = t.1 > best.1
                || (t.1 == best.1 && t.2 > best.2)
                || (t.1 == best.1 && t.2 == best.2 && t.3 < best.3);
            if better {
                t
            } else {
                best
            }
        });

        match winner {
            Some((subfamily, votes, _, _)) => (subfamily, SubfamilyResolution::MarginVote { votes, voters }),
            None => (top.entry.subfamily.clone(), SubfamilyResolution::TopMatch),
        }
    }
}

/// One-shot classification with an explicit config.
pub fn classify(
    neighbors: Vec<SimilarityResult>,
    config: &AggregatorConfig,
    metric: Metric,
    features: StructuralFeatures,
) -> Result<ClassificationResult> {
    Aggregator::new(config.clone()).classify(neighbors, metric, features)
}

/// Group neighbors by family, families ordered by their best rank.
pub fn partition_by_family(neighbors: &[SimilarityResult]) -> Vec<FamilySummary> {
    let mut groups: Vec<FamilySummary> = Vec::new();
    for n in neighbors {
        match groups.iter_mut().find(|g| g.family == n.entry.family) {
            Some(g) => {
                g.count += 1;
                g.ranks.push(n.rank);
                g.best_similarity = g.best_similarity.max(n.similarity);
                g.mean_similarity += n.similarity;
            }
            None => groups.push(FamilySummary {
                family: n.entry.family.clone(),
                count: 1,
                best_similarity: n.similarity,
                mean_similarity: n.similarity,
                ranks: vec![n.rank],
            }),
        }
    }
    for g in &mut groups {
        g.mean_similarity /= g.count as f32;
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{EntryId, ReferenceHit};
    use crate::structure::{validate, PairingMap};

    fn neighbor(rank: usize, similarity: f32, family: &str, subfamily: &str) -> SimilarityResult {
        SimilarityResult {
            rank,
            similarity,
            entry: ReferenceHit {
                entry_id: EntryId(rank - 1),
                id: format!("n{rank}"),
                family: family.to_string(),
                subfamily: Some(subfamily.to_string()),
                description: String::new(),
                tags: Vec::new(),
            },
        }
    }

    fn features() -> StructuralFeatures {
        let (seq, st) = validate("GGGAUUUCC", "(((...)))").unwrap();
        StructuralFeatures::from_pairing(&PairingMap::from_clean(&st), &seq)
    }

    fn classify(neighbors: Vec<SimilarityResult>) -> Result<ClassificationResult> {
        super::classify(neighbors, &AggregatorConfig::default(), Metric::Cosine, features())
    }

    #[test]
    fn test_empty_neighbors_is_fatal() {
        assert!(matches!(classify(Vec::new()), Err(ClassifyError::NoReferenceMatches)));
    }

    #[test]
    fn test_single_neighbor_confidence_equals_similarity() {
        let result = classify(vec![neighbor(1, 0.83, "tRNA", "tRNA-Phe")]).unwrap();
        assert_eq!(result.family, "tRNA");
        assert_eq!(result.subfamily.as_deref(), Some("tRNA-Phe"));
        assert_eq!(result.confidence, 0.83);
        assert_eq!(result.subfamily_resolution, SubfamilyResolution::TopMatch);
        assert!(result.features.has_stem_loop());
    }

    #[test]
    fn test_confidence_is_top_score_not_average() {
        let result = classify(vec![
            neighbor(1, 0.95, "rRNA", "5S"),
            neighbor(2, 0.10, "tRNA", "tRNA-Ala"),
            neighbor(3, 0.05, "tRNA", "tRNA-Gly"),
        ])
        .unwrap();
        assert_eq!(result.family, "rRNA");
        assert_eq!(result.confidence, 0.95);
    }

    #[test]
    fn test_partition_preserves_rank_order() {
        let result = classify(vec![
            neighbor(1, 0.9, "tRNA", "a"),
            neighbor(2, 0.8, "rRNA", "b"),
            neighbor(3, 0.7, "tRNA", "c"),
        ])
        .unwrap();
        assert_eq!(result.families.len(), 2);
        assert_eq!(result.families[0].family, "tRNA");
        assert_eq!(result.families[0].ranks, vec![1, 3]);
        assert_eq!(result.families[0].count, 2);
        assert!((result.families[0].mean_similarity - 0.8).abs() < 1e-6);
        assert_eq!(result.families[1].ranks, vec![2]);
    }

    #[test]
    fn test_exact_tie_resolved_by_margin_vote() {
        let result = classify(vec![
            neighbor(1, 0.90, "tRNA", "Phe"),
            neighbor(2, 0.90, "tRNA", "Ala"),
            neighbor(3, 0.895, "tRNA", "Ala"),
            neighbor(4, 0.70, "tRNA", "Phe"),
        ])
        .unwrap();
        assert_eq!(result.subfamily.as_deref(), Some("Ala"));
        assert_eq!(
            result.subfamily_resolution,
            SubfamilyResolution::MarginVote { votes: 2, voters: 3 }
        );
    }

    #[test]
    fn test_vote_tie_broken_by_best_similarity_then_rank() {
        let config = AggregatorConfig {
            subfamily_margin: 0.05,
            ..Default::default()
        };
        let result = Aggregator::new(config)
            .classify(
                vec![
                    neighbor(1, 0.90, "tRNA", "Phe"),
                    neighbor(2, 0.90, "tRNA", "Ala"),
                    neighbor(3, 0.88, "tRNA", "Ala"),
                    neighbor(4, 0.87, "tRNA", "Phe"),
                ],
                Metric::Cosine,
                features(),
            )
            .unwrap();
        // two votes each, equal best similarity: the earlier rank wins
        assert_eq!(result.subfamily.as_deref(), Some("Phe"));
    }

    #[test]
    fn test_no_tie_keeps_top_subfamily() {
        let result = classify(vec![
            neighbor(1, 0.91, "tRNA", "Phe"),
            neighbor(2, 0.905, "tRNA", "Ala"),
            neighbor(3, 0.905, "tRNA", "Ala"),
        ])
        .unwrap();
        assert_eq!(result.subfamily.as_deref(), Some("Phe"));
        assert_eq!(result.subfamily_resolution, SubfamilyResolution::TopMatch);
    }

    #[test]
    fn test_cross_family_tie_does_not_vote() {
        let result = classify(vec![
            neighbor(1, 0.90, "tRNA", "Phe"),
            neighbor(2, 0.90, "rRNA", "5S"),
            neighbor(3, 0.899, "rRNA", "5S"),
        ])
        .unwrap();
        assert_eq!(result.family, "tRNA");
        assert_eq!(result.subfamily.as_deref(), Some("Phe"));
        assert_eq!(result.subfamily_resolution, SubfamilyResolution::TopMatch);
        assert_eq!(result.families[1].family, "rRNA");
        assert_eq!(result.families[1].best_similarity, 0.90);
    }

    #[test]
    fn test_confidence_scaling() {
        assert_eq!(ConfidenceScaling::Clamp.confidence(-0.4, Metric::Cosine), 0.0);
        assert_eq!(ConfidenceScaling::Affine.confidence(0.0, Metric::Cosine), 0.5);
        assert_eq!(ConfidenceScaling::Sigmoid.confidence(0.0, Metric::DotProduct), 0.5);
        assert_eq!(ConfidenceScaling::Affine.confidence(0.25, Metric::Euclidean), 0.25);
        assert_eq!(ConfidenceScaling::Clamp.confidence(3.0, Metric::DotProduct), 1.0);
    }
}
