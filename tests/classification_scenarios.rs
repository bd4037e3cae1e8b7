//! End-to-end classification scenarios
//!
//! Runs the full request path against the bundled reference families.

use rna_classifier::classifier::SubfamilyResolution;
use rna_classifier::config::{Config, ConfidenceScaling};
use rna_classifier::embedding::{Embedder, FeatureEmbedder};
use rna_classifier::error::UnbalancedReason;
use rna_classifier::reference::{InMemorySource, ReferenceRecord};
use rna_classifier::structure::validate;
use rna_classifier::{build_snapshot, ClassifyError, Metric, PairingMap, RnaClassifier};
use std::path::PathBuf;
use tempfile::tempdir;

const YEAST_PHE: &str = "GCGGAUUUAGCUCAGUUGGGAGAGCGCCAGACUGAAGAUCUGGAGGUCCUGUGUUCGAUCCACAGAAUUCGCACCA";
const CLOVERLEAF: &str = "(((((((..((((........)))).(((((.......))))).....(((((.......))))))))))))....";

fn reference_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("data/reference_families.json")
}

fn bundled_classifier(config: Config) -> anyhow::Result<RnaClassifier> {
    let config = Config {
        reference_path: Some(reference_path()),
        ..config
    };
    Ok(RnaClassifier::from_config(config)?)
}

#[test]
fn test_bundled_references_load() -> anyhow::Result<()> {
    let classifier = bundled_classifier(Config::default())?;
    let stats = classifier.index_stats();
    assert_eq!(stats.total_entries, 28);
    assert_eq!(stats.families.len(), 5);
    assert_eq!(stats.families.get("tRNA"), Some(&10));
    assert_eq!(stats.metric, Metric::Cosine);
    assert_eq!(stats.dimension, Some(FeatureEmbedder::default().dimension()));
    Ok(())
}

#[test]
fn test_trna_query_lands_in_trna() -> anyhow::Result<()> {
    let classifier = bundled_classifier(Config::default())?;
    let result = classifier.classify_request(YEAST_PHE, CLOVERLEAF, None)?;

    assert_eq!(result.family, "tRNA");
    assert_eq!(result.subfamily.as_deref(), Some("tRNA-Phe"));
    assert_eq!(result.subfamily_resolution, SubfamilyResolution::TopMatch);
    assert_eq!(result.neighbors.len(), 5);
    assert_eq!(result.neighbors[0].entry.id, "tRNA-Phe-yeast");
    assert!(result.confidence > 0.999);
    assert_eq!(result.families[0].family, "tRNA");
    assert!(result
        .neighbors
        .windows(2)
        .all(|w| w[0].similarity >= w[1].similarity));
    assert_eq!(
        result.neighbors.iter().map(|n| n.rank).collect::<Vec<_>>(),
        vec![1, 2, 3, 4, 5]
    );

    // three-armed cloverleaf closed by the acceptor stem
    assert_eq!(result.features.multiloop_count, 1);
    assert_eq!(result.features.hairpin_count, 3);
    assert!(result.features.tags.contains(&"multibranch".to_string()));
    Ok(())
}

#[test]
fn test_k_larger_than_index_returns_everything() -> anyhow::Result<()> {
    let classifier = bundled_classifier(Config::default())?;
    let result = classifier.classify_request(YEAST_PHE, CLOVERLEAF, Some(100))?;
    assert_eq!(result.neighbors.len(), 28);
    assert!(result
        .neighbors
        .windows(2)
        .all(|w| w[0].similarity >= w[1].similarity));
    let total: usize = result.families.iter().map(|f| f.count).sum();
    assert_eq!(total, 28);
    Ok(())
}

#[test]
fn test_one_entry_index() -> anyhow::Result<()> {
    let classifier = RnaClassifier::from_config(Config::default())?;
    classifier.reload(&InMemorySource::new(vec![ReferenceRecord {
        id: Some("only".to_string()),
        family: "tRNA".to_string(),
        sequence: Some(YEAST_PHE.to_string()),
        structure: Some(CLOVERLEAF.to_string()),
        ..Default::default()
    }]))?;

    let result = classifier.classify_request("GGGAUUUCC", "(((...)))", Some(1))?;
    assert_eq!(result.family, "tRNA");
    assert_eq!(result.neighbors.len(), 1);
    assert_eq!(result.neighbors[0].entry.id, "only");
    assert_eq!(result.confidence, result.neighbors[0].similarity.clamp(0.0, 1.0));
    assert!(result.subfamily.is_none());
    Ok(())
}

#[test]
fn test_hairpin_pairing() -> anyhow::Result<()> {
    let (_, structure) = validate("GGGAUUUCC", "(((...)))")?;
    let pairing = PairingMap::from_clean(&structure);
    assert_eq!(pairing.pairs(), vec![(0, 8), (1, 7), (2, 6)]);
    for i in 3..=5 {
        assert!(!pairing.is_paired(i));
    }
    Ok(())
}

#[test]
fn test_rejections_reach_the_caller() -> anyhow::Result<()> {
    let classifier = bundled_classifier(Config::default())?;

    match classifier.classify_request("GGC", "(()", None) {
        Err(ClassifyError::UnbalancedStructure {
            reason: UnbalancedReason::UnmatchedOpening { positions },
        }) => assert_eq!(positions.len(), 1),
        other => panic!("unexpected result: {other:?}"),
    }
    match classifier.classify_request("GC", ")(", None) {
        Err(ClassifyError::UnbalancedStructure {
            reason: UnbalancedReason::UnmatchedClosing { position },
        }) => assert_eq!(position, 0),
        other => panic!("unexpected result: {other:?}"),
    }
    let err = classifier.classify_request("AUGX", "....", None).unwrap_err();
    assert_eq!(err.code(), "invalid_alphabet");
    assert!(err.is_client_error());

    let err = classifier.classify_request("", "", None).unwrap_err();
    assert_eq!(err.code(), "empty_sequence");
    Ok(())
}

#[test]
fn test_round_trip_over_reference_structures() -> anyhow::Result<()> {
    let text = std::fs::read_to_string(reference_path())?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&text)?;
    for record in records {
        let structure = record["structure"].as_str().unwrap_or_default();
        let pairing = PairingMap::parse(structure)?;
        let rendered = pairing.to_dot_bracket();
        assert_eq!(rendered, structure);
        assert_eq!(PairingMap::parse(&rendered)?, pairing);
    }
    Ok(())
}

#[test]
fn test_embedding_dimension_is_length_invariant() -> anyhow::Result<()> {
    let embedder = FeatureEmbedder::default();
    let short = "GGGAUUUCCA";
    let long = "GGGGAAAAAACCCCUUUUUU".repeat(25);
    let long_structure = "((((......))))......".repeat(25);
    assert_eq!(long.len(), 500);

    let (seq, st) = validate(short, "(((...))).")?;
    let a = embedder.embed(&seq, &PairingMap::from_clean(&st))?;
    let (seq, st) = validate(&long, &long_structure)?;
    let b = embedder.embed(&seq, &PairingMap::from_clean(&st))?;

    assert_eq!(a.len(), b.len());
    assert_eq!(a.len(), embedder.dimension());
    Ok(())
}

#[test]
fn test_snapshot_restores_same_answers() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let snapshot = dir.path().join("reference.idx");

    let built = bundled_classifier(Config::default())?;
    built.save_snapshot(&snapshot)?;
    let before = built.classify_request(YEAST_PHE, CLOVERLEAF, Some(5))?;

    let restored = RnaClassifier::from_config(Config {
        snapshot_path: Some(snapshot),
        ..Default::default()
    })?;
    let after = restored.classify_request(YEAST_PHE, CLOVERLEAF, Some(5))?;

    assert_eq!(restored.index_stats().total_entries, 28);
    assert_eq!(before.family, after.family);
    assert_eq!(before.neighbors, after.neighbors);
    Ok(())
}

#[test]
fn test_records_to_snapshot_build() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let output = dir.path().join("families.idx");

    let stats = build_snapshot(&Config::default(), &reference_path(), &output)?;
    assert!(output.exists());
    assert_eq!(stats.total_entries, 28);
    assert_eq!(stats.families.len(), 5);
    assert_eq!(stats.embedder.as_deref(), Some("feature-v1"));

    let classifier = RnaClassifier::from_config(Config::default())?;
    let restored = classifier.load_snapshot(&output)?;
    assert_eq!(restored.total_entries, 28);
    assert_eq!(restored.families, stats.families);

    let result = classifier.classify_request(YEAST_PHE, CLOVERLEAF, None)?;
    assert_eq!(result.neighbors[0].entry.id, "tRNA-Phe-yeast");

    let missing = dir.path().join("missing.json");
    let err = build_snapshot(&Config::default(), &missing, &output).unwrap_err();
    assert_eq!(err.code(), "io");
    Ok(())
}

#[test]
fn test_euclidean_and_affine_confidence_bounds() -> anyhow::Result<()> {
    let mut config = Config::default();
    config.index.metric = Some(Metric::Euclidean);
    let classifier = bundled_classifier(config)?;
    let result = classifier.classify_request("GGGAUUUCC", "(((...)))", None)?;
    assert_eq!(result.metric, Metric::Euclidean);
    assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    assert_eq!(result.confidence, result.top_similarity);

    let mut config = Config::default();
    config.aggregator.confidence_scaling = ConfidenceScaling::Affine;
    let classifier = bundled_classifier(config)?;
    let result = classifier.classify_request("GGGAUUUCC", "(((...)))", None)?;
    assert!((result.confidence - (result.top_similarity + 1.0) / 2.0).abs() < 1e-6);
    Ok(())
}
