//! Error taxonomy for the classification core
//!
//! Every failure that can cross the `classify_request` boundary is a
//! `ClassifyError` variant with structured detail and a stable `code()`,
//! so an outer layer can map it to a status and a message.

use serde::Serialize;
use thiserror::Error;

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ClassifyError>;

/// The two ways a parenthesis balance check can fail
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum UnbalancedReason {
    /// A ')' appeared with no open '(' left; the running count went negative here.
    UnmatchedClosing { position: usize },
    /// Scanning finished with open '(' still on the stack.
    UnmatchedOpening { positions: Vec<usize> },
}

impl std::fmt::Display for UnbalancedReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnmatchedClosing { position } => write!(
                f,
                "closing ')' at position {} has no matching opening '('",
                position
            ),
            Self::UnmatchedOpening { positions } => write!(
                f,
                "{} opening '(' left unmatched (positions {:?})",
                positions.len(),
                positions
            ),
        }
    }
}

#[derive(Error, Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "error", content = "detail")]
pub enum ClassifyError {
    #[error("RNA sequence is empty")]
    EmptySequence,

    #[error("Sequence length {length} exceeds maximum {max}")]
    SequenceTooLong { length: usize, max: usize },

    #[error("Sequence contains invalid bases {invalid:?} (first at position {position}); allowed: A, U, G, C")]
    InvalidAlphabet { invalid: Vec<char>, position: usize },

    #[error("Structure contains invalid symbols {invalid:?} (first at position {position}); allowed: '.', '(', ')'")]
    InvalidSyntax { invalid: Vec<char>, position: usize },

    #[error("Unbalanced structure: {reason}")]
    UnbalancedStructure { reason: UnbalancedReason },

    #[error("Sequence length {sequence_len} does not match structure length {structure_len}")]
    LengthMismatch {
        sequence_len: usize,
        structure_len: usize,
    },

    #[error("Embedding unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid k = {k}: at least one neighbor must be requested")]
    InvalidK { k: usize },

    #[error("k = {k} exceeds the maximum of {max}")]
    KTooLarge { k: usize, max: usize },

    #[error("No reference entries matched the query")]
    NoReferenceMatches,

    #[error("Reference entries mix similarity metrics: index uses {expected}, entry '{entry}' uses {found}")]
    MixedMetrics {
        expected: String,
        found: String,
        entry: String,
    },

    #[error("Invalid reference record '{id}': {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error("Reference storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Classification task failed: {0}")]
    TaskFailed(String),

    #[error("IO error: {0}")]
    Io(
        #[from]
        #[serde(serialize_with = "serialize_display")]
        std::io::Error,
    ),
}

impl ClassifyError {
    /// Stable machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptySequence => "empty_sequence",
            Self::SequenceTooLong { .. } => "sequence_too_long",
            Self::InvalidAlphabet { .. } => "invalid_alphabet",
            Self::InvalidSyntax { .. } => "invalid_syntax",
            Self::UnbalancedStructure { .. } => "unbalanced_structure",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::EmbeddingUnavailable { .. } => "embedding_unavailable",
            Self::DimensionMismatch { .. } => "dimension_mismatch",
            Self::InvalidK { .. } => "invalid_k",
            Self::KTooLarge { .. } => "k_too_large",
            Self::NoReferenceMatches => "no_reference_matches",
            Self::MixedMetrics { .. } => "mixed_metrics",
            Self::InvalidRecord { .. } => "invalid_record",
            Self::Storage(_) => "storage",
            Self::Config(_) => "config",
            Self::TaskFailed(_) => "task_failed",
            Self::Io(_) => "io",
        }
    }

    /// True when the caller's input caused the failure (as opposed to the
    /// environment: missing model, storage, configuration).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptySequence
                | Self::SequenceTooLong { .. }
                | Self::InvalidAlphabet { .. }
                | Self::InvalidSyntax { .. }
                | Self::UnbalancedStructure { .. }
                | Self::LengthMismatch { .. }
                | Self::InvalidK { .. }
                | Self::KTooLarge { .. }
        )
    }
}

impl From<serde_json::Error> for ClassifyError {
    fn from(err: serde_json::Error) -> Self {
        ClassifyError::Storage(err.to_string())
    }
}

impl From<bincode::Error> for ClassifyError {
    fn from(err: bincode::Error) -> Self {
        ClassifyError::Storage(err.to_string())
    }
}

fn serialize_display<S, T>(value: &T, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct_per_kind() {
        let errors = vec![
            ClassifyError::InvalidAlphabet { invalid: vec!['X'], position: 3 },
            ClassifyError::InvalidSyntax { invalid: vec!['['], position: 0 },
            ClassifyError::UnbalancedStructure {
                reason: UnbalancedReason::UnmatchedClosing { position: 0 },
            },
            ClassifyError::LengthMismatch { sequence_len: 4, structure_len: 3 },
            ClassifyError::EmbeddingUnavailable { reason: "missing".into() },
            ClassifyError::InvalidK { k: 0 },
            ClassifyError::KTooLarge { k: 101, max: 100 },
            ClassifyError::NoReferenceMatches,
        ];
        let mut codes: Vec<_> = errors.iter().map(|e| e.code()).collect();
        codes.sort();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn test_client_vs_environment_errors() {
        assert!(ClassifyError::InvalidK { k: 0 }.is_client_error());
        assert!(!ClassifyError::NoReferenceMatches.is_client_error());
        assert!(!ClassifyError::EmbeddingUnavailable { reason: String::new() }.is_client_error());
    }

    #[test]
    fn test_serialized_error_keeps_detail() {
        let err = ClassifyError::LengthMismatch { sequence_len: 9, structure_len: 8 };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["error"], "length_mismatch");
        assert_eq!(value["detail"]["sequence_len"], 9);
        assert_eq!(value["detail"]["structure_len"], 8);

        let err = ClassifyError::UnbalancedStructure {
            reason: UnbalancedReason::UnmatchedOpening { positions: vec![0] },
        };
        let value = serde_json::to_value(&err).unwrap();
        assert_eq!(value["detail"]["reason"]["kind"], "unmatched_opening");

        let value = serde_json::to_value(ClassifyError::NoReferenceMatches).unwrap();
        assert_eq!(value["error"], "no_reference_matches");
    }
}
