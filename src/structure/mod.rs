//! Sequence/Structure Module
//!
//! Validation of raw (sequence, dot-bracket) input and the base-pairing map
//! derived from the structure.

pub mod pairing;
pub mod validator;

pub use pairing::{PairingMap, PositionContext, StructuralFeatures};
pub use validator::{
    suggest_corrections, validate, validate_with, CleanSequence, CleanStructure, SequenceStats,
    ValidationLimits,
};
