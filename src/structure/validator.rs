//! Sequence/structure validation
//!
//! Canonicalizes a raw (sequence, dot-bracket) pair and checks it before any
//! embedding or retrieval work happens.

use serde::{Deserialize, Serialize};

use crate::error::{ClassifyError, Result, UnbalancedReason};

/// Default upper bound on accepted sequence length
pub const DEFAULT_MAX_SEQUENCE_LENGTH: usize = 50_000;

const VALID_BASES: [char; 4] = ['A', 'U', 'G', 'C'];

/// A validated, upper-cased, whitespace-free RNA sequence over {A,U,G,C}
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CleanSequence(String);

impl CleanSequence {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// A validated, balanced dot-bracket annotation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct CleanStructure(String);

impl CleanStructure {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Validation limits
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_sequence_length: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_sequence_length: DEFAULT_MAX_SEQUENCE_LENGTH,
        }
    }
}

/// Validate with default limits.
pub fn validate(raw_sequence: &str, raw_structure: &str) -> Result<(CleanSequence, CleanStructure)> {
    validate_with(raw_sequence, raw_structure, &ValidationLimits::default())
}

/// Strip whitespace, upper-case the sequence, then check in order:
/// emptiness, length limit, alphabet, structure syntax, balance, lengths.
pub fn validate_with(
    raw_sequence: &str,
    raw_structure: &str,
    limits: &ValidationLimits,
) -> Result<(CleanSequence, CleanStructure)> {
    let sequence = clean_sequence(raw_sequence, limits)?;
    let structure = clean_structure(raw_structure)?;

    if sequence.len() != structure.len() {
        return Err(ClassifyError::LengthMismatch {
            sequence_len: sequence.len(),
            structure_len: structure.len(),
        });
    }

    Ok((sequence, structure))
}

/// Canonicalize and check a sequence on its own.
pub fn clean_sequence(raw: &str, limits: &ValidationLimits) -> Result<CleanSequence> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();

    if cleaned.is_empty() {
        return Err(ClassifyError::EmptySequence);
    }
    let length = cleaned.chars().count();
    if length > limits.max_sequence_length {
        return Err(ClassifyError::SequenceTooLong {
            length,
            max: limits.max_sequence_length,
        });
    }
    if let Some((position, invalid)) = offending(&cleaned, |c| VALID_BASES.contains(&c)) {
        return Err(ClassifyError::InvalidAlphabet { invalid, position });
    }

    Ok(CleanSequence(cleaned))
}

/// Canonicalize and check a dot-bracket string on its own.
pub fn clean_structure(raw: &str) -> Result<CleanStructure> {
    let cleaned: String = raw.chars().filter(|c| !c.is_whitespace()).collect();

    if let Some((position, invalid)) = offending(&cleaned, |c| matches!(c, '.' | '(' | ')')) {
        return Err(ClassifyError::InvalidSyntax { invalid, position });
    }
    check_balance(&cleaned)?;

    Ok(CleanStructure(cleaned))
}

/// Running-count balance check. A negative count is reported at the position
/// where it first happens; a positive count at the end reports every
/// unmatched opening position.
pub fn check_balance(structure: &str) -> Result<()> {
    let mut open = Vec::new();
    for (i, c) in structure.chars().enumerate() {
        match c {
            '(' => open.push(i),
            ')' => {
                if open.pop().is_none() {
                    return Err(ClassifyError::UnbalancedStructure {
                        reason: UnbalancedReason::UnmatchedClosing { position: i },
                    });
                }
            }
            _ => {}
        }
    }
    if !open.is_empty() {
        return Err(ClassifyError::UnbalancedStructure {
            reason: UnbalancedReason::UnmatchedOpening { positions: open },
        });
    }
    Ok(())
}

/// First offending position plus the distinct offending characters in order
/// of first appearance.
fn offending(text: &str, allowed: impl Fn(char) -> bool) -> Option<(usize, Vec<char>)> {
    let mut first = None;
    let mut invalid: Vec<char> = Vec::new();
    for (i, c) in text.chars().enumerate() {
        if !allowed(c) {
            first.get_or_insert(i);
            if !invalid.contains(&c) {
                invalid.push(c);
            }
        }
    }
    first.map(|position| (position, invalid))
}

/// Composition statistics for a cleaned sequence
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SequenceStats {
    pub length: usize,
    /// Counts in A, U, G, C order
    pub base_counts: [usize; 4],
    pub base_frequencies: [f64; 4],
    pub gc_content: f64,
    pub au_content: f64,
    /// Longest run of one repeated base
    pub max_repeat_length: usize,
}

impl SequenceStats {
    pub fn from_sequence(sequence: &CleanSequence) -> Self {
        let bytes = sequence.as_bytes();
        let length = bytes.len();
        let mut base_counts = [0usize; 4];
        for b in bytes {
            if let Some(idx) = base_index(*b) {
                base_counts[idx] += 1;
            }
        }

        let denom = length.max(1) as f64;
        let base_frequencies = base_counts.map(|c| c as f64 / denom);

        let mut max_repeat_length = 0;
        let mut run = 0;
        for (i, b) in bytes.iter().enumerate() {
            run = if i > 0 && bytes[i - 1] == *b { run + 1 } else { 1 };
            max_repeat_length = max_repeat_length.max(run);
        }

        Self {
            length,
            base_counts,
            base_frequencies,
            gc_content: (base_counts[2] + base_counts[3]) as f64 / denom,
            au_content: (base_counts[0] + base_counts[1]) as f64 / denom,
            max_repeat_length,
        }
    }
}

/// Index of a base in A, U, G, C order
pub fn base_index(b: u8) -> Option<usize> {
    match b {
        b'A' => Some(0),
        b'U' => Some(1),
        b'G' => Some(2),
        b'C' => Some(3),
        _ => None,
    }
}

/// Human-readable hints for fixing a raw sequence before resubmitting it.
pub fn suggest_corrections(raw: &str) -> Vec<String> {
    let mut suggestions = Vec::new();
    if raw.is_empty() {
        return suggestions;
    }

    let upper = raw.to_ascii_uppercase();
    if upper.contains('T') {
        suggestions.push("The sequence contains T; use U for RNA sequences".to_string());
        let corrected: String = upper
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| if c == 'T' { 'U' } else { c })
            .collect();
        suggestions.push(format!("Example: {}", corrected));
    }
    if raw != upper {
        suggestions.push("Lowercase bases were upper-cased".to_string());
    }
    if raw.chars().any(char::is_whitespace) {
        suggestions.push("Whitespace inside the sequence was removed".to_string());
    }
    suggestions
}
