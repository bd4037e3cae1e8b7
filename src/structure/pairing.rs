//! Dot-bracket parsing into a base-pairing map, plus the structural features
//! derived from it.

use serde::Serialize;

use super::validator::{base_index, check_balance, CleanSequence, CleanStructure};
use crate::error::{ClassifyError, Result};

/// Structural context of a single position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionContext {
    /// Paired position inside a helix
    Stem,
    /// Unpaired, enclosed by a pair with no pairs nested inside it
    Hairpin,
    /// Unpaired, enclosed by a pair that also encloses other pairs
    InnerLoop,
    /// Unpaired and not enclosed by any pair
    External,
}

impl PositionContext {
    pub const ALL: [PositionContext; 4] = [
        PositionContext::Stem,
        PositionContext::Hairpin,
        PositionContext::InnerLoop,
        PositionContext::External,
    ];

    pub fn index(self) -> usize {
        match self {
            Self::Stem => 0,
            Self::Hairpin => 1,
            Self::InnerLoop => 2,
            Self::External => 3,
        }
    }
}

/// Base-pairing relation derived from a balanced dot-bracket string.
///
/// Pairs are matched last-in-first-out, so they never cross.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PairingMap {
    partners: Vec<Option<usize>>,
    /// Number of pairs `(a, b)` with `a <= i <= b`
    depth: Vec<usize>,
    /// Pair `(i, j)` with `i < j` directly encloses at least one other pair
    #[serde(skip)]
    encloses_pair: Vec<bool>,
    /// Innermost pair opening enclosing each position
    #[serde(skip)]
    enclosing: Vec<Option<usize>>,
}

impl PairingMap {
    /// Parse a structure that has not been through the validator; syntax and
    /// balance are re-checked.
    pub fn parse(structure: &str) -> Result<Self> {
        if let Some((position, c)) = structure
            .chars()
            .enumerate()
            .find(|(_, c)| !matches!(c, '.' | '(' | ')'))
        {
            return Err(ClassifyError::InvalidSyntax {
                invalid: vec![c],
                position,
            });
        }
        check_balance(structure)?;
        Ok(Self::build(structure.as_bytes()))
    }

    /// Parse a structure the validator already accepted.
    pub fn from_clean(structure: &CleanStructure) -> Self {
        Self::build(structure.as_str().as_bytes())
    }

    fn build(symbols: &[u8]) -> Self {
        let n = symbols.len();
        let mut partners = vec![None; n];
        let mut depth = vec![0usize; n];
        let mut encloses_pair = vec![false; n];
        let mut enclosing = vec![None; n];
        let mut stack: Vec<usize> = Vec::new();

        for (i, symbol) in symbols.iter().enumerate() {
            match symbol {
                b'(' => {
                    if let Some(&parent) = stack.last() {
                        encloses_pair[parent] = true;
                    }
                    enclosing[i] = stack.last().copied();
                    stack.push(i);
                    depth[i] = stack.len();
                }
                b')' => {
                    // Balance is checked by the callers.
                    if let Some(j) = stack.pop() {
                        partners[i] = Some(j);
                        partners[j] = Some(i);
                        depth[i] = stack.len() + 1;
                        enclosing[i] = stack.last().copied();
                    }
                }
                _ => {
                    depth[i] = stack.len();
                    enclosing[i] = stack.last().copied();
                }
            }
        }

        Self {
            partners,
            depth,
            encloses_pair,
            enclosing,
        }
    }

    pub fn len(&self) -> usize {
        self.partners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partners.is_empty()
    }

    pub fn partner(&self, i: usize) -> Option<usize> {
        self.partners.get(i).copied().flatten()
    }

    pub fn is_paired(&self, i: usize) -> bool {
        self.partner(i).is_some()
    }

    /// Sorted pairs `(i, j)` with `i < j`
    pub fn pairs(&self) -> Vec<(usize, usize)> {
        self.partners
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.filter(|&j| i < j).map(|j| (i, j)))
            .collect()
    }

    pub fn num_pairs(&self) -> usize {
        self.partners.iter().filter(|p| p.is_some()).count() / 2
    }

    pub fn depth(&self, i: usize) -> usize {
        self.depth.get(i).copied().unwrap_or(0)
    }

    pub fn depths(&self) -> &[usize] {
        &self.depth
    }

    pub fn max_depth(&self) -> usize {
        self.depth.iter().copied().max().unwrap_or(0)
    }

    pub fn context(&self, i: usize) -> PositionContext {
        if self.is_paired(i) {
            return PositionContext::Stem;
        }
        match self.enclosing.get(i).copied().flatten() {
            None => PositionContext::External,
            Some(open) if self.encloses_pair[open] => PositionContext::InnerLoop,
            Some(_) => PositionContext::Hairpin,
        }
    }

    /// Serialize back to dot-bracket notation.
    pub fn to_dot_bracket(&self) -> String {
        self.partners
            .iter()
            .enumerate()
            .map(|(i, p)| match p {
                Some(j) if i < *j => '(',
                Some(_) => ')',
                None => '.',
            })
            .collect()
    }

    /// Number of pairs directly nested inside pair `(open, partner(open))`
    fn child_count(&self, open: usize) -> usize {
        let Some(close) = self.partner(open) else {
            return 0;
        };
        let mut count = 0;
        let mut i = open + 1;
        while i < close {
            match self.partner(i) {
                Some(j) if j > i => {
                    count += 1;
                    i = j + 1;
                }
                _ => i += 1,
            }
        }
        count
    }
}

/// Explainable features computed straight from the pairing map
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructuralFeatures {
    pub length: usize,
    pub pair_count: usize,
    pub fraction_paired: f64,
    pub max_depth: usize,
    pub mean_depth: f64,
    /// Maximal runs of stacked pairs
    pub stem_count: usize,
    pub longest_stem: usize,
    pub hairpin_count: usize,
    /// Interior loops and bulges: a pair with one nested pair that is not stacked on it
    pub internal_loop_count: usize,
    pub multiloop_count: usize,
    pub gc_content: f64,
    /// Fraction of pairs that are G-C, A-U, G-U, or non-canonical
    pub pair_composition: [f64; 4],
    pub tags: Vec<String>,
}

impl StructuralFeatures {
    pub fn from_pairing(pairing: &PairingMap, sequence: &CleanSequence) -> Self {
        let length = pairing.len();
        let pairs = pairing.pairs();
        let pair_count = pairs.len();
        let denom = length.max(1) as f64;

        let mut stem_count = 0;
        let mut longest_stem = 0;
        let mut current_stem = 0;
        let mut hairpin_count = 0;
        let mut internal_loop_count = 0;
        let mut multiloop_count = 0;

        for &(i, j) in &pairs {
            let stacked_outside = i > 0 && pairing.partner(i - 1) == Some(j + 1);
            if stacked_outside {
                current_stem += 1;
            } else {
                stem_count += 1;
                current_stem = 1;
            }
            longest_stem = longest_stem.max(current_stem);

            match pairing.child_count(i) {
                0 => hairpin_count += 1,
                1 => {
                    let stacked_inside = pairing.partner(i + 1) == Some(j - 1);
                    if !stacked_inside {
                        internal_loop_count += 1;
                    }
                }
                _ => multiloop_count += 1,
            }
        }

        let bytes = sequence.as_bytes();
        let mut pair_composition = [0.0f64; 4];
        for &(i, j) in &pairs {
            let slot = match (bytes.get(i), bytes.get(j)) {
                (Some(b'G'), Some(b'C')) | (Some(b'C'), Some(b'G')) => 0,
                (Some(b'A'), Some(b'U')) | (Some(b'U'), Some(b'A')) => 1,
                (Some(b'G'), Some(b'U')) | (Some(b'U'), Some(b'G')) => 2,
                _ => 3,
            };
            pair_composition[slot] += 1.0;
        }
        if pair_count > 0 {
            for v in &mut pair_composition {
                *v /= pair_count as f64;
            }
        }

        let gc = bytes
            .iter()
            .filter(|b| matches!(base_index(**b), Some(2) | Some(3)))
            .count();

        let mut features = Self {
            length,
            pair_count,
            fraction_paired: (2 * pair_count) as f64 / denom,
            max_depth: pairing.max_depth(),
            mean_depth: pairing.depths().iter().sum::<usize>() as f64 / denom,
            stem_count,
            longest_stem,
            hairpin_count,
            internal_loop_count,
            multiloop_count,
            gc_content: gc as f64 / denom,
            pair_composition,
            tags: Vec::new(),
        };
        features.tags = features.derive_tags();
        features
    }

    pub fn has_stem_loop(&self) -> bool {
        self.hairpin_count > 0
    }

    fn derive_tags(&self) -> Vec<String> {
        let mut tags = Vec::new();
        if self.pair_count == 0 {
            tags.push("unstructured".to_string());
        }
        if self.has_stem_loop() {
            tags.push("has_stem_loop".to_string());
        }
        if self.fraction_paired > 0.5 {
            tags.push("fraction_paired>0.5".to_string());
        }
        if self.multiloop_count > 0 {
            tags.push("multibranch".to_string());
        }
        if self.internal_loop_count > 0 {
            tags.push("internal_loop".to_string());
        }
        if self.pair_composition[3] > 0.0 {
            tags.push("noncanonical_pairs".to_string());
        }
        tags
    }
}
