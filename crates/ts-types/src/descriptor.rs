//! The three primitive parameter kinds a search backend understands, and the
//! per-trial values it hands out for them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

use crate::errors::{TuneError, TuneResult};

/// "Pick one of `count` alternatives."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryDescriptor {
    pub count: usize,
}

impl CategoryDescriptor {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

/// A normalized index range `[start, end)` walked with `step`.
///
/// The tuner always registers ranges in canonical form (`start = 0`,
/// `step = 1`); the caller-facing begin/step arithmetic never reaches the
/// backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeDescriptor {
    pub start: usize,
    pub end: usize,
    pub step: usize,
}

impl RangeDescriptor {
    pub fn new(start: usize, end: usize, step: usize) -> Self {
        Self { start, end, step }
    }

    /// Canonical zero-based, unit-step range over `[0, size)`.
    pub fn canonical(size: usize) -> Self {
        Self::new(0, size, 1)
    }

    /// Number of indices in the range: ⌈(end − start) / step⌉.
    pub fn size(&self) -> usize {
        if self.step == 0 || self.end <= self.start {
            return 0;
        }
        (self.end - self.start).div_ceil(self.step)
    }
}

/// "Produce a permutation of `count` elements."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PermutationDescriptor {
    pub count: usize,
}

impl PermutationDescriptor {
    pub fn new(count: usize) -> Self {
        Self { count }
    }
}

/// A backend-visible parameter declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Descriptor {
    Category(CategoryDescriptor),
    Range(RangeDescriptor),
    Permutation(PermutationDescriptor),
}

impl Descriptor {
    pub fn category(count: usize) -> Self {
        Self::Category(CategoryDescriptor::new(count))
    }

    pub fn range(size: usize) -> Self {
        Self::Range(RangeDescriptor::canonical(size))
    }

    pub fn permutation(count: usize) -> Self {
        Self::Permutation(PermutationDescriptor::new(count))
    }

    /// Number of distinct alternatives along this dimension's primary axis:
    /// categories for a category, indices for a range, elements for a
    /// permutation.
    pub fn cardinality(&self) -> usize {
        match self {
            Self::Category(c) => c.count,
            Self::Range(r) => r.size(),
            Self::Permutation(p) => p.count,
        }
    }

    /// Number of distinct assignments this descriptor admits, or `None` on
    /// overflow (permutations grow factorially).
    pub fn assignment_count(&self) -> Option<usize> {
        match self {
            Self::Permutation(p) => (1..=p.count).try_fold(1usize, |acc, k| acc.checked_mul(k)),
            other => Some(other.cardinality()),
        }
    }

    /// Reject descriptors that would admit no assignment.
    pub fn validate(&self, name: &str) -> TuneResult<()> {
        if self.cardinality() == 0 {
            return Err(TuneError::ZeroCardinality {
                name: name.to_string(),
            });
        }
        Ok(())
    }

    /// Whether `assignment` is a legal value for this descriptor.
    pub fn admits(&self, assignment: &Assignment) -> bool {
        match (self, assignment) {
            (Self::Category(c), Assignment::Index(i)) => *i < c.count,
            (Self::Range(r), Assignment::Index(i)) => *i < r.size(),
            (Self::Permutation(p), Assignment::Permutation(perm)) => perm.len() == p.count,
            _ => false,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Category(_) => "category",
            Self::Range(_) => "range",
            Self::Permutation(_) => "permutation",
        }
    }
}

impl fmt::Display for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Category(c) => write!(f, "category({})", c.count),
            Self::Range(r) => write!(f, "range({}, {}, {})", r.start, r.end, r.step),
            Self::Permutation(p) => write!(f, "permutation({})", p.count),
        }
    }
}

/// A bijection on `[0, n)`: the backend's trial-specific ordering for a
/// permutation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct RawPermutation(Vec<usize>);

impl RawPermutation {
    /// Validate that `indices` covers `[0, indices.len())` exactly once.
    pub fn new(indices: Vec<usize>) -> TuneResult<Self> {
        let n = indices.len();
        let mut seen = vec![false; n];
        for &i in &indices {
            if i >= n {
                return Err(TuneError::InvalidPermutation {
                    message: format!("index {i} out of range for {n} elements"),
                });
            }
            if std::mem::replace(&mut seen[i], true) {
                return Err(TuneError::InvalidPermutation {
                    message: format!("index {i} appears more than once"),
                });
            }
        }
        Ok(Self(indices))
    }

    pub fn identity(n: usize) -> Self {
        Self((0..n).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    /// Exchange two positions; the result is still a bijection.
    pub fn swap(&mut self, a: usize, b: usize) {
        self.0.swap(a, b);
    }
}

impl Index<usize> for RawPermutation {
    type Output = usize;

    fn index(&self, position: usize) -> &usize {
        &self.0[position]
    }
}

impl TryFrom<Vec<usize>> for RawPermutation {
    type Error = TuneError;

    fn try_from(indices: Vec<usize>) -> TuneResult<Self> {
        Self::new(indices)
    }
}

impl From<RawPermutation> for Vec<usize> {
    fn from(perm: RawPermutation) -> Self {
        perm.0
    }
}

/// What a backend hands out for one descriptor during one trial.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Assignment {
    /// Chosen category, or chosen index of a normalized range.
    Index(usize),
    Permutation(RawPermutation),
}

impl Assignment {
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Permutation(_) => None,
        }
    }

    pub fn into_permutation(self) -> Option<RawPermutation> {
        match self {
            Self::Permutation(p) => Some(p),
            Self::Index(_) => None,
        }
    }
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Permutation(p) => write!(f, "{:?}", p.as_slice()),
        }
    }
}
