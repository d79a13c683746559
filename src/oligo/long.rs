use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use super::{slice_bounds, Nt, Oligo, ShortOligo};
use crate::error::SequenceError;

/// An oligo of any length, one nucleotide per byte
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct LongOligo {
    seq: Vec<Nt>,
}
impl LongOligo {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            seq: Vec::with_capacity(capacity),
        }
    }

    /// Parses an ASCII sequence; any character outside `ATCG` is an error
    pub fn from_ascii(seq: &[u8]) -> Result<Self, SequenceError> {
        let seq = seq
            .iter()
            .map(|&b| Nt::from_ascii(b))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { seq })
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Nt] {
        &self.seq
    }

    /// Sub-oligo covering `[start, end)`
    ///
    /// A non-positive `end` counts from the tail; an empty oligo is returned
    /// when the range is out of bounds.
    #[must_use]
    pub fn slice(&self, start: usize, end: isize) -> Self {
        match slice_bounds(self.len(), start, end) {
            Some((s, e)) => Self::from(self.seq[s..e].to_vec()),
            None => Self::default(),
        }
    }

    /// Appends another oligo; always succeeds
    pub fn append<O: Oligo + ?Sized>(&mut self, other: &O) {
        self.seq.extend((0..other.len()).map(|i| other.at(i)));
    }

    pub fn push(&mut self, nt: Nt) {
        self.seq.push(nt);
    }

    /// Advances to the lexicographically next oligo of the same length
    ///
    /// Returns `false` (leaving the value unchanged) at the all-`G` maximum.
    pub fn next(&mut self) -> bool {
        if self.seq.iter().all(|&nt| nt == Nt::G) {
            return false;
        }
        for nt in self.seq.iter_mut().rev() {
            if *nt == Nt::G {
                *nt = Nt::A;
            } else {
                *nt = Nt::from_bits(*nt as u64 + 1);
                break;
            }
        }
        true
    }

    /// Reverse complement of the oligo
    #[must_use]
    pub fn reverse_complement(&self) -> Self {
        Self::from(self.seq.iter().rev().map(|nt| nt.complement()).collect::<Vec<_>>())
    }

    /// Copies into the packed representation if it fits
    pub fn to_short(&self) -> Result<ShortOligo, SequenceError> {
        ShortOligo::try_from(self)
    }
}
impl Oligo for LongOligo {
    fn len(&self) -> usize {
        self.seq.len()
    }

    fn at(&self, i: usize) -> Nt {
        self.seq[i]
    }

    fn set(&mut self, i: usize, nt: Nt) {
        self.seq[i] = nt;
    }

    fn to_nts(&self) -> Vec<Nt> {
        self.seq.clone()
    }
}
impl From<Vec<Nt>> for LongOligo {
    fn from(seq: Vec<Nt>) -> Self {
        Self { seq }
    }
}
impl From<&ShortOligo> for LongOligo {
    fn from(value: &ShortOligo) -> Self {
        value.to_long()
    }
}
impl FromStr for LongOligo {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_ascii(s.as_bytes())
    }
}
impl Ord for LongOligo {
    /// Shorter oligos order before longer ones; equal lengths compare lexicographically
    fn cmp(&self, other: &Self) -> Ordering {
        self.len()
            .cmp(&other.len())
            .then_with(|| self.seq.cmp(&other.seq))
    }
}
impl PartialOrd for LongOligo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl fmt::Display for LongOligo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for nt in &self.seq {
            write!(f, "{nt}")?;
        }
        Ok(())
    }
}
