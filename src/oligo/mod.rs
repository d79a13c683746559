//! # oligo
//!
//! Nucleotides and the two oligo representations used throughout the crate.
//!
//! * [`ShortOligo`] packs up to 31 nucleotides into a single `u64` with the
//!   first nucleotide in the high bits, so numeric order equals lexicographic
//!   order and [`ShortOligo::next`] walks the sequence space.
//! * [`LongOligo`] stores one nucleotide per byte and has no length limit.
//!
//! Both implement the [`Oligo`] trait. Conversions between them are explicit.
//!
//! ## Encoding
//!
//! | Nucleotide | Value |
//! | ---------- | ----- |
//! | A          | 0     |
//! | T          | 1     |
//! | C          | 2     |
//! | G          | 3     |

mod distance;
mod long;
mod short;

use std::fmt;

pub use distance::{diff, distance, distance_within, find, find_prefix};
pub use long::LongOligo;
pub use short::{ShortOligo, MAX_SHORT_LEN};

use crate::error::SequenceError;

/// A single nucleotide
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Nt {
    A = 0,
    T = 1,
    C = 2,
    G = 3,
}
impl Nt {
    /// All nucleotides in value order
    pub const ALL: [Nt; 4] = [Nt::A, Nt::T, Nt::C, Nt::G];

    /// Builds a nucleotide from the low two bits of `value`
    #[must_use]
    pub fn from_bits(value: u64) -> Self {
        match value & 3 {
            0 => Nt::A,
            1 => Nt::T,
            2 => Nt::C,
            _ => Nt::G,
        }
    }

    /// Parses a single character (case-insensitive)
    pub fn from_char(c: char) -> Result<Self, SequenceError> {
        match c {
            'A' | 'a' => Ok(Nt::A),
            'T' | 't' => Ok(Nt::T),
            'C' | 'c' => Ok(Nt::C),
            'G' | 'g' => Ok(Nt::G),
            _ => Err(SequenceError::InvalidNucleotide(c)),
        }
    }

    /// Parses a single ASCII byte (case-insensitive)
    pub fn from_ascii(b: u8) -> Result<Self, SequenceError> {
        Self::from_char(b as char)
    }

    /// Uppercase textual form
    #[must_use]
    pub fn to_char(self) -> char {
        match self {
            Nt::A => 'A',
            Nt::T => 'T',
            Nt::C => 'C',
            Nt::G => 'G',
        }
    }

    /// Watson-Crick complement
    #[must_use]
    pub fn complement(self) -> Self {
        match self {
            Nt::A => Nt::T,
            Nt::T => Nt::A,
            Nt::C => Nt::G,
            Nt::G => Nt::C,
        }
    }

    #[must_use]
    pub fn is_gc(self) -> bool {
        matches!(self, Nt::C | Nt::G)
    }
}
impl fmt::Display for Nt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_char())
    }
}

/// Common contract of the oligo representations
pub trait Oligo {
    /// Number of nucleotides
    fn len(&self) -> usize;

    /// Nucleotide at position `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds
    fn at(&self, i: usize) -> Nt;

    /// Replaces the nucleotide at position `i`
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds
    fn set(&mut self, i: usize, nt: Nt);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collects the nucleotides into a vector
    fn to_nts(&self) -> Vec<Nt> {
        (0..self.len()).map(|i| self.at(i)).collect()
    }

    /// Number of G or C nucleotides
    fn gc_count(&self) -> usize {
        (0..self.len()).filter(|&i| self.at(i).is_gc()).count()
    }
}

/// Resolves the `(start, end)` slice convention shared by both representations
///
/// A non-positive `end` counts from the tail (`0` means "to the end").
/// Returns `None` when the resulting range is empty or out of bounds.
pub(crate) fn slice_bounds(len: usize, start: usize, end: isize) -> Option<(usize, usize)> {
    let end = if end <= 0 {
        len as isize + end
    } else {
        end
    };
    if end < 0 {
        return None;
    }
    let end = end as usize;
    if start >= end || end > len {
        return None;
    }
    Some((start, end))
}
