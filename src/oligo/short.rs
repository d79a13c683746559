use std::fmt;
use std::str::FromStr;

use super::{slice_bounds, LongOligo, Nt, Oligo};
use crate::error::SequenceError;

/// Maximum number of nucleotides a [`ShortOligo`] can hold
pub const MAX_SHORT_LEN: usize = 31;

/// An oligo of at most 31 nucleotides packed into a single `u64`
///
/// Nucleotide 0 occupies the two highest used bits, so for equal lengths the
/// packed value orders exactly like the sequence. The derived ordering compares
/// the length first, which gives "shorter before longer, lexicographic otherwise".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ShortOligo {
    len: u8,
    seq: u64,
}
impl ShortOligo {
    /// Creates an all-`A` oligo of length `len`
    pub fn new(len: usize) -> Result<Self, SequenceError> {
        Self::from_value(len, 0)
    }

    /// Creates an oligo of length `len` from its packed value
    ///
    /// Bits above `2 * len` are discarded.
    pub fn from_value(len: usize, value: u64) -> Result<Self, SequenceError> {
        if len > MAX_SHORT_LEN {
            return Err(SequenceError::TooLong {
                len,
                max: MAX_SHORT_LEN,
            });
        }
        Ok(Self {
            len: len as u8,
            seq: value & Self::mask(len),
        })
    }

    /// Creates an oligo from a slice of nucleotides
    pub fn from_nts(nts: &[Nt]) -> Result<Self, SequenceError> {
        if nts.len() > MAX_SHORT_LEN {
            return Err(SequenceError::TooLong {
                len: nts.len(),
                max: MAX_SHORT_LEN,
            });
        }
        let seq = nts.iter().fold(0u64, |acc, &nt| (acc << 2) | nt as u64);
        Ok(Self {
            len: nts.len() as u8,
            seq,
        })
    }

    fn mask(len: usize) -> u64 {
        if len == 0 {
            0
        } else {
            u64::MAX >> (64 - 2 * len)
        }
    }

    /// Packed value of the sequence
    #[must_use]
    pub fn value(&self) -> u64 {
        self.seq
    }

    /// Sub-oligo covering `[start, end)`
    ///
    /// A non-positive `end` counts from the tail; an empty oligo is returned
    /// when the range is out of bounds.
    #[must_use]
    pub fn slice(&self, start: usize, end: isize) -> Self {
        match slice_bounds(self.len(), start, end) {
            Some((s, e)) => {
                let shifted = self.seq >> (2 * (self.len() - e));
                Self {
                    len: (e - s) as u8,
                    seq: shifted & Self::mask(e - s),
                }
            }
            None => Self::default(),
        }
    }

    /// The last `n` nucleotides (the whole oligo if it is shorter)
    #[must_use]
    pub fn tail(&self, n: usize) -> Self {
        let n = n.min(self.len());
        Self {
            len: n as u8,
            seq: self.seq & Self::mask(n),
        }
    }

    /// Appends another oligo; fails if the result would exceed 31 nucleotides
    pub fn append<O: Oligo + ?Sized>(&mut self, other: &O) -> Result<(), SequenceError> {
        let total = self.len() + other.len();
        if total > MAX_SHORT_LEN {
            return Err(SequenceError::TooLong {
                len: total,
                max: MAX_SHORT_LEN,
            });
        }
        for i in 0..other.len() {
            self.seq = (self.seq << 2) | other.at(i) as u64;
        }
        self.len = total as u8;
        Ok(())
    }

    /// Advances to the lexicographically next oligo of the same length
    ///
    /// Returns `false` (leaving the value unchanged) when the oligo is already
    /// the all-`G` maximum.
    pub fn next(&mut self) -> bool {
        if self.seq == Self::mask(self.len()) {
            return false;
        }
        self.seq += 1;
        true
    }

    /// Converts into the unbounded representation
    #[must_use]
    pub fn to_long(&self) -> LongOligo {
        LongOligo::from(self.to_nts())
    }
}
impl Oligo for ShortOligo {
    fn len(&self) -> usize {
        self.len as usize
    }

    fn at(&self, i: usize) -> Nt {
        assert!(i < self.len(), "index {i} out of bounds");
        Nt::from_bits(self.seq >> (2 * (self.len() - 1 - i)))
    }

    fn set(&mut self, i: usize, nt: Nt) {
        assert!(i < self.len(), "index {i} out of bounds");
        let shift = 2 * (self.len() - 1 - i);
        self.seq = (self.seq & !(3 << shift)) | ((nt as u64) << shift);
    }
}
impl TryFrom<&LongOligo> for ShortOligo {
    type Error = SequenceError;

    fn try_from(value: &LongOligo) -> Result<Self, Self::Error> {
        Self::from_nts(value.as_slice())
    }
}
impl FromStr for ShortOligo {
    type Err = SequenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let nts = s.chars().map(Nt::from_char).collect::<Result<Vec<_>, _>>()?;
        Self::from_nts(&nts)
    }
}
impl fmt::Display for ShortOligo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for i in 0..self.len() {
            write!(f, "{}", self.at(i))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_parse_display() -> Result<()> {
        let o: ShortOligo = "ACGTTGCA".parse()?;
        assert_eq!(o.len(), 8);
        assert_eq!(o.to_string(), "ACGTTGCA");
        assert_eq!(o.at(2), Nt::G);
        Ok(())
    }

    #[test]
    fn test_packing_order() -> Result<()> {
        let o: ShortOligo = "TA".parse()?;
        assert_eq!(o.value(), 0b0100);
        let a: ShortOligo = "AG".parse()?;
        let b: ShortOligo = "TA".parse()?;
        assert!(a < b);
        let shorter: ShortOligo = "GGG".parse()?;
        let longer: ShortOligo = "AAAA".parse()?;
        assert!(shorter < longer);
        Ok(())
    }

    #[test]
    fn test_next_until_overflow() -> Result<()> {
        let mut o = ShortOligo::new(3)?;
        let mut prev = o;
        let mut steps = 1;
        while o.next() {
            assert!(o > prev);
            prev = o;
            steps += 1;
        }
        assert_eq!(steps, 64);
        assert_eq!(o.to_string(), "GGG");
        assert!(!o.next());
        assert_eq!(o.to_string(), "GGG");
        Ok(())
    }

    #[test]
    fn test_slice_and_tail() -> Result<()> {
        let o: ShortOligo = "ACGTTGCA".parse()?;
        assert_eq!(o.slice(2, 5).to_string(), "GTT");
        assert_eq!(o.slice(4, 0).to_string(), "TGCA");
        assert_eq!(o.slice(0, -2).to_string(), "ACGTTG");
        assert!(o.slice(6, 3).is_empty());
        assert_eq!(o.tail(3).to_string(), "GCA");
        Ok(())
    }

    #[test]
    fn test_append_limit() -> Result<()> {
        let mut o: ShortOligo = "ACGT".parse()?;
        let other: ShortOligo = "GG".parse()?;
        o.append(&other)?;
        assert_eq!(o.to_string(), "ACGTGG");

        let mut full = ShortOligo::new(30)?;
        assert!(full.append(&other).is_err());
        assert_eq!(full.len(), 30);
        Ok(())
    }

    #[test]
    fn test_set() -> Result<()> {
        let mut o: ShortOligo = "AAAA".parse()?;
        o.set(1, Nt::G);
        o.set(3, Nt::C);
        assert_eq!(o.to_string(), "AGAC");
        Ok(())
    }

    #[test]
    fn test_conversion() -> Result<()> {
        let long: LongOligo = "CGATCGAT".parse()?;
        let short = ShortOligo::try_from(&long)?;
        assert_eq!(short.to_long(), long);

        let too_long = LongOligo::from(vec![Nt::A; 32]);
        assert!(ShortOligo::try_from(&too_long).is_err());
        Ok(())
    }
}
