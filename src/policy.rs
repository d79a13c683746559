use rand::Rng;

use crate::error::{Result, SequenceError};
use crate::oligo::{LongOligo, Nt};

/// Seed of every internal random number generator
pub const RNG_SEED: u64 = 42;

/// Policy for handling reads with characters outside `ACGT`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Policy {
    #[default]
    IgnoreSequence,
    BreakOnInvalid,
    RandomDraw,
    SetToA,
    SetToC,
    SetToG,
    SetToT,
}
impl Policy {
    fn fill_with_known(sequence: &[u8], val: Nt, obuf: &mut LongOligo) {
        for &n in sequence {
            obuf.push(Nt::from_ascii(n).unwrap_or(val));
        }
    }

    fn fill_with_random<R: Rng>(sequence: &[u8], rng: &mut R, obuf: &mut LongOligo) {
        for &n in sequence {
            obuf.push(Nt::from_ascii(n).unwrap_or_else(|_| Nt::from_bits(rng.random_range(0..4))));
        }
    }

    /// Converts an ASCII read according to the policy
    ///
    /// Overwrites `obuf` and returns whether the read should be processed
    /// further. Valid reads are always kept.
    ///
    /// # Errors
    ///
    /// Fails on an invalid character under [`Policy::BreakOnInvalid`].
    pub fn handle<R: Rng>(&self, sequence: &[u8], obuf: &mut LongOligo, rng: &mut R) -> Result<bool> {
        *obuf = LongOligo::with_capacity(sequence.len());
        if let Some(&bad) = sequence.iter().find(|&&n| Nt::from_ascii(n).is_err()) {
            match self {
                Self::IgnoreSequence => return Ok(false),
                Self::BreakOnInvalid => {
                    return Err(SequenceError::InvalidNucleotide(bad as char).into())
                }
                Self::RandomDraw => Self::fill_with_random(sequence, rng, obuf),
                Self::SetToA => Self::fill_with_known(sequence, Nt::A, obuf),
                Self::SetToC => Self::fill_with_known(sequence, Nt::C, obuf),
                Self::SetToG => Self::fill_with_known(sequence, Nt::G, obuf),
                Self::SetToT => Self::fill_with_known(sequence, Nt::T, obuf),
            }
        } else {
            Self::fill_with_known(sequence, Nt::A, obuf);
        }
        Ok(true)
    }
}
