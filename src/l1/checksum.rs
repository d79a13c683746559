//! Metadata checksums
//!
//! The metadata bytes of a frame (address and flags) are protected either by a
//! CRC or by Reed-Solomon parity. The decoder uses the checksum to prune its
//! search: a candidate frame is only accepted once its metadata validates.

use crc::{Crc, CRC_16_IBM_SDLC, CRC_8_SMBUS};
use reed_solomon_erasure::galois_8;

use crate::error::{ConfigError, Result};
use crate::utils::first_subset;

const CRC8: Crc<u8> = Crc::<u8>::new(&CRC_8_SMBUS);
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);

/// Checksum policy of the frame metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataChecksum {
    /// One CRC-8 byte
    Crc8,
    /// Two CRC-16 bytes
    #[default]
    Crc16,
    /// `rsnum` Reed-Solomon parity bytes; corrects up to `rsnum / 2` bad bytes
    ReedSolomon { rsnum: usize },
}
impl MetadataChecksum {
    /// Number of checksum bytes in a frame
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Crc8 => 1,
            Self::Crc16 => 2,
            Self::ReedSolomon { rsnum } => *rsnum,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A checksum policy bound to a metadata length
pub(crate) enum Checker {
    Crc8,
    Crc16,
    ReedSolomon(galois_8::ReedSolomon),
}
impl Checker {
    pub(crate) fn new(kind: MetadataChecksum, mdnum: usize) -> Result<Self> {
        Ok(match kind {
            MetadataChecksum::Crc8 => Self::Crc8,
            MetadataChecksum::Crc16 => Self::Crc16,
            MetadataChecksum::ReedSolomon { rsnum } => {
                if rsnum == 0 {
                    return Err(ConfigError::InvalidParameter {
                        name: "rsnum",
                        reason: "must be positive".to_string(),
                    }
                    .into());
                }
                Self::ReedSolomon(galois_8::ReedSolomon::new(mdnum, rsnum)?)
            }
        })
    }

    /// Checksum bytes of `md`
    pub(crate) fn compute(&self, md: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Crc8 => Ok(vec![CRC8.checksum(md)]),
            Self::Crc16 => Ok(CRC16.checksum(md).to_le_bytes().to_vec()),
            Self::ReedSolomon(rs) => {
                let mut shards: Vec<Vec<u8>> = md
                    .iter()
                    .map(|&b| vec![b])
                    .chain((0..rs.parity_shard_count()).map(|_| vec![0]))
                    .collect();
                rs.encode(&mut shards)?;
                Ok(shards[md.len()..].iter().map(|s| s[0]).collect())
            }
        }
    }

    /// The (possibly corrected) metadata if `md ‖ cs` validates
    pub(crate) fn validate(&self, md: &[u8], cs: &[u8]) -> Option<Vec<u8>> {
        match self {
            Self::Crc8 | Self::Crc16 => {
                let expected = self.compute(md).ok()?;
                (expected == cs).then(|| md.to_vec())
            }
            Self::ReedSolomon(rs) => correct(rs, md, cs),
        }
    }
}

/// Erasure-only Reed-Solomon used as an error corrector
///
/// Tries erasing every set of up to `rsnum / 2` bytes, reconstructing, and
/// checking the result against the remaining parity.
fn correct(rs: &galois_8::ReedSolomon, md: &[u8], cs: &[u8]) -> Option<Vec<u8>> {
    let shards: Vec<Vec<u8>> = md.iter().chain(cs).map(|&b| vec![b]).collect();
    if rs.verify(&shards).ok()? {
        return Some(md.to_vec());
    }
    let positions: Vec<usize> = (0..shards.len()).collect();
    (1..=rs.parity_shard_count() / 2).find_map(|count| {
        first_subset(&positions, count, |erased| {
            let mut partial: Vec<Option<Vec<u8>>> = shards.iter().cloned().map(Some).collect();
            for &i in erased {
                partial[i] = None;
            }
            rs.reconstruct(&mut partial).ok()?;
            let full: Vec<Vec<u8>> = partial.into_iter().collect::<Option<_>>()?;
            rs.verify(&full)
                .ok()?
                .then(|| full[..md.len()].iter().map(|s| s[0]).collect())
        })
    })
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_lengths() {
        assert_eq!(MetadataChecksum::Crc8.len(), 1);
        assert_eq!(MetadataChecksum::Crc16.len(), 2);
        assert_eq!(MetadataChecksum::ReedSolomon { rsnum: 4 }.len(), 4);
        assert_eq!(MetadataChecksum::default(), MetadataChecksum::Crc16);
    }

    #[test]
    fn test_crc_validates() -> Result<()> {
        for kind in [MetadataChecksum::Crc8, MetadataChecksum::Crc16] {
            let checker = Checker::new(kind, 2)?;
            let md = [0x2A, 0x40];
            let cs = checker.compute(&md)?;
            assert_eq!(cs.len(), kind.len());
            assert_eq!(checker.validate(&md, &cs), Some(md.to_vec()));
            assert_eq!(checker.validate(&[0x2B, 0x40], &cs), None);
        }
        Ok(())
    }

    #[test]
    fn test_reed_solomon_corrects() -> Result<()> {
        let checker = Checker::new(MetadataChecksum::ReedSolomon { rsnum: 4 }, 3)?;
        let md = [0x01, 0x02, 0x83];
        let cs = checker.compute(&md)?;
        assert_eq!(cs.len(), 4);
        assert_eq!(checker.validate(&md, &cs), Some(md.to_vec()));

        // one bad metadata byte
        assert_eq!(checker.validate(&[0x01, 0xFF, 0x83], &cs), Some(md.to_vec()));

        // two bad bytes, one of them parity
        let mut bad_cs = cs.clone();
        bad_cs[3] ^= 0x55;
        assert_eq!(checker.validate(&[0x00, 0x02, 0x83], &bad_cs), Some(md.to_vec()));
        Ok(())
    }

    #[test]
    fn test_reed_solomon_rejects_too_many() -> Result<()> {
        let checker = Checker::new(MetadataChecksum::ReedSolomon { rsnum: 2 }, 2)?;
        let md = [0x10, 0x20];
        let cs = checker.compute(&md)?;
        let corrected = checker.validate(&[0x11, 0x21], &cs);
        assert_ne!(corrected, Some(md.to_vec()));
        Ok(())
    }

    #[test]
    fn test_zero_parity_is_rejected() {
        assert!(Checker::new(MetadataChecksum::ReedSolomon { rsnum: 0 }, 2).is_err());
    }
}
