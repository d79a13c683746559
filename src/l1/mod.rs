//! # l1
//!
//! The addressed frame codec.
//!
//! A [`Frame`] (address, erasure flag, scrambled flag and a fixed number of data
//! bytes) becomes one oligo `P5 ‖ body ‖ P3`. The body is a chain of L0 words:
//! the frame byte stream
//!
//! ```text
//! metadata (LE, metadata_len bytes) ‖ checksum ‖ data (data_len bytes)
//! ```
//!
//! is cut most-significant-bit first into values of [`L0Codec::bits`] bits, and
//! each value is encoded after the tail of what precedes it (the 5' primer for
//! the first word). The metadata value is `addr | erasure·M | scrambled·2M` with
//! `M` the [`max_addr`](L1Codec::max_addr).
//!
//! Decoding trims the primers by fuzzy alignment, then searches the header words
//! (those carrying metadata and checksum) depth-first over the most probable L0
//! variants, accepting the first combination whose checksum validates. Data words
//! are decoded greedily; residual data errors are left to the pool's erasure code.

mod bits;
mod checksum;
mod decoder;

use std::sync::Arc;
use std::time::Duration;

pub use checksum::MetadataChecksum;

use checksum::Checker;

use crate::error::{ConfigError, Result, SequenceError, TableError};
use crate::l0::L0Codec;
use crate::oligo::{LongOligo, Oligo, ShortOligo};

/// Edit errors tolerated when locating each primer
pub const PRIMER_ERRORS: usize = 8;

/// Default decode deadline per oligo
pub const DEFAULT_MAX_TIME: Duration = Duration::from_secs(1);

/// Default number of metadata bytes
pub const DEFAULT_METADATA_LEN: usize = 2;

/// Default number of data bytes per frame
pub const DEFAULT_DATA_LEN: usize = 5;

/// The content of one oligo
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    pub addr: u64,
    /// Set for parity rows of an erasure group
    pub erasure: bool,
    /// Set when the data bytes travel bit-inverted
    pub scrambled: bool,
    pub data: Vec<u8>,
}
impl Frame {
    #[must_use]
    pub fn new(addr: u64, data: Vec<u8>) -> Self {
        Self {
            addr,
            data,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn erasure(mut self, erasure: bool) -> Self {
        self.erasure = erasure;
        self
    }

    #[must_use]
    pub fn scrambled(mut self, scrambled: bool) -> Self {
        self.scrambled = scrambled;
        self
    }
}

/// Builder for [`L1Codec`]
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use oligostore::l0::L0Builder;
/// # use oligostore::l1::{L1CodecBuilder, MetadataChecksum};
/// # fn main() -> oligostore::Result<()> {
/// let l0 = Arc::new(L0Builder::default().build()?);
/// let codec = L1CodecBuilder::default()
///     .primers("CGACATCTCGATGGCAGCAT".parse()?, "CAGTGAGCTGGCAACTTCCA".parse()?)
///     .data_len(5)
///     .metadata_len(2)
///     .checksum(MetadataChecksum::Crc16)
///     .build(l0)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default, Clone)]
pub struct L1CodecBuilder {
    p5: Option<LongOligo>,
    p3: Option<LongOligo>,
    data_len: Option<usize>,
    metadata_len: Option<usize>,
    checksum: Option<MetadataChecksum>,
    primer_errors: Option<usize>,
    max_time: Option<Duration>,
}
impl L1CodecBuilder {
    /// The 5' and 3' primers flanking every oligo
    #[must_use]
    pub fn primers(mut self, p5: LongOligo, p3: LongOligo) -> Self {
        self.p5 = Some(p5);
        self.p3 = Some(p3);
        self
    }

    #[must_use]
    pub fn data_len(mut self, data_len: usize) -> Self {
        self.data_len = Some(data_len);
        self
    }

    /// Bytes of metadata; the address space is `2^(8·len − 2)`
    #[must_use]
    pub fn metadata_len(mut self, metadata_len: usize) -> Self {
        self.metadata_len = Some(metadata_len);
        self
    }

    #[must_use]
    pub fn checksum(mut self, checksum: MetadataChecksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    #[must_use]
    pub fn primer_errors(mut self, primer_errors: usize) -> Self {
        self.primer_errors = Some(primer_errors);
        self
    }

    /// Deadline of a single oligo decode
    #[must_use]
    pub fn max_time(mut self, max_time: Duration) -> Self {
        self.max_time = Some(max_time);
        self
    }

    pub fn build(self, l0: Arc<L0Codec>) -> Result<L1Codec> {
        let (Some(p5), Some(p3)) = (self.p5, self.p3) else {
            return Err(ConfigError::MissingPrimers.into());
        };
        let plen = l0.prefix_len();
        for primer in [&p5, &p3] {
            if primer.len() < plen {
                return Err(ConfigError::PrimerTooShort {
                    len: primer.len(),
                    prefix_len: plen,
                }
                .into());
            }
        }
        let mdnum = self.metadata_len.unwrap_or(DEFAULT_METADATA_LEN);
        if !(1..=8).contains(&mdnum) {
            return Err(ConfigError::InvalidParameter {
                name: "metadata_len",
                reason: format!("{mdnum} is not in 1..=8"),
            }
            .into());
        }
        let dnum = self.data_len.unwrap_or(DEFAULT_DATA_LEN);
        if dnum == 0 {
            return Err(ConfigError::InvalidParameter {
                name: "data_len",
                reason: "must be positive".to_string(),
            }
            .into());
        }
        let bits = l0.bits();
        if bits == 0 {
            return Err(TableError::Empty.into());
        }
        let checksum = self.checksum.unwrap_or_default();
        let checker = Checker::new(checksum, mdnum)?;
        let prefix = ShortOligo::from_nts(&p5.as_slice()[p5.len() - plen..])?;
        let hwords = bits::words_for(mdnum + checksum.len(), bits);
        let nwords = bits::words_for(mdnum + checksum.len() + dnum, bits);

        Ok(L1Codec {
            l0,
            p5,
            p3,
            prefix,
            mdnum,
            dnum,
            checksum,
            checker,
            hwords,
            nwords,
            primer_errors: self.primer_errors.unwrap_or(PRIMER_ERRORS),
            max_time: self.max_time.unwrap_or(DEFAULT_MAX_TIME),
        })
    }
}

/// An immutable frame codec over a shared [`L0Codec`]
pub struct L1Codec {
    l0: Arc<L0Codec>,
    p5: LongOligo,
    p3: LongOligo,
    /// Last nucleotides of the 5' primer, the prefix of the first word
    prefix: ShortOligo,
    mdnum: usize,
    dnum: usize,
    checksum: MetadataChecksum,
    checker: Checker,
    /// Words covering metadata and checksum
    hwords: usize,
    nwords: usize,
    primer_errors: usize,
    max_time: Duration,
}
impl L1Codec {
    #[must_use]
    pub fn l0(&self) -> &Arc<L0Codec> {
        &self.l0
    }

    #[must_use]
    pub fn data_len(&self) -> usize {
        self.dnum
    }

    #[must_use]
    pub fn metadata_len(&self) -> usize {
        self.mdnum
    }

    #[must_use]
    pub fn checksum(&self) -> MetadataChecksum {
        self.checksum
    }

    /// Exclusive upper bound of frame addresses
    #[must_use]
    pub fn max_addr(&self) -> u64 {
        1 << (8 * self.mdnum - 2)
    }

    /// Number of L0 words in a frame body
    #[must_use]
    pub fn word_count(&self) -> usize {
        self.nwords
    }

    /// Number of nucleotides between the primers
    #[must_use]
    pub fn body_len(&self) -> usize {
        self.nwords * self.l0.oligo_len()
    }

    /// Total length of an encoded oligo
    #[must_use]
    pub fn oligo_len(&self) -> usize {
        self.p5.len() + self.body_len() + self.p3.len()
    }

    #[must_use]
    pub fn primers(&self) -> (&LongOligo, &LongOligo) {
        (&self.p5, &self.p3)
    }

    #[must_use]
    pub fn max_time(&self) -> Duration {
        self.max_time
    }

    /// Encodes a frame into an oligo
    ///
    /// # Errors
    ///
    /// Fails if the data length differs from [`data_len`](Self::data_len), or the
    /// address is not below [`max_addr`](Self::max_addr).
    pub fn encode(&self, frame: &Frame) -> Result<LongOligo> {
        if frame.data.len() != self.dnum {
            return Err(ConfigError::RowSizeMismatch {
                frame: self.dnum,
                row: frame.data.len(),
            }
            .into());
        }
        let max = self.max_addr();
        if frame.addr >= max {
            return Err(TableError::ValueOutOfRange {
                value: frame.addr,
                max,
            }
            .into());
        }
        let metadata =
            frame.addr | u64::from(frame.erasure) * max | u64::from(frame.scrambled) * 2 * max;
        let md = &metadata.to_le_bytes()[..self.mdnum];

        let mut bytes = Vec::with_capacity(self.mdnum + self.checksum.len() + self.dnum);
        bytes.extend_from_slice(md);
        bytes.extend(self.checker.compute(md)?);
        if frame.scrambled {
            bytes.extend(frame.data.iter().map(|b| !b));
        } else {
            bytes.extend_from_slice(&frame.data);
        }

        let mut oligo = LongOligo::with_capacity(self.oligo_len());
        oligo.append(&self.p5);
        let mut prefix = self.prefix;
        for value in bits::pack(&bytes, self.l0.bits(), self.nwords) {
            let word = self.l0.encode(&prefix, value)?;
            oligo.append(&word);
            prefix = follow(prefix, &word, self.l0.prefix_len())?;
        }
        oligo.append(&self.p3);
        Ok(oligo)
    }
}

/// The prefix of the word after `word`, given the prefix `word` was encoded after
pub(crate) fn follow(
    prefix: ShortOligo,
    word: &ShortOligo,
    plen: usize,
) -> std::result::Result<ShortOligo, SequenceError> {
    if word.len() >= plen {
        return Ok(word.tail(plen));
    }
    let mut joined = prefix;
    joined.append(word)?;
    Ok(joined.tail(plen))
}

#[cfg(test)]
mod testing {
    use std::sync::OnceLock;

    use super::*;
    use crate::criteria::Homopolymer;
    use crate::error::{DecodeError, Error};
    use crate::l0::L0Builder;
    use crate::model::inject_errors;
    use crate::oligo::{distance, Nt};
    use anyhow::Result;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    const P5: &str = "CGACATCTCGATGGCAGCAT";
    const P3: &str = "CAGTGAGCTGGCAACTTCCA";

    fn l0() -> Arc<L0Codec> {
        static CODEC: OnceLock<Arc<L0Codec>> = OnceLock::new();
        CODEC
            .get_or_init(|| {
                Arc::new(
                    L0Builder::default()
                        .oligo_len(8)
                        .min_dist(3)
                        .prefix_len(2)
                        .criterion(Arc::new(Homopolymer::H4))
                        .build()
                        .expect("fixture table builds"),
                )
            })
            .clone()
    }

    fn codec(checksum: MetadataChecksum) -> Result<L1Codec> {
        Ok(L1CodecBuilder::default()
            .primers(P5.parse()?, P3.parse()?)
            .data_len(5)
            .metadata_len(2)
            .checksum(checksum)
            .build(l0())?)
    }

    #[test]
    fn test_follow() -> Result<()> {
        let prefix: ShortOligo = "ACGT".parse()?;
        let long: ShortOligo = "TTTTTGCA".parse()?;
        assert_eq!(follow(prefix, &long, 4)?.to_string(), "TGCA");
        let short: ShortOligo = "CC".parse()?;
        assert_eq!(follow(prefix, &short, 4)?.to_string(), "GTCC");
        Ok(())
    }

    #[test]
    fn test_layout() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        assert_eq!(codec.max_addr(), 1 << 14);
        let bits = codec.l0().bits();
        assert_eq!(codec.word_count(), (8 * 9usize).div_ceil(bits));
        let oligo = codec.encode(&Frame::new(42, vec![0xAB, 1, 2, 3, 4]))?;
        assert_eq!(oligo.len(), codec.oligo_len());
        assert_eq!(oligo.len(), 40 + codec.word_count() * 8);
        assert_eq!(oligo.slice(0, 20).to_string(), P5);
        assert_eq!(oligo.slice(oligo.len() - 20, 0).to_string(), P3);
        Ok(())
    }

    #[test]
    fn test_identity() -> Result<()> {
        for checksum in [
            MetadataChecksum::Crc8,
            MetadataChecksum::Crc16,
            MetadataChecksum::ReedSolomon { rsnum: 2 },
        ] {
            let codec = codec(checksum)?;
            for (addr, erasure, scrambled) in
                [(0, false, false), (42, false, false), (7, true, false), (16_383, true, true)]
            {
                let frame = Frame::new(addr, vec![0xAB, 0x00, 0xFF, 0x10, 0x7E])
                    .erasure(erasure)
                    .scrambled(scrambled);
                let oligo = codec.encode(&frame)?;
                let decoded = codec.decode(oligo.as_slice(), 0);
                assert_eq!(decoded, Ok(frame), "{checksum:?}");
            }
        }
        Ok(())
    }

    #[test]
    fn test_scrambled_body_differs() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let data = vec![0u8; 5];
        let plain = codec.encode(&Frame::new(3, data.clone()))?;
        let scrambled = codec.encode(&Frame::new(3, data).scrambled(true))?;
        assert_ne!(plain, scrambled);
        assert!(codec.decode(scrambled.as_slice(), 0)?.scrambled);
        Ok(())
    }

    #[test]
    fn test_encode_rejects() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        assert!(matches!(
            codec.encode(&Frame::new(1, vec![0; 4])),
            Err(Error::ConfigError(ConfigError::RowSizeMismatch { .. }))
        ));
        assert!(matches!(
            codec.encode(&Frame::new(1 << 14, vec![0; 5])),
            Err(Error::TableError(TableError::ValueOutOfRange { .. }))
        ));
        Ok(())
    }

    #[test]
    fn test_builder_rejects() -> Result<()> {
        assert!(matches!(
            L1CodecBuilder::default().build(l0()),
            Err(Error::ConfigError(ConfigError::MissingPrimers))
        ));
        assert!(matches!(
            L1CodecBuilder::default()
                .primers("A".parse()?, P3.parse()?)
                .build(l0()),
            Err(Error::ConfigError(ConfigError::PrimerTooShort { .. }))
        ));
        assert!(L1CodecBuilder::default()
            .primers(P5.parse()?, P3.parse()?)
            .metadata_len(9)
            .build(l0())
            .is_err());
        Ok(())
    }

    #[test]
    fn test_primer_mismatch() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let oligo = codec.encode(&Frame::new(5, vec![1, 2, 3, 4, 5]))?;
        let mut garbled = oligo.as_slice().to_vec();
        garbled[..20].fill(Nt::A);
        assert_eq!(codec.decode(&garbled, 0), Err(DecodeError::PrimerMismatch));
        Ok(())
    }

    #[test]
    fn test_primer_errors_tolerated() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let frame = Frame::new(1234, vec![9, 8, 7, 6, 5]);
        let oligo = codec.encode(&frame)?;
        let mut seq = oligo.as_slice().to_vec();
        // four substitutions in each primer, away from the body junctions
        let n = seq.len();
        for pos in [1, 5, 9, 13, n - 3, n - 7, n - 11, n - 15] {
            seq[pos] = Nt::from_bits(seq[pos] as u64 + 2);
        }
        assert_eq!(codec.decode(&seq, 0), Ok(frame.clone()));

        // indels inside the primers shift the body but leave it intact
        let mut seq = oligo.as_slice().to_vec();
        seq.remove(n - 10);
        seq.insert(3, Nt::A);
        seq.remove(8);
        seq.insert(12, Nt::G);
        assert_eq!(codec.decode(&seq, 0), Ok(frame));
        Ok(())
    }

    #[test]
    fn test_body_substitution() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let frame = Frame::new(77, vec![0x11, 0x22, 0x33, 0x44, 0x55]);
        let oligo = codec.encode(&frame)?;
        for pos in (20..20 + codec.body_len()).step_by(5) {
            let mut seq = oligo.as_slice().to_vec();
            seq[pos] = Nt::from_bits(seq[pos] as u64 + 1);
            assert_eq!(codec.decode(&seq, 0), Ok(frame.clone()), "substitution at {pos}");
        }
        Ok(())
    }

    #[test]
    fn test_body_indel_with_difficulty() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let frame = Frame::new(300, vec![0xDE, 0xAD, 0xBE, 0xEF, 0x01]);
        let oligo = codec.encode(&frame)?;

        // a deletion inside the first header word
        let mut seq = oligo.as_slice().to_vec();
        seq.remove(23);
        assert_eq!(codec.decode(&seq, 1)?.addr, 300);

        // an insertion inside the second header word
        let mut seq = oligo.as_slice().to_vec();
        seq.insert(30, Nt::C);
        assert_eq!(codec.decode(&seq, 1)?.addr, 300);
        Ok(())
    }

    #[test]
    fn test_random_noise_majority() -> Result<()> {
        let codec = codec(MetadataChecksum::Crc16)?;
        let mut rng = SmallRng::seed_from_u64(17);
        let trials = 100;
        let mut ok = 0;
        for _ in 0..trials {
            let addr = rng.random_range(0..codec.max_addr());
            let data: Vec<u8> = (0..5).map(|_| rng.random()).collect();
            let frame = Frame::new(addr, data);
            let oligo = codec.encode(&frame)?;
            let noisy = inject_errors(oligo.as_slice(), 2, &mut rng);
            assert!(distance(&noisy, oligo.as_slice()) <= 2);
            if let Ok(decoded) = codec.decode(&noisy, 1) {
                if decoded.addr == addr {
                    ok += 1;
                }
            }
        }
        assert!(ok * 100 >= trials * 75, "{ok} of {trials} decoded");
        Ok(())
    }
}
