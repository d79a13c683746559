//! # L2: erasure-coded oligo pools
//!
//! A byte payload is framed by super-blocks, padded to whole erasure groups,
//! and protected group by group with Reed-Solomon parity rows. Every row
//! becomes one L1 frame, so a group of `dseqnum + rseqnum` oligos survives
//! the loss or corruption of up to `rseqnum` of them.
//!
//! Decoding runs L1 over a worker pool and feeds the frames into a
//! [`SparseFile`], which reconstructs the groups and reports the payload as
//! [`Extent`]s labelled with how well each byte could be checked.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use oligostore::l0::L0Builder;
//! # use oligostore::l1::L1CodecBuilder;
//! # use oligostore::l2::{L2Codec, PoolConfig};
//! # fn main() -> oligostore::Result<()> {
//! let l0 = Arc::new(L0Builder::default().build()?);
//! let l1 = Arc::new(
//!     L1CodecBuilder::default()
//!         .primers("CGACATCTCGATGGCAGCAT".parse()?, "CAGTGAGCTGGCAACTTCCA".parse()?)
//!         .build(l0)?,
//! );
//! let pool = L2Codec::new(l1, PoolConfig::builder().dseqnum(3).rseqnum(2).build()?)?;
//!
//! let oligos = pool.encode(0, b"hello world")?;
//! let decoded = pool.decode(&oligos)?;
//! assert_eq!(decoded.to_bytes(), b"hello world");
//! # Ok(())
//! # }
//! ```

mod config;
mod decoder;
mod extent;
mod file;
mod group;
mod superblock;

use std::sync::Arc;
use std::thread;

use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::debug;

pub use config::{
    PoolConfig, PoolConfigBuilder, DEFAULT_BLOCK_NUM, DEFAULT_BLOCK_SIZE, DEFAULT_DSEQNUM,
    DEFAULT_MAX_DIFFICULTY, DEFAULT_RSEQNUM,
};
pub use decoder::{DecodeStats, PoolDecode};
pub use extent::{merge, summarize, Extent, ExtentKind};
pub use file::{SparseFile, MAX_RECOVERY_ITERATIONS};
pub use superblock::{SuperBlock, CHUNK_SIZE, SIZE_SUPERBLOCK};

use crate::error::{ConfigError, PoolError, Result, TableError};
use crate::l1::{Frame, L1Codec};
use crate::oligo::LongOligo;
use crate::parallel::resolve_threads;

/// An erasure-coded pool codec over a shared [`L1Codec`]
pub struct L2Codec {
    l1: Arc<L1Codec>,
    config: PoolConfig,
    rs: ReedSolomon,
}
impl L2Codec {
    /// Binds a pool geometry to a frame codec
    ///
    /// # Errors
    ///
    /// Fails when a frame does not carry exactly one row.
    pub fn new(l1: Arc<L1Codec>, config: PoolConfig) -> Result<Self> {
        if l1.data_len() != config.row_size() {
            return Err(ConfigError::RowSizeMismatch {
                frame: l1.data_len(),
                row: config.row_size(),
            }
            .into());
        }
        Ok(Self {
            rs: ReedSolomon::new(config.dseqnum, config.rseqnum)?,
            l1,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    #[must_use]
    pub fn l1(&self) -> &Arc<L1Codec> {
        &self.l1
    }

    /// Number of erasure groups a payload of `len` bytes occupies
    #[must_use]
    pub fn group_count(&self, len: usize) -> usize {
        let stream = if self.config.compat {
            len + superblock::SIZE_COMPAT_FOOTER
        } else {
            superblock::stream_len(len as u64)
        };
        stream.div_ceil(self.config.group_size())
    }

    /// Encodes `data` into oligos, the first group at address `start`
    ///
    /// Oligos come out group by group, data rows before parity rows. A payload
    /// of `n` groups uses the addresses `start..start + n * dseqnum`.
    ///
    /// # Errors
    ///
    /// Fails when the addresses do not fit the frame metadata.
    pub fn encode(&self, start: u64, data: &[u8]) -> Result<Vec<LongOligo>> {
        let config = &self.config;
        let mut stream = superblock::build_stream(data, config.randomize, config.compat);
        stream.resize(stream.len().next_multiple_of(config.group_size()), 0);
        let groups = stream.len() / config.group_size();

        let end = start + (groups * config.dseqnum) as u64;
        if end > self.l1.max_addr() {
            return Err(TableError::ValueOutOfRange {
                value: end - 1,
                max: self.l1.max_addr(),
            }
            .into());
        }

        let per_thread = groups.div_ceil(resolve_threads(config.threads)).max(1);
        let shares: Vec<Result<Vec<LongOligo>>> = thread::scope(|scope| {
            let handles: Vec<_> = stream
                .chunks(per_thread * config.group_size())
                .enumerate()
                .map(|(tid, share)| {
                    scope.spawn(move || -> Result<Vec<LongOligo>> {
                        let mut oligos =
                            Vec::with_capacity(share.len() / config.group_size() * config.rows());
                        for (i, group) in share.chunks(config.group_size()).enumerate() {
                            let index = tid * per_thread + i;
                            oligos.extend(self.encode_group(start, index, group)?);
                        }
                        Ok(oligos)
                    })
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().map_err(|_| PoolError::WorkerPanicked)?)
                .collect()
        });

        let mut oligos = Vec::with_capacity(groups * config.rows());
        for share in shares {
            oligos.extend(share?);
        }
        debug!(
            bytes = data.len(),
            groups,
            oligos = oligos.len(),
            "Payload encoded"
        );
        Ok(oligos)
    }

    fn encode_group(&self, start: u64, index: usize, data: &[u8]) -> Result<Vec<LongOligo>> {
        let dseqnum = self.config.dseqnum;
        let base = start + (index * dseqnum) as u64;
        group::encode_rows(&self.rs, &self.config, data)?
            .into_iter()
            .enumerate()
            .map(|(r, row)| {
                let scrambled = self.config.scramble && row.windows(2).all(|w| w[0] == w[1]);
                let frame = if r < dseqnum {
                    Frame::new(base + r as u64, row)
                } else {
                    Frame::new(base + (r - dseqnum) as u64, row).erasure(true)
                };
                self.l1.encode(&frame.scrambled(scrambled))
            })
            .collect()
    }
}
