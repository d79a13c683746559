use std::ops::Range;
use std::sync::mpsc::{self, Sender};
use std::thread;

use tracing::{info, warn};

use super::extent::{summarize, Extent, ExtentKind};
use super::file::SparseFile;
use super::L2Codec;
use crate::error::{DecodeError, PoolError, Result};
use crate::l1::{Frame, L1Codec};
use crate::oligo::LongOligo;
use crate::parallel::{process_parallel_subset, ParallelProcessor};

type Decoded = (usize, std::result::Result<Frame, DecodeError>);

/// Per-oligo outcomes of a pool decode
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DecodeStats {
    /// Oligos submitted
    pub total: usize,
    /// Frames filed into the sparse file
    pub decoded: usize,
    /// Frames decoded but not stored (duplicates of completed groups, unused parity rows)
    pub dropped: usize,
    pub primer_mismatch: usize,
    /// Decode attempts repeated at a higher difficulty
    pub retried: usize,
    /// Oligos given up on
    pub failed: usize,
    /// Frames whose address lies outside the decode window
    pub out_of_window: usize,
}

/// The result of decoding a pool
#[derive(Debug, Clone)]
pub struct PoolDecode {
    pub extents: Vec<Extent>,
    pub stats: DecodeStats,
}
impl PoolDecode {
    /// Total bytes per extent kind
    #[must_use]
    pub fn summary(&self) -> [(ExtentKind, usize); 4] {
        summarize(&self.extents)
    }

    /// Whether the payload was recovered as one verified extent
    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.extents.iter().all(|e| e.kind == ExtentKind::Verified)
    }

    /// The best available payload bytes, holes zero-filled
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.extents.iter().map(Extent::end).max().unwrap_or(0);
        let mut bytes = vec![0u8; len as usize];
        for extent in &self.extents {
            bytes[extent.offset as usize..extent.end() as usize].copy_from_slice(&extent.data);
        }
        bytes
    }
}

/// Decodes oligos at one difficulty and sends the outcomes to the assembler
#[derive(Clone)]
struct FrameDecoder<'a> {
    codec: &'a L1Codec,
    difficulty: usize,
    tx: Sender<Decoded>,
}
impl ParallelProcessor for FrameDecoder<'_> {
    fn process_oligo(&mut self, index: usize, oligo: &LongOligo) -> Result<()> {
        let result = self.codec.decode(oligo.as_slice(), self.difficulty);
        self.tx
            .send((index, result))
            .map_err(|_| PoolError::Closed)?;
        Ok(())
    }
}

impl L2Codec {
    /// Decodes a pool encoded at address 0
    pub fn decode(&self, oligos: &[LongOligo]) -> Result<PoolDecode> {
        self.decode_window(oligos, 0..self.l1.max_addr())
    }

    /// Decodes the frames whose addresses fall in `window`
    ///
    /// The first group is expected at `window.start`. Oligos that fail with
    /// an unrecoverable header or a timeout are retried at increasing
    /// difficulty up to the configured maximum. Per-oligo failures only show
    /// up in the statistics; the payload is always returned as extents.
    pub fn decode_window(&self, oligos: &[LongOligo], window: Range<u64>) -> Result<PoolDecode> {
        let file = SparseFile::new(self.config, window.start)?;
        let max_difficulty = self.config.max_difficulty;
        let mut stats = DecodeStats {
            total: oligos.len(),
            ..DecodeStats::default()
        };

        let mut pending: Vec<usize> = (0..oligos.len()).collect();
        for difficulty in 0..=max_difficulty {
            if difficulty > 0 {
                stats.retried += pending.len();
            }
            let mut retry = Vec::new();
            self.decode_pass(oligos, &pending, difficulty, |index, result| {
                match result {
                    Ok(frame) if !window.contains(&frame.addr) => stats.out_of_window += 1,
                    Ok(frame) => {
                        if file.add(&frame)? {
                            stats.decoded += 1;
                        } else {
                            stats.dropped += 1;
                        }
                    }
                    Err(DecodeError::PrimerMismatch) => stats.primer_mismatch += 1,
                    Err(DecodeError::MetadataUnrecoverable | DecodeError::Timeout)
                        if difficulty < max_difficulty =>
                    {
                        retry.push(index);
                    }
                    Err(DecodeError::AddressOutOfRange(_)) => stats.out_of_window += 1,
                    Err(_) => stats.failed += 1,
                }
                Ok(())
            })?;
            file.sync();
            pending = retry;
            if pending.is_empty() {
                break;
            }
        }

        let extents = file.close(true)?;
        info!(
            total = stats.total,
            decoded = stats.decoded,
            dropped = stats.dropped,
            primer_mismatch = stats.primer_mismatch,
            retried = stats.retried,
            failed = stats.failed,
            out_of_window = stats.out_of_window,
            "Pool decoded"
        );
        let decode = PoolDecode { extents, stats };
        if !decode.is_verified() {
            let [verified, unverified, best_guess, hole] = decode.summary().map(|(_, bytes)| bytes);
            warn!(verified, unverified, best_guess, hole, "Payload not fully verified");
        }
        Ok(decode)
    }

    /// Runs one decode pass over `indices`, handing every outcome to `sink`
    /// on the calling thread as it arrives
    fn decode_pass(
        &self,
        oligos: &[LongOligo],
        indices: &[usize],
        difficulty: usize,
        mut sink: impl FnMut(usize, std::result::Result<Frame, DecodeError>) -> Result<()>,
    ) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        let decoder = FrameDecoder {
            codec: &self.l1,
            difficulty,
            tx,
        };
        let threads = self.config.threads;
        thread::scope(|scope| {
            let workers =
                scope.spawn(move || process_parallel_subset(oligos, indices, decoder, threads));
            for (index, result) in rx {
                sink(index, result)?;
            }
            workers.join().map_err(|_| PoolError::WorkerPanicked)?
        })
    }
}
