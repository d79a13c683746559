//! The sparse file assembler
//!
//! Frames arrive in any order from the decoder workers and are filed into
//! their erasure groups. A background recoverer reconstructs groups that
//! changed whenever it is woken with [`SparseFile::sync`]; [`SparseFile::close`]
//! stops it, recovers what is left, locates the super-blocks and cuts the
//! payload into [`Extent`]s.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use byteorder::{ByteOrder, LittleEndian};
use parking_lot::{Mutex, RwLock};
use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::{debug, warn};

use super::extent::{merge, split, Extent, ExtentKind};
use super::group::{Added, Choice, ErasureGroup, Recovered};
use super::superblock::{
    chunk_count, chunk_span, randomize, sha1_of, stream_len, SuperBlock, CHUNK_SIZE,
    SIZE_COMPAT_FOOTER, SIZE_SUPERBLOCK,
};
use super::PoolConfig;
use crate::error::{DecodeError, PoolError, Result};
use crate::l1::Frame;

/// Upper bound on SHA-1 replay attempts per chunk
pub const MAX_RECOVERY_ITERATIONS: usize = 65_536;

/// Above this many choices in a chunk each one is narrowed to a single option
const MAX_EXPANDED_CHOICES: usize = 32;

/// Chunk-relative `(offset, value)` replacements applied together
type Patch<'a> = Vec<(usize, &'a [u8])>;

enum Signal {
    TryNow,
    Stop,
}

struct Shared {
    config: PoolConfig,
    rs: ReedSolomon,
    start: u64,
    groups: RwLock<Vec<Arc<Mutex<ErasureGroup>>>>,
    /// Frames stored
    total: AtomicU64,
    /// One past the highest stored address
    addr_end: AtomicU64,
}
impl Shared {
    fn group(&self, index: usize) -> Arc<Mutex<ErasureGroup>> {
        if let Some(group) = self.groups.read().get(index) {
            return group.clone();
        }
        let mut groups = self.groups.write();
        while groups.len() <= index {
            groups.push(Arc::new(Mutex::new(ErasureGroup::new(&self.config))));
        }
        groups[index].clone()
    }

    fn snapshot(&self) -> Vec<Arc<Mutex<ErasureGroup>>> {
        self.groups.read().clone()
    }

    /// Reconstructs every group that changed since its last recovery
    fn recover_dirty(&self) -> usize {
        let mut count = 0;
        for group in self.snapshot() {
            let mut group = group.lock();
            if group.is_dirty() {
                group.recover(&self.rs, &self.config);
                count += 1;
            }
        }
        count
    }

    fn recover_all(&self) -> Vec<Arc<Recovered>> {
        self.snapshot()
            .iter()
            .map(|group| group.lock().recover(&self.rs, &self.config))
            .collect()
    }
}

/// Concurrent assembler of decoded frames
///
/// [`add`](Self::add) may be called from any number of threads.
pub struct SparseFile {
    shared: Arc<Shared>,
    signal: SyncSender<Signal>,
    recoverer: Option<JoinHandle<()>>,
}
impl SparseFile {
    /// Creates an empty file whose first group starts at address `start`
    pub fn new(config: PoolConfig, start: u64) -> Result<Self> {
        let shared = Arc::new(Shared {
            rs: ReedSolomon::new(config.dseqnum, config.rseqnum)?,
            config,
            start,
            groups: RwLock::new(Vec::new()),
            total: AtomicU64::new(0),
            addr_end: AtomicU64::new(0),
        });
        let (signal, rx) = sync_channel(1);
        let worker = shared.clone();
        let recoverer = thread::Builder::new()
            .name("recoverer".to_string())
            .spawn(move || recover_loop(&worker, &rx))?;
        Ok(Self {
            shared,
            signal,
            recoverer: Some(recoverer),
        })
    }

    /// Files a decoded frame into its erasure group
    ///
    /// Returns whether the frame was stored. Parity frames beyond the group's
    /// parity rows, frames of the wrong size, and frames for groups that
    /// already recovered completely are dropped.
    pub fn add(&self, frame: &Frame) -> Result<bool> {
        let config = &self.shared.config;
        let rel = frame
            .addr
            .checked_sub(self.shared.start)
            .ok_or(DecodeError::AddressOutOfRange(frame.addr))?;
        let dseqnum = config.dseqnum as u64;
        let (index, offset) = ((rel / dseqnum) as usize, (rel % dseqnum) as usize);
        let row = if !frame.erasure {
            offset
        } else if offset < config.rseqnum {
            config.dseqnum + offset
        } else {
            return Ok(false);
        };
        if frame.data.len() != config.row_size() {
            return Ok(false);
        }

        let group = self.shared.group(index);
        let stored = group.lock().add(row, &frame.data) == Added::Stored;
        if stored {
            self.shared.total.fetch_add(1, Ordering::Relaxed);
            self.shared
                .addr_end
                .fetch_max(frame.addr + 1, Ordering::Relaxed);
        }
        Ok(stored)
    }

    /// Wakes the background recoverer; does nothing if a wake-up is pending
    pub fn sync(&self) {
        let _ = self.signal.try_send(Signal::TryNow);
    }

    /// Number of frames stored
    #[must_use]
    pub fn total(&self) -> u64 {
        self.shared.total.load(Ordering::Relaxed)
    }

    /// Highest stored address
    #[must_use]
    pub fn max_addr(&self) -> Option<u64> {
        self.shared.addr_end.load(Ordering::Relaxed).checked_sub(1)
    }

    #[must_use]
    pub fn group_count(&self) -> usize {
        self.shared.groups.read().len()
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(handle) = self.recoverer.take() {
            // the recoverer only exits on Stop or a closed channel
            let _ = self.signal.send(Signal::Stop);
            handle.join().map_err(|_| PoolError::WorkerPanicked)?;
        }
        Ok(())
    }

    /// Stops the recoverer and returns the payload as extents
    ///
    /// Chunks whose SHA-1 is known but cannot be matched keep their
    /// Reed-Solomon classification when `force` is set; otherwise their
    /// bytes that are not Reed-Solomon verified are reported as holes.
    pub fn close(mut self, force: bool) -> Result<Vec<Extent>> {
        self.stop()?;
        let stream = Stream::assemble(&self.shared.config, &self.shared.recover_all());
        let config = self.shared.config;
        let extents = if config.compat {
            stream.compat_payload(&config)
        } else {
            stream.payload(&config, force)
        };
        Ok(merge(extents))
    }
}
impl Drop for SparseFile {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

fn recover_loop(shared: &Shared, rx: &Receiver<Signal>) {
    while let Ok(Signal::TryNow) = rx.recv() {
        let count = shared.recover_dirty();
        debug!(groups = count, "Recoverer pass");
    }
}

/// The recovered pool byte stream, with one kind per byte
struct Stream {
    bytes: Vec<u8>,
    kinds: Vec<ExtentKind>,
    /// Alternatives with cells translated to stream offsets
    choices: Vec<Choice>,
}
impl Stream {
    fn assemble(config: &PoolConfig, groups: &[Arc<Recovered>]) -> Self {
        let size = config.block_size;
        let mut stream = Self {
            bytes: Vec::with_capacity(groups.len() * config.group_size()),
            kinds: Vec::with_capacity(groups.len() * config.group_size()),
            choices: Vec::new(),
        };
        for group in groups {
            let base = stream.bytes.len();
            stream.bytes.extend_from_slice(&group.data);
            for &kind in &group.kinds {
                stream.kinds.extend(std::iter::repeat(kind).take(size));
            }
            stream.choices.extend(group.choices.iter().map(|options| {
                options
                    .iter()
                    .map(|patch| {
                        patch
                            .iter()
                            .map(|(cell, value)| (base + cell * size, value.clone()))
                            .collect()
                    })
                    .collect::<Choice>()
            }));
        }
        stream
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Start of the region before `end` that can hold a footer of `footer` bytes
    fn tail_start(config: &PoolConfig, end: usize, footer: usize) -> usize {
        end.saturating_sub(2 * config.group_size() + footer)
    }

    /// End of the last group holding a verified cell, when groups follow it
    ///
    /// A stray frame with a high address moves the end of the stream away
    /// from the footer; the last verified group does not move.
    fn verified_end(&self, config: &PoolConfig) -> Option<usize> {
        let last = self.kinds.iter().rposition(|&k| k == ExtentKind::Verified)?;
        let end = (last / config.group_size() + 1) * config.group_size();
        (end < self.len()).then_some(end)
    }

    fn header(&self) -> Option<SuperBlock> {
        SuperBlock::from_bytes(&self.bytes)
    }

    /// Scans the last groups for a footer consistent with its own position
    fn footer(&self, config: &PoolConfig) -> Option<SuperBlock> {
        let scan = |end: usize| {
            let last = end.checked_sub(SIZE_SUPERBLOCK)?;
            (Self::tail_start(config, end, SIZE_SUPERBLOCK)..=last)
                .rev()
                .filter_map(|pos| Some((pos, SuperBlock::from_bytes(&self.bytes[pos..])?)))
                .find(|(pos, sb)| stream_len(sb.size) == pos + SIZE_SUPERBLOCK)
                .map(|(_, sb)| sb)
        };
        scan(self.len()).or_else(|| scan(self.verified_end(config)?))
    }

    fn payload(&self, config: &PoolConfig, force: bool) -> Vec<Extent> {
        let Some(file) = self.header().or_else(|| self.footer(config)) else {
            warn!("No valid super-block found; the payload is a best guess");
            return self.unframed();
        };

        let size = file.size as usize;
        let chunks = chunk_count(file.size);
        let mut payload = vec![0u8; size];
        let mut kinds = vec![ExtentKind::Hole; size];
        let mut verified = 0;
        for index in 0..chunks {
            let (offset, len) = chunk_span(file.size, index);
            let dst = index * CHUNK_SIZE;
            let avail = self.len().saturating_sub(offset).min(len);
            if avail == 0 {
                debug!(chunk = index, "Chunk not received");
                continue;
            }
            payload[dst..dst + avail].copy_from_slice(&self.bytes[offset..offset + avail]);
            kinds[dst..dst + avail].copy_from_slice(&self.kinds[offset..offset + avail]);

            let digest = self
                .bytes
                .get(offset + len..)
                .and_then(SuperBlock::from_bytes)
                .filter(|sb| sb.size == len as u64)
                .map(|sb| sb.sha1)
                .or((chunks == 1).then_some(file.sha1));
            let Some(digest) = digest else {
                debug!(chunk = index, "Chunk super-block lost");
                continue;
            };

            let choices = self.choices_within(offset, offset + avail);
            let chunk = &mut payload[dst..dst + len];
            let chunk_kinds = &mut kinds[dst..dst + len];
            if replay(chunk, &choices, &digest) {
                chunk_kinds.fill(ExtentKind::Verified);
                verified += 1;
                continue;
            }
            warn!(chunk = index, "Chunk SHA-1 mismatch");
            if !force {
                for (byte, kind) in chunk.iter_mut().zip(chunk_kinds.iter_mut()) {
                    if *kind != ExtentKind::Verified {
                        *byte = 0;
                        *kind = ExtentKind::Hole;
                    }
                }
            }
        }
        debug!(size, chunks, verified, "Super-blocks recovered");

        if config.randomize {
            derandomize(&mut payload, &kinds, file.size);
        }
        split(0, &payload, &kinds)
    }

    /// Choices restricted to the cells inside `start..end`, relative to `start`
    fn choices_within(&self, start: usize, end: usize) -> Vec<Vec<Patch<'_>>> {
        self.choices
            .iter()
            .filter_map(|options| {
                let options: Vec<Patch<'_>> = options
                    .iter()
                    .map(|patch| {
                        patch
                            .iter()
                            .filter(|(pos, value)| *pos >= start && pos + value.len() <= end)
                            .map(|(pos, value)| (pos - start, value.as_slice()))
                            .collect::<Patch<'_>>()
                    })
                    .filter(|patch| !patch.is_empty())
                    .collect();
                (!options.is_empty()).then_some(options)
            })
            .collect()
    }

    /// The payload guessed from the fixed chunk stride when no super-block survived
    fn unframed(&self) -> Vec<Extent> {
        let mut extents = Vec::new();
        let (mut pos, mut offset) = (SIZE_SUPERBLOCK, 0u64);
        while pos < self.len() {
            let end = (pos + CHUNK_SIZE).min(self.len());
            let kinds: Vec<ExtentKind> = self.kinds[pos..end]
                .iter()
                .map(|&kind| match kind {
                    ExtentKind::Hole => ExtentKind::Hole,
                    _ => ExtentKind::BestGuess,
                })
                .collect();
            extents.extend(split(offset, &self.bytes[pos..end], &kinds));
            offset += (end - pos) as u64;
            pos = end + SIZE_SUPERBLOCK;
        }
        extents
    }

    /// Compat streams end with the payload length at the position it names
    fn compat_payload(&self, config: &PoolConfig) -> Vec<Extent> {
        let scan = |end: usize| {
            let last = end.checked_sub(SIZE_COMPAT_FOOTER)?;
            (Self::tail_start(config, end, SIZE_COMPAT_FOOTER)..=last)
                .rev()
                .find(|&pos| {
                    let footer = pos..pos + SIZE_COMPAT_FOOTER;
                    self.kinds[footer.clone()]
                        .iter()
                        .all(|&k| k != ExtentKind::Hole)
                        && LittleEndian::read_u64(&self.bytes[footer]) == pos as u64
                })
        };
        let size = scan(self.len()).or_else(|| scan(self.verified_end(config)?));
        let Some(size) = size else {
            warn!("No compat footer found; the payload is a best guess");
            let kinds: Vec<ExtentKind> = self
                .kinds
                .iter()
                .map(|&kind| kind.min(ExtentKind::BestGuess))
                .collect();
            return split(0, &self.bytes, &kinds);
        };
        let mut payload = self.bytes[..size].to_vec();
        if config.randomize {
            derandomize(&mut payload, &self.kinds[..size], size as u64);
        }
        split(0, &payload, &self.kinds[..size])
    }
}

/// Removes the randomization, keeping holes zero
fn derandomize(payload: &mut [u8], kinds: &[ExtentKind], size: u64) {
    randomize(payload, size);
    for (byte, &kind) in payload.iter_mut().zip(kinds) {
        if kind == ExtentKind::Hole {
            *byte = 0;
        }
    }
}

/// Searches the combinations of alternative values for one matching `digest`
///
/// Each choice contributes its chosen value or one of its options. Choices
/// are taken in order while the number of combinations stays within
/// [`MAX_RECOVERY_ITERATIONS`]; past [`MAX_EXPANDED_CHOICES`] choices only
/// the first option of each is tried. On success `bytes` holds the matching
/// combination; otherwise it is left unchanged.
fn replay(bytes: &mut [u8], choices: &[Vec<Patch<'_>>], digest: &[u8; 20]) -> bool {
    if sha1_of(bytes) == *digest {
        return true;
    }
    let width = if choices.len() > MAX_EXPANDED_CHOICES {
        1
    } else {
        usize::MAX
    };
    let mut selected: Vec<&[Patch<'_>]> = Vec::new();
    let mut combinations = 1usize;
    for options in choices {
        let options = &options[..options.len().min(width)];
        let radix = options.len() + 1;
        if options.is_empty() || combinations * radix > MAX_RECOVERY_ITERATIONS {
            continue;
        }
        combinations *= radix;
        selected.push(options);
    }
    if selected.is_empty() {
        return false;
    }

    let originals: Vec<(usize, Vec<u8>)> = selected
        .iter()
        .flat_map(|options| options.iter().flatten())
        .map(|&(pos, value)| (pos, bytes[pos..pos + value.len()].to_vec()))
        .collect();
    let apply = |bytes: &mut [u8], digits: &[usize]| {
        for (pos, original) in &originals {
            bytes[*pos..*pos + original.len()].copy_from_slice(original);
        }
        for (options, &digit) in selected.iter().zip(digits) {
            let Some(patch) = digit.checked_sub(1).map(|k| &options[k]) else {
                continue;
            };
            for &(pos, value) in patch {
                bytes[pos..pos + value.len()].copy_from_slice(value);
            }
        }
    };

    // odometer over the options, the first choice turning fastest
    let mut digits = vec![0usize; selected.len()];
    while let Some(i) = digits
        .iter()
        .zip(&selected)
        .position(|(&digit, options)| digit < options.len())
    {
        digits[..i].fill(0);
        digits[i] += 1;
        apply(bytes, &digits);
        if sha1_of(bytes) == *digest {
            debug!(choices = selected.len(), combinations, "SHA-1 replay matched");
            return true;
        }
    }
    apply(bytes, &vec![0; selected.len()]);
    false
}
