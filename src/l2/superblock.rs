//! Super-blocks and the layout of the pool byte stream
//!
//! A payload is stored as
//!
//! ```text
//! FileSB | chunk 0 | ChunkSB 0 | ... | chunk n-1 | ChunkSB n-1 | FileSB
//! ```
//!
//! where every super-block is [`SIZE_SUPERBLOCK`] bytes: a little-endian size,
//! the SHA-1 of the bytes it describes, and a CRC-64 over the first 28 bytes.
//! In compat mode the stream is the payload followed by its little-endian size.

use byteorder::{ByteOrder, LittleEndian};
use crc::{Crc, CRC_64_XZ};
use rand::{rngs::SmallRng, RngCore, SeedableRng};
use sha1::{Digest, Sha1};

const CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_XZ);

/// Size of a super-block in bytes
pub const SIZE_SUPERBLOCK: usize = 36;

/// Payload bytes per chunk
pub const CHUNK_SIZE: usize = 512 * 1024;

/// Size of the trailing length word in compat mode
pub const SIZE_COMPAT_FOOTER: usize = 8;

/// Bytes covered by the super-block CRC
const SIZE_CRC_COVERED: usize = 28;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// Length of the described payload
    pub size: u64,
    /// SHA-1 of the described payload
    pub sha1: [u8; 20],
}
impl SuperBlock {
    /// Describes `payload`
    #[must_use]
    pub fn describe(payload: &[u8]) -> Self {
        Self {
            size: payload.len() as u64,
            sha1: sha1_of(payload),
        }
    }

    #[must_use]
    pub fn to_bytes(&self) -> [u8; SIZE_SUPERBLOCK] {
        let mut buffer = [0u8; SIZE_SUPERBLOCK];
        LittleEndian::write_u64(&mut buffer[0..8], self.size);
        buffer[8..28].copy_from_slice(&self.sha1);
        let crc = CRC64.checksum(&buffer[..SIZE_CRC_COVERED]);
        LittleEndian::write_u64(&mut buffer[28..36], crc);
        buffer
    }

    /// Parses a super-block, returning `None` when the CRC does not match
    #[must_use]
    pub fn from_bytes(buffer: &[u8]) -> Option<Self> {
        let buffer = buffer.get(..SIZE_SUPERBLOCK)?;
        let crc = LittleEndian::read_u64(&buffer[28..36]);
        if CRC64.checksum(&buffer[..SIZE_CRC_COVERED]) != crc {
            return None;
        }
        let mut sha1 = [0u8; 20];
        sha1.copy_from_slice(&buffer[8..28]);
        Some(Self {
            size: LittleEndian::read_u64(&buffer[0..8]),
            sha1,
        })
    }
}

pub(crate) fn sha1_of(bytes: &[u8]) -> [u8; 20] {
    Sha1::digest(bytes).into()
}

/// Number of chunks a payload of `size` bytes is split into
#[must_use]
pub fn chunk_count(size: u64) -> usize {
    (size as usize).div_ceil(CHUNK_SIZE)
}

/// Stream offset and length of chunk `index` of a payload of `size` bytes
#[must_use]
pub fn chunk_span(size: u64, index: usize) -> (usize, usize) {
    let start = index * CHUNK_SIZE;
    let len = (size as usize).saturating_sub(start).min(CHUNK_SIZE);
    (SIZE_SUPERBLOCK + index * (CHUNK_SIZE + SIZE_SUPERBLOCK), len)
}

/// Length of the super-block framed stream of a payload of `size` bytes
#[must_use]
pub fn stream_len(size: u64) -> usize {
    size as usize + SIZE_SUPERBLOCK * (chunk_count(size) + 2)
}

/// XORs `bytes` with the pseudo-random stream seeded by the payload length
pub(crate) fn randomize(bytes: &mut [u8], seed: u64) {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut key = vec![0u8; bytes.len()];
    rng.fill_bytes(&mut key);
    bytes.iter_mut().zip(key).for_each(|(b, k)| *b ^= k);
}

/// Lays out `data` as a pool byte stream (unpadded)
pub(crate) fn build_stream(data: &[u8], randomized: bool, compat: bool) -> Vec<u8> {
    let mut payload = data.to_vec();
    if randomized {
        randomize(&mut payload, data.len() as u64);
    }
    if compat {
        payload.extend_from_slice(&(data.len() as u64).to_le_bytes());
        return payload;
    }

    let header = SuperBlock::describe(&payload).to_bytes();
    let mut stream = Vec::with_capacity(stream_len(data.len() as u64));
    stream.extend_from_slice(&header);
    for chunk in payload.chunks(CHUNK_SIZE) {
        stream.extend_from_slice(chunk);
        stream.extend_from_slice(&SuperBlock::describe(chunk).to_bytes());
    }
    stream.extend_from_slice(&header);
    stream
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_superblock_layout() {
        let sb = SuperBlock::describe(b"hello");
        let bytes = sb.to_bytes();
        assert_eq!(LittleEndian::read_u64(&bytes[..8]), 5);
        assert_eq!(SuperBlock::from_bytes(&bytes), Some(sb));
        assert_eq!(
            hex(&sb.sha1),
            "aaf4c61ddcc5e8a2dabede0f3b482cd9aea9434d"
        );
    }

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    #[test]
    fn test_corrupt_superblock() {
        let mut bytes = SuperBlock::describe(b"hello").to_bytes();
        bytes[3] ^= 1;
        assert_eq!(SuperBlock::from_bytes(&bytes), None);
        assert_eq!(SuperBlock::from_bytes(&[0u8; SIZE_SUPERBLOCK]), None);
        assert_eq!(SuperBlock::from_bytes(&bytes[..20]), None);
    }

    #[test]
    fn test_stream_layout() {
        let data: Vec<u8> = (0..CHUNK_SIZE + 100).map(|i| (i % 251) as u8).collect();
        let stream = build_stream(&data, false, false);
        let size = data.len() as u64;
        assert_eq!(chunk_count(size), 2);
        assert_eq!(stream.len(), stream_len(size));

        let header = SuperBlock::from_bytes(&stream).map(|sb| sb.size);
        let footer = SuperBlock::from_bytes(&stream[stream.len() - SIZE_SUPERBLOCK..]);
        assert_eq!(header, Some(size));
        assert_eq!(footer.map(|sb| sb.sha1), Some(sha1_of(&data)));

        let (offset, len) = chunk_span(size, 1);
        assert_eq!(len, 100);
        assert_eq!(&stream[offset..offset + len], &data[CHUNK_SIZE..]);
        let chunk_sb = SuperBlock::from_bytes(&stream[offset + len..]);
        assert_eq!(chunk_sb, Some(SuperBlock::describe(&data[CHUNK_SIZE..])));
    }

    #[test]
    fn test_empty_payload() {
        let stream = build_stream(&[], false, false);
        assert_eq!(stream.len(), 2 * SIZE_SUPERBLOCK);
        assert_eq!(stream_len(0), 2 * SIZE_SUPERBLOCK);
    }

    #[test]
    fn test_randomize_and_compat() {
        let data = vec![0u8; 64];
        let stream = build_stream(&data, true, true);
        assert_eq!(stream.len(), 64 + SIZE_COMPAT_FOOTER);
        assert_ne!(&stream[..64], &data[..]);
        assert_eq!(LittleEndian::read_u64(&stream[64..]), 64);

        let mut payload = stream[..64].to_vec();
        randomize(&mut payload, 64);
        assert_eq!(payload, data);
    }
}
