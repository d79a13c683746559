//! Header module for L0 table files
//!
//! A table file consists of a fixed 16-byte file header followed by one record
//! per prefix, in lexicographic order of the prefix. Every record starts with a
//! fixed 28-byte record header followed by `count` little-endian `u64` entries,
//! the packed words for values `0..count`.
//!
//! ## File header (16 bytes)
//!
//! | Offset | Size | Name      | Description                                         | Type   |
//! | ------ | ---- | --------- | --------------------------------------------------- | ------ |
//! | 0      | 8    | magic     | `'L','0'` in the high 16 bits, criterion id below   | uint64 |
//! | 8      | 4    | olen      | Oligo (word) length                                  | uint32 |
//! | 12     | 4    | plen      | Prefix length                                        | uint32 |
//!
//! ## Record header (28 bytes)
//!
//! | Offset | Size | Name      | Description                        | Type   |
//! | ------ | ---- | --------- | ---------------------------------- | ------ |
//! | 0      | 4    | bits      | Value bits carried by a word       | uint32 |
//! | 4      | 4    | plen      | Prefix length                      | uint32 |
//! | 8      | 8    | prefix    | Packed prefix                      | uint64 |
//! | 16     | 8    | maxval    | Value ceiling of this prefix       | uint64 |
//! | 24     | 4    | count     | Number of entries that follow      | uint32 |

use std::io::{Read, Write};

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Result, TableError};

/// `'L','0'` in the high 16 bits of the first header word
pub const MAGIC: u64 = 0x4C30 << 48;

/// Mask selecting the criterion identifier in the first header word
pub const CRITERION_MASK: u64 = (1 << 48) - 1;

/// Size of the file header in bytes
pub const SIZE_HEADER: usize = 16;

/// Size of a per-prefix record header in bytes
pub const SIZE_RECORD_HEADER: usize = 28;

/// Header of an L0 table file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableHeader {
    /// Identifier of the criterion the table was built with (48 bits)
    pub criterion: u64,

    /// Word length
    pub olen: u32,

    /// Prefix length
    pub plen: u32,
}
impl TableHeader {
    #[must_use]
    pub fn new(criterion: u64, olen: u32, plen: u32) -> Self {
        Self {
            criterion: criterion & CRITERION_MASK,
            olen,
            plen,
        }
    }

    /// Parses a header from a fixed-size byte array
    ///
    /// # Errors
    ///
    /// Returns an error if the magic number is incorrect
    pub fn from_bytes(buffer: &[u8; SIZE_HEADER]) -> Result<Self> {
        let word = LittleEndian::read_u64(&buffer[0..8]);
        if word & !CRITERION_MASK != MAGIC {
            return Err(TableError::InvalidMagicNumber(word).into());
        }
        Ok(Self {
            criterion: word & CRITERION_MASK,
            olen: LittleEndian::read_u32(&buffer[8..12]),
            plen: LittleEndian::read_u32(&buffer[12..16]),
        })
    }

    /// Parses a header from the beginning of an arbitrarily sized buffer
    pub fn from_buffer(buffer: &[u8]) -> Result<Self> {
        let bytes: &[u8; SIZE_HEADER] = buffer
            .get(..SIZE_HEADER)
            .and_then(|b| b.try_into().ok())
            .ok_or(TableError::Truncated(buffer.len()))?;
        Self::from_bytes(bytes)
    }

    /// Writes the header to a writer
    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_HEADER];
        LittleEndian::write_u64(&mut buffer[0..8], MAGIC | self.criterion);
        LittleEndian::write_u32(&mut buffer[8..12], self.olen);
        LittleEndian::write_u32(&mut buffer[12..16], self.plen);
        writer.write_all(&buffer)?;
        Ok(())
    }

    /// Reads a header from a reader
    pub fn from_reader<R: Read>(reader: &mut R) -> Result<Self> {
        let mut buffer = [0u8; SIZE_HEADER];
        reader.read_exact(&mut buffer)?;
        Self::from_bytes(&buffer)
    }
}

/// Header of a per-prefix record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub bits: u32,
    pub plen: u32,
    pub prefix: u64,
    pub maxval: u64,
    pub count: u32,
}
impl RecordHeader {
    #[must_use]
    pub fn from_bytes(buffer: &[u8; SIZE_RECORD_HEADER]) -> Self {
        Self {
            bits: LittleEndian::read_u32(&buffer[0..4]),
            plen: LittleEndian::read_u32(&buffer[4..8]),
            prefix: LittleEndian::read_u64(&buffer[8..16]),
            maxval: LittleEndian::read_u64(&buffer[16..24]),
            count: LittleEndian::read_u32(&buffer[24..28]),
        }
    }

    pub fn write_bytes<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut buffer = [0u8; SIZE_RECORD_HEADER];
        LittleEndian::write_u32(&mut buffer[0..4], self.bits);
        LittleEndian::write_u32(&mut buffer[4..8], self.plen);
        LittleEndian::write_u64(&mut buffer[8..16], self.prefix);
        LittleEndian::write_u64(&mut buffer[16..24], self.maxval);
        LittleEndian::write_u32(&mut buffer[24..28], self.count);
        writer.write_all(&buffer)?;
        Ok(())
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::criteria::criterion_id;
    use crate::Error;

    #[test]
    fn test_header_layout() -> anyhow::Result<()> {
        let header = TableHeader::new(criterion_id("h4g2"), 17, 4);
        let mut buf = Vec::new();
        header.write_bytes(&mut buf)?;
        assert_eq!(buf.len(), SIZE_HEADER);
        // little-endian: magic bytes land at the top of the first word
        assert_eq!(&buf[6..8], &[b'0', b'L']);
        assert_eq!(&buf[0..4], &[b'2', b'g', b'4', b'h']);
        assert_eq!(TableHeader::from_buffer(&buf)?, header);
        Ok(())
    }

    #[test]
    fn test_bad_magic() {
        let buf = [0u8; SIZE_HEADER];
        match TableHeader::from_bytes(&buf) {
            Err(Error::TableError(TableError::InvalidMagicNumber(0))) => {}
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_truncated() {
        assert!(TableHeader::from_buffer(&[0u8; 7]).is_err());
    }

    #[test]
    fn test_record_header() -> anyhow::Result<()> {
        let rec = RecordHeader {
            bits: 13,
            plen: 4,
            prefix: 0xAB,
            maxval: 8192,
            count: 8192,
        };
        let mut buf = Vec::new();
        rec.write_bytes(&mut buf)?;
        let bytes: [u8; SIZE_RECORD_HEADER] = buf.as_slice().try_into()?;
        assert_eq!(RecordHeader::from_bytes(&bytes), rec);
        Ok(())
    }
}
