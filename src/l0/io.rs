use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{ByteOrder, LittleEndian};
use memmap2::Mmap;
use tracing::info;

use super::header::{RecordHeader, TableHeader, SIZE_HEADER, SIZE_RECORD_HEADER};
use super::{value_bits, L0Builder, L0Codec, PrefixTable};
use crate::criteria::CriteriaRegistry;
use crate::error::{ConfigError, Result, TableError};
use crate::oligo::{ShortOligo, MAX_SHORT_LEN};

impl L0Codec {
    /// Serializes the encoding tables
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        TableHeader::new(self.criterion.id(), self.olen as u32, self.plen as u32)
            .write_bytes(writer)?;
        let mut buffer = [0u8; 8];
        for table in &self.tables {
            let count = table.words.len() as u64;
            RecordHeader {
                bits: value_bits(count) as u32,
                plen: self.plen as u32,
                prefix: table.prefix.value(),
                maxval: count,
                count: count as u32,
            }
            .write_bytes(writer)?;
            for word in &table.words {
                LittleEndian::write_u64(&mut buffer, word.value());
                writer.write_all(&buffer)?;
            }
        }
        Ok(())
    }

    /// Writes the table file to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        self.write(&mut writer)?;
        writer.flush()?;
        Ok(())
    }

    /// Loads a table file with the default error model, resolving its criterion in `registry`
    pub fn from_path<P: AsRef<Path>>(path: P, registry: &CriteriaRegistry) -> Result<Self> {
        L0Builder::default().load_path(path, registry)
    }

    /// Loads a table file held in memory
    pub fn from_bytes(bytes: &[u8], registry: &CriteriaRegistry) -> Result<Self> {
        L0Builder::default().load_bytes(bytes, registry)
    }
}

impl L0Builder {
    /// Memory-maps and loads a table file
    ///
    /// The builder's error model and probability floor are used for the
    /// decoding tables; construction parameters are taken from the file.
    pub fn load_path<P: AsRef<Path>>(self, path: P, registry: &CriteriaRegistry) -> Result<L0Codec> {
        let file = File::open(path)?;

        // Safety: the table file is only read while the map is alive
        let mmap = unsafe { Mmap::map(&file)? };
        self.load_bytes(&mmap, registry)
    }

    /// Loads a table file from a byte buffer
    ///
    /// # Errors
    ///
    /// Fails on a bad magic number, a criterion that disagrees with the
    /// builder's or is not registered, and truncated or inconsistent records.
    pub fn load_bytes(self, bytes: &[u8], registry: &CriteriaRegistry) -> Result<L0Codec> {
        let header = TableHeader::from_buffer(bytes)?;
        let criterion = match self.configured_criterion() {
            Some(criterion) if criterion.id() != header.criterion => {
                return Err(TableError::CriterionMismatch {
                    expected: criterion.id(),
                    found: header.criterion,
                }
                .into())
            }
            Some(criterion) => criterion.clone(),
            None => registry.by_id(header.criterion)?,
        };
        let olen = header.olen as usize;
        let plen = header.plen as usize;
        if olen == 0 || olen > MAX_SHORT_LEN || plen > MAX_SHORT_LEN / 2 {
            return Err(ConfigError::InvalidParameter {
                name: "table header",
                reason: format!("unsupported oligo length {olen} or prefix length {plen}"),
            }
            .into());
        }

        let prefixes = 1usize << (2 * plen);
        let needed = prefixes
            .checked_mul(SIZE_RECORD_HEADER)
            .and_then(|len| len.checked_add(SIZE_HEADER));
        if needed.map_or(true, |needed| bytes.len() < needed) {
            return Err(TableError::Truncated(bytes.len()).into());
        }

        let mut pos = SIZE_HEADER;
        let mut records = Vec::with_capacity(prefixes);
        for expected in 0..prefixes as u64 {
            let record: &[u8; SIZE_RECORD_HEADER] = bytes
                .get(pos..pos + SIZE_RECORD_HEADER)
                .and_then(|b| b.try_into().ok())
                .ok_or(TableError::Truncated(pos))?;
            let record = RecordHeader::from_bytes(record);
            if record.prefix != expected || record.plen != header.plen {
                return Err(TableError::InconsistentRecord {
                    prefix: record.prefix,
                }
                .into());
            }
            pos += SIZE_RECORD_HEADER;

            let size = record.count as usize * 8;
            let body = bytes
                .get(pos..pos + size)
                .ok_or(TableError::Truncated(pos))?;
            pos += size;
            let words = body
                .chunks_exact(8)
                .map(|chunk| ShortOligo::from_value(olen, LittleEndian::read_u64(chunk)))
                .collect::<std::result::Result<Vec<_>, _>>()?;
            let ceiling = record.maxval.min(u64::from(record.count));
            records.push((ShortOligo::from_value(plen, expected)?, words, ceiling));
        }

        let maxval = records
            .iter()
            .map(|(_, _, ceiling)| *ceiling)
            .filter(|&ceiling| ceiling > 0)
            .min()
            .ok_or(TableError::Empty)?;
        let tables = records
            .into_iter()
            .map(|(prefix, mut words, _)| {
                words.truncate(maxval as usize);
                PrefixTable::new(prefix, words)
            })
            .collect::<Result<Vec<_>>>()?;
        info!(
            criterion = criterion.name(),
            olen,
            plen,
            maxval,
            "L0 tables loaded"
        );

        Ok(L0Codec {
            model: self.resolved_model(),
            minerr: self.min_err_value(),
            criterion,
            olen,
            plen,
            mindist: None,
            maxval,
            tables,
        })
    }
}

#[cfg(test)]
mod testing {
    use std::sync::Arc;

    use super::*;
    use crate::criteria::{Criterion, Homopolymer};
    use crate::error::Error;
    use crate::oligo::Oligo;
    use anyhow::Result;

    fn small() -> Result<L0Codec> {
        Ok(L0Builder::default()
            .oligo_len(6)
            .min_dist(2)
            .prefix_len(1)
            .criterion(Arc::new(Homopolymer::H4G1))
            .build()?)
    }

    #[test]
    fn test_save_and_load() -> Result<()> {
        let codec = small()?;
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("table.l0");
        codec.save(&path)?;

        let registry = CriteriaRegistry::with_builtins();
        let loaded = L0Codec::from_path(&path, &registry)?;
        assert_eq!(loaded.oligo_len(), 6);
        assert_eq!(loaded.prefix_len(), 1);
        assert_eq!(loaded.max_val(), codec.max_val());
        assert_eq!(loaded.min_dist(), None);
        assert_eq!(loaded.criterion().name(), "h4g1");
        for value in 0..4 {
            let prefix = ShortOligo::from_value(1, value)?;
            assert_eq!(loaded.words(&prefix)?, codec.words(&prefix)?);
            let word = loaded.encode(&prefix, 5)?;
            let top = loaded.decode_top(&prefix, &word.to_nts())?;
            assert_eq!(top.map(|v| v.value), Some(5));
        }
        Ok(())
    }

    #[test]
    fn test_criterion_mismatch() -> Result<()> {
        let codec = small()?;
        let mut bytes = Vec::new();
        codec.write(&mut bytes)?;
        let registry = CriteriaRegistry::with_builtins();
        let result = L0Builder::default()
            .criterion(Arc::new(Homopolymer::H4G2))
            .load_bytes(&bytes, &registry);
        match result {
            Err(Error::TableError(TableError::CriterionMismatch { expected, found })) => {
                assert_eq!(expected, Homopolymer::H4G2.id());
                assert_eq!(found, Homopolymer::H4G1.id());
            }
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("mismatched criterion was accepted"),
        }
        Ok(())
    }

    #[test]
    fn test_unknown_criterion() -> Result<()> {
        let codec = small()?;
        let mut bytes = Vec::new();
        codec.write(&mut bytes)?;
        let result = L0Codec::from_bytes(&bytes, &CriteriaRegistry::new());
        assert!(matches!(
            result,
            Err(Error::TableError(TableError::UnknownCriterion(_)))
        ));
        Ok(())
    }

    #[test]
    fn test_truncated_file() -> Result<()> {
        let codec = small()?;
        let mut bytes = Vec::new();
        codec.write(&mut bytes)?;
        bytes.truncate(bytes.len() - 3);
        let result = L0Codec::from_bytes(&bytes, &CriteriaRegistry::with_builtins());
        assert!(matches!(result, Err(Error::TableError(TableError::Truncated(_)))));
        Ok(())
    }

    #[test]
    fn test_header_claims_more_records_than_present() -> Result<()> {
        let mut bytes = Vec::new();
        TableHeader::new(Homopolymer::H4.id(), 17, 15).write_bytes(&mut bytes)?;
        bytes.extend_from_slice(&[0; 64]);
        let result = L0Codec::from_bytes(&bytes, &CriteriaRegistry::with_builtins());
        assert!(matches!(
            result,
            Err(Error::TableError(TableError::Truncated(pos))) if pos == bytes.len()
        ));
        Ok(())
    }

    #[test]
    fn test_empty_record_is_no_table() -> Result<()> {
        let codec = small()?;
        let mut bytes = Vec::new();
        TableHeader::new(codec.criterion().id(), 6, 1).write_bytes(&mut bytes)?;
        for prefix in 0..4u64 {
            let words = if prefix == 2 {
                Vec::new()
            } else {
                codec.words(&ShortOligo::from_value(1, prefix)?)?.to_vec()
            };
            RecordHeader {
                bits: value_bits(words.len() as u64) as u32,
                plen: 1,
                prefix,
                maxval: words.len() as u64,
                count: words.len() as u32,
            }
            .write_bytes(&mut bytes)?;
            for word in words {
                bytes.extend_from_slice(&word.value().to_le_bytes());
            }
        }
        let loaded = L0Codec::from_bytes(&bytes, &CriteriaRegistry::with_builtins())?;
        assert_eq!(loaded.max_val(), codec.max_val());
        let empty = ShortOligo::from_value(1, 2)?;
        assert!(matches!(
            loaded.encode(&empty, 0),
            Err(Error::TableError(TableError::NoTable(_)))
        ));
        assert!(loaded.encode(&ShortOligo::from_value(1, 3)?, 0).is_ok());
        Ok(())
    }
}
