//! Oligo list input and output
//!
//! Two input formats are understood, both optionally compressed:
//!
//! * **lines**: one sequence per line; anything after the first comma or
//!   whitespace is ignored, as are empty lines and lines starting with `#`.
//! * **FASTQ**: the second field of the id line tags the read as forward
//!   (`1...`) or reverse (`2...`); reverse reads are reverse complemented.
//!   Untagged reads are emitted in both orientations.

use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;

use rand::{rngs::SmallRng, SeedableRng};
use seq_io::fastq::{Reader, Record};

use crate::error::Result;
use crate::oligo::LongOligo;
use crate::policy::{Policy, RNG_SEED};

/// Input format of an oligo list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Format {
    #[default]
    Lines,
    Fastq,
}

/// Strand of a sequencing read relative to the encoded oligo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Forward,
    Reverse,
    Unknown,
}
impl Orientation {
    /// Orientation from a FASTQ id line (`name 1:N:0:...`)
    #[must_use]
    pub fn from_id(id: &[u8]) -> Self {
        let tag = id
            .split(u8::is_ascii_whitespace)
            .filter(|field| !field.is_empty())
            .nth(1);
        match tag.and_then(|t| t.first()) {
            Some(b'1') => Self::Forward,
            Some(b'2') => Self::Reverse,
            _ => Self::Unknown,
        }
    }
}

/// Reads a line-oriented oligo list
pub fn read_lines<R: BufRead>(reader: R, policy: Policy) -> Result<Vec<LongOligo>> {
    let mut rng = SmallRng::seed_from_u64(RNG_SEED);
    let mut oligos = Vec::new();
    let mut obuf = LongOligo::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let sequence = line
            .split(|c: char| c == ',' || c.is_whitespace())
            .next()
            .unwrap_or_default();
        if policy.handle(sequence.as_bytes(), &mut obuf, &mut rng)? {
            oligos.push(std::mem::take(&mut obuf));
        }
    }
    Ok(oligos)
}

/// Reads FASTQ records, orienting them by their id tags
pub fn read_fastq<R: Read>(reader: R, policy: Policy) -> Result<Vec<LongOligo>> {
    let mut rng = SmallRng::seed_from_u64(RNG_SEED);
    let mut oligos = Vec::new();
    let mut obuf = LongOligo::new();
    let mut reader = Reader::new(reader);
    while let Some(record) = reader.next() {
        let record = record?;
        if !policy.handle(record.seq(), &mut obuf, &mut rng)? {
            continue;
        }
        match Orientation::from_id(record.head()) {
            Orientation::Forward => oligos.push(std::mem::take(&mut obuf)),
            Orientation::Reverse => oligos.push(obuf.reverse_complement()),
            Orientation::Unknown => {
                oligos.push(obuf.reverse_complement());
                oligos.push(std::mem::take(&mut obuf));
            }
        }
    }
    Ok(oligos)
}

/// Reads an oligo list from a (possibly compressed) file
pub fn read_path<P: AsRef<Path>>(path: P, format: Format, policy: Policy) -> Result<Vec<LongOligo>> {
    let (handle, _comp) = niffler::from_path(path)?;
    match format {
        Format::Lines => read_lines(BufReader::new(handle), policy),
        Format::Fastq => read_fastq(handle, policy),
    }
}

/// Writes one oligo per line
pub fn write_lines<W: Write>(writer: &mut W, oligos: &[LongOligo]) -> Result<()> {
    for oligo in oligos {
        writeln!(writer, "{oligo}")?;
    }
    Ok(())
}

#[cfg(test)]
mod testing {
    use std::io::Cursor;

    use super::*;
    use anyhow::Result;

    #[test]
    fn test_orientation_tags() {
        assert_eq!(Orientation::from_id(b"read1 1:N:0:ACGT"), Orientation::Forward);
        assert_eq!(Orientation::from_id(b"read1  2:N:0"), Orientation::Reverse);
        assert_eq!(Orientation::from_id(b"read1"), Orientation::Unknown);
        assert_eq!(Orientation::from_id(b"read1 x"), Orientation::Unknown);
    }

    #[test]
    fn test_read_lines() -> Result<()> {
        let input = "# pool\nACGT,12,extra\n\n  ttga 7\nACNA\n";
        let oligos = read_lines(Cursor::new(input), Policy::IgnoreSequence)?;
        let text: Vec<String> = oligos.iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["ACGT", "TTGA"]);
        Ok(())
    }

    #[test]
    fn test_read_fastq() -> Result<()> {
        let input = "@a 1:N\nAACG\n+\nIIII\n@b 2:N\nAACG\n+\nIIII\n@c\nAACG\n+\nIIII\n";
        let oligos = read_fastq(Cursor::new(input), Policy::default())?;
        let text: Vec<String> = oligos.iter().map(ToString::to_string).collect();
        assert_eq!(text, vec!["AACG", "CGTT", "CGTT", "AACG"]);
        Ok(())
    }

    #[test]
    fn test_write_and_read_path() -> Result<()> {
        let oligos: Vec<LongOligo> = vec!["ACGT".parse()?, "GGCA".parse()?];
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("pool.txt");
        let mut file = std::fs::File::create(&path)?;
        write_lines(&mut file, &oligos)?;
        drop(file);
        assert_eq!(read_path(&path, Format::Lines, Policy::default())?, oligos);
        Ok(())
    }
}
