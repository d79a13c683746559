//! Erasure groups: diagonal Reed-Solomon codewords over the rows of a group
//!
//! Codeword `j` of a group takes from row `r` the block in column
//! `(j - r) mod C`, so the blocks of one row are spread over all codewords and
//! parity rows do not concentrate on a single column.

use std::sync::Arc;

use reed_solomon_erasure::galois_8::ReedSolomon;
use tracing::debug;

use super::extent::ExtentKind;
use super::PoolConfig;
use crate::utils::first_subset;

/// Distinct values kept per row
const MAX_CANDIDATES: usize = 4;

/// Row-erasure sets tried when a group holds more rows than it can verify
const MAX_RECONSTRUCTIONS: usize = 64;

/// `(cell, value)` replacements applied together
pub(crate) type Patch = Vec<(usize, Vec<u8>)>;

/// Mutually exclusive patches, any one of which may replace the chosen values
pub(crate) type Choice = Vec<Patch>;

/// Column of row `row` that feeds codeword `codeword`
pub(crate) fn column(codeword: usize, row: usize, columns: usize) -> usize {
    (codeword + columns - row % columns) % columns
}

/// Computes the parity rows of one group
///
/// `data` holds `dseqnum` rows; the result holds all `dseqnum + rseqnum` rows.
pub(crate) fn encode_rows(
    rs: &ReedSolomon,
    config: &PoolConfig,
    data: &[u8],
) -> Result<Vec<Vec<u8>>, reed_solomon_erasure::Error> {
    let (columns, size) = (config.block_num, config.block_size);
    let mut rows: Vec<Vec<u8>> = data.chunks(config.row_size()).map(<[u8]>::to_vec).collect();
    rows.resize(config.rows(), vec![0; config.row_size()]);

    for codeword in 0..columns {
        let mut shards: Vec<Vec<u8>> = rows
            .iter()
            .enumerate()
            .map(|(r, row)| {
                let c = column(codeword, r, columns);
                row[c * size..(c + 1) * size].to_vec()
            })
            .collect();
        rs.encode(&mut shards)?;
        for (r, shard) in shards.iter().enumerate().skip(config.dseqnum) {
            let c = column(codeword, r, columns);
            rows[r][c * size..(c + 1) * size].copy_from_slice(shard);
        }
    }
    Ok(rows)
}

/// Distinct values received for one row, with how often each was seen
#[derive(Debug, Default, Clone)]
struct Row {
    candidates: Vec<(Vec<u8>, u32)>,
}
impl Row {
    fn add(&mut self, data: &[u8]) {
        if let Some(entry) = self.candidates.iter_mut().find(|(c, _)| c == data) {
            entry.1 += 1;
        } else if self.candidates.len() < MAX_CANDIDATES {
            self.candidates.push((data.to_vec(), 1));
        }
    }

    /// Most frequent value, the earliest on ties
    fn primary(&self) -> Option<&[u8]> {
        let mut best: Option<&(Vec<u8>, u32)> = None;
        for candidate in &self.candidates {
            if best.map_or(true, |(_, count)| *count < candidate.1) {
                best = Some(candidate);
            }
        }
        best.map(|(data, _)| data.as_slice())
    }

    fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// Outcome of adding a frame to a group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Added {
    Stored,
    /// The group already recovered completely; the frame was dropped
    Ignored,
}

/// The recovered data rows of a group
#[derive(Debug, Clone)]
pub(crate) struct Recovered {
    /// `dseqnum` rows, row-major
    pub data: Vec<u8>,
    /// One kind per cell, row-major
    pub kinds: Vec<ExtentKind>,
    /// Values other than the chosen ones, for SHA-1 replay
    pub choices: Vec<Choice>,
}
impl Recovered {
    fn holes(config: &PoolConfig) -> Self {
        Self {
            data: vec![0; config.group_size()],
            kinds: vec![ExtentKind::Hole; config.dseqnum * config.block_num],
            choices: Vec::new(),
        }
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.kinds.iter().all(|&k| k == ExtentKind::Verified)
    }
}

/// Received rows of one erasure group
#[derive(Debug)]
pub(crate) struct ErasureGroup {
    rows: Vec<Row>,
    recovered: Option<Arc<Recovered>>,
    dirty: bool,
    complete: bool,
}
impl ErasureGroup {
    pub(crate) fn new(config: &PoolConfig) -> Self {
        Self {
            rows: vec![Row::default(); config.rows()],
            recovered: None,
            dirty: false,
            complete: false,
        }
    }

    /// Records a row value; `row` counts parity rows after the data rows
    pub(crate) fn add(&mut self, row: usize, data: &[u8]) -> Added {
        if self.complete {
            return Added::Ignored;
        }
        match self.rows.get_mut(row) {
            Some(slot) => {
                slot.add(data);
                self.dirty = true;
                Added::Stored
            }
            None => Added::Ignored,
        }
    }

    pub(crate) fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Number of rows with at least one value
    pub(crate) fn received(&self) -> usize {
        self.rows.iter().filter(|r| !r.is_empty()).count()
    }

    /// Recovers the data rows, reusing the previous result when nothing changed
    pub(crate) fn recover(&mut self, rs: &ReedSolomon, config: &PoolConfig) -> Arc<Recovered> {
        if let (false, Some(recovered)) = (self.dirty, &self.recovered) {
            return recovered.clone();
        }
        let recovered = Arc::new(self.reconstruct(rs, config));
        self.complete = recovered.is_complete();
        self.dirty = false;
        self.recovered = Some(recovered.clone());
        recovered
    }

    fn reconstruct(&self, rs: &ReedSolomon, config: &PoolConfig) -> Recovered {
        let mut out = Recovered::holes(config);
        if self.rows.iter().all(Row::is_empty) {
            return out;
        }
        let (columns, size, d) = (config.block_num, config.block_size, config.dseqnum);
        let primaries: Vec<Option<&[u8]>> = self.rows.iter().map(Row::primary).collect();
        let shards = |codeword: usize| -> Vec<Option<Vec<u8>>> {
            primaries
                .iter()
                .enumerate()
                .map(|(r, row)| {
                    let c = column(codeword, r, columns);
                    row.map(|row| row[c * size..(c + 1) * size].to_vec())
                })
                .collect()
        };

        let mut verified = 0;
        let mut suspect = Vec::new();
        for codeword in 0..columns {
            let (full, kind) = recover_codeword(rs, d, shards(codeword));
            match kind {
                ExtentKind::Verified => verified += 1,
                ExtentKind::BestGuess => suspect.push(codeword),
                _ => {}
            }
            for (r, shard) in full.into_iter().enumerate().take(d) {
                let c = column(codeword, r, columns);
                let cell = r * columns + c;
                if let Some(shard) = shard {
                    out.kinds[cell] = kind;
                    out.data[cell * size..(cell + 1) * size].copy_from_slice(&shard);
                }
            }
        }

        let present: Vec<usize> = (0..primaries.len())
            .filter(|&r| primaries[r].is_some())
            .collect();
        if present.len() > d && !suspect.is_empty() {
            // every erasure of all but `d` rows reconstructs one candidate group
            let mut options: Choice = Vec::new();
            let mut tried = 0;
            let _: Option<()> = first_subset(&present, present.len() - d, |erased| {
                let mut patch = Patch::new();
                for &codeword in &suspect {
                    let Some(full) = reconstruct_without(rs, shards(codeword), erased) else {
                        continue;
                    };
                    for (r, shard) in full.into_iter().enumerate().take(d) {
                        let cell = r * columns + column(codeword, r, columns);
                        if shard != out.data[cell * size..(cell + 1) * size] {
                            patch.push((cell, shard));
                        }
                    }
                }
                if !patch.is_empty() && !options.contains(&patch) {
                    options.push(patch);
                }
                tried += 1;
                (tried >= MAX_RECONSTRUCTIONS).then_some(())
            });
            if !options.is_empty() {
                out.choices.push(options);
            }
        }

        for (r, row) in self.rows.iter().enumerate().take(d) {
            for c in 0..columns {
                let cell = r * columns + c;
                if out.kinds[cell] == ExtentKind::Verified {
                    continue;
                }
                let chosen = &out.data[cell * size..(cell + 1) * size];
                let mut options: Choice = Vec::new();
                for (candidate, _) in &row.candidates {
                    let value = &candidate[c * size..(c + 1) * size];
                    let patch = vec![(cell, value.to_vec())];
                    if value != chosen && !options.contains(&patch) {
                        options.push(patch);
                    }
                }
                if !options.is_empty() {
                    out.choices.push(options);
                }
            }
        }
        debug!(
            received = self.received(),
            verified,
            suspect = suspect.len(),
            codewords = columns,
            choices = out.choices.len(),
            "Erasure group reconstructed"
        );
        out
    }
}

/// Reconstructs a codeword with the `erased` shards dropped
fn reconstruct_without(
    rs: &ReedSolomon,
    mut shards: Vec<Option<Vec<u8>>>,
    erased: &[usize],
) -> Option<Vec<Vec<u8>>> {
    for &i in erased {
        shards[i] = None;
    }
    rs.reconstruct(&mut shards).ok()?;
    shards.into_iter().collect()
}

/// Recovers one diagonal codeword and classifies it
///
/// Returns every shard (present or reconstructed) and the codeword's kind.
/// Only erasures that leave more than `dseqnum` shards can be verified.
fn recover_codeword(
    rs: &ReedSolomon,
    dseqnum: usize,
    shards: Vec<Option<Vec<u8>>>,
) -> (Vec<Option<Vec<u8>>>, ExtentKind) {
    let present: Vec<usize> = (0..shards.len()).filter(|&i| shards[i].is_some()).collect();
    if present.len() < dseqnum {
        return (shards, ExtentKind::BestGuess);
    }
    let attempt = |erased: &[usize]| reconstruct_without(rs, shards.clone(), erased);

    if present.len() > dseqnum {
        let verified = (0..present.len() - dseqnum).find_map(|count| {
            first_subset(&present, count, |erased| {
                let full = attempt(erased)?;
                rs.verify(&full).ok()?.then_some(full)
            })
        });
        if let Some(full) = verified {
            return (full.into_iter().map(Some).collect(), ExtentKind::Verified);
        }
        let fallback = attempt(&present[dseqnum..]).map(|full| full.into_iter().map(Some).collect());
        return (fallback.unwrap_or(shards), ExtentKind::BestGuess);
    }

    match attempt(&[]) {
        Some(full) => (full.into_iter().map(Some).collect(), ExtentKind::Unverified),
        None => (shards, ExtentKind::BestGuess),
    }
}

#[cfg(test)]
mod testing {
    use super::*;
    use anyhow::Result;

    fn setup() -> Result<(PoolConfig, ReedSolomon, Vec<u8>, Vec<Vec<u8>>)> {
        let config = PoolConfig::default();
        let rs = ReedSolomon::new(config.dseqnum, config.rseqnum)?;
        let data: Vec<u8> = (0..config.group_size() as u8).map(|b| b.wrapping_mul(17)).collect();
        let rows = encode_rows(&rs, &config, &data)?;
        Ok((config, rs, data, rows))
    }

    fn group_with(config: &PoolConfig, rows: &[Vec<u8>], skip: &[usize]) -> ErasureGroup {
        let mut group = ErasureGroup::new(config);
        for (r, row) in rows.iter().enumerate() {
            if !skip.contains(&r) {
                assert_eq!(group.add(r, row), Added::Stored);
            }
        }
        group
    }

    #[test]
    fn test_diagonal_columns() {
        assert_eq!(column(0, 0, 5), 0);
        assert_eq!(column(0, 1, 5), 4);
        assert_eq!(column(2, 4, 5), 3);
        // each codeword takes one block of every row
        for r in 0..7 {
            let mut cols: Vec<usize> = (0..5).map(|j| column(j, r, 5)).collect();
            cols.sort_unstable();
            assert_eq!(cols, vec![0, 1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_encode_is_systematic() -> Result<()> {
        let (config, rs, data, rows) = setup()?;
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[..3].concat(), data);

        for j in 0..config.block_num {
            let shards: Vec<Vec<u8>> = rows
                .iter()
                .enumerate()
                .map(|(r, row)| vec![row[column(j, r, config.block_num)]])
                .collect();
            assert!(rs.verify(&shards)?);
        }
        Ok(())
    }

    #[test]
    fn test_all_rows_verified() -> Result<()> {
        let (config, rs, data, rows) = setup()?;
        let mut group = group_with(&config, &rows, &[]);
        let recovered = group.recover(&rs, &config);
        assert_eq!(recovered.data, data);
        assert!(recovered.is_complete());
        assert_eq!(group.add(0, &rows[0]), Added::Ignored);
        Ok(())
    }

    #[test]
    fn test_missing_rows() -> Result<()> {
        let (config, rs, data, rows) = setup()?;

        // one row lost: still redundancy left to verify
        let recovered = group_with(&config, &rows, &[1]).recover(&rs, &config);
        assert_eq!(recovered.data, data);
        assert!(recovered.is_complete());

        // two rows lost: exactly dseqnum shards
        let recovered = group_with(&config, &rows, &[0, 4]).recover(&rs, &config);
        assert_eq!(recovered.data, data);
        assert!(recovered.kinds.iter().all(|&k| k == ExtentKind::Unverified));

        // three rows lost: received cells are guesses, the rest holes
        let recovered = group_with(&config, &rows, &[0, 3, 4]).recover(&rs, &config);
        assert_eq!(&recovered.data[5..], &data[5..]);
        assert!(recovered.kinds[..5].iter().all(|&k| k == ExtentKind::Hole));
        assert!(recovered.kinds[5..].iter().all(|&k| k == ExtentKind::BestGuess));
        Ok(())
    }

    #[test]
    fn test_corrupt_row_is_outvoted() -> Result<()> {
        let (config, rs, data, mut rows) = setup()?;
        rows[2][3] ^= 0xFF;
        let recovered = group_with(&config, &rows, &[]).recover(&rs, &config);
        assert_eq!(recovered.data, data);
        assert!(recovered.is_complete());
        Ok(())
    }

    #[test]
    fn test_disagreeing_duplicates_keep_alternatives() -> Result<()> {
        let (config, rs, _, rows) = setup()?;
        let mut group = group_with(&config, &rows, &[1, 2, 3, 4]);
        let mut other = rows[0].clone();
        other[2] ^= 0x01;
        group.add(0, &other);
        let recovered = group.recover(&rs, &config);
        assert_eq!(&recovered.data[..5], &rows[0][..]);
        assert_eq!(recovered.choices, vec![vec![vec![(2, vec![rows[0][2] ^ 0x01])]]]);
        Ok(())
    }

    #[test]
    fn test_corrupt_rows_up_to_parity_count() -> Result<()> {
        let (config, rs, data, mut rows) = setup()?;
        // rows 0 and 1 both wrong in codeword 0: columns 0 and 4
        rows[0][0] ^= 0x5A;
        rows[1][4] ^= 0x5A;
        let recovered = group_with(&config, &rows, &[]).recover(&rs, &config);
        assert_eq!(recovered.kinds[0], ExtentKind::BestGuess);
        assert_eq!(recovered.kinds[9], ExtentKind::BestGuess);
        assert_eq!(recovered.kinds[1], ExtentKind::Verified);
        assert_eq!(recovered.choices.len(), 1);
        let truth = vec![(0, vec![data[0]]), (9, vec![data[9]])];
        assert!(recovered.choices[0].contains(&truth));
        assert!(recovered.choices[0].len() > 1);
        Ok(())
    }

    #[test]
    fn test_recover_is_cached() -> Result<()> {
        let (config, rs, _, rows) = setup()?;
        let mut group = group_with(&config, &rows, &[0, 1]);
        assert!(group.is_dirty());
        let first = group.recover(&rs, &config);
        assert!(!group.is_dirty());
        assert!(Arc::ptr_eq(&first, &group.recover(&rs, &config)));
        group.add(0, &rows[0]);
        assert!(!Arc::ptr_eq(&first, &group.recover(&rs, &config)));
        Ok(())
    }
}
