//! # l0
//!
//! The constrained codec: a mapping between small integers and short DNA words.
//!
//! For every prefix `p` of [`L0Codec::prefix_len`] nucleotides the codec holds
//! the list of words that may follow `p`. Value `v` encodes to the `v`-th word of
//! that list. Every word satisfies the codec's [`Criterion`] when appended to its
//! prefix, has a balanced GC content, and lies at least `min_dist` edits away
//! from every other word of the same prefix.
//!
//! Decoding a (possibly noisy) observation returns up to [`VARIANT_NUM`] ranked
//! [`Variant`]s. Observations of the right length are first looked up in a
//! decoding table built from the error model; anything else falls back to an
//! exact lookup and then to an edit-distance search over the prefix's words.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use oligostore::criteria::Homopolymer;
//! use oligostore::l0::L0Builder;
//! use oligostore::oligo::{Oligo, ShortOligo};
//! use oligostore::trie::SearchCtx;
//!
//! let codec = L0Builder::default()
//!     .oligo_len(10)
//!     .criterion(Arc::new(Homopolymer::H4))
//!     .build()
//!     .unwrap();
//! let prefix: ShortOligo = "ACGT".parse().unwrap();
//! let word = codec.encode(&prefix, 42).unwrap();
//! let variants = codec
//!     .decode(&prefix, &word.to_nts(), 1, &mut SearchCtx::unbounded())
//!     .unwrap();
//! assert_eq!(variants[0].value, 42);
//! ```

mod builder;
pub mod header;
mod io;

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

pub use builder::L0Builder;
pub use header::{RecordHeader, TableHeader};

use crate::criteria::Criterion;
use crate::error::{Result, TableError};
use crate::model::ErrorModel;
use crate::oligo::{Nt, Oligo, ShortOligo};
use crate::trie::{SearchCtx, Trie};

/// Maximum number of variants returned by a decode
pub const VARIANT_NUM: usize = 8;

/// A candidate decoding of an observed word
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Variant {
    /// The decoded value
    pub value: u64,
    /// The canonical word of `value`
    pub word: ShortOligo,
    /// Likelihood of the observation given `value`
    pub prob: f32,
}

type DecodeTable = HashMap<u64, Vec<Variant>>;

/// The words of one prefix and their lookup structures
pub(crate) struct PrefixTable {
    prefix: ShortOligo,
    words: Vec<ShortOligo>,
    rmap: HashMap<u64, u32>,
    trie: Trie,
    /// Built on first use; most of a large codec's prefixes are never decoded
    dtable: OnceLock<DecodeTable>,
}
impl PrefixTable {
    pub(crate) fn new(prefix: ShortOligo, words: Vec<ShortOligo>) -> Result<Self> {
        let mut trie = Trie::new();
        let mut rmap = HashMap::with_capacity(words.len());
        for (value, word) in words.iter().enumerate() {
            let value = value as u32;
            trie.add(&word.to_nts(), value)?;
            rmap.entry(word.value()).or_insert(value);
        }
        Ok(Self {
            prefix,
            words,
            rmap,
            trie,
            dtable: OnceLock::new(),
        })
    }

    fn decode_table(&self, model: &dyn ErrorModel, minerr: f64) -> &DecodeTable {
        self.dtable.get_or_init(|| {
            let mut acc: HashMap<u64, Vec<(u32, f64)>> = HashMap::new();
            for (value, word) in self.words.iter().enumerate() {
                let value = value as u32;
                for (observed, prob) in model.variants(&word.to_nts(), minerr) {
                    let Ok(observed) = ShortOligo::from_nts(&observed) else {
                        continue;
                    };
                    let candidates = acc.entry(observed.value()).or_default();
                    match candidates.iter_mut().find(|(v, _)| *v == value) {
                        Some((_, p)) => *p += prob,
                        None => candidates.push((value, prob)),
                    }
                }
            }
            acc.into_iter()
                .map(|(observed, mut candidates)| {
                    candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
                    candidates.truncate(VARIANT_NUM);
                    let variants = candidates
                        .into_iter()
                        .map(|(value, prob)| Variant {
                            value: u64::from(value),
                            word: self.words[value as usize],
                            prob: prob as f32,
                        })
                        .collect();
                    (observed, variants)
                })
                .collect()
        })
    }
}

/// An immutable L0 codec, shared by reference between threads
pub struct L0Codec {
    criterion: Arc<dyn Criterion>,
    model: Arc<dyn ErrorModel>,
    minerr: f64,
    olen: usize,
    plen: usize,
    mindist: Option<usize>,
    maxval: u64,
    tables: Vec<PrefixTable>,
}
impl L0Codec {
    /// Word length
    #[must_use]
    pub fn oligo_len(&self) -> usize {
        self.olen
    }

    /// Number of trailing nucleotides that select a table
    #[must_use]
    pub fn prefix_len(&self) -> usize {
        self.plen
    }

    /// Minimum edit distance between words of one prefix
    ///
    /// Unknown for codecs loaded from a table file.
    #[must_use]
    pub fn min_dist(&self) -> Option<usize> {
        self.mindist
    }

    /// Effective value ceiling `V`: every prefix can encode `0..V`
    #[must_use]
    pub fn max_val(&self) -> u64 {
        self.maxval
    }

    /// Number of value bits a word carries, `floor(log2 V)`
    #[must_use]
    pub fn bits(&self) -> usize {
        value_bits(self.maxval)
    }

    #[must_use]
    pub fn criterion(&self) -> &Arc<dyn Criterion> {
        &self.criterion
    }

    #[must_use]
    pub fn error_model(&self) -> &Arc<dyn ErrorModel> {
        &self.model
    }

    /// All words of a prefix, in value order
    pub fn words(&self, prefix: &ShortOligo) -> Result<&[ShortOligo]> {
        Ok(&self.table(prefix)?.words)
    }

    fn table(&self, prefix: &ShortOligo) -> Result<&PrefixTable> {
        if prefix.len() < self.plen {
            return Err(TableError::NoTable(prefix.to_string()).into());
        }
        let key = prefix.tail(self.plen);
        match self.tables.get(key.value() as usize) {
            Some(table) if !table.words.is_empty() => Ok(table),
            _ => Err(TableError::NoTable(key.to_string()).into()),
        }
    }

    /// The word encoding `value` after `prefix`
    ///
    /// Only the last [`prefix_len`](Self::prefix_len) nucleotides of `prefix` matter.
    ///
    /// # Errors
    ///
    /// Fails if `value` is not below [`max_val`](Self::max_val) or the prefix has no table.
    pub fn encode(&self, prefix: &ShortOligo, value: u64) -> Result<ShortOligo> {
        let table = self.table(prefix)?;
        if value >= self.maxval {
            return Err(TableError::ValueOutOfRange {
                value,
                max: self.maxval,
            }
            .into());
        }
        Ok(table.words[value as usize])
    }

    /// Ranked candidate values for an observed word
    ///
    /// # Arguments
    ///
    /// * `prefix` - The canonical nucleotides preceding the word
    /// * `observed` - The observed word, of any length
    /// * `maxdist` - Edit-distance bound of the slow-path search
    /// * `ctx` - Search deadline; an expired deadline yields an empty list
    ///
    /// # Returns
    ///
    /// At most [`VARIANT_NUM`] variants, most probable first
    pub fn decode(
        &self,
        prefix: &ShortOligo,
        observed: &[Nt],
        maxdist: usize,
        ctx: &mut SearchCtx,
    ) -> Result<Vec<Variant>> {
        let table = self.table(prefix)?;
        if observed.len() == self.olen {
            if let Ok(word) = ShortOligo::from_nts(observed) {
                let dtable = table.decode_table(&*self.model, self.minerr);
                if let Some(variants) = dtable.get(&word.value()) {
                    return Ok(variants.clone());
                }
                if let Some(&value) = table.rmap.get(&word.value()) {
                    return Ok(vec![Variant {
                        value: u64::from(value),
                        word,
                        prob: self.model.edit_prob(self.olen, 0) as f32,
                    }]);
                }
            }
        }

        let mut variants: Vec<Variant> = table
            .trie
            .search_all(observed, maxdist, ctx)
            .into_iter()
            .map(|m| {
                let value = m.value();
                Variant {
                    value: u64::from(value),
                    word: table.words[value as usize],
                    prob: self.model.edit_prob(self.olen, m.dist) as f32,
                }
            })
            .collect();
        variants.sort_by(|a, b| b.prob.total_cmp(&a.prob).then(a.value.cmp(&b.value)));
        variants.truncate(VARIANT_NUM);
        Ok(variants)
    }

    /// The most probable decoding of an observed word, searching up to one edit away
    pub fn decode_top(&self, prefix: &ShortOligo, observed: &[Nt]) -> Result<Option<Variant>> {
        let mut ctx = SearchCtx::unbounded();
        Ok(self.decode(prefix, observed, 1, &mut ctx)?.first().copied())
    }

    /// Every prefix table, in file order
    pub(crate) fn tables(&self) -> &[PrefixTable] {
        &self.tables
    }
}

/// `floor(log2 maxval)`, zero for an empty table
pub(crate) fn value_bits(maxval: u64) -> usize {
    if maxval == 0 {
        0
    } else {
        63 - maxval.leading_zeros() as usize
    }
}

/// Number of G/C nucleotides in a packed word of length `len`
pub(crate) fn packed_gc(value: u64, len: usize) -> usize {
    let mask = 0xAAAA_AAAA_AAAA_AAAA_u64 >> (64 - 2 * len.max(1));
    (value & mask).count_ones() as usize
}

#[cfg(test)]
mod testing {
    use super::*;
    use crate::criteria::Homopolymer;
    use crate::oligo::distance;
    use crate::Error;
    use anyhow::Result;
    use std::sync::OnceLock;

    fn codec() -> &'static L0Codec {
        static CODEC: OnceLock<L0Codec> = OnceLock::new();
        CODEC.get_or_init(|| {
            L0Builder::default()
                .oligo_len(8)
                .min_dist(3)
                .prefix_len(2)
                .criterion(Arc::new(Homopolymer::H4))
                .build()
                .expect("fixture table builds")
        })
    }

    fn prefixes(plen: usize) -> Vec<ShortOligo> {
        (0..1u64 << (2 * plen))
            .map(|v| ShortOligo::from_value(plen, v).unwrap())
            .collect()
    }

    #[test]
    fn test_value_bits() {
        assert_eq!(value_bits(0), 0);
        assert_eq!(value_bits(1), 0);
        assert_eq!(value_bits(600), 9);
        assert_eq!(value_bits(8192), 13);
        assert_eq!(value_bits(65535), 15);
    }

    #[test]
    fn test_packed_gc() -> Result<()> {
        let word: ShortOligo = "ACGTTGCA".parse()?;
        assert_eq!(packed_gc(word.value(), 8), 4);
        let word: ShortOligo = "GGGG".parse()?;
        assert_eq!(packed_gc(word.value(), 4), 4);
        Ok(())
    }

    #[test]
    fn test_fixture_shape() {
        let codec = codec();
        assert_eq!(codec.oligo_len(), 8);
        assert_eq!(codec.prefix_len(), 2);
        assert_eq!(codec.min_dist(), Some(3));
        assert!(codec.max_val() >= 256, "max_val = {}", codec.max_val());
        assert!(codec.bits() >= 8);
    }

    #[test]
    fn test_roundtrip_every_value() -> Result<()> {
        let codec = codec();
        for prefix in prefixes(2) {
            for value in 0..codec.max_val() {
                let word = codec.encode(&prefix, value)?;
                let top = codec
                    .decode_top(&prefix, &word.to_nts())?
                    .expect("exact word decodes");
                assert_eq!(top.value, value);
                assert_eq!(top.word, word);
            }
        }
        Ok(())
    }

    #[test]
    fn test_constraints() -> Result<()> {
        let codec = codec();
        for prefix in prefixes(2) {
            let words = codec.words(&prefix)?;
            for word in words {
                let mut seq = prefix.to_nts();
                seq.extend(word.to_nts());
                assert!(codec.criterion().check(&seq), "{prefix}{word}");
                assert_eq!(word.gc_count(), 4);
            }
        }
        Ok(())
    }

    #[test]
    fn test_min_distance() -> Result<()> {
        let codec = codec();
        let prefix: ShortOligo = "GA".parse()?;
        let words: Vec<Vec<Nt>> = codec.words(&prefix)?.iter().map(Oligo::to_nts).collect();
        for (i, a) in words.iter().enumerate() {
            for b in &words[i + 1..] {
                assert!(distance(a, b) >= 3);
            }
        }
        Ok(())
    }

    #[test]
    fn test_longer_prefix_uses_tail() -> Result<()> {
        let codec = codec();
        let short: ShortOligo = "TC".parse()?;
        let long: ShortOligo = "GGATC".parse()?;
        assert_eq!(codec.encode(&short, 17)?, codec.encode(&long, 17)?);
        Ok(())
    }

    #[test]
    fn test_value_out_of_range() -> Result<()> {
        let codec = codec();
        let prefix: ShortOligo = "AC".parse()?;
        match codec.encode(&prefix, codec.max_val()) {
            Err(Error::TableError(TableError::ValueOutOfRange { .. })) => {}
            other => panic!("unexpected {other:?}"),
        }
        let short: ShortOligo = "A".parse()?;
        assert!(codec.encode(&short, 0).is_err());
        Ok(())
    }

    #[test]
    fn test_single_substitution() -> Result<()> {
        let codec = codec();
        let prefix: ShortOligo = "CG".parse()?;
        let mut ctx = SearchCtx::unbounded();
        for value in (0..codec.max_val()).step_by(37) {
            let mut seq = codec.encode(&prefix, value)?.to_nts();
            seq[3] = Nt::from_bits(seq[3] as u64 + 1);
            let variants = codec.decode(&prefix, &seq, 1, &mut ctx)?;
            assert!(!variants.is_empty());
            assert!(variants.len() <= VARIANT_NUM);
            assert_eq!(variants[0].value, value);
        }
        Ok(())
    }

    #[test]
    fn test_indel_slow_path() -> Result<()> {
        let codec = codec();
        let prefix: ShortOligo = "TT".parse()?;
        let mut ctx = SearchCtx::unbounded();
        for value in (0..codec.max_val()).step_by(53) {
            let word = codec.encode(&prefix, value)?.to_nts();
            let mut deleted = word.clone();
            deleted.remove(4);
            let variants = codec.decode(&prefix, &deleted, 1, &mut ctx)?;
            assert!(variants.iter().any(|v| v.value == value));
            // distance 3 between words leaves the true word as the only one-edit match
            assert_eq!(variants.len(), 1);

            let mut inserted = word.clone();
            inserted.insert(2, Nt::G);
            let variants = codec.decode(&prefix, &inserted, 1, &mut ctx)?;
            assert_eq!(variants[0].value, value);
        }
        Ok(())
    }

    #[test]
    fn test_shuffle_is_deterministic() -> Result<()> {
        let build = || {
            L0Builder::default()
                .oligo_len(6)
                .min_dist(2)
                .prefix_len(1)
                .criterion(Arc::new(Homopolymer::H4))
                .build()
        };
        let a = build()?;
        let b = build()?;
        let prefix: ShortOligo = "G".parse()?;
        assert_eq!(a.words(&prefix)?, b.words(&prefix)?);

        let sorted = L0Builder::default()
            .oligo_len(6)
            .min_dist(2)
            .prefix_len(1)
            .shuffle(false)
            .criterion(Arc::new(Homopolymer::H4))
            .build()?;
        let words = sorted.words(&prefix)?;
        assert!(words.windows(2).all(|w| w[0] < w[1]));
        assert_ne!(a.words(&prefix)?, words);
        Ok(())
    }

    #[test]
    fn test_max_val_cap() -> Result<()> {
        let codec = L0Builder::default()
            .oligo_len(6)
            .min_dist(2)
            .prefix_len(1)
            .max_val(100)
            .criterion(Arc::new(Homopolymer::H4))
            .build()?;
        assert_eq!(codec.max_val(), 100);
        assert_eq!(codec.bits(), 6);
        Ok(())
    }
}
