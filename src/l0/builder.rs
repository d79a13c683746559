use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tracing::{debug, info};

use super::{packed_gc, L0Codec, PrefixTable};
use crate::criteria::{Criterion, Homopolymer};
use crate::error::{ConfigError, PoolError, Result, TableError};
use crate::model::{ErrorModel, SimpleErrorModel};
use crate::oligo::{Oligo, ShortOligo, MAX_SHORT_LEN};
use crate::trie::{SearchCtx, Trie};
use crate::RNG_SEED;

/// Default word length
pub const DEFAULT_OLIGO_LEN: usize = 17;

/// Default minimum edit distance between words of one prefix
pub const DEFAULT_MIN_DIST: usize = 3;

/// Default probability floor of decoding table entries
pub const DEFAULT_MIN_ERR: f64 = 1e-3;

/// Builder for [`L0Codec`], both for constructing tables and for loading them
///
/// ```no_run
/// use std::sync::Arc;
/// use oligostore::criteria::Homopolymer;
/// use oligostore::l0::L0Builder;
///
/// let codec = L0Builder::default()
///     .oligo_len(17)
///     .min_dist(3)
///     .criterion(Arc::new(Homopolymer::H4G2))
///     .max_val(8192)
///     .build()
///     .unwrap();
/// assert_eq!(codec.bits(), 13);
/// ```
#[derive(Clone)]
pub struct L0Builder {
    olen: usize,
    mindist: usize,
    criterion: Option<Arc<dyn Criterion>>,
    shuffle: bool,
    max_val: Option<u64>,
    prefix_len: Option<usize>,
    min_err: f64,
    model: Option<Arc<dyn ErrorModel>>,
    threads: usize,
}
impl Default for L0Builder {
    fn default() -> Self {
        Self {
            olen: DEFAULT_OLIGO_LEN,
            mindist: DEFAULT_MIN_DIST,
            criterion: None,
            shuffle: true,
            max_val: None,
            prefix_len: None,
            min_err: DEFAULT_MIN_ERR,
            model: None,
            threads: 0,
        }
    }
}
impl L0Builder {
    #[must_use]
    pub fn oligo_len(mut self, olen: usize) -> Self {
        self.olen = olen;
        self
    }

    #[must_use]
    pub fn min_dist(mut self, mindist: usize) -> Self {
        self.mindist = mindist;
        self
    }

    /// Criterion every `prefix ‖ word` must satisfy
    ///
    /// Defaults to `h4g2` when building. When loading, the table file's
    /// criterion must match this one if it is set.
    #[must_use]
    pub fn criterion(mut self, criterion: Arc<dyn Criterion>) -> Self {
        self.criterion = Some(criterion);
        self
    }

    /// Shuffle each prefix's words with a fixed seed (default: true)
    #[must_use]
    pub fn shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Caps the number of values per prefix
    ///
    /// Enumeration of a prefix stops once this many words are collected; the
    /// collected words are then shuffled.
    #[must_use]
    pub fn max_val(mut self, max_val: u64) -> Self {
        self.max_val = Some(max_val);
        self
    }

    /// Prefix length (defaults to the criterion's feature length)
    #[must_use]
    pub fn prefix_len(mut self, plen: usize) -> Self {
        self.prefix_len = Some(plen);
        self
    }

    /// Probability floor of decoding table entries
    #[must_use]
    pub fn min_err(mut self, min_err: f64) -> Self {
        self.min_err = min_err;
        self
    }

    #[must_use]
    pub fn error_model(mut self, model: Arc<dyn ErrorModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Number of construction threads (0 = number of cores)
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub(crate) fn resolved_model(&self) -> Arc<dyn ErrorModel> {
        self.model
            .clone()
            .unwrap_or_else(|| Arc::new(SimpleErrorModel::default()))
    }

    pub(crate) fn configured_criterion(&self) -> Option<&Arc<dyn Criterion>> {
        self.criterion.as_ref()
    }

    pub(crate) fn min_err_value(&self) -> f64 {
        self.min_err
    }

    fn thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Constructs the tables for every prefix
    ///
    /// # Errors
    ///
    /// Fails on unusable parameters, or when some prefix admits no word at all.
    pub fn build(self) -> Result<L0Codec> {
        let criterion: Arc<dyn Criterion> = self
            .criterion
            .clone()
            .unwrap_or_else(|| Arc::new(Homopolymer::H4G2));
        let plen = self.prefix_len.unwrap_or_else(|| criterion.feature_len());
        if self.olen == 0 || self.olen > MAX_SHORT_LEN {
            return Err(ConfigError::InvalidParameter {
                name: "oligo_len",
                reason: format!("must be in 1..={MAX_SHORT_LEN}"),
            }
            .into());
        }
        if plen > MAX_SHORT_LEN / 2 {
            return Err(ConfigError::InvalidParameter {
                name: "prefix_len",
                reason: format!("{plen} prefixes would not fit in memory"),
            }
            .into());
        }
        if self.max_val == Some(0) {
            return Err(ConfigError::InvalidParameter {
                name: "max_val",
                reason: "must be positive".to_string(),
            }
            .into());
        }

        let prefixes = (0..1u64 << (2 * plen))
            .map(|value| ShortOligo::from_value(plen, value))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let first = ShortOligo::new(self.olen)?;
        let limit = self.max_val.and_then(|max| usize::try_from(max).ok());

        let next = AtomicUsize::new(0);
        let (next, prefixes_ref, criterion_ref) = (&next, &prefixes, &*criterion);
        let mindist = self.mindist;
        let threads = self.thread_count().min(prefixes.len()).max(1);
        let mut built: Vec<(usize, Vec<ShortOligo>)> = thread::scope(|scope| {
            let handles: Vec<_> = (0..threads)
                .map(|_| {
                    scope.spawn(move || -> std::result::Result<_, TableError> {
                        let mut out = Vec::new();
                        loop {
                            let idx = next.fetch_add(1, Ordering::Relaxed);
                            let Some(prefix) = prefixes_ref.get(idx) else {
                                break;
                            };
                            let words = build_words(prefix, first, mindist, criterion_ref, limit)?;
                            debug!(prefix = %prefix, words = words.len(), "built prefix table");
                            out.push((idx, words));
                        }
                        Ok(out)
                    })
                })
                .collect();
            let mut all = Vec::with_capacity(prefixes_ref.len());
            for handle in handles {
                let part = handle.join().map_err(|_| PoolError::WorkerPanicked)??;
                all.extend(part);
            }
            Ok::<_, crate::Error>(all)
        })?;
        built.sort_by_key(|(idx, _)| *idx);

        let mut maxval = built
            .iter()
            .map(|(_, words)| words.len() as u64)
            .min()
            .unwrap_or(0);
        if let Some(max) = self.max_val {
            maxval = maxval.min(max);
        }
        if maxval == 0 {
            return Err(TableError::Empty.into());
        }

        let mut rng = SmallRng::seed_from_u64(RNG_SEED);
        let mut tables = Vec::with_capacity(built.len());
        for ((_, mut words), prefix) in built.into_iter().zip(prefixes) {
            if self.shuffle {
                words.shuffle(&mut rng);
            }
            words.truncate(maxval as usize);
            tables.push(PrefixTable::new(prefix, words)?);
        }
        info!(
            criterion = criterion.name(),
            olen = self.olen,
            plen,
            maxval,
            "L0 tables built"
        );

        Ok(L0Codec {
            model: self.resolved_model(),
            criterion,
            minerr: self.min_err,
            olen: self.olen,
            plen,
            mindist: Some(self.mindist),
            maxval,
            tables,
        })
    }
}

/// Enumerates the words that may follow `prefix`, in lexicographic order
///
/// A candidate is kept when its GC content lies in `[0.4 L, 0.6 L]`, `prefix ‖
/// candidate` passes the criterion, and no kept word lies closer than `mindist`.
/// The GC bounds are inclusive and count the word alone, not the prefix.
fn build_words(
    prefix: &ShortOligo,
    first: ShortOligo,
    mindist: usize,
    criterion: &dyn Criterion,
    limit: Option<usize>,
) -> std::result::Result<Vec<ShortOligo>, TableError> {
    let olen = first.len();
    let gc_min = (2 * olen).div_ceil(5);
    let gc_max = 3 * olen / 5;
    let plen = prefix.len();

    let mut trie = Trie::new();
    let mut ctx = SearchCtx::unbounded();
    let mut words = Vec::new();
    let mut seq = prefix.to_nts();
    let mut candidate = first;
    loop {
        // word only, bounds inclusive
        let gc = packed_gc(candidate.value(), olen);
        if (gc_min..=gc_max).contains(&gc) {
            seq.truncate(plen);
            seq.extend((0..olen).map(|i| candidate.at(i)));
            if criterion.check(&seq) && trie.search_at_least(&seq[plen..], mindist, &mut ctx) {
                trie.add(&seq[plen..], words.len() as u32)?;
                words.push(candidate);
                if limit.is_some_and(|limit| words.len() >= limit) {
                    break;
                }
            }
        }
        if !candidate.next() {
            break;
        }
    }
    Ok(words)
}
