//! # criteria
//!
//! Biological constraints on synthesized sequences.
//!
//! Every variant forbids homopolymer runs longer than four nucleotides; the
//! variants differ in how they treat runs of `G` and the beginning and end of a
//! sequence. Each criterion carries a stable 48-bit identifier that is written
//! into L0 table files, binding a table to the criterion it was built with.
//!
//! GC content is not a criterion. The L0 builder filters it separately, on
//! the word without its prefix, keeping `0.4 L <= GC <= 0.6 L`.
//!
//! | Name   | Extra rules |
//! | ------ | ----------- |
//! | `h4`   | base rule only |
//! | `h4g1` | G-run > 1 forbidden |
//! | `h4g2` | G-run > 2 forbidden |
//! | `h4-2` | G-run > 2 forbidden; run > 2 at index 2 forbidden; tail run > 2 forbidden |
//! | `h4/2` | G-run > 2 forbidden; `G` at index 1 forbidden; run > 2 at index 2 forbidden; ending G-run > 1 forbidden; ending non-G run > 2 forbidden |

use std::collections::HashMap;
use std::sync::Arc;

use auto_impl::auto_impl;

use crate::error::TableError;
use crate::oligo::Nt;

/// Longest homopolymer run allowed by every built-in criterion
const MAX_RUN: usize = 4;

/// Number of nucleotides a built-in criterion needs to see across a junction
pub const FEATURE_LEN: usize = 4;

/// A predicate over nucleotide sequences
#[auto_impl(&, Box, Arc)]
pub trait Criterion: Send + Sync {
    /// Stable identifier stored in table files (low 48 bits)
    fn id(&self) -> u64;

    /// Registered name
    fn name(&self) -> &str;

    /// Number of trailing nucleotides that influence the check of what follows
    fn feature_len(&self) -> usize;

    /// Whether the sequence satisfies the criterion
    fn check(&self, seq: &[Nt]) -> bool;
}

/// Packs the ASCII bytes of a tag into a 48-bit identifier
#[must_use]
pub fn criterion_id(tag: &str) -> u64 {
    tag.bytes()
        .take(6)
        .fold(0u64, |acc, b| (acc << 8) | u64::from(b))
}

/// The built-in criterion variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Homopolymer {
    /// `h4`
    H4,
    /// `h4g1`
    H4G1,
    /// `h4g2`
    H4G2,
    /// `h4-2`
    H4Dash2,
    /// `h4/2`
    H4Slash2,
}
impl Homopolymer {
    pub const ALL: [Homopolymer; 5] = [
        Homopolymer::H4,
        Homopolymer::H4G1,
        Homopolymer::H4G2,
        Homopolymer::H4Dash2,
        Homopolymer::H4Slash2,
    ];

    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::H4 => "h4",
            Self::H4G1 => "h4g1",
            Self::H4G2 => "h4g2",
            Self::H4Dash2 => "h4-2",
            Self::H4Slash2 => "h4/2",
        }
    }

    fn max_g_run(self) -> usize {
        match self {
            Self::H4 => MAX_RUN,
            Self::H4G1 => 1,
            Self::H4G2 | Self::H4Dash2 | Self::H4Slash2 => 2,
        }
    }
}
impl Criterion for Homopolymer {
    fn id(&self) -> u64 {
        criterion_id(self.tag())
    }

    fn name(&self) -> &str {
        self.tag()
    }

    fn feature_len(&self) -> usize {
        FEATURE_LEN
    }

    fn check(&self, seq: &[Nt]) -> bool {
        let max_g = self.max_g_run();
        let mut run = 0;
        for (i, &nt) in seq.iter().enumerate() {
            run = if i > 0 && seq[i - 1] == nt { run + 1 } else { 1 };
            if run > MAX_RUN || (nt == Nt::G && run > max_g) {
                return false;
            }
            match self {
                Self::H4Dash2 if i == 2 && run > 2 => return false,
                Self::H4Slash2 => {
                    if i == 1 && nt == Nt::G {
                        return false;
                    }
                    if i == 2 && run > 2 {
                        return false;
                    }
                }
                _ => {}
            }
        }

        // rules on the final run
        let Some(&last) = seq.last() else {
            return true;
        };
        match self {
            Self::H4Dash2 => run <= 2,
            Self::H4Slash2 if last == Nt::G => run <= 1,
            Self::H4Slash2 => run <= 2,
            _ => true,
        }
    }
}

/// An explicit registry of criteria, owned by whoever builds or loads tables
#[derive(Clone, Default)]
pub struct CriteriaRegistry {
    by_name: HashMap<String, Arc<dyn Criterion>>,
    by_id: HashMap<u64, Arc<dyn Criterion>>,
}
impl CriteriaRegistry {
    /// Creates an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the five built-in variants
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for variant in Homopolymer::ALL {
            registry.register(Arc::new(variant));
        }
        registry
    }

    /// Registers a criterion under its name, replacing an earlier one with the same name
    pub fn register(&mut self, criterion: Arc<dyn Criterion>) {
        self.by_name
            .insert(criterion.name().to_string(), criterion.clone());
        self.by_id.insert(criterion.id(), criterion);
    }

    pub fn by_name(&self, name: &str) -> Result<Arc<dyn Criterion>, TableError> {
        self.by_name
            .get(name)
            .cloned()
            .ok_or_else(|| TableError::UnknownCriterionName(name.to_string()))
    }

    pub fn by_id(&self, id: u64) -> Result<Arc<dyn Criterion>, TableError> {
        self.by_id
            .get(&id)
            .cloned()
            .ok_or(TableError::UnknownCriterion(id))
    }
}
