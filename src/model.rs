//! # model
//!
//! Probabilistic channel models. The L0 builder asks a model which noisy
//! observations of a canonical word are likely enough to be worth a decoding
//! table entry; the slow decode path asks it how likely an observation `d` edits
//! away is; tests use it to inject errors.

use auto_impl::auto_impl;
use rand::{Rng, RngCore};

use crate::oligo::Nt;

/// A channel error model
#[auto_impl(&, Box, Arc)]
pub trait ErrorModel: Send + Sync {
    /// Same-length observations of `word` whose probability is at least `minerr`,
    /// including `word` itself
    fn variants(&self, word: &[Nt], minerr: f64) -> Vec<(Vec<Nt>, f64)>;

    /// Likelihood of an observation `dist` edits away from a word of length `len`
    fn edit_prob(&self, len: usize, dist: usize) -> f64;

    /// Passes a sequence through the channel
    fn mutate(&self, seq: &[Nt], rng: &mut dyn RngCore) -> Vec<Nt>;
}

/// Independent per-nucleotide substitution, insertion and deletion rates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimpleErrorModel {
    pub sub: f64,
    pub ins: f64,
    pub del: f64,
}
impl Default for SimpleErrorModel {
    fn default() -> Self {
        Self {
            sub: 0.01,
            ins: 0.005,
            del: 0.005,
        }
    }
}
impl SimpleErrorModel {
    #[must_use]
    pub fn new(sub: f64, ins: f64, del: f64) -> Self {
        Self { sub, ins, del }
    }

    fn p_ok(&self) -> f64 {
        (1.0 - self.sub - self.ins - self.del).max(0.0)
    }

    fn expand(
        &self,
        word: &[Nt],
        pos: usize,
        cur: &mut Vec<Nt>,
        prob: f64,
        minerr: f64,
        out: &mut Vec<(Vec<Nt>, f64)>,
    ) {
        if pos == word.len() {
            out.push((cur.clone(), prob));
            return;
        }
        let keep = self.p_ok();
        let swap = self.sub / 3.0;
        let remaining = (word.len() - pos - 1) as i32;
        let bound = keep.max(swap).powi(remaining);

        if prob * keep * bound >= minerr {
            cur.push(word[pos]);
            self.expand(word, pos + 1, cur, prob * keep, minerr, out);
            cur.pop();
        }
        if prob * swap * bound >= minerr {
            for nt in Nt::ALL {
                if nt == word[pos] {
                    continue;
                }
                cur.push(nt);
                self.expand(word, pos + 1, cur, prob * swap, minerr, out);
                cur.pop();
            }
        }
    }
}
impl ErrorModel for SimpleErrorModel {
    fn variants(&self, word: &[Nt], minerr: f64) -> Vec<(Vec<Nt>, f64)> {
        let mut out = Vec::new();
        let mut cur = Vec::with_capacity(word.len());
        self.expand(word, 0, &mut cur, 1.0, minerr, &mut out);
        out
    }

    fn edit_prob(&self, len: usize, dist: usize) -> f64 {
        let err = (self.sub + self.ins + self.del) / 3.0;
        err.powi(dist as i32) * self.p_ok().powi(len.saturating_sub(dist) as i32)
    }

    fn mutate(&self, seq: &[Nt], rng: &mut dyn RngCore) -> Vec<Nt> {
        let mut out = Vec::with_capacity(seq.len() + 4);
        for &nt in seq {
            let r: f64 = rng.random();
            if r < self.del {
                continue;
            } else if r < self.del + self.ins {
                out.push(Nt::from_bits(rng.random_range(0..4)));
                out.push(nt);
            } else if r < self.del + self.ins + self.sub {
                out.push(other_nt(nt, rng));
            } else {
                out.push(nt);
            }
        }
        out
    }
}

fn other_nt(nt: Nt, rng: &mut dyn RngCore) -> Nt {
    Nt::from_bits(nt as u64 + rng.random_range(1..4))
}

/// Applies exactly `count` random edits (substitution, insertion or deletion)
/// at uniformly chosen positions
pub fn inject_errors(seq: &[Nt], count: usize, rng: &mut dyn RngCore) -> Vec<Nt> {
    let mut out = seq.to_vec();
    for _ in 0..count {
        if out.is_empty() {
            break;
        }
        let pos = rng.random_range(0..out.len());
        match rng.random_range(0..3) {
            0 => {
                let nt = other_nt(out[pos], rng);
                out[pos] = nt;
            }
            1 => out.insert(pos, Nt::from_bits(rng.random_range(0..4))),
            _ => {
                out.remove(pos);
            }
        }
    }
    out
}
