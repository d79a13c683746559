//! # oligostore
//!
//! Storage of byte data in pools of short DNA oligos, in three layers:
//!
//! * [`l0`]: constrained words. Small integers map to DNA words that avoid
//!   homopolymers, keep a balanced GC content and stay a minimum edit distance
//!   apart, with ranked decoding of noisy observations.
//! * [`l1`]: addressed frames. An address, two flags and a few data bytes become
//!   one primer-flanked oligo, protected by a metadata checksum.
//! * [`l2`]: erasure-coded pools. A payload is split into Reed-Solomon groups of
//!   frames and reassembled from whatever oligos survive, with every byte
//!   labelled by how well it could be verified.

pub mod criteria;
pub mod error;
pub mod formats;
pub mod l0;
pub mod l1;
pub mod l2;
pub mod model;
pub mod oligo;
pub mod parallel;
pub mod policy;
pub mod trie;
mod utils;

pub use error::{Error, Result};
pub use policy::{Policy, RNG_SEED};
