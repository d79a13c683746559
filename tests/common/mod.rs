#![allow(dead_code)]

use std::sync::{Arc, OnceLock};

use anyhow::Result;
use oligostore::criteria::Homopolymer;
use oligostore::l0::{L0Builder, L0Codec};
use oligostore::l1::{L1Codec, L1CodecBuilder, MetadataChecksum};
use oligostore::l2::{L2Codec, PoolConfig};
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

pub const P5: &str = "CGACATCTCGATGGCAGCAT";
pub const P3: &str = "CAGTGAGCTGGCAACTTCCA";

/// A small table shared by every test of a binary
pub fn l0() -> Arc<L0Codec> {
    static CODEC: OnceLock<Arc<L0Codec>> = OnceLock::new();
    CODEC
        .get_or_init(|| {
            Arc::new(
                L0Builder::default()
                    .oligo_len(8)
                    .min_dist(3)
                    .prefix_len(2)
                    .criterion(Arc::new(Homopolymer::H4))
                    .build()
                    .expect("fixture table builds"),
            )
        })
        .clone()
}

pub fn l1(data_len: usize, metadata_len: usize) -> Result<L1Codec> {
    Ok(L1CodecBuilder::default()
        .primers(P5.parse()?, P3.parse()?)
        .data_len(data_len)
        .metadata_len(metadata_len)
        .checksum(MetadataChecksum::Crc16)
        .build(l0())?)
}

/// A pool codec whose frames carry exactly one row of `config`
pub fn pool(config: PoolConfig, metadata_len: usize) -> Result<L2Codec> {
    let l1 = l1(config.row_size(), metadata_len)?;
    Ok(L2Codec::new(Arc::new(l1), config)?)
}

pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill_bytes(&mut data);
    data
}
