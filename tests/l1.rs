mod common;

use anyhow::Result;
use oligostore::l1::Frame;
use oligostore::model::inject_errors;
use oligostore::oligo::{distance, Oligo};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[test]
fn test_single_byte_frame() -> Result<()> {
    let codec = common::l1(1, 1)?;
    let frame = Frame::new(42, vec![0xAB]);
    let oligo = codec.encode(&frame)?;
    assert_eq!(oligo.len(), 20 + codec.word_count() * codec.l0().oligo_len() + 20);
    assert_eq!(oligo.len(), codec.oligo_len());
    assert_eq!(codec.decode(oligo.as_slice(), 0), Ok(frame));
    Ok(())
}

#[test]
fn test_primer_edits_tolerated() -> Result<()> {
    let codec = common::l1(5, 2)?;
    let frame = Frame::new(4321, vec![1, 2, 3, 4, 5]).erasure(true);
    let oligo = codec.encode(&frame)?;
    let mut rng = SmallRng::seed_from_u64(5);
    for _ in 0..20 {
        let mut seq = oligo.as_slice().to_vec();
        let n = seq.len();
        // substitutions only, four per primer, kept away from the body junctions
        for _ in 0..4 {
            let pos = rng.random_range(1..16);
            seq[pos] = seq[pos].complement();
            let pos = n - 1 - rng.random_range(1..16);
            seq[pos] = seq[pos].complement();
        }
        assert_eq!(codec.decode(&seq, 0), Ok(frame.clone()));
    }
    Ok(())
}

#[test]
fn test_random_edits_majority() -> Result<()> {
    let codec = common::l1(5, 2)?;
    let mut rng = SmallRng::seed_from_u64(3);
    let trials = 100;
    let mut ok = 0;
    for _ in 0..trials {
        let addr = rng.random_range(0..codec.max_addr());
        let data: Vec<u8> = (0..5).map(|_| rng.random()).collect();
        let oligo = codec.encode(&Frame::new(addr, data))?;
        let noisy = inject_errors(oligo.as_slice(), 3, &mut rng);
        assert!(distance(&noisy, oligo.as_slice()) <= 3);
        if codec.decode(&noisy, 1).is_ok_and(|frame| frame.addr == addr) {
            ok += 1;
        }
    }
    assert!(ok * 2 > trials, "{ok} of {trials} decoded");
    Ok(())
}
