//! MSB-first packing of a byte stream into fixed-width word values

/// Cuts `bytes` into `count` values of `bits` bits each, most significant bit first
///
/// The last value is zero-padded at its low end; missing bytes read as zero.
pub(crate) fn pack(bytes: &[u8], bits: usize, count: usize) -> Vec<u64> {
    let mut values = Vec::with_capacity(count);
    let mut acc = 0u64;
    let mut filled = 0;
    let mut bit_iter = bytes
        .iter()
        .flat_map(|&b| (0..8).rev().map(move |i| u64::from((b >> i) & 1)));
    while values.len() < count {
        acc = (acc << 1) | bit_iter.next().unwrap_or(0);
        filled += 1;
        if filled == bits {
            values.push(acc);
            acc = 0;
            filled = 0;
        }
    }
    values
}

/// Inverse of [`pack`]: concatenates the low `bits` bits of each value and
/// returns the first `len` bytes
pub(crate) fn unpack(values: &[u64], bits: usize, len: usize) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(len);
    let mut acc = 0u8;
    let mut filled = 0;
    'outer: for &value in values {
        for i in (0..bits).rev() {
            acc = (acc << 1) | ((value >> i) & 1) as u8;
            filled += 1;
            if filled == 8 {
                bytes.push(acc);
                acc = 0;
                filled = 0;
                if bytes.len() == len {
                    break 'outer;
                }
            }
        }
    }
    if filled > 0 && bytes.len() < len {
        bytes.push(acc << (8 - filled));
    }
    bytes.resize(len, 0);
    bytes
}

/// Number of `bits`-wide words needed to carry `bytes` bytes
pub(crate) fn words_for(bytes: usize, bits: usize) -> usize {
    (8 * bytes).div_ceil(bits)
}

#[cfg(test)]
mod testing {
    use super::*;

    #[test]
    fn test_sixteen_bit_words() {
        // one metadata byte and one data byte in a single 16-bit word: md * 256 + data
        let values = pack(&[0x2A, 0xAB], 16, 1);
        assert_eq!(values, vec![0x2A * 256 + 0xAB]);
        assert_eq!(unpack(&values, 16, 2), vec![0x2A, 0xAB]);
    }

    #[test]
    fn test_odd_width() {
        let bytes = [0xFF, 0x00, 0x81, 0x7E, 0x42];
        let count = words_for(bytes.len(), 9);
        assert_eq!(count, 5);
        let values = pack(&bytes, 9, count);
        assert!(values.iter().all(|&v| v < 512));
        assert_eq!(values[0], 0x1FE); // 11111111 0
        assert_eq!(unpack(&values, 9, bytes.len()), bytes.to_vec());
    }

    #[test]
    fn test_padding_and_short_input() {
        let values = pack(&[0x80], 3, 4);
        assert_eq!(values, vec![0b100, 0, 0, 0]);
        assert_eq!(unpack(&values[..1], 3, 2), vec![0x80, 0]);
    }
}
