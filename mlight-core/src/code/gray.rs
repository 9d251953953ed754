//! Reflected-binary Gray code.
//!
//! Consecutive positions differ in exactly one bit, so a camera pixel
//! sitting on a stripe edge can be wrong by at most one position.

/// Gray-encode a position: `pos ^ (pos >> 1)`. Bijective over `u32`.
pub fn encode(pos: u32) -> u32 {
    pos ^ (pos >> 1)
}

/// Invert [`encode`] with the doubling XOR-fold.
///
/// Exact inverse over the full 32-bit width, including
/// `u32::MAX`.
pub fn decode(code: u32) -> u32 {
    let mut pos = code;
    let mut shift = 1u32;
    while shift < 32 {
        pos ^= pos >> shift;
        shift <<= 1;
    }
    pos
}

/// Whether `bit` is set in the Gray encoding of `pos`.
pub fn bit_of(pos: u32, bit: u32) -> bool {
    encode(pos) & (1 << bit) != 0
}

/// One display row for a pattern: the given bit of each position's
/// Gray code, for positions `0..size`.
pub fn stripe_row(bit: u32, size: usize) -> Vec<bool> {
    (0..size as u32).map(|pos| bit_of(pos, bit)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_low_range() {
        for pos in 0u32..(1 << 12) {
            assert_eq!(decode(encode(pos)), pos, "pos={pos}");
        }
    }

    #[test]
    fn roundtrip_boundaries() {
        for n in 1..=32u32 {
            let top = if n == 32 { u32::MAX } else { (1 << n) - 1 };
            assert_eq!(decode(encode(0)), 0);
            assert_eq!(decode(encode(top)), top, "n={n}");
        }
    }

    #[test]
    fn adjacent_codes_differ_in_one_bit() {
        for pos in 0u32..4096 {
            let diff = encode(pos) ^ encode(pos + 1);
            assert_eq!(diff.count_ones(), 1, "pos={pos}");
        }
    }

    #[test]
    fn stripe_row_matches_bit_of() {
        let row = stripe_row(2, 64);
        for (pos, &on) in row.iter().enumerate() {
            assert_eq!(on, bit_of(pos as u32, 2));
        }
    }
}
