//! 4-bit unpacking in AWQ nibble order

use rayon::prelude::*;

/// Nibbles per 32-bit packed word.
pub const PACK_FACTOR: usize = 8;

/// Nibble read by logical column `c % 8` of a packed word.
pub const REVERSE_ORDER: [usize; PACK_FACTOR] = [0, 4, 1, 5, 2, 6, 3, 7];

/// Unsigned 4-bit value of logical column `col` within `word`.
#[inline(always)]
pub fn unpack_nibble(word: i32, col: usize) -> i8 {
    let shift = REVERSE_ORDER[col % PACK_FACTOR] * 4;
    ((word as u32 >> shift) & 0xF) as i8
}

/// Expand the first `packed_cols` words of every row into one `i8` per
/// logical column, writing rows of width `out_cols` into `out`.
///
/// Rows are processed in parallel; each worker owns one output row.
pub fn unpack_and_reorder(
    packed: &[i32],
    rows: usize,
    packed_cols: usize,
    row_stride: usize,
    out: &mut [i8],
    out_cols: usize,
) {
    if rows == 0 || packed_cols == 0 {
        return;
    }
    debug_assert!(packed_cols * PACK_FACTOR <= out_cols);

    out.par_chunks_mut(out_cols).take(rows).enumerate().for_each(|(r, dst)| {
        let src = &packed[r * row_stride..r * row_stride + packed_cols];
        for (p, &word) in src.iter().enumerate() {
            let base = p * PACK_FACTOR;
            for (c, slot) in dst[base..base + PACK_FACTOR].iter_mut().enumerate() {
                *slot = unpack_nibble(word, c);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reverse_order_is_a_permutation() {
        let mut seen = [false; PACK_FACTOR];
        for &k in &REVERSE_ORDER {
            seen[k] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn single_nibble_lands_on_its_column() {
        // Nibble 1 (bits 4..8) is read by logical column 2.
        let word = 0x0000_00A0;
        let got: Vec<i8> = (0..8).map(|c| unpack_nibble(word, c)).collect();
        assert_eq!(got, vec![0, 0, 10, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn top_nibble_is_unsigned() {
        let word = 0xF000_0000_u32 as i32;
        assert_eq!(unpack_nibble(word, 7), 15);
        assert_eq!(unpack_nibble(word, 6), 0);
    }

    #[test]
    fn sequential_word_reads_in_reverse_order() {
        // Nibble k holds k, so column c reads REVERSE_ORDER[c].
        let word = 0x7654_3210;
        let got: Vec<i8> = (0..8).map(|c| unpack_nibble(word, c)).collect();
        assert_eq!(got, vec![0, 4, 1, 5, 2, 6, 3, 7]);
    }

    #[test]
    fn unpacks_strided_rows() {
        // Two rows of one word each, padded to a stride of 3 words.
        let packed = [0x7654_3210, -1, -1, 0x1111_1111];
        let mut out = vec![-1i8; 16];
        unpack_and_reorder(&packed, 2, 1, 3, &mut out, 8);
        assert_eq!(&out[..8], &[0, 4, 1, 5, 2, 6, 3, 7]);
        assert_eq!(&out[8..], &[1; 8]);
    }

    #[test]
    fn leaves_unpacked_tail_untouched() {
        let packed = [0i32];
        let mut out = vec![9i8; 12];
        unpack_and_reorder(&packed, 1, 1, 1, &mut out, 12);
        assert_eq!(&out[..8], &[0; 8]);
        assert_eq!(&out[8..], &[9; 4]);
    }

    #[test]
    fn empty_input_is_a_no_op() {
        let mut out: Vec<i8> = Vec::new();
        unpack_and_reorder(&[], 0, 0, 0, &mut out, 0);
        assert!(out.is_empty());
    }
}
