//! Two's-complement arithmetic over W-bit words.
//!
//! Signed values are carried as `i128` between operations so that the
//! product of two 64-bit operands is exact; [`reduce_to_range`] folds any
//! such intermediate back into the canonical range in constant time.

use super::Word;

/// Mask of the low `bits` bits.
#[inline]
pub fn mask(bits: u32) -> Word {
    if bits >= 64 {
        Word::MAX
    } else {
        (1 << bits) - 1
    }
}

/// `2^width`.
#[inline]
fn modulus(width: u32) -> i128 {
    1i128 << width
}

/// Largest signed value of a `width`-bit word.
#[inline]
pub fn max_signed(width: u32) -> i64 {
    ((1i128 << (width - 1)) - 1) as i64
}

/// Smallest signed value of a `width`-bit word.
#[inline]
pub fn min_signed(width: u32) -> i64 {
    (-(1i128 << (width - 1))) as i64
}

/// Interpret raw bits as a two's-complement number.
///
/// Subtracts `2^width` when the raw value is above the signed maximum.
pub fn to_signed(raw: Word, width: u32) -> i128 {
    let raw = raw as i128;
    if raw > max_signed(width) as i128 {
        raw - modulus(width)
    } else {
        raw
    }
}

/// Encode a canonical signed value as raw bits.
pub fn to_unsigned(value: i64, width: u32) -> Word {
    if value < 0 {
        (value as i128 + modulus(width)) as Word
    } else {
        value as Word
    }
}

/// Fold any integer into `[-2^(W-1), 2^(W-1) - 1]` modulo `2^W`.
///
/// Idempotent, and the result always fits the word.
pub fn reduce_to_range(value: i128, width: u32) -> i64 {
    let m = modulus(width);
    let r = value.rem_euclid(m);
    if r > max_signed(width) as i128 {
        (r - m) as i64
    } else {
        r as i64
    }
}

/// The data reading of a stored word, including words wider than W.
#[inline]
pub fn word_value(raw: Word, width: u32) -> i64 {
    reduce_to_range(to_signed(raw, width), width)
}

/// Raw modulo-`2^W` addition, no re-centering.
pub fn add_binary(a: Word, b: Word, width: u32) -> Word {
    ((a as u128 + b as u128) % (1u128 << width)) as Word
}

/// Logical left shift; shifting by W or more clears the word.
pub fn shift_left(value: Word, count: u64, width: u32) -> Word {
    if count >= width as u64 {
        0
    } else {
        (value << count) & mask(width)
    }
}

/// Logical right shift.
pub fn shift_right(value: Word, count: u64, width: u32) -> Word {
    if count >= 64 {
        0
    } else {
        (value >> count) & mask(width)
    }
}

/// Rotate the low W bits right by `count mod W`.
pub fn rotate_right(value: Word, count: u64, width: u32) -> Word {
    let v = value & mask(width);
    let n = (count % width as u64) as u32;
    if n == 0 {
        v
    } else {
        ((v >> n) | (v << (width - n))) & mask(width)
    }
}

/// Full-width bitwise NOT.
#[inline]
pub fn complement(value: Word, width: u32) -> Word {
    !value & mask(width)
}
