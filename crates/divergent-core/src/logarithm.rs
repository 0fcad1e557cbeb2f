//! Rigorous base-2 logarithms on the fracterval domain.
//!
//! Divergence sums need `log2(n)` for counts up to `2^64 - 1`. Those do not
//! fit `[0, 1)`, so every logarithm is delivered scaled by 1/64: the word
//! `(k << 122) | f` encodes `(k + f / 2^122) / 64`.
//!
//! The fractional bits come from the classic squaring method: square the
//! mantissa `m` in `[1, 2)`; if the square reaches 2, emit a one and halve it.
//! Running it once with every product rounded down and once rounded up
//! brackets the true logarithm, because each bit decision is monotone in `m`.

use std::collections::HashMap;

use crate::fracterval::{FixedWord, FractervalU128};

/// Fractional bits carried by a scaled logarithm.
pub const FRACTION_BITS: u32 = 122;

/// Source of interval-bounded logarithms keyed by raw count.
pub trait LogProvider {
    /// `log2(n) / 64` as a guaranteed-containing fracterval. Zero for `n <= 1`.
    fn log2_scaled(&mut self, n: u64) -> FractervalU128;
}

/// Compute `log2(n) / 64` without caching.
pub fn log2_scaled(n: u64) -> FractervalU128 {
    if n <= 1 {
        return FractervalU128::zero();
    }
    let whole = 63 - n.leading_zeros();
    let mantissa = (n as u128) << (127 - whole);
    let integer = (whole as u128) << FRACTION_BITS;
    FractervalU128::new(
        integer | fraction_bits(mantissa, false),
        integer | fraction_bits(mantissa, true),
    )
}

/// Fraction bits of `log2(m / 2^127)` for a mantissa with its top bit set.
fn fraction_bits(mut m: u128, round_up: bool) -> u128 {
    let mut bits = 0u128;
    for _ in 0..FRACTION_BITS {
        let (hi, lo) = m.mul_wide(m);
        bits <<= 1;
        if hi >> 127 != 0 {
            // m^2 >= 2: keep m^2 / 2, i.e. the high word.
            bits |= 1;
            m = if round_up && lo != 0 { hi + 1 } else { hi };
            continue;
        }
        let floor = (hi << 1) | (lo >> 127);
        if round_up && lo << 1 != 0 {
            match floor.checked_add(1) {
                Some(up) => m = up,
                None => {
                    // Rounded up to exactly 2.
                    bits |= 1;
                    m = 1 << 127;
                }
            }
        } else {
            m = floor;
        }
    }
    bits
}

/// Memoizing [`LogProvider`] backed by [`log2_scaled`].
#[derive(Debug, Default)]
pub struct BinaryLog {
    cache: HashMap<u64, FractervalU128>,
}

impl BinaryLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct keys evaluated so far.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

impl LogProvider for BinaryLog {
    fn log2_scaled(&mut self, n: u64) -> FractervalU128 {
        *self.cache.entry(n).or_insert_with(|| log2_scaled(n))
    }
}
