//! Guaranteed-bounding fixed-point interval arithmetic.
//!
//! A [`Fracterval`] is a pair of words `lo <= hi` on a domain where the word
//! `v` stands for the real number `v / 2^BITS`. It asserts that the true value
//! lies in `[lo / 2^BITS, (hi + 1) / 2^BITS)`. A *fractoid* is the degenerate
//! case `lo == hi`.
//!
//! # Contract
//!
//! - Every primitive returns an interval containing the real-valued result
//!   for any choice of operands inside the input intervals.
//! - Results never leave `[0, MAX]`. A result that would is clipped and the
//!   caller's [`Overflow`] is raised. Operations never fail synchronously.
//! - Division by zero (including 0/0) yields `hi == MAX`, keeping whatever
//!   lower bound is still derivable.
//! - The top word `MAX` also stands for the real value 1 itself, so a
//!   quotient of exactly one saturates there without raising overflow.
//!
//! The `saturating_*` variants are for quantities the caller knows to be in
//! range (a nonnegative difference, a ratio of at most one); they clip
//! without touching the overflow flag.

use std::fmt;
use std::ops::{Add, BitAnd, BitOr, BitOrAssign, Not, Shl, Shr, Sub};

// ---------------------------------------------------------------------------
// Overflow accumulator
// ---------------------------------------------------------------------------

/// Sticky overflow flag threaded through a whole computation.
///
/// Operations only ever raise it; the caller inspects it once at the end.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Overflow(bool);

impl Overflow {
    pub fn new() -> Self {
        Self(false)
    }

    pub fn raise(&mut self) {
        self.0 = true;
    }

    pub fn is_raised(self) -> bool {
        self.0
    }
}

impl BitOrAssign for Overflow {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Fixed-point words
// ---------------------------------------------------------------------------

/// Unsigned machine word usable as a fracterval bound.
pub trait FixedWord:
    Copy
    + Ord
    + Default
    + fmt::Debug
    + fmt::LowerHex
    + Add<Output = Self>
    + Sub<Output = Self>
    + BitAnd<Output = Self>
    + BitOr<Output = Self>
    + Not<Output = Self>
    + Shl<u32, Output = Self>
    + Shr<u32, Output = Self>
{
    const BITS: u32;
    const ZERO: Self;
    const ONE: Self;
    const MAX: Self;

    fn checked_add(self, rhs: Self) -> Option<Self>;
    fn checked_sub(self, rhs: Self) -> Option<Self>;

    /// Full double-width product as `(high, low)`.
    fn mul_wide(self, rhs: Self) -> (Self, Self);

    /// `floor((hi * 2^BITS + lo) / d)` and whether a remainder was left.
    /// Requires `hi < d`, which keeps the quotient within one word.
    fn div_wide(hi: Self, lo: Self, d: Self) -> (Self, bool);

    /// Approximate real value of the word, for display only.
    fn to_unit_f64(self) -> f64;
}

macro_rules! fixed_word_common {
    ($word:ty) => {
        const BITS: u32 = <$word>::BITS;
        const ZERO: Self = 0;
        const ONE: Self = 1;
        const MAX: Self = <$word>::MAX;

        fn checked_add(self, rhs: Self) -> Option<Self> {
            <$word>::checked_add(self, rhs)
        }

        fn checked_sub(self, rhs: Self) -> Option<Self> {
            <$word>::checked_sub(self, rhs)
        }

        fn to_unit_f64(self) -> f64 {
            self as f64 / 2f64.powi(<$word>::BITS as i32)
        }
    };
}

impl FixedWord for u64 {
    fixed_word_common!(u64);

    fn mul_wide(self, rhs: Self) -> (Self, Self) {
        let p = self as u128 * rhs as u128;
        ((p >> 64) as u64, p as u64)
    }

    fn div_wide(hi: Self, lo: Self, d: Self) -> (Self, bool) {
        debug_assert!(hi < d);
        let n = ((hi as u128) << 64) | lo as u128;
        let d = d as u128;
        ((n / d) as u64, n % d != 0)
    }
}

const LOW64: u128 = u64::MAX as u128;

impl FixedWord for u128 {
    fixed_word_common!(u128);

    fn mul_wide(self, rhs: Self) -> (Self, Self) {
        let (a1, a0) = (self >> 64, self & LOW64);
        let (b1, b0) = (rhs >> 64, rhs & LOW64);
        let p00 = a0 * b0;
        let p01 = a0 * b1;
        let p10 = a1 * b0;
        let p11 = a1 * b1;
        let mid = (p00 >> 64) + (p01 & LOW64) + (p10 & LOW64);
        let lo = (p00 & LOW64) | (mid << 64);
        let hi = p11 + (p01 >> 64) + (p10 >> 64) + (mid >> 64);
        (hi, lo)
    }

    fn div_wide(hi: Self, lo: Self, d: Self) -> (Self, bool) {
        debug_assert!(hi < d);
        let mut rem = hi;
        let mut quot = 0u128;
        for bit in (0..128).rev() {
            let carry = rem >> 127;
            rem = (rem << 1) | ((lo >> bit) & 1);
            quot <<= 1;
            // With the carry the shifted remainder is at least 2^128 > d.
            if carry != 0 || rem >= d {
                rem = rem.wrapping_sub(d);
                quot |= 1;
            }
        }
        (quot, rem != 0)
    }
}

// ---------------------------------------------------------------------------
// Fracterval
// ---------------------------------------------------------------------------

/// Guaranteed-containing bound on a fixed-point real in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fracterval<W> {
    lo: W,
    hi: W,
}

pub type FractervalU128 = Fracterval<u128>;
pub type FractervalU64 = Fracterval<u64>;

/// `ceil(p / 2^BITS) - 1` for a double-width product `p = (hi, lo)`, p > 0.
fn ceil_high_minus_one<W: FixedWord>((hi, lo): (W, W)) -> W {
    if lo == W::ZERO { hi - W::ONE } else { hi }
}

impl<W: FixedWord> Fracterval<W> {
    /// Interval from two bounds given in either order.
    pub fn new(a: W, b: W) -> Self {
        if a <= b {
            Self { lo: a, hi: b }
        } else {
            Self { lo: b, hi: a }
        }
    }

    pub fn fractoid(v: W) -> Self {
        Self { lo: v, hi: v }
    }

    pub fn zero() -> Self {
        Self::fractoid(W::ZERO)
    }

    pub fn lo(&self) -> W {
        self.lo
    }

    pub fn hi(&self) -> W {
        self.hi
    }

    pub fn is_fractoid(&self) -> bool {
        self.lo == self.hi
    }

    /// Whether the word `v` lies inside the guaranteed range.
    pub fn contains(&self, v: W) -> bool {
        self.lo <= v && v <= self.hi
    }

    /// Floor-average of the bounds. For reporting only.
    pub fn mean(&self) -> W {
        (self.lo >> 1) + (self.hi >> 1) + (self.lo & self.hi & W::ONE)
    }

    /// The exact ratio `num / den` of two integers.
    pub fn from_ratio(num: W, den: W, overflow: &mut Overflow) -> Self {
        if den == W::ZERO {
            overflow.raise();
            return if num == W::ZERO {
                Self { lo: W::ZERO, hi: W::MAX }
            } else {
                Self::fractoid(W::MAX)
            };
        }
        if num >= den {
            if num > den {
                overflow.raise();
            }
            return Self::fractoid(W::MAX);
        }
        let (q, _) = W::div_wide(num, W::ZERO, den);
        Self::fractoid(q)
    }

    pub fn add(self, rhs: Self, overflow: &mut Overflow) -> Self {
        let Some(lo) = self.lo.checked_add(rhs.lo) else {
            overflow.raise();
            return Self::fractoid(W::MAX);
        };
        let hi = match self
            .hi
            .checked_add(rhs.hi)
            .and_then(|s| s.checked_add(W::ONE))
        {
            Some(hi) => hi,
            None => {
                overflow.raise();
                W::MAX
            }
        };
        Self { lo, hi }
    }

    /// Add an exact fixed-point value.
    pub fn add_word(self, v: W, overflow: &mut Overflow) -> Self {
        let Some(lo) = self.lo.checked_add(v) else {
            overflow.raise();
            return Self::fractoid(W::MAX);
        };
        let hi = self.hi.checked_add(v).unwrap_or_else(|| {
            overflow.raise();
            W::MAX
        });
        Self { lo, hi }
    }

    pub fn subtract(self, rhs: Self, overflow: &mut Overflow) -> Self {
        let (out, clipped) = self.sub_clipped(rhs);
        if clipped {
            overflow.raise();
        }
        out
    }

    /// Subtract where the true difference is known to be nonnegative.
    pub fn saturating_sub(self, rhs: Self) -> Self {
        self.sub_clipped(rhs).0
    }

    fn sub_clipped(self, rhs: Self) -> (Self, bool) {
        let Some(hi) = self.hi.checked_sub(rhs.lo) else {
            return (Self::zero(), true);
        };
        let hi = self.top_minus(rhs.lo, hi);
        match self
            .lo
            .checked_sub(rhs.hi)
            .and_then(|d| d.checked_sub(W::ONE))
        {
            Some(lo) => (Self { lo, hi }, false),
            None => (Self { lo: W::ZERO, hi }, true),
        }
    }

    /// Subtract an exact fixed-point value.
    pub fn subtract_word(self, v: W, overflow: &mut Overflow) -> Self {
        let Some(hi) = self.hi.checked_sub(v) else {
            overflow.raise();
            return Self::zero();
        };
        let hi = self.top_minus(v, hi);
        let lo = self.lo.checked_sub(v).unwrap_or_else(|| {
            overflow.raise();
            W::ZERO
        });
        Self { lo, hi }
    }

    /// Upper bound of `self - v` given `hi = self.hi - v`. When `self.hi` is
    /// `MAX` the minuend may be exactly 1, so the difference may reach
    /// `MAX - v + 1`.
    fn top_minus(self, v: W, hi: W) -> W {
        if self.hi == W::MAX && v != W::ZERO {
            hi + W::ONE
        } else {
            hi
        }
    }

    /// Product of two intervals. Never leaves the domain.
    pub fn multiply(self, rhs: Self) -> Self {
        let lo = self.lo.mul_wide(rhs.lo).0;
        let hi = if self.hi == W::MAX {
            rhs.hi
        } else if rhs.hi == W::MAX {
            self.hi
        } else {
            ceil_high_minus_one((self.hi + W::ONE).mul_wide(rhs.hi + W::ONE))
        };
        Self { lo, hi }
    }

    /// Product with an exact fixed-point value.
    pub fn multiply_word(self, v: W) -> Self {
        if v == W::ZERO {
            return Self::zero();
        }
        let lo = self.lo.mul_wide(v).0;
        let hi = if self.hi == W::MAX {
            v
        } else {
            ceil_high_minus_one((self.hi + W::ONE).mul_wide(v))
        };
        Self { lo, hi: hi.max(lo) }
    }

    pub fn divide(self, rhs: Self, overflow: &mut Overflow) -> Self {
        let (out, clipped) = self.div_clipped(rhs);
        if clipped {
            overflow.raise();
        }
        out
    }

    /// Divide where the true quotient is known not to exceed one.
    pub fn saturating_div(self, rhs: Self) -> Self {
        self.div_clipped(rhs).0
    }

    fn div_clipped(self, rhs: Self) -> (Self, bool) {
        let mut clipped = false;

        // Smallest quotient: lo / (rhs.hi + 1).
        let lo = if rhs.hi == W::MAX {
            self.lo
        } else if self.lo > rhs.hi {
            clipped = true;
            W::MAX
        } else {
            W::div_wide(self.lo, W::ZERO, rhs.hi + W::ONE).0
        };

        // Largest quotient: (hi + 1) / rhs.lo, exclusive.
        let hi = if rhs.lo == W::ZERO || self.hi >= rhs.lo {
            clipped = true;
            W::MAX
        } else if self.hi + W::ONE == rhs.lo {
            W::MAX
        } else {
            let (q, rem) = W::div_wide(self.hi + W::ONE, W::ZERO, rhs.lo);
            if rem { q } else { q - W::ONE }
        };

        (Self { lo, hi }, clipped)
    }

    /// Multiply by `2^n`. Exact unless bits are shifted out.
    pub fn shift_left(self, n: u32, overflow: &mut Overflow) -> Self {
        if n == 0 {
            return self;
        }
        if n >= W::BITS {
            overflow.raise();
            return if self.lo == W::ZERO {
                Self { lo: W::ZERO, hi: W::MAX }
            } else {
                Self::fractoid(W::MAX)
            };
        }
        let spill = W::BITS - n;
        if self.lo >> spill != W::ZERO {
            overflow.raise();
            return Self::fractoid(W::MAX);
        }
        let lo = self.lo << n;
        let hi = if self.hi >> spill != W::ZERO {
            overflow.raise();
            W::MAX
        } else {
            (self.hi << n) | !(W::MAX << n)
        };
        Self { lo, hi }
    }

    /// Divide by `2^n`. Never overflows.
    pub fn shift_right(self, n: u32) -> Self {
        if n == 0 {
            return self;
        }
        // An exact 1 shifts to 2^(BITS - n), one past `MAX >> n`.
        let top = if self.hi == W::MAX { W::ONE } else { W::ZERO };
        if n >= W::BITS {
            return Self { lo: W::ZERO, hi: top };
        }
        Self {
            lo: self.lo >> n,
            hi: (self.hi >> n) + top,
        }
    }

    /// `1 - x`.
    pub fn complement(self) -> Self {
        Self {
            lo: W::MAX - self.hi,
            hi: (W::MAX - self.lo).checked_add(W::ONE).unwrap_or(W::MAX),
        }
    }
}

impl FractervalU128 {
    /// Conservative conversion to the 64-bit domain.
    pub fn narrow(self) -> FractervalU64 {
        Fracterval {
            lo: (self.lo >> 64) as u64,
            hi: (self.hi >> 64) as u64,
        }
    }
}

impl FractervalU64 {
    /// Conservative conversion to the 128-bit domain.
    pub fn widen(self) -> FractervalU128 {
        Fracterval {
            lo: (self.lo as u128) << 64,
            hi: ((self.hi as u128) << 64) | LOW64,
        }
    }
}

impl<W: FixedWord> fmt::Display for Fracterval<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.lo, self.hi)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const HALF: u128 = 1 << 127;
    const QUARTER: u128 = 1 << 126;

    #[test]
    fn test_mul_wide_matches_native() {
        let a = 0xDEAD_BEEF_0123_4567u128;
        let b = 0xFEDC_BA98_7654_3210u128;
        assert_eq!(a.mul_wide(b), (0, a * b));
        assert_eq!(HALF.mul_wide(4), (2, 0));
        assert_eq!(u128::MAX.mul_wide(u128::MAX), (u128::MAX - 1, 1));
    }

    #[test]
    fn test_div_wide_matches_native_for_small_words() {
        let (q, rem) = <u64 as FixedWord>::div_wide(3, 0, 7);
        let n = 3u128 << 64;
        assert_eq!(q as u128, n / 7);
        assert_eq!(rem, n % 7 != 0);

        let (q, rem) = <u128 as FixedWord>::div_wide(1, 0, 2);
        assert_eq!(q, HALF);
        assert!(!rem);
    }

    #[test]
    fn test_add_widens_hi_by_one() {
        let mut ovf = Overflow::new();
        let sum = FractervalU128::fractoid(10).add(FractervalU128::fractoid(20), &mut ovf);
        assert_eq!((sum.lo(), sum.hi()), (30, 31));
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_add_overflow_clips_and_raises() {
        let mut ovf = Overflow::new();
        let sum = FractervalU128::fractoid(HALF).add(FractervalU128::fractoid(HALF), &mut ovf);
        assert_eq!(sum, FractervalU128::fractoid(u128::MAX));
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_add_word_is_exact() {
        let mut ovf = Overflow::new();
        let sum = FractervalU64::new(5, 9).add_word(100, &mut ovf);
        assert_eq!((sum.lo(), sum.hi()), (105, 109));
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_subtract_negative_clips_to_zero() {
        let mut ovf = Overflow::new();
        let diff = FractervalU128::fractoid(3).subtract(FractervalU128::fractoid(50), &mut ovf);
        assert_eq!(diff, FractervalU128::zero());
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_saturating_sub_does_not_raise() {
        let diff = FractervalU128::new(10, 20).saturating_sub(FractervalU128::new(9, 12));
        assert_eq!((diff.lo(), diff.hi()), (0, 11));
    }

    #[test]
    fn test_subtract_word_underflow() {
        let mut ovf = Overflow::new();
        let diff = FractervalU64::new(5, 9).subtract_word(7, &mut ovf);
        assert_eq!((diff.lo(), diff.hi()), (0, 2));
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_divide_by_zero_is_max() {
        let mut ovf = Overflow::new();
        let q = FractervalU128::zero().divide(FractervalU128::zero(), &mut ovf);
        assert_eq!(q.hi(), u128::MAX);
        assert_eq!(q.lo(), 0);
        assert!(ovf.is_raised());

        let mut ovf = Overflow::new();
        let q = FractervalU64::new(5, 9).divide(FractervalU64::zero(), &mut ovf);
        assert_eq!(q.hi(), u64::MAX);
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_divide_keeps_derivable_lower_bound() {
        let mut ovf = Overflow::new();
        let q = FractervalU128::fractoid(QUARTER).divide(FractervalU128::new(0, HALF), &mut ovf);
        assert_eq!(q.hi(), u128::MAX);
        assert!(q.lo() > 0 && q.lo() < u128::MAX);
    }

    #[test]
    fn test_divide_quarter_by_half_contains_half() {
        let mut ovf = Overflow::new();
        let q = FractervalU128::fractoid(QUARTER).divide(FractervalU128::fractoid(HALF), &mut ovf);
        assert!(q.contains(HALF), "{q}");
        assert!(q.hi() - q.lo() < 8);
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_ratio_of_one_saturates_without_overflow() {
        let mut ovf = Overflow::new();
        assert_eq!(
            FractervalU128::from_ratio(7, 7, &mut ovf),
            FractervalU128::fractoid(u128::MAX)
        );
        assert!(!ovf.is_raised());
        FractervalU128::from_ratio(8, 7, &mut ovf);
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_from_ratio_is_floor() {
        let mut ovf = Overflow::new();
        let third = FractervalU64::from_ratio(1, 3, &mut ovf);
        assert!(third.is_fractoid());
        assert_eq!(third.lo(), u64::MAX / 3);
    }

    #[test]
    fn test_shift_left_fills_low_bits_of_hi() {
        let mut ovf = Overflow::new();
        let s = FractervalU64::fractoid(1).shift_left(4, &mut ovf);
        assert_eq!((s.lo(), s.hi()), (16, 31));
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_shift_left_losing_bits_raises() {
        let mut ovf = Overflow::new();
        let s = FractervalU128::fractoid(HALF).shift_left(1, &mut ovf);
        assert_eq!(s, FractervalU128::fractoid(u128::MAX));
        assert!(ovf.is_raised());
    }

    #[test]
    fn test_shift_right_is_floor_on_both_bounds() {
        let s = FractervalU128::new(17, 33).shift_right(4);
        assert_eq!((s.lo(), s.hi()), (1, 2));
    }

    #[test]
    fn test_complement() {
        let c = FractervalU64::new(0, 9).complement();
        assert_eq!((c.lo(), c.hi()), (u64::MAX - 9, u64::MAX));
        let c = FractervalU64::fractoid(10).complement();
        assert_eq!((c.lo(), c.hi()), (u64::MAX - 10, u64::MAX - 9));
    }

    #[test]
    fn test_mean_is_floor_average() {
        assert_eq!(FractervalU128::new(3, 6).mean(), 4);
        assert_eq!(FractervalU128::new(3, 5).mean(), 4);
        assert_eq!(FractervalU128::new(u128::MAX, u128::MAX).mean(), u128::MAX);
    }

    #[test]
    fn test_narrow_then_widen_contains_original() {
        let f = FractervalU128::new(0x1234 << 70, (0x1235 << 70) + 99);
        let w = f.narrow().widen();
        assert!(w.lo() <= f.lo() && f.hi() <= w.hi());
    }

    #[test]
    fn test_multiply_by_max_is_conservative() {
        let p = FractervalU128::fractoid(u128::MAX).multiply(FractervalU128::new(100, 200));
        assert_eq!((p.lo(), p.hi()), (99, 200));
    }

    #[test]
    fn test_multiply_word_zero() {
        assert_eq!(
            FractervalU128::new(5, 70).multiply_word(0),
            FractervalU128::zero()
        );
    }

    #[test]
    fn test_multiply_word_by_one_keeps_word() {
        let mut ovf = Overflow::new();
        let one = FractervalU128::from_ratio(7, 7, &mut ovf);
        let p = one.multiply_word(1000);
        assert!(p.contains(1000), "{p}");
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_one_minus_half_contains_half() {
        let one = FractervalU128::fractoid(u128::MAX);
        let d = one.saturating_sub(FractervalU128::fractoid(HALF));
        assert!(d.contains(HALF), "{d}");
        let mut ovf = Overflow::new();
        let d = one.subtract_word(HALF, &mut ovf);
        assert!(d.contains(HALF), "{d}");
        assert!(!ovf.is_raised());
    }

    #[test]
    fn test_shift_right_of_one() {
        let one = FractervalU128::fractoid(u128::MAX);
        assert!(one.shift_right(1).contains(HALF));
        assert!(one.shift_right(128).contains(1));
        assert_eq!(one.shift_right(0), one);
    }

    #[test]
    fn test_add_past_one_raises() {
        // fractoid(0) stands for [0, 2^-128), so the sum can exceed 1.
        let mut ovf = Overflow::new();
        let s = FractervalU128::fractoid(u128::MAX).add(FractervalU128::zero(), &mut ovf);
        assert_eq!(s, FractervalU128::fractoid(u128::MAX));
        assert!(ovf.is_raised());

        let mut ovf = Overflow::new();
        let s = FractervalU128::fractoid(u128::MAX - 1).add(FractervalU128::zero(), &mut ovf);
        assert_eq!((s.lo(), s.hi()), (u128::MAX - 1, u128::MAX));
        assert!(!ovf.is_raised());
    }

    /// Words weighted toward the edges of the domain, where `MAX` is also 1.
    fn word() -> impl Strategy<Value = u128> {
        prop_oneof![
            Just(0u128),
            Just(1u128),
            Just(HALF),
            Just(u128::MAX - 1),
            Just(u128::MAX),
            any::<u128>(),
        ]
    }

    fn interval() -> impl Strategy<Value = FractervalU128> {
        prop_oneof![
            (word(), word()).prop_map(|(a, b)| FractervalU128::new(a, b)),
            word().prop_map(FractervalU128::fractoid),
        ]
    }

    fn ratio() -> impl Strategy<Value = (u64, u64)> {
        prop_oneof![
            any::<u64>().prop_map(|d| (d, d)),
            (any::<u64>(), any::<u64>()).prop_map(|(a, b)| (a.min(b), a.max(b))),
            (any::<u64>(), any::<u64>()),
        ]
    }

    // Each property checks the result against the extreme corners of the
    // operands: the infimum `lo` and the supremum `hi + 1`, which is attained
    // (as exactly 1) only when `hi == MAX`.
    proptest! {
        #[test]
        fn bounds_stay_ordered(x in interval(), y in interval(), n in 0u32..130) {
            let mut ovf = Overflow::new();
            for r in [
                x.add(y, &mut ovf),
                x.subtract(y, &mut ovf),
                x.saturating_sub(y),
                x.subtract_word(y.lo(), &mut ovf),
                x.multiply(y),
                x.multiply_word(y.lo()),
                x.divide(y, &mut ovf),
                x.saturating_div(y),
                x.shift_left(n, &mut ovf),
                x.shift_right(n),
                x.complement(),
            ] {
                prop_assert!(r.lo() <= r.hi(), "{r}");
            }
        }

        #[test]
        fn add_contains_corners(x in interval(), y in interval()) {
            let mut ovf = Overflow::new();
            let s = x.add(y, &mut ovf);
            if !ovf.is_raised() {
                prop_assert!(s.lo() <= x.lo() + y.lo());
                prop_assert!(s.hi() >= x.hi() + y.hi() + 1);
            }
        }

        #[test]
        fn saturating_sub_contains_corners(x in interval(), y in interval()) {
            let d = x.saturating_sub(y);
            match x.lo().checked_sub(y.hi()).and_then(|g| g.checked_sub(1)) {
                Some(gap) => {
                    prop_assert!(d.lo() <= gap);
                }
                None => {
                    prop_assert_eq!(d.lo(), 0);
                }
            }
            if x.hi() == u128::MAX {
                prop_assert!(d.hi() == u128::MAX || d.hi() > u128::MAX - y.lo(), "{d}");
            } else if x.hi() >= y.lo() {
                prop_assert!(d.hi() >= x.hi() - y.lo());
            }
        }

        #[test]
        fn subtract_flags_only_negative_corners(x in interval(), y in interval()) {
            let mut ovf = Overflow::new();
            let d = x.subtract(y, &mut ovf);
            prop_assert_eq!(d, x.saturating_sub(y));
            prop_assert_eq!(ovf.is_raised(), x.lo() <= y.hi());
        }

        #[test]
        fn subtract_word_contains_corners(x in interval(), v in word()) {
            let mut ovf = Overflow::new();
            let d = x.subtract_word(v, &mut ovf);
            if x.lo() >= v {
                prop_assert!(!ovf.is_raised());
                prop_assert!(d.lo() <= x.lo() - v);
            }
            if x.hi() == u128::MAX {
                prop_assert!(d.hi() == u128::MAX || d.hi() > u128::MAX - v, "{d}");
            } else if x.hi() >= v {
                prop_assert!(d.hi() >= x.hi() - v);
            }
        }

        #[test]
        fn multiply_contains_corners(x in interval(), y in interval()) {
            let p = x.multiply(y);
            prop_assert!(p.lo() <= x.lo().mul_wide(y.lo()).0);
            match (x.hi() == u128::MAX, y.hi() == u128::MAX) {
                (true, true) => {
                    prop_assert_eq!(p.hi(), u128::MAX);
                }
                (true, false) => {
                    prop_assert!(p.hi() >= y.hi());
                }
                (false, true) => {
                    prop_assert!(p.hi() >= x.hi());
                }
                (false, false) => {
                    let top = (x.hi() + 1).mul_wide(y.hi() + 1);
                    prop_assert!(p.hi() == u128::MAX || (p.hi() + 1, 0) >= top, "{p}");
                }
            }
        }

        #[test]
        fn multiply_word_contains_corners(x in interval(), v in word()) {
            let p = x.multiply_word(v);
            prop_assert!(p.lo() <= x.lo().mul_wide(v).0);
            if p.hi() < u128::MAX {
                if x.hi() == u128::MAX {
                    prop_assert!(p.hi() >= v, "{p}");
                } else {
                    prop_assert!((p.hi() + 1, 0) >= (x.hi() + 1).mul_wide(v), "{p}");
                }
            }
        }

        #[test]
        fn from_ratio_contains_quotient((num, den) in ratio()) {
            let mut ovf = Overflow::new();
            let q = FractervalU128::from_ratio(num as u128, den as u128, &mut ovf);
            if den == 0 || num > den {
                prop_assert!(ovf.is_raised());
                prop_assert_eq!(q.hi(), u128::MAX);
            } else {
                prop_assert!(!ovf.is_raised());
                prop_assert!(q.lo().mul_wide(den as u128) <= (num as u128, 0));
                if q.hi() < u128::MAX {
                    prop_assert!((q.hi() + 1).mul_wide(den as u128) > (num as u128, 0));
                } else {
                    prop_assert_eq!(num, den);
                }
            }
        }

        #[test]
        fn divide_brackets_dividend(x in interval(), y in interval()) {
            let mut ovf = Overflow::new();
            let q = x.divide(y, &mut ovf);
            if !ovf.is_raised() {
                if y.hi() < u128::MAX {
                    prop_assert!(q.lo().mul_wide(y.hi() + 1) <= (x.lo(), 0));
                }
                if q.hi() < u128::MAX {
                    prop_assert!((q.hi() + 1).mul_wide(y.lo()) >= (x.hi() + 1, 0));
                }
            }
        }

        #[test]
        fn saturating_div_contains_quotients_up_to_one(x in interval(), y in interval()) {
            let q = x.saturating_div(y);
            if y.hi() == u128::MAX {
                prop_assert!(q.lo() <= x.lo());
            } else if x.lo() <= y.hi() {
                prop_assert!(q.lo().mul_wide(y.hi() + 1) <= (x.lo(), 0));
            }
            if q.hi() < u128::MAX {
                prop_assert!((q.hi() + 1).mul_wide(y.lo()) >= (x.hi() + 1, 0));
            }
        }

        #[test]
        fn shift_left_contains_corners(x in interval(), n in 0u32..130) {
            let mut ovf = Overflow::new();
            let s = x.shift_left(n, &mut ovf);
            if !ovf.is_raised() {
                let scale = 1u128 << n;
                prop_assert!((0, s.lo()) <= x.lo().mul_wide(scale));
                if s.hi() < u128::MAX {
                    prop_assert!((0, s.hi() + 1) >= (x.hi() + 1).mul_wide(scale));
                }
            }
        }

        #[test]
        fn shift_right_contains_corners(x in interval(), n in 1u32..130) {
            let s = x.shift_right(n);
            if n < 128 {
                prop_assert!(s.lo().mul_wide(1 << n) <= (0, x.lo()));
                if x.hi() == u128::MAX {
                    prop_assert!(s.hi() >= 1 << (128 - n), "{s}");
                } else {
                    prop_assert!((s.hi() + 1).mul_wide(1 << n) >= (0, x.hi() + 1));
                }
            } else {
                prop_assert_eq!(s.lo(), 0);
                if x.hi() == u128::MAX && n == 128 {
                    prop_assert!(s.hi() >= 1);
                }
            }
        }

        #[test]
        fn complement_contains_corners(x in interval()) {
            let c = x.complement();
            prop_assert!(c.lo() <= u128::MAX - x.hi());
            prop_assert!(c.hi() == u128::MAX || c.hi() > u128::MAX - x.lo(), "{c}");
        }

        #[test]
        fn narrow_is_conservative(x in interval()) {
            let n = x.narrow().widen();
            prop_assert!(n.lo() <= x.lo() && x.hi() <= n.hi());
        }
    }
}
