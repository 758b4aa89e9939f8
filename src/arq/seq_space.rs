//! Wrap-around comparisons for 32-bit sequence numbers.
//!
//! Two numbers are ordered by the shorter way around the circle, which is
//! unambiguous as long as they are less than `u32::MAX / 2` apart. The
//! window is capped far below that.

/// `true` when `a` comes strictly before `b`.
#[inline]
pub fn is_before(a: u32, b: u32) -> bool {
    let diff = b.wrapping_sub(a);
    diff != 0 && diff <= u32::MAX / 2
}

/// How far `seq` is ahead of `base`, modulo 2^32.
#[inline]
pub fn distance(base: u32, seq: u32) -> u32 {
    seq.wrapping_sub(base)
}
