//! Utilities for working with floating-point numbers that want to have true equality in
//! ℝ ∪ {±∞, NaN}.
//!
//! In particular, the functions in this module will treat `±0.0` as indistinguishable and all
//! NaNs as equal only to each other.

use std::hash::{Hash as _, Hasher};

/// Compares two [`f64`]s for equality such that all `NaN`s are considered equal.  This is
/// reflexive and so can be used to implement [`Eq`].
///
/// This equality function is compatible with using [`hash`] as a hash function.
///
/// Notes:
/// * This function, like ordinary `f64` equality, equates `+0.0` and `-0.0`.
/// * This function, *un*like ordinary `f64` equality, equates all `NaN`s.
#[inline]
pub(crate) fn eq(left: f64, right: f64) -> bool {
    left == right || left.is_nan() && right.is_nan()
}

/// Hashes an [`f64`] such that all `NaN`s are considered equal.
///
/// This hash function is compatible with using [`eq`] as an equality function.
///
/// Notes:
/// * This function hashes `+0.0` and `-0.0` to the same value.
/// * This function hashes all `NaN`s to the same value.
#[inline]
pub(crate) fn hash<H: Hasher>(value: f64, state: &mut H) {
    let value = if value == 0.0f64 {
        // `+0.0` and `-0.0` have different bits, but compare equal; we thus hash the bit form of
        // `+0.0` for both, so that `hash(+0.0)` == `hash(-0.0)`.
        0.0f64
    } else if value.is_nan() {
        // There are many different NaNs, and this function wants to support equating them all, so
        // we just hash the standard NaN.
        f64::NAN
    } else {
        value
    };

    value.to_bits().hash(state)
}
