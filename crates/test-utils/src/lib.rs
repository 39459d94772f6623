//! Shared test utilities for the gridmath workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Deterministic grid data generators
//! - Grid shapes, storage formats and grid builders
//! - Approximate comparison macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your integration tests:
//!
//! ```ignore
//! use test_utils::{fixtures, generators, assert_approx_eq};
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{empty_memory_grid, formats, memory_grid, shapes, zarr_grid, zarr_store};
pub use generators::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro asserting two grids of doubles are identical bit for bit, NaN
/// payloads included.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_bits_eq;
///
/// assert_bits_eq!(&[1.0, f64::NAN], &[1.0, f64::NAN]);
/// ```
#[macro_export]
macro_rules! assert_bits_eq {
    ($left:expr, $right:expr) => {{
        let left: &[f64] = $left;
        let right: &[f64] = $right;
        assert_eq!(left.len(), right.len(), "grid lengths differ");
        for (i, (l, r)) in left.iter().zip(right).enumerate() {
            if l.to_bits() != r.to_bits() {
                panic!(
                    "assertion failed: grids differ at cell {}\n  left: `{:?}`,\n right: `{:?}`",
                    i, l, r
                );
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_bits_eq_accepts_nan() {
        assert_bits_eq!(&[1.0, f64::NAN], &[1.0, f64::NAN]);
    }

    #[test]
    #[should_panic(expected = "grids differ at cell 1")]
    fn test_assert_bits_eq_fails() {
        assert_bits_eq!(&[1.0, 2.0], &[1.0, 2.5]);
    }
}
