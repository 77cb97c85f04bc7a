//! Shared test utilities for the grib2-bridge workspace.
//!
//! - [`Grib2Builder`] writes synthetic GRIB2 messages with known contents
//! - [`CountingAllocator`] tracks live heap usage and injects allocation failures
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```

pub mod counting_alloc;
pub mod grib2_builder;

pub use counting_alloc::{
    allocation_calls, allocation_failure_pending, clear_allocation_failure, fail_nth_allocation, snapshot,
    AllocationSnapshot, CountingAllocator,
};
pub use grib2_builder::{concat_messages, BitmapSpec, FieldSpec, Grib2Builder, GridSpec};

/// Macro for approximate floating-point equality assertions.
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

/// Assert that two value slices match element-wise within `epsilon`.
#[macro_export]
macro_rules! assert_values_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = &$left;
        let right = &$right;
        assert_eq!(left.len(), right.len(), "value counts differ");
        for (i, (l, r)) in left.iter().zip(right.iter()).enumerate() {
            let diff = (*l as f64 - *r as f64).abs();
            if diff > $epsilon as f64 {
                panic!("values differ at index {}: {} vs {} (epsilon {})", i, l, r, $epsilon);
            }
        }
    }};
}
