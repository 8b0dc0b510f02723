//! Utility types and functions.
//!
//! - [`Error`] / [`Result`] - Error handling
//! - Math re-exports from glam plus Euler and affine decomposition

mod error;
mod math;

pub use error::*;
pub use math::*;
