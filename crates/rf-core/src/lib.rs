//! rf-core: Shared types, traits, and utilities for ReelForge oversampling
//!
//! This crate provides the foundational types used by the resampling crates:
//! the sample type, planar channel buffers and views, and the error model.

mod error;
mod sample;

pub use error::*;
pub use sample::*;

/// Highest supported oversampling order (factor 2^5 = 32)
pub const MAX_OVERSAMPLING_ORDER: usize = 5;

/// Oversampling factor for an order
#[inline]
pub const fn factor_for_order(order: usize) -> usize {
    1 << order
}
