//! Polyphase IIR half-band filters: coefficient synthesis and lane kernels

mod design;
mod filter;

pub use design::{compute_coefficients, frequency_response, group_delay};
pub use filter::{Direction, Down, Downsample2x, HalfbandFilter, Up, Upsample2x};
