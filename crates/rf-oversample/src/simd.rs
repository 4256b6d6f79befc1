//! SIMD capability detection and lane-width table
//!
//! Detection happens once at startup; the result is passed explicitly through
//! configuration so the channel→lane grouping never depends on global state.
//!
//! Lane kernels are written over `[f64; W]` frames, so every width is
//! available on every target; the detected level only decides which widths
//! are worth grouping channels into.

use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Detected SIMD capability level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SimdLevel {
    /// No SIMD, scalar fallback
    Scalar = 0,
    /// SSE4.2 (128-bit, 2 f64s)
    Sse42 = 1,
    /// AVX2 (256-bit, 4 f64s)
    Avx2 = 2,
    /// AVX-512 (512-bit, 8 f64s)
    Avx512 = 3,
    /// ARM NEON (128-bit, 2 f64s)
    Neon = 4,
}

/// Lane widths, widest first. Width 2 is always present.
const WIDTHS_X8: &[usize] = &[8, 4, 2];
const WIDTHS_X4: &[usize] = &[4, 2];
const WIDTHS_X2: &[usize] = &[2];

impl SimdLevel {
    /// Get the SIMD width in f64 elements
    pub const fn width(self) -> usize {
        match self {
            SimdLevel::Scalar => 1,
            SimdLevel::Sse42 | SimdLevel::Neon => 2,
            SimdLevel::Avx2 => 4,
            SimdLevel::Avx512 => 8,
        }
    }

    /// Get human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            SimdLevel::Scalar => "Scalar",
            SimdLevel::Sse42 => "SSE4.2",
            SimdLevel::Avx2 => "AVX2",
            SimdLevel::Avx512 => "AVX-512",
            SimdLevel::Neon => "NEON",
        }
    }

    /// Lane widths used for channel grouping, widest first.
    pub const fn lane_widths(self) -> &'static [usize] {
        match self {
            SimdLevel::Avx512 => WIDTHS_X8,
            SimdLevel::Avx2 => WIDTHS_X4,
            SimdLevel::Scalar | SimdLevel::Sse42 | SimdLevel::Neon => WIDTHS_X2,
        }
    }
}

impl Default for SimdLevel {
    fn default() -> Self {
        detect_simd_level()
    }
}

/// Global SIMD level detection (computed once)
static DETECTED_SIMD_LEVEL: OnceLock<SimdLevel> = OnceLock::new();

/// Detect the best available SIMD level
pub fn detect_simd_level() -> SimdLevel {
    *DETECTED_SIMD_LEVEL.get_or_init(|| {
        #[cfg(target_arch = "x86_64")]
        {
            if is_x86_feature_detected!("avx512f") && is_x86_feature_detected!("avx512dq") {
                return SimdLevel::Avx512;
            }
            if is_x86_feature_detected!("avx2") && is_x86_feature_detected!("fma") {
                return SimdLevel::Avx2;
            }
            if is_x86_feature_detected!("sse4.2") {
                return SimdLevel::Sse42;
            }
            SimdLevel::Scalar
        }

        #[cfg(target_arch = "aarch64")]
        {
            // NEON is always available on aarch64
            SimdLevel::Neon
        }

        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            SimdLevel::Scalar
        }
    })
}
