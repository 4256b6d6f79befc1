//! Oversampling engine configuration

use crate::cascade::IirConfig;
use crate::fft_resampler::Ratio;
use crate::fir::{DEFAULT_FIR_TRANSITION, FirConfig};
use crate::simd::SimdLevel;
use rf_core::{MAX_OVERSAMPLING_ORDER, RfError, RfResult};
use serde::{Deserialize, Serialize};

/// Filter family used for both directions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Family {
    /// Cascaded half-band allpass filters: minimum latency, non-linear phase
    #[default]
    Iir,
    /// FFT overlap-add resampling: linear phase, block latency
    Fir,
}

/// Complete oversampling setup, as stored in presets
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OversamplingConfig {
    #[serde(default)]
    pub family: Family,
    /// Channels processed per call
    #[serde(default = "default_num_channels")]
    pub num_channels: usize,
    /// Largest base-rate block per call
    #[serde(default = "default_max_block_size")]
    pub max_block_size: usize,
    /// Highest selectable order (factor 2^max_order)
    #[serde(default = "default_max_order")]
    pub max_order: usize,
    /// Initially active order
    #[serde(default = "default_order")]
    pub order: usize,
    /// Half-band stopband attenuation (dB)
    #[serde(default = "default_attenuation")]
    pub attenuation_db: f64,
    /// Half-band transition of the first stage, relative to its output rate
    #[serde(default = "default_iir_transition")]
    pub transition: f64,
    /// FFT resampler transition, relative to the base rate
    #[serde(default = "default_fir_transition")]
    pub fir_transition: f64,
    /// Largest chunk handed to each FFT engine
    #[serde(default = "default_fft_block_size")]
    pub fft_block_size: usize,
    /// Lane grouping; detected at startup when absent
    #[serde(default)]
    pub simd: SimdLevel,
}

fn default_num_channels() -> usize {
    2
}

fn default_max_block_size() -> usize {
    512
}

fn default_max_order() -> usize {
    3
}

fn default_order() -> usize {
    1
}

fn default_attenuation() -> f64 {
    100.0
}

fn default_iir_transition() -> f64 {
    0.1
}

fn default_fir_transition() -> f64 {
    DEFAULT_FIR_TRANSITION
}

fn default_fft_block_size() -> usize {
    512
}

impl Default for OversamplingConfig {
    fn default() -> Self {
        Self {
            family: Family::default(),
            num_channels: default_num_channels(),
            max_block_size: default_max_block_size(),
            max_order: default_max_order(),
            order: default_order(),
            attenuation_db: default_attenuation(),
            transition: default_iir_transition(),
            fir_transition: default_fir_transition(),
            fft_block_size: default_fft_block_size(),
            simd: SimdLevel::default(),
        }
    }
}

impl OversamplingConfig {
    pub fn validate(&self) -> RfResult<()> {
        if self.num_channels == 0 {
            return Err(RfError::InvalidParam("channel count must be at least 1".into()));
        }
        if self.max_block_size == 0 || self.fft_block_size == 0 {
            return Err(RfError::InvalidParam("block sizes must be at least 1".into()));
        }
        if self.max_order == 0 || self.max_order > MAX_OVERSAMPLING_ORDER {
            return Err(RfError::OrderOutOfRange {
                order: self.max_order,
                min: 1,
                max: MAX_OVERSAMPLING_ORDER,
            });
        }
        if self.order == 0 || self.order > self.max_order {
            return Err(RfError::OrderOutOfRange {
                order: self.order,
                min: 1,
                max: self.max_order,
            });
        }
        if !(self.attenuation_db > 0.0) {
            return Err(RfError::InvalidParam(format!(
                "attenuation must be positive, got {}",
                self.attenuation_db
            )));
        }
        if !(self.transition > 0.0 && self.transition < 0.5) {
            return Err(RfError::InvalidParam(format!(
                "half-band transition must lie in ]0, 0.5[, got {}",
                self.transition
            )));
        }
        if !(self.fir_transition > 0.0 && self.fir_transition < 0.25) {
            return Err(RfError::InvalidParam(format!(
                "FIR transition must lie in ]0, 0.25[, got {}",
                self.fir_transition
            )));
        }
        Ok(())
    }

    /// Half-band cascade setup shared by both directions
    pub fn iir_config(&self) -> IirConfig {
        IirConfig {
            num_channels: self.num_channels,
            max_block_size: self.max_block_size,
            max_order: self.max_order,
            attenuation_db: self.attenuation_db,
            transition: self.transition,
            simd: self.simd,
        }
    }

    /// FFT resampler setup for one direction at one ratio
    pub fn fir_config(&self, ratio: Ratio, max_block_size: usize, max_required: usize) -> FirConfig {
        FirConfig {
            num_channels: self.num_channels,
            max_block_size,
            fft_block_size: self.fft_block_size,
            transition: self.fir_transition,
            ratio,
            max_required,
            upstream_lag: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        OversamplingConfig::default().validate().unwrap();
    }

    #[test]
    fn test_validation() {
        let base = OversamplingConfig::default();
        let bad = [
            OversamplingConfig { num_channels: 0, ..base.clone() },
            OversamplingConfig { max_order: 6, ..base.clone() },
            OversamplingConfig { order: 4, ..base.clone() },
            OversamplingConfig { order: 0, ..base.clone() },
            OversamplingConfig { transition: 0.5, ..base.clone() },
            OversamplingConfig { fir_transition: 0.3, ..base.clone() },
            OversamplingConfig { attenuation_db: f64::NAN, ..base.clone() },
        ];
        for config in &bad {
            assert!(config.validate().is_err(), "{config:?}");
        }
        assert!(matches!(
            bad[2].validate(),
            Err(RfError::OrderOutOfRange { order: 4, min: 1, max: 3 })
        ));
    }

    #[test]
    fn test_iir_config_carries_fields() {
        let config = OversamplingConfig {
            num_channels: 5,
            max_order: 4,
            simd: SimdLevel::Avx2,
            ..OversamplingConfig::default()
        };
        let iir = config.iir_config();
        assert_eq!(iir.num_channels, 5);
        assert_eq!(iir.max_order, 4);
        assert_eq!(iir.simd, SimdLevel::Avx2);
    }
}
