//! Oversampling engine: up → high-rate processing → down
//!
//! Wraps one up path and one down path of the same family, plus the
//! high-rate scratch the caller's processor runs on. Base-rate blocks come
//! back at exactly their input length for both families.

use crate::cascade::{IirDownsampler, IirUpsampler};
use crate::config::{Family, OversamplingConfig};
use crate::fft_resampler::Ratio;
use crate::fir::{FirConfig, FirDownsampler, FirUpsampler};
use crate::handoff::OrderSelector;
use crate::switcher::OrderSwitch;
use rf_core::{
    ChannelBuffer, Channels, ChannelsMut, ContractViolation, RfResult, Sample, contract_violation,
    factor_for_order,
};

/// The high-rate signal handed to the processor: the first `num_channels`
/// channels of the scratch buffer, each `len()` samples long.
pub struct HighRateBlock<'a> {
    buffer: &'a mut ChannelBuffer,
    num_channels: usize,
    len: usize,
}

impl HighRateBlock<'_> {
    /// Samples per channel in this block
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Channels for HighRateBlock<'_> {
    #[inline]
    fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    fn channel(&self, index: usize) -> &[Sample] {
        &self.buffer.channel(index)[..self.len]
    }
}

impl ChannelsMut for HighRateBlock<'_> {
    #[inline]
    fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        &mut self.buffer.channel_mut(index)[..self.len]
    }
}

enum Paths {
    Iir {
        up: IirUpsampler,
        down: IirDownsampler,
    },
    Fir {
        up: OrderSwitch<FirUpsampler>,
        down: OrderSwitch<FirDownsampler>,
    },
}

pub struct OversamplingEngine {
    config: OversamplingConfig,
    paths: Paths,
    high: ChannelBuffer,
}

impl OversamplingEngine {
    pub fn new(config: &OversamplingConfig) -> RfResult<Self> {
        if let Err(e) = config.validate() {
            log::warn!("OversamplingEngine: rejected configuration: {e}");
            return Err(e);
        }

        let (paths, high_capacity) = match config.family {
            Family::Iir => {
                let iir = config.iir_config();
                let mut up = IirUpsampler::new(&iir)?;
                let mut down = IirDownsampler::new(&iir)?;
                up.set_order(config.order)?;
                down.set_order(config.order)?;
                let capacity = config.max_block_size * factor_for_order(config.max_order);
                (Paths::Iir { up, down }, capacity)
            }
            Family::Fir => {
                let max_block = config.max_block_size;
                let up = OrderSwitch::build(config.max_order, |order| {
                    let ratio = Ratio::upsample(factor_for_order(order))?;
                    FirUpsampler::new(&config.fir_config(ratio, max_block, max_block))
                })?;
                let high_len = |order: usize| up.get(order).map_or(0, |u| u.max_output_len(max_block));
                let lag = |order: usize| up.get(order).map_or(0, FirUpsampler::max_output_lag);
                let capacity = (1..=config.max_order).map(high_len).max().unwrap_or(0);
                let mut down = OrderSwitch::build(config.max_order, |order| {
                    let ratio = Ratio::downsample(factor_for_order(order))?;
                    FirDownsampler::new(&FirConfig {
                        upstream_lag: lag(order),
                        ..config.fir_config(ratio, high_len(order), max_block)
                    })
                })?;
                let mut up = up;
                up.set_order(config.order)?;
                down.set_order(config.order)?;
                (Paths::Fir { up, down }, capacity)
            }
        };

        log::debug!(
            "OversamplingEngine: {:?}, {} channels, max block {}, order {}/{}, high-rate capacity {}",
            config.family,
            config.num_channels,
            config.max_block_size,
            config.order,
            config.max_order,
            high_capacity,
        );

        Ok(Self {
            config: config.clone(),
            paths,
            high: ChannelBuffer::new(config.num_channels, high_capacity),
        })
    }

    /// Rebuild for a new configuration. Control thread.
    pub fn configure(&mut self, config: &OversamplingConfig) -> RfResult<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn config(&self) -> &OversamplingConfig {
        &self.config
    }

    pub fn family(&self) -> Family {
        self.config.family
    }

    pub fn max_order(&self) -> usize {
        self.config.max_order
    }

    pub fn order(&self) -> usize {
        match &self.paths {
            Paths::Iir { up, .. } => up.order(),
            Paths::Fir { up, .. } => up.order(),
        }
    }

    #[inline]
    pub fn factor(&self) -> usize {
        factor_for_order(self.order())
    }

    /// Switch both directions to `order`. Never allocates.
    pub fn set_order(&mut self, order: usize) -> RfResult<()> {
        match &mut self.paths {
            Paths::Iir { up, down } => {
                up.set_order(order)?;
                down.set_order(order)
            }
            Paths::Fir { up, down } => {
                up.set_order(order)?;
                down.set_order(order)
            }
        }
    }

    /// Apply the order published on `selector`. Returns `true` on a switch.
    pub fn sync(&mut self, selector: &OrderSelector) -> RfResult<bool> {
        let order = selector.get();
        if order == self.order() {
            return Ok(false);
        }
        self.set_order(order)?;
        Ok(true)
    }

    pub fn reset(&mut self) {
        match &mut self.paths {
            Paths::Iir { up, down } => {
                up.reset();
                down.reset();
            }
            Paths::Fir { up, down } => {
                up.reset();
                down.reset();
            }
        }
        self.high.clear();
    }

    /// Round-trip latency in base-rate samples: group delay at DC for the
    /// half-band family. For the FFT family the up path adds no delay of its
    /// own (its lag is part of the down-sampler's cushion), so the delay is
    /// exactly the cushion.
    pub fn latency(&self) -> f64 {
        match &self.paths {
            Paths::Iir { up, down } => up.latency() + down.latency(),
            Paths::Fir { down, .. } => down.active().latency(),
        }
    }

    /// Oversample `num_samples` of every channel in `block`, run `processor`
    /// on the high-rate signal and write the down-sampled result back into
    /// `block`.
    pub fn process<C, F>(&mut self, block: &mut C, num_samples: usize, mut processor: F) -> RfResult<()>
    where
        C: ChannelsMut + ?Sized,
        F: FnMut(&mut HighRateBlock<'_>),
    {
        let num_channels = block.num_channels();
        if num_channels > self.config.num_channels {
            return Err(contract_violation(ContractViolation::TooManyChannels {
                got: num_channels,
                max: self.config.num_channels,
            }));
        }

        let len = match &mut self.paths {
            Paths::Iir { up, .. } => up.process_block(&*block, &mut self.high, num_samples)?,
            Paths::Fir { up, .. } => {
                up.active_mut()
                    .process_block(&*block, &mut self.high, num_samples)?
            }
        };

        let mut high = HighRateBlock {
            buffer: &mut self.high,
            num_channels,
            len,
        };
        processor(&mut high);

        match &mut self.paths {
            Paths::Iir { down, .. } => down.process_block(&high, block, len)?,
            Paths::Fir { down, .. } => {
                down.active_mut()
                    .process_block(&high, block, len, num_samples)?
            }
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simd::SimdLevel;
    use approx::assert_abs_diff_eq;

    fn config(family: Family) -> OversamplingConfig {
        OversamplingConfig {
            family,
            num_channels: 2,
            max_block_size: 256,
            max_order: 3,
            order: 2,
            simd: SimdLevel::Scalar,
            ..OversamplingConfig::default()
        }
    }

    #[test]
    fn test_processor_sees_high_rate_block() {
        let mut engine = OversamplingEngine::new(&config(Family::Iir)).unwrap();
        let mut block = vec![vec![0.0; 256]; 2];
        let mut seen = (0, 0);
        engine
            .process(&mut block, 256, |high| seen = (high.num_channels(), high.len()))
            .unwrap();
        assert_eq!(seen, (2, 1024));
    }

    #[test]
    fn test_order_switching() {
        for family in [Family::Iir, Family::Fir] {
            let mut engine = OversamplingEngine::new(&config(family)).unwrap();
            assert_eq!(engine.order(), 2);
            assert_eq!(engine.factor(), 4);
            engine.set_order(3).unwrap();
            assert_eq!(engine.factor(), 8);
            assert!(engine.set_order(4).is_err());
            assert_eq!(engine.order(), 3);

            let selector = OrderSelector::new(1);
            assert!(engine.sync(&selector).unwrap());
            assert_eq!(engine.order(), 1);
        }
    }

    #[test]
    fn test_fir_blocks_keep_length() {
        let mut engine = OversamplingEngine::new(&config(Family::Fir)).unwrap();
        let mut block = vec![vec![0.5; 256]; 2];
        for _ in 0..12 {
            engine.process(&mut block, 256, |_| {}).unwrap();
            for ch in &mut block {
                assert_eq!(ch.len(), 256);
                ch.fill(0.5);
            }
        }
        engine.process(&mut block, 256, |_| {}).unwrap();
        for &s in &block[1] {
            assert_abs_diff_eq!(s, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_gain_in_processor_scales_output() {
        let mut engine = OversamplingEngine::new(&config(Family::Iir)).unwrap();
        let mut block = vec![vec![1.0; 256]; 2];
        for _ in 0..8 {
            for ch in &mut block {
                ch.fill(1.0);
            }
            engine
                .process(&mut block, 256, |high| {
                    for ch in 0..high.num_channels() {
                        for s in high.channel_mut(ch) {
                            *s *= 0.5;
                        }
                    }
                })
                .unwrap();
        }
        for &s in &block[0] {
            assert_abs_diff_eq!(s, 0.5, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_latency_positive_for_both_families() {
        let iir = OversamplingEngine::new(&config(Family::Iir)).unwrap();
        let fir = OversamplingEngine::new(&config(Family::Fir)).unwrap();
        assert!(iir.latency() > 0.0);
        assert!(fir.latency() > iir.latency());
    }
}
