//! Multi-channel FFT resampling
//!
//! [`FirUpsampler`] forwards whatever the per-channel engines produce.
//! [`FirDownsampler`] keeps a per-channel carry-over so that every call
//! returns exactly the requested number of samples. The carry-over starts
//! with a fixed cushion of zeros covering the worst-case burst lag of the
//! engines (and of an upstream converter), so once the cushion has played
//! out the stream never underflows and the delay stays constant.

use crate::fft_resampler::{FftResampler, Ratio, ResamplerPlan};
use crate::{BlockRequest, Resampler};
use rf_core::{
    ChannelBuffer, Channels, ChannelsMut, ContractViolation, RfError, RfResult, Sample,
    contract_violation,
};
use std::sync::Arc;

/// Default transition band relative to the lower sample rate
pub const DEFAULT_FIR_TRANSITION: f64 = 0.05;

#[derive(Debug, Clone, PartialEq)]
pub struct FirConfig {
    pub num_channels: usize,
    /// Largest input block per call
    pub max_block_size: usize,
    /// Largest chunk handed to an engine at once
    pub fft_block_size: usize,
    /// Transition band relative to the lower of the two rates
    pub transition: f64,
    pub ratio: Ratio,
    /// Largest `required` count (down-sampler only)
    pub max_required: usize,
    /// Worst-case lag of the input stream behind the required counts, in
    /// output samples; [`FirUpsampler::max_output_lag`] of the converter
    /// feeding this one (down-sampler only)
    pub upstream_lag: usize,
}

impl Default for FirConfig {
    fn default() -> Self {
        Self {
            num_channels: 2,
            max_block_size: 512,
            fft_block_size: 512,
            transition: DEFAULT_FIR_TRANSITION,
            ratio: Ratio::DOUBLE,
            max_required: 512,
            upstream_lag: 0,
        }
    }
}

impl FirConfig {
    pub fn validate(&self) -> RfResult<()> {
        if self.num_channels == 0 {
            return Err(RfError::InvalidParam("channel count must be at least 1".into()));
        }
        if self.max_block_size == 0 || self.fft_block_size == 0 || self.max_required == 0 {
            return Err(RfError::InvalidParam(format!(
                "block sizes must be positive (max block {}, fft block {}, max required {})",
                self.max_block_size, self.fft_block_size, self.max_required
            )));
        }
        Ok(())
    }
}

/// Shared plan plus one engine per channel.
#[derive(Debug)]
struct Engines {
    plan: Arc<ResamplerPlan>,
    channels: Vec<FftResampler>,
}

impl Engines {
    fn new(config: &FirConfig, name: &str) -> RfResult<Self> {
        if let Err(e) = config.validate() {
            log::warn!("{name}: rejected configuration: {e}");
            return Err(e);
        }
        let plan = ResamplerPlan::new(config.ratio, config.transition)?;
        let channels = (0..config.num_channels)
            .map(|_| FftResampler::new(Arc::clone(&plan), config.fft_block_size))
            .collect();
        log::debug!(
            "{name}: {} channels, ratio {}, max block {}, fft block {}, frames {} -> {}",
            config.num_channels,
            config.ratio,
            config.max_block_size,
            config.fft_block_size,
            plan.frame_in(),
            plan.frame_out(),
        );
        Ok(Self { plan, channels })
    }

    fn clear(&mut self) {
        for engine in &mut self.channels {
            engine.clear();
        }
    }
}

fn check_block<I, O>(
    config: &FirConfig,
    input: &I,
    output: &O,
    num_samples: usize,
    out_len: usize,
) -> RfResult<usize>
where
    I: Channels + ?Sized,
    O: Channels + ?Sized,
{
    let channels = input.num_channels();
    if channels > config.num_channels || output.num_channels() < channels {
        return Err(contract_violation(ContractViolation::TooManyChannels {
            got: channels,
            max: config.num_channels.min(output.num_channels()),
        }));
    }
    if num_samples > config.max_block_size {
        return Err(contract_violation(ContractViolation::BlockTooLarge {
            got: num_samples,
            max: config.max_block_size,
        }));
    }
    let available = input.min_len(channels);
    if available < num_samples {
        return Err(contract_violation(ContractViolation::BufferTooSmall {
            needed: num_samples,
            available,
        }));
    }
    let available = output.min_len(channels);
    if available < out_len {
        return Err(contract_violation(ContractViolation::BufferTooSmall {
            needed: out_len,
            available,
        }));
    }
    Ok(channels)
}

fn check_same_count(first: Option<usize>, count: usize) -> RfResult<usize> {
    match first {
        Some(first) if first != count => Err(contract_violation(
            ContractViolation::ChannelLengthMismatch {
                first,
                other: count,
            },
        )),
        _ => Ok(count),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// UNBUFFERED UP-SAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Variable-output FFT resampler; typically the rate-raising half of a pair.
#[derive(Debug)]
pub struct FirUpsampler {
    config: FirConfig,
    engines: Engines,
    startup: usize,
}

impl FirUpsampler {
    pub fn new(config: &FirConfig) -> RfResult<Self> {
        let engines = Engines::new(config, "FirUpsampler")?;
        let startup = engines.channels.first().map_or(0, FftResampler::samples_before_first_output);
        Ok(Self {
            config: config.clone(),
            engines,
            startup,
        })
    }

    pub fn configure(&mut self, config: &FirConfig) -> RfResult<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn config(&self) -> &FirConfig {
        &self.config
    }

    pub fn plan(&self) -> &ResamplerPlan {
        &self.engines.plan
    }

    /// Output capacity needed per channel for a call of `num_samples`
    pub fn max_output_len(&self, num_samples: usize) -> usize {
        self.engines.plan.max_output_len(num_samples)
    }

    /// Input samples consumed before the first output sample appears
    pub fn num_samples_before_output_starts(&self) -> usize {
        self.startup
    }

    /// Worst-case lag of the produced stream behind the input, in input
    /// samples
    pub fn max_output_lag(&self) -> usize {
        self.engines.channels.first().map_or(0, FftResampler::max_output_lag)
    }

    /// Feed `num_samples` per channel; output is written contiguously from
    /// index 0. Returns the produced count, equal across channels.
    ///
    /// A failing call resets every channel so they stay in step.
    pub fn process_block<I, O>(&mut self, input: &I, output: &mut O, num_samples: usize) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let out_len = self.max_output_len(num_samples);
        let channels = check_block(&self.config, input, output, num_samples, out_len)?;
        match self.convert(input, output, num_samples, channels) {
            Ok(produced) => Ok(produced),
            Err(e) => {
                self.reset();
                Err(e)
            }
        }
    }

    fn convert<I, O>(&mut self, input: &I, output: &mut O, num_samples: usize, channels: usize) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let chunk = self.config.fft_block_size;
        let mut produced = None;
        for (ch, engine) in self.engines.channels.iter_mut().enumerate().take(channels) {
            let dst = output.channel_mut(ch);
            let mut written = 0;
            for block in input.channel(ch)[..num_samples].chunks(chunk) {
                let out = engine.process(block)?;
                dst[written..written + out.len()].copy_from_slice(out);
                written += out.len();
            }
            produced = Some(check_same_count(produced, written)?);
        }
        Ok(produced.unwrap_or(0))
    }

    pub fn reset(&mut self) {
        self.engines.clear();
    }

    /// Startup latency in input samples
    pub fn latency(&self) -> f64 {
        self.startup as f64
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BUFFERED DOWN-SAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Exact-length FFT resampler; typically the rate-lowering half of a pair.
#[derive(Debug)]
pub struct FirDownsampler {
    config: FirConfig,
    engines: Engines,
    /// Produced but not yet delivered samples, oldest first
    carry: ChannelBuffer,
    counters: Vec<usize>,
    /// Leading zeros the carry-over starts with
    cushion: usize,
    startup: usize,
}

impl FirDownsampler {
    pub fn new(config: &FirConfig) -> RfResult<Self> {
        let engines = Engines::new(config, "FirDownsampler")?;
        let frame_out = engines.plan.frame_out();
        let cushion = config.upstream_lag + frame_out + frame_out / 2;
        let max_out = engines.plan.max_output_len(config.max_block_size);
        let capacity = cushion + max_out + max_out.max(config.max_required);
        let startup = engines.channels.first().map_or(0, FftResampler::samples_before_first_output);
        log::debug!("FirDownsampler: cushion {cushion}, carry capacity {capacity}");
        Ok(Self {
            config: config.clone(),
            engines,
            carry: ChannelBuffer::new(config.num_channels, capacity),
            counters: vec![cushion; config.num_channels],
            cushion,
            startup,
        })
    }

    pub fn configure(&mut self, config: &FirConfig) -> RfResult<()> {
        *self = Self::new(config)?;
        Ok(())
    }

    pub fn config(&self) -> &FirConfig {
        &self.config
    }

    pub fn plan(&self) -> &ResamplerPlan {
        &self.engines.plan
    }

    /// Input samples consumed before the first real output sample appears
    pub fn num_samples_before_output_starts(&self) -> usize {
        self.startup
    }

    /// Per-channel carry-over capacity
    pub fn carry_capacity(&self) -> usize {
        self.carry.capacity()
    }

    /// Zeros delivered ahead of the first produced sample
    pub fn cushion(&self) -> usize {
        self.cushion
    }

    /// Samples currently carried over for `channel`
    pub fn buffered(&self, channel: usize) -> usize {
        self.counters[channel]
    }

    /// Feed `num_samples` per channel and write exactly `required` samples.
    ///
    /// Carry-over overflow is detected before any channel is touched; any
    /// other failure resets every channel so they stay in step.
    pub fn process_block<I, O>(
        &mut self,
        input: &I,
        output: &mut O,
        num_samples: usize,
        required: usize,
    ) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        if required > self.config.max_required {
            return Err(contract_violation(ContractViolation::BlockTooLarge {
                got: required,
                max: self.config.max_required,
            }));
        }
        let channels = check_block(&self.config, input, output, num_samples, required)?;
        let capacity = self.carry.capacity();
        for (engine, &buffered) in self.engines.channels.iter().zip(&self.counters).take(channels) {
            let needed = buffered + engine.output_len(num_samples);
            if needed > capacity {
                return Err(contract_violation(ContractViolation::CarryOverflow { needed, capacity }));
            }
        }
        if let Err(e) = self.convert(input, output, num_samples, required, channels) {
            self.reset();
            return Err(e);
        }
        Ok(required)
    }

    fn convert<I, O>(
        &mut self,
        input: &I,
        output: &mut O,
        num_samples: usize,
        required: usize,
        channels: usize,
    ) -> RfResult<()>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let chunk = self.config.fft_block_size;
        let mut produced = None;
        for (ch, engine) in self.engines.channels.iter_mut().enumerate().take(channels) {
            let carry = self.carry.channel_mut(ch);
            let start = self.counters[ch];
            let mut fill = start;
            for block in input.channel(ch)[..num_samples].chunks(chunk) {
                let out = engine.process(block)?;
                let end = fill + out.len();
                carry[fill..end].copy_from_slice(out);
                fill = end;
            }
            produced = Some(check_same_count(produced, fill - start)?);
            self.counters[ch] = deliver(carry, fill, &mut output.channel_mut(ch)[..required]);
        }
        Ok(())
    }

    /// Refill the cushion and restart the engines.
    pub fn reset(&mut self) {
        self.engines.clear();
        self.carry.clear();
        self.counters.fill(self.cushion);
    }

    /// Delay in output samples: the zero cushion ahead of the first produced
    /// sample, which lines up with input time 0.
    pub fn latency(&self) -> f64 {
        self.cushion as f64
    }
}

/// Move `out.len()` samples out of the first `fill` carried samples.
///
/// Short carry-overs are right-aligned behind leading zeros; this only
/// happens when the caller feeds less than the cushion covers. Returns the
/// new carry-over length.
fn deliver(carry: &mut [Sample], fill: usize, out: &mut [Sample]) -> usize {
    let required = out.len();
    if fill <= required {
        let pad = required - fill;
        out[..pad].fill(0.0);
        out[pad..].copy_from_slice(&carry[..fill]);
        0
    } else {
        out.copy_from_slice(&carry[..required]);
        carry.copy_within(required..fill, 0);
        fill - required
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITY
// ═══════════════════════════════════════════════════════════════════════════════

impl Resampler for FirUpsampler {
    type Config = FirConfig;

    fn new(config: &FirConfig) -> RfResult<Self> {
        FirUpsampler::new(config)
    }

    fn configure(&mut self, config: &FirConfig) -> RfResult<()> {
        FirUpsampler::configure(self, config)
    }

    fn process_block<I, O>(&mut self, input: &I, output: &mut O, request: BlockRequest) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        FirUpsampler::process_block(self, input, output, request.num_samples)
    }

    fn reset(&mut self) {
        FirUpsampler::reset(self);
    }

    fn latency(&self) -> f64 {
        FirUpsampler::latency(self)
    }
}

impl Resampler for FirDownsampler {
    type Config = FirConfig;

    fn new(config: &FirConfig) -> RfResult<Self> {
        FirDownsampler::new(config)
    }

    fn configure(&mut self, config: &FirConfig) -> RfResult<()> {
        FirDownsampler::configure(self, config)
    }

    fn process_block<I, O>(&mut self, input: &I, output: &mut O, request: BlockRequest) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let Some(required) = request.required else {
            return Err(contract_violation(ContractViolation::MissingRequiredSamples));
        };
        FirDownsampler::process_block(self, input, output, request.num_samples, required)
    }

    fn reset(&mut self) {
        FirDownsampler::reset(self);
    }

    fn latency(&self) -> f64 {
        FirDownsampler::latency(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn down_config(factor: usize, max_block_size: usize, max_required: usize) -> FirConfig {
        FirConfig {
            num_channels: 2,
            max_block_size,
            fft_block_size: 512,
            ratio: Ratio::downsample(factor).unwrap(),
            max_required,
            ..FirConfig::default()
        }
    }

    #[test]
    fn test_deliver_pads_short_carry() {
        let mut carry = [1.0, 2.0, 0.0, 0.0];
        let mut out = [9.0; 4];
        assert_eq!(deliver(&mut carry, 2, &mut out), 0);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_deliver_keeps_surplus_in_order() {
        let mut carry = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut out = [0.0; 2];
        assert_eq!(deliver(&mut carry, 5, &mut out), 3);
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(&carry[..3], &[3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_deliver_exact_fit_empties_carry() {
        let mut carry = [1.0, 2.0, 3.0];
        let mut out = [0.0; 3];
        assert_eq!(deliver(&mut carry, 3, &mut out), 0);
        assert_eq!(out, [1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_carry_capacity() {
        let down = FirDownsampler::new(&down_config(4, 4096, 1024)).unwrap();
        // Cushion of 1.5 frames, 4 frames of 256 per call, room for the
        // required count
        assert_eq!(down.cushion(), 384);
        assert_eq!(down.carry_capacity(), 384 + 1024 + 1024);
        let down = FirDownsampler::new(&down_config(4, 1024, 2048)).unwrap();
        assert_eq!(down.carry_capacity(), 384 + 256 + 2048);

        let down = FirDownsampler::new(&FirConfig {
            upstream_lag: 384,
            ..down_config(2, 1024, 512)
        })
        .unwrap();
        assert_eq!(down.cushion(), 768);
        assert_eq!(down.latency(), 768.0);
        assert_eq!(down.buffered(1), 768);
    }

    #[test]
    fn test_first_call_delivers_cushion() {
        let mut down = FirDownsampler::new(&down_config(4, 4096, 1024)).unwrap();
        let input = vec![vec![1.0; 4096]; 2];
        let mut out = vec![vec![f64::NAN; 1024]; 2];
        assert_eq!(down.process_block(&input, &mut out, 4096, 1024).unwrap(), 1024);
        assert!(out[0][..384].iter().all(|&s| s == 0.0));
        assert!(out[1][384..].iter().all(|s| s.is_finite() && *s != 0.0));
        // 384 cushion + 896 produced (4 frames minus the dropped half frame)
        assert_eq!(down.buffered(0), 384 + 896 - 1024);

        down.reset();
        assert_eq!(down.buffered(0), 384);
        down.process_block(&input, &mut out, 4096, 1024).unwrap();
        assert!(out[0][..384].iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_steady_stream_never_pads() {
        // Half rate, 441 in / ~220 out per call: bursts of 256 drift against
        // the required counts
        let mut down = FirDownsampler::new(&down_config(2, 882, 441)).unwrap();
        let input = vec![vec![0.5; 882]; 2];
        let mut out = vec![vec![0.0; 441]; 2];
        let mut delivered = 0;
        for call in 0..200 {
            let required = if call % 2 == 0 { 220 } else { 221 };
            down.process_block(&input, &mut out, 2 * required, required).unwrap();
            let start = 400usize.saturating_sub(delivered).min(required);
            assert!(
                out[0][start..required].iter().all(|&s| s != 0.0),
                "call {call}: zeros after startup"
            );
            delivered += required;
        }
    }

    #[test]
    fn test_upsampler_output_counts() {
        let config = FirConfig {
            num_channels: 1,
            max_block_size: 300,
            ..FirConfig::default()
        };
        let mut up = FirUpsampler::new(&config).unwrap();
        assert_eq!(up.num_samples_before_output_starts(), 256);
        let input = vec![vec![0.1; 300]];
        let mut out = vec![vec![0.0; up.max_output_len(300)]];
        assert_eq!(up.process_block(&input, &mut out, 300).unwrap(), 256);
        // 44 pending + 300 completes one more frame
        assert_eq!(up.process_block(&input, &mut out, 300).unwrap(), 512);
        up.reset();
        assert_eq!(up.process_block(&input, &mut out, 300).unwrap(), 256);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let mut config = down_config(2, 512, 256);
        config.num_channels = 0;
        assert!(FirDownsampler::new(&config).is_err());
        let mut config = down_config(2, 512, 256);
        config.fft_block_size = 0;
        assert!(FirUpsampler::new(&config).is_err());
        let mut config = down_config(2, 512, 256);
        config.transition = 0.4;
        assert!(FirUpsampler::new(&config).is_err());
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contract violation")]
    fn test_missing_required_panics_in_debug() {
        let mut down = FirDownsampler::new(&down_config(2, 512, 256)).unwrap();
        let input = vec![vec![0.0; 512]; 2];
        let mut out = vec![vec![0.0; 256]; 2];
        let _ = Resampler::process_block(&mut down, &input, &mut out, BlockRequest::new(512));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contract violation")]
    fn test_carry_overflow_panics_in_debug() {
        let mut down = FirDownsampler::new(&down_config(4, 4096, 1024)).unwrap();
        let input = vec![vec![0.0; 4096]; 2];
        let mut out = vec![vec![0.0; 1024]; 2];
        for _ in 0..3 {
            let _ = down.process_block(&input, &mut out, 4096, 1);
        }
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_carry_overflow_leaves_channels_in_step() {
        let mut down = FirDownsampler::new(&down_config(4, 4096, 1024)).unwrap();
        let input = vec![vec![0.0; 4096]; 2];
        let mut out = vec![vec![0.0; 1024]; 2];
        // Capacity 2432: 384 + 896 - 1, then + 1024 - 1, then overflow
        down.process_block(&input, &mut out, 4096, 1).unwrap();
        down.process_block(&input, &mut out, 4096, 1).unwrap();
        assert_eq!(down.buffered(0), 2302);
        assert!(matches!(
            down.process_block(&input, &mut out, 4096, 1),
            Err(RfError::Contract(ContractViolation::CarryOverflow { needed: 3326, capacity: 2432 }))
        ));
        assert_eq!(down.buffered(0), 2302);
        assert_eq!(down.buffered(1), 2302);
        assert_eq!(down.process_block(&input, &mut out, 0, 1024).unwrap(), 1024);
        assert_eq!(down.buffered(0), down.buffered(1));
    }

    #[test]
    #[cfg(not(debug_assertions))]
    fn test_contract_violations_error_in_release() {
        let mut down = FirDownsampler::new(&down_config(2, 512, 256)).unwrap();
        let input = vec![vec![0.0; 512]; 2];
        let mut out = vec![vec![0.0; 256]; 2];
        assert_eq!(
            Resampler::process_block(&mut down, &input, &mut out, BlockRequest::new(512)),
            Err(RfError::Contract(ContractViolation::MissingRequiredSamples))
        );
        assert!(matches!(
            down.process_block(&input, &mut out, 512, 300),
            Err(RfError::Contract(ContractViolation::BlockTooLarge { got: 300, max: 256 }))
        ));
        let mut short = vec![vec![0.0; 100]; 2];
        assert!(matches!(
            down.process_block(&input, &mut short, 512, 200),
            Err(RfError::Contract(ContractViolation::BufferTooSmall { needed: 200, available: 100 }))
        ));
    }
}
