//! Cascaded half-band IIR oversampling
//!
//! Up-sampling runs stage 0 → stage k-1, each doubling the rate; down-sampling
//! runs stage k-1 → stage 0. Channels are grouped into SIMD lane tiers
//! (8, 4, 2 lanes, widest first) and every tier holds one kernel instance per
//! group per stage, so switching order never touches filter state of the
//! remaining stages.

use crate::designer::{DEFAULT_STAGE_COUNT, OversamplingDesigner};
use crate::halfband::{Direction, Down, HalfbandFilter, Up};
use crate::simd::SimdLevel;
use crate::{BlockRequest, Resampler};
use rf_core::{
    ChannelBuffer, Channels, ChannelsMut, ContractViolation, RfError, RfResult,
    contract_violation, deinterleave_frames, factor_for_order, interleave_frames,
};

/// Frames gathered per kernel call
const CHUNK: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct IirConfig {
    pub num_channels: usize,
    /// Largest base-rate block per call
    pub max_block_size: usize,
    pub max_order: usize,
    pub attenuation_db: f64,
    /// Transition band of the first stage, normalised to its output rate
    pub transition: f64,
    pub simd: SimdLevel,
}

impl Default for IirConfig {
    fn default() -> Self {
        Self {
            num_channels: 2,
            max_block_size: 512,
            max_order: 3,
            attenuation_db: 100.0,
            transition: 0.1,
            simd: SimdLevel::default(),
        }
    }
}

impl IirConfig {
    pub fn validate(&self) -> RfResult<()> {
        if self.num_channels == 0 {
            return Err(RfError::InvalidParam("channel count must be at least 1".into()));
        }
        if self.max_block_size == 0 {
            return Err(RfError::InvalidParam("max block size must be at least 1".into()));
        }
        check_order(self.max_order, DEFAULT_STAGE_COUNT)
    }
}

fn check_order(order: usize, max: usize) -> RfResult<()> {
    if order == 0 || order > max {
        return Err(RfError::OrderOutOfRange { order, min: 1, max });
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════════════
// LANE LAYOUT
// ═══════════════════════════════════════════════════════════════════════════════

/// Kernel instances of one lane width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaneGroup {
    pub width: usize,
    pub instances: usize,
}

/// Assignment of channels to lane tiers, widest first.
///
/// Wider tiers only take full groups; the narrowest tier rounds up so every
/// channel is covered. Unused lanes can only appear in its last instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneLayout {
    groups: Vec<LaneGroup>,
}

impl LaneLayout {
    /// `widths` must be sorted widest first.
    pub fn new(num_channels: usize, widths: &[usize]) -> Self {
        let mut remaining = num_channels;
        let groups = widths
            .iter()
            .enumerate()
            .map(|(i, &width)| {
                let instances = if i + 1 == widths.len() {
                    remaining.div_ceil(width)
                } else {
                    remaining / width
                };
                remaining = remaining.saturating_sub(instances * width);
                LaneGroup { width, instances }
            })
            .collect();
        Self { groups }
    }

    pub fn groups(&self) -> &[LaneGroup] {
        &self.groups
    }

    /// Instances of the given width (0 if the width is not offered)
    pub fn instances(&self, width: usize) -> usize {
        self.groups
            .iter()
            .find(|g| g.width == width)
            .map_or(0, |g| g.instances)
    }

    /// Total lanes, including unused ones
    pub fn lanes(&self) -> usize {
        self.groups.iter().map(|g| g.width * g.instances).sum()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LANE TIERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone)]
struct Tier<const W: usize, D> {
    /// `[stage][instance]`
    stages: Vec<Vec<HalfbandFilter<W, D>>>,
}

impl<const W: usize, D: Direction> Tier<W, D> {
    fn new(designer: &OversamplingDesigner, instances: usize) -> Self {
        let stages = designer
            .stages()
            .iter()
            .map(|spec| {
                (0..instances)
                    .map(|_| HalfbandFilter::new(spec.coefficients()))
                    .collect()
            })
            .collect();
        Self { stages }
    }

    fn reset(&mut self) {
        for filter in self.stages.iter_mut().flatten() {
            filter.clear_buffers();
        }
    }

    /// Filter channels from `first` on until `channels` or this tier's
    /// instances run out. Returns the next unprocessed channel.
    fn run_stage<I, O>(
        &mut self,
        stage: usize,
        src: &I,
        dst: &mut O,
        len: usize,
        mut first: usize,
        channels: usize,
    ) -> usize
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let mut in_frames = [[0.0; W]; CHUNK];
        let mut out_frames = [[0.0; W]; 2 * CHUNK];

        for filter in &mut self.stages[stage] {
            if first >= channels {
                break;
            }
            let active = (channels - first).min(W);
            let mut pos = 0;
            while pos < len {
                let n = (len - pos).min(CHUNK);
                let out_n = D::output_len(n);
                interleave_frames(src, first, active, pos, &mut in_frames[..n]);
                D::process_frames(filter, &in_frames[..n], &mut out_frames[..out_n]);
                deinterleave_frames(dst, first, active, D::output_len(pos), &out_frames[..out_n]);
                pos += n;
            }
            first += active;
        }
        first
    }
}

#[derive(Debug, Clone)]
struct Lanes<D> {
    x8: Tier<8, D>,
    x4: Tier<4, D>,
    x2: Tier<2, D>,
}

impl<D: Direction> Lanes<D> {
    fn new(designer: &OversamplingDesigner, layout: &LaneLayout) -> Self {
        Self {
            x8: Tier::new(designer, layout.instances(8)),
            x4: Tier::new(designer, layout.instances(4)),
            x2: Tier::new(designer, layout.instances(2)),
        }
    }

    fn reset(&mut self) {
        self.x8.reset();
        self.x4.reset();
        self.x2.reset();
    }

    fn run_stage<I, O>(&mut self, stage: usize, src: &I, dst: &mut O, len: usize, channels: usize)
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let next = self.x8.run_stage(stage, src, dst, len, 0, channels);
        let next = self.x4.run_stage(stage, src, dst, len, next, channels);
        let next = self.x2.run_stage(stage, src, dst, len, next, channels);
        debug_assert_eq!(next, channels);
    }

    /// Run `order` stages from `input` into `output`, ping-ponging through
    /// the scratch buffers.
    fn run_chain<I, O>(
        &mut self,
        order: usize,
        scratch: &mut [ChannelBuffer; 2],
        input: &I,
        output: &mut O,
        num_samples: usize,
        channels: usize,
    ) where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let [ping, pong] = scratch;
        let mut len = num_samples;
        for step in 0..order {
            let stage = D::stage_at(step, order);
            let last = step + 1 == order;
            match (step, last) {
                (0, true) => self.run_stage(stage, input, output, len, channels),
                (0, false) => self.run_stage(stage, input, ping, len, channels),
                (s, true) if s % 2 == 1 => self.run_stage(stage, &*ping, output, len, channels),
                (_, true) => self.run_stage(stage, &*pong, output, len, channels),
                (s, false) if s % 2 == 1 => self.run_stage(stage, &*ping, pong, len, channels),
                (_, false) => self.run_stage(stage, &*pong, ping, len, channels),
            }
            len = D::output_len(len);
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CASCADE
// ═══════════════════════════════════════════════════════════════════════════════

/// Multi-channel half-band cascade; order switchable in real time.
#[derive(Debug, Clone)]
pub struct HalfbandCascade<D> {
    config: IirConfig,
    designer: OversamplingDesigner,
    layout: LaneLayout,
    lanes: Lanes<D>,
    scratch: [ChannelBuffer; 2],
    order: usize,
    /// Base-rate latency per order, index 0 unused
    latencies: Vec<f64>,
}

pub type IirUpsampler = HalfbandCascade<Up>;
pub type IirDownsampler = HalfbandCascade<Down>;

impl<D: Direction> HalfbandCascade<D> {
    pub fn new(config: &IirConfig) -> RfResult<Self> {
        let mut cascade = Self {
            config: config.clone(),
            designer: OversamplingDesigner::new(
                config.attenuation_db,
                config.transition,
                DEFAULT_STAGE_COUNT,
            )?,
            layout: LaneLayout::new(0, &[]),
            lanes: Lanes {
                x8: Tier { stages: Vec::new() },
                x4: Tier { stages: Vec::new() },
                x2: Tier { stages: Vec::new() },
            },
            scratch: Default::default(),
            order: config.max_order,
            latencies: Vec::new(),
        };
        cascade.configure(config)?;
        Ok(cascade)
    }

    /// Rebuild designer, lane layout, kernels and scratch. Control thread.
    ///
    /// The active order is kept, clamped to the new maximum.
    pub fn configure(&mut self, config: &IirConfig) -> RfResult<()> {
        if let Err(e) = config.validate() {
            log::warn!("HalfbandCascade({}): rejected configuration: {e}", D::NAME);
            return Err(e);
        }
        let designer =
            OversamplingDesigner::new(config.attenuation_db, config.transition, DEFAULT_STAGE_COUNT)?;
        let latencies = (0..=designer.stage_count())
            .map(|order| designer.min_group_delay(order))
            .collect::<RfResult<Vec<_>>>()?;

        self.layout = LaneLayout::new(config.num_channels, config.simd.lane_widths());
        self.lanes = Lanes::new(&designer, &self.layout);
        self.designer = designer;
        self.latencies = latencies;
        self.config = config.clone();
        self.order = self.order.clamp(1, config.max_order);
        self.resize_scratch();

        log::debug!(
            "HalfbandCascade({}): {} channels, max block {}, order {}/{}, lanes {:?} ({})",
            D::NAME,
            config.num_channels,
            config.max_block_size,
            self.order,
            config.max_order,
            self.layout.groups(),
            config.simd.name(),
        );
        Ok(())
    }

    fn resize_scratch(&mut self) {
        let capacity = self.config.max_block_size * factor_for_order(self.config.max_order);
        for buf in &mut self.scratch {
            buf.resize(self.config.num_channels, capacity);
        }
    }

    /// Switch the active order. Never allocates.
    pub fn set_order(&mut self, order: usize) -> RfResult<()> {
        check_order(order, self.config.max_order)?;
        self.order = order;
        Ok(())
    }

    /// Change the order ceiling and resize scratch. Control thread.
    pub fn set_max_order(&mut self, max_order: usize) -> RfResult<()> {
        check_order(max_order, self.designer.stage_count())?;
        self.config.max_order = max_order;
        self.order = self.order.min(max_order);
        self.resize_scratch();
        log::debug!("HalfbandCascade({}): max order {max_order}", D::NAME);
        Ok(())
    }

    pub fn set_num_channels(&mut self, num_channels: usize) -> RfResult<()> {
        let config = IirConfig {
            num_channels,
            ..self.config.clone()
        };
        self.configure(&config)
    }

    pub fn set_max_block_size(&mut self, max_block_size: usize) -> RfResult<()> {
        let config = IirConfig {
            max_block_size,
            ..self.config.clone()
        };
        self.configure(&config)
    }

    #[inline]
    pub fn order(&self) -> usize {
        self.order
    }

    #[inline]
    pub fn max_order(&self) -> usize {
        self.config.max_order
    }

    #[inline]
    pub fn factor(&self) -> usize {
        factor_for_order(self.order)
    }

    pub fn config(&self) -> &IirConfig {
        &self.config
    }

    pub fn layout(&self) -> &LaneLayout {
        &self.layout
    }

    pub fn designer(&self) -> &OversamplingDesigner {
        &self.designer
    }

    /// Per-channel capacity of the internal scratch buffers
    pub fn scratch_capacity(&self) -> usize {
        self.scratch[0].capacity()
    }

    pub fn reset(&mut self) {
        self.lanes.reset();
    }

    /// Group delay at DC in base-rate samples for the active order
    #[inline]
    pub fn latency(&self) -> f64 {
        self.latencies[self.order]
    }

    fn check_channels<I, O>(&self, input: &I, output: &O) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: Channels + ?Sized,
    {
        let channels = input.num_channels();
        if channels > self.config.num_channels {
            return Err(contract_violation(ContractViolation::TooManyChannels {
                got: channels,
                max: self.config.num_channels,
            }));
        }
        if output.num_channels() < channels {
            return Err(contract_violation(ContractViolation::TooManyChannels {
                got: channels,
                max: output.num_channels(),
            }));
        }
        Ok(channels)
    }
}

fn check_lengths<I, O>(input: &I, output: &O, channels: usize, in_len: usize, out_len: usize) -> RfResult<()>
where
    I: Channels + ?Sized,
    O: Channels + ?Sized,
{
    let available = input.min_len(channels);
    if available < in_len {
        return Err(contract_violation(ContractViolation::BufferTooSmall {
            needed: in_len,
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
    Ok(())
}

impl HalfbandCascade<Up> {
    /// Up-sample `num_samples` per channel; returns `num_samples * 2^order`.
    pub fn process_block<I, O>(&mut self, input: &I, output: &mut O, num_samples: usize) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let channels = self.check_channels(input, output)?;
        if num_samples > self.config.max_block_size {
            return Err(contract_violation(ContractViolation::BlockTooLarge {
                got: num_samples,
                max: self.config.max_block_size,
            }));
        }
        let out_len = num_samples * self.factor();
        check_lengths(input, output, channels, num_samples, out_len)?;

        self.lanes
            .run_chain(self.order, &mut self.scratch, input, output, num_samples, channels);
        Ok(out_len)
    }
}

impl HalfbandCascade<Down> {
    /// Down-sample `num_samples` per channel; returns `num_samples / 2^order`.
    ///
    /// `num_samples` must be a multiple of the factor.
    pub fn process_block<I, O>(&mut self, input: &I, output: &mut O, num_samples: usize) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        let channels = self.check_channels(input, output)?;
        let factor = self.factor();
        if num_samples % factor != 0 {
            return Err(contract_violation(ContractViolation::IndivisibleBlock {
                samples: num_samples,
                factor,
            }));
        }
        let max = self.config.max_block_size * factor;
        if num_samples > max {
            return Err(contract_violation(ContractViolation::BlockTooLarge {
                got: num_samples,
                max,
            }));
        }
        let out_len = num_samples / factor;
        check_lengths(input, output, channels, num_samples, out_len)?;

        self.lanes
            .run_chain(self.order, &mut self.scratch, input, output, num_samples, channels);
        Ok(out_len)
    }
}

impl Resampler for HalfbandCascade<Up> {
    type Config = IirConfig;

    fn new(config: &IirConfig) -> RfResult<Self> {
        HalfbandCascade::new(config)
    }

    fn configure(&mut self, config: &IirConfig) -> RfResult<()> {
        HalfbandCascade::configure(self, config)
    }

    fn process_block<I, O>(&mut self, input: &I, output: &mut O, request: BlockRequest) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        Self::process_block(self, input, output, request.num_samples)
    }

    fn reset(&mut self) {
        HalfbandCascade::reset(self);
    }

    fn latency(&self) -> f64 {
        HalfbandCascade::latency(self)
    }
}

impl Resampler for HalfbandCascade<Down> {
    type Config = IirConfig;

    fn new(config: &IirConfig) -> RfResult<Self> {
        HalfbandCascade::new(config)
    }

    fn configure(&mut self, config: &IirConfig) -> RfResult<()> {
        HalfbandCascade::configure(self, config)
    }

    fn process_block<I, O>(&mut self, input: &I, output: &mut O, request: BlockRequest) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized,
    {
        if let Some(required) = request.required {
            let produced = request.num_samples / self.factor();
            if required != produced {
                return Err(contract_violation(ContractViolation::RequiredMismatch {
                    required,
                    produced,
                }));
            }
        }
        Self::process_block(self, input, output, request.num_samples)
    }

    fn reset(&mut self) {
        HalfbandCascade::reset(self);
    }

    fn latency(&self) -> f64 {
        HalfbandCascade::latency(self)
    }
}
