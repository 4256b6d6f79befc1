//! rf-oversample: Multi-rate oversampling for ReelForge
//!
//! Converts audio to an oversampled rate and back for aliasing-free
//! nonlinear processing.
//!
//! ## Modules
//! - `designer` - Half-band cascade stage specs and group delay
//! - `halfband` - Polyphase allpass coefficient synthesis and lane kernels
//! - `cascade` - SIMD-lane-grouped half-band IIR up/down chains
//! - `fft_resampler` - Overlap-add FFT resampler for rational ratios
//! - `fir` - Per-channel FFT resampling with exact-length output buffering
//! - `switcher` - Pre-built per-order instances with allocation-free switching
//! - `handoff` - Control → audio thread order and snapshot exchange
//! - `engine` - Up → process → down wrapper over both families
//! - `config` - Serialisable configuration
//!
//! Everything that allocates happens in `new`/`configure` on the control
//! thread. `process_block`, `reset` and `set_order` never allocate.

pub mod cascade;
pub mod config;
pub mod designer;
pub mod engine;
pub mod fft_resampler;
pub mod fir;
pub mod halfband;
pub mod handoff;
pub mod simd;
pub mod switcher;

pub use cascade::{HalfbandCascade, IirConfig, IirDownsampler, IirUpsampler, LaneGroup, LaneLayout};
pub use config::{Family, OversamplingConfig};
pub use designer::{OversamplingDesigner, StageSpec};
pub use engine::{HighRateBlock, OversamplingEngine};
pub use fft_resampler::{FftResampler, Ratio, ResamplerPlan};
pub use fir::{FirConfig, FirDownsampler, FirUpsampler};
pub use handoff::{OrderSelector, SnapshotPublisher, SnapshotReceiver, snapshot_channel};
pub use simd::{SimdLevel, detect_simd_level};
pub use switcher::OrderSwitch;

use rf_core::{Channels, ChannelsMut, RfResult};

/// Sample counts for one processing call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRequest {
    /// Input samples per channel
    pub num_samples: usize,
    /// Exact output samples per channel, for exact-length converters
    pub required: Option<usize>,
}

impl BlockRequest {
    pub const fn new(num_samples: usize) -> Self {
        Self {
            num_samples,
            required: None,
        }
    }

    pub const fn with_required(mut self, required: usize) -> Self {
        self.required = Some(required);
        self
    }
}

/// Common capability of every rate converter in this crate.
pub trait Resampler: Sized {
    type Config;

    /// Build a fully allocated instance. Control thread.
    fn new(config: &Self::Config) -> RfResult<Self>;

    /// Rebuild for a new configuration. Control thread; may allocate.
    fn configure(&mut self, config: &Self::Config) -> RfResult<()>;

    /// Convert `request.num_samples` input samples of every input channel.
    ///
    /// Returns the number of samples written to each output channel.
    fn process_block<I, O>(
        &mut self,
        input: &I,
        output: &mut O,
        request: BlockRequest,
    ) -> RfResult<usize>
    where
        I: Channels + ?Sized,
        O: ChannelsMut + ?Sized;

    /// Clear filter memory. Capacity is kept.
    fn reset(&mut self);

    /// Processing delay in base-rate samples
    fn latency(&self) -> f64;
}
