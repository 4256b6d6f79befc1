//! Overlap-add FFT resampler for rational ratios
//!
//! Input is collected into frames of `frame_in = M * k` samples. Each frame is
//! zero-padded to `2 * frame_in`, transformed, multiplied with the spectrum of
//! a Kaiser-windowed sinc of length `frame_in`, truncated or zero-extended to
//! `frame_out + 1` bins and transformed back at size `2 * frame_out`. The
//! second half of each inverse transform overlaps the next frame.
//!
//! The lowpass is centred at `frame_in / 2`, so the first `frame_out / 2`
//! produced samples are dropped: output sample `j` lines up with input time
//! `j * M / L`.

use num_complex::Complex64;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rf_core::{ContractViolation, RfError, RfResult, Sample, contract_violation};
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

/// Stopband attenuation of the anti-aliasing lowpass (dB)
const STOPBAND_DB: f64 = 100.0;

/// Largest denominator accepted by [`Ratio::from_f64`]
pub const MAX_RATIO_TERM: usize = 1 << 16;

// ═══════════════════════════════════════════════════════════════════════════════
// RATIO
// ═══════════════════════════════════════════════════════════════════════════════

/// Reduced conversion ratio `up / down` (output rate over input rate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ratio {
    up: usize,
    down: usize,
}

const fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

impl Ratio {
    /// `2/1`
    pub const DOUBLE: Self = Self { up: 2, down: 1 };

    pub fn new(up: usize, down: usize) -> RfResult<Self> {
        if up == 0 || down == 0 {
            return Err(RfError::InvalidParam(format!("ratio {up}/{down} must be positive")));
        }
        let g = gcd(up, down);
        Ok(Self {
            up: up / g,
            down: down / g,
        })
    }

    /// Integer up-sampling ratio `factor / 1`
    pub fn upsample(factor: usize) -> RfResult<Self> {
        Self::new(factor, 1)
    }

    /// Integer down-sampling ratio `1 / factor`
    pub fn downsample(factor: usize) -> RfResult<Self> {
        Self::new(1, factor)
    }

    /// Best rational approximation with both terms at most [`MAX_RATIO_TERM`].
    pub fn from_f64(ratio: f64) -> RfResult<Self> {
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(RfError::InvalidParam(format!("ratio {ratio} must be positive")));
        }
        // Continued fraction convergents
        let (mut p0, mut q0, mut p1, mut q1) = (0usize, 1usize, 1usize, 0usize);
        let mut x = ratio;
        loop {
            let a = x.floor();
            if a > MAX_RATIO_TERM as f64 {
                break;
            }
            let a = a as usize;
            let p2 = a.saturating_mul(p1).saturating_add(p0);
            let q2 = a.saturating_mul(q1).saturating_add(q0);
            if p2 > MAX_RATIO_TERM || q2 > MAX_RATIO_TERM {
                break;
            }
            (p0, q0, p1, q1) = (p1, q1, p2, q2);
            let frac = x - a as f64;
            if frac < 1e-12 || (p1 as f64 / q1 as f64 - ratio).abs() < 1e-12 * ratio {
                break;
            }
            x = 1.0 / frac;
        }
        if p1 == 0 || q1 == 0 {
            return Err(RfError::InvalidParam(format!(
                "ratio {ratio} not representable with terms up to {MAX_RATIO_TERM}"
            )));
        }
        Self::new(p1, q1)
    }

    /// Output samples per `down` input samples
    #[inline]
    pub fn up(&self) -> usize {
        self.up
    }

    #[inline]
    pub fn down(&self) -> usize {
        self.down
    }

    #[inline]
    pub fn as_f64(&self) -> f64 {
        self.up as f64 / self.down as f64
    }

    /// `min(1, L / M)`: bandwidth scale of the lower of the two rates
    #[inline]
    fn bandwidth_scale(&self) -> f64 {
        self.as_f64().min(1.0)
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.up, self.down)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PLAN
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable transform setup shared by every channel of a converter.
pub struct ResamplerPlan {
    ratio: Ratio,
    transition: f64,
    frame_in: usize,
    frame_out: usize,
    filter_spectrum: Vec<Complex64>,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
}

impl fmt::Debug for ResamplerPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResamplerPlan")
            .field("ratio", &self.ratio)
            .field("transition", &self.transition)
            .field("frame_in", &self.frame_in)
            .field("frame_out", &self.frame_out)
            .finish_non_exhaustive()
    }
}

impl ResamplerPlan {
    /// `transition` is the transition band relative to the lower of the two
    /// sample rates, `]0, 0.25[`.
    pub fn new(ratio: Ratio, transition: f64) -> RfResult<Arc<Self>> {
        if !(transition > 0.0 && transition < 0.25) {
            return Err(RfError::InvalidParam(format!(
                "FIR transition must lie in ]0, 0.25[, got {transition}"
            )));
        }
        let taps = kaiser_length(transition * ratio.bandwidth_scale());
        let k = taps.div_ceil(ratio.down).next_power_of_two().max(2);
        let frame_in = ratio.down * k;
        let frame_out = ratio.up * k;

        let cutoff = (1.0 - 2.0 * transition) * ratio.bandwidth_scale();
        let filter = windowed_sinc(frame_in, cutoff);

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(2 * frame_in);
        let inverse = planner.plan_fft_inverse(2 * frame_out);

        let norm = 1.0 / (2 * frame_in) as f64;
        let mut time = forward.make_input_vec();
        for (t, &h) in time.iter_mut().zip(&filter) {
            *t = h * norm;
        }
        let mut filter_spectrum = forward.make_output_vec();
        forward
            .process(&mut time, &mut filter_spectrum)
            .map_err(|_| RfError::Fft)?;

        log::debug!(
            "ResamplerPlan: ratio {ratio}, transition {transition}, taps {taps}, frames {frame_in} -> {frame_out}"
        );

        Ok(Arc::new(Self {
            ratio,
            transition,
            frame_in,
            frame_out,
            filter_spectrum,
            forward,
            inverse,
        }))
    }

    #[inline]
    pub fn ratio(&self) -> Ratio {
        self.ratio
    }

    #[inline]
    pub fn transition(&self) -> f64 {
        self.transition
    }

    /// Input samples per transform frame
    #[inline]
    pub fn frame_in(&self) -> usize {
        self.frame_in
    }

    /// Output samples per transform frame
    #[inline]
    pub fn frame_out(&self) -> usize {
        self.frame_out
    }

    /// Upper bound of samples produced by one call with `input_len` samples
    #[inline]
    pub fn max_output_len(&self, input_len: usize) -> usize {
        input_len.div_ceil(self.frame_in) * self.frame_out
    }
}

/// Kaiser filter length for [`STOPBAND_DB`] at transition `delta_f`
/// (cycles per input sample).
fn kaiser_length(delta_f: f64) -> usize {
    ((STOPBAND_DB - 7.95) / (14.36 * delta_f)).ceil() as usize + 1
}

fn kaiser_beta() -> f64 {
    0.1102 * (STOPBAND_DB - 8.7)
}

fn bessel_i0(x: f64) -> f64 {
    let base = x * x / 4.0;
    let mut term = 1.0;
    let mut result = 1.0;
    for idx in 1..1500 {
        term = term * base / (idx * idx) as f64;
        let previous = result;
        result += term;
        if result == previous {
            break;
        }
    }
    result
}

/// Periodic Kaiser-windowed sinc of length `len` centred at `len / 2`, unity
/// DC gain. `cutoff` is relative to the input Nyquist frequency.
fn windowed_sinc(len: usize, cutoff: f64) -> Vec<f64> {
    let beta = kaiser_beta();
    let i0_beta = bessel_i0(beta);
    let center = (len / 2) as f64;

    let mut taps: Vec<f64> = (0..len)
        .map(|n| {
            let t = n as f64 - center;
            let sinc = if t == 0.0 {
                cutoff
            } else {
                (PI * cutoff * t).sin() / (PI * t)
            };
            let x = t / center;
            let window = bessel_i0(beta * (1.0 - x * x).max(0.0).sqrt()) / i0_beta;
            sinc * window
        })
        .collect();

    let sum: f64 = taps.iter().sum();
    for tap in &mut taps {
        *tap /= sum;
    }
    taps
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESAMPLER
// ═══════════════════════════════════════════════════════════════════════════════

/// Single-channel streaming FFT resampler.
///
/// All buffers are sized at construction for chunks of up to `max_chunk`
/// samples; [`process`](Self::process) never allocates.
#[derive(Debug)]
pub struct FftResampler {
    plan: Arc<ResamplerPlan>,
    max_chunk: usize,
    /// Collected input of the current frame
    frame: Vec<Sample>,
    frame_fill: usize,
    time_in: Vec<f64>,
    spectrum_in: Vec<Complex64>,
    spectrum_out: Vec<Complex64>,
    time_out: Vec<f64>,
    overlap: Vec<f64>,
    scratch_forward: Vec<Complex64>,
    scratch_inverse: Vec<Complex64>,
    output: Vec<Sample>,
    /// Leading samples still to be dropped
    skip: usize,
}

impl FftResampler {
    pub fn new(plan: Arc<ResamplerPlan>, max_chunk: usize) -> Self {
        let fi = plan.frame_in;
        let fo = plan.frame_out;
        let output = vec![0.0; plan.max_output_len(max_chunk)];
        Self {
            max_chunk,
            frame: vec![0.0; fi],
            frame_fill: 0,
            time_in: plan.forward.make_input_vec(),
            spectrum_in: plan.forward.make_output_vec(),
            spectrum_out: plan.inverse.make_input_vec(),
            time_out: plan.inverse.make_output_vec(),
            overlap: vec![0.0; fo],
            scratch_forward: plan.forward.make_scratch_vec(),
            scratch_inverse: plan.inverse.make_scratch_vec(),
            output,
            skip: fo / 2,
            plan,
        }
    }

    pub fn plan(&self) -> &Arc<ResamplerPlan> {
        &self.plan
    }

    #[inline]
    pub fn ratio(&self) -> Ratio {
        self.plan.ratio
    }

    #[inline]
    pub fn max_chunk(&self) -> usize {
        self.max_chunk
    }

    #[inline]
    pub fn max_output_len(&self, input_len: usize) -> usize {
        self.plan.max_output_len(input_len)
    }

    /// Input samples consumed before the first output sample appears
    #[inline]
    pub fn samples_before_first_output(&self) -> usize {
        self.plan.frame_in
    }

    /// Samples the next [`process`](Self::process) call returns for
    /// `input_len` new samples
    #[inline]
    pub fn output_len(&self, input_len: usize) -> usize {
        let frames = (self.frame_fill + input_len) / self.plan.frame_in;
        (frames * self.plan.frame_out).saturating_sub(self.skip)
    }

    /// Worst-case lag of the produced stream behind the input, in input
    /// samples: one partially filled frame plus the dropped half frame.
    #[inline]
    pub fn max_output_lag(&self) -> usize {
        let fi = self.plan.frame_in;
        fi + fi / 2
    }

    /// Return to the initial state.
    pub fn clear(&mut self) {
        self.frame_fill = 0;
        self.frame.fill(0.0);
        self.overlap.fill(0.0);
        self.skip = self.plan.frame_out / 2;
    }

    /// Feed up to `max_chunk` samples; returns the samples produced by this
    /// call (possibly none).
    pub fn process(&mut self, input: &[Sample]) -> RfResult<&[Sample]> {
        if input.len() > self.max_chunk {
            return Err(contract_violation(ContractViolation::BlockTooLarge {
                got: input.len(),
                max: self.max_chunk,
            }));
        }

        let fi = self.plan.frame_in;
        let fo = self.plan.frame_out;
        let mut produced = 0;
        let mut rest = input;
        while !rest.is_empty() {
            let take = (fi - self.frame_fill).min(rest.len());
            self.frame[self.frame_fill..self.frame_fill + take].copy_from_slice(&rest[..take]);
            self.frame_fill += take;
            rest = &rest[take..];
            if self.frame_fill < fi {
                break;
            }

            self.transform_frame()?;
            self.frame_fill = 0;

            let start = self.skip.min(fo);
            self.skip -= start;
            let n = fo - start;
            self.output[produced..produced + n].copy_from_slice(&self.time_out[start..fo]);
            produced += n;
        }
        Ok(&self.output[..produced])
    }

    /// One overlap-add step; leaves the finished frame in `time_out[..frame_out]`.
    fn transform_frame(&mut self) -> RfResult<()> {
        let plan = &*self.plan;
        let fi = plan.frame_in;
        let fo = plan.frame_out;

        self.time_in[..fi].copy_from_slice(&self.frame);
        self.time_in[fi..].fill(0.0);
        plan.forward
            .process_with_scratch(&mut self.time_in, &mut self.spectrum_in, &mut self.scratch_forward)
            .map_err(|_| RfError::Fft)?;

        let bins = if fi < fo { fi + 1 } else { fo };
        for ((out, x), h) in self.spectrum_out[..bins]
            .iter_mut()
            .zip(&self.spectrum_in)
            .zip(&plan.filter_spectrum)
        {
            *out = x * h;
        }
        self.spectrum_out[bins..].fill(Complex64::new(0.0, 0.0));
        self.spectrum_out[0].im = 0.0;
        self.spectrum_out[fo].im = 0.0;

        plan.inverse
            .process_with_scratch(&mut self.spectrum_out, &mut self.time_out, &mut self.scratch_inverse)
            .map_err(|_| RfError::Fft)?;

        for (y, o) in self.time_out[..fo].iter_mut().zip(&self.overlap) {
            *y += o;
        }
        self.overlap.copy_from_slice(&self.time_out[fo..]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_ratio_reduces() {
        let r = Ratio::new(4, 8).unwrap();
        assert_eq!((r.up(), r.down()), (1, 2));
        assert!(Ratio::new(0, 3).is_err());
        assert_eq!(Ratio::from_f64(0.25).unwrap(), Ratio::new(1, 4).unwrap());
        assert_eq!(Ratio::from_f64(44100.0 / 48000.0).unwrap(), Ratio::new(147, 160).unwrap());
        assert_eq!(Ratio::from_f64(8.0).unwrap().to_string(), "8/1");
    }

    #[test]
    fn test_frame_sizes() {
        let plan = ResamplerPlan::new(Ratio::downsample(4).unwrap(), 0.05).unwrap();
        assert_eq!(plan.frame_in(), 1024);
        assert_eq!(plan.frame_out(), 256);
        assert_eq!(plan.max_output_len(512), 256);
        assert_eq!(plan.max_output_len(4096), 1024);

        let plan = ResamplerPlan::new(Ratio::upsample(2).unwrap(), 0.05).unwrap();
        assert_eq!(plan.frame_in(), 256);
        assert_eq!(plan.frame_out(), 512);
    }

    #[test]
    fn test_rejects_bad_transition() {
        let ratio = Ratio::upsample(2).unwrap();
        assert!(ResamplerPlan::new(ratio, 0.0).is_err());
        assert!(ResamplerPlan::new(ratio, 0.3).is_err());
    }

    #[test]
    fn test_dc_gain_and_alignment() {
        let plan = ResamplerPlan::new(Ratio::upsample(2).unwrap(), 0.05).unwrap();
        let mut rs = FftResampler::new(plan, 256);
        let input = vec![0.5; 256];
        let mut out = Vec::new();
        for _ in 0..6 {
            out.extend_from_slice(rs.process(&input).unwrap());
        }
        // Six frames minus the dropped half frame
        assert_eq!(out.len(), 6 * 512 - 256);
        for &s in &out[256..2048] {
            assert_abs_diff_eq!(s, 0.5, epsilon = 1e-5);
        }
    }

    #[test]
    fn test_chunked_input_matches_whole_frames() {
        let plan = ResamplerPlan::new(Ratio::downsample(2).unwrap(), 0.05).unwrap();
        let signal: Vec<f64> = (0..2048).map(|i| (i as f64 * 0.05).sin()).collect();

        let mut whole = FftResampler::new(Arc::clone(&plan), 512);
        let mut a = Vec::new();
        for chunk in signal.chunks(512) {
            a.extend_from_slice(whole.process(chunk).unwrap());
        }

        let mut split = FftResampler::new(plan, 512);
        let mut b = Vec::new();
        for chunk in signal.chunks(100) {
            b.extend_from_slice(split.process(chunk).unwrap());
        }
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_output_len_predicts_process() {
        let plan = ResamplerPlan::new(Ratio::downsample(2).unwrap(), 0.05).unwrap();
        let mut rs = FftResampler::new(plan, 512);
        let input = vec![0.1; 512];
        assert_eq!(rs.output_len(511), 0);
        for len in [300, 441, 17, 512, 260, 1, 512] {
            let expected = rs.output_len(len);
            assert_eq!(rs.process(&input[..len]).unwrap().len(), expected);
        }
        assert_eq!(rs.max_output_lag(), 512 + 256);
    }

    #[test]
    fn test_clear_restarts_stream() {
        let plan = ResamplerPlan::new(Ratio::upsample(2).unwrap(), 0.05).unwrap();
        let mut rs = FftResampler::new(plan, 512);
        let noise: Vec<f64> = (0..300).map(|i| ((i * 7919) % 13) as f64 - 6.0).collect();
        let _ = rs.process(&noise).unwrap();
        rs.clear();
        let out = rs.process(&[0.0; 512]).unwrap();
        assert_eq!(out.len(), 2 * 512 - 256);
        assert!(out.iter().all(|&s| s == 0.0));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "contract violation")]
    fn test_oversized_chunk_panics_in_debug() {
        let plan = ResamplerPlan::new(Ratio::upsample(2).unwrap(), 0.05).unwrap();
        let mut rs = FftResampler::new(plan, 64);
        let _ = rs.process(&[0.0; 65]);
    }
}
