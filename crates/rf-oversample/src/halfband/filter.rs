//! Lane-parallel polyphase half-band kernels
//!
//! One kernel instance filters `W` channels at once over interleaved
//! `[f64; W]` frames. Allpass memory is shared between consecutive sections
//! of a path: section `j` reads its input history from `mem[j]` and its
//! output history from `mem[j + 2]`, which is also the input history of
//! section `j + 2`.

use std::marker::PhantomData;

/// Rate-change direction of a half-band kernel.
pub trait Direction: Send + Sync + 'static {
    const NAME: &'static str;

    /// Output samples produced by `input` samples.
    fn output_len(input: usize) -> usize;

    /// Cascade stage used at `step` (0-based) of a conversion at `order`.
    fn stage_at(step: usize, order: usize) -> usize;

    fn process_frames<const W: usize>(
        filter: &mut HalfbandFilter<W, Self>,
        input: &[[f64; W]],
        output: &mut [[f64; W]],
    ) where
        Self: Sized;
}

/// Rate doubling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Up;

/// Rate halving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Down;

/// Half-band polyphase allpass filter over `W` lanes.
#[derive(Debug, Clone)]
pub struct HalfbandFilter<const W: usize, D> {
    coefs: Vec<f64>,
    mem: Vec<[f64; W]>,
    _direction: PhantomData<D>,
}

pub type Upsample2x<const W: usize> = HalfbandFilter<W, Up>;
pub type Downsample2x<const W: usize> = HalfbandFilter<W, Down>;

impl<const W: usize, D> HalfbandFilter<W, D> {
    pub fn new(coefs: &[f64]) -> Self {
        let mut filter = Self {
            coefs: Vec::new(),
            mem: Vec::new(),
            _direction: PhantomData,
        };
        filter.set_coefficients(coefs);
        filter
    }

    /// Replace coefficients and clear memory. Allocates when the section
    /// count grows; control thread only.
    pub fn set_coefficients(&mut self, coefs: &[f64]) {
        self.coefs.clear();
        self.coefs.extend_from_slice(coefs);
        self.mem.clear();
        self.mem.resize(coefs.len() + 2, [0.0; W]);
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coefs
    }

    pub fn clear_buffers(&mut self) {
        self.mem.fill([0.0; W]);
    }

    pub const fn lanes(&self) -> usize {
        W
    }

    /// Run both allpass paths on one sample pair: `spl[0]` through path 0,
    /// `spl[1]` through path 1.
    #[inline(always)]
    fn process_pair(&mut self, spl: &mut [[f64; W]; 2]) {
        let nc = self.coefs.len();
        for (j, &c) in self.coefs.iter().enumerate() {
            let path = j & 1;
            let x = spl[path];
            let prev_in = self.mem[j];
            let prev_out = self.mem[j + 2];
            let mut y = [0.0; W];
            for lane in 0..W {
                y[lane] = (x[lane] - prev_out[lane]) * c + prev_in[lane];
            }
            self.mem[j] = x;
            spl[path] = y;
        }
        self.mem[nc] = spl[nc & 1];
        self.mem[nc + 1] = spl[(nc + 1) & 1];
    }
}

impl<const W: usize> HalfbandFilter<W, Up> {
    /// `output` receives `2 * input.len()` frames.
    #[inline]
    pub fn upsample(&mut self, input: &[[f64; W]], output: &mut [[f64; W]]) {
        debug_assert!(output.len() >= input.len() * 2);
        for (x, out) in input.iter().zip(output.chunks_exact_mut(2)) {
            let mut spl = [*x, *x];
            self.process_pair(&mut spl);
            out[0] = spl[0];
            out[1] = spl[1];
        }
    }
}

impl<const W: usize> HalfbandFilter<W, Down> {
    /// `input` holds `2 * output.len()` frames.
    #[inline]
    pub fn downsample(&mut self, input: &[[f64; W]], output: &mut [[f64; W]]) {
        debug_assert!(input.len() >= output.len() * 2);
        for (pair, out) in input.chunks_exact(2).zip(output.iter_mut()) {
            let mut spl = [pair[1], pair[0]];
            self.process_pair(&mut spl);
            for lane in 0..W {
                out[lane] = 0.5 * (spl[0][lane] + spl[1][lane]);
            }
        }
    }
}

impl Direction for Up {
    const NAME: &'static str = "up";

    #[inline]
    fn output_len(input: usize) -> usize {
        input * 2
    }

    #[inline]
    fn stage_at(step: usize, _order: usize) -> usize {
        step
    }

    #[inline]
    fn process_frames<const W: usize>(
        filter: &mut HalfbandFilter<W, Self>,
        input: &[[f64; W]],
        output: &mut [[f64; W]],
    ) {
        filter.upsample(input, output);
    }
}

impl Direction for Down {
    const NAME: &'static str = "down";

    #[inline]
    fn output_len(input: usize) -> usize {
        input / 2
    }

    #[inline]
    fn stage_at(step: usize, order: usize) -> usize {
        order - 1 - step
    }

    #[inline]
    fn process_frames<const W: usize>(
        filter: &mut HalfbandFilter<W, Self>,
        input: &[[f64; W]],
        output: &mut [[f64; W]],
    ) {
        filter.downsample(input, output);
    }
}
