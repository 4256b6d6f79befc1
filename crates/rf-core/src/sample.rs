//! Sample types and multi-channel buffer views

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Read access to a set of equally addressed channels.
///
/// Implemented for [`ChannelBuffer`] and for slices/vectors of anything that
/// derefs to `[Sample]`, so callers can hand over `&[&[f64]]`, `Vec<Vec<f64>>`
/// or an owned scratch buffer without copying.
pub trait Channels {
    fn num_channels(&self) -> usize;

    fn channel(&self, index: usize) -> &[Sample];

    /// Shortest channel length across the first `count` channels.
    fn min_len(&self, count: usize) -> usize {
        (0..count.min(self.num_channels()))
            .map(|ch| self.channel(ch).len())
            .min()
            .unwrap_or(0)
    }
}

/// Write access on top of [`Channels`].
pub trait ChannelsMut: Channels {
    fn channel_mut(&mut self, index: usize) -> &mut [Sample];
}

impl<V: AsRef<[Sample]>> Channels for [V] {
    #[inline]
    fn num_channels(&self) -> usize {
        self.len()
    }

    #[inline]
    fn channel(&self, index: usize) -> &[Sample] {
        self[index].as_ref()
    }
}

impl<V: AsRef<[Sample]> + AsMut<[Sample]>> ChannelsMut for [V] {
    #[inline]
    fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        self[index].as_mut()
    }
}

impl<V: AsRef<[Sample]>> Channels for Vec<V> {
    #[inline]
    fn num_channels(&self) -> usize {
        self.len()
    }

    #[inline]
    fn channel(&self, index: usize) -> &[Sample] {
        self[index].as_ref()
    }
}

impl<V: AsRef<[Sample]> + AsMut<[Sample]>> ChannelsMut for Vec<V> {
    #[inline]
    fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        self[index].as_mut()
    }
}

impl<V: AsRef<[Sample]>, const N: usize> Channels for [V; N] {
    #[inline]
    fn num_channels(&self) -> usize {
        N
    }

    #[inline]
    fn channel(&self, index: usize) -> &[Sample] {
        self[index].as_ref()
    }
}

impl<V: AsRef<[Sample]> + AsMut<[Sample]>, const N: usize> ChannelsMut for [V; N] {
    #[inline]
    fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        self[index].as_mut()
    }
}

/// Planar multi-channel buffer with one contiguous allocation.
///
/// Every channel exposes `capacity` samples. Resizing keeps the allocation
/// whenever the new layout fits, so reconfiguring to a smaller layout never
/// reallocates.
#[derive(Debug, Clone, Default)]
pub struct ChannelBuffer {
    data: Vec<Sample>,
    num_channels: usize,
    capacity: usize,
}

impl ChannelBuffer {
    pub fn new(num_channels: usize, capacity: usize) -> Self {
        Self {
            data: vec![0.0; num_channels * capacity],
            num_channels,
            capacity,
        }
    }

    /// Samples addressable per channel
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change the layout. Contents are zeroed.
    pub fn resize(&mut self, num_channels: usize, capacity: usize) {
        self.num_channels = num_channels;
        self.capacity = capacity;
        self.data.clear();
        self.data.resize(num_channels * capacity, 0.0);
    }

    /// Total allocated samples (all channels)
    pub fn allocated(&self) -> usize {
        self.data.capacity()
    }

    pub fn clear(&mut self) {
        self.data.fill(0.0);
    }

    /// Copy the first `len` samples of every channel into owned vectors.
    pub fn to_vecs(&self, len: usize) -> Vec<Vec<Sample>> {
        (0..self.num_channels)
            .map(|ch| self.channel(ch)[..len].to_vec())
            .collect()
    }
}

impl Channels for ChannelBuffer {
    #[inline]
    fn num_channels(&self) -> usize {
        self.num_channels
    }

    #[inline]
    fn channel(&self, index: usize) -> &[Sample] {
        let start = index * self.capacity;
        &self.data[start..start + self.capacity]
    }
}

impl ChannelsMut for ChannelBuffer {
    #[inline]
    fn channel_mut(&mut self, index: usize) -> &mut [Sample] {
        let start = index * self.capacity;
        &mut self.data[start..start + self.capacity]
    }
}

/// Gather `frames.len()` samples starting at `start` from channels
/// `first..first + active` into interleaved `W`-lane frames.
///
/// Lanes past `active` repeat the last active channel so that every lane
/// carries finite data; their results are discarded by the caller.
#[inline]
pub fn interleave_frames<C, const W: usize>(
    src: &C,
    first: usize,
    active: usize,
    start: usize,
    frames: &mut [[Sample; W]],
) where
    C: Channels + ?Sized,
{
    debug_assert!(active >= 1 && active <= W);
    let len = frames.len();
    for lane in 0..W {
        let ch = first + lane.min(active - 1);
        let samples = &src.channel(ch)[start..start + len];
        for (frame, &s) in frames.iter_mut().zip(samples) {
            frame[lane] = s;
        }
    }
}

/// Scatter the first `active` lanes of interleaved frames back into channels
/// `first..first + active`, starting at `start`.
#[inline]
pub fn deinterleave_frames<C, const W: usize>(
    dst: &mut C,
    first: usize,
    active: usize,
    start: usize,
    frames: &[[Sample; W]],
) where
    C: ChannelsMut + ?Sized,
{
    let len = frames.len();
    for lane in 0..active.min(W) {
        let samples = &mut dst.channel_mut(first + lane)[start..start + len];
        for (s, frame) in samples.iter_mut().zip(frames) {
            *s = frame[lane];
        }
    }
}
