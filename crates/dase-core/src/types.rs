//! Common types for the D-ASE core
//!
//! Fundamental audio types shared across the engine: stereo and
//! multichannel block buffers, the oscillator channel count, and the
//! golden-ratio constants that bound Φ-modulation depth.

use std::ops::{Index, IndexMut};

/// Default sample rate (48kHz - standard professional audio rate)
/// This is the default; the actual rate is negotiated with the device.
pub const SAMPLE_RATE: u32 = 48000;

/// Default processing block size in frames (~10.7ms at 48kHz)
pub const BUFFER_SIZE: usize = 512;

/// Maximum buffer size to pre-allocate for real-time safety
/// Covers common device configurations (64..4096). Pre-allocating to this
/// size eliminates allocations in the audio callback.
pub const MAX_BUFFER_SIZE: usize = 8192;

/// Number of oscillator channels in the field
pub const NUM_CHANNELS: usize = 8;

/// Golden ratio Φ - upper bound for modulation depth
pub const PHI: f32 = 1.618033988749895;

/// 1/Φ = Φ - 1 - lower bound for modulation depth
pub const PHI_INV: f32 = 0.618033988749895;

pub const TWO_PI: f32 = 2.0 * std::f32::consts::PI;

/// Audio sample type (32-bit float throughout the processing chain)
pub type Sample = f32;

/// A single stereo sample (left and right channels)
///
/// Uses `#[repr(C)]` to ensure predictable memory layout: [left, right].
/// This enables zero-copy conversion between `&[StereoSample]` and `&[f32]`
/// (interleaved format) using bytemuck.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StereoSample {
    pub left: Sample,
    pub right: Sample,
}

impl StereoSample {
    #[inline]
    pub fn new(left: Sample, right: Sample) -> Self {
        Self { left, right }
    }

    /// Create a silent stereo sample
    #[inline]
    pub fn silence() -> Self {
        Self::default()
    }

    /// Get the peak amplitude (max of abs(left), abs(right))
    #[inline]
    pub fn peak(&self) -> Sample {
        self.left.abs().max(self.right.abs())
    }
}

impl std::ops::Add for StereoSample {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Self {
            left: self.left + other.left,
            right: self.right + other.right,
        }
    }
}

impl std::ops::AddAssign for StereoSample {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.left += other.left;
        self.right += other.right;
    }
}

impl std::ops::Mul<Sample> for StereoSample {
    type Output = Self;

    #[inline]
    fn mul(self, factor: Sample) -> Self {
        Self {
            left: self.left * factor,
            right: self.right * factor,
        }
    }
}

impl std::ops::MulAssign<Sample> for StereoSample {
    #[inline]
    fn mul_assign(&mut self, factor: Sample) {
        self.left *= factor;
        self.right *= factor;
    }
}

/// A buffer of stereo samples
///
/// The primary stereo block type. Pre-allocate with `silence(MAX_BUFFER_SIZE)`
/// and use `set_len_from_capacity` inside the callback for RT safety.
#[derive(Debug, Clone)]
pub struct StereoBuffer {
    samples: Vec<StereoSample>,
}

impl StereoBuffer {
    /// Create a buffer filled with silence
    pub fn silence(len: usize) -> Self {
        Self {
            samples: vec![StereoSample::silence(); len],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Set the working length of a pre-allocated buffer (real-time safe)
    ///
    /// Fills newly exposed elements with silence. Use for pre-allocated
    /// buffers only; growing past capacity would allocate.
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        let current_len = self.samples.len();
        if new_len > current_len {
            debug_assert!(
                new_len <= self.samples.capacity(),
                "set_len_from_capacity called with len > capacity"
            );
            self.samples.resize(new_len, StereoSample::silence());
        } else {
            self.samples.truncate(new_len);
        }
    }

    /// Fill the buffer with silence
    pub fn fill_silence(&mut self) {
        self.samples.fill(StereoSample::silence());
    }

    #[inline]
    pub fn as_slice(&self) -> &[StereoSample] {
        &self.samples
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [StereoSample] {
        &mut self.samples
    }

    /// Zero-copy view of samples as interleaved f32 [L, R, L, R, ...]
    #[inline]
    pub fn as_interleaved(&self) -> &[Sample] {
        bytemuck::cast_slice(&self.samples)
    }

    pub fn iter(&self) -> impl Iterator<Item = &StereoSample> {
        self.samples.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut StereoSample> {
        self.samples.iter_mut()
    }

    /// Get the peak amplitude in the buffer
    pub fn peak(&self) -> Sample {
        self.samples.iter().map(|s| s.peak()).fold(0.0, Sample::max)
    }
}

impl Index<usize> for StereoBuffer {
    type Output = StereoSample;

    #[inline]
    fn index(&self, index: usize) -> &Self::Output {
        &self.samples[index]
    }
}

impl IndexMut<usize> for StereoBuffer {
    #[inline]
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.samples[index]
    }
}

impl Default for StereoBuffer {
    fn default() -> Self {
        Self { samples: Vec::new() }
    }
}

/// Planar multichannel block: NUM_CHANNELS rows of samples
///
/// One row per oscillator channel. Rows share a working length that is
/// adjusted per callback without allocation, mirroring `StereoBuffer`.
#[derive(Debug, Clone)]
pub struct MultiBuffer {
    channels: [Vec<Sample>; NUM_CHANNELS],
    len: usize,
}

impl MultiBuffer {
    /// Create a buffer with all channels silenced at the given length
    pub fn silence(len: usize) -> Self {
        Self {
            channels: std::array::from_fn(|_| vec![0.0; len]),
            len,
        }
    }

    /// Working length in frames
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Set the working length (real-time safe for pre-allocated buffers)
    #[inline]
    pub fn set_len_from_capacity(&mut self, new_len: usize) {
        for ch in &mut self.channels {
            if new_len > ch.len() {
                debug_assert!(new_len <= ch.capacity());
                ch.resize(new_len, 0.0);
            } else {
                ch.truncate(new_len);
            }
        }
        self.len = new_len;
    }

    /// Fill all channels with silence
    pub fn fill_silence(&mut self) {
        for ch in &mut self.channels {
            ch.fill(0.0);
        }
    }

    #[inline]
    pub fn channel(&self, idx: usize) -> &[Sample] {
        &self.channels[idx]
    }

    #[inline]
    pub fn channel_mut(&mut self, idx: usize) -> &mut [Sample] {
        &mut self.channels[idx]
    }

    /// RMS level of one channel over the working length
    pub fn channel_rms(&self, idx: usize) -> Sample {
        let ch = &self.channels[idx];
        if ch.is_empty() {
            return 0.0;
        }
        let sum_sq: f32 = ch.iter().map(|s| s * s).sum();
        (sum_sq / ch.len() as f32).sqrt()
    }

    /// True if any sample in any channel is NaN or infinite
    pub fn has_non_finite(&self) -> bool {
        self.channels
            .iter()
            .any(|ch| ch.iter().any(|s| !s.is_finite()))
    }
}

impl Default for MultiBuffer {
    fn default() -> Self {
        Self::silence(0)
    }
}
