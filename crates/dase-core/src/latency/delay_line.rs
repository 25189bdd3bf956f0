//! Fractional delay line for latency compensation
//!
//! Ring buffer with a fractional read tap. Linear interpolation between
//! the two neighboring samples keeps sub-sample delays audibly smooth when
//! drift corrections nudge the offset by fractions of a sample.

use crate::types::{StereoBuffer, StereoSample};

/// Maximum compensable delay in seconds
pub const MAX_DELAY_SECS: f32 = 0.2;

pub struct FractionalDelayLine {
    buffer: Vec<StereoSample>,
    write_pos: usize,
    delay_samples: f32,
}

impl FractionalDelayLine {
    /// Create a delay line sized for `MAX_DELAY_SECS` at the given rate
    pub fn new(sample_rate: u32) -> Self {
        let max_samples = (sample_rate as f32 * MAX_DELAY_SECS) as usize + 2;
        Self {
            buffer: vec![StereoSample::silence(); max_samples],
            write_pos: 0,
            delay_samples: 0.0,
        }
    }

    /// Set the delay in (possibly fractional) samples
    pub fn set_delay_samples(&mut self, samples: f32) {
        let max = (self.buffer.len() - 2) as f32;
        if samples > max {
            log::warn!(
                "Compensation delay {:.1} samples exceeds buffer size {}, clamping! Alignment will be off.",
                samples,
                self.buffer.len()
            );
        }
        self.delay_samples = samples.clamp(0.0, max);
    }

    pub fn delay_samples(&self) -> f32 {
        self.delay_samples
    }

    /// Process a single sample through the delay line
    #[inline]
    pub fn process(&mut self, input: StereoSample) -> StereoSample {
        self.buffer[self.write_pos] = input;

        let len = self.buffer.len();
        let whole = self.delay_samples.floor();
        let frac = self.delay_samples - whole;
        let whole = whole as usize;

        // Two taps behind the write position, wrapped
        let read_a = (self.write_pos + len - whole) % len;
        let read_b = (self.write_pos + len - whole - 1) % len;

        let a = self.buffer[read_a];
        let b = self.buffer[read_b];
        let output = a * (1.0 - frac) + b * frac;

        self.write_pos = (self.write_pos + 1) % len;
        output
    }

    /// Process a whole block in place
    pub fn process_block(&mut self, buffer: &mut StereoBuffer) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Clear the delay line (fill with silence)
    pub fn clear(&mut self) {
        self.buffer.fill(StereoSample::silence());
        self.write_pos = 0;
    }
}
