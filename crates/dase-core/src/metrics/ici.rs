//! Inter-channel interaction (ICI) spectral engine
//!
//! Per block: Hann-windowed real FFT of each oscillator channel, then the
//! pairwise cross-spectral measure
//!
//!   pair[i][j] = (mean_f(|Ai|·|Aj|) / meanMag²) · mean_f(cos(φi − φj))
//!
//! ICI is the off-diagonal mean remapped from [−1, 1] to [0, 1], smoothed
//! exponentially. All FFT plans and scratch are allocated up front; the
//! per-block path does no allocation at the configured block size.

use realfft::num_complex::Complex;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

use crate::types::{MultiBuffer, NUM_CHANNELS};

/// Below this mean squared magnitude the block counts as silence
const SILENCE_THRESHOLD: f32 = 1e-10;

/// Exponential smoothing factor for the scalar ICI
const DEFAULT_SMOOTHING_ALPHA: f32 = 0.2;

/// Per-block spectral metrics
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpectralMetrics {
    /// Smoothed inter-channel interaction, [0, 1]
    pub ici: f32,
    /// Pairwise phase alignment, [0, 1]
    pub phase_coherence: f32,
    /// Centroid of the channel-averaged spectrum, Hz
    pub spectral_centroid: f32,
}

impl Default for SpectralMetrics {
    fn default() -> Self {
        Self {
            ici: 0.5,
            phase_coherence: 0.5,
            spectral_centroid: 0.0,
        }
    }
}

pub struct IciEngine {
    sample_rate: u32,
    fft_len: usize,
    fft: Arc<dyn RealToComplex<f32>>,
    window: Vec<f32>,

    // Pre-allocated per-block scratch
    time_scratch: Vec<f32>,
    fft_scratch: Vec<Complex<f32>>,
    spectra: Vec<Vec<Complex<f32>>>,
    magnitudes: Vec<Vec<f32>>,
    phases: Vec<Vec<f32>>,
    avg_magnitude: Vec<f32>,

    pair_matrix: [[f32; NUM_CHANNELS]; NUM_CHANNELS],
    smoothing_alpha: f32,
    smoothed: SpectralMetrics,
}

impl IciEngine {
    pub fn new(sample_rate: u32, block_len: usize) -> Self {
        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(block_len);
        let bins = block_len / 2 + 1;
        Self {
            sample_rate,
            fft_len: block_len,
            fft_scratch: fft.make_scratch_vec(),
            fft,
            window: hann_window(block_len),
            time_scratch: vec![0.0; block_len],
            spectra: vec![vec![Complex::default(); bins]; NUM_CHANNELS],
            magnitudes: vec![vec![0.0; bins]; NUM_CHANNELS],
            phases: vec![vec![0.0; bins]; NUM_CHANNELS],
            avg_magnitude: vec![0.0; bins],
            pair_matrix: [[0.0; NUM_CHANNELS]; NUM_CHANNELS],
            smoothing_alpha: DEFAULT_SMOOTHING_ALPHA,
            smoothed: SpectralMetrics::default(),
        }
    }

    pub fn set_smoothing_alpha(&mut self, alpha: f32) {
        if alpha.is_finite() && alpha > 0.0 && alpha <= 1.0 {
            self.smoothing_alpha = alpha;
        } else {
            log::warn!("[ICI] Ignoring invalid smoothing alpha {alpha}");
        }
    }

    /// The raw pair matrix from the last computed block (diagonal is 0)
    pub fn pair_matrix(&self) -> &[[f32; NUM_CHANNELS]; NUM_CHANNELS] {
        &self.pair_matrix
    }

    pub fn last_metrics(&self) -> SpectralMetrics {
        self.smoothed
    }

    /// Compute metrics for one block
    ///
    /// Near-silence and non-finite input both degrade to the last smoothed
    /// values instead of emitting NaN.
    pub fn compute(&mut self, input: &MultiBuffer) -> SpectralMetrics {
        if input.len() != self.fft_len {
            // Device renegotiation changed the block size; re-plan once
            log::debug!(
                "[ICI] Block length changed {} -> {}, rebuilding FFT plan",
                self.fft_len,
                input.len()
            );
            *self = Self::with_smoothed(self.sample_rate, input.len(), self.smoothed);
        }

        if input.has_non_finite() {
            log::warn!("[ICI] Non-finite sample in input block, holding last metrics");
            return self.smoothed;
        }

        for ch in 0..NUM_CHANNELS {
            let samples = input.channel(ch);
            for (dst, (s, w)) in self
                .time_scratch
                .iter_mut()
                .zip(samples.iter().zip(self.window.iter()))
            {
                *dst = s * w;
            }
            // Lengths match by construction
            let _ = self.fft.process_with_scratch(
                &mut self.time_scratch,
                &mut self.spectra[ch],
                &mut self.fft_scratch,
            );
            for (bin, spec) in self.spectra[ch].iter().enumerate() {
                self.magnitudes[ch][bin] = spec.norm();
                self.phases[ch][bin] = spec.arg();
            }
        }

        let bins = self.avg_magnitude.len();
        for bin in 0..bins {
            let mut sum = 0.0;
            for ch in 0..NUM_CHANNELS {
                sum += self.magnitudes[ch][bin];
            }
            self.avg_magnitude[bin] = sum / NUM_CHANNELS as f32;
        }

        let mean_mag =
            self.avg_magnitude.iter().sum::<f32>() / bins as f32;
        let mean_mag_sq = mean_mag * mean_mag;

        if mean_mag_sq < SILENCE_THRESHOLD {
            self.pair_matrix = [[0.0; NUM_CHANNELS]; NUM_CHANNELS];
            return self.smoothed;
        }

        let mut pair_sum = 0.0;
        let mut phase_sum = 0.0;
        for i in 0..NUM_CHANNELS {
            for j in 0..NUM_CHANNELS {
                if i == j {
                    self.pair_matrix[i][j] = 0.0;
                    continue;
                }
                let mut cross_mag = 0.0;
                let mut cos_phase = 0.0;
                for bin in 0..bins {
                    cross_mag += self.magnitudes[i][bin] * self.magnitudes[j][bin];
                    cos_phase += (self.phases[i][bin] - self.phases[j][bin]).cos();
                }
                cross_mag /= bins as f32;
                cos_phase /= bins as f32;

                let value = (cross_mag / mean_mag_sq) * cos_phase;
                self.pair_matrix[i][j] = value;
                pair_sum += value;
                phase_sum += cos_phase;
            }
        }

        let pairs = (NUM_CHANNELS * (NUM_CHANNELS - 1)) as f32;
        let raw_ici = (pair_sum / pairs + 1.0) / 2.0;
        let raw_ici = raw_ici.clamp(0.0, 1.0);
        let coherence = ((phase_sum / pairs + 1.0) / 2.0).clamp(0.0, 1.0);

        let centroid = spectral_centroid(&self.avg_magnitude, self.sample_rate, self.fft_len);

        if !raw_ici.is_finite() || !coherence.is_finite() || !centroid.is_finite() {
            return self.smoothed;
        }

        let alpha = self.smoothing_alpha;
        self.smoothed = SpectralMetrics {
            ici: alpha * raw_ici + (1.0 - alpha) * self.smoothed.ici,
            phase_coherence: coherence,
            spectral_centroid: centroid,
        };
        self.smoothed
    }

    fn with_smoothed(sample_rate: u32, block_len: usize, smoothed: SpectralMetrics) -> Self {
        let mut engine = Self::new(sample_rate, block_len);
        engine.smoothed = smoothed;
        engine
    }
}

fn hann_window(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            let x = i as f32 / len as f32;
            0.5 * (1.0 - (crate::types::TWO_PI * x).cos())
        })
        .collect()
}

/// Σ(f·|X(f)|) / Σ|X(f)| over the averaged spectrum, in Hz
fn spectral_centroid(magnitudes: &[f32], sample_rate: u32, fft_len: usize) -> f32 {
    let total: f32 = magnitudes.iter().sum();
    if total <= 0.0 {
        return 0.0;
    }
    let bin_hz = sample_rate as f32 / fft_len as f32;
    let weighted: f32 = magnitudes
        .iter()
        .enumerate()
        .map(|(bin, mag)| bin as f32 * bin_hz * mag)
        .sum();
    weighted / total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TWO_PI;

    fn sine_block(freqs: &[f32; NUM_CHANNELS], phases: &[f32; NUM_CHANNELS]) -> MultiBuffer {
        let mut buf = MultiBuffer::silence(512);
        for ch in 0..NUM_CHANNELS {
            let channel = buf.channel_mut(ch);
            for (n, sample) in channel.iter_mut().enumerate() {
                let t = n as f32 / 48000.0;
                *sample = (TWO_PI * freqs[ch] * t + phases[ch]).sin();
            }
        }
        buf
    }

    #[test]
    fn test_ici_bounded_and_diagonal_zero() {
        let mut engine = IciEngine::new(48000, 512);
        let freqs = [100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0];
        let block = sine_block(&freqs, &[0.0; NUM_CHANNELS]);
        for _ in 0..20 {
            let metrics = engine.compute(&block);
            assert!(metrics.ici >= 0.0 && metrics.ici <= 1.0);
            assert!(metrics.phase_coherence >= 0.0 && metrics.phase_coherence <= 1.0);
            assert!(metrics.spectral_centroid >= 0.0);
        }
        for i in 0..NUM_CHANNELS {
            assert_eq!(engine.pair_matrix()[i][i], 0.0);
        }
    }

    #[test]
    fn test_identical_channels_read_coherent() {
        let mut engine = IciEngine::new(48000, 512);
        let block = sine_block(&[220.0; NUM_CHANNELS], &[0.0; NUM_CHANNELS]);
        let mut metrics = SpectralMetrics::default();
        for _ in 0..50 {
            metrics = engine.compute(&block);
        }
        // Identical signals: full phase alignment
        assert!(metrics.phase_coherence > 0.9);
        assert!(metrics.ici > 0.5);
    }

    #[test]
    fn test_silence_holds_last_value_and_zeroes_matrix() {
        let mut engine = IciEngine::new(48000, 512);
        let freqs = [100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0];
        let block = sine_block(&freqs, &[0.0; NUM_CHANNELS]);
        let before = engine.compute(&block);

        let silent = MultiBuffer::silence(512);
        let after = engine.compute(&silent);
        assert_eq!(after, before);
        for row in engine.pair_matrix() {
            for v in row {
                assert_eq!(*v, 0.0);
            }
        }
    }

    #[test]
    fn test_nan_input_short_circuits() {
        let mut engine = IciEngine::new(48000, 512);
        let freqs = [100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0];
        let block = sine_block(&freqs, &[0.0; NUM_CHANNELS]);
        let before = engine.compute(&block);

        let mut poisoned = sine_block(&freqs, &[0.0; NUM_CHANNELS]);
        poisoned.channel_mut(4)[17] = f32::NAN;
        let after = engine.compute(&poisoned);
        assert_eq!(after, before);
        assert!(after.ici.is_finite());
    }

    #[test]
    fn test_ici_converges_on_periodic_input() {
        let mut engine = IciEngine::new(48000, 512);
        let freqs = [100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0];
        let block = sine_block(&freqs, &[0.0; NUM_CHANNELS]);
        let mut last = 0.0;
        for _ in 0..100 {
            last = engine.compute(&block).ici;
        }
        // Same block every time: smoothing has converged
        let next = engine.compute(&block).ici;
        assert!((next - last).abs() < 1e-4);
    }

    #[test]
    fn test_spectral_centroid_tracks_frequency() {
        let mut engine_low = IciEngine::new(48000, 512);
        let mut engine_high = IciEngine::new(48000, 512);
        let low = sine_block(&[200.0; NUM_CHANNELS], &[0.0; NUM_CHANNELS]);
        let high = sine_block(&[4000.0; NUM_CHANNELS], &[0.0; NUM_CHANNELS]);
        let c_low = engine_low.compute(&low).spectral_centroid;
        let c_high = engine_high.compute(&high).spectral_centroid;
        assert!(c_high > c_low);
    }

    #[test]
    fn test_smoothing_alpha_validation() {
        let mut engine = IciEngine::new(48000, 512);
        engine.set_smoothing_alpha(f32::NAN);
        engine.set_smoothing_alpha(0.0);
        engine.set_smoothing_alpha(1.5);
        // All rejected; smoothing still behaves with the default
        let block = sine_block(&[220.0; NUM_CHANNELS], &[0.0; NUM_CHANNELS]);
        let metrics = engine.compute(&block);
        assert!(metrics.ici.is_finite());
    }
}
