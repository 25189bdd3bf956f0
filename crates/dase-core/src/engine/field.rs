//! 8-channel oscillator field
//!
//! Each channel is a sine oscillator with its own frequency, amplitude,
//! and phase accumulator. A mono input block excites every channel, and
//! the Φ-modulation state shapes a per-channel gain through the coupling
//! matrix: each channel's modulation phase is rotated by the golden angle
//! so the field never settles into lockstep.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phi::PhiState;
use crate::types::{MultiBuffer, Sample, NUM_CHANNELS, TWO_PI};

/// Golden angle 2π·(1 − 1/Φ), per-channel modulation phase rotation
pub const GOLDEN_ANGLE: f32 = 2.399_963_2;

/// Amplitudes above this are clamped for headroom
const MAX_AMPLITUDE: f32 = 2.0;

#[derive(Debug, Error)]
pub enum FieldError {
    #[error("coupling matrix must be {expected}x{expected}, got {rows}x{cols}")]
    MatrixShape {
        expected: usize,
        rows: usize,
        cols: usize,
    },
    #[error("coupling matrix contains a non-finite entry at [{row}][{col}]")]
    MatrixNonFinite { row: usize, col: usize },
    #[error("amplitude vector must have {expected} entries, got {got}")]
    AmplitudeShape { expected: usize, got: usize },
}

/// Validated 8×8 inter-channel coupling matrix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CouplingMatrix([[f32; NUM_CHANNELS]; NUM_CHANNELS]);

impl CouplingMatrix {
    /// All-zero matrix: no inter-channel coupling
    pub fn zero() -> Self {
        Self([[0.0; NUM_CHANNELS]; NUM_CHANNELS])
    }

    /// Nearest-neighbor ring coupling with the given weight
    pub fn ring(weight: f32) -> Self {
        let mut m = [[0.0; NUM_CHANNELS]; NUM_CHANNELS];
        for (i, row) in m.iter_mut().enumerate() {
            row[(i + 1) % NUM_CHANNELS] = weight;
            row[(i + NUM_CHANNELS - 1) % NUM_CHANNELS] = weight;
        }
        Self(m)
    }

    /// Validate an externally supplied matrix
    ///
    /// Shape and finiteness are checked here, at the control boundary, so
    /// the audio thread never sees a malformed matrix.
    pub fn from_rows(rows: &[Vec<f32>]) -> Result<Self, FieldError> {
        if rows.len() != NUM_CHANNELS || rows.iter().any(|r| r.len() != NUM_CHANNELS) {
            return Err(FieldError::MatrixShape {
                expected: NUM_CHANNELS,
                rows: rows.len(),
                cols: rows.first().map_or(0, Vec::len),
            });
        }
        let mut m = [[0.0; NUM_CHANNELS]; NUM_CHANNELS];
        for (i, row) in rows.iter().enumerate() {
            for (j, &v) in row.iter().enumerate() {
                if !v.is_finite() {
                    return Err(FieldError::MatrixNonFinite { row: i, col: j });
                }
                m[i][j] = v;
            }
        }
        Ok(Self(m))
    }

    #[inline]
    pub fn row(&self, i: usize) -> &[f32; NUM_CHANNELS] {
        &self.0[i]
    }
}

impl Default for CouplingMatrix {
    fn default() -> Self {
        Self::ring(0.1)
    }
}

#[derive(Debug, Clone, Copy)]
struct Channel {
    frequency: f32,
    amplitude: f32,
    phase: f32,
    enabled: bool,
}

impl Default for Channel {
    fn default() -> Self {
        Self {
            frequency: 220.0,
            amplitude: 1.0,
            phase: 0.0,
            enabled: true,
        }
    }
}

/// Raw block statistics handed to the metrics engine
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldBlockStats {
    /// Per-channel RMS over the block
    pub channel_rms: [f32; NUM_CHANNELS],
}

pub struct OscillatorField {
    channels: [Channel; NUM_CHANNELS],
    coupling: CouplingMatrix,
    coupling_strength: f32,
    sample_rate: u32,
    /// Previous block's channel energies, feeding this block's coupling
    prev_rms: [f32; NUM_CHANNELS],
}

impl OscillatorField {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            channels: [Channel::default(); NUM_CHANNELS],
            coupling: CouplingMatrix::default(),
            coupling_strength: 0.5,
            sample_rate,
            prev_rms: [0.0; NUM_CHANNELS],
        }
    }

    /// Set channel frequencies in one call (preset load path)
    pub fn set_frequencies(&mut self, freqs: &[f32; NUM_CHANNELS]) {
        for (i, &f) in freqs.iter().enumerate() {
            self.set_frequency(i, f);
        }
    }

    /// Invalid values hold the previous frequency and log
    pub fn set_frequency(&mut self, channel: usize, frequency: f32) {
        if channel >= NUM_CHANNELS {
            return;
        }
        if !frequency.is_finite() || frequency <= 0.0 {
            log::warn!(
                "[FIELD] Invalid frequency {frequency} for channel {channel}, holding {}",
                self.channels[channel].frequency
            );
            return;
        }
        self.channels[channel].frequency = frequency;
    }

    /// Invalid values hold the previous amplitude and log
    pub fn set_amplitude(&mut self, channel: usize, amplitude: f32) {
        if channel >= NUM_CHANNELS {
            return;
        }
        if !amplitude.is_finite() || amplitude < 0.0 {
            log::warn!(
                "[FIELD] Invalid amplitude {amplitude} for channel {channel}, holding {}",
                self.channels[channel].amplitude
            );
            return;
        }
        self.channels[channel].amplitude = amplitude.min(MAX_AMPLITUDE);
    }

    pub fn set_enabled(&mut self, channel: usize, enabled: bool) {
        if channel < NUM_CHANNELS {
            self.channels[channel].enabled = enabled;
        }
    }

    pub fn set_coupling_strength(&mut self, strength: f32) {
        if strength.is_finite() {
            self.coupling_strength = strength.clamp(0.0, 1.0);
        } else {
            log::warn!("[FIELD] Ignoring non-finite coupling strength");
        }
    }

    pub fn set_coupling_matrix(&mut self, matrix: CouplingMatrix) {
        self.coupling = matrix;
    }

    pub fn frequency(&self, channel: usize) -> f32 {
        self.channels[channel].frequency
    }

    pub fn amplitude(&self, channel: usize) -> f32 {
        self.channels[channel].amplitude
    }

    /// Current phase accumulator, always in [0, 2π)
    pub fn phase(&self, channel: usize) -> f32 {
        self.channels[channel].phase
    }

    pub fn enabled(&self, channel: usize) -> bool {
        self.channels[channel].enabled
    }

    pub fn coupling_strength(&self) -> f32 {
        self.coupling_strength
    }

    pub fn coupling_matrix(&self) -> &CouplingMatrix {
        &self.coupling
    }

    /// Generate one block into `output`
    ///
    /// The mono input excites every channel additively; the Φ state and
    /// the coupling matrix shape a per-channel gain held constant across
    /// the block. Phase accumulators wrap once per block.
    pub fn process_block(
        &mut self,
        input: &[Sample],
        phi: &PhiState,
        output: &mut MultiBuffer,
    ) -> FieldBlockStats {
        let len = output.len();
        debug_assert!(input.len() >= len || input.is_empty());

        let mut stats = FieldBlockStats::default();

        for i in 0..NUM_CHANNELS {
            // Coupling contribution: last block's energies through row i
            let row = self.coupling.row(i);
            let mut coupling_term = 0.0;
            for (j, &w) in row.iter().enumerate() {
                coupling_term += w * self.prev_rms[j];
            }

            // Per-channel modulation gain, golden-angle rotated so no two
            // channels share a modulation phase
            let mod_phase = phi.phase + GOLDEN_ANGLE * i as f32;
            let gain = 1.0
                + self.coupling_strength * phi.depth * mod_phase.sin() * coupling_term;
            let gain = gain.clamp(0.0, 2.0);

            let ch = &mut self.channels[i];
            let phase_inc = TWO_PI * ch.frequency / self.sample_rate as f32;
            let samples = output.channel_mut(i);

            if !ch.enabled {
                samples.fill(0.0);
                // Phase keeps advancing so re-enabling stays continuous
                ch.phase = (ch.phase + phase_inc * len as f32).rem_euclid(TWO_PI);
                continue;
            }

            let mut phase = ch.phase;
            let mut sum_sq = 0.0;
            for (n, sample) in samples.iter_mut().enumerate() {
                let excitation = input.get(n).copied().unwrap_or(0.0);
                let value = (ch.amplitude * phase.sin() + excitation) * gain;
                *sample = value;
                sum_sq += value * value;
                phase += phase_inc;
            }
            // Wrap once per block, not per sample
            ch.phase = phase.rem_euclid(TWO_PI);

            stats.channel_rms[i] = if len > 0 {
                (sum_sq / len as f32).sqrt()
            } else {
                0.0
            };
        }

        self.prev_rms = stats.channel_rms;
        stats
    }
}
