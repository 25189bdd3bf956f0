//! Φ-modulation controller
//!
//! Owns one instance of every modulation source and arbitrates which one
//! drives the oscillator field. Mode switches are deferred to the next
//! block boundary and blended with a 100ms equal-power crossfade so the
//! depth/phase trajectory never jumps.

pub mod sources;

pub use sources::{
    AudioEnvelopeSource, InternalOscillatorSource, ManualSource, MidiSource, PhiMode, PhiState,
    SensorSource,
};

use crate::types::Sample;

/// Crossfade duration for source transitions
const CROSSFADE_SECS: f64 = 0.1;

/// Arbitrates the five Φ sources and produces one blended state per block
pub struct PhiModulator {
    manual: ManualSource,
    audio: AudioEnvelopeSource,
    internal: InternalOscillatorSource,
    midi: MidiSource,
    sensor: SensorSource,

    current_mode: PhiMode,
    previous_mode: Option<PhiMode>,
    crossfade_start: f64,
    pending_mode: Option<PhiMode>,

    current_state: PhiState,
}

impl PhiModulator {
    pub fn new() -> Self {
        Self {
            manual: ManualSource::new(),
            audio: AudioEnvelopeSource::new(20.0, 100.0),
            internal: InternalOscillatorSource::new(0.1),
            midi: MidiSource::new(),
            sensor: SensorSource::new(),
            current_mode: PhiMode::Internal,
            previous_mode: None,
            crossfade_start: 0.0,
            pending_mode: None,
            current_state: PhiState::default(),
        }
    }

    pub fn mode(&self) -> PhiMode {
        self.current_mode
    }

    pub fn state(&self) -> PhiState {
        self.current_state
    }

    /// Request a source switch; takes effect at the next block boundary
    pub fn set_mode(&mut self, mode: PhiMode) {
        if mode == self.current_mode && self.pending_mode.is_none() {
            return;
        }
        self.pending_mode = Some(mode);
    }

    /// Advance the active source for one block and return the blended state
    pub fn update(&mut self, input: &[Sample], now: f64) -> PhiState {
        if let Some(next) = self.pending_mode.take() {
            if next != self.current_mode {
                log::info!(
                    "[PHI] Source transition {} -> {}",
                    self.current_mode.as_str(),
                    next.as_str()
                );
                self.previous_mode = Some(self.current_mode);
                self.current_mode = next;
                self.crossfade_start = now;
            }
        }

        let mut state = self.update_source(self.current_mode, input, now);

        if let Some(prev) = self.previous_mode {
            let progress = ((now - self.crossfade_start) / CROSSFADE_SECS).clamp(0.0, 1.0);
            if progress >= 1.0 {
                self.previous_mode = None;
            } else {
                // Equal-power blend of the outgoing source's last state
                let prev_state = self.source_state(prev);
                let alpha = 0.5 * (1.0 - (progress * std::f64::consts::PI).cos()) as f32;
                state.depth = prev_state.depth * (1.0 - alpha) + state.depth * alpha;
                state.phase = blend_phase(prev_state.phase, state.phase, alpha);
                state = state.clamped();
            }
        }

        self.current_state = state;
        state
    }

    fn update_source(&mut self, mode: PhiMode, input: &[Sample], now: f64) -> PhiState {
        match mode {
            PhiMode::Manual => self.manual.update(now),
            PhiMode::Audio => self.audio.update(input, now),
            PhiMode::Internal => self.internal.update(now),
            PhiMode::Midi => self.midi.update(now),
            PhiMode::Sensor => self.sensor.update(now),
        }
    }

    fn source_state(&self, mode: PhiMode) -> PhiState {
        match mode {
            PhiMode::Manual => self.manual.state(),
            PhiMode::Audio => self.audio.state(),
            PhiMode::Internal => self.internal.state(),
            PhiMode::Midi => self.midi.state(),
            PhiMode::Sensor => self.sensor.state(),
        }
    }

    // Setter pass-throughs for the command layer

    pub fn set_manual_phase(&mut self, phase: f32) {
        self.manual.set_phase(phase);
    }

    pub fn set_manual_depth(&mut self, depth: f32) {
        self.manual.set_depth(depth);
    }

    pub fn set_internal_frequency(&mut self, frequency: f32) {
        self.internal.set_frequency(frequency);
    }

    pub fn midi_cc1(&mut self, value: u8) {
        self.midi.set_cc1(value);
    }

    pub fn midi_pitch_bend(&mut self, value: u16) {
        self.midi.set_pitch_bend(value);
    }

    pub fn sensor_heart_rate(&mut self, bpm: f32) {
        self.sensor.set_heart_rate(bpm);
    }

    pub fn sensor_gsr(&mut self, gsr: f32) {
        self.sensor.set_gsr(gsr);
    }

    pub fn sensor_accelerometer(&mut self, x: f32, y: f32, z: f32) {
        self.sensor.set_accelerometer(x, y, z);
    }
}

impl Default for PhiModulator {
    fn default() -> Self {
        Self::new()
    }
}

/// Blend two phases along the shortest arc, result wrapped to [0, 2π)
fn blend_phase(from: f32, to: f32, alpha: f32) -> f32 {
    use crate::types::TWO_PI;
    let mut diff = to - from;
    if diff > std::f32::consts::PI {
        diff -= TWO_PI;
    } else if diff < -std::f32::consts::PI {
        diff += TWO_PI;
    }
    (from + diff * alpha).rem_euclid(TWO_PI)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PHI, PHI_INV, TWO_PI};

    const BLOCK_SECS: f64 = 512.0 / 48000.0;

    #[test]
    fn test_default_mode_is_internal() {
        let modulator = PhiModulator::new();
        assert_eq!(modulator.mode(), PhiMode::Internal);
    }

    #[test]
    fn test_mode_switch_deferred_to_next_update() {
        let mut modulator = PhiModulator::new();
        modulator.set_mode(PhiMode::Manual);
        // Mode does not change until update runs
        assert_eq!(modulator.mode(), PhiMode::Internal);
        modulator.update(&[], 0.0);
        assert_eq!(modulator.mode(), PhiMode::Manual);
    }

    #[test]
    fn test_crossfade_bridges_depth_gap() {
        let mut modulator = PhiModulator::new();
        modulator.set_manual_depth(PHI);
        let mut now = 0.0;
        for _ in 0..10 {
            now += BLOCK_SECS;
            modulator.update(&[], now);
        }
        let depth_before = modulator.state().depth;

        modulator.set_mode(PhiMode::Manual);
        now += BLOCK_SECS;
        let mid = modulator.update(&[], now);
        // First crossfade block sits between the internal and manual depths
        let lo = depth_before.min(PHI);
        let hi = depth_before.max(PHI);
        assert!(mid.depth >= lo - 1e-3 && mid.depth <= hi + 1e-3);

        // After the 100ms window the manual depth wins outright
        now += 0.2;
        let settled = modulator.update(&[], now);
        assert!((settled.depth - PHI).abs() < 1e-4);
    }

    #[test]
    fn test_blended_state_stays_within_invariants() {
        let mut modulator = PhiModulator::new();
        modulator.set_manual_phase(6.0);
        modulator.set_manual_depth(PHI_INV);
        let mut now = 0.0;
        modulator.update(&[], now);
        modulator.set_mode(PhiMode::Manual);
        for _ in 0..20 {
            now += BLOCK_SECS;
            let state = modulator.update(&[], now);
            assert!(state.depth >= PHI_INV && state.depth <= PHI);
            assert!(state.phase >= 0.0 && state.phase < TWO_PI);
        }
    }

    #[test]
    fn test_redundant_mode_switch_is_ignored() {
        let mut modulator = PhiModulator::new();
        modulator.update(&[], 0.0);
        modulator.set_mode(PhiMode::Internal);
        modulator.update(&[], BLOCK_SECS);
        // No crossfade in progress after a no-op switch
        assert_eq!(modulator.mode(), PhiMode::Internal);
    }

    #[test]
    fn test_blend_phase_shortest_arc() {
        // 0.1 and 2π-0.1 are 0.2 apart through zero
        let mid = blend_phase(0.1, TWO_PI - 0.1, 0.5);
        assert!(mid < 0.05 || mid > TWO_PI - 0.05);
    }
}
