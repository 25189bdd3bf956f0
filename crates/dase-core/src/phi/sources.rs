//! Φ-modulation sources
//!
//! A closed set of modulation sources, each producing a [`PhiState`] once
//! per callback: direct manual control, an envelope follower on the audio
//! input, an internal breathing oscillator, MIDI (CC1 / pitch bend), and
//! biometric sensors (heart rate, GSR, accelerometer).
//!
//! Every source upholds the same invariants after each update:
//! depth ∈ [1/Φ, Φ] and phase ∈ [0, 2π).

use serde::{Deserialize, Serialize};

use crate::types::{Sample, PHI, PHI_INV, TWO_PI};

/// Silence level below which the envelope follower starts its decay timer
const SILENCE_RMS: f32 = 0.001;

/// Seconds of silence before the envelope decays back to baseline
const SILENCE_DECAY_AFTER_SECS: f64 = 2.0;

/// Identifier for the active Φ source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhiMode {
    Manual,
    Audio,
    #[default]
    Internal,
    Midi,
    Sensor,
}

impl PhiMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhiMode::Manual => "manual",
            PhiMode::Audio => "audio",
            PhiMode::Internal => "internal",
            PhiMode::Midi => "midi",
            PhiMode::Sensor => "sensor",
        }
    }
}

impl std::str::FromStr for PhiMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "manual" => Ok(PhiMode::Manual),
            "audio" => Ok(PhiMode::Audio),
            "internal" => Ok(PhiMode::Internal),
            "midi" => Ok(PhiMode::Midi),
            "sensor" => Ok(PhiMode::Sensor),
            _ => Err(()),
        }
    }
}

/// Snapshot of the Φ-modulation state for one callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhiState {
    /// Phase offset in radians [0, 2π)
    pub phase: f32,
    /// Modulation depth, golden-ratio bounded [1/Φ, Φ]
    pub depth: f32,
    /// Source that produced this state
    pub source: PhiMode,
    /// Oscillation frequency in Hz (meaningful for oscillating sources)
    pub frequency: f32,
    /// Monotonic time of the producing update, in seconds
    pub timestamp: f64,
}

impl PhiState {
    /// Enforce the depth clamp and phase wrap invariants
    pub fn clamped(mut self) -> Self {
        self.depth = self.depth.clamp(PHI_INV, PHI);
        self.phase = self.phase.rem_euclid(TWO_PI);
        self
    }
}

impl Default for PhiState {
    fn default() -> Self {
        Self {
            phase: 0.0,
            depth: 1.0,
            source: PhiMode::Internal,
            frequency: 0.1,
            timestamp: 0.0,
        }
    }
}

/// Direct user control via explicit setters
#[derive(Debug, Clone)]
pub struct ManualSource {
    state: PhiState,
}

impl ManualSource {
    pub fn new() -> Self {
        Self {
            state: PhiState {
                source: PhiMode::Manual,
                frequency: 0.0,
                ..PhiState::default()
            },
        }
    }

    pub fn set_phase(&mut self, phase: f32) {
        self.state.phase = phase;
        self.state = self.state.clamped();
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.state.depth = depth;
        self.state = self.state.clamped();
    }

    pub fn update(&mut self, now: f64) -> PhiState {
        self.state.timestamp = now;
        self.state
    }

    pub fn state(&self) -> PhiState {
        self.state
    }
}

/// Attack/release envelope follower on the input block's RMS
///
/// Depth tracks the envelope; after 2s of silence the envelope decays back
/// toward zero so the modulation settles at the baseline (1/Φ, the clamp
/// floor) rather than holding the last loud value forever.
#[derive(Debug, Clone)]
pub struct AudioEnvelopeSource {
    state: PhiState,
    envelope: f32,
    attack_secs: f32,
    release_secs: f32,
    phase_rotation_freq: f32,
    phase_accumulator: f32,
    silence_duration: f64,
    last_update: Option<f64>,
}

impl AudioEnvelopeSource {
    pub fn new(attack_ms: f32, release_ms: f32) -> Self {
        Self {
            state: PhiState {
                source: PhiMode::Audio,
                frequency: 0.0,
                ..PhiState::default()
            },
            envelope: 0.0,
            attack_secs: attack_ms / 1000.0,
            release_secs: release_ms / 1000.0,
            phase_rotation_freq: 0.05,
            phase_accumulator: 0.0,
            silence_duration: 0.0,
            last_update: None,
        }
    }

    pub fn set_attack_ms(&mut self, attack_ms: f32) {
        self.attack_secs = attack_ms.max(0.1) / 1000.0;
    }

    pub fn set_release_ms(&mut self, release_ms: f32) {
        self.release_secs = release_ms.max(0.1) / 1000.0;
    }

    pub fn update(&mut self, input: &[Sample], now: f64) -> PhiState {
        let dt = match self.last_update {
            Some(t) => (now - t).max(0.0) as f32,
            None => 0.0,
        };
        self.last_update = Some(now);

        let rms = block_rms(input);

        // One-pole follower with separate attack/release time constants
        let tau = if rms > self.envelope {
            self.attack_secs
        } else {
            self.release_secs
        };
        let coef = 1.0 - (-dt / tau).exp();
        self.envelope += (rms - self.envelope) * coef;

        if rms < SILENCE_RMS {
            self.silence_duration += dt as f64;
        } else {
            self.silence_duration = 0.0;
        }

        if self.silence_duration > SILENCE_DECAY_AFTER_SECS {
            // Decay toward baseline at 0.5 units/sec
            self.envelope -= self.envelope * 0.5 * dt;
        }

        // Half-scale RMS maps to full depth Φ; clamp floor is 1/Φ
        self.state.depth = self.envelope * 2.0 * PHI;

        // Phase rotates slowly, faster when the input is energetic
        let phase_delta = TWO_PI * self.phase_rotation_freq * dt;
        self.phase_accumulator =
            (self.phase_accumulator + phase_delta * (1.0 + self.envelope)).rem_euclid(TWO_PI);
        self.state.phase = self.phase_accumulator;

        self.state.timestamp = now;
        self.state = self.state.clamped();
        self.state
    }

    pub fn state(&self) -> PhiState {
        self.state
    }
}

/// Internal breathing oscillator (default 0.1 Hz)
///
/// Depth breathes sinusoidally between the golden-ratio bounds; phase
/// follows the same oscillator.
#[derive(Debug, Clone)]
pub struct InternalOscillatorSource {
    state: PhiState,
    frequency: f32,
    phase_accumulator: f32,
    last_update: Option<f64>,
}

impl InternalOscillatorSource {
    pub fn new(frequency: f32) -> Self {
        Self {
            state: PhiState {
                source: PhiMode::Internal,
                frequency,
                ..PhiState::default()
            },
            frequency,
            phase_accumulator: 0.0,
            last_update: None,
        }
    }

    pub fn set_frequency(&mut self, frequency: f32) {
        if frequency.is_finite() && frequency > 0.0 {
            self.frequency = frequency;
            self.state.frequency = frequency;
        } else {
            log::warn!("[PhiSource] Ignoring invalid internal frequency {frequency}");
        }
    }

    pub fn update(&mut self, now: f64) -> PhiState {
        let dt = match self.last_update {
            Some(t) => (now - t).max(0.0) as f32,
            None => 0.0,
        };
        self.last_update = Some(now);

        self.phase_accumulator =
            (self.phase_accumulator + TWO_PI * self.frequency * dt).rem_euclid(TWO_PI);

        let depth_center = (PHI_INV + PHI) / 2.0;
        let depth_amplitude = (PHI - PHI_INV) / 2.0;
        self.state.depth = depth_center + depth_amplitude * self.phase_accumulator.sin();
        self.state.phase = self.phase_accumulator;
        self.state.timestamp = now;
        self.state = self.state.clamped();
        self.state
    }

    pub fn state(&self) -> PhiState {
        self.state
    }
}

/// MIDI control: CC1 (mod wheel) drives depth, pitch bend drives phase
#[derive(Debug, Clone)]
pub struct MidiSource {
    state: PhiState,
}

impl MidiSource {
    pub fn new() -> Self {
        Self {
            state: PhiState {
                source: PhiMode::Midi,
                frequency: 0.0,
                ..PhiState::default()
            },
        }
    }

    /// CC1 value [0, 127]; 127 maps to full depth Φ
    pub fn set_cc1(&mut self, value: u8) {
        let value = value.min(127);
        self.state.depth = (value as f32 / 127.0) * PHI;
        self.state = self.state.clamped();
    }

    /// 14-bit pitch bend [0, 16383], center 8192; maps to phase [-π, +π]
    pub fn set_pitch_bend(&mut self, value: u16) {
        let value = value.min(16383);
        let normalized = (value as f32 - 8192.0) / 8192.0;
        self.state.phase = normalized * std::f32::consts::PI;
        self.state = self.state.clamped();
    }

    pub fn update(&mut self, now: f64) -> PhiState {
        self.state.timestamp = now;
        self.state
    }

    pub fn state(&self) -> PhiState {
        self.state
    }
}

/// Biometric input: heart rate accelerates the oscillation above 90 BPM,
/// GSR drives depth, accelerometer orientation drives phase
#[derive(Debug, Clone)]
pub struct SensorSource {
    state: PhiState,
    heart_rate: f32,
    hr_threshold: f32,
    phase_accumulator: f32,
    last_update: Option<f64>,
}

impl SensorSource {
    pub fn new() -> Self {
        Self {
            state: PhiState {
                source: PhiMode::Sensor,
                frequency: 0.1,
                ..PhiState::default()
            },
            heart_rate: 60.0,
            hr_threshold: 90.0,
            phase_accumulator: 0.0,
            last_update: None,
        }
    }

    /// Heart rate in BPM, clamped to [40, 200]
    pub fn set_heart_rate(&mut self, bpm: f32) {
        self.heart_rate = bpm.clamp(40.0, 200.0);
        if self.heart_rate > self.hr_threshold {
            let accel_factor = 1.0 + (self.heart_rate - self.hr_threshold) / 10.0;
            self.state.frequency = 0.1 * accel_factor;
        } else {
            self.state.frequency = 0.1;
        }
    }

    /// Galvanic skin response [0, 1] mapped to depth
    pub fn set_gsr(&mut self, gsr: f32) {
        let gsr = gsr.clamp(0.0, 1.0);
        self.state.depth = gsr * PHI;
        self.state = self.state.clamped();
    }

    /// Accelerometer orientation in the x/y plane mapped to a phase offset
    pub fn set_accelerometer(&mut self, x: f32, y: f32, _z: f32) {
        self.phase_accumulator = y.atan2(x).rem_euclid(TWO_PI);
    }

    pub fn update(&mut self, now: f64) -> PhiState {
        let dt = match self.last_update {
            Some(t) => (now - t).max(0.0) as f32,
            None => 0.0,
        };
        self.last_update = Some(now);

        self.phase_accumulator =
            (self.phase_accumulator + TWO_PI * self.state.frequency * dt).rem_euclid(TWO_PI);
        self.state.phase = self.phase_accumulator;
        self.state.timestamp = now;
        self.state = self.state.clamped();
        self.state
    }

    pub fn state(&self) -> PhiState {
        self.state
    }
}

fn block_rms(input: &[Sample]) -> f32 {
    if input.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = input.iter().map(|s| s * s).sum();
    (sum_sq / input.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_invariants(state: &PhiState) {
        assert!(state.depth >= PHI_INV && state.depth <= PHI, "depth {} out of bounds", state.depth);
        assert!(state.phase >= 0.0 && state.phase < TWO_PI, "phase {} out of bounds", state.phase);
    }

    #[test]
    fn test_manual_source_clamps_depth() {
        let mut src = ManualSource::new();
        src.set_depth(5.0);
        assert_eq!(src.state().depth, PHI);
        src.set_depth(0.0);
        assert_eq!(src.state().depth, PHI_INV);
        assert_invariants(&src.state());
    }

    #[test]
    fn test_manual_source_wraps_phase() {
        let mut src = ManualSource::new();
        src.set_phase(3.0 * TWO_PI + 0.5);
        assert!((src.state().phase - 0.5).abs() < 1e-4);
        src.set_phase(-0.5);
        assert!(src.state().phase >= 0.0 && src.state().phase < TWO_PI);
    }

    #[test]
    fn test_internal_oscillator_breathes_within_bounds() {
        let mut src = InternalOscillatorSource::new(0.1);
        let mut now = 0.0;
        for _ in 0..200 {
            now += 0.1;
            let state = src.update(now);
            assert_invariants(&state);
        }
    }

    #[test]
    fn test_envelope_follower_rises_on_signal() {
        let mut src = AudioEnvelopeSource::new(20.0, 100.0);
        let loud: Vec<f32> = vec![0.5; 512];
        let mut now = 0.0;
        src.update(&loud, now);
        for _ in 0..50 {
            now += 512.0 / 48000.0;
            src.update(&loud, now);
        }
        let state = src.state();
        assert!(state.depth > PHI_INV);
        assert_invariants(&state);
    }

    #[test]
    fn test_envelope_follower_decays_after_silence() {
        let mut src = AudioEnvelopeSource::new(20.0, 100.0);
        let loud: Vec<f32> = vec![0.5; 512];
        let silent: Vec<f32> = vec![0.0; 512];
        let mut now = 0.0;
        for _ in 0..50 {
            now += 512.0 / 48000.0;
            src.update(&loud, now);
        }
        let depth_loud = src.state().depth;
        // 5 seconds of silence: past the 2s threshold, envelope decays
        for _ in 0..500 {
            now += 512.0 / 48000.0;
            src.update(&silent, now);
        }
        assert!(src.state().depth < depth_loud);
        assert_invariants(&src.state());
    }

    #[test]
    fn test_midi_mappings() {
        let mut src = MidiSource::new();
        src.set_cc1(127);
        assert!((src.state().depth - PHI).abs() < 1e-4);
        src.set_cc1(0);
        assert_eq!(src.state().depth, PHI_INV);

        src.set_pitch_bend(8192);
        assert!(src.state().phase.abs() < 1e-4);
        src.set_pitch_bend(16383);
        assert_invariants(&src.state());
    }

    #[test]
    fn test_sensor_heart_rate_acceleration() {
        let mut src = SensorSource::new();
        src.set_heart_rate(60.0);
        assert!((src.state().frequency - 0.1).abs() < 1e-6);
        src.set_heart_rate(120.0);
        // 1 + (120-90)/10 = 4x acceleration
        assert!((src.state().frequency - 0.4).abs() < 1e-6);
        src.set_gsr(1.0);
        assert_eq!(src.state().depth, PHI);
        assert_invariants(&src.state());
    }

    #[test]
    fn test_phi_mode_round_trip() {
        for mode in [
            PhiMode::Manual,
            PhiMode::Audio,
            PhiMode::Internal,
            PhiMode::Midi,
            PhiMode::Sensor,
        ] {
            assert_eq!(mode.as_str().parse::<PhiMode>().unwrap(), mode);
        }
        assert!("bogus".parse::<PhiMode>().is_err());
    }
}
