//! Lock-free command queue for engine control
//!
//! Control threads push commands into an rtrb ring; the audio thread
//! drains them at block boundaries. Pushing and popping are wait-free,
//! so a slow control thread can never stall the callback.
//!
//! Large payloads (presets, coupling matrices) travel as
//! `basedrop::Shared` pointers: the command enum stays pointer-sized for
//! the ring, and when the audio thread retires the previous payload the
//! deallocation is deferred to the GC thread.

use basedrop::Shared;
use serde::Serialize;

use crate::engine::downmix::DownmixStrategy;
use crate::engine::field::CouplingMatrix;
use crate::phi::PhiMode;
use crate::preset::EnginePreset;
use crate::types::NUM_CHANNELS;

/// Commands sent from control threads to the audio thread
///
/// Each variant is one atomic operation, applied at the start of a block
/// so no parameter ever changes mid-block.
pub enum EngineCommand {
    // Field
    SetFrequency { channel: usize, frequency: f32 },
    SetAmplitude { channel: usize, amplitude: f32 },
    SetChannelEnabled { channel: usize, enabled: bool },
    SetCouplingStrength(f32),
    /// Validated on the control side; the old matrix retires via GC
    SwapCouplingMatrix(Shared<CouplingMatrix>),

    // Downmix
    SetDownmixStrategy(DownmixStrategy),
    SetMasterGain(f32),
    /// Validated left/right weight pair overriding the strategy tables
    SetDownmixWeights(Shared<DownmixWeights>),

    // Φ-modulation
    SetPhiMode(PhiMode),
    SetPhiManualPhase(f32),
    SetPhiManualDepth(f32),
    SetPhiInternalFrequency(f32),
    MidiCc1(u8),
    MidiPitchBend(u16),
    SensorHeartRate(f32),
    SensorGsr(f32),
    SensorAccelerometer { x: f32, y: f32, z: f32 },

    // Latency & metrics
    SetManualLatencyOffsetMs(f32),
    SetMetricsSmoothingAlpha(f32),

    /// Full control-plane snapshot, validated before sending
    ApplyPreset(Shared<EnginePreset>),
}

/// Custom downmix weight payload, validated before queueing
#[derive(Debug, Clone, Copy)]
pub struct DownmixWeights {
    pub left: [f32; NUM_CHANNELS],
    pub right: [f32; NUM_CHANNELS],
}

/// Capacity of the command queue
///
/// Preset application is a single boxed command, so bursts stay small;
/// 256 leaves generous headroom for rapid-fire parameter sweeps.
pub const COMMAND_QUEUE_CAPACITY: usize = 256;

/// Create the command channel (control producer, audio consumer)
pub fn command_channel() -> (rtrb::Producer<EngineCommand>, rtrb::Consumer<EngineCommand>) {
    rtrb::RingBuffer::new(COMMAND_QUEUE_CAPACITY)
}

/// Control-side mirror of the last values sent to the engine
///
/// The audio thread's state is never read back; this mirror is what
/// `get_current_parameters` reports. It tracks intent: a value appears
/// here as soon as its command is queued.
#[derive(Debug, Clone, Serialize)]
pub struct ParameterStore {
    pub frequencies: [f32; NUM_CHANNELS],
    pub amplitudes: [f32; NUM_CHANNELS],
    pub enabled: [bool; NUM_CHANNELS],
    pub coupling_strength: f32,
    pub downmix_strategy: DownmixStrategy,
    pub master_gain: f32,
    pub phi_mode: PhiMode,
    pub phi_manual_phase: f32,
    pub phi_manual_depth: f32,
    pub phi_internal_frequency: f32,
    pub manual_latency_offset_ms: f32,
    pub metrics_smoothing_alpha: f32,
}

impl Default for ParameterStore {
    fn default() -> Self {
        let preset = EnginePreset::default();
        Self {
            frequencies: preset.field.frequencies,
            amplitudes: preset.field.amplitudes,
            enabled: preset.field.enabled,
            coupling_strength: preset.field.coupling_strength,
            downmix_strategy: preset.downmix.strategy,
            master_gain: preset.downmix.master_gain,
            phi_mode: preset.phi.mode,
            phi_manual_phase: preset.phi.manual_phase,
            phi_manual_depth: preset.phi.manual_depth,
            phi_internal_frequency: preset.phi.internal_frequency,
            manual_latency_offset_ms: 0.0,
            metrics_smoothing_alpha: 0.2,
        }
    }
}

impl ParameterStore {
    /// Mirror one outgoing command
    pub fn apply(&mut self, command: &EngineCommand) {
        match command {
            EngineCommand::SetFrequency { channel, frequency } => {
                if *channel < NUM_CHANNELS {
                    self.frequencies[*channel] = *frequency;
                }
            }
            EngineCommand::SetAmplitude { channel, amplitude } => {
                if *channel < NUM_CHANNELS {
                    self.amplitudes[*channel] = *amplitude;
                }
            }
            EngineCommand::SetChannelEnabled { channel, enabled } => {
                if *channel < NUM_CHANNELS {
                    self.enabled[*channel] = *enabled;
                }
            }
            EngineCommand::SetCouplingStrength(s) => self.coupling_strength = *s,
            EngineCommand::SetDownmixStrategy(strategy) => self.downmix_strategy = *strategy,
            EngineCommand::SetMasterGain(gain) => self.master_gain = *gain,
            EngineCommand::SetPhiMode(mode) => self.phi_mode = *mode,
            EngineCommand::SetPhiManualPhase(phase) => self.phi_manual_phase = *phase,
            EngineCommand::SetPhiManualDepth(depth) => self.phi_manual_depth = *depth,
            EngineCommand::SetPhiInternalFrequency(f) => self.phi_internal_frequency = *f,
            EngineCommand::SetManualLatencyOffsetMs(ms) => self.manual_latency_offset_ms = *ms,
            EngineCommand::SetMetricsSmoothingAlpha(alpha) => {
                self.metrics_smoothing_alpha = *alpha
            }
            EngineCommand::ApplyPreset(preset) => {
                self.frequencies = preset.field.frequencies;
                self.amplitudes = preset.field.amplitudes;
                self.enabled = preset.field.enabled;
                self.coupling_strength = preset.field.coupling_strength;
                self.downmix_strategy = preset.downmix.strategy;
                self.master_gain = preset.downmix.master_gain;
                self.phi_mode = preset.phi.mode;
                self.phi_manual_phase = preset.phi.manual_phase;
                self.phi_manual_depth = preset.phi.manual_depth;
                self.phi_internal_frequency = preset.phi.internal_frequency;
            }
            // MIDI/sensor events and snapshot swaps are transient, not
            // persistent parameters
            EngineCommand::SwapCouplingMatrix(_)
            | EngineCommand::SetDownmixWeights(_)
            | EngineCommand::MidiCc1(_)
            | EngineCommand::MidiPitchBend(_)
            | EngineCommand::SensorHeartRate(_)
            | EngineCommand::SensorGsr(_)
            | EngineCommand::SensorAccelerometer { .. } => {}
        }
    }
}
