//! Core processing engine
//!
//! [`DaseEngine`] runs on the audio thread and executes the full block
//! sequence: Φ update → oscillator field → spectral metrics → downmix →
//! latency compensation → telemetry. [`DaseController`] is its control
//! counterpart: it owns the command producer, mirrors the last sent
//! parameters, and pulls telemetry frames.
//!
//! The engine is constructed in pairs: `DaseEngine::new` returns both
//! halves, wired through the lock-free command queue and the telemetry
//! channels.

use std::time::Instant;

use basedrop::Shared;
use thiserror::Error;

use crate::engine::command::{command_channel, DownmixWeights, EngineCommand, ParameterStore};
use crate::engine::downmix::{self, DownmixError, DownmixStrategy, StereoDownmixer};
use crate::engine::field::{CouplingMatrix, OscillatorField};
use crate::engine::gc::gc_handle;
use crate::latency::{CalibrationResult, LatencyManager};
use crate::metrics::{classify, consciousness_level, criticality, IciEngine};
use crate::metrics::{LatencyFrame, MetricsFrame};
use crate::phi::{PhiMode, PhiModulator};
use crate::preset::{EnginePreset, PresetError};
use crate::telemetry::{telemetry_channel, TelemetryPublisher, TelemetrySubscriber};
use crate::types::{MultiBuffer, Sample, StereoBuffer, MAX_BUFFER_SIZE};

/// Metrics frames publish at most this often
const METRICS_PUBLISH_HZ: f64 = 30.0;

/// Latency frames publish at most this often (outside drift corrections)
const LATENCY_PUBLISH_HZ: f64 = 10.0;

/// Rolling processing-time window
const STATS_WINDOW: usize = 100;

/// Fraction of the buffer duration that triggers the CPU advisory
const CPU_WARN_FRACTION: f32 = 0.8;

#[derive(Debug, Error)]
enum BlockError {
    #[error("non-finite audio produced by the oscillator field")]
    NonFiniteField,
    #[error("non-finite audio after downmix")]
    NonFiniteMix,
}

/// Rolling processing-time statistics
struct ProcessingStats {
    times_ms: [f32; STATS_WINDOW],
    index: usize,
    filled: usize,
}

impl ProcessingStats {
    fn new() -> Self {
        Self {
            times_ms: [0.0; STATS_WINDOW],
            index: 0,
            filled: 0,
        }
    }

    fn record(&mut self, elapsed_ms: f32) {
        self.times_ms[self.index] = elapsed_ms;
        self.index = (self.index + 1) % STATS_WINDOW;
        self.filled = (self.filled + 1).min(STATS_WINDOW);
    }

    fn mean_ms(&self) -> f32 {
        if self.filled == 0 {
            return 0.0;
        }
        self.times_ms[..self.filled].iter().sum::<f32>() / self.filled as f32
    }
}

/// Audio-thread half of the engine pair
pub struct DaseEngine {
    field: OscillatorField,
    phi: PhiModulator,
    downmixer: StereoDownmixer,
    latency: LatencyManager,
    ici: IciEngine,

    commands: rtrb::Consumer<EngineCommand>,
    metrics_tx: TelemetryPublisher<MetricsFrame>,
    latency_tx: TelemetryPublisher<LatencyFrame>,

    // Pre-allocated working buffer, resized by working length only
    field_buffer: MultiBuffer,
    // Retained payloads; the swap retires the old one via GC
    coupling_snapshot: Option<Shared<CouplingMatrix>>,

    sample_rate: u32,
    buffer_duration_ms: f32,
    frame_id: u64,
    stats: ProcessingStats,
    cpu_load: f32,
    cpu_warn_active: bool,
    last_metrics_publish: f64,
    last_latency_publish: f64,
}

/// Control-thread half of the engine pair
pub struct DaseController {
    commands: rtrb::Producer<EngineCommand>,
    params: ParameterStore,
    metrics_rx: TelemetrySubscriber<MetricsFrame>,
    latency_rx: TelemetrySubscriber<LatencyFrame>,
}

impl DaseEngine {
    pub fn new(sample_rate: u32, buffer_size: usize) -> (Self, DaseController) {
        let (cmd_tx, cmd_rx) = command_channel();
        let (metrics_tx, metrics_rx) = telemetry_channel();
        let (latency_tx, latency_rx) = telemetry_channel();

        let mut field_buffer = MultiBuffer::silence(MAX_BUFFER_SIZE);
        field_buffer.set_len_from_capacity(buffer_size);

        let engine = Self {
            field: OscillatorField::new(sample_rate),
            phi: PhiModulator::new(),
            downmixer: StereoDownmixer::default(),
            latency: LatencyManager::new(sample_rate, buffer_size as u32),
            ici: IciEngine::new(sample_rate, buffer_size),
            commands: cmd_rx,
            metrics_tx,
            latency_tx,
            field_buffer,
            coupling_snapshot: None,
            sample_rate,
            buffer_duration_ms: buffer_size as f32 / sample_rate as f32 * 1000.0,
            frame_id: 0,
            stats: ProcessingStats::new(),
            cpu_load: 0.0,
            cpu_warn_active: false,
            last_metrics_publish: f64::NEG_INFINITY,
            last_latency_publish: f64::NEG_INFINITY,
        };

        let controller = DaseController {
            commands: cmd_tx,
            params: ParameterStore::default(),
            metrics_rx,
            latency_rx,
        };

        (engine, controller)
    }

    /// Adopt a loopback calibration measurement
    ///
    /// Calibration runs with the streams stopped, before the engine moves
    /// into the callback, so this takes `&mut self` directly.
    pub fn apply_calibration(
        &mut self,
        result: &CalibrationResult,
        hw_input_ms: Option<f32>,
        hw_output_ms: Option<f32>,
    ) {
        self.latency.apply_calibration(result, hw_input_ms, hw_output_ms);
        // Consumers get the calibrated frame on the next publish tick
        self.latency_tx.publish(self.latency.frame().clone());
        self.last_latency_publish = f64::NEG_INFINITY;
    }

    /// Process one block (real-time path)
    ///
    /// `now` is a monotonic timestamp in seconds; `measured_latency_ms`
    /// is the I/O layer's round-trip estimate for this callback. Any
    /// error inside the sequence degrades to silence; nothing propagates
    /// to the I/O layer.
    pub fn process(
        &mut self,
        input: &[Sample],
        output: &mut StereoBuffer,
        now: f64,
        measured_latency_ms: f32,
    ) {
        let started = Instant::now();
        self.drain_commands();

        if let Err(e) = self.try_process(input, output, now, measured_latency_ms) {
            log::error!("[ENGINE] Block failed ({e}), emitting silence");
            output.fill_silence();
        }

        self.frame_id += 1;
        self.finish_timing(started);
    }

    fn try_process(
        &mut self,
        input: &[Sample],
        output: &mut StereoBuffer,
        now: f64,
        measured_latency_ms: f32,
    ) -> Result<(), BlockError> {
        self.field_buffer.set_len_from_capacity(output.len());

        let phi_state = self.phi.update(input, now);
        self.field
            .process_block(input, &phi_state, &mut self.field_buffer);
        if self.field_buffer.has_non_finite() {
            return Err(BlockError::NonFiniteField);
        }

        let spectral = self.ici.compute(&self.field_buffer);
        let mix_stats = self.downmixer.process(&self.field_buffer, output);
        if !mix_stats.peak_left.is_finite() || !mix_stats.peak_right.is_finite() {
            return Err(BlockError::NonFiniteMix);
        }
        if mix_stats.clipped {
            log::warn!(
                "[DOWNMIX] Output clipped (peaks {:.2}/{:.2}); lower the master gain",
                mix_stats.peak_left,
                mix_stats.peak_right
            );
        }

        self.latency.compensate_block(output);

        let corrected =
            self.latency
                .update_timing(now, output.len(), measured_latency_ms, self.cpu_load);

        // A drift correction publishes its frame before any block runs
        // with the new offset
        if corrected || now - self.last_latency_publish >= 1.0 / LATENCY_PUBLISH_HZ {
            self.latency_tx.publish(self.latency.frame().clone());
            self.last_latency_publish = now;
        }

        if now - self.last_metrics_publish >= 1.0 / METRICS_PUBLISH_HZ {
            let frame = self.build_metrics_frame(now, &phi_state, spectral);
            self.metrics_tx.publish(frame);
            self.last_metrics_publish = now;
        }

        Ok(())
    }

    fn build_metrics_frame(
        &self,
        now: f64,
        phi_state: &crate::phi::PhiState,
        spectral: crate::metrics::SpectralMetrics,
    ) -> MetricsFrame {
        let state = classify(
            spectral.ici,
            spectral.phase_coherence,
            spectral.spectral_centroid,
        );
        let mut frame = MetricsFrame {
            timestamp: now,
            ici: spectral.ici,
            phase_coherence: spectral.phase_coherence,
            spectral_centroid: spectral.spectral_centroid,
            criticality: criticality(spectral.ici, spectral.phase_coherence),
            consciousness_level: consciousness_level(
                spectral.ici,
                spectral.phase_coherence,
                spectral.spectral_centroid,
                self.sample_rate,
            ),
            state,
            phi_phase: phi_state.phase,
            phi_depth: phi_state.depth,
            phi_source: phi_state.source,
            latency_ms: self.latency.total_ms(),
            cpu_load: self.cpu_load,
            valid: true,
            frame_id: self.frame_id,
        };
        frame.sanitize();
        frame
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.pop() {
            self.apply_command(command);
        }
    }

    fn apply_command(&mut self, command: EngineCommand) {
        match command {
            EngineCommand::SetFrequency { channel, frequency } => {
                self.field.set_frequency(channel, frequency)
            }
            EngineCommand::SetAmplitude { channel, amplitude } => {
                self.field.set_amplitude(channel, amplitude)
            }
            EngineCommand::SetChannelEnabled { channel, enabled } => {
                self.field.set_enabled(channel, enabled)
            }
            EngineCommand::SetCouplingStrength(s) => self.field.set_coupling_strength(s),
            EngineCommand::SwapCouplingMatrix(matrix) => {
                self.field.set_coupling_matrix(*matrix);
                // The previous snapshot's drop defers to the GC thread
                self.coupling_snapshot = Some(matrix);
            }
            EngineCommand::SetDownmixStrategy(strategy) => self.downmixer.set_strategy(strategy),
            EngineCommand::SetMasterGain(gain) => self.downmixer.set_master_gain(gain),
            EngineCommand::SetDownmixWeights(weights) => {
                if let Err(e) = self.downmixer.set_custom_weights(&weights.left, &weights.right) {
                    log::error!("[ENGINE] Rejected downmix weights: {e}");
                }
            }
            EngineCommand::SetPhiMode(mode) => self.phi.set_mode(mode),
            EngineCommand::SetPhiManualPhase(phase) => self.phi.set_manual_phase(phase),
            EngineCommand::SetPhiManualDepth(depth) => self.phi.set_manual_depth(depth),
            EngineCommand::SetPhiInternalFrequency(f) => self.phi.set_internal_frequency(f),
            EngineCommand::MidiCc1(value) => self.phi.midi_cc1(value),
            EngineCommand::MidiPitchBend(value) => self.phi.midi_pitch_bend(value),
            EngineCommand::SensorHeartRate(bpm) => self.phi.sensor_heart_rate(bpm),
            EngineCommand::SensorGsr(gsr) => self.phi.sensor_gsr(gsr),
            EngineCommand::SensorAccelerometer { x, y, z } => {
                self.phi.sensor_accelerometer(x, y, z)
            }
            EngineCommand::SetManualLatencyOffsetMs(ms) => self.latency.set_manual_offset_ms(ms),
            EngineCommand::SetMetricsSmoothingAlpha(alpha) => self.ici.set_smoothing_alpha(alpha),
            EngineCommand::ApplyPreset(preset) => self.apply_preset_payload(&preset),
        }
    }

    fn apply_preset_payload(&mut self, preset: &EnginePreset) {
        self.field.set_frequencies(&preset.field.frequencies);
        for ch in 0..crate::types::NUM_CHANNELS {
            self.field.set_amplitude(ch, preset.field.amplitudes[ch]);
            self.field.set_enabled(ch, preset.field.enabled[ch]);
        }
        self.field.set_coupling_strength(preset.field.coupling_strength);
        if let Some(matrix) = preset.field.coupling_matrix {
            self.field.set_coupling_matrix(matrix);
        }
        self.downmixer.set_strategy(preset.downmix.strategy);
        self.downmixer.set_master_gain(preset.downmix.master_gain);
        self.phi.set_manual_depth(preset.phi.manual_depth);
        self.phi.set_manual_phase(preset.phi.manual_phase);
        self.phi.set_internal_frequency(preset.phi.internal_frequency);
        self.phi.set_mode(preset.phi.mode);
        log::info!("[ENGINE] Applied preset '{}'", preset.name);
    }

    fn finish_timing(&mut self, started: Instant) {
        let elapsed_ms = started.elapsed().as_secs_f32() * 1000.0;
        self.stats.record(elapsed_ms);
        self.cpu_load = (self.stats.mean_ms() / self.buffer_duration_ms).min(2.0);

        let over_budget = elapsed_ms > self.buffer_duration_ms * CPU_WARN_FRACTION;
        if over_budget && !self.cpu_warn_active {
            log::warn!(
                "[ENGINE] Processing time {:.2}ms exceeds {:.0}% of the {:.2}ms budget",
                elapsed_ms,
                CPU_WARN_FRACTION * 100.0,
                self.buffer_duration_ms
            );
            self.cpu_warn_active = true;
        } else if !over_budget && self.cpu_warn_active {
            log::info!("[ENGINE] Processing time back under budget");
            self.cpu_warn_active = false;
        }
    }
}

impl DaseController {
    /// Named single-field mutation, the wire-facing entry point
    ///
    /// Returns false for unknown names, missing/extraneous channel
    /// indices, or a full command queue; the engine keeps its previous
    /// value in every failure case.
    pub fn update_parameter(&mut self, name: &str, channel: Option<usize>, value: f32) -> bool {
        let command = match (name, channel) {
            ("frequency", Some(ch)) => EngineCommand::SetFrequency {
                channel: ch,
                frequency: value,
            },
            ("amplitude", Some(ch)) => EngineCommand::SetAmplitude {
                channel: ch,
                amplitude: value,
            },
            ("enabled", Some(ch)) => EngineCommand::SetChannelEnabled {
                channel: ch,
                enabled: value != 0.0,
            },
            ("coupling_strength", None) => EngineCommand::SetCouplingStrength(value),
            ("master_gain", None) => EngineCommand::SetMasterGain(value),
            ("phi_phase", None) => EngineCommand::SetPhiManualPhase(value),
            ("phi_depth", None) => EngineCommand::SetPhiManualDepth(value),
            ("phi_frequency", None) => EngineCommand::SetPhiInternalFrequency(value),
            ("latency_offset_ms", None) => EngineCommand::SetManualLatencyOffsetMs(value),
            ("metrics_alpha", None) => EngineCommand::SetMetricsSmoothingAlpha(value),
            _ => {
                log::warn!("[CONTROL] Unknown parameter '{name}' (channel {channel:?})");
                return false;
            }
        };
        if channel.is_some_and(|ch| ch >= crate::types::NUM_CHANNELS) {
            log::warn!("[CONTROL] Channel index {channel:?} out of range");
            return false;
        }
        self.send(command)
    }

    /// Switch the downmix strategy by name
    pub fn set_downmix_strategy(&mut self, name: &str) -> bool {
        match name.parse::<DownmixStrategy>() {
            Ok(strategy) => self.send(EngineCommand::SetDownmixStrategy(strategy)),
            Err(()) => {
                log::warn!("[CONTROL] Unknown downmix strategy '{name}'");
                false
            }
        }
    }

    pub fn set_phi_mode(&mut self, mode: PhiMode) -> bool {
        self.send(EngineCommand::SetPhiMode(mode))
    }

    pub fn midi_cc1(&mut self, value: u8) -> bool {
        self.send(EngineCommand::MidiCc1(value))
    }

    pub fn midi_pitch_bend(&mut self, value: u16) -> bool {
        self.send(EngineCommand::MidiPitchBend(value))
    }

    pub fn sensor_heart_rate(&mut self, bpm: f32) -> bool {
        self.send(EngineCommand::SensorHeartRate(bpm))
    }

    pub fn sensor_gsr(&mut self, gsr: f32) -> bool {
        self.send(EngineCommand::SensorGsr(gsr))
    }

    pub fn sensor_accelerometer(&mut self, x: f32, y: f32, z: f32) -> bool {
        self.send(EngineCommand::SensorAccelerometer { x, y, z })
    }

    /// Override the active downmix weights (validated here)
    pub fn set_downmix_weights(&mut self, left: &[f32], right: &[f32]) -> Result<bool, DownmixError> {
        let weights = DownmixWeights {
            left: downmix::validate_weights(left)?,
            right: downmix::validate_weights(right)?,
        };
        let shared = Shared::new(&gc_handle(), weights);
        Ok(self.send(EngineCommand::SetDownmixWeights(shared)))
    }

    /// Swap in a new coupling matrix (copy-and-swap, validated here)
    pub fn set_coupling_matrix(&mut self, rows: &[Vec<f32>]) -> Result<bool, crate::engine::field::FieldError> {
        let matrix = CouplingMatrix::from_rows(rows)?;
        let shared = Shared::new(&gc_handle(), matrix);
        Ok(self.send(EngineCommand::SwapCouplingMatrix(shared)))
    }

    /// Validate and queue a full preset
    pub fn apply_preset(&mut self, preset: EnginePreset) -> Result<bool, PresetError> {
        preset.validate()?;
        let command = EngineCommand::ApplyPreset(Shared::new(&gc_handle(), preset));
        self.params.apply(&command);
        Ok(self.send_unmirrored(command))
    }

    /// Newest metrics frame, if one arrived since the last pull
    pub fn latest_metrics(&mut self) -> Option<MetricsFrame> {
        self.metrics_rx.try_take()
    }

    /// Newest latency frame, if one arrived since the last pull
    pub fn latest_latency(&mut self) -> Option<LatencyFrame> {
        self.latency_rx.try_take()
    }

    /// Additional telemetry subscribers for other consumers
    pub fn subscribe_metrics(&self) -> TelemetrySubscriber<MetricsFrame> {
        self.metrics_rx.clone()
    }

    pub fn subscribe_latency(&self) -> TelemetrySubscriber<LatencyFrame> {
        self.latency_rx.clone()
    }

    /// Last values sent to the engine
    pub fn current_parameters(&self) -> &ParameterStore {
        &self.params
    }

    fn send(&mut self, command: EngineCommand) -> bool {
        self.params.apply(&command);
        self.send_unmirrored(command)
    }

    fn send_unmirrored(&mut self, command: EngineCommand) -> bool {
        match self.commands.push(command) {
            Ok(()) => true,
            Err(_) => {
                log::warn!("[CONTROL] Command queue full, command dropped");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::SystemState;
    use crate::types::{BUFFER_SIZE, SAMPLE_RATE};

    const BLOCK_SECS: f64 = BUFFER_SIZE as f64 / SAMPLE_RATE as f64;

    fn run_blocks(engine: &mut DaseEngine, count: usize, start: f64) -> f64 {
        let input = vec![0.0; BUFFER_SIZE];
        let mut output = StereoBuffer::silence(BUFFER_SIZE);
        let mut now = start;
        for _ in 0..count {
            now += BLOCK_SECS;
            engine.process(&input, &mut output, now, 12.0);
            assert!(output.peak().is_finite());
        }
        now
    }

    #[test]
    fn test_engine_produces_metrics_frames() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        run_blocks(&mut engine, 10, 0.0);
        let frame = controller.latest_metrics().expect("no metrics published");
        assert!(frame.valid);
        assert!(frame.ici >= 0.0 && frame.ici <= 1.0);
        assert_ne!(frame.state, SystemState::Idle);
    }

    #[test]
    fn test_frame_ids_monotonic() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        let mut last = 0;
        let mut now = 0.0;
        for _ in 0..5 {
            now = run_blocks(&mut engine, 10, now);
            if let Some(frame) = controller.latest_metrics() {
                assert!(frame.frame_id >= last);
                last = frame.frame_id;
            }
        }
        assert!(last > 0);
    }

    #[test]
    fn test_parameter_updates_reach_the_field() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        assert!(controller.update_parameter("frequency", Some(0), 880.0));
        run_blocks(&mut engine, 1, 0.0);
        assert_eq!(engine.field.frequency(0), 880.0);
        assert_eq!(controller.current_parameters().frequencies[0], 880.0);
    }

    #[test]
    fn test_unknown_parameter_rejected() {
        let (_engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        assert!(!controller.update_parameter("bogus", None, 1.0));
        assert!(!controller.update_parameter("frequency", Some(42), 440.0));
        assert!(!controller.update_parameter("frequency", None, 440.0));
    }

    #[test]
    fn test_preset_application() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        let mut preset = EnginePreset::default();
        preset.name = "test".into();
        preset.field.frequencies[7] = 999.0;
        preset.downmix.strategy = DownmixStrategy::Energy;
        assert!(controller.apply_preset(preset).unwrap());

        run_blocks(&mut engine, 1, 0.0);
        assert_eq!(engine.field.frequency(7), 999.0);
        assert_eq!(engine.downmixer.strategy(), DownmixStrategy::Energy);
        assert_eq!(
            controller.current_parameters().downmix_strategy,
            DownmixStrategy::Energy
        );
    }

    #[test]
    fn test_invalid_preset_rejected_before_queueing() {
        let (_engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        let mut preset = EnginePreset::default();
        preset.field.frequencies[0] = -1.0;
        assert!(controller.apply_preset(preset).is_err());
    }

    #[test]
    fn test_coupling_matrix_swap() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        let rows = vec![vec![0.25; 8]; 8];
        assert!(controller.set_coupling_matrix(&rows).unwrap());
        run_blocks(&mut engine, 1, 0.0);
        assert_eq!(engine.field.coupling_matrix().row(0)[1], 0.25);

        let bad = vec![vec![0.25; 8]; 3];
        assert!(controller.set_coupling_matrix(&bad).is_err());
    }

    #[test]
    fn test_downmix_weight_override() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        assert!(controller
            .set_downmix_weights(&[0.1; 8], &[0.1; 8])
            .unwrap());
        run_blocks(&mut engine, 1, 0.0);
        assert!(engine.downmixer.strategy_info().custom);

        assert!(controller.set_downmix_weights(&[0.1; 5], &[0.1; 8]).is_err());
    }

    #[test]
    fn test_latency_frames_published() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        run_blocks(&mut engine, 20, 0.0);
        let frame = controller.latest_latency().expect("no latency frame");
        assert!(frame.total_measured_ms > 0.0);
        assert!(!frame.calibrated);
    }

    #[test]
    fn test_calibration_publishes_updated_frame() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        let result = CalibrationResult {
            delay_samples: 1440.0,
            delay_ms: 30.0,
            quality: 0.9,
        };
        engine.apply_calibration(&result, None, None);
        let frame = controller.latest_latency().expect("no latency frame");
        assert!(frame.calibrated);
        assert!((frame.compensation_offset_ms - 30.0).abs() < 1e-4);
    }

    #[test]
    fn test_metrics_rate_gating() {
        let (mut engine, mut controller) = DaseEngine::new(SAMPLE_RATE, BUFFER_SIZE);
        // ~1 second of audio: the 30fps gate fires every 4th callback
        // (42.7ms spacing), far fewer frames than the ~94 callbacks
        let mut published = 0;
        let input = vec![0.0; BUFFER_SIZE];
        let mut output = StereoBuffer::silence(BUFFER_SIZE);
        let mut now = 0.0;
        for _ in 0..94 {
            now += BLOCK_SECS;
            engine.process(&input, &mut output, now, 12.0);
            if controller.latest_metrics().is_some() {
                published += 1;
            }
        }
        assert!(published >= 20 && published <= 32, "published {published}");
    }
}
