//! Telemetry frame types
//!
//! `MetricsFrame` and `LatencyFrame` are the two payloads published through
//! the telemetry channel. Both serialize to flat JSON objects whose field
//! names are the wire contract for downstream consumers, so the struct
//! field names here are load-bearing.

use serde::{Deserialize, Serialize};

use crate::phi::PhiMode;
use crate::types::{BUFFER_SIZE, SAMPLE_RATE};

/// Discrete operating state produced by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SystemState {
    /// Pre-classification default before the first valid frame
    #[default]
    Idle,
    Coma,
    Sleep,
    Drowsy,
    Awake,
    Alert,
    Hypersync,
    Transition,
}

impl SystemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemState::Idle => "IDLE",
            SystemState::Coma => "COMA",
            SystemState::Sleep => "SLEEP",
            SystemState::Drowsy => "DROWSY",
            SystemState::Awake => "AWAKE",
            SystemState::Alert => "ALERT",
            SystemState::Hypersync => "HYPERSYNC",
            SystemState::Transition => "TRANSITION",
        }
    }
}

/// One snapshot of the analysis metrics, built once per callback
///
/// Immutable after construction; ownership moves into a telemetry slot and
/// the frame is destroyed by overwrite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsFrame {
    /// Monotonic timestamp in seconds
    pub timestamp: f64,
    /// Inter-channel interaction, [0, 1]
    pub ici: f32,
    /// Pairwise phase alignment, [0, 1]
    pub phase_coherence: f32,
    /// Spectral centroid in Hz, >= 0
    pub spectral_centroid: f32,
    /// Edge-of-chaos proximity; >= 0, may exceed 1 under hypersync
    pub criticality: f32,
    /// Composite awareness estimate, [0, 1]
    pub consciousness_level: f32,
    pub state: SystemState,
    pub phi_phase: f32,
    pub phi_depth: f32,
    pub phi_source: PhiMode,
    /// Current total compensated latency in ms
    pub latency_ms: f32,
    /// Processing time as a fraction of the buffer duration, [0, 1+]
    pub cpu_load: f32,
    /// False when any numeric field was non-finite at build time
    pub valid: bool,
    /// Monotonic callback counter, assigned on the real-time thread
    pub frame_id: u64,
}

impl MetricsFrame {
    /// True when every numeric field is finite
    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.ici.is_finite()
            && self.phase_coherence.is_finite()
            && self.spectral_centroid.is_finite()
            && self.criticality.is_finite()
            && self.consciousness_level.is_finite()
            && self.phi_phase.is_finite()
            && self.phi_depth.is_finite()
            && self.latency_ms.is_finite()
            && self.cpu_load.is_finite()
    }

    /// Replace non-finite fields with safe values and clear `valid`
    ///
    /// Consumers treat an invalid frame as "repeat last good frame"; the
    /// sanitized values only exist so the frame still serializes.
    pub fn sanitize(&mut self) {
        if self.is_finite() {
            return;
        }
        self.valid = false;
        for field in [
            &mut self.ici,
            &mut self.phase_coherence,
            &mut self.spectral_centroid,
            &mut self.criticality,
            &mut self.consciousness_level,
            &mut self.phi_phase,
            &mut self.phi_depth,
            &mut self.latency_ms,
            &mut self.cpu_load,
        ] {
            if !field.is_finite() {
                *field = 0.0;
            }
        }
        if !self.timestamp.is_finite() {
            self.timestamp = 0.0;
        }
    }
}

impl Default for MetricsFrame {
    fn default() -> Self {
        Self {
            timestamp: 0.0,
            ici: 0.5,
            phase_coherence: 0.5,
            spectral_centroid: 0.0,
            criticality: 0.0,
            consciousness_level: 0.0,
            state: SystemState::Idle,
            phi_phase: 0.0,
            phi_depth: 1.0,
            phi_source: PhiMode::Internal,
            latency_ms: 0.0,
            cpu_load: 0.0,
            valid: true,
            frame_id: 0,
        }
    }
}

/// Long-lived latency bookkeeping record, one per session
///
/// Created at manager construction with default estimates, mutated by
/// calibration and per-callback drift updates. `total_measured_ms` must be
/// recomputed through [`LatencyFrame::compute_total`] after any component
/// mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyFrame {
    /// Monotonic timestamp of the last update, in seconds
    pub timestamp: f64,
    /// Input-device hardware latency estimate, ms
    pub hw_input_ms: f32,
    /// Output-device hardware latency estimate, ms
    pub hw_output_ms: f32,
    /// Engine processing latency (one buffer duration), ms
    pub engine_ms: f32,
    /// OS/driver residual latency, ms
    pub os_ms: f32,
    /// Sum of the four components, ms
    pub total_measured_ms: f32,
    /// Delay currently applied by the compensation delay line, ms
    pub compensation_offset_ms: f32,
    /// Operator-supplied trim added on top of the measured offset, ms
    pub manual_offset_ms: f32,
    /// Cumulative drift since the last correction, ms
    pub drift_ms: f32,
    pub drift_rate_ms_per_sec: f32,
    pub calibrated: bool,
    /// Cross-correlation peak sharpness from the last calibration, [0, 1]
    pub calibration_quality: f32,
    pub buffer_size_samples: u32,
    pub sample_rate: u32,
    pub cpu_load: f32,
}

/// Default component estimates used before calibration, in ms
pub const DEFAULT_HW_INPUT_MS: f32 = 5.0;
pub const DEFAULT_HW_OUTPUT_MS: f32 = 5.0;
pub const DEFAULT_ENGINE_MS: f32 = 2.0;
pub const DEFAULT_OS_MS: f32 = 1.0;

impl LatencyFrame {
    pub fn with_defaults(sample_rate: u32, buffer_size: u32) -> Self {
        let mut frame = Self {
            timestamp: 0.0,
            hw_input_ms: DEFAULT_HW_INPUT_MS,
            hw_output_ms: DEFAULT_HW_OUTPUT_MS,
            engine_ms: buffer_duration_ms(sample_rate, buffer_size),
            os_ms: DEFAULT_OS_MS,
            total_measured_ms: 0.0,
            compensation_offset_ms: 0.0,
            manual_offset_ms: 0.0,
            drift_ms: 0.0,
            drift_rate_ms_per_sec: 0.0,
            calibrated: false,
            calibration_quality: 0.0,
            buffer_size_samples: buffer_size,
            sample_rate,
            cpu_load: 0.0,
        };
        frame.compute_total();
        frame
    }

    /// Recompute `total_measured_ms` from the four components
    pub fn compute_total(&mut self) -> f32 {
        self.total_measured_ms = self.hw_input_ms + self.hw_output_ms + self.engine_ms + self.os_ms;
        self.total_measured_ms
    }

    /// Effective delay the compensation stage should apply, ms
    pub fn effective_offset_ms(&self) -> f32 {
        (self.compensation_offset_ms + self.manual_offset_ms).max(0.0)
    }

    /// Residual latency after compensation, ms
    pub fn effective_latency_ms(&self) -> f32 {
        self.total_measured_ms - self.compensation_offset_ms - self.manual_offset_ms
    }

    /// True when the residual latency is within `tolerance_ms` of zero
    pub fn is_aligned(&self, tolerance_ms: f32) -> bool {
        self.effective_latency_ms().abs() <= tolerance_ms
    }

    pub fn is_finite(&self) -> bool {
        self.timestamp.is_finite()
            && self.hw_input_ms.is_finite()
            && self.hw_output_ms.is_finite()
            && self.engine_ms.is_finite()
            && self.os_ms.is_finite()
            && self.total_measured_ms.is_finite()
            && self.compensation_offset_ms.is_finite()
            && self.manual_offset_ms.is_finite()
            && self.drift_ms.is_finite()
            && self.drift_rate_ms_per_sec.is_finite()
            && self.calibration_quality.is_finite()
            && self.cpu_load.is_finite()
    }
}

impl Default for LatencyFrame {
    fn default() -> Self {
        Self::with_defaults(SAMPLE_RATE, BUFFER_SIZE as u32)
    }
}

/// Duration of one buffer in milliseconds
pub fn buffer_duration_ms(sample_rate: u32, buffer_size: u32) -> f32 {
    if sample_rate == 0 {
        return 0.0;
    }
    buffer_size as f32 / sample_rate as f32 * 1000.0
}
