//! Latency measurement and compensation
//!
//! The [`LatencyManager`] owns the single long-lived [`LatencyFrame`] for
//! the session, the fractional delay line that applies compensation to
//! the output path, and the drift monitor that keeps the two honest over
//! multi-hour sessions.

pub mod calibration;
pub mod delay_line;
pub mod drift;

pub use calibration::{CalibrationError, CalibrationResult};
pub use delay_line::FractionalDelayLine;
pub use drift::{DriftEstimate, DriftMonitor};

use crate::metrics::frame::{buffer_duration_ms, LatencyFrame};
use crate::types::StereoBuffer;

pub struct LatencyManager {
    frame: LatencyFrame,
    delay_line: FractionalDelayLine,
    drift: DriftMonitor,
    sample_rate: u32,
    /// Audio-clock time of the next callback, anchored at the first one
    expected_time: Option<f64>,
}

impl LatencyManager {
    pub fn new(sample_rate: u32, buffer_size: u32) -> Self {
        Self {
            frame: LatencyFrame::with_defaults(sample_rate, buffer_size),
            delay_line: FractionalDelayLine::new(sample_rate),
            drift: DriftMonitor::new(),
            sample_rate,
            expected_time: None,
        }
    }

    /// Current bookkeeping snapshot
    pub fn frame(&self) -> &LatencyFrame {
        &self.frame
    }

    /// Total measured latency in ms
    pub fn total_ms(&self) -> f32 {
        self.frame.total_measured_ms
    }

    /// Apply the compensation delay to one output block (real-time path)
    pub fn compensate_block(&mut self, buffer: &mut StereoBuffer) {
        self.delay_line.process_block(buffer);
    }

    /// Operator trim on top of the measured offset
    pub fn set_manual_offset_ms(&mut self, offset_ms: f32) {
        if !offset_ms.is_finite() {
            log::warn!("[LATENCY] Ignoring non-finite manual offset");
            return;
        }
        self.frame.manual_offset_ms = offset_ms;
        self.reconfigure_delay();
    }

    /// Adopt a calibration measurement
    ///
    /// Hardware components come from the device layer when it can report
    /// them; otherwise the defaults stand. Engine latency is the buffer
    /// duration, OS latency the residual of the measured total.
    pub fn apply_calibration(
        &mut self,
        result: &CalibrationResult,
        hw_input_ms: Option<f32>,
        hw_output_ms: Option<f32>,
    ) {
        if let Some(hw_in) = hw_input_ms {
            self.frame.hw_input_ms = hw_in;
        }
        if let Some(hw_out) = hw_output_ms {
            self.frame.hw_output_ms = hw_out;
        }
        self.frame.engine_ms =
            buffer_duration_ms(self.sample_rate, self.frame.buffer_size_samples);

        let accounted = self.frame.hw_input_ms + self.frame.hw_output_ms + self.frame.engine_ms;
        self.frame.os_ms = (result.delay_ms - accounted).max(0.0);
        self.frame.compute_total();

        self.frame.compensation_offset_ms = result.delay_ms;
        self.frame.calibrated = true;
        self.frame.calibration_quality = result.quality;

        self.drift.reset();
        self.expected_time = None;
        self.delay_line.clear();
        self.reconfigure_delay();

        log::info!(
            "[LATENCY] Calibrated: total {:.2}ms (hw_in {:.1} / hw_out {:.1} / engine {:.1} / os {:.1}), quality {:.2}",
            self.frame.total_measured_ms,
            self.frame.hw_input_ms,
            self.frame.hw_output_ms,
            self.frame.engine_ms,
            self.frame.os_ms,
            self.frame.calibration_quality
        );
    }

    /// Per-callback timing update (real-time path)
    ///
    /// Compares the callback's wall-clock arrival against the audio
    /// clock's expected time (`frames / sample_rate` accumulated per
    /// callback) and feeds the deviation into the drift monitor. A device
    /// clock running slow or fast shows up here even when its reported
    /// round-trip latency never moves. Returns true when the compensation
    /// offset changed, so the caller can publish the updated frame before
    /// the next compensated block.
    pub fn update_timing(
        &mut self,
        now: f64,
        frames: usize,
        measured_ms: f32,
        cpu_load: f32,
    ) -> bool {
        self.frame.timestamp = now;
        self.frame.cpu_load = cpu_load;
        if measured_ms.is_finite() && measured_ms >= 0.0 {
            self.frame.total_measured_ms = measured_ms;
        }

        let expected = *self.expected_time.get_or_insert(now);
        let deviation_ms = ((now - expected) * 1000.0) as f32;
        self.expected_time = Some(expected + frames as f64 / self.sample_rate as f64);

        let estimate = self.drift.record(now, deviation_ms);
        self.frame.drift_ms = estimate.drift_ms;
        self.frame.drift_rate_ms_per_sec = estimate.rate_ms_per_sec;

        if let Some(correction_ms) = estimate.correction_ms {
            self.frame.compensation_offset_ms =
                (self.frame.compensation_offset_ms + correction_ms).max(0.0);
            self.frame.drift_ms = 0.0;
            self.reconfigure_delay();
            return true;
        }
        false
    }

    fn reconfigure_delay(&mut self) {
        let offset_ms = self.frame.effective_offset_ms();
        // Multiply first so whole-millisecond offsets land on whole samples
        let samples = offset_ms * self.sample_rate as f32 / 1000.0;
        self.delay_line.set_delay_samples(samples);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StereoSample;

    const BLOCK_SECS: f64 = 512.0 / 48000.0;

    #[test]
    fn test_defaults_before_calibration() {
        let manager = LatencyManager::new(48000, 512);
        let frame = manager.frame();
        assert!(!frame.calibrated);
        assert_eq!(frame.hw_input_ms, 5.0);
        assert_eq!(frame.hw_output_ms, 5.0);
        let expected = frame.hw_input_ms + frame.hw_output_ms + frame.engine_ms + frame.os_ms;
        assert!((frame.total_measured_ms - expected).abs() < 1e-6);
    }

    #[test]
    fn test_calibration_updates_components_and_delay() {
        let mut manager = LatencyManager::new(48000, 512);
        let result = CalibrationResult {
            delay_samples: 1440.0,
            delay_ms: 30.0,
            quality: 0.8,
        };
        manager.apply_calibration(&result, Some(6.0), Some(7.0));
        let frame = manager.frame();
        assert!(frame.calibrated);
        assert_eq!(frame.hw_input_ms, 6.0);
        assert_eq!(frame.hw_output_ms, 7.0);
        // OS component is the residual, total matches the measurement
        assert!((frame.total_measured_ms - 30.0).abs() < 1e-4);
        assert_eq!(frame.compensation_offset_ms, 30.0);
    }

    #[test]
    fn test_compensation_delays_output() {
        let mut manager = LatencyManager::new(48000, 512);
        let result = CalibrationResult {
            delay_samples: 48.0,
            delay_ms: 1.0,
            quality: 0.9,
        };
        manager.apply_calibration(&result, None, None);

        let mut block = StereoBuffer::silence(512);
        block[0] = StereoSample::new(1.0, 1.0);
        manager.compensate_block(&mut block);
        // The impulse re-emerges 48 samples later
        assert_eq!(block[0].left, 0.0);
        assert_eq!(block[48].left, 1.0);
    }

    #[test]
    fn test_manual_offset_adds_to_delay() {
        let mut manager = LatencyManager::new(48000, 512);
        manager.set_manual_offset_ms(2.0);
        assert_eq!(manager.frame().manual_offset_ms, 2.0);

        let mut block = StereoBuffer::silence(512);
        block[0] = StereoSample::new(1.0, 1.0);
        manager.compensate_block(&mut block);
        // 2ms at 48kHz is 96 samples
        assert_eq!(block[96].left, 1.0);
    }

    #[test]
    fn test_cadence_drift_corrects_despite_stable_measurement() {
        // The device clock runs 1% slow: callbacks arrive late while the
        // reported round-trip latency never moves
        let mut manager = LatencyManager::new(48000, 512);
        manager.frame.compensation_offset_ms = 10.0;
        let mut now = 0.0;
        let mut changed = false;
        for _ in 0..10_000 {
            now += BLOCK_SECS * 1.01;
            if manager.update_timing(now, 512, 12.0, 0.1) {
                changed = true;
                break;
            }
        }
        assert!(changed);
        // The frame carries the new offset and a reset drift counter
        assert!(manager.frame().compensation_offset_ms > 10.0);
        assert_eq!(manager.frame().drift_ms, 0.0);
    }

    #[test]
    fn test_steady_cadence_never_corrects() {
        let mut manager = LatencyManager::new(48000, 512);
        let mut now = 0.0;
        for _ in 0..20_000 {
            now += BLOCK_SECS;
            assert!(!manager.update_timing(now, 512, 12.0, 0.1));
        }
        assert!(manager.frame().drift_ms.abs() < 1e-3);
    }

    #[test]
    fn test_update_timing_maintains_frame_fields() {
        let mut manager = LatencyManager::new(48000, 512);
        manager.update_timing(1.5, 512, 12.0, 0.42);
        assert_eq!(manager.frame().timestamp, 1.5);
        assert!((manager.frame().cpu_load - 0.42).abs() < 1e-6);
        // The live round-trip estimate lands in the published frame
        assert_eq!(manager.frame().total_measured_ms, 12.0);
    }
}
