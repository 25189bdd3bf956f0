//! Latency drift monitoring
//!
//! Consumes one deviation sample per callback (wall-clock arrival minus
//! the audio clock's expected time, in ms) and detects slow clock drift
//! between the device and the host. Corrections are rare and deliberately
//! conservative: at most one per minute, and only once the accumulated
//! drift exceeds a threshold that grows with session length.

use std::collections::VecDeque;

/// Hard cap on retained measurements
const MAX_SAMPLES: usize = 10_000;

/// Regression window over the most recent measurements
const REGRESSION_WINDOW: usize = 100;

/// Minimum time span the regression window must cover, seconds
const MIN_REGRESSION_SPAN_SECS: f64 = 1.0;

/// Minimum interval between corrections, seconds
const CORRECTION_INTERVAL_SECS: f64 = 60.0;

/// Outcome of one drift measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftEstimate {
    /// Accumulated drift since the last correction, ms
    pub drift_ms: f32,
    /// Estimated drift rate from the regression window, ms/sec
    pub rate_ms_per_sec: f32,
    /// When present, the compensation offset should change by this amount
    pub correction_ms: Option<f32>,
}

pub struct DriftMonitor {
    samples: VecDeque<(f64, f32)>,
    start_time: Option<f64>,
    cumulative_drift_ms: f32,
    rate_ms_per_sec: f32,
    last_correction_time: f64,
    last_sample_time: Option<f64>,
}

impl DriftMonitor {
    pub fn new() -> Self {
        Self {
            samples: VecDeque::with_capacity(MAX_SAMPLES),
            start_time: None,
            cumulative_drift_ms: 0.0,
            rate_ms_per_sec: 0.0,
            last_correction_time: 0.0,
            last_sample_time: None,
        }
    }

    pub fn drift_ms(&self) -> f32 {
        self.cumulative_drift_ms
    }

    pub fn rate_ms_per_sec(&self) -> f32 {
        self.rate_ms_per_sec
    }

    /// Record one clock-deviation sample and re-estimate drift
    ///
    /// `deviation_ms` is the accumulated offset between wall clock and
    /// audio clock; the regression slope over the window is the drift
    /// rate.
    pub fn record(&mut self, now: f64, deviation_ms: f32) -> DriftEstimate {
        if !deviation_ms.is_finite() {
            return self.estimate_without_correction();
        }

        let start = *self.start_time.get_or_insert(now);
        if self.last_correction_time == 0.0 {
            self.last_correction_time = start;
        }

        if self.samples.len() == MAX_SAMPLES {
            self.samples.pop_front();
        }
        self.samples.push_back((now, deviation_ms));

        self.rate_ms_per_sec = self.regression_rate().unwrap_or(0.0);

        if let Some(prev) = self.last_sample_time {
            let dt = (now - prev).max(0.0) as f32;
            self.cumulative_drift_ms += self.rate_ms_per_sec * dt;
        }
        self.last_sample_time = Some(now);

        let correction = self.maybe_correct(now, start);
        DriftEstimate {
            drift_ms: self.cumulative_drift_ms,
            rate_ms_per_sec: self.rate_ms_per_sec,
            correction_ms: correction,
        }
    }

    /// Reset after an external recalibration
    pub fn reset(&mut self) {
        self.samples.clear();
        self.start_time = None;
        self.cumulative_drift_ms = 0.0;
        self.rate_ms_per_sec = 0.0;
        self.last_correction_time = 0.0;
        self.last_sample_time = None;
    }

    fn estimate_without_correction(&self) -> DriftEstimate {
        DriftEstimate {
            drift_ms: self.cumulative_drift_ms,
            rate_ms_per_sec: self.rate_ms_per_sec,
            correction_ms: None,
        }
    }

    /// Least-squares slope over the last `REGRESSION_WINDOW` samples
    ///
    /// Returns `None` until the window spans at least one second; a burst
    /// of closely spaced callbacks gives a meaningless slope.
    fn regression_rate(&self) -> Option<f32> {
        if self.samples.len() < REGRESSION_WINDOW {
            return None;
        }
        let window = self.samples.len() - REGRESSION_WINDOW;
        let recent: Vec<(f64, f32)> = self.samples.iter().skip(window).copied().collect();

        let span = recent[recent.len() - 1].0 - recent[0].0;
        if span < MIN_REGRESSION_SPAN_SECS {
            return None;
        }

        let n = recent.len() as f64;
        let t0 = recent[0].0;
        let mean_t: f64 = recent.iter().map(|(t, _)| t - t0).sum::<f64>() / n;
        let mean_y: f64 = recent.iter().map(|(_, y)| *y as f64).sum::<f64>() / n;

        let mut num = 0.0;
        let mut den = 0.0;
        for (t, y) in &recent {
            let dt = (t - t0) - mean_t;
            num += dt * (*y as f64 - mean_y);
            den += dt * dt;
        }
        if den <= f64::EPSILON {
            return None;
        }
        Some((num / den) as f32)
    }

    fn maybe_correct(&mut self, now: f64, start: f64) -> Option<f32> {
        if now - self.last_correction_time < CORRECTION_INTERVAL_SECS {
            return None;
        }

        // Threshold grows with session length: 2ms allowance per 10 minutes
        let elapsed_min = ((now - start) / 60.0) as f32;
        let threshold_ms = (elapsed_min / 10.0) * 2.0;
        if self.cumulative_drift_ms.abs() <= threshold_ms {
            return None;
        }

        let correction = self.cumulative_drift_ms;
        log::info!(
            "[LATENCY] Drift correction: {:.3}ms accumulated over {:.1} min (rate {:.4} ms/s)",
            correction,
            elapsed_min,
            self.rate_ms_per_sec
        );
        self.cumulative_drift_ms = 0.0;
        self.last_correction_time = now;
        Some(correction)
    }
}

impl Default for DriftMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCK_SECS: f64 = 512.0 / 48000.0;

    #[test]
    fn test_constant_deviation_never_corrects() {
        let mut monitor = DriftMonitor::new();
        let mut now = 0.0;
        for _ in 0..20_000 {
            now += BLOCK_SECS;
            let est = monitor.record(now, 12.0);
            assert!(est.correction_ms.is_none());
        }
        assert!(monitor.drift_ms().abs() < 1e-3);
    }

    #[test]
    fn test_growing_deviation_eventually_corrects() {
        let mut monitor = DriftMonitor::new();
        let mut now = 0.0;
        let mut corrected = None;
        // 0.5 ms/s upward drift, far past any plausible threshold
        for _ in 0..30_000 {
            now += BLOCK_SECS;
            let deviation = 12.0 + (now as f32) * 0.5;
            if let Some(c) = monitor.record(now, deviation).correction_ms {
                corrected = Some((now, c));
                break;
            }
        }
        let (when, correction) = corrected.expect("drift never detected");
        // The once-per-minute gate delays the first correction
        assert!(when >= 60.0);
        assert!(correction > 0.0);
        // Correction resets the accumulator
        assert!(monitor.drift_ms().abs() < 1e-3);
    }

    #[test]
    fn test_corrections_gated_to_one_per_minute() {
        let mut monitor = DriftMonitor::new();
        let mut now = 0.0;
        let mut correction_times: Vec<f64> = Vec::new();
        for _ in 0..120_000 {
            now += BLOCK_SECS;
            let deviation = 12.0 + (now as f32) * 1.0;
            if monitor.record(now, deviation).correction_ms.is_some() {
                correction_times.push(now);
            }
        }
        assert!(correction_times.len() >= 2);
        for pair in correction_times.windows(2) {
            assert!(pair[1] - pair[0] >= CORRECTION_INTERVAL_SECS - BLOCK_SECS);
        }
    }

    #[test]
    fn test_regression_needs_time_span() {
        let mut monitor = DriftMonitor::new();
        // 150 samples crammed into 0.15 seconds: slope must be ignored
        for i in 0..150 {
            let now = i as f64 * 0.001;
            monitor.record(now, 10.0 + i as f32);
        }
        assert_eq!(monitor.rate_ms_per_sec(), 0.0);
    }

    #[test]
    fn test_nan_sample_ignored() {
        let mut monitor = DriftMonitor::new();
        let est = monitor.record(1.0, f32::NAN);
        assert_eq!(est.drift_ms, 0.0);
        assert!(est.correction_ms.is_none());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut monitor = DriftMonitor::new();
        let mut now = 0.0;
        for _ in 0..500 {
            now += BLOCK_SECS;
            monitor.record(now, 12.0 + now as f32);
        }
        monitor.reset();
        assert_eq!(monitor.drift_ms(), 0.0);
        assert_eq!(monitor.rate_ms_per_sec(), 0.0);
    }
}
