//! Loopback calibration analysis
//!
//! Measures round-trip latency by playing a known reference signal (a
//! 1kHz sine burst wrapped in silence) and cross-correlating the recorded
//! loopback against it. The analysis here is pure — the play/record
//! harness lives in the audio layer and hands us the captured buffer.

use realfft::num_complex::Complex;
use realfft::RealFftPlanner;
use thiserror::Error;

use crate::types::Sample;

/// Sine burst frequency
pub const REFERENCE_TONE_HZ: f32 = 1000.0;

/// Burst duration
pub const REFERENCE_TONE_SECS: f32 = 0.1;

/// Silence before the burst, so ADC/DAC ramp-in never clips the onset
pub const REFERENCE_LEAD_SECS: f32 = 0.05;

/// Measured delays beyond this are treated as calibration failure
pub const MAX_PLAUSIBLE_DELAY_MS: f32 = 500.0;

/// Quality below this logs a soft warning but does not fail calibration
pub const QUALITY_WARN_THRESHOLD: f32 = 0.3;

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("recorded signal too short: {got} samples, need at least {need}")]
    RecordingTooShort { got: usize, need: usize },
    #[error("implausible measured delay {delay_ms:.1}ms (negative or > {max_ms:.0}ms); check loopback wiring")]
    ImplausibleDelay { delay_ms: f32, max_ms: f32 },
    #[error("recorded signal contains no usable energy; check loopback wiring")]
    NoSignal,
}

/// Outcome of a successful calibration analysis
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationResult {
    pub delay_samples: f32,
    pub delay_ms: f32,
    /// Correlation peak sharpness, [0, 1]
    pub quality: f32,
}

/// Build the reference signal: lead silence then a Hann-shaped sine burst
pub fn reference_signal(sample_rate: u32) -> Vec<Sample> {
    let lead = (sample_rate as f32 * REFERENCE_LEAD_SECS) as usize;
    let tone = (sample_rate as f32 * REFERENCE_TONE_SECS) as usize;
    let mut signal = vec![0.0; lead + tone];
    for (i, sample) in signal[lead..].iter_mut().enumerate() {
        let t = i as f32 / sample_rate as f32;
        // Hann envelope avoids onset/offset clicks that smear the peak
        let env = 0.5 * (1.0 - (crate::types::TWO_PI * i as f32 / tone as f32).cos());
        *sample = env * (crate::types::TWO_PI * REFERENCE_TONE_HZ * t).sin();
    }
    signal
}

/// Cross-correlate the recording against the reference and locate the delay
///
/// FFT-based circular correlation; lags past the midpoint of the padded
/// length are negative lags, which are rejected as implausible.
pub fn analyze(
    recorded: &[Sample],
    reference: &[Sample],
    sample_rate: u32,
) -> Result<CalibrationResult, CalibrationError> {
    if recorded.len() < reference.len() {
        return Err(CalibrationError::RecordingTooShort {
            got: recorded.len(),
            need: reference.len(),
        });
    }
    if recorded.iter().all(|s| s.abs() < 1e-9) {
        return Err(CalibrationError::NoSignal);
    }

    let padded = (recorded.len() + reference.len()).next_power_of_two();
    let mut planner = RealFftPlanner::<f32>::new();
    let forward = planner.plan_fft_forward(padded);
    let inverse = planner.plan_fft_inverse(padded);

    let mut rec_time = vec![0.0; padded];
    rec_time[..recorded.len()].copy_from_slice(recorded);
    let mut ref_time = vec![0.0; padded];
    ref_time[..reference.len()].copy_from_slice(reference);

    let mut rec_spec = forward.make_output_vec();
    let mut ref_spec = forward.make_output_vec();
    // Planner-produced scratch; infallible for matching lengths
    if forward.process(&mut rec_time, &mut rec_spec).is_err()
        || forward.process(&mut ref_time, &mut ref_spec).is_err()
    {
        return Err(CalibrationError::NoSignal);
    }

    // corr(lag) = IFFT(REC · conj(REF))
    let mut cross: Vec<Complex<f32>> = rec_spec
        .iter()
        .zip(ref_spec.iter())
        .map(|(r, f)| r * f.conj())
        .collect();
    let mut corr = inverse.make_output_vec();
    if inverse.process(&mut cross, &mut corr).is_err() {
        return Err(CalibrationError::NoSignal);
    }

    let (peak_idx, peak_val) = corr
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
        .map(|(i, v)| (i, v.abs()))
        .unwrap_or((0, 0.0));

    // Indices past the midpoint wrap around to negative lags
    let delay_samples = if peak_idx > padded / 2 {
        peak_idx as f32 - padded as f32
    } else {
        peak_idx as f32
    };
    let delay_ms = delay_samples / sample_rate as f32 * 1000.0;

    if delay_ms < 0.0 || delay_ms > MAX_PLAUSIBLE_DELAY_MS {
        return Err(CalibrationError::ImplausibleDelay {
            delay_ms,
            max_ms: MAX_PLAUSIBLE_DELAY_MS,
        });
    }

    let mean_abs = corr.iter().map(|v| v.abs()).sum::<f32>() / corr.len() as f32;
    let quality = if mean_abs > 0.0 {
        (peak_val / (mean_abs * 10.0)).min(1.0)
    } else {
        0.0
    };

    if quality < QUALITY_WARN_THRESHOLD {
        log::warn!(
            "[LATENCY] Calibration quality {:.2} is low (delay {:.2}ms); result kept, but consider re-running with a cleaner loopback",
            quality,
            delay_ms
        );
    } else {
        log::info!(
            "[LATENCY] Calibration: delay {:.2}ms ({:.0} samples), quality {:.2}",
            delay_ms,
            delay_samples,
            quality
        );
    }

    Ok(CalibrationResult {
        delay_samples,
        delay_ms,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SR: u32 = 48000;

    fn delayed_recording(reference: &[Sample], delay: usize, tail: usize) -> Vec<Sample> {
        let mut rec = vec![0.0; delay + reference.len() + tail];
        rec[delay..delay + reference.len()].copy_from_slice(reference);
        rec
    }

    #[test]
    fn test_detects_known_delay() {
        let reference = reference_signal(SR);
        // 960 samples = 20ms at 48kHz
        let recorded = delayed_recording(&reference, 960, 4800);
        let result = analyze(&recorded, &reference, SR).unwrap();
        assert!((result.delay_samples - 960.0).abs() <= 2.0);
        assert!((result.delay_ms - 20.0).abs() < 0.1);
        assert!(result.quality > QUALITY_WARN_THRESHOLD);
    }

    #[test]
    fn test_detects_zero_delay() {
        let reference = reference_signal(SR);
        let recorded = delayed_recording(&reference, 0, 4800);
        let result = analyze(&recorded, &reference, SR).unwrap();
        assert!(result.delay_samples.abs() <= 2.0);
    }

    #[test]
    fn test_rejects_implausible_delay() {
        let reference = reference_signal(SR);
        // 600ms delay is past the plausibility cutoff
        let recorded = delayed_recording(&reference, (SR as f32 * 0.6) as usize, 4800);
        match analyze(&recorded, &reference, SR) {
            Err(CalibrationError::ImplausibleDelay { delay_ms, .. }) => {
                assert!(delay_ms > MAX_PLAUSIBLE_DELAY_MS);
            }
            other => panic!("expected implausible-delay error, got {other:?}"),
        }
    }

    #[test]
    fn test_rejects_silent_recording() {
        let reference = reference_signal(SR);
        let recorded = vec![0.0; reference.len() + 4800];
        assert!(matches!(
            analyze(&recorded, &reference, SR),
            Err(CalibrationError::NoSignal)
        ));
    }

    #[test]
    fn test_rejects_short_recording() {
        let reference = reference_signal(SR);
        let recorded = vec![0.0; 16];
        assert!(matches!(
            analyze(&recorded, &reference, SR),
            Err(CalibrationError::RecordingTooShort { .. })
        ));
    }

    #[test]
    fn test_survives_noise_and_attenuation() {
        let reference = reference_signal(SR);
        let mut recorded = delayed_recording(&reference, 480, 4800);
        // Attenuate and add deterministic pseudo-noise
        let mut seed = 0x2545f491u32;
        for sample in recorded.iter_mut() {
            seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
            let noise = (seed >> 16) as f32 / 65535.0 - 0.5;
            *sample = *sample * 0.3 + noise * 0.02;
        }
        let result = analyze(&recorded, &reference, SR).unwrap();
        assert!((result.delay_samples - 480.0).abs() <= 3.0);
    }
}
