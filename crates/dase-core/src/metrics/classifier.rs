//! State classification and composite metrics
//!
//! Pure functions from the spectral metrics to the discrete operating
//! state plus the two composite scalars (consciousness level and
//! criticality). Hysteresis/dwell-time policy belongs to consumers; the
//! classifier itself is stateless and deterministic.

use super::frame::SystemState;

/// Balanced operating point for the criticality distance
const CRITICAL_ICI: f32 = 0.6;
const CRITICAL_COHERENCE: f32 = 0.6;

/// Decision tree over (ici, phase_coherence, spectral_centroid)
///
/// Branches are ordered most-specific first; the first match wins.
pub fn classify(ici: f32, coherence: f32, centroid_hz: f32) -> SystemState {
    if !ici.is_finite() || !coherence.is_finite() || !centroid_hz.is_finite() {
        return SystemState::Transition;
    }

    if ici > 0.9 && coherence > 0.9 {
        SystemState::Hypersync
    } else if ici > 0.7 && coherence > 0.7 {
        SystemState::Alert
    } else if ici < 0.1 && coherence < 0.2 {
        SystemState::Coma
    } else if centroid_hz < 10.0 && coherence < 0.4 {
        SystemState::Sleep
    } else if (0.3..=0.7).contains(&ici) && coherence >= 0.4 {
        SystemState::Awake
    } else if ici < 0.3 {
        SystemState::Drowsy
    } else {
        SystemState::Transition
    }
}

/// Composite awareness estimate, clamped to [0, 1]
///
/// Weighted blend of coherence, channel differentiation (1 − ici), and
/// normalized spectral brightness.
pub fn consciousness_level(ici: f32, coherence: f32, centroid_hz: f32, sample_rate: u32) -> f32 {
    let nyquist = sample_rate as f32 / 2.0;
    let brightness = if nyquist > 0.0 {
        (centroid_hz / nyquist).min(1.0)
    } else {
        0.0
    };
    let level = 0.4 * coherence + 0.3 * (1.0 - ici) + 0.3 * brightness;
    if level.is_finite() {
        level.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Edge-of-chaos proximity
///
/// 1.0 at the balanced operating point (ici = coherence = 0.6), falling
/// off with Euclidean distance from it. Strong synchronization on both
/// axes adds an excess term, so a hypersynchronized field reads above
/// 1.0 rather than being silently normalized away. Never negative.
pub fn criticality(ici: f32, coherence: f32) -> f32 {
    if !ici.is_finite() || !coherence.is_finite() {
        return 0.0;
    }
    let d_ici = ici - CRITICAL_ICI;
    let d_coh = coherence - CRITICAL_COHERENCE;
    let distance = (d_ici * d_ici + d_coh * d_coh).sqrt() / std::f32::consts::SQRT_2;
    let sync_excess = (ici + coherence - 1.4).max(0.0);
    (1.0 - distance + sync_excess).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_threshold_table() {
        assert_eq!(classify(0.95, 0.95, 100.0), SystemState::Hypersync);
        assert_eq!(classify(0.8, 0.8, 100.0), SystemState::Alert);
        assert_eq!(classify(0.05, 0.1, 100.0), SystemState::Coma);
        assert_eq!(classify(0.5, 0.3, 5.0), SystemState::Sleep);
        assert_eq!(classify(0.5, 0.6, 100.0), SystemState::Awake);
        assert_eq!(classify(0.2, 0.3, 100.0), SystemState::Drowsy);
        assert_eq!(classify(0.8, 0.5, 100.0), SystemState::Transition);
    }

    #[test]
    fn test_classifier_precedence() {
        // Hypersync beats alert at the overlap
        assert_eq!(classify(0.91, 0.91, 100.0), SystemState::Hypersync);
        // Coma beats sleep when both would match
        assert_eq!(classify(0.05, 0.1, 5.0), SystemState::Coma);
        // Awake beats drowsy at ici = 0.3 with coherence
        assert_eq!(classify(0.3, 0.5, 100.0), SystemState::Awake);
    }

    #[test]
    fn test_classifier_nan_falls_to_transition() {
        assert_eq!(classify(f32::NAN, 0.5, 100.0), SystemState::Transition);
        assert_eq!(classify(0.5, 0.5, f32::INFINITY), SystemState::Transition);
    }

    #[test]
    fn test_criticality_peak_at_balance() {
        assert!((criticality(0.6, 0.6) - 1.0).abs() < 1e-6);
        assert!(criticality(0.3, 0.6) < 1.0);
        assert!(criticality(0.6, 0.9) < 1.0);
    }

    #[test]
    fn test_criticality_exceeds_one_under_hypersync() {
        let c = criticality(0.95, 0.95);
        assert!(c > 1.0, "hypersync criticality {c} should exceed 1.0");
    }

    #[test]
    fn test_criticality_never_negative() {
        assert_eq!(criticality(f32::NAN, 0.5), 0.0);
        assert!(criticality(0.0, 0.0) >= 0.0);
        assert!(criticality(1.0, 0.0) >= 0.0);
    }

    #[test]
    fn test_consciousness_composite() {
        // Full coherence, zero ici, bright spectrum maxes out
        assert!((consciousness_level(0.0, 1.0, 24_000.0, 48_000) - 1.0).abs() < 1e-6);
        // All-zero metrics give the differentiation term only
        assert!((consciousness_level(0.0, 0.0, 0.0, 48_000) - 0.3).abs() < 1e-6);
        // Brightness saturates at the Nyquist
        let a = consciousness_level(0.5, 0.5, 24_000.0, 48_000);
        let b = consciousness_level(0.5, 0.5, 90_000.0, 48_000);
        assert_eq!(a, b);
    }
}
