//! 8-to-2 stereo downmix
//!
//! Pure weighted sum from the 8-channel field to a stereo block. Each
//! strategy is a fixed pair of length-8 weight vectors plus a
//! normalization constant; there is no dynamic range compression
//! anywhere in this path.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{MultiBuffer, StereoBuffer, PHI_INV, NUM_CHANNELS};

#[derive(Debug, Error)]
pub enum DownmixError {
    #[error("weight vector must have {expected} entries, got {got}")]
    WeightShape { expected: usize, got: usize },
    #[error("weight vector contains a non-finite entry at index {index}")]
    WeightNonFinite { index: usize },
}

/// Downmix strategy selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownmixStrategy {
    /// Channels 0-3 panned left by distance, 4-7 mirrored right
    #[default]
    Spatial,
    /// Equal power, 1/√8 per channel
    Energy,
    /// Equal weight, 1/8 per channel
    Linear,
    /// Golden-ratio weight decay, linearly panned left to right
    Phi,
}

impl DownmixStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownmixStrategy::Spatial => "spatial",
            DownmixStrategy::Energy => "energy",
            DownmixStrategy::Linear => "linear",
            DownmixStrategy::Phi => "phi",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DownmixStrategy::Spatial => "distance-tapered pan, channels 0-3 left / 4-7 right",
            DownmixStrategy::Energy => "equal power, 1/sqrt(8) per channel",
            DownmixStrategy::Linear => "equal weight, 1/8 per channel",
            DownmixStrategy::Phi => "golden-ratio weight decay with linear pan",
        }
    }
}

impl std::str::FromStr for DownmixStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        match s {
            "spatial" => Ok(DownmixStrategy::Spatial),
            "energy" => Ok(DownmixStrategy::Energy),
            "linear" => Ok(DownmixStrategy::Linear),
            "phi" => Ok(DownmixStrategy::Phi),
            _ => Err(()),
        }
    }
}

/// Introspection snapshot of the active mix configuration
#[derive(Debug, Clone, Serialize)]
pub struct StrategyInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub left_weights: [f32; NUM_CHANNELS],
    pub right_weights: [f32; NUM_CHANNELS],
    pub custom: bool,
}

/// Per-block output monitoring
#[derive(Debug, Clone, Copy, Default)]
pub struct DownmixStats {
    pub peak_left: f32,
    pub peak_right: f32,
    pub rms: f32,
    /// True when any output sample left [-1, 1] before the caller saw it
    pub clipped: bool,
}

/// Left/right weight pair, normalization already applied
#[derive(Debug, Clone, Copy, PartialEq)]
struct Weights {
    left: [f32; NUM_CHANNELS],
    right: [f32; NUM_CHANNELS],
}

impl Weights {
    fn for_strategy(strategy: DownmixStrategy) -> Self {
        match strategy {
            DownmixStrategy::Spatial => {
                // Distance taper toward the center, mirrored; norm 2.0
                let left = [0.8, 0.6, 0.4, 0.2, 0.0, 0.0, 0.0, 0.0];
                let right = [0.0, 0.0, 0.0, 0.0, 0.2, 0.4, 0.6, 0.8];
                Self {
                    left: left.map(|w| w / 2.0),
                    right: right.map(|w| w / 2.0),
                }
            }
            DownmixStrategy::Energy => {
                let w = 1.0 / (NUM_CHANNELS as f32).sqrt();
                Self {
                    left: [w; NUM_CHANNELS],
                    right: [w; NUM_CHANNELS],
                }
            }
            DownmixStrategy::Linear => {
                let w = 1.0 / NUM_CHANNELS as f32;
                Self {
                    left: [w; NUM_CHANNELS],
                    right: [w; NUM_CHANNELS],
                }
            }
            DownmixStrategy::Phi => {
                // Weight decays by 1/Φ per channel, normalized to sum 1,
                // then panned linearly across the field; norm 1.5
                let mut base = [0.0f32; NUM_CHANNELS];
                let mut w = 1.0;
                let mut sum = 0.0;
                for slot in base.iter_mut() {
                    *slot = w;
                    sum += w;
                    w *= PHI_INV;
                }
                let mut left = [0.0; NUM_CHANNELS];
                let mut right = [0.0; NUM_CHANNELS];
                for i in 0..NUM_CHANNELS {
                    let pan = i as f32 / (NUM_CHANNELS - 1) as f32;
                    let norm = base[i] / sum;
                    left[i] = norm * (1.0 - pan) / 1.5;
                    right[i] = norm * pan / 1.5;
                }
                Self { left, right }
            }
        }
    }
}

pub struct StereoDownmixer {
    strategy: DownmixStrategy,
    weights: Weights,
    custom_weights: Option<Weights>,
    master_gain: f32,
}

impl StereoDownmixer {
    pub fn new(strategy: DownmixStrategy) -> Self {
        Self {
            strategy,
            weights: Weights::for_strategy(strategy),
            custom_weights: None,
            master_gain: 1.0,
        }
    }

    pub fn strategy(&self) -> DownmixStrategy {
        self.strategy
    }

    /// Switching strategy drops any custom weight override
    pub fn set_strategy(&mut self, strategy: DownmixStrategy) {
        self.strategy = strategy;
        self.weights = Weights::for_strategy(strategy);
        self.custom_weights = None;
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        if gain.is_finite() && gain >= 0.0 {
            self.master_gain = gain;
        } else {
            log::warn!("[DOWNMIX] Ignoring invalid master gain {gain}");
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Override the strategy weights directly
    pub fn set_custom_weights(&mut self, left: &[f32], right: &[f32]) -> Result<(), DownmixError> {
        let left = validate_weights(left)?;
        let right = validate_weights(right)?;
        self.custom_weights = Some(Weights { left, right });
        Ok(())
    }

    /// The weights currently in effect, for control-surface display
    pub fn strategy_info(&self) -> StrategyInfo {
        let weights = self.custom_weights.as_ref().unwrap_or(&self.weights);
        StrategyInfo {
            name: self.strategy.as_str(),
            description: self.strategy.description(),
            left_weights: weights.left,
            right_weights: weights.right,
            custom: self.custom_weights.is_some(),
        }
    }

    /// Mix one block; deterministic for identical input and settings
    pub fn process(&self, input: &MultiBuffer, output: &mut StereoBuffer) -> DownmixStats {
        let weights = self.custom_weights.as_ref().unwrap_or(&self.weights);
        let len = input.len().min(output.len());

        let mut stats = DownmixStats::default();
        let mut sum_sq = 0.0;

        for n in 0..len {
            let mut left = 0.0;
            let mut right = 0.0;
            for ch in 0..NUM_CHANNELS {
                let s = input.channel(ch)[n];
                left += s * weights.left[ch];
                right += s * weights.right[ch];
            }
            left *= self.master_gain;
            right *= self.master_gain;

            if left.abs() > 1.0 || right.abs() > 1.0 {
                stats.clipped = true;
            }
            stats.peak_left = stats.peak_left.max(left.abs());
            stats.peak_right = stats.peak_right.max(right.abs());
            sum_sq += left * left + right * right;

            output[n] = crate::types::StereoSample::new(left, right);
        }

        if len > 0 {
            stats.rms = (sum_sq / (2 * len) as f32).sqrt();
        }
        stats
    }
}

impl Default for StereoDownmixer {
    fn default() -> Self {
        Self::new(DownmixStrategy::default())
    }
}

pub(crate) fn validate_weights(weights: &[f32]) -> Result<[f32; NUM_CHANNELS], DownmixError> {
    if weights.len() != NUM_CHANNELS {
        return Err(DownmixError::WeightShape {
            expected: NUM_CHANNELS,
            got: weights.len(),
        });
    }
    let mut out = [0.0; NUM_CHANNELS];
    for (i, &w) in weights.iter().enumerate() {
        if !w.is_finite() {
            return Err(DownmixError::WeightNonFinite { index: i });
        }
        out[i] = w;
    }
    Ok(out)
}
