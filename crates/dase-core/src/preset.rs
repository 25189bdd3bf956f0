//! Preset persistence
//!
//! A preset is a full control-plane snapshot: field tuning, Φ-modulation
//! settings, and downmix configuration. Presets load from YAML, are
//! validated on the control thread, and travel to the audio thread as a
//! single boxed command.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::engine::downmix::DownmixStrategy;
use crate::engine::field::CouplingMatrix;
use crate::phi::PhiMode;
use crate::types::{NUM_CHANNELS, PHI, PHI_INV};

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read preset file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse preset: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid preset: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldPreset {
    pub frequencies: [f32; NUM_CHANNELS],
    pub amplitudes: [f32; NUM_CHANNELS],
    pub enabled: [bool; NUM_CHANNELS],
    pub coupling_strength: f32,
    #[serde(default)]
    pub coupling_matrix: Option<CouplingMatrix>,
}

impl Default for FieldPreset {
    fn default() -> Self {
        Self {
            frequencies: [100.0, 150.0, 200.0, 250.0, 300.0, 350.0, 400.0, 450.0],
            amplitudes: [1.0; NUM_CHANNELS],
            enabled: [true; NUM_CHANNELS],
            coupling_strength: 0.5,
            coupling_matrix: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhiPreset {
    pub mode: PhiMode,
    pub manual_depth: f32,
    pub manual_phase: f32,
    pub internal_frequency: f32,
}

impl Default for PhiPreset {
    fn default() -> Self {
        Self {
            mode: PhiMode::Internal,
            manual_depth: 1.0,
            manual_phase: 0.0,
            internal_frequency: 0.1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownmixPreset {
    pub strategy: DownmixStrategy,
    pub master_gain: f32,
}

impl Default for DownmixPreset {
    fn default() -> Self {
        Self {
            strategy: DownmixStrategy::Spatial,
            master_gain: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EnginePreset {
    pub name: String,
    #[serde(default)]
    pub field: FieldPreset,
    #[serde(default)]
    pub phi: PhiPreset,
    #[serde(default)]
    pub downmix: DownmixPreset,
}

impl EnginePreset {
    pub fn load(path: &Path) -> Result<Self, PresetError> {
        let text = std::fs::read_to_string(path)?;
        let preset: Self = serde_yaml::from_str(&text)?;
        preset.validate()?;
        Ok(preset)
    }

    pub fn save(&self, path: &Path) -> Result<(), PresetError> {
        self.validate()?;
        let text = serde_yaml::to_string(self)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    /// Control-boundary validation; the audio thread trusts what it gets
    pub fn validate(&self) -> Result<(), PresetError> {
        for (i, &f) in self.field.frequencies.iter().enumerate() {
            if !f.is_finite() || f <= 0.0 {
                return Err(PresetError::Invalid(format!(
                    "channel {i} frequency {f} must be finite and positive"
                )));
            }
        }
        for (i, &a) in self.field.amplitudes.iter().enumerate() {
            if !a.is_finite() || a < 0.0 {
                return Err(PresetError::Invalid(format!(
                    "channel {i} amplitude {a} must be finite and non-negative"
                )));
            }
        }
        if !self.field.coupling_strength.is_finite()
            || !(0.0..=1.0).contains(&self.field.coupling_strength)
        {
            return Err(PresetError::Invalid(format!(
                "coupling strength {} must be in [0, 1]",
                self.field.coupling_strength
            )));
        }
        if !self.phi.manual_depth.is_finite()
            || self.phi.manual_depth < PHI_INV
            || self.phi.manual_depth > PHI
        {
            return Err(PresetError::Invalid(format!(
                "manual depth {} must be in [1/Φ, Φ]",
                self.phi.manual_depth
            )));
        }
        if !self.phi.internal_frequency.is_finite() || self.phi.internal_frequency <= 0.0 {
            return Err(PresetError::Invalid(format!(
                "internal frequency {} must be finite and positive",
                self.phi.internal_frequency
            )));
        }
        if !self.downmix.master_gain.is_finite() || self.downmix.master_gain < 0.0 {
            return Err(PresetError::Invalid(format!(
                "master gain {} must be finite and non-negative",
                self.downmix.master_gain
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_preset_validates() {
        assert!(EnginePreset::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_frequency() {
        let mut preset = EnginePreset::default();
        preset.field.frequencies[3] = -10.0;
        assert!(matches!(preset.validate(), Err(PresetError::Invalid(_))));
        preset.field.frequencies[3] = f32::NAN;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_bounds_depth() {
        let mut preset = EnginePreset::default();
        preset.phi.manual_depth = 2.0;
        assert!(preset.validate().is_err());
        preset.phi.manual_depth = 0.5;
        assert!(preset.validate().is_err());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut preset = EnginePreset::default();
        preset.name = "calm-field".to_string();
        preset.downmix.strategy = DownmixStrategy::Phi;
        preset.phi.mode = PhiMode::Sensor;

        let text = serde_yaml::to_string(&preset).unwrap();
        let back: EnginePreset = serde_yaml::from_str(&text).unwrap();
        assert_eq!(back, preset);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let back: EnginePreset = serde_yaml::from_str("name: minimal\n").unwrap();
        assert_eq!(back.name, "minimal");
        assert_eq!(back.field, FieldPreset::default());
        assert_eq!(back.downmix.strategy, DownmixStrategy::Spatial);
    }
}
