//! Audio engine: oscillator field, downmix, command plumbing

pub mod command;
pub mod downmix;
#[allow(clippy::module_inception)]
pub mod engine;
pub mod field;
pub mod gc;

pub use command::{command_channel, DownmixWeights, EngineCommand, ParameterStore};
pub use downmix::{DownmixError, DownmixStats, DownmixStrategy, StereoDownmixer, StrategyInfo};
pub use engine::{DaseController, DaseEngine};
pub use field::{CouplingMatrix, FieldError, OscillatorField};
