//! D-ASE Core - Real-time oscillator field synthesis and analysis

pub mod audio;
pub mod engine;
pub mod latency;
pub mod metrics;
pub mod phi;
pub mod preset;
pub mod telemetry;
pub mod types;

pub use types::*;
