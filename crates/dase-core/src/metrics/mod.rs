//! Analysis metrics: spectral engine, classifier, telemetry frames

pub mod classifier;
pub mod frame;
pub mod ici;

pub use classifier::{classify, consciousness_level, criticality};
pub use frame::{LatencyFrame, MetricsFrame, SystemState};
pub use ici::{IciEngine, SpectralMetrics};
