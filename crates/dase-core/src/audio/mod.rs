//! Audio I/O: device enumeration, stream driver, calibration harness

pub mod config;
pub mod device;
pub mod driver;
pub mod error;

pub use config::{AudioConfig, BufferSize, DeviceId, DEFAULT_BUFFER_SIZE, DEFAULT_SAMPLE_RATE};
pub use device::{list_devices, AudioDevice, Direction};
pub use driver::{run_loopback_calibration, start_audio, AudioHandle};
pub use error::{AudioError, AudioResult};
