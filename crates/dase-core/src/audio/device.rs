//! Audio device enumeration and lookup
//!
//! Enumerates devices from all available audio hosts so users can pick
//! an input/output pair across backends (JACK and ALSA both show up on
//! Linux).

use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Host, HostId};

use super::config::DeviceId;
use super::error::{AudioError, AudioResult};

/// Which direction a device is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

/// Get a human-readable name for a host ID
fn host_name(host_id: HostId) -> String {
    let name = format!("{:?}", host_id);
    match name.as_str() {
        "Alsa" => "ALSA".to_string(),
        "Jack" => "JACK".to_string(),
        "Wasapi" => "WASAPI".to_string(),
        _ => name,
    }
}

fn get_host_by_name(name: &str) -> Option<Host> {
    for host_id in cpal::available_hosts() {
        if host_name(host_id) == name {
            return cpal::host_from_id(host_id).ok();
        }
    }
    None
}

/// Information about an audio device
#[derive(Debug, Clone)]
pub struct AudioDevice {
    /// Device identifier for configuration (includes host info)
    pub id: DeviceId,
    pub name: String,
    pub host: String,
    /// Whether this is the system default device for its host
    pub is_default: bool,
    /// Supported sample rates (common ones)
    pub sample_rates: Vec<u32>,
    pub max_channels: u16,
}

/// List devices for one direction across all hosts
pub fn list_devices(direction: Direction) -> AudioResult<Vec<AudioDevice>> {
    let mut all_devices: Vec<AudioDevice> = Vec::new();

    for host_id in cpal::available_hosts() {
        let host = match cpal::host_from_id(host_id) {
            Ok(h) => h,
            Err(e) => {
                log::debug!("Could not initialize host {:?}: {}", host_id, e);
                continue;
            }
        };
        let host_name_str = host_name(host_id);

        let default_name = match direction {
            Direction::Input => host.default_input_device(),
            Direction::Output => host.default_output_device(),
        }
        .and_then(|d| d.name().ok());

        let devices: Vec<cpal::Device> = match direction {
            Direction::Input => host.input_devices().map(|d| d.collect()),
            Direction::Output => host.output_devices().map(|d| d.collect()),
        }
        .unwrap_or_default();

        for device in devices {
            let name = match device.name() {
                Ok(n) => n,
                Err(_) => continue,
            };
            let configs: Vec<_> = match direction {
                Direction::Input => device
                    .supported_input_configs()
                    .map(|c| c.map(|c| (c.channels(), c.min_sample_rate().0, c.max_sample_rate().0)).collect()),
                Direction::Output => device
                    .supported_output_configs()
                    .map(|c| c.map(|c| (c.channels(), c.min_sample_rate().0, c.max_sample_rate().0)).collect()),
            }
            .unwrap_or_else(|_| Vec::new());

            if configs.is_empty() {
                continue;
            }

            let mut sample_rates: Vec<u32> = Vec::new();
            let mut max_channels: u16 = 0;
            for (channels, min_rate, max_rate) in &configs {
                max_channels = max_channels.max(*channels);
                for rate in [44100, 48000, 88200, 96000, 176400, 192000] {
                    if rate >= *min_rate && rate <= *max_rate && !sample_rates.contains(&rate) {
                        sample_rates.push(rate);
                    }
                }
            }
            sample_rates.sort();

            all_devices.push(AudioDevice {
                id: DeviceId::with_host(&name, &host_name_str),
                is_default: default_name.as_ref() == Some(&name),
                name,
                host: host_name_str.clone(),
                sample_rates,
                max_channels,
            });
        }
    }

    if all_devices.is_empty() {
        return Err(AudioError::NoDevices);
    }

    all_devices.sort_by(|a, b| {
        b.is_default
            .cmp(&a.is_default)
            .then_with(|| a.host.cmp(&b.host))
            .then_with(|| a.name.cmp(&b.name))
    });
    Ok(all_devices)
}

/// Resolve a configured device id to a cpal device
pub fn find_device(id: &DeviceId, direction: Direction) -> AudioResult<cpal::Device> {
    let host = match &id.host {
        Some(name) => get_host_by_name(name)
            .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))?,
        None => cpal::default_host(),
    };

    let devices: Vec<cpal::Device> = match direction {
        Direction::Input => host.input_devices().map(|d| d.collect()),
        Direction::Output => host.output_devices().map(|d| d.collect()),
    }
    .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    devices
        .into_iter()
        .find(|d| d.name().map(|n| n == id.name).unwrap_or(false))
        .ok_or_else(|| AudioError::DeviceNotFound(id.display_label()))
}

/// Default device for a direction on the default host
pub fn default_device(direction: Direction) -> AudioResult<cpal::Device> {
    let host = cpal::default_host();
    match direction {
        Direction::Input => host.default_input_device(),
        Direction::Output => host.default_output_device(),
    }
    .ok_or_else(|| AudioError::NoDefaultDevice(format!("{direction:?} on {:?}", host.id())))
}
