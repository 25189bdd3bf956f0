//! CPAL stream driver
//!
//! Builds the full-duplex stream pair and runs the engine inside the
//! output callback:
//!
//! ```text
//!  Input Stream ──► mono sum ──► rtrb ring ──► Output Stream
//!  (capture thread)                            │ pop input block
//!                                              │ engine.process(...)
//!                                              │ interleave to device
//! ```
//!
//! The ring decouples the two callbacks; an empty ring substitutes
//! silence for the missing input samples, so a capture underrun never
//! stalls or aborts the output stream.

use std::time::Instant;

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize as CpalBufferSize, SampleFormat, Stream, StreamConfig};

use super::config::AudioConfig;
use super::device::{default_device, find_device, Direction};
use super::error::{AudioError, AudioResult};
use crate::engine::DaseEngine;
use crate::latency::calibration::{self, CalibrationResult};
use crate::latency::delay_line::MAX_DELAY_SECS;
use crate::metrics::frame::{DEFAULT_HW_INPUT_MS, DEFAULT_HW_OUTPUT_MS};
use crate::types::{StereoBuffer, MAX_BUFFER_SIZE};

/// Capacity of the input ring, in mono samples
const INPUT_RING_CAPACITY: usize = MAX_BUFFER_SIZE * 8;

/// Keeps the audio streams alive. Drop this to stop audio.
pub struct AudioHandle {
    _input_stream: Stream,
    _output_stream: Stream,
    sample_rate: u32,
    buffer_size: u32,
}

impl AudioHandle {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Actual buffer size in frames (as negotiated with the device)
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    /// One-way output latency in milliseconds
    pub fn latency_ms(&self) -> f32 {
        self.buffer_size as f32 / self.sample_rate as f32 * 1000.0
    }
}

/// Start the full-duplex audio system, consuming the engine
///
/// The engine moves into the output callback; control continues through
/// the [`crate::engine::DaseController`] half created alongside it.
pub fn start_audio(config: &AudioConfig, mut engine: DaseEngine) -> AudioResult<AudioHandle> {
    let input_device = match &config.input_device {
        Some(id) => find_device(id, Direction::Input)?,
        None => default_device(Direction::Input)?,
    };
    let output_device = match &config.output_device {
        Some(id) => find_device(id, Direction::Output)?,
        None => default_device(Direction::Output)?,
    };

    log::info!(
        "Using input '{}', output '{}'",
        input_device.name().unwrap_or_else(|_| "Unknown".into()),
        output_device.name().unwrap_or_else(|_| "Unknown".into()),
    );

    let (input_config, input_rate) = stream_config(&input_device, Direction::Input, config)?;
    let (output_config, output_rate) = stream_config(&output_device, Direction::Output, config)?;
    if input_rate != output_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_rate,
            output: output_rate,
        });
    }
    let sample_rate = output_rate;
    let buffer_size = config.buffer_size.as_frames();

    log::info!(
        "Audio config: {}Hz, {} frames (~{:.1}ms), in {}ch / out {}ch",
        sample_rate,
        buffer_size,
        config.buffer_size.latency_ms(sample_rate),
        input_config.channels,
        output_config.channels,
    );

    let (mut input_tx, mut input_rx) = rtrb::RingBuffer::<f32>::new(INPUT_RING_CAPACITY);

    // ── Input stream: sum channels to mono and feed the ring ──
    let in_channels = input_config.channels as usize;
    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(in_channels) {
                    let mono = frame.iter().sum::<f32>() / in_channels as f32;
                    // A full ring means the output side stalled; newest
                    // data is dropped and logged from the consumer side
                    let _ = input_tx.push(mono);
                }
            },
            |err| log::error!("Input stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    // ── Output stream: run the engine and interleave ──
    let out_channels = output_config.channels as usize;
    let started = Instant::now();
    let mut input_block: Vec<f32> = vec![0.0; MAX_BUFFER_SIZE];
    let mut stereo = StereoBuffer::silence(MAX_BUFFER_SIZE);
    let mut underrun_logged = false;
    let engine_ms = buffer_size as f32 / sample_rate as f32 * 1000.0;

    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], info: &cpal::OutputCallbackInfo| {
                let n_frames = (data.len() / out_channels).min(MAX_BUFFER_SIZE);
                let now = started.elapsed().as_secs_f64();

                // Pull whatever input arrived; silence fills the gap
                let available = input_rx.slots().min(n_frames);
                for sample in input_block.iter_mut().take(available) {
                    *sample = input_rx.pop().unwrap_or(0.0);
                }
                input_block[available..n_frames].fill(0.0);
                if available < n_frames && !underrun_logged {
                    log::warn!(
                        "Input underrun: {available}/{n_frames} samples available"
                    );
                    underrun_logged = true;
                } else if available == n_frames {
                    underrun_logged = false;
                }

                let output_delay_ms = info
                    .timestamp()
                    .playback
                    .duration_since(&info.timestamp().callback)
                    .map(|d| d.as_secs_f32() * 1000.0)
                    .unwrap_or(DEFAULT_HW_OUTPUT_MS);
                let measured_ms = DEFAULT_HW_INPUT_MS + engine_ms + output_delay_ms;

                stereo.set_len_from_capacity(n_frames);
                engine.process(&input_block[..n_frames], &mut stereo, now, measured_ms);

                for (i, frame) in data.chunks_mut(out_channels).enumerate() {
                    if i < n_frames {
                        let sample = stereo[i];
                        frame[0] = sample.left;
                        if out_channels > 1 {
                            frame[1] = sample.right;
                        }
                        for ch in frame.iter_mut().skip(2) {
                            *ch = 0.0;
                        }
                    } else {
                        frame.fill(0.0);
                    }
                }
            },
            |err| log::error!("Output stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    log::info!("Audio streams started");

    Ok(AudioHandle {
        _input_stream: input_stream,
        _output_stream: output_stream,
        sample_rate,
        buffer_size,
    })
}

/// Loopback calibration: play the reference signal while recording
///
/// Blocking, operator-invoked, and never run while the engine streams
/// are up. Returns the measured delay for
/// [`DaseEngine::apply_calibration`].
pub fn run_loopback_calibration(config: &AudioConfig) -> AudioResult<CalibrationResult> {
    let input_device = match &config.input_device {
        Some(id) => find_device(id, Direction::Input)?,
        None => default_device(Direction::Input)?,
    };
    let output_device = match &config.output_device {
        Some(id) => find_device(id, Direction::Output)?,
        None => default_device(Direction::Output)?,
    };

    let (input_config, input_rate) = stream_config(&input_device, Direction::Input, config)?;
    let (output_config, output_rate) = stream_config(&output_device, Direction::Output, config)?;
    if input_rate != output_rate {
        return Err(AudioError::SampleRateMismatch {
            input: input_rate,
            output: output_rate,
        });
    }
    let sample_rate = output_rate;

    let reference = calibration::reference_signal(sample_rate);
    // Record the reference plus the full plausible-delay window
    let record_len = reference.len() + (sample_rate as f32 * MAX_DELAY_SECS * 3.0) as usize;
    let (mut rec_tx, mut rec_rx) = rtrb::RingBuffer::<f32>::new(record_len * 2);

    let in_channels = input_config.channels as usize;
    let input_stream = input_device
        .build_input_stream(
            &input_config,
            move |data: &[f32], _info: &cpal::InputCallbackInfo| {
                for frame in data.chunks(in_channels) {
                    let mono = frame.iter().sum::<f32>() / in_channels as f32;
                    let _ = rec_tx.push(mono);
                }
            },
            |err| log::error!("Calibration input stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    let out_channels = output_config.channels as usize;
    let playback = reference.clone();
    let mut play_pos = 0usize;
    let output_stream = output_device
        .build_output_stream(
            &output_config,
            move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(out_channels) {
                    let sample = playback.get(play_pos).copied().unwrap_or(0.0);
                    play_pos = play_pos.saturating_add(1);
                    frame.fill(sample);
                }
            },
            |err| log::error!("Calibration output stream error: {err}"),
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    input_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;
    output_stream
        .play()
        .map_err(|e| AudioError::StreamPlayError(e.to_string()))?;

    // Drain the recording on this (blocking, non-RT) thread
    let mut recorded = Vec::with_capacity(record_len);
    let deadline = Instant::now() + std::time::Duration::from_secs(3);
    while recorded.len() < record_len {
        while let Ok(sample) = rec_rx.pop() {
            recorded.push(sample);
            if recorded.len() >= record_len {
                break;
            }
        }
        if Instant::now() > deadline {
            log::warn!(
                "Calibration capture timed out with {}/{} samples",
                recorded.len(),
                record_len
            );
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    drop(input_stream);
    drop(output_stream);

    Ok(calibration::analyze(&recorded, &reference, sample_rate)?)
}

/// Pick a device configuration: f32 samples at the target rate
fn stream_config(
    device: &cpal::Device,
    direction: Direction,
    config: &AudioConfig,
) -> AudioResult<(StreamConfig, u32)> {
    let supported: Vec<cpal::SupportedStreamConfigRange> = match direction {
        Direction::Input => device
            .supported_input_configs()
            .map(|c| c.collect())
            .map_err(|e| AudioError::ConfigError(e.to_string()))?,
        Direction::Output => device
            .supported_output_configs()
            .map(|c| c.collect())
            .map_err(|e| AudioError::ConfigError(e.to_string()))?,
    };
    if supported.is_empty() {
        return Err(AudioError::ConfigError(format!(
            "No supported {direction:?} configurations"
        )));
    }

    let min_channels: u16 = match direction {
        Direction::Input => 1,
        Direction::Output => 2,
    };
    let target_rate = config.target_sample_rate();

    let best = supported
        .iter()
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| c.channels() >= min_channels)
        .find(|c| target_rate >= c.min_sample_rate().0 && target_rate <= c.max_sample_rate().0)
        .or_else(|| supported.iter().find(|c| c.channels() >= min_channels))
        .or_else(|| supported.first())
        .ok_or_else(|| {
            AudioError::ConfigError(format!("No suitable {direction:?} configuration"))
        })?;

    if best.sample_format() != SampleFormat::F32 {
        return Err(AudioError::UnsupportedFormat(format!(
            "{:?}",
            best.sample_format()
        )));
    }

    let sample_rate = if target_rate >= best.min_sample_rate().0
        && target_rate <= best.max_sample_rate().0
    {
        cpal::SampleRate(target_rate)
    } else {
        let fallback = best.max_sample_rate();
        log::warn!(
            "Device doesn't support {target_rate}Hz, falling back to {}Hz",
            fallback.0
        );
        fallback
    };

    let stream_config = StreamConfig {
        channels: best.channels(),
        sample_rate,
        buffer_size: CpalBufferSize::Fixed(config.buffer_size.as_frames()),
    };
    Ok((stream_config, sample_rate.0))
}
