//! Audio capture using cpal
//!
//! Opens an input device, converts its native sample format to 16-bit PCM
//! and pushes the first channel of every frame into the capture buffer.

use super::buffer::{AudioCaptureBuffer, CaptureReader, CaptureWriter, CloseHandle};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SizedSample, Stream, StreamConfig};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("No audio input device found")]
    NoDevice,

    #[error("Audio device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to get device name: {0}")]
    DeviceName(String),

    #[error("Failed to get default config: {0}")]
    DefaultConfig(String),

    #[error("Unsupported sample format: {0}")]
    UnsupportedSampleFormat(String),

    #[error("Failed to build stream: {0}")]
    BuildStream(String),

    #[error("Failed to play stream: {0}")]
    PlayStream(String),
}

/// Audio device information
#[derive(Debug, Clone)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Open capture stream feeding an `AudioCaptureBuffer`
///
/// Dropping it stops the device and marks the buffer closed.
pub struct CaptureStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
    reader: CaptureReader,
}

impl CaptureStream {
    /// Open a capture stream by device name ("default" for the system default)
    ///
    /// # Arguments
    /// * `device_name` - Input device to open
    /// * `size_hint` - Samples reserved in the capture buffer
    pub fn open(device_name: &str, size_hint: usize) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = if device_name == "default" {
            host.default_input_device().ok_or(AudioError::NoDevice)?
        } else {
            host.input_devices()
                .map_err(|e| AudioError::DeviceName(e.to_string()))?
                .find(|d| d.name().ok().as_deref() == Some(device_name))
                .ok_or_else(|| AudioError::DeviceNotFound(device_name.to_string()))?
        };

        Self::from_device(device, size_hint)
    }

    /// Open a capture stream on a specific device
    pub fn from_device(device: Device, size_hint: usize) -> Result<Self, AudioError> {
        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let config = device
            .default_input_config()
            .map_err(|e| AudioError::DefaultConfig(e.to_string()))?;

        let device_info = AudioDeviceInfo {
            name,
            sample_rate: config.sample_rate().0,
            channels: config.channels(),
        };

        log::info!(
            "Input device: {} ({:?}, {} Hz, {} ch)",
            device_info.name,
            config.sample_format(),
            device_info.sample_rate,
            device_info.channels
        );

        let sample_format = config.sample_format();
        let stream_config: StreamConfig = config.into();

        let (writer, reader) = AudioCaptureBuffer::new(size_hint, device_info.sample_rate).split();

        let stream = match sample_format {
            SampleFormat::I16 => build_capture::<i16>(&device, &stream_config, writer),
            SampleFormat::U16 => build_capture::<u16>(&device, &stream_config, writer),
            SampleFormat::I32 => build_capture::<i32>(&device, &stream_config, writer),
            SampleFormat::F32 => build_capture::<f32>(&device, &stream_config, writer),
            SampleFormat::F64 => build_capture::<f64>(&device, &stream_config, writer),
            other => Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other))),
        }?;

        Ok(Self {
            stream,
            device_info,
            reader,
        })
    }

    /// Start capturing audio
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio capture
    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Reader handle on the capture buffer
    pub fn reader(&self) -> CaptureReader {
        self.reader.clone()
    }

    /// Get device information
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}

fn build_capture<T>(
    device: &Device,
    config: &StreamConfig,
    mut writer: CaptureWriter,
) -> Result<Stream, AudioError>
where
    T: SizedSample,
    i16: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    let closer: CloseHandle = writer.close_handle();

    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                // Keep channel 0 only; no allocation on this path
                for frame in data.chunks(channels) {
                    writer.append(frame[0].to_sample::<i16>());
                }
            },
            move |err| {
                log::error!("Audio input error: {}", err);
                if matches!(err, cpal::StreamError::DeviceNotAvailable) {
                    closer.close();
                }
            },
            None,
        )
        .map_err(|e| AudioError::BuildStream(e.to_string()))
}

/// List available audio input devices
pub fn list_input_devices() -> Result<Vec<AudioDeviceInfo>, AudioError> {
    let host = cpal::default_host();
    let mut devices = Vec::new();

    let device_iter = host
        .input_devices()
        .map_err(|e| AudioError::DeviceName(e.to_string()))?;

    for device in device_iter {
        if let Ok(name) = device.name() {
            if let Ok(config) = device.default_input_config() {
                devices.push(AudioDeviceInfo {
                    name,
                    sample_rate: config.sample_rate().0,
                    channels: config.channels(),
                });
            }
        }
    }

    Ok(devices)
}
