//! Playback of the captured buffer using cpal
//!
//! The output callback pulls from the capture buffer's playback cursor and
//! writes silence once it catches up with the capture.

use super::buffer::CaptureReader;
use super::input::{AudioDeviceInfo, AudioError};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, FromSample, Sample, SampleFormat, SampleRate, SizedSample, Stream, StreamConfig};

/// Audio output stream replaying a capture buffer
pub struct PlaybackStream {
    stream: Stream,
    device_info: AudioDeviceInfo,
}

impl PlaybackStream {
    /// Create playback on the default output device
    pub fn from_default_device(reader: CaptureReader) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::NoDevice)?;

        Self::from_device(device, reader)
    }

    /// Create playback on a specific device at the capture's sample rate
    pub fn from_device(device: Device, reader: CaptureReader) -> Result<Self, AudioError> {
        let name = device
            .name()
            .map_err(|e| AudioError::DeviceName(e.to_string()))?;

        let config = device
            .default_output_config()
            .map_err(|e| AudioError::DefaultConfig(e.to_string()))?;

        let stream_config = StreamConfig {
            channels: config.channels(),
            sample_rate: SampleRate(reader.sample_rate()),
            buffer_size: cpal::BufferSize::Default,
        };

        let device_info = AudioDeviceInfo {
            name,
            sample_rate: reader.sample_rate(),
            channels: config.channels(),
        };

        let stream = match config.sample_format() {
            SampleFormat::I16 => build_playback::<i16>(&device, &stream_config, reader),
            SampleFormat::U16 => build_playback::<u16>(&device, &stream_config, reader),
            SampleFormat::I32 => build_playback::<i32>(&device, &stream_config, reader),
            SampleFormat::F32 => build_playback::<f32>(&device, &stream_config, reader),
            SampleFormat::F64 => build_playback::<f64>(&device, &stream_config, reader),
            other => Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other))),
        }?;

        Ok(Self {
            stream,
            device_info,
        })
    }

    /// Start playing audio
    pub fn start(&self) -> Result<(), AudioError> {
        self.stream
            .play()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Pause audio playback
    pub fn pause(&self) -> Result<(), AudioError> {
        self.stream
            .pause()
            .map_err(|e| AudioError::PlayStream(e.to_string()))
    }

    /// Get device information
    pub fn device_info(&self) -> &AudioDeviceInfo {
        &self.device_info
    }
}

fn build_playback<T>(
    device: &Device,
    config: &StreamConfig,
    reader: CaptureReader,
) -> Result<Stream, AudioError>
where
    T: SizedSample + FromSample<i16>,
{
    let channels = usize::from(config.channels.max(1));

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let sample = T::from_sample(reader.playback_next());
                    frame.fill(sample);
                }
            },
            move |err| {
                log::error!("Audio output error: {}", err);
            },
            None,
        )
        .map_err(|e| AudioError::BuildStream(e.to_string()))
}
