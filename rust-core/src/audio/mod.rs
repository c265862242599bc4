//! Audio capture and playback with cpal

pub mod buffer;
pub mod input;
pub mod output;

pub use buffer::{AudioCaptureBuffer, CaptureReader, CaptureWriter, CloseHandle, SignalSnapshot};
pub use input::{list_input_devices, AudioDeviceInfo, AudioError, CaptureStream};
pub use output::PlaybackStream;
