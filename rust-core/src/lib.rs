//! Rig Waterfall - real-time capture and spectrogram core
//!
//! Capture buffer fed by the sound card, background VU and spectrogram
//! pipelines, and the bounded history behind the waterfall display.

pub mod audio;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod spectrum;
pub mod waterfall;

pub use audio::{AudioCaptureBuffer, CaptureReader, CaptureStream};
pub use config::Config;
pub use pipeline::{BackgroundCoordinator, ChannelSink, MeterEvent, MeterSink};
pub use report::{ErrorReporter, LogReporter, Severity};
pub use spectrum::StftEngine;
pub use waterfall::{SharedHistory, WaterfallHistory};
