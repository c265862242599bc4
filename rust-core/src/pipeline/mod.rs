//! Background pipelines fed by the capture buffer
//!
//! The coordinator runs two independent repeating tasks against one capture
//! buffer: a VU sampler and a spectrogram producer.

pub mod coordinator;
pub mod sink;
pub mod spectrogram;
pub mod vu;

pub use coordinator::{BackgroundCoordinator, CoordinatorState, StopReport};
pub use sink::{ChannelSink, MeterEvent, MeterSink, WaterfallUpdate};

use crate::audio::CaptureReader;
use crate::config::Config;
use crate::report::{ErrorReporter, Severity};
use crate::spectrum::WindowType;
use crate::waterfall::HistoryError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Capture stream is not open")]
    StreamClosed,

    #[error("Failed to start pipeline runtime: {0}")]
    Runtime(#[from] std::io::Error),

    #[error("The {0} stage ended without producing a result")]
    StageDropped(&'static str),

    #[error("The {stage} stage failed: {message}")]
    StageFailed {
        stage: &'static str,
        message: String,
    },

    #[error(transparent)]
    History(#[from] HistoryError),
}

/// Settings consumed by the background pipelines
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub window_size: usize,
    pub hop_size: usize,
    pub window_type: WindowType,
    pub vu_interval: Duration,
    pub spectrogram_interval: Duration,
    pub stop_timeout: Duration,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for PipelineSettings {
    fn from(config: &Config) -> Self {
        Self {
            window_size: config.analysis.window_size,
            hop_size: config.analysis.hop_size,
            window_type: config.analysis.window,
            vu_interval: config.timing.vu_interval(),
            spectrogram_interval: config.timing.spectrogram_interval(),
            stop_timeout: config.timing.stop_timeout(),
        }
    }
}

/// State every pipeline loop checks at its tick boundary
#[derive(Clone)]
pub(crate) struct LoopControl {
    pub reader: CaptureReader,
    pub running: Arc<AtomicBool>,
    pub stream_lost: Arc<AtomicBool>,
    pub reporter: Arc<dyn ErrorReporter>,
}

impl LoopControl {
    /// Whether the loop should run another iteration
    ///
    /// Reports a lost stream once, however many loops notice it.
    pub fn should_continue(&self) -> bool {
        if !self.running.load(Ordering::SeqCst) {
            return false;
        }
        if !self.reader.is_open() {
            if !self.stream_lost.swap(true, Ordering::SeqCst) {
                self.reporter.report(
                    "Audio capture",
                    "The audio input stream closed unexpectedly. Recording has stopped.",
                    Severity::Critical,
                );
            }
            return false;
        }
        true
    }

    /// Report a failed iteration; the loop carries on
    pub fn report_transient(&self, title: &str, err: &PipelineError) {
        log::warn!("{} iteration skipped: {}", title, err);
        self.reporter.report(title, &err.to_string(), Severity::Warning);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::sink::{MeterSink, WaterfallUpdate};
    use crate::report::{ErrorReporter, Severity};
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingSink {
        volumes: Mutex<Vec<f64>>,
        waterfall: Mutex<Vec<WaterfallUpdate>>,
    }

    impl RecordingSink {
        pub fn volumes(&self) -> Vec<f64> {
            self.volumes.lock().unwrap().clone()
        }

        pub fn waterfall_updates(&self) -> Vec<WaterfallUpdate> {
            self.waterfall.lock().unwrap().clone()
        }
    }

    impl MeterSink for RecordingSink {
        fn update_volume(&self, percentage: f64) {
            self.volumes.lock().unwrap().push(percentage);
        }

        fn update_waterfall(&self, update: WaterfallUpdate) {
            self.waterfall.lock().unwrap().push(update);
        }
    }

    #[derive(Default)]
    pub struct RecordingReporter {
        reports: Mutex<Vec<(String, String, Severity)>>,
    }

    impl RecordingReporter {
        pub fn reports(&self) -> Vec<(String, String, Severity)> {
            self.reports.lock().unwrap().clone()
        }
    }

    impl ErrorReporter for RecordingReporter {
        fn report(&self, title: &str, message: &str, severity: Severity) {
            self.reports
                .lock()
                .unwrap()
                .push((title.to_string(), message.to_string(), severity));
        }
    }
}
