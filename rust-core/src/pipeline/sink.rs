//! Emissions from the pipelines to the host application

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use std::sync::Arc;

/// One spectrogram tick's output
#[derive(Debug, Clone)]
pub struct WaterfallUpdate {
    /// Power-density rows committed this tick, oldest first
    pub rows: Vec<Vec<f64>>,

    /// Capture timestamp of each row
    pub timestamps: Vec<f64>,

    /// Samples analysed this tick
    pub raw_samples: Arc<[f64]>,

    pub window_size: usize,

    /// Total samples captured at snapshot time
    pub buffer_size: usize,
}

/// Receiver of VU and waterfall updates
///
/// Called from pipeline threads; implementations must not assume the UI
/// thread.
pub trait MeterSink: Send + Sync {
    /// Instantaneous level, 0-100
    fn update_volume(&self, percentage: f64);

    fn update_waterfall(&self, update: WaterfallUpdate);
}

#[derive(Debug, Clone)]
pub enum MeterEvent {
    Volume(f64),
    Waterfall(WaterfallUpdate),
}

/// Forwards updates over a bounded channel
///
/// Events are dropped while the channel is full so a slow consumer never
/// stalls the pipelines.
#[derive(Clone)]
pub struct ChannelSink {
    sender: Sender<MeterEvent>,
}

impl ChannelSink {
    /// Create sink and the receiving end for the consumer
    pub fn new(capacity: usize) -> (Self, Receiver<MeterEvent>) {
        let (sender, receiver) = bounded(capacity);
        (Self { sender }, receiver)
    }

    fn send(&self, event: MeterEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => log::debug!("Meter consumer lagging, event dropped"),
            Err(TrySendError::Disconnected(_)) => log::trace!("Meter consumer gone"),
        }
    }
}

impl MeterSink for ChannelSink {
    fn update_volume(&self, percentage: f64) {
        self.send(MeterEvent::Volume(percentage));
    }

    fn update_waterfall(&self, update: WaterfallUpdate) {
        self.send(MeterEvent::Waterfall(update));
    }
}
