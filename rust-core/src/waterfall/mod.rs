//! Spectrogram history consumed by the waterfall renderer

pub mod history;
pub mod shared;

pub use history::{HistoryError, Marker, WaterfallHistory};
pub use shared::{SharedHistory, TimedRow};
