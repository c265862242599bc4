//! Windowed spectral analysis for the waterfall

pub mod windowing;
pub mod stft;
pub mod power;

pub use windowing::{WindowType, generate_window};
pub use stft::{StftEngine, RawFftRow};
pub use power::{PowerRow, power_density, power_rows};
