//! Window functions for spectral analysis
//!
//! Applied to each STFT chunk before the FFT to reduce spectral leakage

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Window function types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WindowType {
    /// w[n] = 0.54 - 0.46*cos(2πn/(M-1))
    ///
    /// The waterfall's historical taper (labelled "Hanning" in radio UIs).
    #[default]
    Hamming,

    /// w[n] = 0.5 - 0.5*cos(2πn/(M-1))
    Hann,

    /// w[n] = 0.42 - 0.5*cos(2πn/(M-1)) + 0.08*cos(4πn/(M-1))
    Blackman,

    /// No tapering
    Rectangular,
}

/// Generate window coefficients
///
/// # Arguments
/// * `window_type` - Type of window function
/// * `length` - Number of samples (M)
///
/// # Returns
/// Vector of window coefficients w[n] for n = 0..M-1
pub fn generate_window(window_type: WindowType, length: usize) -> Vec<f64> {
    // A single-point window would divide by M-1 = 0
    if length == 1 {
        return vec![1.0];
    }

    let denom = length as f64 - 1.0;
    let angle = |n: usize| 2.0 * PI * n as f64 / denom;

    match window_type {
        WindowType::Hamming => (0..length).map(|n| 0.54 - 0.46 * angle(n).cos()).collect(),
        WindowType::Hann => (0..length).map(|n| 0.5 - 0.5 * angle(n).cos()).collect(),
        WindowType::Blackman => (0..length)
            .map(|n| 0.42 - 0.5 * angle(n).cos() + 0.08 * (2.0 * angle(n)).cos())
            .collect(),
        WindowType::Rectangular => vec![1.0; length],
    }
}
