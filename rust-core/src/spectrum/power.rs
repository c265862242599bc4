//! Power-density reduction for STFT rows
//!
//! Each bin is combined with its mirror bin `window_size - i`:
//!
//! `power[i] = re(X[i])² + re(X[N - i])²`
//!
//! Only the real parts take part, so this is not |X|². Renderers depend on
//! this exact scale.

use super::stft::RawFftRow;
use num_complex::Complex;

/// Power-density row derived from one FFT chunk
#[derive(Debug, Clone)]
pub struct PowerRow {
    /// Offset of the source chunk within the analysed signal
    pub offset: usize,

    /// Whether the source chunk was zero-padded
    pub padded: bool,

    /// `window_size / 2` power values
    pub power: Vec<f64>,
}

/// Real part of bin `k` of a real signal's full N-point spectrum
///
/// `bins` holds only the first `N / 2 + 1` entries; the rest follow from
/// conjugate symmetry (`X[N - k] = conj(X[k])`). `k` wraps modulo N.
fn mirrored_re(bins: &[Complex<f64>], window_size: usize, k: usize) -> f64 {
    let k = k % window_size;
    let k = if k < bins.len() { k } else { window_size - k };
    bins.get(k).map_or(0.0, |c| c.re)
}

/// Reduce the kept half-spectrum to `window_size / 2` power values
pub fn power_density(bins: &[Complex<f64>], window_size: usize) -> Vec<f64> {
    debug_assert_eq!(bins.len(), window_size / 2 + 1);

    (0..window_size / 2)
        .map(|i| {
            let near = mirrored_re(bins, window_size, i);
            let far = mirrored_re(bins, window_size, window_size - i);
            near * near + far * far
        })
        .collect()
}

/// Reduce a batch of raw rows
pub fn power_rows(rows: &[RawFftRow], window_size: usize) -> Vec<PowerRow> {
    rows.iter()
        .map(|row| PowerRow {
            offset: row.offset,
            padded: row.padded,
            power: power_density(&row.bins, window_size),
        })
        .collect()
}

/// Index of the strongest bin, if any
pub fn peak_bin(power: &[f64]) -> Option<usize> {
    power
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(i, _)| i)
}
