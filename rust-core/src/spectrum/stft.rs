//! Short-Time Fourier Transform engine
//!
//! Slides a tapered window across a signal snapshot and runs a forward
//! complex FFT per chunk. Holds no mutable state between calls, so one engine
//! can be cloned into every analysis stage.

use super::windowing::{generate_window, WindowType};
use num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use std::sync::Arc;

/// One windowed FFT chunk
#[derive(Debug, Clone)]
pub struct RawFftRow {
    /// Offset of the chunk's first sample within the analysed signal
    pub offset: usize,

    /// Whether the window ran past the end of the signal and was zero-padded
    pub padded: bool,

    /// First `window_size / 2 + 1` complex bins
    pub bins: Vec<Complex<f64>>,
}

/// Windowed STFT engine
#[derive(Clone)]
pub struct StftEngine {
    window_size: usize,
    hop_size: usize,
    window: Arc<[f64]>,
    fft: Arc<dyn Fft<f64>>,
}

impl StftEngine {
    /// Create new STFT engine
    ///
    /// # Arguments
    /// * `window_size` - Chunk length in samples (ideally a power of 2)
    /// * `hop_size` - Stride between chunk starts
    /// * `window_type` - Taper applied to every chunk
    ///
    /// # Panics
    /// If `window_size` or `hop_size` is zero
    pub fn new(window_size: usize, hop_size: usize, window_type: WindowType) -> Self {
        assert!(window_size > 0, "STFT window size must be positive");
        assert!(hop_size >= 1, "STFT hop size must be at least 1");

        let mut planner = FftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(window_size);

        Self {
            window_size,
            hop_size,
            window: generate_window(window_type, window_size).into(),
            fft,
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of complex bins kept per chunk
    pub fn num_bins(&self) -> usize {
        self.window_size / 2 + 1
    }

    /// Centre frequency of `bin` in Hz
    pub fn bin_to_hz(&self, bin: usize, sample_rate: f64) -> f64 {
        bin as f64 * sample_rate / self.window_size as f64
    }

    /// Transform a signal into overlapping windowed spectra
    ///
    /// Chunks start every `hop_size` samples. The first chunk that needs
    /// zero padding is emitted and ends the sequence, so an empty signal
    /// still yields one (all-zero) row.
    pub fn transform(&self, signal: &[f64]) -> Vec<RawFftRow> {
        let n = self.window_size;
        let keep = self.num_bins();

        // Workspace lives for this call only
        let mut buffer = vec![Complex::new(0.0, 0.0); n];
        let mut scratch = vec![Complex::new(0.0, 0.0); self.fft.get_inplace_scratch_len()];

        let mut rows = Vec::with_capacity(signal.len() / self.hop_size + 1);
        let mut offset = 0;

        loop {
            let available = signal.len().saturating_sub(offset).min(n);

            for (i, (slot, &w)) in buffer.iter_mut().zip(self.window.iter()).enumerate() {
                let sample = if i < available { signal[offset + i] } else { 0.0 };
                *slot = Complex::new(sample * w, 0.0);
            }

            self.fft.process_with_scratch(&mut buffer, &mut scratch);

            let padded = available < n;
            rows.push(RawFftRow {
                offset,
                padded,
                bins: buffer[..keep].to_vec(),
            });

            if padded {
                break;
            }
            offset += self.hop_size;
        }

        rows
    }
}

impl std::fmt::Debug for StftEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StftEngine")
            .field("window_size", &self.window_size)
            .field("hop_size", &self.hop_size)
            .finish()
    }
}
