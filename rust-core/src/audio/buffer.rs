//! Circular capture buffer for 16-bit audio
//!
//! Filled by the hardware capture callback, read by the playback cursor and
//! by the analysis pipelines. Samples are addressed by absolute index (the
//! number of samples captured before them); only the most recent `capacity`
//! are retained. The capture path never locks or allocates.

use std::sync::atomic::{fence, AtomicBool, AtomicI16, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// State shared between the writer and every reader
struct Shared {
    /// Ring cells; absolute index `i` lives in cell `i % capacity`
    samples: Box<[AtomicI16]>,

    /// Absolute index one past the newest published sample
    written: AtomicUsize,

    /// Absolute index one past the newest sample whose store has begun;
    /// runs ahead of `written` while the writer is overwriting cells
    claimed: AtomicUsize,

    /// Absolute index of the next sample to play
    playback: AtomicUsize,

    /// Cleared when the capture stream closes
    open: AtomicBool,

    sample_rate: u32,

    /// Wall-clock seconds at buffer creation
    started_at: f64,
}

/// Capture buffer with a fixed retained capacity
pub struct AudioCaptureBuffer {
    shared: Arc<Shared>,
}

impl AudioCaptureBuffer {
    /// Create new capture buffer
    ///
    /// # Arguments
    /// * `size_hint` - Number of most recent samples retained
    /// * `sample_rate` - Capture sample rate in Hz
    pub fn new(size_hint: usize, sample_rate: u32) -> Self {
        let samples: Box<[AtomicI16]> = (0..size_hint).map(|_| AtomicI16::new(0)).collect();
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);

        Self {
            shared: Arc::new(Shared {
                samples,
                written: AtomicUsize::new(0),
                claimed: AtomicUsize::new(0),
                playback: AtomicUsize::new(0),
                open: AtomicBool::new(true),
                sample_rate,
                started_at,
            }),
        }
    }

    /// Split into the writer (for the capture callback) and a reader handle
    pub fn split(self) -> (CaptureWriter, CaptureReader) {
        (
            CaptureWriter {
                shared: Arc::clone(&self.shared),
            },
            CaptureReader {
                shared: self.shared,
            },
        )
    }

    /// Get retained capacity in samples
    pub fn capacity(&self) -> usize {
        self.shared.samples.len()
    }
}

/// Writing end of the capture buffer
///
/// There is exactly one writer per buffer; it is moved into the capture
/// callback. Dropping it marks the stream closed.
pub struct CaptureWriter {
    shared: Arc<Shared>,
}

impl CaptureWriter {
    /// Append one sample, overwriting the oldest once the ring is full
    #[inline]
    pub fn append(&mut self, sample: i16) {
        let shared = &*self.shared;
        let capacity = shared.samples.len();
        // Only this writer stores to `written`
        let index = shared.written.load(Ordering::Relaxed);

        shared.claimed.store(index + 1, Ordering::Relaxed);
        if capacity > 0 {
            fence(Ordering::Release);
            shared.samples[index % capacity].store(sample, Ordering::Relaxed);
        }
        shared.written.store(index + 1, Ordering::Release);
    }

    /// Append a block of samples
    ///
    /// Only the last `capacity` samples of an oversized block are stored.
    pub fn append_slice(&mut self, samples: &[i16]) {
        let shared = &*self.shared;
        let capacity = shared.samples.len();
        let first = shared.written.load(Ordering::Relaxed);
        let end = first + samples.len();

        shared.claimed.store(end, Ordering::Relaxed);
        if capacity > 0 {
            fence(Ordering::Release);
            let skip = samples.len().saturating_sub(capacity);
            for (offset, &sample) in samples.iter().enumerate().skip(skip) {
                shared.samples[(first + offset) % capacity].store(sample, Ordering::Relaxed);
            }
        }
        shared.written.store(end, Ordering::Release);
    }

    /// Handle that lets the stream's error callback close the buffer
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of samples captured so far
    pub fn len(&self) -> usize {
        self.shared.written.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for CaptureWriter {
    fn drop(&mut self) {
        self.shared.open.store(false, Ordering::Release);
    }
}

/// Marks the capture stream as closed
#[derive(Clone)]
pub struct CloseHandle {
    shared: Arc<Shared>,
}

impl CloseHandle {
    pub fn close(&self) {
        self.shared.open.store(false, Ordering::Release);
    }
}

/// Reading end of the capture buffer
///
/// Cheap to clone. Snapshots are stateless; the playback cursor is shared
/// by all clones and is meant for a single playback consumer.
#[derive(Clone)]
pub struct CaptureReader {
    shared: Arc<Shared>,
}

impl CaptureReader {
    /// Number of samples captured so far (absolute write position)
    pub fn len(&self) -> usize {
        self.shared.written.load(Ordering::Acquire)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained capacity in samples
    pub fn capacity(&self) -> usize {
        self.shared.samples.len()
    }

    /// Absolute index of the oldest retained sample
    pub fn oldest_index(&self) -> usize {
        self.len().saturating_sub(self.capacity())
    }

    pub fn sample_rate(&self) -> u32 {
        self.shared.sample_rate
    }

    /// Wall-clock time (seconds since the Unix epoch) of sample 0
    pub fn started_at(&self) -> f64 {
        self.shared.started_at
    }

    /// Whether the capture stream is still delivering samples
    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::Acquire)
    }

    /// Copy the retained part of `[start, end)`
    ///
    /// Returns the absolute index of the first copied sample. Cells the
    /// writer overwrote during the copy are dropped from the front.
    fn read_range(&self, start: usize, end: usize) -> (usize, Vec<i16>) {
        let capacity = self.capacity();
        let start = start.max(end.saturating_sub(capacity)).min(end);

        let mut samples: Vec<i16> = (start..end)
            .map(|i| self.shared.samples[i % capacity].load(Ordering::Relaxed))
            .collect();

        fence(Ordering::Acquire);
        let valid_from = self
            .shared
            .claimed
            .load(Ordering::Relaxed)
            .saturating_sub(capacity);

        if valid_from > start {
            let lost = (valid_from - start).min(samples.len());
            samples.drain(..lost);
            return (start + lost, samples);
        }
        (start, samples)
    }

    /// Read one retained sample by absolute index
    pub fn sample_at(&self, index: usize) -> Option<i16> {
        if index >= self.len() {
            return None;
        }
        match self.read_range(index, index + 1) {
            (first, samples) if first == index => samples.first().copied(),
            _ => None,
        }
    }

    /// Copy every retained sample
    pub fn snapshot(&self) -> Vec<i16> {
        self.read_range(0, self.len()).1
    }

    /// Copy the retained samples from `start` to the current write end as `f64`
    ///
    /// `start` is clamped forward to the oldest retained sample.
    pub fn snapshot_from(&self, start: usize) -> SignalSnapshot {
        let (start, samples) = self.read_range(start, self.len());
        SignalSnapshot {
            start,
            samples: samples.into_iter().map(f64::from).collect(),
        }
    }

    /// Next sample for playback, or 0 once the cursor reaches the write end
    ///
    /// A cursor that fell behind the retained window skips to its start.
    pub fn playback_next(&self) -> i16 {
        let playback = &self.shared.playback;
        loop {
            let cursor = playback.load(Ordering::Acquire);
            let len = self.len();
            let index = cursor.max(len.saturating_sub(self.capacity()));
            if index >= len {
                return 0;
            }
            if playback
                .compare_exchange_weak(cursor, index + 1, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return self.sample_at(index).unwrap_or(0);
            }
        }
    }

    /// Rewind the playback cursor to the oldest retained sample
    pub fn reset_playback(&self) {
        self.shared.playback.store(0, Ordering::Release);
    }

    /// Current playback cursor position (absolute index)
    pub fn playback_position(&self) -> usize {
        self.shared.playback.load(Ordering::Acquire)
    }
}

/// Immutable floating-point copy of buffered samples
#[derive(Debug, Clone, Default)]
pub struct SignalSnapshot {
    /// Absolute index of `samples[0]` in the capture stream
    pub start: usize,
    pub samples: Vec<f64>,
}

impl SignalSnapshot {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
