//! Bounded spectrogram history backing the waterfall display
//!
//! Rows are stored in a pre-allocated `history_extent × layer_points` ring.
//! History index 0 is always the oldest stored row; indices shift as the
//! ring evicts, so callers must not hold on to them across `add_data`.

use ndarray::{aview1, Array2, ArrayView1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HistoryError {
    #[error("Waterfall history is not configured")]
    NotConfigured,

    #[error("Invalid waterfall dimensions: {history_extent} rows x {layer_points} points")]
    InvalidDimensions {
        history_extent: usize,
        layer_points: usize,
    },

    #[error("Spectrogram row has {actual} points, waterfall expects {expected}")]
    RowLength { expected: usize, actual: usize },
}

/// Probe position used by the renderer for point read-outs
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// Frequency coordinate in `[x_min, x_max]`
    pub x: f64,

    /// History index (0 = oldest)
    pub history_index: usize,
}

/// Ring of timestamped power-density rows
#[derive(Debug, Clone)]
pub struct WaterfallHistory {
    x_min: f64,
    x_max: f64,
    history_extent: usize,
    layer_points: usize,

    /// Row storage, indexed by physical slot
    data: Array2<f64>,

    /// Capture timestamp per physical slot
    dates: Vec<f64>,

    /// Next physical slot to write
    head: usize,

    /// Number of stored rows
    len: usize,

    /// Display clamp window
    range: (f64, f64),

    marker: Marker,
    configured: bool,
}

impl Default for WaterfallHistory {
    fn default() -> Self {
        Self {
            x_min: 0.0,
            x_max: 0.0,
            history_extent: 0,
            layer_points: 0,
            data: Array2::zeros((0, 0)),
            dates: Vec::new(),
            head: 0,
            len: 0,
            range: (0.0, 0.0),
            marker: Marker {
                x: 0.0,
                history_index: 0,
            },
            configured: false,
        }
    }
}

impl WaterfallHistory {
    /// Create an unconfigured history
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)allocate storage and drop every stored row
    ///
    /// # Arguments
    /// * `x_min`, `x_max` - Frequency axis covered by a row
    /// * `history_extent` - Maximum number of rows kept
    /// * `layer_points` - Values per row
    pub fn configure(
        &mut self,
        x_min: f64,
        x_max: f64,
        history_extent: usize,
        layer_points: usize,
    ) -> Result<(), HistoryError> {
        if history_extent == 0 || layer_points == 0 {
            return Err(HistoryError::InvalidDimensions {
                history_extent,
                layer_points,
            });
        }

        self.x_min = x_min;
        self.x_max = x_max;
        self.history_extent = history_extent;
        self.layer_points = layer_points;
        self.data = Array2::zeros((history_extent, layer_points));
        self.dates = vec![0.0; history_extent];
        self.head = 0;
        self.len = 0;
        self.configured = true;
        self.reset_marker();

        log::debug!(
            "Waterfall history configured: {} rows x {} points over [{}, {}]",
            history_extent,
            layer_points,
            x_min,
            x_max
        );
        Ok(())
    }

    /// Append one row, evicting the oldest when full
    pub fn add_data(&mut self, row: &[f64], timestamp: f64) -> Result<(), HistoryError> {
        if !self.configured {
            return Err(HistoryError::NotConfigured);
        }
        if row.len() != self.layer_points {
            return Err(HistoryError::RowLength {
                expected: self.layer_points,
                actual: row.len(),
            });
        }

        self.data.row_mut(self.head).assign(&aview1(row));
        self.dates[self.head] = timestamp;
        self.head = (self.head + 1) % self.history_extent;
        self.len = (self.len + 1).min(self.history_extent);
        Ok(())
    }

    /// Drop every stored row, keeping the configured dimensions
    pub fn clear(&mut self) {
        self.data.fill(0.0);
        self.dates.fill(0.0);
        self.head = 0;
        self.len = 0;
        self.reset_marker();
    }

    fn reset_marker(&mut self) {
        self.marker = Marker {
            x: (self.x_min + self.x_max) / 2.0,
            history_index: self.len.saturating_sub(1),
        };
    }

    /// Physical slot of a history index
    fn slot(&self, history_index: usize) -> Option<usize> {
        if history_index >= self.len {
            return None;
        }
        let oldest = (self.head + self.history_extent - self.len) % self.history_extent;
        Some((oldest + history_index) % self.history_extent)
    }

    /// Map a frequency coordinate onto a bin index
    fn x_to_bin(&self, x: f64) -> Option<usize> {
        if !(self.x_min..=self.x_max).contains(&x) {
            return None;
        }
        let span = self.x_max - self.x_min;
        if span <= 0.0 {
            return Some(0);
        }
        let bin = ((x - self.x_min) / span * self.layer_points as f64).floor() as usize;
        Some(bin.min(self.layer_points - 1))
    }

    /// Value at frequency `x` in the row at `history_index`
    ///
    /// `x` is a coordinate on the configured frequency axis, not a bin
    /// index: `[x_min, x_max]` maps linearly onto the `layer_points` bins and
    /// `x_max` lands in the last bin. `None` if `x` is off the axis or the
    /// row does not exist. Use [`bin_value`](Self::bin_value) to address a
    /// bin directly.
    pub fn value(&self, x: f64, history_index: usize) -> Option<f64> {
        let bin = self.x_to_bin(x)?;
        self.bin_value(bin, history_index)
    }

    /// Value of `bin` in the row at `history_index`
    pub fn bin_value(&self, bin: usize, history_index: usize) -> Option<f64> {
        let slot = self.slot(history_index)?;
        self.data.get((slot, bin)).copied()
    }

    /// Row at `history_index`
    pub fn row(&self, history_index: usize) -> Option<ArrayView1<'_, f64>> {
        self.slot(history_index).map(|slot| self.data.row(slot))
    }

    /// Timestamp of the row at `history_index`, or 0.0 if there is none
    pub fn get_layer_date(&self, history_index: usize) -> f64 {
        self.slot(history_index).map_or(0.0, |slot| self.dates[slot])
    }

    /// History index of the stored row closest in time to `timestamp`
    pub fn layer_index_for_date(&self, timestamp: f64) -> Option<usize> {
        (0..self.len).min_by(|&a, &b| {
            let da = (self.get_layer_date(a) - timestamp).abs();
            let db = (self.get_layer_date(b) - timestamp).abs();
            da.total_cmp(&db)
        })
    }

    /// Minimum and maximum over every stored value
    pub fn get_data_range(&self) -> Option<(f64, f64)> {
        (0..self.len)
            .filter_map(|i| self.row(i))
            .flat_map(|row| row.into_iter().copied())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }

    /// Set the display clamp window
    pub fn set_range(&mut self, lower: f64, upper: f64) {
        self.range = (lower, upper);
    }

    pub fn get_range(&self) -> (f64, f64) {
        self.range
    }

    pub fn marker(&self) -> Marker {
        self.marker
    }

    pub fn set_marker(&mut self, marker: Marker) {
        self.marker = marker;
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.x_min, self.x_max)
    }

    pub fn history_extent(&self) -> usize {
        self.history_extent
    }

    pub fn layer_points(&self) -> usize {
        self.layer_points
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp_row(points: usize, base: f64) -> Vec<f64> {
        (0..points).map(|i| base * 1000.0 + i as f64).collect()
    }

    #[test]
    fn test_fifo_eviction() {
        let (extent, points) = (5, 8);
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 1.0, extent, points).unwrap();

        for t in 0..=extent {
            history.add_data(&ramp_row(points, t as f64), t as f64).unwrap();
        }

        assert_eq!(history.len(), extent);
        // Row 0 was evicted, row 1 is now the oldest
        assert_eq!(history.get_layer_date(0), 1.0);
        assert_eq!(history.get_layer_date(extent - 1), extent as f64);
        assert_eq!(history.bin_value(0, 0), Some(1000.0));
    }

    #[test]
    fn test_fifteen_rows_into_ten() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 64.0, 10, 64).unwrap();

        for t in 1..=15 {
            history.add_data(&ramp_row(64, t as f64), t as f64).unwrap();
        }

        let dates: Vec<f64> = (0..history.len()).map(|i| history.get_layer_date(i)).collect();
        assert_eq!(dates, (6..=15).map(f64::from).collect::<Vec<_>>());

        for bin in [0usize, 5, 63] {
            assert_eq!(history.value(bin as f64, 0), Some(6000.0 + bin as f64));
        }
        let row: Vec<f64> = history.row(0).unwrap().to_vec();
        assert_eq!(row, ramp_row(64, 6.0));
    }

    #[test]
    fn test_layer_date_out_of_range() {
        let mut history = WaterfallHistory::new();
        assert_eq!(history.get_layer_date(0), 0.0);

        history.configure(0.0, 1.0, 4, 2).unwrap();
        history.add_data(&[1.0, 2.0], 42.0).unwrap();

        assert_eq!(history.get_layer_date(0), 42.0);
        for idx in [1, 3, 4, 100, usize::MAX] {
            assert_eq!(history.get_layer_date(idx), 0.0);
        }
        assert_eq!(history.bin_value(0, usize::MAX), None);
    }

    #[test]
    fn test_rejects_bad_rows() {
        let mut history = WaterfallHistory::new();
        assert_eq!(history.add_data(&[1.0], 1.0), Err(HistoryError::NotConfigured));

        history.configure(0.0, 1.0, 4, 3).unwrap();
        assert_eq!(
            history.add_data(&[1.0, 2.0], 1.0),
            Err(HistoryError::RowLength { expected: 3, actual: 2 })
        );
        assert!(history.is_empty());
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let mut history = WaterfallHistory::new();
        assert!(history.configure(0.0, 1.0, 0, 4).is_err());
        assert!(history.configure(0.0, 1.0, 4, 0).is_err());
        assert!(!history.is_configured());
    }

    #[test]
    fn test_value_maps_frequency_axis() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 4000.0, 2, 4).unwrap();
        history.add_data(&[10.0, 20.0, 30.0, 40.0], 1.0).unwrap();

        assert_eq!(history.value(0.0, 0), Some(10.0));
        assert_eq!(history.value(1500.0, 0), Some(20.0));
        assert_eq!(history.value(4000.0, 0), Some(40.0));
        assert_eq!(history.value(-1.0, 0), None);
        assert_eq!(history.value(4001.0, 0), None);
    }

    #[test]
    fn test_value_on_unit_axis_versus_bin_index() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 1.0, 10, 64).unwrap();
        history.add_data(&ramp_row(64, 1.0), 1.0).unwrap();

        // On a [0, 1] axis bin 5 sits at x = 5/64; x = 5.0 is off the axis
        assert_eq!(history.value(5.0 / 64.0, 0), Some(1005.0));
        assert_eq!(history.value(5.0, 0), None);
        assert_eq!(history.bin_value(5, 0), Some(1005.0));
        assert_eq!(history.value(1.0, 0), Some(1063.0));
    }

    #[test]
    fn test_marker_reset_on_configure() {
        let mut history = WaterfallHistory::new();
        history.configure(100.0, 300.0, 8, 4).unwrap();

        let marker = history.marker();
        assert_eq!(marker.x, 200.0);
        assert_eq!(marker.history_index, 0);
    }

    #[test]
    fn test_nearest_date_lookup() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 1.0, 3, 1).unwrap();
        assert_eq!(history.layer_index_for_date(5.0), None);

        for t in [10.0, 20.0, 30.0, 40.0] {
            history.add_data(&[t], t).unwrap();
        }

        assert_eq!(history.layer_index_for_date(0.0), Some(0));
        assert_eq!(history.layer_index_for_date(26.0), Some(1));
        assert_eq!(history.layer_index_for_date(99.0), Some(2));
    }

    #[test]
    fn test_data_range_and_display_range() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 1.0, 2, 2).unwrap();
        assert_eq!(history.get_data_range(), None);

        history.add_data(&[-5.0, 1.0], 1.0).unwrap();
        history.add_data(&[3.0, 9.0], 2.0).unwrap();
        assert_eq!(history.get_data_range(), Some((-5.0, 9.0)));

        // Evicting the row holding the minimum narrows the range
        history.add_data(&[2.0, 4.0], 3.0).unwrap();
        assert_eq!(history.get_data_range(), Some((2.0, 9.0)));

        history.set_range(0.0, 80.0);
        assert_eq!(history.get_range(), (0.0, 80.0));
    }

    #[test]
    fn test_clear_keeps_dimensions() {
        let mut history = WaterfallHistory::new();
        history.configure(0.0, 1.0, 3, 2).unwrap();
        history.add_data(&[1.0, 2.0], 1.0).unwrap();

        history.clear();
        assert!(history.is_empty());
        assert_eq!(history.get_layer_date(0), 0.0);
        assert!(history.add_data(&[3.0, 4.0], 2.0).is_ok());
        assert_eq!(history.bin_value(1, 0), Some(4.0));
    }
}
