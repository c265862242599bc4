//! Thread-safe handle on the waterfall history
//!
//! The spectrogram pipeline writes through it; the renderer reads through it.
//! One long-lived `RwLock` guards the ring.

use super::history::{HistoryError, Marker, WaterfallHistory};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A row ready to be committed to the history
#[derive(Debug, Clone)]
pub struct TimedRow {
    pub timestamp: f64,
    pub power: Vec<f64>,
}

/// Shared waterfall history
#[derive(Debug, Clone, Default)]
pub struct SharedHistory {
    inner: Arc<RwLock<WaterfallHistory>>,
}

impl SharedHistory {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, WaterfallHistory> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, WaterfallHistory> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn configure(
        &self,
        x_min: f64,
        x_max: f64,
        history_extent: usize,
        layer_points: usize,
    ) -> Result<(), HistoryError> {
        self.write().configure(x_min, x_max, history_extent, layer_points)
    }

    pub fn add_data(&self, row: &[f64], timestamp: f64) -> Result<(), HistoryError> {
        self.write().add_data(row, timestamp)
    }

    /// Commit a batch under a single write lock
    ///
    /// All or nothing: if any row is rejected, none are stored.
    pub fn add_rows(&self, rows: &[TimedRow]) -> Result<usize, HistoryError> {
        let mut history = self.write();
        if !history.is_configured() {
            return Err(HistoryError::NotConfigured);
        }
        let expected = history.layer_points();
        if let Some(bad) = rows.iter().find(|row| row.power.len() != expected) {
            return Err(HistoryError::RowLength {
                expected,
                actual: bad.power.len(),
            });
        }

        for row in rows {
            history.add_data(&row.power, row.timestamp)?;
        }
        Ok(rows.len())
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    /// Value at frequency `x`; see [`WaterfallHistory::value`]
    pub fn value(&self, x: f64, history_index: usize) -> Option<f64> {
        self.read().value(x, history_index)
    }

    pub fn get_layer_date(&self, history_index: usize) -> f64 {
        self.read().get_layer_date(history_index)
    }

    pub fn get_range(&self) -> (f64, f64) {
        self.read().get_range()
    }

    pub fn set_range(&self, lower: f64, upper: f64) {
        self.write().set_range(lower, upper);
    }

    pub fn get_data_range(&self) -> Option<(f64, f64)> {
        self.read().get_data_range()
    }

    pub fn marker(&self) -> Marker {
        self.read().marker()
    }

    pub fn set_marker(&self, marker: Marker) {
        self.write().set_marker(marker);
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Run `f` with read access to the whole history
    ///
    /// Used by renderers that walk many rows per frame.
    pub fn with_history<R>(&self, f: impl FnOnce(&WaterfallHistory) -> R) -> R {
        f(&self.read())
    }
}
