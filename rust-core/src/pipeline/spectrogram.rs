//! Spectrogram producer
//!
//! Each tick analyses the samples captured since the last committed row:
//! snapshot → STFT stage → power stage → history commit and emission. The
//! stages run on the blocking pool and hand results over one-shot channels.

use super::sink::{MeterSink, WaterfallUpdate};
use super::{LoopControl, PipelineError};
use crate::audio::CaptureReader;
use crate::spectrum::{power_rows, PowerRow, RawFftRow, StftEngine};
use crate::waterfall::{SharedHistory, TimedRow};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;

/// Absolute index of the first sample not yet covered by a committed row
///
/// Shared across restarts. Only the commit stage advances it, under the
/// lock, so a batch analysed from a stale position is discarded.
pub(crate) type AnalysisCursor = Arc<Mutex<usize>>;

fn lock_cursor(cursor: &Mutex<usize>) -> MutexGuard<'_, usize> {
    cursor.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Commit rows analysed from `base`, whose first sample is `start`
///
/// Returns `None` without touching the history when the cursor moved away
/// from `base` since the analysis began.
fn commit_batch(
    cursor: &Mutex<usize>,
    base: usize,
    start: usize,
    hop_size: usize,
    history: &SharedHistory,
    rows: &[TimedRow],
) -> Result<Option<usize>, PipelineError> {
    let mut position = lock_cursor(cursor);
    if *position != base {
        return Ok(None);
    }
    let count = history.add_rows(rows)?;
    *position = start + count * hop_size;
    Ok(Some(count))
}

pub(crate) struct SpectrogramProducer {
    engine: StftEngine,
    history: SharedHistory,
    sink: Arc<dyn MeterSink>,
    cursor: AnalysisCursor,
}

impl SpectrogramProducer {
    pub fn new(
        engine: StftEngine,
        history: SharedHistory,
        sink: Arc<dyn MeterSink>,
        cursor: AnalysisCursor,
    ) -> Self {
        Self {
            engine,
            history,
            sink,
            cursor,
        }
    }

    /// Run one analysis cycle
    ///
    /// # Returns
    /// Number of rows committed to the history
    pub async fn tick(&self, reader: &CaptureReader) -> Result<usize, PipelineError> {
        let window_size = self.engine.window_size();
        let hop_size = self.engine.hop_size();

        let base = *lock_cursor(&self.cursor);
        let buffer_size = reader.len();

        // Rows further back than the history holds would be evicted on commit
        let backlog = self.history.with_history(|h| h.history_extent()) * hop_size + window_size;
        let snapshot = reader.snapshot_from(base.max(buffer_size.saturating_sub(backlog)));
        let start = snapshot.start;
        if start > base {
            log::debug!("Spectrogram skipped {} samples of backlog", start - base);
        }
        let samples: Arc<[f64]> = snapshot.samples.into();

        let (raw_tx, raw_rx) = oneshot::channel::<Vec<RawFftRow>>();
        let (power_tx, power_rx) = oneshot::channel::<Vec<PowerRow>>();

        let engine = self.engine.clone();
        let signal = Arc::clone(&samples);
        tokio::task::spawn_blocking(move || {
            let _ = raw_tx.send(engine.transform(&signal));
        });

        tokio::task::spawn_blocking(move || {
            if let Ok(raw) = raw_rx.blocking_recv() {
                let _ = power_tx.send(power_rows(&raw, window_size));
            }
        });

        let rows = power_rx
            .await
            .map_err(|_| PipelineError::StageDropped("spectrum analysis"))?;

        let sample_rate = f64::from(reader.sample_rate());
        let started_at = reader.started_at();
        let committed: Vec<TimedRow> = rows
            .into_iter()
            .filter(|row| !row.padded)
            .map(|row| TimedRow {
                timestamp: started_at + (start + row.offset) as f64 / sample_rate,
                power: row.power,
            })
            .collect();

        let history = self.history.clone();
        let sink = Arc::clone(&self.sink);
        let cursor = Arc::clone(&self.cursor);
        tokio::task::spawn_blocking(move || -> Result<usize, PipelineError> {
            let Some(count) = commit_batch(&cursor, base, start, hop_size, &history, &committed)?
            else {
                log::debug!("Discarding spectrogram batch analysed from a stale position");
                return Ok(0);
            };

            let (timestamps, rows) = committed
                .into_iter()
                .map(|row| (row.timestamp, row.power))
                .unzip();

            sink.update_waterfall(WaterfallUpdate {
                rows,
                timestamps,
                raw_samples: samples,
                window_size,
                buffer_size,
            });
            Ok(count)
        })
        .await
        .map_err(|e| PipelineError::StageFailed {
            stage: "waterfall commit",
            message: e.to_string(),
        })?
    }
}

pub(crate) async fn run_spectrogram(
    control: LoopControl,
    producer: SpectrogramProducer,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::debug!("Spectrogram producer started ({:?} interval)", interval);

    loop {
        ticker.tick().await;
        if !control.should_continue() {
            break;
        }
        match producer.tick(&control.reader).await {
            Ok(count) => log::trace!("Spectrogram tick committed {} rows", count),
            Err(err) => control.report_transient("Spectrogram", &err),
        }
    }

    log::debug!("Spectrogram producer stopped");
}
