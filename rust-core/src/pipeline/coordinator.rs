//! Background coordinator
//!
//! Owns the capture handle and a small tokio runtime, and starts/stops the
//! VU sampler and the spectrogram producer together. `stop` is bounded: a
//! pipeline that does not wind down before the deadline is aborted.

use super::sink::MeterSink;
use super::spectrogram::{run_spectrogram, AnalysisCursor, SpectrogramProducer};
use super::vu::run_vu_sampler;
use super::{LoopControl, PipelineError, PipelineSettings};
use crate::audio::CaptureReader;
use crate::report::ErrorReporter;
use crate::spectrum::StftEngine;
use crate::waterfall::SharedHistory;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

/// Shortest tick the pipelines accept
const MIN_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Idle,
    Recording,
    StoppingWithTimeout,
}

/// Outcome of a `stop` call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Pipelines that finished before the deadline
    pub joined: usize,

    /// Pipelines aborted at the deadline
    pub cancelled: usize,

    /// Whether the capture stream closed while recording
    pub stream_lost: bool,
}

struct PipelineTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Runs the VU and spectrogram pipelines against one capture buffer
pub struct BackgroundCoordinator {
    settings: PipelineSettings,
    engine: StftEngine,
    reader: CaptureReader,
    history: SharedHistory,
    sink: Arc<dyn MeterSink>,
    reporter: Arc<dyn ErrorReporter>,

    /// Taken on drop
    runtime: Option<Runtime>,

    running: Arc<AtomicBool>,
    stream_lost: Arc<AtomicBool>,

    /// Spectrogram analysis position, kept across restarts
    cursor: AnalysisCursor,

    tasks: Vec<PipelineTask>,
    state: CoordinatorState,
}

impl BackgroundCoordinator {
    /// Create a coordinator for an open capture stream
    ///
    /// # Panics
    /// If the settings carry a zero window or hop size
    pub fn new(
        settings: PipelineSettings,
        reader: CaptureReader,
        history: SharedHistory,
        sink: Arc<dyn MeterSink>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Result<Self, PipelineError> {
        let engine = StftEngine::new(settings.window_size, settings.hop_size, settings.window_type);

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("waterfall-pipeline")
            .enable_all()
            .build()?;

        Ok(Self {
            settings,
            engine,
            reader,
            history,
            sink,
            reporter,
            runtime: Some(runtime),
            running: Arc::new(AtomicBool::new(false)),
            stream_lost: Arc::new(AtomicBool::new(false)),
            cursor: AnalysisCursor::default(),
            tasks: Vec::new(),
            state: CoordinatorState::Idle,
        })
    }

    /// Launch both pipelines
    ///
    /// Does nothing if they are already running.
    pub fn start(&mut self) -> Result<(), PipelineError> {
        if self.active_pipelines() > 0 {
            log::debug!("Pipelines already running, start ignored");
            return Ok(());
        }
        if !self.reader.is_open() {
            return Err(PipelineError::StreamClosed);
        }
        let runtime = self.runtime.as_ref().ok_or_else(|| {
            PipelineError::Runtime(std::io::Error::new(
                std::io::ErrorKind::Other,
                "pipeline runtime already shut down",
            ))
        })?;

        self.tasks.clear();
        self.running.store(true, Ordering::SeqCst);
        self.stream_lost.store(false, Ordering::SeqCst);

        let control = LoopControl {
            reader: self.reader.clone(),
            running: Arc::clone(&self.running),
            stream_lost: Arc::clone(&self.stream_lost),
            reporter: Arc::clone(&self.reporter),
        };

        let vu = runtime.spawn(run_vu_sampler(
            control.clone(),
            Arc::clone(&self.sink),
            self.settings.vu_interval.max(MIN_INTERVAL),
        ));

        let producer = SpectrogramProducer::new(
            self.engine.clone(),
            self.history.clone(),
            Arc::clone(&self.sink),
            Arc::clone(&self.cursor),
        );
        let spectrogram = runtime.spawn(run_spectrogram(
            control,
            producer,
            self.settings.spectrogram_interval.max(MIN_INTERVAL),
        ));

        self.tasks = vec![
            PipelineTask { name: "VU", handle: vu },
            PipelineTask { name: "spectrogram", handle: spectrogram },
        ];
        self.state = CoordinatorState::Recording;

        log::info!(
            "Recording pipelines started (window {}, hop {}, {} Hz)",
            self.settings.window_size,
            self.settings.hop_size,
            self.reader.sample_rate()
        );
        Ok(())
    }

    /// Stop both pipelines within `timeout`
    ///
    /// Blocks the calling thread for at most `timeout`. The join runs on a
    /// helper thread, so this is safe to call from async code.
    pub fn stop(&mut self, timeout: Duration) -> StopReport {
        let mut report = StopReport::default();

        if !self.tasks.is_empty() {
            self.state = CoordinatorState::StoppingWithTimeout;
            self.running.store(false, Ordering::SeqCst);

            let tasks: Vec<PipelineTask> = self.tasks.drain(..).collect();
            let deadline = Instant::now() + timeout;

            report = match self.runtime.as_ref().map(|rt| rt.handle().clone()) {
                Some(handle) => std::thread::scope(|scope| {
                    scope
                        .spawn(move || handle.block_on(join_before(tasks, deadline)))
                        .join()
                })
                .unwrap_or_else(|_| {
                    log::error!("Pipeline join thread panicked");
                    StopReport::default()
                }),
                None => {
                    let cancelled = tasks.len();
                    tasks.iter().for_each(|task| task.handle.abort());
                    StopReport {
                        cancelled,
                        ..StopReport::default()
                    }
                }
            };

            log::info!(
                "Recording pipelines stopped ({} joined, {} cancelled)",
                report.joined,
                report.cancelled
            );
        }

        report.stream_lost = self.stream_lost.load(Ordering::SeqCst);
        self.state = CoordinatorState::Idle;
        report
    }

    pub fn state(&self) -> CoordinatorState {
        self.state
    }

    /// Number of pipeline tasks still running
    pub fn active_pipelines(&self) -> usize {
        self.tasks
            .iter()
            .filter(|task| !task.handle.is_finished())
            .count()
    }

    pub fn history(&self) -> &SharedHistory {
        &self.history
    }

    pub fn reader(&self) -> &CaptureReader {
        &self.reader
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }
}

impl Drop for BackgroundCoordinator {
    fn drop(&mut self) {
        // Never blocks: the owner may be running inside an async context
        self.running.store(false, Ordering::SeqCst);
        for task in self.tasks.drain(..) {
            task.handle.abort();
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

/// Await each task until the shared deadline, aborting the stragglers
async fn join_before(tasks: Vec<PipelineTask>, deadline: Instant) -> StopReport {
    let deadline = tokio::time::Instant::from_std(deadline);
    let mut report = StopReport::default();

    for task in tasks {
        let mut handle = task.handle;
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(Ok(())) => report.joined += 1,
            Ok(Err(err)) => {
                log::error!("{} pipeline ended abnormally: {}", task.name, err);
                report.joined += 1;
            }
            Err(_) => {
                log::warn!("{} pipeline still busy at the stop deadline, cancelling", task.name);
                handle.abort();
                report.cancelled += 1;
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{AudioCaptureBuffer, CaptureWriter};
    use crate::pipeline::sink::WaterfallUpdate;
    use crate::pipeline::testing::{RecordingReporter, RecordingSink};
    use crate::report::Severity;
    use crate::spectrum::power::peak_bin;
    use crate::spectrum::WindowType;
    use std::f64::consts::PI;

    const SAMPLE_RATE: u32 = 8000;

    fn settings() -> PipelineSettings {
        PipelineSettings {
            window_size: 256,
            hop_size: 128,
            window_type: WindowType::Hamming,
            vu_interval: Duration::from_millis(10),
            spectrogram_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_millis(500),
        }
    }

    fn capture() -> (CaptureWriter, CaptureReader) {
        AudioCaptureBuffer::new(SAMPLE_RATE as usize * 10, SAMPLE_RATE).split()
    }

    fn history(layer_points: usize) -> SharedHistory {
        let history = SharedHistory::new();
        history
            .configure(0.0, f64::from(SAMPLE_RATE) / 2.0, 64, layer_points)
            .unwrap();
        history
    }

    fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        condition()
    }

    /// Blocks every waterfall emission for the given time
    struct StallingSink(Duration);

    impl MeterSink for StallingSink {
        fn update_volume(&self, _percentage: f64) {}

        fn update_waterfall(&self, _update: WaterfallUpdate) {
            std::thread::sleep(self.0);
        }
    }

    fn coordinator(
        reader: CaptureReader,
        history: SharedHistory,
        sink: Arc<dyn MeterSink>,
        reporter: Arc<RecordingReporter>,
    ) -> BackgroundCoordinator {
        BackgroundCoordinator::new(settings(), reader, history, sink, reporter).unwrap()
    }

    #[test]
    fn test_start_is_idempotent() {
        let (_writer, reader) = capture();
        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history(128),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingReporter::default()),
        )
        .unwrap();

        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        coordinator.start().unwrap();
        coordinator.start().unwrap();

        assert_eq!(coordinator.active_pipelines(), 2);
        assert_eq!(coordinator.state(), CoordinatorState::Recording);

        let report = coordinator.stop(Duration::from_millis(500));
        assert_eq!(report, StopReport { joined: 2, cancelled: 0, stream_lost: false });
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
        assert_eq!(coordinator.active_pipelines(), 0);
    }

    #[test]
    fn test_start_requires_open_stream() {
        let (writer, reader) = capture();
        drop(writer);

        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history(128),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingReporter::default()),
        )
        .unwrap();

        assert!(matches!(coordinator.start(), Err(PipelineError::StreamClosed)));
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }

    #[test]
    fn test_stop_cancels_stalled_pipeline() {
        let (_writer, reader) = capture();
        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history(128),
            Arc::new(StallingSink(Duration::from_secs(5))),
            Arc::new(RecordingReporter::default()),
        )
        .unwrap();

        coordinator.start().unwrap();
        // Let the first spectrogram tick reach the stalling sink
        std::thread::sleep(Duration::from_millis(100));

        let began = Instant::now();
        let report = coordinator.stop(Duration::from_millis(50));
        let elapsed = began.elapsed();

        assert!(elapsed < Duration::from_millis(1000), "stop took {:?}", elapsed);
        assert_eq!(report.cancelled, 1);
        assert_eq!(report.joined, 1);
    }

    #[test]
    fn test_records_tone_into_history() {
        let (mut writer, reader) = capture();
        let tone: Vec<i16> = (0..SAMPLE_RATE as usize)
            .map(|n| {
                let phase = 2.0 * PI * 1000.0 * n as f64 / f64::from(SAMPLE_RATE);
                (phase.cos() * 12_000.0) as i16
            })
            .collect();
        writer.append_slice(&tone);

        let history = history(128);
        let sink = Arc::new(RecordingSink::default());
        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history.clone(),
            sink.clone(),
            Arc::new(RecordingReporter::default()),
        )
        .unwrap();

        coordinator.start().unwrap();
        assert!(wait_until(Duration::from_secs(3), || {
            history.len() >= 10 && !sink.volumes().is_empty()
        }));
        coordinator.stop(Duration::from_millis(500));

        // 1 kHz at 8 kHz / 256 points sits in bin 32
        history.with_history(|h| {
            let row = h.row(0).unwrap().to_vec();
            let peak = peak_bin(&row).unwrap();
            assert!((peak as i64 - 32).abs() <= 1, "peak at bin {}", peak);
        });

        // Timestamps are epoch seconds; compare relative to the capture start
        let hop_seconds = 128.0 / f64::from(SAMPLE_RATE);
        let step = history.get_layer_date(1) - history.get_layer_date(0);
        assert!((step - hop_seconds).abs() < 1e-6, "step {}", step);
        let first = history.get_layer_date(0) - coordinator.reader().started_at();
        assert!(first.abs() < 1e-6, "first row at {}", first);

        assert!(sink.volumes().iter().all(|v| (0.0..=100.0).contains(v)));
        assert!(!sink.waterfall_updates().is_empty());
    }

    #[test]
    fn test_stream_loss_ends_pipelines() {
        let (writer, reader) = capture();
        let reporter = Arc::new(RecordingReporter::default());
        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history(128),
            Arc::new(RecordingSink::default()),
            reporter.clone(),
        )
        .unwrap();

        coordinator.start().unwrap();
        drop(writer);

        assert!(wait_until(Duration::from_secs(2), || coordinator.active_pipelines() == 0));

        let critical: Vec<_> = reporter
            .reports()
            .into_iter()
            .filter(|(_, _, severity)| *severity == Severity::Critical)
            .collect();
        assert_eq!(critical.len(), 1);

        let report = coordinator.stop(Duration::from_millis(100));
        assert!(report.stream_lost);
        assert_eq!(report.cancelled, 0);
    }

    #[test]
    fn test_analysis_errors_do_not_stop_recording() {
        let (mut writer, reader) = capture();
        writer.append_slice(&[1000; 4096]);

        // Rows have 128 points, the history expects 100
        let reporter = Arc::new(RecordingReporter::default());
        let mut coordinator = BackgroundCoordinator::new(
            settings(),
            reader,
            history(100),
            Arc::new(RecordingSink::default()),
            reporter.clone(),
        )
        .unwrap();

        coordinator.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || reporter.reports().len() >= 3));

        assert_eq!(coordinator.active_pipelines(), 2);
        assert!(reporter
            .reports()
            .iter()
            .all(|(title, _, severity)| title == "Spectrogram" && *severity == Severity::Warning));

        let report = coordinator.stop(Duration::from_millis(500));
        assert_eq!(report.joined, 2);
    }

    #[test]
    fn test_capture_keeps_flowing_after_buffer_wraps() {
        let (mut writer, reader) = AudioCaptureBuffer::new(1024, SAMPLE_RATE).split();
        writer.append_slice(&[500; 1024]);

        let history = history(128);
        let reporter = Arc::new(RecordingReporter::default());
        let mut coordinator = coordinator(
            reader,
            history.clone(),
            Arc::new(RecordingSink::default()),
            reporter.clone(),
        );

        coordinator.start().unwrap();
        assert!(wait_until(Duration::from_secs(2), || history.len() >= 7));
        let before = history.len();

        for _ in 0..10 {
            writer.append_slice(&[500; 1024]);
            std::thread::sleep(Duration::from_millis(20));
        }
        let total = 11 * 1024;
        assert!(wait_until(Duration::from_secs(2), || {
            history.get_layer_date(history.len() - 1) - coordinator.reader().started_at()
                >= (total - 256 - 128) as f64 / f64::from(SAMPLE_RATE)
        }));

        let report = coordinator.stop(Duration::from_millis(500));
        assert!(history.len() > before);
        assert!(reporter.reports().is_empty());
        assert!(!report.stream_lost);

        // Rows stay in capture order across the wrap
        let dates: Vec<f64> = (0..history.len()).map(|i| history.get_layer_date(i)).collect();
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_restart_after_cancelled_stop_commits_no_duplicates() {
        let (mut writer, reader) = capture();
        writer.append_slice(&[800; 1024]);

        let history = history(128);
        let mut coordinator = coordinator(
            reader,
            history.clone(),
            Arc::new(StallingSink(Duration::from_millis(400))),
            Arc::new(RecordingReporter::default()),
        );

        coordinator.start().unwrap();
        // Rows land before the sink stalls the commit stage
        assert!(wait_until(Duration::from_secs(2), || history.len() == 7));
        let report = coordinator.stop(Duration::from_millis(20));
        assert_eq!(report.cancelled, 1);

        coordinator.start().unwrap();
        std::thread::sleep(Duration::from_millis(150));
        coordinator.stop(Duration::from_millis(20));

        assert_eq!(history.len(), 7);
        let dates: Vec<f64> = (0..history.len()).map(|i| history.get_layer_date(i)).collect();
        assert!(dates.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn test_drop_inside_async_context() {
        let (_writer, reader) = capture();
        let mut coordinator = coordinator(
            reader,
            history(128),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingReporter::default()),
        );

        coordinator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        drop(coordinator);
    }

    #[tokio::test]
    async fn test_stop_inside_async_context() {
        let (_writer, reader) = capture();
        let mut coordinator = coordinator(
            reader,
            history(128),
            Arc::new(RecordingSink::default()),
            Arc::new(RecordingReporter::default()),
        );

        coordinator.start().unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        let report = coordinator.stop(Duration::from_millis(500));
        assert_eq!(report.joined, 2);
        assert_eq!(coordinator.state(), CoordinatorState::Idle);
    }
}
