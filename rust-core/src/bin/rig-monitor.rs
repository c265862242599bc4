//! Command-line monitor: records from an input device, logs VU levels and
//! waterfall updates, and optionally plays the recording back.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use env_logger::Env;
use rig_waterfall::audio::{self, CaptureStream, PlaybackStream};
use rig_waterfall::pipeline::{BackgroundCoordinator, ChannelSink, MeterEvent, PipelineSettings};
use rig_waterfall::report::LogReporter;
use rig_waterfall::spectrum::power::peak_bin;
use rig_waterfall::waterfall::SharedHistory;
use rig_waterfall::Config;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "rig-monitor")]
#[command(version = "0.1.0")]
#[command(about = "Record from a sound card and follow its waterfall", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List audio input devices
    Devices,

    /// Write the default configuration
    GenerateConfig {
        /// Output path
        #[arg(default_value = "rig-waterfall.toml")]
        path: PathBuf,
    },

    /// Record until Ctrl+C or the time limit
    Record {
        /// Configuration file (defaults are used if it is missing)
        #[arg(default_value = "rig-waterfall.toml")]
        config: PathBuf,

        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,

        /// Play the recording back afterwards
        #[arg(short, long)]
        playback: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    match Cli::parse().command {
        Commands::Devices => {
            for device in audio::list_input_devices()? {
                println!(
                    "{} ({} Hz, {} ch)",
                    device.name, device.sample_rate, device.channels
                );
            }
            Ok(())
        }
        Commands::GenerateConfig { path } => {
            Config::write_default(&path)?;
            println!("Wrote default configuration to {}", path.display());
            Ok(())
        }
        Commands::Record {
            config,
            seconds,
            playback,
        } => record(&config, seconds, playback),
    }
}

fn record(config_path: &Path, seconds: Option<u64>, playback: bool) -> Result<()> {
    let config = Config::load_or_default(config_path)?;
    log::debug!("Configuration: {:?}", config);

    let capture = CaptureStream::open(&config.capture.device, config.capture.size_hint)
        .with_context(|| format!("Failed to open input device '{}'", config.capture.device))?;

    let device_rate = capture.device_info().sample_rate;
    if device_rate != config.capture.sample_rate {
        log::warn!(
            "Device runs at {} Hz, configured {} Hz; frequency axis follows the device",
            device_rate,
            config.capture.sample_rate
        );
    }

    let history = SharedHistory::new();
    history.configure(
        config.history.x_min,
        config.history.x_max,
        config.history.history_extent,
        config.history.layer_points,
    )?;

    let (sink, events) = ChannelSink::new(256);
    let mut coordinator = BackgroundCoordinator::new(
        PipelineSettings::from(&config),
        capture.reader(),
        history.clone(),
        Arc::new(sink),
        Arc::new(LogReporter),
    )?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Stop requested");
        running_clone.store(false, Ordering::SeqCst);
    })?;

    capture.start()?;
    coordinator.start()?;
    log::info!("Recording from {} (Ctrl+C to stop)", capture.device_info().name);

    let deadline = seconds
        .map(|secs| Instant::now() + Duration::from_secs(secs));

    while running.load(Ordering::SeqCst) && capture.reader().is_open() {
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break;
        }

        match events.recv_timeout(Duration::from_millis(100)) {
            Ok(MeterEvent::Volume(level)) => log::trace!("VU {:5.1}%", level),
            Ok(MeterEvent::Waterfall(update)) => {
                if let Some(row) = update.rows.last() {
                    let peak = peak_bin(row).unwrap_or(0);
                    let hz = peak as f64 * f64::from(device_rate) / update.window_size as f64;
                    log::info!(
                        "{} new rows, peak {:.0} Hz, {} samples captured",
                        update.rows.len(),
                        hz,
                        update.buffer_size
                    );
                }
            }
            Err(_) => {}
        }
    }

    let report = coordinator.stop(config.timing.stop_timeout());
    capture.pause()?;

    let reader = capture.reader();
    log::info!(
        "Captured {} samples ({} retained), {} waterfall rows",
        reader.len(),
        reader.len() - reader.oldest_index(),
        history.len()
    );
    if report.stream_lost {
        log::error!("Capture stream was lost during recording");
    }

    if playback && !reader.is_empty() {
        let playback = PlaybackStream::from_default_device(reader.clone())?;
        playback.start()?;
        log::info!("Playing back on {}", playback.device_info().name);

        reader.reset_playback();
        while reader.playback_position() < reader.len() {
            std::thread::sleep(Duration::from_millis(50));
        }
        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(200));
        playback.pause()?;
    }

    Ok(())
}
