//! VU sampler
//!
//! A statistical level reading: one pseudo-random sample from the most
//! recent audio per tick, not an RMS or peak meter.

use super::sink::MeterSink;
use super::LoopControl;
use crate::audio::CaptureReader;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Scale a 16-bit sample to 0-100 %
pub fn volume_percent(sample: i16) -> f64 {
    f64::from(sample).abs() / 32768.0 * 100.0
}

/// Draw one sample from the last `span` captured samples and scale it
///
/// Returns 0 when nothing is retained.
pub fn sample_volume<R: Rng>(reader: &CaptureReader, span: usize, rng: &mut R) -> f64 {
    let len = reader.len();
    let retained = len.min(reader.capacity());
    if retained == 0 {
        return 0.0;
    }
    let first = len - span.clamp(1, retained);
    let index = rng.gen_range(first..len);
    reader.sample_at(index).map_or(0.0, volume_percent)
}

/// Number of samples one tick covers at the stream's rate
pub fn tick_span(sample_rate: u32, interval: Duration) -> usize {
    ((f64::from(sample_rate) * interval.as_secs_f64()) as usize).max(1)
}

pub(crate) async fn run_vu_sampler(
    control: LoopControl,
    sink: Arc<dyn MeterSink>,
    interval: Duration,
) {
    let span = tick_span(control.reader.sample_rate(), interval);
    let mut rng = StdRng::from_entropy();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    log::debug!("VU sampler started ({:?} interval, {} sample span)", interval, span);

    loop {
        ticker.tick().await;
        if !control.should_continue() {
            break;
        }
        sink.update_volume(sample_volume(&control.reader, span, &mut rng));
    }

    log::debug!("VU sampler stopped");
}
