//! Bounded-duration sampling loop.
//!
//! The loop issues back-to-back blocking reads against the armed multimeter
//! until the wall-clock window elapses; pacing comes entirely from the
//! instrument's own response time. Bus corruption of individual payloads is
//! routine on this hardware: every read decodes independently, a failure is
//! logged and counted, and the loop immediately moves to the next read. A
//! window in which every single read fails produces an empty (and valid)
//! result.

use log::{debug, warn};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::error::{AppResult, BenchError};
use crate::instrument::CurrentMeter;

/// Streaming consumer of validated samples, in read-success order.
pub trait SampleSink {
    fn push(&mut self, amps: f64) -> std::io::Result<()>;
}

/// Collects samples in memory.
impl SampleSink for Vec<f64> {
    fn push(&mut self, amps: f64) -> std::io::Result<()> {
        Vec::push(self, amps);
        Ok(())
    }
}

/// What one acquisition window produced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AcquisitionReport {
    /// Validated samples forwarded to the sink.
    pub samples: usize,
    /// Reads discarded because the payload failed to decode.
    pub decode_failures: usize,
    /// True when the external stop signal cut the window short.
    pub stopped_early: bool,
}

/// Samples `meter` for `window`, streaming every valid reading into `sink`.
///
/// Decode failures never terminate the loop and never reach the sink; a sink
/// write failure is fatal for the current experiment only. A raised stop
/// signal ends the loop at the next iteration boundary.
pub async fn acquire(
    meter: &dyn CurrentMeter,
    window: Duration,
    sink: &mut dyn SampleSink,
    stop: &watch::Receiver<bool>,
    experiment: &str,
) -> AppResult<AcquisitionReport> {
    let started = Instant::now();
    let mut report = AcquisitionReport::default();

    while started.elapsed() < window {
        if *stop.borrow() {
            report.stopped_early = true;
            break;
        }

        match meter.read_sample().await {
            Ok(amps) => {
                sink.push(amps)
                    .map_err(|source| BenchError::ResultWrite {
                        experiment: experiment.to_string(),
                        source,
                    })?;
                report.samples += 1;
            }
            Err(err) => {
                report.decode_failures += 1;
                warn!("Discarding unreadable sample for {}: {}", experiment, err);
            }
        }
    }

    debug!(
        "Acquisition window closed for {}: {} samples, {} discarded",
        experiment, report.samples, report.decode_failures
    );
    Ok(report)
}
