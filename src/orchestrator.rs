//! Batch experiment execution.
//!
//! For each catalog descriptor, in enumeration order: flash the target,
//! hard power cycle it into the experiment's test voltage, sample the
//! multimeter for the acquisition window, and stream validated samples into
//! the experiment's result file. The instrument handles are session
//! property — opened and configured once, reused by every iteration.
//!
//! Each experiment runs inside an isolated failure boundary: a programming
//! failure, a mid-sequence instrument fault, or a persistence error aborts
//! that experiment only, forces the rail off, records the fault in the run
//! manifest, and lets the batch continue. The result file of one experiment
//! is always closed before the next experiment's programming phase begins.
//!
//! An external stop signal (Ctrl-C) lets the in-flight experiment close its
//! result file and power the rail down, then records the remainder of the
//! catalog as skipped; the target is never left energized.

use log::{error, info, warn};
use tokio::sync::watch;

use crate::acquisition::{acquire, AcquisitionReport};
use crate::catalog::ExperimentDescriptor;
use crate::config::Settings;
use crate::error::{AppResult, BenchError};
use crate::instrument::InstrumentSession;
use crate::manifest::RunManifest;
use crate::programmer::TargetProgrammer;
use crate::results::ResultsWriter;
use crate::sequencer::PowerSequencer;

/// Drives a whole batch over the shared instrument session.
pub struct Orchestrator {
    session: InstrumentSession,
    programmer: Box<dyn TargetProgrammer>,
    settings: Settings,
    stop: watch::Receiver<bool>,
}

impl Orchestrator {
    pub fn new(
        session: InstrumentSession,
        programmer: Box<dyn TargetProgrammer>,
        settings: Settings,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            session,
            programmer,
            settings,
            stop,
        }
    }

    /// Executes every experiment in catalog order and returns the manifest.
    pub async fn run(&self, catalog: &[ExperimentDescriptor]) -> RunManifest {
        let mut manifest = RunManifest::new();
        info!("Starting batch of {} experiments", catalog.len());

        let mut halted: Option<String> = None;
        for descriptor in catalog {
            if halted.is_none() && *self.stop.borrow() {
                halted = Some("stop requested".to_string());
            }
            if let Some(reason) = &halted {
                manifest.record_skipped(&descriptor.dir_name, reason);
                continue;
            }

            info!("==== Experiment: {} ====", descriptor.dir_name);
            match self.run_experiment(descriptor).await {
                Ok(report) => {
                    info!(
                        "Experiment {} complete: {} samples ({} discarded)",
                        descriptor.dir_name, report.samples, report.decode_failures
                    );
                    if report.stopped_early {
                        halted = Some("stop requested".to_string());
                    }
                    manifest.record_completed(&descriptor.dir_name, &report);
                }
                Err(err) if err.is_isolated() => {
                    warn!("Experiment {} failed: {}", descriptor.dir_name, err);
                    manifest.record_failed(&descriptor.dir_name, &err.to_string());
                }
                Err(err) => {
                    // Not recoverable by moving on; the session itself is bad.
                    error!(
                        "Fatal fault during {}: {}; halting batch",
                        descriptor.dir_name, err
                    );
                    manifest.record_failed(&descriptor.dir_name, &err.to_string());
                    halted = Some(format!("halted by fatal fault: {}", err));
                }
            }
        }

        manifest.finish();
        info!(
            "Batch finished: {} completed, {} failed, {} skipped",
            manifest.completed(),
            manifest.failed(),
            manifest.skipped()
        );
        manifest
    }

    /// One experiment's full lifecycle. On any error the rail is forced off
    /// before the fault is reported.
    async fn run_experiment(&self, descriptor: &ExperimentDescriptor) -> AppResult<AcquisitionReport> {
        let mut sequencer =
            PowerSequencer::new(self.session.power.as_ref(), &self.settings.sequencing);

        let result = self.run_phases(descriptor, &mut sequencer).await;
        if result.is_err() {
            if let Err(off_err) = sequencer.force_off().await {
                warn!(
                    "Failed to de-energize rail after fault in {}: {}",
                    descriptor.dir_name, off_err
                );
            }
        }
        result
    }

    async fn run_phases<'a>(
        &'a self,
        descriptor: &ExperimentDescriptor,
        sequencer: &mut PowerSequencer<'a>,
    ) -> AppResult<AcquisitionReport> {
        sequencer.power_up_for_programming().await?;
        self.programmer.program(descriptor).await?;
        sequencer.restart_at(descriptor.voltage).await?;

        let results_path = descriptor.results_path();
        let mut writer =
            ResultsWriter::create(&results_path).map_err(|source| BenchError::ResultWrite {
                experiment: descriptor.dir_name.clone(),
                source,
            })?;

        let report = acquire(
            self.session.meter.as_ref(),
            self.settings.acquisition.window,
            &mut writer,
            &self.stop,
            &descriptor.dir_name,
        )
        .await?;

        writer.finish().map_err(|source| BenchError::ResultWrite {
            experiment: descriptor.dir_name.clone(),
            source,
        })?;

        sequencer.power_down().await?;
        Ok(report)
    }
}
