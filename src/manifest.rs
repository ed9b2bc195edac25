//! Batch run manifest.
//!
//! A batch run outlives any single fault: individual experiments can fail or
//! be skipped while the rest of the catalog still executes. The manifest is
//! the record of what actually happened — one entry per descriptor, in
//! execution order — and is persisted as JSON at the catalog root so a
//! partially failed overnight run can be triaged and re-run selectively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::acquisition::AcquisitionReport;
use crate::error::AppResult;

/// Terminal status of one experiment within a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Programming, sequencing, acquisition, and persistence all succeeded.
    Completed,
    /// An isolated fault aborted this experiment; the batch continued.
    Failed,
    /// Never attempted (stop signal, or an earlier fatal fault).
    Skipped,
}

/// Record of one experiment's execution.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExperimentOutcome {
    /// Full experiment directory name.
    pub experiment: String,
    pub status: OutcomeStatus,
    /// Validated samples written to the result file.
    pub samples: usize,
    /// Reads discarded during the acquisition window.
    pub decode_failures: usize,
    /// Failure or skip reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Execution record for one whole batch, in catalog order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunManifest {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub outcomes: Vec<ExperimentOutcome>,
}

impl Default for RunManifest {
    fn default() -> Self {
        Self::new()
    }
}

impl RunManifest {
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            outcomes: Vec::new(),
        }
    }

    pub fn record_completed(&mut self, experiment: &str, report: &AcquisitionReport) {
        self.outcomes.push(ExperimentOutcome {
            experiment: experiment.to_string(),
            status: OutcomeStatus::Completed,
            samples: report.samples,
            decode_failures: report.decode_failures,
            detail: report
                .stopped_early
                .then(|| "window cut short by stop signal".to_string()),
        });
    }

    pub fn record_failed(&mut self, experiment: &str, reason: &str) {
        self.outcomes.push(ExperimentOutcome {
            experiment: experiment.to_string(),
            status: OutcomeStatus::Failed,
            samples: 0,
            decode_failures: 0,
            detail: Some(reason.to_string()),
        });
    }

    pub fn record_skipped(&mut self, experiment: &str, reason: &str) {
        self.outcomes.push(ExperimentOutcome {
            experiment: experiment.to_string(),
            status: OutcomeStatus::Skipped,
            samples: 0,
            decode_failures: 0,
            detail: Some(reason.to_string()),
        });
    }

    /// Stamps the end of the batch.
    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn completed(&self) -> usize {
        self.count(OutcomeStatus::Completed)
    }

    pub fn failed(&self) -> usize {
        self.count(OutcomeStatus::Failed)
    }

    pub fn skipped(&self) -> usize {
        self.count(OutcomeStatus::Skipped)
    }

    fn count(&self, status: OutcomeStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Persists the manifest as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
