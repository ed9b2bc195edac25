//! Custom error types for the application.
//!
//! This module defines the primary error type, `BenchError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to classify the faults a characterization run can hit, and
//! in particular which of them abort the whole batch and which abort only the
//! experiment in flight.
//!
//! ## Error Hierarchy
//!
//! - **`Config` / `Configuration`**: file parsing failures from the `config`
//!   crate, and semantic errors that pass parsing but fail validation (e.g. a
//!   zero-length acquisition window). Both are fatal at startup.
//! - **`Io`**: wraps `std::io::Error` for catalog enumeration, script
//!   generation, and manifest persistence.
//! - **`MalformedDescriptor`**: an experiment directory name that does not
//!   follow the naming convention. The catalog reader recovers by skipping
//!   the entry.
//! - **`InstrumentOpen` / `InstrumentConfig`**: the session could not open or
//!   one-time-configure an instrument. Fatal to the whole run; no experiment
//!   can proceed without both instruments.
//! - **`Instrument` / `Sequence` / `Program` / `ResultWrite`**: faults scoped
//!   to a single experiment. The orchestrator records them in the run
//!   manifest and continues with the next descriptor.
//!
//! Decode failures of individual multimeter samples are deliberately NOT part
//! of this enum; they are represented by `instrument::meter::SampleError` and
//! are fully absorbed inside the acquisition loop.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, BenchError>;

#[derive(Error, Debug)]
pub enum BenchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed experiment directory name '{name}': {reason}")]
    MalformedDescriptor { name: String, reason: String },

    #[error("Failed to open instrument at '{resource}': {source}")]
    InstrumentOpen {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to configure instrument at '{resource}': {source}")]
    InstrumentConfig {
        resource: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Invalid power sequence transition: {0}")]
    Sequence(String),

    #[error("Programming failed for experiment '{experiment}': {reason}")]
    Program { experiment: String, reason: String },

    #[error("Failed to write results for experiment '{experiment}': {source}")]
    ResultWrite {
        experiment: String,
        #[source]
        source: std::io::Error,
    },

    #[error("VISA support not enabled. Rebuild with --features instrument_visa")]
    VisaFeatureDisabled,
}

impl BenchError {
    /// True when the fault is scoped to a single experiment and the batch
    /// should continue with the next descriptor.
    pub fn is_isolated(&self) -> bool {
        matches!(
            self,
            BenchError::Instrument(_)
                | BenchError::Sequence(_)
                | BenchError::Program { .. }
                | BenchError::ResultWrite { .. }
        )
    }
}
