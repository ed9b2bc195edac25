//! Configuration management.
//!
//! This module defines the data structures for the application's
//! configuration, loaded from TOML files. It uses the `config` crate to
//! handle file loading and deserialization and `serde` for the data
//! structures; durations are written in human form (`"100ms"`, `"5s"`) via
//! `humantime-serde`.
//!
//! Every value has a default tuned on the original bench hardware (HP 66311B
//! source meter on GPIB address 5, HP 3457A multimeter on address 22, an
//! MSP432P401R target flashed over SWD), so `Settings::default()` describes a
//! runnable MCU bench and a config file only needs to state deviations. The
//! settle delays are open-loop timing constants, not derived from device
//! feedback; tune them for the physical setup, never remove the ordering they
//! pace.
//!
//! `Settings::new` loads and deserializes the configuration, then calls
//! `validate`, which rejects semantically invalid values so the run fails
//! before any instrument is touched.

use crate::error::{AppResult, BenchError};
use config::Config;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const VALID_LOG_LEVELS: &[&str] = &["error", "warn", "info", "debug", "trace"];

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Logging verbosity level ("error", "warn", "info", "debug", "trace").
    pub log_level: String,
    /// Experiment catalog location.
    pub catalog: CatalogSettings,
    /// Instrument addresses and communication pacing.
    pub instruments: InstrumentSettings,
    /// External flash tool invocation.
    pub programmer: ProgrammerSettings,
    /// Power rail sequencing voltages and settle delays.
    pub sequencing: SequencingSettings,
    /// Sampling window settings.
    pub acquisition: AcquisitionSettings,
}

/// Experiment catalog location.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct CatalogSettings {
    /// Directory containing one subdirectory per prebuilt experiment.
    pub root_dir: PathBuf,
}

/// Instrument session configuration.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct InstrumentSettings {
    /// Pause inserted after each raw instrument command so the GPIB
    /// transaction can complete before the next one is issued.
    #[serde(with = "humantime_serde")]
    pub command_delay: Duration,
    /// Read/write timeout for the underlying link.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
    pub power_source: PowerSourceSettings,
    pub multimeter: MultimeterSettings,
}

/// DC source configuration profile.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PowerSourceSettings {
    /// VISA resource string (e.g. "GPIB0::5::INSTR").
    pub resource: String,
    /// Measurement buffer depth (`SENS:SWE:POIN`).
    pub sweep_points: u32,
    /// Sample interval in seconds (`SENS:SWE:TINT`).
    pub sweep_interval_s: f64,
    /// Optional current limit in amps. Set for whole-system benches where a
    /// draw beyond the limit indicates a short.
    pub current_limit_amps: Option<f64>,
}

/// Multimeter configuration profile.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MultimeterSettings {
    /// VISA resource string (e.g. "GPIB0::22::INSTR").
    pub resource: String,
    /// Integration time in power-line cycles. 0 disables integration and
    /// takes instantaneous readings.
    pub nplc: f64,
    /// Fixed DC-current range in amps; `None` lets the meter autorange.
    pub current_range_amps: Option<f64>,
}

/// External programmer invocation settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProgrammerSettings {
    /// Flash tool executable.
    pub command: String,
    /// Target device name passed with `-device`.
    pub device: String,
    /// SWD interface speed in kHz.
    pub interface_speed_khz: u32,
    /// Scratch path for the generated commander script; overwritten on every
    /// experiment.
    pub script_path: PathBuf,
}

/// Power sequencing constants.
///
/// All delays are fixed, empirically tuned waits; the rail gets no feedback
/// from the target.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SequencingSettings {
    /// Rail voltage required for flashing, independent of the experiment's
    /// test voltage.
    pub programming_voltage: f64,
    /// Wait after output-enable before the target is touched.
    #[serde(with = "humantime_serde")]
    pub boot_delay: Duration,
    /// Wait after output-disable so the target is truly off.
    #[serde(with = "humantime_serde")]
    pub discharge_delay: Duration,
    /// Wait after re-enabling output at the test voltage so the firmware
    /// reaches its steady-state loop before sampling begins.
    #[serde(with = "humantime_serde")]
    pub steady_state_delay: Duration,
    /// Pause between consecutive experiments after power-down.
    #[serde(with = "humantime_serde")]
    pub inter_experiment_delay: Duration,
}

/// Sampling window settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Wall-clock duration of the sampling loop per experiment.
    #[serde(with = "humantime_serde")]
    pub window: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            catalog: CatalogSettings::default(),
            instruments: InstrumentSettings::default(),
            programmer: ProgrammerSettings::default(),
            sequencing: SequencingSettings::default(),
            acquisition: AcquisitionSettings::default(),
        }
    }
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("../Experiments"),
        }
    }
}

impl Default for InstrumentSettings {
    fn default() -> Self {
        Self {
            command_delay: Duration::from_millis(100),
            read_timeout: Duration::from_secs(5),
            power_source: PowerSourceSettings::default(),
            multimeter: MultimeterSettings::default(),
        }
    }
}

impl Default for PowerSourceSettings {
    fn default() -> Self {
        Self {
            resource: "GPIB0::5::INSTR".to_string(),
            sweep_points: 4096,
            sweep_interval_s: 15.6e-6,
            current_limit_amps: None,
        }
    }
}

impl Default for MultimeterSettings {
    fn default() -> Self {
        Self {
            resource: "GPIB0::22::INSTR".to_string(),
            nplc: 1.0,
            current_range_amps: None,
        }
    }
}

impl Default for ProgrammerSettings {
    fn default() -> Self {
        Self {
            command: "jlink".to_string(),
            device: "MSP432P401R".to_string(),
            interface_speed_khz: 4000,
            script_path: PathBuf::from("jlink-script.jlink"),
        }
    }
}

impl Default for SequencingSettings {
    fn default() -> Self {
        Self {
            programming_voltage: 3.3,
            boot_delay: Duration::from_secs(5),
            discharge_delay: Duration::from_secs(5),
            steady_state_delay: Duration::from_secs(5),
            inter_experiment_delay: Duration::from_secs(5),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(30),
        }
    }
}

impl Settings {
    /// Loads settings from `config/<name>.toml`, falling back to built-in
    /// defaults for anything the file does not set.
    ///
    /// With `config_name == None` the default file is optional; a named
    /// config must exist.
    pub fn new(config_name: Option<&str>) -> AppResult<Self> {
        let config_path = format!("config/{}", config_name.unwrap_or("default"));
        let s = Config::builder()
            .add_source(config::File::with_name(&config_path).required(config_name.is_some()))
            .build()
            .map_err(BenchError::Config)?;

        let settings: Settings = s.try_deserialize().map_err(BenchError::Config)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Semantic validation beyond what deserialization can express.
    pub fn validate(&self) -> AppResult<()> {
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(BenchError::Configuration(format!(
                "invalid log_level '{}', expected one of {:?}",
                self.log_level, VALID_LOG_LEVELS
            )));
        }
        if self.catalog.root_dir.as_os_str().is_empty() {
            return Err(BenchError::Configuration(
                "catalog.root_dir must not be empty".to_string(),
            ));
        }
        if self.instruments.power_source.resource.is_empty()
            || self.instruments.multimeter.resource.is_empty()
        {
            return Err(BenchError::Configuration(
                "instrument resource strings must not be empty".to_string(),
            ));
        }
        if self.instruments.power_source.sweep_points == 0 {
            return Err(BenchError::Configuration(
                "instruments.power_source.sweep_points must be positive".to_string(),
            ));
        }
        if self.instruments.power_source.sweep_interval_s <= 0.0 {
            return Err(BenchError::Configuration(
                "instruments.power_source.sweep_interval_s must be positive".to_string(),
            ));
        }
        if let Some(limit) = self.instruments.power_source.current_limit_amps {
            if limit <= 0.0 {
                return Err(BenchError::Configuration(
                    "instruments.power_source.current_limit_amps must be positive".to_string(),
                ));
            }
        }
        if self.instruments.multimeter.nplc < 0.0 {
            return Err(BenchError::Configuration(
                "instruments.multimeter.nplc must not be negative".to_string(),
            ));
        }
        if self.programmer.command.is_empty() || self.programmer.device.is_empty() {
            return Err(BenchError::Configuration(
                "programmer.command and programmer.device must not be empty".to_string(),
            ));
        }
        if self.programmer.interface_speed_khz == 0 {
            return Err(BenchError::Configuration(
                "programmer.interface_speed_khz must be positive".to_string(),
            ));
        }
        if self.sequencing.programming_voltage <= 0.0 {
            return Err(BenchError::Configuration(
                "sequencing.programming_voltage must be positive".to_string(),
            ));
        }
        if self.acquisition.window.is_zero() {
            return Err(BenchError::Configuration(
                "acquisition.window must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
