//! Experiment catalog enumeration and descriptor parsing.
//!
//! Each prebuilt experiment lives in its own subdirectory of the catalog
//! root, named `<ID>-<VOLTAGE>-<FREQUENCY>[-<TAG>]`, e.g.
//! `EXP05-3_3-6000000` or `EXP13A-3_7-48000000-MyConfig`. The voltage field
//! uses `_` in place of the decimal point (directory names must stay
//! filesystem-safe) and the frequency field is either a rate in hertz or the
//! literal `LF` for low-frequency runs. Three fields describe an MCU-only
//! measurement; a fourth, arbitrary tag marks a whole-system measurement.
//!
//! Enumeration order is execution order: the catalog is deliberately NOT
//! sorted, experiments run in whatever order the filesystem lists them.

use crate::error::{AppResult, BenchError};
use log::warn;
use std::fmt;
use std::path::{Path, PathBuf};

const FIELD_DELIMITER: char = '-';

/// Whether an experiment measures the bare microcontroller or the whole
/// powered system.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Variant {
    Mcu,
    System,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Mcu => write!(f, "MCU"),
            Variant::System => write!(f, "SYSTEM"),
        }
    }
}

/// Target core clock for an experiment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Frequency {
    /// Clock rate in hertz.
    Hertz(u64),
    /// Low-frequency oscillator run (the `LF` marker).
    LowFrequency,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Hertz(hz) => write!(f, "{} Hz", hz),
            Frequency::LowFrequency => write!(f, "LF"),
        }
    }
}

/// Parsed identity of one experiment, derived from its directory name.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentDescriptor {
    /// Full directory name; also the stem of the artifact files inside it.
    pub dir_name: String,
    /// Experiment identifier (first field, e.g. "EXP05").
    pub id: String,
    /// Test voltage in volts, decimal point restored.
    pub voltage: f64,
    /// Target clock configuration.
    pub frequency: Frequency,
    /// MCU-only or whole-system measurement.
    pub variant: Variant,
    /// Absolute or root-relative path of the experiment directory.
    pub dir: PathBuf,
}

impl ExperimentDescriptor {
    /// Parses a directory name into a descriptor.
    ///
    /// Exactly 3 delimiter-separated fields yield `Variant::Mcu`, exactly 4
    /// yield `Variant::System`; anything else is malformed. The tag carried
    /// by the 4th field is arbitrary and only survives as part of
    /// `dir_name`.
    pub fn parse(dir_name: &str, dir: PathBuf) -> AppResult<Self> {
        let malformed = |reason: &str| BenchError::MalformedDescriptor {
            name: dir_name.to_string(),
            reason: reason.to_string(),
        };

        let fields: Vec<&str> = dir_name.split(FIELD_DELIMITER).collect();
        let variant = match fields.len() {
            3 => Variant::Mcu,
            4 => Variant::System,
            n => {
                return Err(malformed(&format!("expected 3 or 4 fields, found {}", n)));
            }
        };

        let id = fields[0];
        if id.is_empty() {
            return Err(malformed("empty experiment id"));
        }

        let voltage: f64 = fields[1]
            .replace('_', ".")
            .parse()
            .map_err(|_| malformed(&format!("unparsable voltage field '{}'", fields[1])))?;
        if voltage <= 0.0 {
            return Err(malformed(&format!("non-positive voltage '{}'", fields[1])));
        }

        let frequency = if fields[2] == "LF" {
            Frequency::LowFrequency
        } else {
            fields[2]
                .parse()
                .map(Frequency::Hertz)
                .map_err(|_| malformed(&format!("unparsable frequency field '{}'", fields[2])))?
        };

        Ok(Self {
            dir_name: dir_name.to_string(),
            id: id.to_string(),
            voltage,
            frequency,
            variant,
            dir,
        })
    }

    /// Firmware image flashed onto the target for this experiment.
    pub fn firmware_path(&self) -> PathBuf {
        self.dir.join(format!("{}.srec", self.dir_name))
    }

    /// Result file receiving this experiment's samples.
    pub fn results_path(&self) -> PathBuf {
        self.dir.join(format!("{}.results", self.dir_name))
    }
}

impl fmt::Display for ExperimentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, {} V, {})",
            self.id, self.variant, self.voltage, self.frequency
        )
    }
}

/// Enumerates the catalog root and parses each immediate subdirectory name
/// into a descriptor, preserving directory-listing order.
///
/// Malformed names are skipped with a warning rather than aborting the whole
/// catalog; plain files in the root are ignored. An unreadable root is fatal.
pub fn read_catalog(root: &Path) -> AppResult<Vec<ExperimentDescriptor>> {
    let mut descriptors = Vec::new();

    for entry in std::fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        match ExperimentDescriptor::parse(&name, entry.path()) {
            Ok(descriptor) => descriptors.push(descriptor),
            Err(err) => warn!("Skipping catalog entry: {}", err),
        }
    }

    Ok(descriptors)
}
