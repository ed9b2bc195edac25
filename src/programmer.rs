//! Target device programming via an external J-Link commander process.
//!
//! Each experiment gets a freshly rendered commander script (interface
//! select, connect, reset, erase, load, run, exit) written to a fixed
//! scratch path and superseded on the next iteration; the script is an
//! ephemeral artifact, not an output of record. The external tool's exit
//! status is checked: a failed flash must never be mistaken for success,
//! since the bench would otherwise happily measure an unprogrammed or
//! half-erased device for 30 seconds.

use async_trait::async_trait;
use log::{info, warn};
use std::path::PathBuf;
use tokio::process::Command;

use crate::catalog::ExperimentDescriptor;
use crate::config::ProgrammerSettings;
use crate::error::{AppResult, BenchError};

/// Ordered programmer directives for one flash operation.
#[derive(Clone, Debug, PartialEq)]
pub struct FlashScript {
    interface_speed_khz: u32,
    firmware: PathBuf,
}

impl FlashScript {
    pub fn new(interface_speed_khz: u32, firmware: PathBuf) -> Self {
        Self {
            interface_speed_khz,
            firmware,
        }
    }

    /// Renders the commander script. Deterministic given the firmware path
    /// and the configured interface speed.
    pub fn render(&self) -> String {
        let mut script = String::new();
        script.push_str("if SWD\n");
        script.push_str(&format!("speed {}\n", self.interface_speed_khz));
        script.push_str("connect\n");
        script.push_str("r\n");
        script.push_str("erase\n");
        script.push_str(&format!("loadfile {}\n", self.firmware.display()));
        script.push_str("r\n");
        script.push_str("g\n");
        script.push_str("exit\n");
        script
    }
}

/// Flashes the target with one experiment's firmware image.
#[async_trait]
pub trait TargetProgrammer: Send + Sync {
    async fn program(&self, descriptor: &ExperimentDescriptor) -> AppResult<()>;
}

/// Drives the SEGGER `jlink` commander tool.
pub struct JlinkProgrammer {
    settings: ProgrammerSettings,
}

impl JlinkProgrammer {
    pub fn new(settings: ProgrammerSettings) -> Self {
        Self { settings }
    }

    fn program_error(&self, descriptor: &ExperimentDescriptor, reason: String) -> BenchError {
        BenchError::Program {
            experiment: descriptor.dir_name.clone(),
            reason,
        }
    }
}

#[async_trait]
impl TargetProgrammer for JlinkProgrammer {
    async fn program(&self, descriptor: &ExperimentDescriptor) -> AppResult<()> {
        let firmware = descriptor.firmware_path();
        if !firmware.exists() {
            return Err(self.program_error(
                descriptor,
                format!("firmware image not found: {}", firmware.display()),
            ));
        }

        let script = FlashScript::new(self.settings.interface_speed_khz, firmware);
        tokio::fs::write(&self.settings.script_path, script.render())
            .await
            .map_err(|err| {
                self.program_error(
                    descriptor,
                    format!(
                        "failed to write commander script {}: {}",
                        self.settings.script_path.display(),
                        err
                    ),
                )
            })?;

        info!("Flashing target with {}", descriptor.dir_name);
        let status = Command::new(&self.settings.command)
            .arg("-device")
            .arg(&self.settings.device)
            .arg("-CommanderScript")
            .arg(&self.settings.script_path)
            .status()
            .await
            .map_err(|err| {
                self.program_error(
                    descriptor,
                    format!("failed to launch '{}': {}", self.settings.command, err),
                )
            })?;

        if !status.success() {
            warn!(
                "Programmer reported failure for {}: {}",
                descriptor.dir_name, status
            );
            return Err(self.program_error(descriptor, format!("{}", status)));
        }

        Ok(())
    }
}
