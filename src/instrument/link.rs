//! Instrument transport abstraction.
//!
//! The orchestrator never owns the communication transport; it receives a
//! [`InstrumentLink`] capability, one per physical instrument. The production
//! backend wraps a VISA resource (GPIB in the reference setup) and lives
//! behind the `instrument_visa` feature; tests and development setups inject
//! [`crate::instrument::MockLink`] instead.

use anyhow::Result;
use async_trait::async_trait;

use crate::error::{AppResult, BenchError};
use std::time::Duration;

/// A long-lived, exclusively-owned communication session to one physical
/// instrument.
///
/// Commands are plain text in the instrument's native dialect; binary reads
/// return whatever payload the instrument emits for one measurement.
#[async_trait]
pub trait InstrumentLink: Send + Sync {
    /// Sends one command, appending the link's line terminator.
    async fn write(&self, command: &str) -> Result<()>;

    /// Issues one blocking read and returns the raw payload.
    async fn read_binary(&self) -> Result<Vec<u8>>;

    /// Resource identifier, for log and error messages.
    fn resource(&self) -> &str;
}

/// Opens the production transport for `resource`.
///
/// Fails with [`BenchError::VisaFeatureDisabled`] when the binary was built
/// without the VISA backend.
pub async fn open_link(resource: &str, timeout: Duration) -> AppResult<Box<dyn InstrumentLink>> {
    #[cfg(feature = "instrument_visa")]
    {
        let link = visa_enabled::VisaLink::open(resource.to_string(), timeout)
            .await
            .map_err(|source| BenchError::InstrumentOpen {
                resource: resource.to_string(),
                source,
            })?;
        Ok(Box::new(link))
    }

    #[cfg(not(feature = "instrument_visa"))]
    {
        let _ = (resource, timeout);
        Err(BenchError::VisaFeatureDisabled)
    }
}

#[cfg(feature = "instrument_visa")]
mod visa_enabled {
    use super::InstrumentLink;
    use anyhow::{Context, Result};
    use async_trait::async_trait;
    use log::debug;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use visa_rs::{DefaultRM, Instrument, VISA};

    /// VISA-backed instrument link.
    ///
    /// Wraps the `visa-rs` crate and provides async I/O by executing the
    /// synchronous VISA operations on Tokio's blocking task executor.
    ///
    /// Supports resource strings like:
    /// - "GPIB0::5::INSTR" (GPIB interface)
    /// - "USB0::0x1234::0x5678::SERIAL::INSTR" (USB)
    /// - "TCPIP0::192.168.1.100::INSTR" (Ethernet/LXI)
    pub struct VisaLink {
        resource_string: String,
        timeout: Duration,
        line_terminator: String,
        instrument: Arc<Mutex<Box<dyn Instrument>>>,
    }

    impl VisaLink {
        /// Opens the VISA resource.
        pub async fn open(resource_string: String, timeout: Duration) -> Result<Self> {
            let resource_for_open = resource_string.clone();
            let timeout_ms = timeout.as_millis() as u32;

            let instrument = tokio::task::spawn_blocking(move || {
                let rm = DefaultRM::new().context("Failed to create VISA resource manager")?;

                let instr = rm
                    .open(&resource_for_open, timeout_ms, 0)
                    .with_context(|| {
                        format!("Failed to open VISA resource: {}", resource_for_open)
                    })?;

                Ok::<Box<dyn Instrument>, anyhow::Error>(instr)
            })
            .await
            .context("VISA open task panicked")??;

            debug!(
                "VISA resource '{}' opened with {}ms timeout",
                resource_string,
                timeout.as_millis()
            );

            Ok(Self {
                resource_string,
                timeout,
                line_terminator: "\n".to_string(),
                instrument: Arc::new(Mutex::new(instrument)),
            })
        }

        /// Overrides the command line terminator (e.g. "\r\n").
        pub fn with_line_terminator(mut self, terminator: String) -> Self {
            self.line_terminator = terminator;
            self
        }
    }

    #[async_trait]
    impl InstrumentLink for VisaLink {
        async fn write(&self, command: &str) -> Result<()> {
            let command_str = format!("{}{}", command, self.line_terminator);
            let command_for_log = command.to_string();
            let instrument = self.instrument.clone();
            let timeout = self.timeout;

            tokio::task::spawn_blocking(move || {
                let mut instr_guard = instrument.blocking_lock();

                instr_guard
                    .set_timeout(timeout.as_millis() as u32)
                    .context("Failed to set VISA timeout")?;

                instr_guard
                    .write(&command_str)
                    .with_context(|| format!("VISA write failed for: {}", command_for_log))?;

                debug!("VISA write sent: {}", command_for_log);
                Ok(())
            })
            .await
            .context("VISA write task panicked")?
        }

        async fn read_binary(&self) -> Result<Vec<u8>> {
            let instrument = self.instrument.clone();
            let timeout = self.timeout;

            tokio::task::spawn_blocking(move || {
                let mut instr_guard = instrument.blocking_lock();

                instr_guard
                    .set_timeout(timeout.as_millis() as u32)
                    .context("Failed to set VISA timeout")?;

                let mut buf = vec![0u8; 64];
                let n = std::io::Read::read(&mut *instr_guard, &mut buf)
                    .context("VISA binary read failed")?;
                buf.truncate(n);
                Ok(buf)
            })
            .await
            .context("VISA read task panicked")?
        }

        fn resource(&self) -> &str {
            &self.resource_string
        }
    }
}

#[cfg(feature = "instrument_visa")]
pub use visa_enabled::VisaLink;
