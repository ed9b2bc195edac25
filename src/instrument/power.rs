//! DC source capability and its GPIB driver.

use anyhow::Result;
use async_trait::async_trait;
use log::debug;
use std::time::Duration;

use super::link::InstrumentLink;
use crate::config::PowerSourceSettings;

/// Capability of the instrument powering the target rail.
#[async_trait]
pub trait PowerSource: Send + Sync {
    /// Returns the instrument to its power-on default state.
    async fn reset(&self) -> Result<()>;

    /// Applies the one-time measurement/limit profile. Called once per
    /// session, never between experiments.
    async fn configure(&self) -> Result<()>;

    /// Programs the output voltage in volts. Does not change output state.
    async fn set_voltage(&self, volts: f64) -> Result<()>;

    /// Programs the output current limit in amps.
    async fn set_current_limit(&self, amps: f64) -> Result<()>;

    /// Enables the output relay.
    async fn output_on(&self) -> Result<()>;

    /// Disables the output relay.
    async fn output_off(&self) -> Result<()>;
}

/// Driver for an HP 66311B-class source meter over a GPIB link.
///
/// Every command is followed by a fixed pause; the instrument needs it to
/// finish the GPIB transaction before the next command arrives.
pub struct GpibPowerSupply {
    link: Box<dyn InstrumentLink>,
    settings: PowerSourceSettings,
    command_delay: Duration,
}

impl GpibPowerSupply {
    pub fn new(
        link: Box<dyn InstrumentLink>,
        settings: PowerSourceSettings,
        command_delay: Duration,
    ) -> Self {
        Self {
            link,
            settings,
            command_delay,
        }
    }

    async fn send(&self, command: &str) -> Result<()> {
        self.link.write(command).await?;
        tokio::time::sleep(self.command_delay).await;
        Ok(())
    }
}

#[async_trait]
impl PowerSource for GpibPowerSupply {
    async fn reset(&self) -> Result<()> {
        debug!("Resetting power source at {}", self.link.resource());
        // Power-on reset sequence: registers back to their default state.
        self.send("*RST").await?;
        self.send("*CLS").await?;
        self.send("STAT:PRES").await?;
        self.send("*SRE 0").await?;
        self.send("*ESE 0").await?;
        Ok(())
    }

    async fn configure(&self) -> Result<()> {
        // Full buffer depth at the fastest sample rate.
        self.send(&format!("SENS:SWE:POIN {}", self.settings.sweep_points))
            .await?;
        self.send(&format!("SENS:SWE:TINT {}", self.settings.sweep_interval_s))
            .await?;
        if let Some(limit) = self.settings.current_limit_amps {
            self.set_current_limit(limit).await?;
        }
        Ok(())
    }

    async fn set_voltage(&self, volts: f64) -> Result<()> {
        self.send(&format!("VOLT {}", volts)).await
    }

    async fn set_current_limit(&self, amps: f64) -> Result<()> {
        self.send(&format!("CURR {}", amps)).await
    }

    async fn output_on(&self) -> Result<()> {
        self.send("OUTP ON").await
    }

    async fn output_off(&self) -> Result<()> {
        self.send("OUTP OFF").await
    }
}
