//! Instrument session lifecycle.
//!
//! One session spans the entire batch: both instruments are opened and
//! configured exactly once at startup, their handles are reused by every
//! experiment, and they are dropped only when the orchestrator exits.
//! Configuration is a session property, never reapplied between experiments,
//! so everything the per-experiment code does (voltage, output state,
//! triggered reads) must leave the profiles untouched.
//!
//! Failure to open or configure either instrument is fatal to the whole run;
//! there is no per-experiment recovery from a missing instrument.

use log::info;

use super::link::open_link;
use super::meter::{CurrentMeter, GpibCurrentMeter};
use super::power::{GpibPowerSupply, PowerSource};
use crate::config::InstrumentSettings;
use crate::error::{AppResult, BenchError};

/// The two live instrument handles shared by every experiment.
pub struct InstrumentSession {
    pub power: Box<dyn PowerSource>,
    pub meter: Box<dyn CurrentMeter>,
    power_resource: String,
    meter_resource: String,
}

impl InstrumentSession {
    /// Opens both instruments over the production transport.
    pub async fn open(settings: &InstrumentSettings) -> AppResult<Self> {
        info!("Connecting to test equipment");

        let power_link =
            open_link(&settings.power_source.resource, settings.read_timeout).await?;
        let meter_link = open_link(&settings.multimeter.resource, settings.read_timeout).await?;

        let power = GpibPowerSupply::new(
            power_link,
            settings.power_source.clone(),
            settings.command_delay,
        );
        let meter = GpibCurrentMeter::new(
            meter_link,
            settings.multimeter.clone(),
            settings.command_delay,
        );

        Ok(Self {
            power: Box::new(power),
            meter: Box::new(meter),
            power_resource: settings.power_source.resource.clone(),
            meter_resource: settings.multimeter.resource.clone(),
        })
    }

    /// Builds a session around injected instrument implementations.
    pub fn with_instruments(power: Box<dyn PowerSource>, meter: Box<dyn CurrentMeter>) -> Self {
        Self {
            power,
            meter,
            power_resource: "injected".to_string(),
            meter_resource: "injected".to_string(),
        }
    }

    /// Applies the one-time configuration profiles to both instruments.
    pub async fn configure(&self) -> AppResult<()> {
        self.power
            .reset()
            .await
            .map_err(|source| BenchError::InstrumentConfig {
                resource: self.power_resource.clone(),
                source,
            })?;
        self.power
            .configure()
            .await
            .map_err(|source| BenchError::InstrumentConfig {
                resource: self.power_resource.clone(),
                source,
            })?;
        info!("Power source configured ({})", self.power_resource);

        self.meter
            .configure()
            .await
            .map_err(|source| BenchError::InstrumentConfig {
                resource: self.meter_resource.clone(),
                source,
            })?;
        self.meter
            .arm_continuous()
            .await
            .map_err(|source| BenchError::InstrumentConfig {
                resource: self.meter_resource.clone(),
                source,
            })?;
        info!("Multimeter configured and armed ({})", self.meter_resource);

        Ok(())
    }
}
