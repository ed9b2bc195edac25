//! Power rail sequencing state machine.
//!
//! One sequencer instance drives one experiment's rail lifecycle:
//!
//! ```text
//! Off ──power_up_for_programming──▶ PoweringUp ──boot delay──▶ Settling
//!                                                                 │
//!            (device programming happens here)                    │
//!                                                                 ▼
//!        restart_at(target): output off, discharge delay,
//!        target voltage, output on, steady-state delay ────▶ Running
//!                                                                 │
//! Off ◀──inter-experiment delay── PoweringDown ◀──power_down──────┘
//! ```
//!
//! All waits are fixed, empirically tuned constants from
//! [`SequencingSettings`]; the rail gets no feedback from the target, so the
//! ordering of transitions is the whole contract. Requests that arrive in
//! the wrong state are rejected rather than reordered.

use log::{debug, info, warn};
use tokio::time::sleep;

use crate::config::SequencingSettings;
use crate::error::{AppResult, BenchError};
use crate::instrument::PowerSource;

/// Rail lifecycle states.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PowerState {
    Off,
    PoweringUp,
    Settling,
    Running,
    PoweringDown,
}

/// Per-experiment state machine over the shared power source handle.
pub struct PowerSequencer<'a> {
    power: &'a dyn PowerSource,
    timing: &'a SequencingSettings,
    state: PowerState,
}

impl<'a> PowerSequencer<'a> {
    pub fn new(power: &'a dyn PowerSource, timing: &'a SequencingSettings) -> Self {
        Self {
            power,
            timing,
            state: PowerState::Off,
        }
    }

    pub fn state(&self) -> PowerState {
        self.state
    }

    fn guard(&self, expected: &[PowerState], action: &str) -> AppResult<()> {
        if expected.contains(&self.state) {
            Ok(())
        } else {
            Err(BenchError::Sequence(format!(
                "{} requested in state {:?}",
                action, self.state
            )))
        }
    }

    fn command_failed(action: &str, err: anyhow::Error) -> BenchError {
        BenchError::Instrument(format!("{}: {:#}", action, err))
    }

    /// Raises the rail to the programming voltage and waits for the target
    /// to boot. Flashing requires this rail level regardless of the
    /// experiment's test voltage.
    pub async fn power_up_for_programming(&mut self) -> AppResult<()> {
        self.guard(&[PowerState::Off], "power-up")?;
        debug!(
            "Raising rail to programming voltage {} V",
            self.timing.programming_voltage
        );
        self.power
            .set_voltage(self.timing.programming_voltage)
            .await
            .map_err(|e| Self::command_failed("set programming voltage", e))?;
        self.power
            .output_on()
            .await
            .map_err(|e| Self::command_failed("enable output", e))?;
        self.state = PowerState::PoweringUp;

        sleep(self.timing.boot_delay).await;
        self.state = PowerState::Settling;
        Ok(())
    }

    /// Hard power cycle into the experiment's test voltage: output off,
    /// discharge, target voltage, output on, steady-state settle. The target
    /// must be in its measurement loop when sampling begins.
    pub async fn restart_at(&mut self, target_volts: f64) -> AppResult<()> {
        self.guard(&[PowerState::Settling], "restart at test voltage")?;
        info!("Setting up power supply: {} V", target_volts);
        self.power
            .output_off()
            .await
            .map_err(|e| Self::command_failed("disable output", e))?;
        sleep(self.timing.discharge_delay).await;

        self.power
            .set_voltage(target_volts)
            .await
            .map_err(|e| Self::command_failed("set test voltage", e))?;
        self.power
            .output_on()
            .await
            .map_err(|e| Self::command_failed("enable output", e))?;
        sleep(self.timing.steady_state_delay).await;
        self.state = PowerState::Running;
        Ok(())
    }

    /// Drops the rail after the acquisition window and paces the gap to the
    /// next experiment.
    pub async fn power_down(&mut self) -> AppResult<()> {
        self.guard(&[PowerState::Running, PowerState::Settling], "power-down")?;
        self.state = PowerState::PoweringDown;
        self.power
            .output_off()
            .await
            .map_err(|e| Self::command_failed("disable output", e))?;
        sleep(self.timing.inter_experiment_delay).await;
        self.state = PowerState::Off;
        Ok(())
    }

    /// Best-effort output disable from any state. Used on the failure path
    /// so a faulted experiment never leaves the target energized.
    pub async fn force_off(&mut self) -> AppResult<()> {
        if self.state == PowerState::Off {
            return Ok(());
        }
        warn!("Forcing rail off from state {:?}", self.state);
        self.state = PowerState::Off;
        self.power
            .output_off()
            .await
            .map_err(|e| Self::command_failed("force output off", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PowerSourceSettings;
    use crate::instrument::{GpibPowerSupply, MockLink};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn mock_supply() -> (GpibPowerSupply, Arc<Mutex<Vec<String>>>) {
        let link = MockLink::new("mock::power");
        let log = link.command_log();
        (
            GpibPowerSupply::new(
                Box::new(link),
                PowerSourceSettings::default(),
                Duration::ZERO,
            ),
            log,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_sequence_command_order() {
        let (supply, log) = mock_supply();
        let timing = SequencingSettings::default();
        let mut sequencer = PowerSequencer::new(&supply, &timing);

        sequencer.power_up_for_programming().await.unwrap();
        assert_eq!(sequencer.state(), PowerState::Settling);

        sequencer.restart_at(1.85).await.unwrap();
        assert_eq!(sequencer.state(), PowerState::Running);

        sequencer.power_down().await.unwrap();
        assert_eq!(sequencer.state(), PowerState::Off);

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "VOLT 3.3", "OUTP ON", // programming rail
                "OUTP OFF", "VOLT 1.85", "OUTP ON", // hard cycle to test voltage
                "OUTP OFF", // final power-down
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_disable_precedes_target_voltage_precedes_enable() {
        let (supply, log) = mock_supply();
        let timing = SequencingSettings::default();
        let mut sequencer = PowerSequencer::new(&supply, &timing);

        sequencer.power_up_for_programming().await.unwrap();
        sequencer.restart_at(2.0).await.unwrap();

        let commands = log.lock().unwrap().clone();
        let off = commands.iter().position(|c| c == "OUTP OFF").unwrap();
        let volt = commands.iter().position(|c| c == "VOLT 2").unwrap();
        let on = commands
            .iter()
            .rposition(|c| c == "OUTP ON")
            .unwrap();
        assert!(off < volt && volt < on);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_transitions_are_rejected() {
        let (supply, _log) = mock_supply();
        let timing = SequencingSettings::default();
        let mut sequencer = PowerSequencer::new(&supply, &timing);

        assert!(matches!(
            sequencer.restart_at(3.3).await,
            Err(BenchError::Sequence(_))
        ));
        assert!(matches!(
            sequencer.power_down().await,
            Err(BenchError::Sequence(_))
        ));

        sequencer.power_up_for_programming().await.unwrap();
        assert!(matches!(
            sequencer.power_up_for_programming().await,
            Err(BenchError::Sequence(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_off_from_any_state() {
        let (supply, log) = mock_supply();
        let timing = SequencingSettings::default();
        let mut sequencer = PowerSequencer::new(&supply, &timing);

        sequencer.power_up_for_programming().await.unwrap();
        sequencer.force_off().await.unwrap();
        assert_eq!(sequencer.state(), PowerState::Off);
        assert_eq!(log.lock().unwrap().last().map(String::as_str), Some("OUTP OFF"));

        // Already off: a second force is a no-op.
        let before = log.lock().unwrap().len();
        sequencer.force_off().await.unwrap();
        assert_eq!(log.lock().unwrap().len(), before);
    }
}
