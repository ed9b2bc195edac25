//! Integration tests for whole-batch execution.
//!
//! These drive the orchestrator end-to-end over mock instrument links with
//! Tokio's paused test clock, so the multi-second settle delays and the
//! acquisition window elapse in virtual time. The external flash tool is
//! either the real process path (`true`/`false`) or an injected stub.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

use powerbench::catalog::ExperimentDescriptor;
use powerbench::config::{MultimeterSettings, PowerSourceSettings, Settings};
use powerbench::error::{AppResult, BenchError};
use powerbench::instrument::mock::{MockLink, MockRead};
use powerbench::instrument::{GpibCurrentMeter, GpibPowerSupply, InstrumentSession};
use powerbench::manifest::OutcomeStatus;
use powerbench::orchestrator::Orchestrator;
use powerbench::programmer::{JlinkProgrammer, TargetProgrammer};

/// Per-read response time of the mock meter, in virtual time.
const READ_INTERVAL: Duration = Duration::from_millis(150);

fn experiment_dir(root: &Path, name: &str, with_firmware: bool) -> ExperimentDescriptor {
    let dir = root.join(name);
    std::fs::create_dir_all(&dir).unwrap();
    let descriptor = ExperimentDescriptor::parse(name, dir).unwrap();
    if with_firmware {
        std::fs::write(descriptor.firmware_path(), b"S00600004844521B\n").unwrap();
    }
    descriptor
}

fn test_settings(root: &Path, window: Duration) -> Settings {
    let mut settings = Settings::default();
    settings.catalog.root_dir = root.to_path_buf();
    settings.acquisition.window = window;
    settings.programmer.command = "true".to_string();
    settings.programmer.script_path = root.join("scratch.jlink");
    settings
}

/// Builds a session over mock links sharing one command timeline.
fn mock_session(reads: Vec<MockRead>) -> (InstrumentSession, Arc<Mutex<Vec<String>>>) {
    let power_link = MockLink::new("mock::power");
    let timeline = power_link.command_log();
    let meter_link = MockLink::new("mock::meter")
        .with_shared_log(timeline.clone())
        .with_reads(reads)
        .with_read_delay(READ_INTERVAL);

    let session = InstrumentSession::with_instruments(
        Box::new(GpibPowerSupply::new(
            Box::new(power_link),
            PowerSourceSettings::default(),
            Duration::ZERO,
        )),
        Box::new(GpibCurrentMeter::new(
            Box::new(meter_link),
            MultimeterSettings::default(),
            Duration::ZERO,
        )),
    );
    (session, timeline)
}

fn stop_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

struct FailingProgrammer {
    fail_for: String,
}

#[async_trait]
impl TargetProgrammer for FailingProgrammer {
    async fn program(&self, descriptor: &ExperimentDescriptor) -> AppResult<()> {
        if descriptor.dir_name == self.fail_for {
            Err(BenchError::Program {
                experiment: descriptor.dir_name.clone(),
                reason: "exit status: 1".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

// =============================================================================
// End-to-end scenario
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_single_experiment_end_to_end() {
    let root = tempfile::tempdir().unwrap();
    let descriptor = experiment_dir(root.path(), "EXP00-1_85-1500000", true);

    let values = [0.011f32, 0.012, 0.0115, 0.0118, 0.0119];
    let reads = values.iter().map(|v| MockRead::sample(*v)).collect();
    let (session, timeline) = mock_session(reads);
    session.configure().await.unwrap();

    // Five reads at 150 ms fit a 700 ms window exactly.
    let settings = test_settings(root.path(), Duration::from_millis(700));
    let programmer = JlinkProgrammer::new(settings.programmer.clone());
    let (_tx, rx) = stop_channel();

    let orchestrator = Orchestrator::new(session, Box::new(programmer), settings, rx);
    let manifest = orchestrator.run(std::slice::from_ref(&descriptor)).await;

    assert_eq!(manifest.completed(), 1);
    assert_eq!(manifest.outcomes[0].status, OutcomeStatus::Completed);
    assert_eq!(manifest.outcomes[0].samples, 5);

    let contents = std::fs::read_to_string(descriptor.results_path()).unwrap();
    assert_eq!(
        contents,
        "0.011000\n0.012000\n0.011500\n0.011800\n0.011900\n"
    );

    // The rail is cycled before sampling: the last output-enable precedes the
    // first multimeter read, with the test voltage set in between.
    let commands = timeline.lock().unwrap().clone();
    let first_read = commands.iter().position(|c| c == "<read>").unwrap();
    let last_on = commands[..first_read]
        .iter()
        .rposition(|c| c == "OUTP ON")
        .unwrap();
    let off_before = commands[..last_on]
        .iter()
        .rposition(|c| c == "OUTP OFF")
        .unwrap();
    let volt_target = commands[..last_on]
        .iter()
        .rposition(|c| c == "VOLT 1.85")
        .unwrap();
    assert!(off_before < volt_target && volt_target < last_on && last_on < first_read);

    // Rail is off once the batch ends.
    assert_eq!(commands.last().map(String::as_str), Some("OUTP OFF"));
}

// =============================================================================
// Failure isolation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_program_failure_does_not_abort_the_batch() {
    let root = tempfile::tempdir().unwrap();
    let first = experiment_dir(root.path(), "EXP00-1_85-1500000", true);
    let second = experiment_dir(root.path(), "EXP01-3_3-6000000", true);

    let (session, _timeline) = mock_session(vec![
        MockRead::sample(0.021),
        MockRead::sample(0.022),
    ]);
    let settings = test_settings(root.path(), Duration::from_millis(400));
    let programmer = FailingProgrammer {
        fail_for: first.dir_name.clone(),
    };
    let (_tx, rx) = stop_channel();

    let orchestrator = Orchestrator::new(session, Box::new(programmer), settings, rx);
    let manifest = orchestrator
        .run(&[first.clone(), second.clone()])
        .await;

    assert_eq!(manifest.failed(), 1);
    assert_eq!(manifest.completed(), 1);
    assert_eq!(manifest.outcomes[0].status, OutcomeStatus::Failed);
    assert_eq!(manifest.outcomes[1].status, OutcomeStatus::Completed);

    // The failed experiment never opened a result file; the second did.
    assert!(!first.results_path().exists());
    assert!(second.results_path().exists());
}

// =============================================================================
// Degenerate acquisition
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_window_of_corrupt_reads_yields_an_empty_result_file() {
    let root = tempfile::tempdir().unwrap();
    let descriptor = experiment_dir(root.path(), "EXP02-2_0-3000000", true);

    // Every read fails to decode; the run is still a success.
    let (session, _timeline) = mock_session(vec![
        MockRead::Payload(vec![0x3d]),
        MockRead::LinkError("bus collision".to_string()),
    ]);
    let settings = test_settings(root.path(), Duration::from_millis(600));
    let programmer = JlinkProgrammer::new(settings.programmer.clone());
    let (_tx, rx) = stop_channel();

    let orchestrator = Orchestrator::new(session, Box::new(programmer), settings, rx);
    let manifest = orchestrator.run(std::slice::from_ref(&descriptor)).await;

    assert_eq!(manifest.completed(), 1);
    assert_eq!(manifest.outcomes[0].samples, 0);
    assert!(manifest.outcomes[0].decode_failures > 0);
    assert_eq!(
        std::fs::read_to_string(descriptor.results_path()).unwrap(),
        ""
    );
}

// =============================================================================
// Stop signal
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_stop_signal_powers_down_and_skips_the_rest() {
    let root = tempfile::tempdir().unwrap();
    let first = experiment_dir(root.path(), "EXP00-1_85-1500000", true);
    let second = experiment_dir(root.path(), "EXP01-3_3-6000000", true);

    let (session, timeline) = mock_session(vec![MockRead::sample(0.011)]);
    let settings = test_settings(root.path(), Duration::from_secs(30));
    let programmer = JlinkProgrammer::new(settings.programmer.clone());
    let (tx, rx) = stop_channel();

    // Raise the stop while the first experiment is still settling.
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(true);
    });

    let orchestrator = Orchestrator::new(session, Box::new(programmer), settings, rx);
    let manifest = orchestrator
        .run(&[first.clone(), second.clone()])
        .await;

    // The in-flight experiment closes its file and powers down; the rest of
    // the catalog is skipped.
    assert_eq!(manifest.completed(), 1);
    assert_eq!(manifest.skipped(), 1);
    assert_eq!(manifest.outcomes[0].samples, 0);
    assert!(first.results_path().exists());
    assert!(!second.results_path().exists());

    let commands = timeline.lock().unwrap().clone();
    assert_eq!(commands.last().map(String::as_str), Some("OUTP OFF"));
}
