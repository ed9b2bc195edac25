//! A scripted mock transport for tests and instrument-free development.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::link::InstrumentLink;

/// One scripted outcome for a binary read.
#[derive(Clone, Debug)]
pub enum MockRead {
    /// A raw payload handed back to the caller.
    Payload(Vec<u8>),
    /// A transport-level failure.
    LinkError(String),
}

impl MockRead {
    /// A well-formed big-endian 32-bit sample payload.
    pub fn sample(amps: f32) -> Self {
        MockRead::Payload(amps.to_be_bytes().to_vec())
    }
}

/// An [`InstrumentLink`] that records every command and replays a scripted
/// sequence of binary reads.
///
/// Each read waits `read_delay` before resolving, standing in for the
/// instrument's integration time; under Tokio's paused test clock this paces
/// virtual time without real waiting.
pub struct MockLink {
    resource: String,
    commands: Arc<Mutex<Vec<String>>>,
    reads: Mutex<VecDeque<MockRead>>,
    read_delay: Duration,
}

impl MockLink {
    pub fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            commands: Arc::new(Mutex::new(Vec::new())),
            reads: Mutex::new(VecDeque::new()),
            read_delay: Duration::ZERO,
        }
    }

    /// Queues scripted read outcomes, consumed in order.
    pub fn with_reads(self, reads: Vec<MockRead>) -> Self {
        if let Ok(mut queue) = self.reads.lock() {
            queue.extend(reads);
        }
        self
    }

    /// Sets the simulated per-read response time.
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Shares another link's command log, producing one interleaved timeline
    /// across instruments. Binary reads appear in the log as `<read>`.
    pub fn with_shared_log(mut self, log: Arc<Mutex<Vec<String>>>) -> Self {
        self.commands = log;
        self
    }

    /// Shared handle onto the command log, valid after the link is moved
    /// into a driver.
    pub fn command_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.commands.clone()
    }
}

#[async_trait]
impl InstrumentLink for MockLink {
    async fn write(&self, command: &str) -> Result<()> {
        self.commands
            .lock()
            .map_err(|_| anyhow!("mock command log poisoned"))?
            .push(command.to_string());
        Ok(())
    }

    async fn read_binary(&self) -> Result<Vec<u8>> {
        if !self.read_delay.is_zero() {
            tokio::time::sleep(self.read_delay).await;
        }
        self.commands
            .lock()
            .map_err(|_| anyhow!("mock command log poisoned"))?
            .push("<read>".to_string());
        let next = self
            .reads
            .lock()
            .map_err(|_| anyhow!("mock read script poisoned"))?
            .pop_front();
        match next {
            Some(MockRead::Payload(bytes)) => Ok(bytes),
            Some(MockRead::LinkError(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("mock read script exhausted")),
        }
    }

    fn resource(&self) -> &str {
        &self.resource
    }
}
