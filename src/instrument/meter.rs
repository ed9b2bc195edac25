//! Multimeter capability, its GPIB driver, and binary sample decoding.
//!
//! The meter streams each reading as a signed 32-bit IEEE-754 value in
//! big-endian byte order (the instrument's `SREAL` output format). Bus noise
//! regularly corrupts or truncates individual payloads; a failed decode is an
//! expected per-read outcome, reported as [`SampleError`] and absorbed by the
//! acquisition loop rather than surfaced.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Buf;
use log::debug;
use std::time::Duration;
use thiserror::Error;

use super::link::InstrumentLink;
use crate::config::MultimeterSettings;

/// A single failed read attempt. Never fatal; the loop logs it and moves on.
#[derive(Error, Debug)]
pub enum SampleError {
    #[error("truncated sample payload ({0} bytes)")]
    Truncated(usize),

    #[error("non-finite sample value")]
    NonFinite,

    #[error("read failed: {0}")]
    Link(#[source] anyhow::Error),
}

/// Capability of the instrument sampling the target's current draw.
#[async_trait]
pub trait CurrentMeter: Send + Sync {
    /// Applies the one-time measurement profile (mode, integration,
    /// output encoding). Called once per session.
    async fn configure(&self) -> Result<()>;

    /// Arms continuous triggering; readings flow on every subsequent read.
    async fn arm_continuous(&self) -> Result<()>;

    /// Issues one blocking read and decodes it into amps.
    async fn read_sample(&self) -> Result<f64, SampleError>;
}

/// Driver for an HP 3457A-class bench multimeter over a GPIB link.
pub struct GpibCurrentMeter {
    link: Box<dyn InstrumentLink>,
    settings: MultimeterSettings,
    command_delay: Duration,
}

impl GpibCurrentMeter {
    pub fn new(
        link: Box<dyn InstrumentLink>,
        settings: MultimeterSettings,
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

/// Decodes one `SREAL` payload: the first four bytes hold a big-endian f32.
pub(crate) fn decode_sample(payload: &[u8]) -> Result<f64, SampleError> {
    let mut buf = payload;
    if buf.remaining() < 4 {
        return Err(SampleError::Truncated(payload.len()));
    }
    let amps = f64::from(buf.get_f32());
    if !amps.is_finite() {
        return Err(SampleError::NonFinite);
    }
    Ok(amps)
}

#[async_trait]
impl CurrentMeter for GpibCurrentMeter {
    async fn configure(&self) -> Result<()> {
        debug!("Configuring multimeter at {}", self.link.resource());
        self.send("RESET").await?;
        self.send("BEEP OFF").await?;
        // Mandatory for reads over the bus.
        self.send("END ALWAYS").await?;
        match self.settings.current_range_amps {
            Some(range) => self.send(&format!("DCI {}", range)).await?,
            None => self.send("DCI").await?,
        }
        self.send(&format!("NPLC {}", self.settings.nplc)).await?;
        self.send("AZERO 0").await?;
        self.send("DISP OFF").await?;
        self.send("OFORMAT SREAL").await?;
        Ok(())
    }

    async fn arm_continuous(&self) -> Result<()> {
        self.send("TARM AUTO").await
    }

    async fn read_sample(&self) -> Result<f64, SampleError> {
        let payload = self.link.read_binary().await.map_err(SampleError::Link)?;
        decode_sample(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instrument::mock::{MockLink, MockRead};

    #[test]
    fn test_decode_valid_payload() {
        let amps = decode_sample(&0.0115f32.to_be_bytes()).unwrap();
        assert!((amps - 0.0115).abs() < 1e-6);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        let mut payload = 0.012f32.to_be_bytes().to_vec();
        payload.extend_from_slice(b"\r\n");
        let amps = decode_sample(&payload).unwrap();
        assert!((amps - 0.012).abs() < 1e-6);
    }

    #[test]
    fn test_decode_truncated_payload() {
        assert!(matches!(
            decode_sample(&[0x3d, 0x4c]),
            Err(SampleError::Truncated(2))
        ));
    }

    #[test]
    fn test_decode_non_finite_payload() {
        assert!(matches!(
            decode_sample(&f32::NAN.to_be_bytes()),
            Err(SampleError::NonFinite)
        ));
    }

    #[tokio::test]
    async fn test_configure_profile_order() {
        let link = MockLink::new("mock::meter");
        let log = link.command_log();
        let meter = GpibCurrentMeter::new(
            Box::new(link),
            MultimeterSettings::default(),
            Duration::ZERO,
        );

        meter.configure().await.unwrap();
        meter.arm_continuous().await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec![
                "RESET",
                "BEEP OFF",
                "END ALWAYS",
                "DCI",
                "NPLC 1",
                "AZERO 0",
                "DISP OFF",
                "OFORMAT SREAL",
                "TARM AUTO",
            ]
        );
    }

    #[tokio::test]
    async fn test_fixed_range_is_passed_through() {
        let link = MockLink::new("mock::meter");
        let log = link.command_log();
        let settings = MultimeterSettings {
            current_range_amps: Some(0.03),
            nplc: 0.0,
            ..MultimeterSettings::default()
        };
        let meter = GpibCurrentMeter::new(Box::new(link), settings, Duration::ZERO);

        meter.configure().await.unwrap();

        let commands = log.lock().unwrap().clone();
        assert!(commands.contains(&"DCI 0.03".to_string()));
        assert!(commands.contains(&"NPLC 0".to_string()));
    }

    #[tokio::test]
    async fn test_read_sample_reports_link_errors() {
        let link = MockLink::new("mock::meter")
            .with_reads(vec![MockRead::LinkError("bus collision".to_string())]);
        let meter = GpibCurrentMeter::new(
            Box::new(link),
            MultimeterSettings::default(),
            Duration::ZERO,
        );

        assert!(matches!(
            meter.read_sample().await,
            Err(SampleError::Link(_))
        ));
    }
}
