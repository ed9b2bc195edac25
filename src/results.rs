//! Per-experiment result persistence.

use log::debug;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::acquisition::SampleSink;

/// Append-only writer for one experiment's result file.
///
/// One formatted amperage per line, six decimal places, flushed after every
/// line so a crash mid-window loses at most the sample in flight. Samples
/// land in exactly the order they were read; nothing is ever rewritten. The
/// file is created at acquisition start and closed when the window elapses,
/// before the next experiment begins.
pub struct ResultsWriter {
    path: PathBuf,
    file: File,
}

impl ResultsWriter {
    /// Creates (or truncates) the result file.
    pub fn create(path: &Path) -> std::io::Result<Self> {
        let file = File::create(path)?;
        debug!("Opened result file {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes and closes the file.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.file.flush()?;
        debug!("Closed result file {}", self.path.display());
        Ok(())
    }
}

impl SampleSink for ResultsWriter {
    fn push(&mut self, amps: f64) -> std::io::Result<()> {
        writeln!(self.file, "{:.6}", amps)?;
        self.file.flush()
    }
}
