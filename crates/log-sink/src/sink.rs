//! Append-Only File Sink

use crate::SinkError;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Destination for log lines.
///
/// A sink may need time to settle after a write; while `is_busy` returns
/// true callers must not start new work that depends on it.
pub trait LogSink {
    /// Whether a previous write is still settling
    fn is_busy(&mut self) -> bool;

    /// Append one line to the named log
    fn append(&mut self, file_name: &str, line: &str) -> Result<(), SinkError>;
}

impl<S: LogSink + ?Sized> LogSink for Box<S> {
    fn is_busy(&mut self) -> bool {
        (**self).is_busy()
    }

    fn append(&mut self, file_name: &str, line: &str) -> Result<(), SinkError> {
        (**self).append(file_name, line)
    }
}

/// Format a persisted log line
pub fn format_line(timestamp: &str, value: impl Display) -> String {
    format!("{},{}", timestamp, value)
}

/// File sink configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Directory holding one log file per channel
    pub log_dir: PathBuf,
    /// Time the sink stays busy after each write (ms)
    pub write_settle_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            write_settle_ms: 30,
        }
    }
}

/// Sink writing each log to its own append-only file
pub struct FileLogSink {
    /// Log directory
    dir: PathBuf,
    /// Busy window after each write
    settle: Duration,
    /// End of the current busy window
    busy_until: Option<Instant>,
    /// Total lines written (for statistics)
    lines_written: u64,
}

impl FileLogSink {
    /// Create the sink, creating the log directory if needed
    pub fn new(config: &SinkConfig) -> Result<Self, SinkError> {
        fs::create_dir_all(&config.log_dir).map_err(|source| SinkError::Io {
            path: config.log_dir.display().to_string(),
            source,
        })?;
        info!("Logging readings under {}", config.log_dir.display());

        Ok(Self {
            dir: config.log_dir.clone(),
            settle: Duration::from_millis(config.write_settle_ms),
            busy_until: None,
            lines_written: 0,
        })
    }

    /// Get total lines written
    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    fn path_for(&self, file_name: &str) -> Result<PathBuf, SinkError> {
        let valid = !file_name.is_empty()
            && file_name != "."
            && file_name != ".."
            && !file_name.contains(|c: char| c == '/' || c == '\\');
        if !valid {
            return Err(SinkError::InvalidName(file_name.to_string()));
        }
        Ok(self.dir.join(file_name))
    }
}

impl LogSink for FileLogSink {
    fn is_busy(&mut self) -> bool {
        match self.busy_until {
            Some(until) if Instant::now() < until => true,
            _ => {
                self.busy_until = None;
                false
            }
        }
    }

    fn append(&mut self, file_name: &str, line: &str) -> Result<(), SinkError> {
        if self.is_busy() {
            return Err(SinkError::Busy);
        }

        let path = self.path_for(file_name)?;
        let io_err = |source| SinkError::Io {
            path: path.display().to_string(),
            source,
        };

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(io_err)?;
        writeln!(file, "{}", line).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;

        self.lines_written += 1;
        if !self.settle.is_zero() {
            self.busy_until = Some(Instant::now() + self.settle);
        }
        debug!("logged to {}: {}", file_name, line);
        Ok(())
    }
}
