//! Log Sink
//!
//! Persists readings as `<timestamp>,<value>` lines, one append-only text
//! file per channel.

mod sink;
mod timestamp;

pub use sink::{format_line, FileLogSink, LogSink, SinkConfig};
pub use timestamp::{DateTimeSource, SystemDateTime, TIMESTAMP_FORMAT};

use thiserror::Error;

/// Log sink errors
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid log file name: {0}")]
    InvalidName(String),
    #[error("Sink busy with a previous write")]
    Busy,
}
