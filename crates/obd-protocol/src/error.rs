//! OBD-II Error Types

use thiserror::Error;

/// Errors that can occur during OBD-II communication
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObdError {
    /// Serial port connection error
    #[error("Serial port error: {0}")]
    SerialError(String),

    /// A request is already in flight
    #[error("Client busy: a request is already awaiting its response")]
    Busy,

    /// Timeout waiting for the prompt character
    #[error("Timeout waiting for OBD response after {0}ms")]
    Timeout(u64),

    /// Response did not fit into the receive buffer
    #[error("Response overflowed the {capacity} byte receive buffer")]
    Overflow { capacity: usize },

    /// Frame too short or not shaped like a reply to the request
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Channel has no entry in the catalog
    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    /// PID not supported by vehicle
    #[error("PID {0:02X} not supported by vehicle")]
    PidNotSupported(u8),

    /// Decode requested before a frame completed
    #[error("No complete response available to decode")]
    NotReady,

    /// Catalog construction rejected
    #[error("Invalid channel catalog: {0}")]
    InvalidCatalog(String),

    /// Adapter not responding
    #[error("OBD adapter not responding")]
    AdapterNotResponding,
}

impl From<std::io::Error> for ObdError {
    fn from(err: std::io::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}

impl From<tokio_serial::Error> for ObdError {
    fn from(err: tokio_serial::Error) -> Self {
        ObdError::SerialError(err.to_string())
    }
}
