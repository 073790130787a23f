//! OBD-II Protocol Implementation
//!
//! Non-blocking request/response client for ELM327-compatible OBD-II UART
//! adapters. Every operation returns immediately; callers drive exchanges by
//! polling once per loop tick.

mod buffer;
pub mod catalog;
mod client;
mod error;
pub mod mock;
mod protocol;
mod transport;

pub use buffer::{ResponseBuffer, RESPONSE_BUFFER_CAPACITY};
pub use catalog::{Catalog, ChannelId, ChannelSpec, FixedPoint, Formula, PayloadWidth, Value};
pub use client::{
    ClientConfig, ClientState, ObdClient, PollStatus, Reading, DEFAULT_RESPONSE_TIMEOUT_MS, PROMPT,
};
pub use error::ObdError;
pub use protocol::{
    CommandOutcome, Handshake, HandshakeConfig, HandshakeReport, HandshakeStatus, ObdProtocol,
};
pub use transport::{
    Clock, SerialPortTransport, SerialTransport, DEFAULT_BAUD_RATE,
};

/// OBD-II mode constants
pub mod mode {
    /// Current data
    pub const CURRENT_DATA: u8 = 0x01;
}
