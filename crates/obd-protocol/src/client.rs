//! OBD-II Client for ELM327 Adapters
//!
//! Non-blocking request/response client. `submit` writes a request,
//! `poll` is called once per loop tick to collect whatever bytes have
//! arrived, and `decode` turns a completed frame into a reading.

use crate::buffer::{ResponseBuffer, RESPONSE_BUFFER_CAPACITY};
use crate::catalog::{Catalog, ChannelId, ChannelSpec, PayloadWidth, Value};
use crate::catalog::{FIRST_PAYLOAD_OFFSET, SECOND_PAYLOAD_OFFSET};
use crate::error::ObdError;
use crate::transport::{Clock, SerialTransport};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Default timeout for OBD requests
pub const DEFAULT_RESPONSE_TIMEOUT_MS: u64 = 1000;

/// Prompt character the adapter sends when it is ready for the next command
pub const PROMPT: u8 = b'>';

/// Line terminator appended to every request
pub const REQUEST_TERMINATOR: &[u8] = b"\r";

/// Replies echo the request mode with bit 6 set
const MODE_01_REPLY: u8 = crate::mode::CURRENT_DATA + 0x40;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time allowed between a request and its prompt character
    pub response_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
        }
    }
}

/// Exchange state of the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientState {
    /// Nothing submitted
    Idle,
    /// Request written, waiting for the prompt
    Sent,
    /// Frame terminated and ready for decode
    Complete,
    /// Exchange ended without a usable frame
    Failed(ObdError),
}

/// Result of one `poll` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStatus {
    /// No request submitted
    Idle,
    /// Prompt not seen yet, still within the timeout
    Pending,
    /// Prompt seen, frame available
    Complete,
    /// Exchange failed (timeout, overflow, serial error)
    Failed(ObdError),
}

/// A decoded channel value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Channel the value belongs to
    pub channel: ChannelId,
    /// Payload integer before scaling
    pub raw: u32,
    /// Scaled physical value
    pub value: Value,
    /// Monotonic time the decode completed (ms)
    pub decoded_at_ms: u64,
}

/// OBD-II client for communicating with ELM327-compatible adapters
pub struct ObdClient<T, C> {
    /// Link to the adapter
    transport: T,
    /// Monotonic time source
    clock: C,
    /// Channels this client can request and decode
    catalog: Arc<Catalog>,
    /// Configuration
    config: ClientConfig,
    /// Current exchange state
    state: ClientState,
    /// Bytes of the in-flight reply
    buffer: ResponseBuffer<RESPONSE_BUFFER_CAPACITY>,
    /// When the in-flight request was written
    submitted_at_ms: u64,
    /// Timeout of the in-flight request
    timeout_ms: u64,
}

impl<T: SerialTransport, C: Clock> ObdClient<T, C> {
    /// Create a new OBD client
    ///
    /// # Arguments
    /// * `transport` - Link to the adapter
    /// * `clock` - Monotonic clock used for timeouts
    /// * `catalog` - Channels the client may request
    /// * `config` - Client configuration
    pub fn new(transport: T, clock: C, catalog: Arc<Catalog>, config: ClientConfig) -> Self {
        info!(
            "Creating OBD client: {} channels, {}ms response timeout",
            catalog.len(),
            config.response_timeout_ms
        );

        Self {
            transport,
            clock,
            catalog,
            timeout_ms: config.response_timeout_ms,
            config,
            state: ClientState::Idle,
            buffer: ResponseBuffer::new(),
            submitted_at_ms: 0,
        }
    }

    /// Request a channel
    pub fn submit(&mut self, channel: ChannelId) -> Result<(), ObdError> {
        if self.state == ClientState::Sent {
            return Err(ObdError::Busy);
        }
        let code = self
            .catalog
            .get(channel)
            .map(|spec| spec.code)
            .ok_or_else(|| ObdError::UnknownChannel(channel.to_string()))?;

        self.send(code, self.config.response_timeout_ms)
    }

    /// Send a raw adapter command (e.g. "ATZ") with its own timeout
    pub fn submit_command(&mut self, command: &str, timeout_ms: u64) -> Result<(), ObdError> {
        if self.state == ClientState::Sent {
            return Err(ObdError::Busy);
        }
        self.send(command, timeout_ms)
    }

    fn send(&mut self, request: &str, timeout_ms: u64) -> Result<(), ObdError> {
        let stale = self.drain_input()?;
        if stale > 0 {
            debug!("Discarded {} stale bytes before {}", stale, request);
        }

        self.buffer.clear();
        self.transport.write_bytes(request.as_bytes())?;
        self.transport.write_bytes(REQUEST_TERMINATOR)?;
        self.transport.flush()?;

        self.submitted_at_ms = self.clock.now_ms();
        self.timeout_ms = timeout_ms;
        self.state = ClientState::Sent;
        debug!("Sent {}", request);
        Ok(())
    }

    /// Discard bytes left over from an earlier, abandoned exchange
    fn drain_input(&mut self) -> Result<usize, ObdError> {
        let mut drained = 0;
        while self.transport.bytes_available()? > 0 {
            if self.transport.read_byte()?.is_none() {
                break;
            }
            drained += 1;
        }
        Ok(drained)
    }

    /// Collect available bytes and report the exchange status. Never blocks.
    ///
    /// `Complete` and `Failed` are latched: later polls return the same
    /// status without reading until the next `submit` or `reset`.
    pub fn poll(&mut self) -> PollStatus {
        match &self.state {
            ClientState::Idle => return PollStatus::Idle,
            ClientState::Complete => return PollStatus::Complete,
            ClientState::Failed(err) => return PollStatus::Failed(err.clone()),
            ClientState::Sent => {}
        }

        if let Err(err) = self.accumulate() {
            warn!("Serial read failed: {}", err);
            self.state = ClientState::Failed(err.clone());
            return PollStatus::Failed(err);
        }

        match &self.state {
            ClientState::Complete => {
                debug!("Response complete: {:?}", self.buffer.as_str());
                return PollStatus::Complete;
            }
            ClientState::Failed(err) => return PollStatus::Failed(err.clone()),
            _ => {}
        }

        let elapsed = self.clock.now_ms().saturating_sub(self.submitted_at_ms);
        if elapsed > self.timeout_ms {
            debug!("No prompt after {}ms", elapsed);
            let err = ObdError::Timeout(elapsed);
            self.state = ClientState::Failed(err.clone());
            return PollStatus::Failed(err);
        }

        PollStatus::Pending
    }

    /// Move available transport bytes into the buffer until the prompt,
    /// an overflow, or no more input.
    fn accumulate(&mut self) -> Result<(), ObdError> {
        while self.transport.bytes_available()? > 0 {
            let Some(byte) = self.transport.read_byte()? else {
                break;
            };

            match byte {
                PROMPT => {
                    self.state = ClientState::Complete;
                    return Ok(());
                }
                b'\r' | b'\n' => {}
                _ => {
                    if !self.buffer.push(byte) {
                        self.state = ClientState::Failed(ObdError::Overflow {
                            capacity: self.buffer.capacity(),
                        });
                        return Ok(());
                    }
                }
            }
        }
        Ok(())
    }

    /// Decode the completed frame as a reply for `channel`
    pub fn decode(&self, channel: ChannelId) -> Result<Reading, ObdError> {
        if self.state != ClientState::Complete {
            return Err(ObdError::NotReady);
        }
        let spec = self
            .catalog
            .get(channel)
            .ok_or_else(|| ObdError::UnknownChannel(channel.to_string()))?;

        let raw = self.parse_payload(spec)?;
        Ok(Reading {
            channel,
            raw,
            value: spec.formula.apply(raw),
            decoded_at_ms: self.clock.now_ms(),
        })
    }

    fn parse_payload(&self, spec: &ChannelSpec) -> Result<u32, ObdError> {
        let frame = self.buffer.as_str();

        if frame.trim() == "NO DATA" {
            return Err(ObdError::PidNotSupported(spec.pid));
        }
        if self.buffer.len() < spec.width.min_frame_len() {
            return Err(ObdError::Malformed(format!(
                "{:?} is too short for {}",
                frame, spec.code
            )));
        }

        let mode = self.buffer.hex_pair(0);
        let pid = self.buffer.hex_pair(3);
        if mode != Some(MODE_01_REPLY) || pid != Some(spec.pid) {
            return Err(ObdError::Malformed(format!(
                "{:?} is not a reply to {}",
                frame, spec.code
            )));
        }

        let high = self.payload_byte(FIRST_PAYLOAD_OFFSET, &frame)?;
        match spec.width {
            PayloadWidth::One => Ok(high as u32),
            PayloadWidth::Two => {
                let low = self.payload_byte(SECOND_PAYLOAD_OFFSET, &frame)?;
                Ok(high as u32 * 256 + low as u32)
            }
        }
    }

    fn payload_byte(&self, offset: usize, frame: &str) -> Result<u8, ObdError> {
        self.buffer.hex_pair(offset).ok_or_else(|| {
            ObdError::Malformed(format!("{:?} has no hex byte at offset {}", frame, offset))
        })
    }

    /// Abandon the current exchange and return to `Idle`
    pub fn reset(&mut self) {
        if self.state == ClientState::Sent {
            debug!("Abandoning in-flight request");
        }
        self.buffer.clear();
        self.state = ClientState::Idle;
    }

    /// Current exchange state
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    /// Text of the buffered frame
    pub fn response(&self) -> Cow<'_, str> {
        self.buffer.as_str()
    }

    /// Raw bytes of the buffered frame
    pub fn response_bytes(&self) -> &[u8] {
        self.buffer.as_bytes()
    }

    /// Channels known to this client
    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }
}
