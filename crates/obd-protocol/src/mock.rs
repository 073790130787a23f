//! Mock transports and clocks
//!
//! Lets the client, the handshake and the scheduler run without hardware:
//! `ScriptedTransport` and `ManualClock` are shared handles for tests, and
//! `SimulatedAdapter` answers requests like an ELM327 attached to a running
//! engine.

use crate::catalog::{ChannelId, PayloadWidth};
use crate::error::ObdError;
use crate::transport::{Clock, SerialTransport};
use std::cell::{Cell, RefCell};
use std::collections::hash_map::DefaultHasher;
use std::collections::VecDeque;
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Default)]
struct ScriptState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    fail_reads: bool,
    fail_writes: bool,
}

/// Transport fed by the test; clones share the same byte queues
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Rc<RefCell<ScriptState>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make bytes available to the reader
    pub fn push(&self, bytes: &[u8]) {
        self.state.borrow_mut().incoming.extend(bytes.iter().copied());
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        self.state.borrow().written.clone()
    }

    /// Bytes not yet consumed by the reader
    pub fn pending(&self) -> usize {
        self.state.borrow().incoming.len()
    }

    /// Make reads fail with a serial error
    pub fn fail_reads(&self, fail: bool) {
        self.state.borrow_mut().fail_reads = fail;
    }

    /// Make writes fail with a serial error
    pub fn fail_writes(&self, fail: bool) {
        self.state.borrow_mut().fail_writes = fail;
    }
}

impl SerialTransport for ScriptedTransport {
    fn bytes_available(&mut self) -> Result<usize, ObdError> {
        let state = self.state.borrow();
        if state.fail_reads {
            return Err(ObdError::SerialError("scripted read failure".to_string()));
        }
        Ok(state.incoming.len())
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        let mut state = self.state.borrow_mut();
        if state.fail_reads {
            return Err(ObdError::SerialError("scripted read failure".to_string()));
        }
        Ok(state.incoming.pop_front())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        let mut state = self.state.borrow_mut();
        if state.fail_writes {
            return Err(ObdError::SerialError("scripted write failure".to_string()));
        }
        state.written.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ObdError> {
        Ok(())
    }
}

/// Clock that only moves when told to; clones share the same time
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: u64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }
}

/// Adapter identification returned on reset
pub const SIMULATED_BANNER: &str = "ELM327 v1.5";

/// Default delay between a command and its reply
pub const SIMULATED_LATENCY_MS: u64 = 40;

/// Transport that behaves like an ELM327 adapter on a running engine.
///
/// A reply becomes readable only once the configured latency has passed on
/// the adapter's clock, so the client sees several `Pending` polls first.
pub struct SimulatedAdapter<C> {
    clock: C,
    /// Delay before a reply becomes readable
    latency_ms: u64,
    /// Bytes of the command being received
    command: Vec<u8>,
    /// Reply bytes not yet read
    outgoing: VecDeque<u8>,
    /// When the queued reply becomes readable
    ready_at_ms: u64,
    /// Whether the adapter echoes commands
    echo: bool,
    /// Number of requests served, seeds the generated values
    requests: u64,
}

impl<C: Clock> SimulatedAdapter<C> {
    pub fn new(clock: C) -> Self {
        debug!("Creating simulated OBD adapter");
        Self {
            clock,
            latency_ms: SIMULATED_LATENCY_MS,
            command: Vec::new(),
            outgoing: VecDeque::new(),
            ready_at_ms: 0,
            echo: true,
            requests: 0,
        }
    }

    /// Set the reply latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Start with command echo on or off
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    fn respond(&mut self, command: &str) {
        let echo = self.echo;
        let reply = match command {
            "ATZ" => {
                self.echo = true;
                format!("\r\r{}\r\r", SIMULATED_BANNER)
            }
            "ATE0" => {
                self.echo = false;
                "OK\r\r".to_string()
            }
            c if c.starts_with("ATSP") => "OK\r\r".to_string(),
            c => match Self::parse_mode01(c) {
                Some(pid) => self.mode01_reply(pid),
                None => "?\r\r".to_string(),
            },
        };

        if echo {
            self.outgoing.extend(command.bytes());
            self.outgoing.push_back(b'\r');
        }
        self.outgoing.extend(reply.bytes());
        self.outgoing.push_back(b'>');
        self.ready_at_ms = self.clock.now_ms() + self.latency_ms;
    }

    fn parse_mode01(command: &str) -> Option<u8> {
        let pid = command.strip_prefix("01")?;
        if pid.len() != 2 {
            return None;
        }
        u8::from_str_radix(pid, 16).ok()
    }

    /// Generate a plausible reply for a Mode 01 PID
    fn mode01_reply(&mut self, pid: u8) -> String {
        let Some(channel) = ChannelId::ALL.iter().find(|c| c.pid() == pid) else {
            return "NO DATA\r\r".to_string();
        };

        self.requests += 1;
        let mut hasher = DefaultHasher::new();
        self.requests.hash(&mut hasher);
        pid.hash(&mut hasher);
        let hash = hasher.finish();

        let raw: u16 = match channel {
            // Fuel trims: -10% to +10%
            ChannelId::ShortTermFuelTrimBank1
            | ChannelId::LongTermFuelTrimBank1
            | ChannelId::ShortTermFuelTrimBank2
            | ChannelId::LongTermFuelTrimBank2 => 115 + (hash % 26) as u16,
            // Speed: 0-120 km/h
            ChannelId::VehicleSpeed => (hash % 120) as u16,
            // Intake temp: 10-50 °C
            ChannelId::IntakeAirTemp => 50 + (hash % 40) as u16,
            // Run time: up to 2 hours
            ChannelId::RunTimeSinceEngineStart => (self.requests * 15 % 7200) as u16,
            ChannelId::DistanceWithMilOn | ChannelId::TimeRunWithMilOn => 0,
            ChannelId::WarmUpsSinceCodesCleared => 12,
            ChannelId::DistanceSinceCodesCleared => 4210,
            ChannelId::TimeSinceCodesCleared => 9050,
            // Barometric pressure: 98-103 kPa
            ChannelId::BarometricPressure => 98 + (hash % 6) as u16,
            // Absolute load: 20-80%
            ChannelId::AbsoluteLoad => 51 + (hash % 153) as u16,
            // Evap pressure: ~100 kPa
            ChannelId::EvapVaporPressure => 19800 + (hash % 400) as u16,
        };

        match channel.spec().width {
            PayloadWidth::One => format!("41 {:02X} {:02X} \r\r", pid, raw as u8),
            PayloadWidth::Two => format!("41 {:02X} {:02X} {:02X} \r\r", pid, raw >> 8, raw & 0xFF),
        }
    }

    fn is_ready(&self) -> bool {
        self.clock.now_ms() >= self.ready_at_ms
    }
}

impl<C: Clock> SerialTransport for SimulatedAdapter<C> {
    fn bytes_available(&mut self) -> Result<usize, ObdError> {
        if self.is_ready() {
            Ok(self.outgoing.len())
        } else {
            Ok(0)
        }
    }

    fn read_byte(&mut self) -> Result<Option<u8>, ObdError> {
        if !self.is_ready() {
            return Ok(None);
        }
        Ok(self.outgoing.pop_front())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ObdError> {
        for &byte in bytes {
            if byte == b'\r' {
                let command = String::from_utf8_lossy(&self.command).trim().to_uppercase();
                self.command.clear();
                self.respond(&command);
            } else {
                self.command.push(byte);
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), ObdError> {
        Ok(())
    }
}
