//! OBD-II Protocol Definitions and Adapter Setup

use crate::client::{ObdClient, PollStatus};
use crate::error::ObdError;
use crate::transport::{Clock, SerialTransport};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Reset the adapter
pub const CMD_RESET: &str = "ATZ";
/// Stop echoing commands back
pub const CMD_ECHO_OFF: &str = "ATE0";

/// Supported OBD-II protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObdProtocol {
    /// Automatic protocol detection
    #[default]
    Auto,
    /// SAE J1850 PWM (41.6 kbaud)
    J1850Pwm,
    /// SAE J1850 VPW (10.4 kbaud)
    J1850Vpw,
    /// ISO 9141-2 (10.4 kbaud, 5 baud init)
    Iso9141_2,
    /// ISO 14230-4 KWP (slow init, 10.4 kbaud)
    Iso14230_4Kwp,
    /// ISO 14230-4 KWP (fast init, 10.4 kbaud)
    Iso14230_4KwpFast,
    /// ISO 15765-4 CAN (11 bit ID, 500 kbaud)
    Iso15765_4Can11bit500,
    /// ISO 15765-4 CAN (29 bit ID, 500 kbaud)
    Iso15765_4Can29bit500,
    /// ISO 15765-4 CAN (11 bit ID, 250 kbaud)
    Iso15765_4Can11bit250,
    /// ISO 15765-4 CAN (29 bit ID, 250 kbaud)
    Iso15765_4Can29bit250,
}

impl ObdProtocol {
    /// Get the ELM327 AT command for this protocol
    pub fn to_elm_command(&self) -> &'static str {
        match self {
            ObdProtocol::Auto => "ATSP0",
            ObdProtocol::J1850Pwm => "ATSP1",
            ObdProtocol::J1850Vpw => "ATSP2",
            ObdProtocol::Iso9141_2 => "ATSP3",
            ObdProtocol::Iso14230_4Kwp => "ATSP4",
            ObdProtocol::Iso14230_4KwpFast => "ATSP5",
            ObdProtocol::Iso15765_4Can11bit500 => "ATSP6",
            ObdProtocol::Iso15765_4Can29bit500 => "ATSP7",
            ObdProtocol::Iso15765_4Can11bit250 => "ATSP8",
            ObdProtocol::Iso15765_4Can29bit250 => "ATSP9",
        }
    }
}

/// Timing of the adapter setup sequence
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
    /// Wait before the first command, giving the vehicle bus time to wake up
    pub wake_delay_ms: u64,
    /// Timeout for the reset command
    pub reset_timeout_ms: u64,
    /// Timeout for the echo-off and protocol commands
    pub command_timeout_ms: u64,
    /// Protocol to select after reset, `None` keeps the adapter default
    pub protocol: Option<ObdProtocol>,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        Self {
            wake_delay_ms: 2000,
            reset_timeout_ms: 2000,
            command_timeout_ms: 1000,
            protocol: None,
        }
    }
}

/// Outcome of one setup command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub command: &'static str,
    /// Reply text, or the reason there was none
    pub result: Result<String, ObdError>,
}

/// Summary of the setup sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeReport {
    pub outcomes: Vec<CommandOutcome>,
}

impl HandshakeReport {
    /// Whether the adapter answered the reset command. A banner too long
    /// for the response buffer still counts as an answer.
    pub fn adapter_responded(&self) -> bool {
        self.outcomes
            .iter()
            .find(|o| o.command == CMD_RESET)
            .map(|o| matches!(o.result, Ok(_) | Err(ObdError::Overflow { .. })))
            .unwrap_or(false)
    }

    /// Identification banner printed by the adapter on reset
    pub fn adapter_banner(&self) -> Option<&str> {
        let reply = self
            .outcomes
            .iter()
            .find(|o| o.command == CMD_RESET)?
            .result
            .as_ref()
            .ok()?;
        let banner = reply.strip_prefix(CMD_RESET).unwrap_or(reply).trim();
        (!banner.is_empty()).then_some(banner)
    }
}

/// Progress of the setup sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeStatus {
    InProgress,
    Done(HandshakeReport),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Waking { since_ms: Option<u64> },
    Sending(usize),
    Awaiting(usize),
    Finished,
}

/// Non-blocking adapter setup: wake delay, reset, echo off, optional
/// protocol selection. Each reply is discarded; a silent adapter is
/// reported, never fatal.
pub struct Handshake {
    config: HandshakeConfig,
    commands: Vec<(&'static str, u64)>,
    stage: Stage,
    outcomes: Vec<CommandOutcome>,
}

impl Handshake {
    pub fn new(config: HandshakeConfig) -> Self {
        let mut commands = vec![
            (CMD_RESET, config.reset_timeout_ms),
            (CMD_ECHO_OFF, config.command_timeout_ms),
        ];
        if let Some(protocol) = config.protocol {
            commands.push((protocol.to_elm_command(), config.command_timeout_ms));
        }

        Self {
            config,
            commands,
            stage: Stage::Waking { since_ms: None },
            outcomes: Vec::new(),
        }
    }

    /// Advance the sequence by one non-blocking step
    pub fn step<T: SerialTransport, C: Clock>(
        &mut self,
        client: &mut ObdClient<T, C>,
        clock: &C,
    ) -> HandshakeStatus {
        match self.stage {
            Stage::Waking { since_ms } => {
                let now = clock.now_ms();
                let since = since_ms.unwrap_or(now);
                if now.saturating_sub(since) >= self.config.wake_delay_ms {
                    info!("Initializing OBD adapter");
                    self.stage = Stage::Sending(0);
                } else {
                    self.stage = Stage::Waking { since_ms: Some(since) };
                }
            }
            Stage::Sending(index) => {
                let (command, timeout_ms) = self.commands[index];
                client.reset();
                match client.submit_command(command, timeout_ms) {
                    Ok(()) => self.stage = Stage::Awaiting(index),
                    Err(err) => {
                        warn!("Failed to send {}: {}", command, err);
                        self.record(index, Err(err));
                    }
                }
            }
            Stage::Awaiting(index) => {
                let command = self.commands[index].0;
                match client.poll() {
                    PollStatus::Pending => {}
                    PollStatus::Complete => {
                        let reply = client.response().into_owned();
                        debug!("{} -> {:?}", command, reply);
                        self.record(index, Ok(reply));
                    }
                    PollStatus::Failed(err) => {
                        warn!("No usable reply to {}: {}", command, err);
                        let err = match err {
                            ObdError::Timeout(_) => ObdError::AdapterNotResponding,
                            other => other,
                        };
                        self.record(index, Err(err));
                    }
                    PollStatus::Idle => self.stage = Stage::Sending(index),
                }
            }
            Stage::Finished => {}
        }

        if self.stage == Stage::Finished {
            HandshakeStatus::Done(HandshakeReport {
                outcomes: self.outcomes.clone(),
            })
        } else {
            HandshakeStatus::InProgress
        }
    }

    fn record(&mut self, index: usize, result: Result<String, ObdError>) {
        self.outcomes.push(CommandOutcome {
            command: self.commands[index].0,
            result,
        });

        if index + 1 < self.commands.len() {
            self.stage = Stage::Sending(index + 1);
        } else {
            self.stage = Stage::Finished;
            let report = HandshakeReport {
                outcomes: self.outcomes.clone(),
            };
            if report.adapter_responded() {
                info!(
                    "OBD adapter initialized: {}",
                    report.adapter_banner().unwrap_or("unknown adapter")
                );
            } else {
                warn!("OBD adapter did not answer reset, continuing without it");
            }
        }
    }

    /// Whether the sequence has finished
    pub fn is_done(&self) -> bool {
        self.stage == Stage::Finished
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::client::ClientConfig;
    use crate::mock::{ManualClock, ScriptedTransport, SimulatedAdapter, SIMULATED_BANNER};
    use std::sync::Arc;

    fn run<T: SerialTransport>(
        handshake: &mut Handshake,
        client: &mut ObdClient<T, ManualClock>,
        clock: &ManualClock,
        max_ticks: usize,
    ) -> HandshakeReport {
        for _ in 0..max_ticks {
            if let HandshakeStatus::Done(report) = handshake.step(client, clock) {
                return report;
            }
            clock.advance(10);
        }
        panic!("handshake did not finish in {} ticks", max_ticks);
    }

    #[test]
    fn test_protocol_commands() {
        assert_eq!(ObdProtocol::Auto.to_elm_command(), "ATSP0");
        assert_eq!(ObdProtocol::Iso15765_4Can11bit500.to_elm_command(), "ATSP6");
    }

    #[test]
    fn test_handshake_with_simulated_adapter() {
        let clock = ManualClock::new();
        let mut client = ObdClient::new(
            SimulatedAdapter::new(clock.clone()),
            clock.clone(),
            Arc::new(Catalog::standard()),
            ClientConfig::default(),
        );
        let mut handshake = Handshake::new(HandshakeConfig {
            protocol: Some(ObdProtocol::Auto),
            ..Default::default()
        });

        let report = run(&mut handshake, &mut client, &clock, 1000);
        assert!(report.adapter_responded());
        assert_eq!(report.adapter_banner(), Some(SIMULATED_BANNER));
        let commands: Vec<_> = report.outcomes.iter().map(|o| o.command).collect();
        assert_eq!(commands, vec!["ATZ", "ATE0", "ATSP0"]);
        assert!(report.outcomes.iter().all(|o| o.result.is_ok()));
        assert!(handshake.is_done());
    }

    #[test]
    fn test_handshake_waits_for_wake_delay() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut client = ObdClient::new(
            transport.clone(),
            clock.clone(),
            Arc::new(Catalog::standard()),
            ClientConfig::default(),
        );
        let mut handshake = Handshake::new(HandshakeConfig::default());

        assert_eq!(handshake.step(&mut client, &clock), HandshakeStatus::InProgress);
        clock.advance(1999);
        assert_eq!(handshake.step(&mut client, &clock), HandshakeStatus::InProgress);
        assert!(transport.written().is_empty());

        clock.advance(1);
        handshake.step(&mut client, &clock);
        handshake.step(&mut client, &clock);
        assert_eq!(transport.written(), b"ATZ\r");
    }

    #[test]
    fn test_silent_adapter_is_reported_not_fatal() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut client = ObdClient::new(
            transport.clone(),
            clock.clone(),
            Arc::new(Catalog::standard()),
            ClientConfig::default(),
        );
        let mut handshake = Handshake::new(HandshakeConfig {
            wake_delay_ms: 0,
            ..Default::default()
        });

        let report = run(&mut handshake, &mut client, &clock, 1000);
        assert!(!report.adapter_responded());
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.outcomes[0].result, Err(ObdError::AdapterNotResponding));
        assert_eq!(transport.written(), b"ATZ\rATE0\r");
    }

    #[test]
    fn test_oversized_reset_banner_counts_as_response() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut client = ObdClient::new(
            transport.clone(),
            clock.clone(),
            Arc::new(Catalog::standard()),
            ClientConfig::default(),
        );
        let mut handshake = Handshake::new(HandshakeConfig {
            wake_delay_ms: 0,
            ..Default::default()
        });

        handshake.step(&mut client, &clock);
        handshake.step(&mut client, &clock);
        assert_eq!(transport.written(), b"ATZ\r");
        transport.push(b"ELM327 v1.5 (clone) firmware build 2019-10-11\r\r>");

        let report = run(&mut handshake, &mut client, &clock, 1000);
        assert!(matches!(
            report.outcomes[0].result,
            Err(ObdError::Overflow { .. })
        ));
        assert!(report.adapter_responded());
        assert_eq!(report.adapter_banner(), None);
    }
}
