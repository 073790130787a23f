//! Logger configuration
//!
//! Built from an optional TOML file layered with `OBDLOG__`-prefixed
//! environment variables, e.g. `OBDLOG__SERIAL__DEVICE=/dev/ttyS1`.

use anyhow::{ensure, Context, Result};
use config::{Config, Environment, File, FileFormat, Map};
use log_sink::SinkConfig;
use obd_protocol::{
    Catalog, ChannelId, ClientConfig, HandshakeConfig, ObdProtocol, DEFAULT_BAUD_RATE,
    DEFAULT_RESPONSE_TIMEOUT_MS,
};
use obd_scheduler::SchedulerConfig;
use serde::{Deserialize, Serialize};

/// Configuration file read when `OBDLOG_CONFIG` is unset
pub const DEFAULT_CONFIG_FILE: &str = "telemetry-logger.toml";

/// Environment variable naming an alternative configuration file
pub const CONFIG_PATH_ENV: &str = "OBDLOG_CONFIG";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "OBDLOG";

/// Device name selecting the built-in simulated adapter
pub const MOCK_DEVICE: &str = "mock";

/// Complete logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub serial: SerialConfig,
    pub protocol: ProtocolConfig,
    pub scheduler: ScheduleConfig,
    pub storage: SinkConfig,
    pub logging: LoggingConfig,
    /// Main loop tick period (ms)
    pub tick_ms: u64,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            protocol: ProtocolConfig::default(),
            scheduler: ScheduleConfig::default(),
            storage: SinkConfig::default(),
            logging: LoggingConfig::default(),
            tick_ms: 10,
        }
    }
}

/// Serial link to the adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Serial device path, or `mock` for the simulated adapter
    pub device: String,
    pub baud_rate: u32,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            device: "/dev/ttyUSB0".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }
}

impl SerialConfig {
    pub fn is_mock(&self) -> bool {
        self.device == MOCK_DEVICE
    }
}

/// Adapter protocol timing
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Timeout for channel requests (ms)
    pub response_timeout_ms: u64,
    /// Delay before adapter setup (ms)
    pub wake_delay_ms: u64,
    /// Timeout for the reset command (ms)
    pub reset_timeout_ms: u64,
    /// Timeout for echo-off and protocol selection (ms)
    pub echo_off_timeout_ms: u64,
    /// Protocol forced after reset
    pub protocol: Option<ObdProtocol>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        let handshake = HandshakeConfig::default();
        Self {
            response_timeout_ms: DEFAULT_RESPONSE_TIMEOUT_MS,
            wake_delay_ms: handshake.wake_delay_ms,
            reset_timeout_ms: handshake.reset_timeout_ms,
            echo_off_timeout_ms: handshake.command_timeout_ms,
            protocol: handshake.protocol,
        }
    }
}

impl ProtocolConfig {
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            response_timeout_ms: self.response_timeout_ms,
        }
    }

    pub fn handshake_config(&self) -> HandshakeConfig {
        HandshakeConfig {
            wake_delay_ms: self.wake_delay_ms,
            reset_timeout_ms: self.reset_timeout_ms,
            command_timeout_ms: self.echo_off_timeout_ms,
            protocol: self.protocol,
        }
    }
}

/// Poll cycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Pause between cycles (ms)
    pub idle_interval_ms: u64,
    /// Consecutive failed cycles before a channel is reported
    pub warn_after_failures: u32,
    /// Channels in poll order
    pub channels: Vec<ChannelId>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            idle_interval_ms: defaults.idle_interval_ms,
            warn_after_failures: defaults.warn_after_failures,
            channels: ChannelId::ALL.to_vec(),
        }
    }
}

impl ScheduleConfig {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            idle_interval_ms: self.idle_interval_ms,
            warn_after_failures: self.warn_after_failures,
        }
    }

    /// Catalog of the configured channels, in configured order
    pub fn catalog(&self) -> Result<Catalog> {
        Catalog::from_ids(&self.channels).context("invalid channel list")
    }
}

/// Diagnostic output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Maximum level: trace, debug, info, warn or error
    pub level: String,
    /// Emit JSON lines instead of human-readable text
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl LoggerConfig {
    /// Load from the file named by `OBDLOG_CONFIG` (or the default file)
    /// and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&path)
    }

    /// Load from the given file, if present, and the environment
    pub fn load_from(path: &str) -> Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Load from the given file, if present, and `OBDLOG__` variables taken
    /// from `env` instead of the process environment when it is `Some`
    pub fn load_with_env(path: &str, env: Option<Map<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::new(path, FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .with_context(|| format!("failed to read configuration from {}", path))?;

        let config: Self = settings
            .try_deserialize()
            .context("failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the logger cannot run with
    pub fn validate(&self) -> Result<()> {
        ensure!(!self.serial.device.is_empty(), "serial.device must not be empty");
        ensure!(self.serial.baud_rate > 0, "serial.baud_rate must be positive");
        ensure!(
            self.protocol.response_timeout_ms > 0,
            "protocol.response_timeout_ms must be positive"
        );
        ensure!(
            self.protocol.reset_timeout_ms > 0,
            "protocol.reset_timeout_ms must be positive"
        );
        ensure!(
            self.protocol.echo_off_timeout_ms > 0,
            "protocol.echo_off_timeout_ms must be positive"
        );
        ensure!(
            self.scheduler.idle_interval_ms > 0,
            "scheduler.idle_interval_ms must be positive"
        );
        ensure!(
            self.scheduler.warn_after_failures > 0,
            "scheduler.warn_after_failures must be positive"
        );
        self.scheduler.catalog()?;
        ensure!(self.tick_ms > 0, "tick_ms must be positive");
        self.logging
            .level
            .parse::<tracing::Level>()
            .map_err(|_| anyhow::anyhow!("unknown logging.level {:?}", self.logging.level))?;
        Ok(())
    }
}
