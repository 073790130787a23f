//! OBD-II Telemetry Logger
//!
//! Wires the protocol client, the poll scheduler and the file sink
//! together and drives them from a single tick loop.

pub mod config;
mod runtime;

pub use config::{LoggerConfig, LoggingConfig};
pub use runtime::{run_until, TokioClock};

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize tracing
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level: Level = config
        .level
        .parse()
        .map_err(|_| anyhow!("unknown log level {:?}", config.level))?;

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}
