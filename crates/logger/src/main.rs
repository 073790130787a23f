//! OBD-II Telemetry Logger - Main Entry Point

use anyhow::{Context, Result};
use log_sink::{FileLogSink, SystemDateTime};
use obd_protocol::mock::SimulatedAdapter;
use obd_protocol::{Handshake, ObdClient, SerialPortTransport, SerialTransport};
use obd_scheduler::PollScheduler;
use std::sync::Arc;
use std::time::Duration;
use telemetry_logger::{init_logging, run_until, LoggerConfig, TokioClock};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = LoggerConfig::load()?;
    init_logging(&config.logging)?;

    info!("=== OBD-II Telemetry Logger v{} ===", env!("CARGO_PKG_VERSION"));

    let clock = TokioClock::new();
    let transport: Box<dyn SerialTransport> = if config.serial.is_mock() {
        info!("Using simulated OBD adapter");
        Box::new(SimulatedAdapter::new(clock))
    } else {
        let port = SerialPortTransport::open(&config.serial.device, config.serial.baud_rate)
            .with_context(|| format!("failed to open {}", config.serial.device))?;
        Box::new(port)
    };

    let catalog = Arc::new(config.scheduler.catalog()?);
    let client = ObdClient::new(transport, clock, catalog, config.protocol.client_config());
    let sink = FileLogSink::new(&config.storage)?;
    let scheduler = PollScheduler::new(
        client,
        clock,
        sink,
        SystemDateTime,
        config.scheduler.scheduler_config(),
    );
    let handshake = Handshake::new(config.protocol.handshake_config());

    let shutdown = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!("Unable to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    run_until(
        handshake,
        scheduler,
        clock,
        Duration::from_millis(config.tick_ms),
        shutdown,
    )
    .await;

    Ok(())
}
