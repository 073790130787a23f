//! Main loop

use log_sink::{DateTimeSource, LogSink};
use obd_protocol::{Clock, Handshake, HandshakeStatus, SerialTransport};
use obd_scheduler::{PollScheduler, SchedulerStats, StepEvent};
use std::future::Future;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Monotonic clock on the tokio timer, so paused test time drives it too
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Run adapter setup, then poll cycles, one step per tick until `shutdown`
/// resolves.
pub async fn run_until<T, C, S, D, F>(
    mut handshake: Handshake,
    mut scheduler: PollScheduler<T, C, S, D>,
    clock: C,
    tick: Duration,
    shutdown: F,
) -> SchedulerStats
where
    T: SerialTransport,
    C: Clock + Clone,
    S: LogSink,
    D: DateTimeSource,
    F: Future<Output = ()>,
{
    let mut interval = time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tokio::pin!(shutdown);

    info!("Main loop running, tick {}ms", tick.as_millis());

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown requested");
                break;
            }
            _ = interval.tick() => {
                if !handshake.is_done() {
                    if let HandshakeStatus::Done(report) = handshake.step(scheduler.client_mut(), &clock) {
                        debug!("Adapter setup finished: {} commands", report.outcomes.len());
                    }
                    continue;
                }

                if let StepEvent::Advanced { next: None } = scheduler.step() {
                    debug!("Cycle finished, idle until next");
                }
            }
        }
    }

    let stats = scheduler.stats();
    info!(
        "Stopped after {} cycles: {} readings logged, {} failures, {} skipped writes",
        stats.cycles_completed, stats.readings_logged, stats.protocol_failures, stats.writes_skipped
    );
    stats
}
