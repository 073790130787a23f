//! Poll Scheduler Implementation

use log_sink::{format_line, DateTimeSource, LogSink};
use obd_protocol::{
    ChannelId, ChannelSpec, Clock, ObdClient, ObdError, PollStatus, Reading, SerialTransport,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

/// Configuration for the poll scheduler
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Pause between the end of one cycle and the start of the next (ms)
    pub idle_interval_ms: u64,
    /// Consecutive failed cycles before a channel is reported
    pub warn_after_failures: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            idle_interval_ms: 15_000,
            warn_after_failures: 3,
        }
    }
}

/// Scheduler phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Idle between cycles
    WaitingForCycle,
    /// Exchange with the adapter for the current channel
    Requesting,
    /// Handing the current reading to the sink
    Writing,
}

/// Why a channel produced no log line this cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Submit, poll or decode failed
    Protocol(ObdError),
    /// Date/time unavailable
    NoTimestamp,
    /// Sink rejected the write
    Sink(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Protocol(err) => write!(f, "{}", err),
            SkipReason::NoTimestamp => write!(f, "unable to get date/time"),
            SkipReason::Sink(err) => write!(f, "log write failed: {}", err),
        }
    }
}

/// What a single `step` did
#[derive(Debug, Clone, PartialEq)]
pub enum StepEvent {
    /// Inside the idle interval
    Waiting,
    /// Idle interval elapsed, cycle begins with the first channel
    CycleStarted,
    /// Sink still settling, nothing else done
    SinkBusy,
    /// Request written
    Submitted(ChannelId),
    /// Reply not complete yet
    Pending(ChannelId),
    /// Reply decoded, write follows
    Decoded(Reading),
    /// Reading handed to the sink
    Logged { channel: ChannelId, line: String },
    /// Channel skipped for this cycle
    Skipped { channel: ChannelId, reason: SkipReason },
    /// Sink idle again, moved on to the next channel (`None` ends the cycle)
    Advanced { next: Option<ChannelId> },
}

/// Counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub cycles_completed: u64,
    pub readings_logged: u64,
    pub protocol_failures: u64,
    pub writes_skipped: u64,
}

/// Drives the OBD client across the catalog, one bounded step per tick
pub struct PollScheduler<T, C, S, D> {
    /// Protocol client
    client: ObdClient<T, C>,
    /// Monotonic clock shared with the client
    clock: C,
    /// Destination of log lines
    sink: S,
    /// Source of log line timestamps
    stamps: D,
    /// Configuration
    config: SchedulerConfig,
    /// Channels in cycle order
    channels: Vec<ChannelSpec>,
    /// Current phase
    phase: Phase,
    /// Position in the catalog
    index: usize,
    /// Whether the current channel's request has been written
    in_flight: bool,
    /// Reading waiting for, or already handed to, the sink
    pending: Option<Reading>,
    /// Whether `pending` has been written
    written: bool,
    /// When the current cycle began
    cycle_started_ms: u64,
    /// When the previous cycle ended (construction time before the first)
    last_cycle_end_ms: u64,
    /// Consecutive failed cycles per catalog position
    failures: Vec<u32>,
    /// Counters
    stats: SchedulerStats,
}

impl<T, C, S, D> PollScheduler<T, C, S, D>
where
    T: SerialTransport,
    C: Clock + Clone,
    S: LogSink,
    D: DateTimeSource,
{
    /// Create a new scheduler. The first cycle starts one idle interval
    /// after construction.
    pub fn new(client: ObdClient<T, C>, clock: C, sink: S, stamps: D, config: SchedulerConfig) -> Self {
        let channels: Vec<ChannelSpec> = client.catalog().iter().copied().collect();
        let now = clock.now_ms();

        info!(
            "Poll scheduler created with {} channels, {}ms between cycles",
            channels.len(),
            config.idle_interval_ms
        );

        Self {
            client,
            clock,
            sink,
            stamps,
            config,
            failures: vec![0; channels.len()],
            channels,
            phase: Phase::WaitingForCycle,
            index: 0,
            in_flight: false,
            pending: None,
            written: false,
            cycle_started_ms: now,
            last_cycle_end_ms: now,
            stats: SchedulerStats::default(),
        }
    }

    /// Perform one non-blocking step
    pub fn step(&mut self) -> StepEvent {
        match self.phase {
            Phase::WaitingForCycle => self.step_waiting(),
            Phase::Requesting => self.step_requesting(),
            Phase::Writing => self.step_writing(),
        }
    }

    fn step_waiting(&mut self) -> StepEvent {
        let elapsed = self.clock.now_ms().saturating_sub(self.last_cycle_end_ms);
        if elapsed < self.config.idle_interval_ms || self.channels.is_empty() {
            return StepEvent::Waiting;
        }

        self.index = 0;
        self.in_flight = false;
        self.cycle_started_ms = self.clock.now_ms();
        self.phase = Phase::Requesting;
        debug!("Starting poll cycle {}", self.stats.cycles_completed + 1);
        StepEvent::CycleStarted
    }

    fn step_requesting(&mut self) -> StepEvent {
        let channel = self.channels[self.index].id;

        if !self.in_flight {
            if self.sink.is_busy() {
                return StepEvent::SinkBusy;
            }
            return match self.client.submit(channel) {
                Ok(()) => {
                    self.in_flight = true;
                    StepEvent::Submitted(channel)
                }
                Err(err) => self.fail(channel, err),
            };
        }

        match self.client.poll() {
            PollStatus::Pending => StepEvent::Pending(channel),
            PollStatus::Complete => match self.client.decode(channel) {
                Ok(reading) => {
                    self.client.reset();
                    self.in_flight = false;
                    self.failures[self.index] = 0;
                    self.pending = Some(reading.clone());
                    self.written = false;
                    self.phase = Phase::Writing;
                    StepEvent::Decoded(reading)
                }
                Err(err) => {
                    debug!("Undecodable reply {:?}", self.client.response());
                    self.fail(channel, err)
                }
            },
            PollStatus::Failed(err) => self.fail(channel, err),
            // request was discarded by a reset elsewhere
            PollStatus::Idle => self.fail(channel, ObdError::NotReady),
        }
    }

    fn step_writing(&mut self) -> StepEvent {
        if self.written {
            if self.sink.is_busy() {
                return StepEvent::SinkBusy;
            }
            self.pending = None;
            let next = self.advance();
            return StepEvent::Advanced { next };
        }

        if self.sink.is_busy() {
            return StepEvent::SinkBusy;
        }

        let spec = self.channels[self.index];
        let Some(reading) = self.pending.as_ref() else {
            let next = self.advance();
            return StepEvent::Advanced { next };
        };

        let Some(timestamp) = self.stamps.timestamp() else {
            return self.skip_write(spec.id, SkipReason::NoTimestamp);
        };

        let line = format_line(&timestamp, reading.value);
        match self.sink.append(spec.log_name, &line) {
            Ok(()) => {
                self.written = true;
                self.stats.readings_logged += 1;
                debug!("logged {}: {}", spec.log_name, line);
                StepEvent::Logged {
                    channel: spec.id,
                    line,
                }
            }
            Err(err) => self.skip_write(spec.id, SkipReason::Sink(err.to_string())),
        }
    }

    /// Record a failed exchange and move to the next channel without retrying
    fn fail(&mut self, channel: ChannelId, err: ObdError) -> StepEvent {
        self.client.reset();
        self.in_flight = false;
        self.stats.protocol_failures += 1;

        let failures = &mut self.failures[self.index];
        *failures += 1;
        if *failures == self.config.warn_after_failures {
            warn!("{} has failed {} cycles in a row", channel, failures);
        }
        warn!("Skipping {}: {}", channel, err);

        self.advance();
        StepEvent::Skipped {
            channel,
            reason: SkipReason::Protocol(err),
        }
    }

    fn skip_write(&mut self, channel: ChannelId, reason: SkipReason) -> StepEvent {
        warn!("Not logging {}: {}", channel, reason);
        self.stats.writes_skipped += 1;
        self.pending = None;
        self.advance();
        StepEvent::Skipped { channel, reason }
    }

    /// Move to the next channel, or end the cycle after the last one
    fn advance(&mut self) -> Option<ChannelId> {
        self.index += 1;
        self.in_flight = false;
        self.written = false;

        if self.index >= self.channels.len() {
            let now = self.clock.now_ms();
            self.index = 0;
            self.last_cycle_end_ms = now;
            self.stats.cycles_completed += 1;
            self.phase = Phase::WaitingForCycle;
            info!(
                "Poll cycle {} complete in {}ms ({} readings logged so far)",
                self.stats.cycles_completed,
                now.saturating_sub(self.cycle_started_ms),
                self.stats.readings_logged
            );
            None
        } else {
            self.phase = Phase::Requesting;
            Some(self.channels[self.index].id)
        }
    }

    /// Current phase
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Position of the current channel in the cycle
    pub fn channel_index(&self) -> usize {
        self.index
    }

    /// Counters since startup
    pub fn stats(&self) -> SchedulerStats {
        self.stats
    }

    /// Consecutive failed cycles of a channel
    pub fn consecutive_failures(&self, channel: ChannelId) -> Option<u32> {
        self.client
            .catalog()
            .position(channel)
            .map(|i| self.failures[i])
    }

    /// Mutable access to the protocol client, for adapter setup before the
    /// first cycle
    pub fn client_mut(&mut self) -> &mut ObdClient<T, C> {
        &mut self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log_sink::SinkError;
    use obd_protocol::mock::{ManualClock, ScriptedTransport, SimulatedAdapter};
    use obd_protocol::{Catalog, ClientConfig, Value};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::Arc;

    const STAMP: &str = "20191011070503";

    /// Sink that records lines and stays busy for a fixed number of polls
    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Rc<RefCell<Vec<(String, String)>>>,
        busy_left: Rc<Cell<u32>>,
        settle_polls: u32,
    }

    impl RecordingSink {
        fn settling(settle_polls: u32) -> Self {
            Self {
                settle_polls,
                ..Default::default()
            }
        }

        fn files(&self) -> Vec<String> {
            self.lines.borrow().iter().map(|(f, _)| f.clone()).collect()
        }
    }

    impl LogSink for RecordingSink {
        fn is_busy(&mut self) -> bool {
            let left = self.busy_left.get();
            if left > 0 {
                self.busy_left.set(left - 1);
                true
            } else {
                false
            }
        }

        fn append(&mut self, file_name: &str, line: &str) -> Result<(), SinkError> {
            if self.busy_left.get() > 0 {
                return Err(SinkError::Busy);
            }
            self.lines
                .borrow_mut()
                .push((file_name.to_string(), line.to_string()));
            self.busy_left.set(self.settle_polls);
            Ok(())
        }
    }

    struct FixedDateTime(Option<&'static str>);

    impl DateTimeSource for FixedDateTime {
        fn timestamp(&mut self) -> Option<String> {
            self.0.map(str::to_string)
        }
    }

    type TestScheduler<T> = PollScheduler<T, ManualClock, RecordingSink, FixedDateTime>;

    fn scheduler<T: SerialTransport>(
        transport: T,
        clock: &ManualClock,
        ids: &[ChannelId],
        sink: RecordingSink,
        stamps: FixedDateTime,
    ) -> TestScheduler<T> {
        let catalog = Arc::new(Catalog::from_ids(ids).unwrap());
        let client = ObdClient::new(transport, clock.clone(), catalog, ClientConfig::default());
        PollScheduler::new(
            client,
            clock.clone(),
            sink,
            stamps,
            SchedulerConfig {
                idle_interval_ms: 1000,
                warn_after_failures: 2,
            },
        )
    }

    fn run_cycle<T: SerialTransport>(
        scheduler: &mut TestScheduler<T>,
        clock: &ManualClock,
        max_ticks: usize,
    ) -> Vec<StepEvent> {
        let target = scheduler.stats().cycles_completed + 1;
        let mut events = Vec::new();
        for _ in 0..max_ticks {
            events.push(scheduler.step());
            if scheduler.stats().cycles_completed == target {
                return events;
            }
            clock.advance(10);
        }
        panic!("cycle did not complete in {} ticks", max_ticks);
    }

    #[test]
    fn test_first_cycle_waits_for_idle_interval() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed],
            RecordingSink::default(),
            FixedDateTime(Some(STAMP)),
        );

        assert_eq!(scheduler.step(), StepEvent::Waiting);
        clock.advance(999);
        assert_eq!(scheduler.step(), StepEvent::Waiting);
        assert!(transport.written().is_empty());

        clock.advance(1);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.phase(), Phase::Requesting);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        assert_eq!(transport.written(), b"010D\r");
    }

    #[test]
    fn test_cycle_logs_in_catalog_order() {
        let clock = ManualClock::new();
        let adapter = SimulatedAdapter::new(clock.clone()).with_echo(false);
        let sink = RecordingSink::settling(2);
        let mut scheduler = scheduler(
            adapter,
            &clock,
            &[
                ChannelId::VehicleSpeed,
                ChannelId::IntakeAirTemp,
                ChannelId::EvapVaporPressure,
            ],
            sink.clone(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        run_cycle(&mut scheduler, &clock, 500);

        assert_eq!(
            sink.files(),
            vec!["speed.txt", "intaketemp.txt", "absevapvaporpressure.txt"]
        );
        let lines = sink.lines.borrow();
        for (_, line) in lines.iter() {
            assert!(line.starts_with("20191011070503,"), "{}", line);
        }
        // evap pressure carries three decimals
        assert_eq!(lines[2].1.rsplit('.').next().map(str::len), Some(3));
        drop(lines);

        let stats = scheduler.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.readings_logged, 3);
        assert_eq!(stats.protocol_failures, 0);
        assert_eq!(scheduler.phase(), Phase::WaitingForCycle);
        assert_eq!(scheduler.channel_index(), 0);
    }

    #[test]
    fn test_no_submit_while_sink_busy() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed, ChannelId::IntakeAirTemp],
            RecordingSink::settling(3),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        transport.push(b"41 0D 1E \r\r>");

        match scheduler.step() {
            StepEvent::Decoded(reading) => assert_eq!(reading.value, Value::Integer(30)),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            scheduler.step(),
            StepEvent::Logged {
                channel: ChannelId::VehicleSpeed,
                line: "20191011070503,30".to_string(),
            }
        );

        for _ in 0..3 {
            assert_eq!(scheduler.step(), StepEvent::SinkBusy);
            assert_eq!(transport.written(), b"010D\r");
        }

        assert_eq!(
            scheduler.step(),
            StepEvent::Advanced {
                next: Some(ChannelId::IntakeAirTemp)
            }
        );
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::IntakeAirTemp));
        assert_eq!(transport.written(), b"010D\r010F\r");
    }

    #[test]
    fn test_failed_channel_is_skipped_without_retry() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let sink = RecordingSink::default();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed, ChannelId::IntakeAirTemp],
            sink.clone(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        let events = run_cycle(&mut scheduler, &clock, 1000);

        assert_eq!(transport.written(), b"010D\r010F\r");
        assert!(events.iter().any(|e| matches!(
            e,
            StepEvent::Skipped {
                channel: ChannelId::VehicleSpeed,
                reason: SkipReason::Protocol(ObdError::Timeout(_)),
            }
        )));
        assert!(sink.files().is_empty());
        assert_eq!(scheduler.stats().protocol_failures, 2);
        assert_eq!(scheduler.consecutive_failures(ChannelId::VehicleSpeed), Some(1));
        assert_eq!(scheduler.consecutive_failures(ChannelId::BarometricPressure), None);
    }

    #[test]
    fn test_failure_counter_resets_on_success() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed],
            RecordingSink::default(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        transport.push(b"NO DATA\r\r>");
        assert!(matches!(
            scheduler.step(),
            StepEvent::Skipped {
                reason: SkipReason::Protocol(ObdError::PidNotSupported(_)),
                ..
            }
        ));
        assert_eq!(scheduler.phase(), Phase::WaitingForCycle);
        assert_eq!(scheduler.consecutive_failures(ChannelId::VehicleSpeed), Some(1));

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        transport.push(b"41 0D 2A \r\r>");
        assert!(matches!(scheduler.step(), StepEvent::Decoded(_)));
        assert_eq!(scheduler.consecutive_failures(ChannelId::VehicleSpeed), Some(0));
        assert_eq!(
            scheduler.step(),
            StepEvent::Logged {
                channel: ChannelId::VehicleSpeed,
                line: "20191011070503,42".to_string(),
            }
        );
    }

    #[test]
    fn test_missing_timestamp_skips_write() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let sink = RecordingSink::default();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed, ChannelId::IntakeAirTemp],
            sink.clone(),
            FixedDateTime(None),
        );

        clock.advance(1000);
        scheduler.step();
        scheduler.step();
        transport.push(b"41 0D 1E \r\r>");
        assert!(matches!(scheduler.step(), StepEvent::Decoded(_)));
        assert_eq!(
            scheduler.step(),
            StepEvent::Skipped {
                channel: ChannelId::VehicleSpeed,
                reason: SkipReason::NoTimestamp,
            }
        );

        assert!(sink.files().is_empty());
        assert_eq!(scheduler.stats().writes_skipped, 1);
        assert_eq!(scheduler.channel_index(), 1);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::IntakeAirTemp));
    }

    #[test]
    fn test_next_cycle_after_idle_interval() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        transport.fail_writes(true);
        let mut scheduler = scheduler(
            transport,
            &clock,
            &[ChannelId::VehicleSpeed],
            RecordingSink::default(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert!(matches!(
            scheduler.step(),
            StepEvent::Skipped {
                reason: SkipReason::Protocol(ObdError::SerialError(_)),
                ..
            }
        ));
        assert_eq!(scheduler.stats().cycles_completed, 1);

        clock.advance(999);
        assert_eq!(scheduler.step(), StepEvent::Waiting);
        clock.advance(1);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
    }

    #[test]
    fn test_discarded_request_is_skipped_not_resent() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed, ChannelId::IntakeAirTemp],
            RecordingSink::default(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        scheduler.client_mut().reset();

        assert_eq!(
            scheduler.step(),
            StepEvent::Skipped {
                channel: ChannelId::VehicleSpeed,
                reason: SkipReason::Protocol(ObdError::NotReady),
            }
        );
        assert_eq!(transport.written(), b"010D\r");
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::IntakeAirTemp));
        assert_eq!(transport.written(), b"010D\r010F\r");
    }

    #[test]
    fn test_standard_catalog_full_cycles() {
        let clock = ManualClock::new();
        let adapter = SimulatedAdapter::new(clock.clone()).with_echo(false);
        let sink = RecordingSink::settling(1);
        let mut scheduler = scheduler(
            adapter,
            &clock,
            &ChannelId::ALL,
            sink.clone(),
            FixedDateTime(Some(STAMP)),
        );
        let expected: Vec<String> = Catalog::standard()
            .iter()
            .map(|c| c.log_name.to_string())
            .collect();

        clock.advance(1000);
        run_cycle(&mut scheduler, &clock, 2000);
        assert_eq!(sink.files(), expected);

        run_cycle(&mut scheduler, &clock, 2000);
        let files = sink.files();
        assert_eq!(files.len(), 30);
        assert_eq!(&files[15..], expected.as_slice());

        let stats = scheduler.stats();
        assert_eq!(stats.cycles_completed, 2);
        assert_eq!(stats.readings_logged, 30);
        assert_eq!(stats.protocol_failures, 0);
        assert_eq!(stats.writes_skipped, 0);
    }

    #[test]
    fn test_wraps_after_failed_last_channel() {
        let clock = ManualClock::new();
        let transport = ScriptedTransport::new();
        let sink = RecordingSink::default();
        let mut scheduler = scheduler(
            transport.clone(),
            &clock,
            &[ChannelId::VehicleSpeed, ChannelId::IntakeAirTemp],
            sink.clone(),
            FixedDateTime(Some(STAMP)),
        );

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
        transport.push(b"41 0D 1E \r\r>");
        assert!(matches!(scheduler.step(), StepEvent::Decoded(_)));
        assert!(matches!(scheduler.step(), StepEvent::Logged { .. }));
        assert_eq!(
            scheduler.step(),
            StepEvent::Advanced {
                next: Some(ChannelId::IntakeAirTemp)
            }
        );
        assert_eq!(scheduler.channel_index(), 1);

        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::IntakeAirTemp));
        transport.push(b"NO DATA\r\r>");
        assert!(matches!(
            scheduler.step(),
            StepEvent::Skipped {
                channel: ChannelId::IntakeAirTemp,
                ..
            }
        ));

        assert_eq!(scheduler.phase(), Phase::WaitingForCycle);
        assert_eq!(scheduler.channel_index(), 0);
        assert_eq!(scheduler.stats().cycles_completed, 1);
        assert_eq!(scheduler.consecutive_failures(ChannelId::IntakeAirTemp), Some(1));
        assert_eq!(sink.files(), vec!["speed.txt"]);

        clock.advance(1000);
        assert_eq!(scheduler.step(), StepEvent::CycleStarted);
        assert_eq!(scheduler.step(), StepEvent::Submitted(ChannelId::VehicleSpeed));
    }
}
