//! ---
//! rhome_section: "01-core-functionality"
//! rhome_subsection: "module"
//! rhome_type: "source"
//! rhome_scope: "code"
//! rhome_description: "Dispatch loop, handlers and schedule lookup."
//! rhome_version: "v0.1.0"
//! rhome_owner: "tbd"
//! ---
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rhome_common::config::AppConfig;
use rhome_msg::{
    peek_type_tag, DecodeError, Endpoint, GetDeviceScheduledState, Heartbeat, Message,
    MessageKind, MessageQueue, MessageTypes, RefNumGenerator, WireMessage,
};
use tracing::{debug, error, info};

use crate::handlers::{build_heartbeats, handle_get_device_scheduled_state, handle_heartbeat};
use crate::schedule::{OracleError, ScheduleOracle};

/// Reasons an inbound line is dropped without a response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The line, or a response built from it, does not fit the wire format.
    #[error(transparent)]
    Decode(#[from] DecodeError),
    /// The schedule could not answer for the requested device.
    #[error(transparent)]
    Oracle(#[from] OracleError),
    /// Field 5 carries a tag missing from the type table.
    #[error("unknown message type tag `{0}`")]
    UnknownType(String),
    /// The tag is known but this node only ever sends that kind.
    #[error("no handler for inbound `{0}` messages")]
    NoHandler(MessageKind),
}

/// Static inputs of the dispatch loop.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// This node's endpoint, the source of every heartbeat.
    pub local: Endpoint,
    /// Heartbeat destinations, in configuration order.
    pub peers: Vec<Endpoint>,
    /// Wire tag table used for routing and encoding.
    pub types: MessageTypes,
    /// Minimum time between heartbeat batches.
    pub heartbeat_interval: Duration,
    /// Yield after a cycle that handled an inbound line.
    pub busy_poll: Duration,
    /// Yield after a cycle that found the inbound queue empty.
    pub idle_poll: Duration,
    /// First reference number handed out.
    pub ref_start: u64,
}

impl DispatchSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            local: config.service.endpoint(),
            peers: config.peer_endpoints(),
            types: config.message_types.clone(),
            heartbeat_interval: config.dispatch.heartbeat_interval,
            busy_poll: config.dispatch.busy_poll_ms,
            idle_poll: config.dispatch.idle_poll_ms,
            ref_start: config.dispatch.ref_start,
        }
    }
}

/// Snapshot of dispatch counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchMetrics {
    /// Inbound lines popped from the queue.
    pub received: u64,
    /// Response lines pushed to the outbound queue.
    pub responded: u64,
    /// Inbound lines dropped because of an error.
    pub dropped: u64,
    /// Heartbeat lines pushed to the outbound queue.
    pub heartbeats: u64,
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    responded: AtomicU64,
    dropped: AtomicU64,
    heartbeats: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> DispatchMetrics {
        DispatchMetrics {
            received: self.received.load(Ordering::Relaxed),
            responded: self.responded.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            heartbeats: self.heartbeats.load(Ordering::Relaxed),
        }
    }
}

/// What one cooperative cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// An inbound line was popped this cycle.
    pub processed_inbound: bool,
    /// The popped line was dropped.
    pub dropped: bool,
    /// Response lines queued for the popped line.
    pub responses_queued: usize,
    /// Heartbeat lines queued by the timer check.
    pub heartbeats_queued: usize,
    /// How long to yield before the next cycle.
    pub sleep: Duration,
}

/// Single cooperative task owning both queues.
pub struct Dispatcher {
    settings: DispatchSettings,
    inbound: MessageQueue,
    outbound: MessageQueue,
    oracle: Arc<dyn ScheduleOracle>,
    refs: RefNumGenerator,
    last_heartbeat: Instant,
    counters: Counters,
}

impl Dispatcher {
    /// Create a dispatcher whose first heartbeat batch is due one interval from now.
    pub fn new(
        settings: DispatchSettings,
        inbound: MessageQueue,
        outbound: MessageQueue,
        oracle: Arc<dyn ScheduleOracle>,
    ) -> Self {
        let now = tokio::time::Instant::now().into_std();
        Self::starting_at(settings, inbound, outbound, oracle, now)
    }

    /// Create a dispatcher treating `now` as the time of the last heartbeat batch.
    pub fn starting_at(
        settings: DispatchSettings,
        inbound: MessageQueue,
        outbound: MessageQueue,
        oracle: Arc<dyn ScheduleOracle>,
        now: Instant,
    ) -> Self {
        let refs = RefNumGenerator::starting_at(settings.ref_start);
        Self {
            settings,
            inbound,
            outbound,
            oracle,
            refs,
            last_heartbeat: now,
            counters: Counters::default(),
        }
    }

    pub fn metrics(&self) -> DispatchMetrics {
        self.counters.snapshot()
    }

    /// Run cycles forever, yielding between them. Cancel by dropping the future.
    pub async fn run(&mut self) {
        info!(
            local = %self.settings.local,
            peers = self.settings.peers.len(),
            heartbeat_interval_s = self.settings.heartbeat_interval.as_secs(),
            "starting schedule service dispatch loop"
        );
        loop {
            let now = tokio::time::Instant::now().into_std();
            let report = self.run_cycle(now);
            tokio::time::sleep(report.sleep).await;
        }
    }

    /// Drain at most one inbound line, then check the heartbeat timer.
    pub fn run_cycle(&mut self, now: Instant) -> CycleReport {
        let mut report = CycleReport {
            processed_inbound: false,
            dropped: false,
            responses_queued: 0,
            heartbeats_queued: 0,
            sleep: self.settings.idle_poll,
        };

        if let Some(line) = self.inbound.try_pop() {
            report.processed_inbound = true;
            report.sleep = self.settings.busy_poll;
            self.counters.received.fetch_add(1, Ordering::Relaxed);
            debug!(line = %line, "message pulled from inbound queue");

            match self.process_line(&line) {
                Ok(responses) => {
                    for response in responses {
                        let encoded = response.encode();
                        debug!(kind = %response.kind(), line = %encoded, "queueing response");
                        self.outbound.push(encoded);
                        report.responses_queued += 1;
                    }
                    self.counters
                        .responded
                        .fetch_add(report.responses_queued as u64, Ordering::Relaxed);
                }
                Err(err) => {
                    error!(line = %line, error = %err, "dropping inbound message");
                    report.dropped = true;
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        }

        if now.saturating_duration_since(self.last_heartbeat) >= self.settings.heartbeat_interval {
            report.heartbeats_queued = self.emit_heartbeats();
            self.last_heartbeat = now;
        }

        report
    }

    fn emit_heartbeats(&self) -> usize {
        let heartbeats = match build_heartbeats(
            &self.settings.peers,
            &self.settings.local,
            &self.refs,
            &self.settings.types,
        ) {
            Ok(heartbeats) => heartbeats,
            Err(err) => {
                error!(error = %err, "skipping heartbeat batch");
                return 0;
            }
        };
        let count = heartbeats.len();
        for heartbeat in heartbeats {
            let encoded = heartbeat.encode();
            debug!(dest = %heartbeat.dest(), line = %encoded, "queueing heartbeat");
            self.outbound.push(encoded);
        }
        self.counters
            .heartbeats
            .fetch_add(count as u64, Ordering::Relaxed);
        count
    }

    /// Decode, handle and collect the responses for one inbound line.
    pub fn process_line(&self, line: &str) -> Result<Vec<Message>, DispatchError> {
        let types = &self.settings.types;
        let tag = peek_type_tag(line)?;
        let kind = types
            .kind_of(tag)
            .ok_or_else(|| DispatchError::UnknownType(tag.to_owned()))?;
        debug!(%kind, "routing inbound message");

        match kind {
            MessageKind::Heartbeat => {
                let request = Heartbeat::parse(line, types)?;
                Ok(vec![handle_heartbeat(&request, &self.refs, types)?.into()])
            }
            MessageKind::GetDeviceScheduledState => {
                let request = GetDeviceScheduledState::parse(line, types)?;
                let ack = handle_get_device_scheduled_state(
                    &request,
                    &self.refs,
                    self.oracle.as_ref(),
                    types,
                )?;
                Ok(vec![ack.into()])
            }
            MessageKind::HeartbeatAck | MessageKind::GetDeviceScheduledStateAck => {
                Err(DispatchError::NoHandler(kind))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOn;

    impl ScheduleOracle for AlwaysOn {
        fn is_on(&self, _device: &str) -> Result<bool, OracleError> {
            Ok(true)
        }
    }

    fn settings() -> DispatchSettings {
        DispatchSettings {
            local: Endpoint::new("10.0.0.3", "27003"),
            peers: vec![Endpoint::new("10.0.0.2", "27001")],
            types: MessageTypes::new("600", "601", "1", "2"),
            heartbeat_interval: Duration::from_secs(60),
            busy_poll: Duration::from_millis(10),
            idle_poll: Duration::from_millis(200),
            ref_start: 100,
        }
    }

    fn dispatcher(start: Instant) -> (Dispatcher, MessageQueue, MessageQueue) {
        let inbound = MessageQueue::new();
        let outbound = MessageQueue::new();
        let dispatcher = Dispatcher::starting_at(
            settings(),
            inbound.clone(),
            outbound.clone(),
            Arc::new(AlwaysOn),
            start,
        );
        (dispatcher, inbound, outbound)
    }

    #[test]
    fn idle_cycle_uses_relaxed_poll() {
        let start = Instant::now();
        let (mut dispatcher, _inbound, outbound) = dispatcher(start);
        let report = dispatcher.run_cycle(start + Duration::from_secs(1));
        assert!(!report.processed_inbound);
        assert_eq!(report.sleep, Duration::from_millis(200));
        assert!(outbound.is_empty());
    }

    #[test]
    fn busy_cycle_handles_exactly_one_line() {
        let start = Instant::now();
        let (mut dispatcher, inbound, outbound) = dispatcher(start);
        inbound.push("1,10.0.0.3,27003,10.0.0.2,27001,600");
        inbound.push("2,10.0.0.3,27003,10.0.0.2,27001,600");

        let report = dispatcher.run_cycle(start);
        assert!(report.processed_inbound);
        assert_eq!(report.responses_queued, 1);
        assert_eq!(report.sleep, Duration::from_millis(10));
        assert_eq!(inbound.len(), 1);
        assert_eq!(outbound.len(), 1);
    }

    #[test]
    fn ack_kinds_have_no_handler() {
        let (dispatcher, _, _) = dispatcher(Instant::now());
        assert_eq!(
            dispatcher.process_line("1,a,b,c,d,601"),
            Err(DispatchError::NoHandler(MessageKind::HeartbeatAck))
        );
    }

    #[test]
    fn unknown_tag_is_reported() {
        let (dispatcher, _, _) = dispatcher(Instant::now());
        assert_eq!(
            dispatcher.process_line("1,a,b,c,d,777"),
            Err(DispatchError::UnknownType("777".into()))
        );
    }

    #[test]
    fn heartbeat_timer_resets_after_batch() {
        let start = Instant::now();
        let (mut dispatcher, _inbound, outbound) = dispatcher(start);

        assert_eq!(dispatcher.run_cycle(start + Duration::from_secs(59)).heartbeats_queued, 0);
        let at_threshold = start + Duration::from_secs(60);
        assert_eq!(dispatcher.run_cycle(at_threshold).heartbeats_queued, 1);
        assert_eq!(
            dispatcher
                .run_cycle(at_threshold + Duration::from_secs(30))
                .heartbeats_queued,
            0
        );
        assert_eq!(outbound.len(), 1);
        assert_eq!(dispatcher.metrics().heartbeats, 1);
    }
}
