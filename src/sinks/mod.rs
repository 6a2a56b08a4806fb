//! Fan-out of aggregated readings to independent sinks.
//!
//! The [`SinkRouter`] publishes [`PipelineEvent`]s into a pub-sub channel and
//! never waits. Each enabled sink runs its own worker ([`run_sink`]) on its
//! own subscriber, so a slow or failing sink cannot delay sampling or the
//! other sinks.
//!
//! ## Channel layout
//!
//! - Publisher 0: the accessory controller (via [`SinkRouter`])
//! - Subscriber per enabled sink: host state, history log, telemetry broker

pub mod history;
pub mod host_state;
pub mod telemetry;

use core::fmt;
use core::future::Future;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::pubsub::{PubSubChannel, Publisher, Subscriber, WaitResult};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::app_state::Reason;
use crate::sampling::AggregateReading;

pub use history::{HistoryError, HistoryLog, HistorySink};
pub use host_state::{HostState, HostStateSink, LoggingHostState};
pub use telemetry::{BrokerError, LoopbackBroker, TelemetryBroker, TelemetrySink, Topics};

/// Events buffered per subscriber before a lagging sink starts missing events.
pub const EVENT_CHANNEL_CAPACITY: usize = 4;

/// One subscriber per sink kind.
pub const EVENT_SUBSCRIBERS: usize = 3;

/// Only the accessory controller publishes.
pub const EVENT_PUBLISHERS: usize = 1;

pub type EventChannel = PubSubChannel<
    CriticalSectionRawMutex,
    PipelineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventPublisher<'a> = Publisher<
    'a,
    CriticalSectionRawMutex,
    PipelineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

pub type EventSubscriber<'a> = Subscriber<
    'a,
    CriticalSectionRawMutex,
    PipelineEvent,
    EVENT_CHANNEL_CAPACITY,
    EVENT_SUBSCRIBERS,
    EVENT_PUBLISHERS,
>;

/// Events delivered to every sink.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// A window completed.
    Reading(AggregateReading),
    /// The sensor stopped responding (or the failure reason changed).
    Unavailable(Reason),
    /// The sensor answered again after failing.
    Recovered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    HostState,
    History,
    Telemetry,
}

impl SinkKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::HostState => "host state",
            Self::History => "history",
            Self::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Which sinks are enabled for this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SinkSet {
    pub host_state: bool,
    pub history: bool,
    pub telemetry: bool,
}

impl SinkSet {
    pub const fn all() -> Self {
        Self {
            host_state: true,
            history: true,
            telemetry: true,
        }
    }

    pub fn contains(&self, kind: SinkKind) -> bool {
        match kind {
            SinkKind::HostState => self.host_state,
            SinkKind::History => self.history,
            SinkKind::Telemetry => self.telemetry,
        }
    }

    pub fn disable(&mut self, kind: SinkKind) {
        match kind {
            SinkKind::HostState => self.host_state = false,
            SinkKind::History => self.history = false,
            SinkKind::Telemetry => self.telemetry = false,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = SinkKind> + '_ {
        [SinkKind::HostState, SinkKind::History, SinkKind::Telemetry]
            .into_iter()
            .filter(|kind| self.contains(*kind))
    }

    pub fn is_empty(&self) -> bool {
        self.enabled().next().is_none()
    }
}

#[derive(Error, Debug)]
pub enum SinkError {
    #[error(transparent)]
    History(#[from] HistoryError),
    #[error("publish to {topic} failed: {source}")]
    Telemetry {
        topic: String,
        #[source]
        source: BrokerError,
    },
}

/// One downstream consumer of pipeline events.
pub trait Sink {
    fn kind(&self) -> SinkKind;

    /// Deliver one event. Failures are reported to the worker, which logs them.
    fn process_event(
        &mut self,
        event: &PipelineEvent,
    ) -> impl Future<Output = Result<(), SinkError>>;
}

/// Deliver one event to `sink`, logging a failure at the sink.
///
/// Returns whether the delivery succeeded. A failure never propagates.
pub async fn dispatch<S: Sink>(sink: &mut S, event: &PipelineEvent) -> bool {
    match sink.process_event(event).await {
        Ok(()) => true,
        Err(e) => {
            error!("{} sink dispatch failed: {}", sink.kind(), e);
            false
        }
    }
}

/// Deliver every event already queued for `subscriber` without waiting.
///
/// Returns the number of events delivered (successfully or not).
pub async fn drain<S: Sink>(sink: &mut S, subscriber: &mut EventSubscriber<'_>) -> usize {
    let mut delivered = 0;
    while let Some(result) = subscriber.try_next_message() {
        match result {
            WaitResult::Message(event) => {
                dispatch(sink, &event).await;
                delivered += 1;
            }
            WaitResult::Lagged(missed) => {
                warn!("{} sink fell behind, skipped {} events", sink.kind(), missed);
            }
        }
    }
    delivered
}

/// Worker loop for one sink: wait for events and deliver them forever.
pub async fn run_sink<S: Sink>(mut sink: S, mut subscriber: EventSubscriber<'_>) -> ! {
    info!("{} sink started", sink.kind());
    loop {
        match subscriber.next_message().await {
            WaitResult::Message(event) => {
                dispatch(&mut sink, &event).await;
            }
            WaitResult::Lagged(missed) => {
                warn!("{} sink fell behind, skipped {} events", sink.kind(), missed);
            }
        }
    }
}

/// Hands pipeline events to the sink workers without waiting on them.
///
/// Publishing never blocks: if a sink's queue is full, its oldest event is
/// dropped and that sink is told it lagged.
pub struct SinkRouter<'a> {
    publisher: EventPublisher<'a>,
    sinks: SinkSet,
}

impl<'a> SinkRouter<'a> {
    pub fn new(publisher: EventPublisher<'a>, sinks: SinkSet) -> Self {
        for kind in sinks.enabled() {
            info!("Dispatching to {} sink", kind);
        }
        if sinks.is_empty() {
            warn!("No sinks enabled; readings will only update live values");
        }

        Self { publisher, sinks }
    }

    pub fn sinks(&self) -> SinkSet {
        self.sinks
    }

    /// Fan a completed window out to every enabled sink.
    pub fn publish(&self, reading: AggregateReading) {
        info!("Pressure: {}", reading.pressure_mbar);
        info!("Temperature: {}", reading.temperature_c);
        self.send(PipelineEvent::Reading(reading));
    }

    /// Tell the sinks the sensor stopped responding.
    pub fn report_unavailable(&self, reason: Reason) {
        self.send(PipelineEvent::Unavailable(reason));
    }

    /// Tell the sinks the sensor is responding again.
    pub fn report_recovered(&self) {
        self.send(PipelineEvent::Recovered);
    }

    fn send(&self, event: PipelineEvent) {
        if self.sinks.is_empty() {
            return;
        }
        debug!("Publishing {:?}", event);
        self.publisher.publish_immediate(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Metric;
    use embassy_futures::block_on;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};

    /// History log on a disk that takes `delay` per write.
    struct SlowLog {
        delay: Duration,
    }

    impl HistoryLog for SlowLog {
        async fn append_entry(
            &mut self,
            _timestamp: u64,
            _fields: &[(Metric, f64)],
        ) -> Result<(), HistoryError> {
            std::thread::sleep(self.delay);
            Ok(())
        }
    }

    #[derive(Default)]
    struct TimedBroker {
        published: Mutex<Vec<Instant>>,
    }

    impl TelemetryBroker for TimedBroker {
        fn is_connected(&self) -> bool {
            true
        }

        async fn publish(&self, _topic: &str, _value: &str) -> Result<(), BrokerError> {
            if let Ok(mut published) = self.published.lock() {
                published.push(Instant::now());
            }
            Ok(())
        }
    }

    #[test]
    fn test_sink_set_enumeration() {
        let mut sinks = SinkSet::all();
        sinks.disable(SinkKind::History);

        let enabled: Vec<SinkKind> = sinks.enabled().collect();
        assert_eq!(enabled, vec![SinkKind::HostState, SinkKind::Telemetry]);
        assert!(!sinks.is_empty());
        assert!(SinkSet::default().is_empty());
    }

    #[test]
    fn test_router_never_blocks_on_full_queue() {
        let channel = EventChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let router = SinkRouter::new(channel.publisher().unwrap(), SinkSet::all());

        for i in 0..(EVENT_CHANNEL_CAPACITY as u64 + 3) {
            router.publish(AggregateReading::from_averages(100_000.0, 20.0, i));
        }

        // Oldest events were dropped for the lagging subscriber.
        assert!(matches!(
            subscriber.try_next_message(),
            Some(WaitResult::Lagged(3))
        ));
        match subscriber.try_next_message() {
            Some(WaitResult::Message(PipelineEvent::Reading(reading))) => {
                assert_eq!(reading.timestamp, 3)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_router_with_no_sinks_publishes_nothing() {
        let channel = EventChannel::new();
        let mut subscriber = channel.subscriber().unwrap();
        let router = SinkRouter::new(channel.publisher().unwrap(), SinkSet::default());

        router.report_recovered();
        assert!(subscriber.try_next_message().is_none());
    }

    #[test]
    fn test_blocking_history_does_not_delay_telemetry_thread() {
        let channel = EventChannel::new();
        let mut history_events = channel.subscriber().unwrap();
        let mut telemetry_events = channel.subscriber().unwrap();
        let router = SinkRouter::new(channel.publisher().unwrap(), SinkSet::all());
        let broker = TimedBroker::default();

        router.publish(AggregateReading::from_averages(100_000.0, 20.0, 0));
        let started = Instant::now();

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut sink = HistorySink::new(SlowLog {
                    delay: Duration::from_millis(500),
                });
                block_on(drain(&mut sink, &mut history_events))
            });
            scope.spawn(|| {
                let mut sink = TelemetrySink::new(&broker, Topics::for_device("BMP280"));
                block_on(drain(&mut sink, &mut telemetry_events))
            });
        });

        let published = broker.published.lock().unwrap();
        assert_eq!(published.len(), 2);
        assert!(
            published
                .iter()
                .all(|at| at.duration_since(started) < Duration::from_millis(250))
        );
    }
}
