use core::future::Future;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_futures::join::join;
use log::{error, info};
use thiserror::Error;

use super::{PipelineEvent, Sink, SinkError, SinkKind};
use crate::app_state::Reason;
use crate::sampling::{AggregateReading, Metric};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("broker connection is not established")]
    NotConnected,
    #[error("no topic configured")]
    NoTopic,
    #[error("publish rejected: {0}")]
    PublishFailed(Reason),
}

/// Publish/subscribe telemetry collaborator.
///
/// The connection is established and maintained out of band; the sink only
/// checks whether it is currently up.
pub trait TelemetryBroker {
    fn is_connected(&self) -> bool;

    fn publish(&self, topic: &str, value: &str) -> impl Future<Output = Result<(), BrokerError>>;
}

impl<B: TelemetryBroker + ?Sized> TelemetryBroker for &B {
    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }

    fn publish(&self, topic: &str, value: &str) -> impl Future<Output = Result<(), BrokerError>> {
        (**self).publish(topic, value)
    }
}

/// Per-metric topic names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topics {
    pub pressure: String,
    pub temperature: String,
}

impl Topics {
    /// `<device>/pressure` and `<device>/temperature`.
    pub fn for_device(device: &str) -> Self {
        Self {
            pressure: format!("{device}/{}", Metric::Pressure.name()),
            temperature: format!("{device}/{}", Metric::Temperature.name()),
        }
    }

    pub fn topic(&self, metric: Metric) -> &str {
        match metric {
            Metric::Pressure => &self.pressure,
            Metric::Temperature => &self.temperature,
        }
    }
}

/// Wire representation of a published value.
pub fn encode_value(value: f64) -> String {
    format!("{value:.2}")
}

/// Sink adapter publishing each metric of a completed window to its topic.
///
/// No retry: the next window's publish is the retry.
pub struct TelemetrySink<B> {
    broker: B,
    topics: Topics,
}

impl<B: TelemetryBroker> TelemetrySink<B> {
    pub fn new(broker: B, topics: Topics) -> Self {
        Self { broker, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Publish one value, refusing up front when there is nowhere to send it.
    pub async fn publish(&self, topic: &str, value: &str) -> Result<(), BrokerError> {
        if !self.broker.is_connected() {
            return Err(BrokerError::NotConnected);
        }
        if topic.is_empty() {
            return Err(BrokerError::NoTopic);
        }
        self.broker.publish(topic, value).await
    }

    async fn publish_reading(&self, reading: &AggregateReading) -> Result<(), SinkError> {
        let pressure_topic = self.topics.topic(Metric::Pressure);
        let temperature_topic = self.topics.topic(Metric::Temperature);
        let pressure = encode_value(reading.pressure_mbar);
        let temperature = encode_value(reading.temperature_c);

        let (pressure_result, temperature_result) = join(
            self.publish(pressure_topic, &pressure),
            self.publish(temperature_topic, &temperature),
        )
        .await;

        match (pressure_result, temperature_result) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(source), other) => {
                if let Err(e) = other {
                    error!("telemetry publish to {} failed: {}", temperature_topic, e);
                }
                Err(SinkError::Telemetry {
                    topic: pressure_topic.to_owned(),
                    source,
                })
            }
            (Ok(()), Err(source)) => Err(SinkError::Telemetry {
                topic: temperature_topic.to_owned(),
                source,
            }),
        }
    }
}

impl<B: TelemetryBroker> Sink for TelemetrySink<B> {
    fn kind(&self) -> SinkKind {
        SinkKind::Telemetry
    }

    async fn process_event(&mut self, event: &PipelineEvent) -> Result<(), SinkError> {
        match event {
            PipelineEvent::Reading(reading) => self.publish_reading(reading).await,
            PipelineEvent::Unavailable(_) | PipelineEvent::Recovered => Ok(()),
        }
    }
}

/// In-process broker that logs what it would publish.
///
/// Connection state is flipped only through [`connect`](Self::connect) and
/// [`disconnect`](Self::disconnect); publishers just read it.
pub struct LoopbackBroker {
    connected: AtomicBool,
}

impl LoopbackBroker {
    pub const fn new() -> Self {
        Self {
            connected: AtomicBool::new(false),
        }
    }

    pub fn connect(&self, url: &str) {
        self.connected.store(true, Ordering::Release);
        info!("Telemetry client connected to {}", url);
    }

    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Release);
        info!("Telemetry client disconnected");
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl TelemetryBroker for LoopbackBroker {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    async fn publish(&self, topic: &str, value: &str) -> Result<(), BrokerError> {
        info!("{} <- {}", topic, value);
        Ok(())
    }
}
