use log::{info, warn};

use super::{PipelineEvent, Sink, SinkError, SinkKind};
use crate::app_state::AirPressureCharacteristic;
use crate::sampling::AggregateReading;

/// Live-state interface of the smart-home host.
///
/// Calls are synchronous and must not block.
pub trait HostState {
    fn set_pressure(&mut self, mbar: f64);
    fn set_temperature(&mut self, celsius: f64);
    /// Replace the exposed values with an explicit "not responding" state.
    fn set_unavailable(&mut self, reason: &str);
}

/// Sink adapter that keeps the host's characteristics current.
pub struct HostStateSink<H> {
    host: H,
    last: Option<AggregateReading>,
}

impl<H: HostState> HostStateSink<H> {
    pub fn new(host: H) -> Self {
        Self { host, last: None }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    fn apply(&mut self, reading: &AggregateReading) {
        let mbar = AirPressureCharacteristic::clamp(reading.pressure_mbar);
        if mbar != reading.pressure_mbar {
            warn!(
                "Pressure {} mbar outside {} range, exposing {}",
                reading.pressure_mbar,
                AirPressureCharacteristic::NAME,
                mbar
            );
        }

        self.host.set_pressure(mbar);
        self.host.set_temperature(reading.temperature_c);
        self.last = Some(*reading);
    }
}

impl<H: HostState> Sink for HostStateSink<H> {
    fn kind(&self) -> SinkKind {
        SinkKind::HostState
    }

    async fn process_event(&mut self, event: &PipelineEvent) -> Result<(), SinkError> {
        match event {
            PipelineEvent::Reading(reading) => self.apply(reading),
            PipelineEvent::Unavailable(reason) => self.host.set_unavailable(reason),
            PipelineEvent::Recovered => {
                if let Some(reading) = self.last {
                    self.apply(&reading);
                }
            }
        }
        Ok(())
    }
}

/// Host state that only writes to the log; used when running without a host.
#[derive(Debug, Default)]
pub struct LoggingHostState {
    pub pressure_mbar: Option<f64>,
    pub temperature_c: Option<f64>,
}

impl HostState for LoggingHostState {
    fn set_pressure(&mut self, mbar: f64) {
        info!(
            "{}: {:.1} {}",
            AirPressureCharacteristic::NAME,
            mbar,
            AirPressureCharacteristic::UNIT
        );
        self.pressure_mbar = Some(mbar);
    }

    fn set_temperature(&mut self, celsius: f64) {
        info!("Current Temperature: {:.1} °C", celsius);
        self.temperature_c = Some(celsius);
    }

    fn set_unavailable(&mut self, reason: &str) {
        warn!("Not responding: {}", reason);
        self.pressure_mbar = None;
        self.temperature_c = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app_state::reason;
    use embassy_futures::block_on;

    #[test]
    fn test_reading_updates_both_values() {
        let mut sink = HostStateSink::new(LoggingHostState::default());
        let reading = AggregateReading::from_averages(101_325.0, 19.5, 0);

        block_on(sink.process_event(&PipelineEvent::Reading(reading))).unwrap();

        assert_eq!(sink.host().pressure_mbar, Some(1013.25));
        assert_eq!(sink.host().temperature_c, Some(19.5));
    }

    #[test]
    fn test_unavailable_clears_values_and_recovery_restores() {
        let mut sink = HostStateSink::new(LoggingHostState::default());
        let reading = AggregateReading::from_averages(100_000.0, 20.0, 0);

        block_on(sink.process_event(&PipelineEvent::Reading(reading))).unwrap();
        block_on(sink.process_event(&PipelineEvent::Unavailable(reason(format_args!(
            "spi"
        )))))
        .unwrap();
        assert_eq!(sink.host().pressure_mbar, None);

        block_on(sink.process_event(&PipelineEvent::Recovered)).unwrap();
        assert_eq!(sink.host().pressure_mbar, Some(1000.0));
    }

    #[test]
    fn test_recovery_without_history_stays_empty() {
        let mut sink = HostStateSink::new(LoggingHostState::default());
        block_on(sink.process_event(&PipelineEvent::Recovered)).unwrap();
        assert_eq!(sink.host().temperature_c, None);
    }

    #[test]
    fn test_pressure_clamped_to_characteristic_range() {
        let mut sink = HostStateSink::new(LoggingHostState::default());
        let reading = AggregateReading::from_averages(60_000.0, 20.0, 0);

        block_on(sink.process_event(&PipelineEvent::Reading(reading))).unwrap();
        assert_eq!(sink.host().pressure_mbar, Some(800.0));
    }
}
