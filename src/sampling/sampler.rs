use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, warn};

use super::{AggregateReading, ReadingLimits, SlidingAverager};
use crate::app_state::{SensorStatus, reason};
use crate::config::ConfigurationError;
use crate::sensors::{RawSample, Sensor, SensorError};

/// Source of wall-clock timestamps for aggregated readings.
pub trait EpochClock {
    fn now_epoch_secs(&self) -> u64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl EpochClock for SystemClock {
    fn now_epoch_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// Result of one sampling tick.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// The read succeeded and was averaged; the window is still open.
    Accumulated,
    /// The read succeeded and closed a window.
    WindowComplete(AggregateReading),
    /// The read failed (or was rejected); averagers are untouched.
    ReadFailed(SensorError),
}

/// Reads the sensor once per tick and maintains both running averages.
///
/// Ticks are processed strictly one after another through `&mut self`, so the
/// averagers have a single writer and need no locking.
pub struct Sampler<S, C = SystemClock> {
    sensor: S,
    clock: C,
    pressure: SlidingAverager,
    temperature: SlidingAverager,
    limits: Option<ReadingLimits>,
    status: SensorStatus,
    successful_reads: u64,
    failed_reads: u64,
}

impl<S: Sensor, C: EpochClock> Sampler<S, C> {
    pub fn new(sensor: S, clock: C, window_size: usize) -> Result<Self, ConfigurationError> {
        Ok(Self {
            sensor,
            clock,
            pressure: SlidingAverager::new(window_size)?,
            temperature: SlidingAverager::new(window_size)?,
            limits: None,
            status: SensorStatus::Ok,
            successful_reads: 0,
            failed_reads: 0,
        })
    }

    /// Reject reads outside `limits` as if the sensor had failed.
    pub fn with_limits(mut self, limits: Option<ReadingLimits>) -> Self {
        self.limits = limits;
        self
    }

    /// Perform one read and feed it to both averagers.
    ///
    /// A failed read updates the status and leaves both averagers exactly as
    /// they were, so only successful reads count towards a window.
    pub async fn tick(&mut self) -> TickOutcome {
        let sample = match self.read_checked().await {
            Ok(sample) => sample,
            Err(e) => {
                warn!("{} read failed: {}", self.sensor.model(), e);
                self.failed_reads += 1;
                self.status = SensorStatus::Unavailable(reason(format_args!("{e}")));
                return TickOutcome::ReadFailed(e);
            }
        };

        debug!(
            "Read: Pressure: {}pa, Temperature: {}C",
            sample.pressure_pa, sample.temperature_c
        );
        self.status = SensorStatus::Ok;
        self.successful_reads += 1;

        let pressure_ready = self.pressure.push(sample.pressure_pa);
        let temperature_ready = self.temperature.push(sample.temperature_c);
        debug_assert_eq!(pressure_ready, temperature_ready, "averagers out of step");

        if !(pressure_ready && temperature_ready) {
            return TickOutcome::Accumulated;
        }

        match (self.pressure.average(), self.temperature.average()) {
            (Some(pressure_pa), Some(temperature_c)) => TickOutcome::WindowComplete(
                AggregateReading::from_averages(
                    pressure_pa,
                    temperature_c,
                    self.clock.now_epoch_secs(),
                ),
            ),
            _ => TickOutcome::Accumulated,
        }
    }

    async fn read_checked(&mut self) -> Result<RawSample, SensorError> {
        let sample = self.sensor.read().await?;

        if let Some(metric) = sample.non_finite_metric() {
            return Err(SensorError::NonFinite { metric });
        }
        if let Some(limits) = &self.limits {
            limits.check(&sample)?;
        }

        Ok(sample)
    }

    /// Clear both windows, e.g. after reconfiguring the sensor.
    pub fn reset(&mut self) {
        self.pressure.reset();
        self.temperature.reset();
    }

    pub fn status(&self) -> &SensorStatus {
        &self.status
    }

    pub fn pressure(&self) -> &SlidingAverager {
        &self.pressure
    }

    pub fn temperature(&self) -> &SlidingAverager {
        &self.temperature
    }

    pub fn successful_reads(&self) -> u64 {
        self.successful_reads
    }

    pub fn failed_reads(&self) -> u64 {
        self.failed_reads
    }
}
