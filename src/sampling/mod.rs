//! Sampling pipeline: fixed-cadence reads, smoothing, and window detection.
//!
//! The [`Sampler`] owns one [`SlidingAverager`] per metric. Every successful
//! read feeds both averagers; once per window of `N` successful reads it
//! produces an [`AggregateReading`] for the sinks.

pub mod averager;
pub mod sampler;

pub use averager::{MAX_WINDOW, SlidingAverager};
pub use sampler::{EpochClock, Sampler, SystemClock, TickOutcome};

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::config::ConfigurationError;
use crate::sensors::{RawSample, SensorError};

pub const PASCALS_PER_MILLIBAR: f64 = 100.0;

/// Metrics produced by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Metric {
    Pressure,
    Temperature,
}

impl Metric {
    /// Field name used for history entries and topic suffixes.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Pressure => "pressure",
            Self::Temperature => "temperature",
        }
    }

    /// Unit of the published (aggregated) value.
    pub const fn unit(self) -> &'static str {
        match self {
            Self::Pressure => "mbar",
            Self::Temperature => "°C",
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One smoothed reading, produced once per completed window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AggregateReading {
    pub pressure_mbar: f64,
    pub temperature_c: f64,
    pub timestamp: u64,
}

impl AggregateReading {
    /// Build a reading from window averages; pressure arrives in pascals.
    pub fn from_averages(pressure_pa: f64, temperature_c: f64, timestamp: u64) -> Self {
        Self {
            pressure_mbar: pressure_pa / PASCALS_PER_MILLIBAR,
            temperature_c,
            timestamp,
        }
    }

    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Pressure => self.pressure_mbar,
            Metric::Temperature => self.temperature_c,
        }
    }

    /// Metric/value pairs in publish order.
    pub fn fields(&self) -> [(Metric, f64); 2] {
        [
            (Metric::Pressure, self.pressure_mbar),
            (Metric::Temperature, self.temperature_c),
        ]
    }
}

/// Inclusive plausibility range for one metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

/// Optional plausibility check applied to raw reads.
///
/// A read outside either range is handled exactly like a failed read: it is
/// not averaged and the sensor is reported unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadingLimits {
    pub pressure_pa: Bounds,
    pub temperature_c: Bounds,
}

impl ReadingLimits {
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        for (metric, bounds) in [
            (Metric::Pressure, self.pressure_pa),
            (Metric::Temperature, self.temperature_c),
        ] {
            if !(bounds.min.is_finite() && bounds.max.is_finite() && bounds.min <= bounds.max) {
                return Err(ConfigurationError::InvalidReadingLimits { metric });
            }
        }
        Ok(())
    }

    pub fn check(&self, sample: &RawSample) -> Result<(), SensorError> {
        if !self.pressure_pa.contains(sample.pressure_pa) {
            return Err(SensorError::OutOfRange {
                metric: Metric::Pressure,
                value: sample.pressure_pa,
                min: self.pressure_pa.min,
                max: self.pressure_pa.max,
            });
        }
        if !self.temperature_c.contains(sample.temperature_c) {
            return Err(SensorError::OutOfRange {
                metric: Metric::Temperature,
                value: sample.temperature_c,
                min: self.temperature_c.min,
                max: self.temperature_c.max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_converts_pascals() {
        let reading = AggregateReading::from_averages(100_000.0, 21.5, 1_700_000_000);
        assert_eq!(reading.pressure_mbar, 1000.0);
        assert_eq!(reading.value(Metric::Temperature), 21.5);
        assert_eq!(reading.fields()[0], (Metric::Pressure, 1000.0));
    }

    #[test]
    fn test_limits_reject_out_of_range() {
        let limits = ReadingLimits {
            pressure_pa: Bounds::new(30_000.0, 110_000.0),
            temperature_c: Bounds::new(-40.0, 85.0),
        };

        assert!(limits.check(&RawSample::new(101_325.0, 20.0)).is_ok());
        assert!(matches!(
            limits.check(&RawSample::new(0.0, 20.0)),
            Err(SensorError::OutOfRange {
                metric: Metric::Pressure,
                ..
            })
        ));
        assert!(matches!(
            limits.check(&RawSample::new(101_325.0, 120.0)),
            Err(SensorError::OutOfRange {
                metric: Metric::Temperature,
                ..
            })
        ));
    }

    #[test]
    fn test_limits_validation() {
        let inverted = ReadingLimits {
            pressure_pa: Bounds::new(110_000.0, 30_000.0),
            temperature_c: Bounds::new(-40.0, 85.0),
        };
        assert!(inverted.validate().is_err());

        let nan = ReadingLimits {
            pressure_pa: Bounds::new(30_000.0, 110_000.0),
            temperature_c: Bounds::new(f64::NAN, 85.0),
        };
        assert!(nan.validate().is_err());
    }
}
