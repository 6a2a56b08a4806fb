mod simulated;

use core::future::Future;

use thiserror::Error;

use crate::app_state::Reason;
use crate::sampling::Metric;

pub use simulated::SimulatedBmp280;

/// One raw reading from the barometric sensor.
///
/// Consumed by the averagers on the tick it was read and never stored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub pressure_pa: f64,
    pub temperature_c: f64,
}

impl RawSample {
    pub const fn new(pressure_pa: f64, temperature_c: f64) -> Self {
        Self {
            pressure_pa,
            temperature_c,
        }
    }

    /// The first metric whose value is NaN or infinite, if any.
    pub fn non_finite_metric(&self) -> Option<Metric> {
        if !self.pressure_pa.is_finite() {
            Some(Metric::Pressure)
        } else if !self.temperature_c.is_finite() {
            Some(Metric::Temperature)
        } else {
            None
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SensorError {
    #[error("{sensor} failed to {operation}: {details}")]
    ReadFailed {
        sensor: &'static str,
        operation: &'static str,
        details: Reason,
    },
    #[error("{metric} reading is not a finite number")]
    NonFinite { metric: Metric },
    #[error("{metric} reading {value} outside plausible range {min}..={max}")]
    OutOfRange {
        metric: Metric,
        value: f64,
        min: f64,
        max: f64,
    },
}

/// Sensor collaborator consumed by the sampler.
///
/// Each call performs one measurement. Implementations must complete or fail
/// promptly; the sampler does not time reads out.
pub trait Sensor {
    /// Short model name used in logs and accessory information.
    fn model(&self) -> &'static str;

    /// Read pressure (pascals) and temperature (°C).
    fn read(&mut self) -> impl Future<Output = Result<RawSample, SensorError>>;
}
