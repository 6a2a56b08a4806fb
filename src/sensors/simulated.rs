use super::{RawSample, Sensor, SensorError};
use crate::app_state::reason;

/// Deterministic stand-in for a BMP280 on a bench without hardware.
///
/// Pressure drifts slowly around standard atmosphere and temperature around
/// room temperature. Every `fail_every`-th read can be made to fail so the
/// unavailable path is exercised.
pub struct SimulatedBmp280 {
    reads: u64,
    fail_every: Option<u64>,
}

impl SimulatedBmp280 {
    pub fn new() -> Self {
        Self {
            reads: 0,
            fail_every: None,
        }
    }

    /// Fail every `n`-th read (`n` of zero disables failures).
    pub fn with_failures_every(mut self, n: u64) -> Self {
        self.fail_every = (n > 0).then_some(n);
        self
    }

    /// Reading at simulated second `t`.
    pub fn sample_at(t: f64) -> RawSample {
        let pressure_pa = 101_325.0 + 150.0 * (t / 600.0).sin() + 8.0 * (t / 7.0).cos();
        let temperature_c = 21.0 + 2.5 * (t / 900.0).sin() + 0.1 * (t / 5.0).cos();
        RawSample::new(pressure_pa, temperature_c)
    }
}

impl Default for SimulatedBmp280 {
    fn default() -> Self {
        Self::new()
    }
}

impl Sensor for SimulatedBmp280 {
    fn model(&self) -> &'static str {
        "BMP280"
    }

    async fn read(&mut self) -> Result<RawSample, SensorError> {
        self.reads += 1;

        if let Some(n) = self.fail_every
            && self.reads % n == 0
        {
            return Err(SensorError::ReadFailed {
                sensor: "BMP280",
                operation: "read measurement registers",
                details: reason(format_args!("simulated SPI timeout on read {}", self.reads)),
            });
        }

        Ok(Self::sample_at(self.reads as f64))
    }
}
