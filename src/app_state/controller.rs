use embassy_time::{Duration, Ticker};
use log::info;

use super::{AccessoryInfo, LiveValues, SensorStatus};
use crate::sampling::{EpochClock, Sampler, TickOutcome};
use crate::sensors::Sensor;
use crate::sinks::SinkRouter;

/// Owns the sampling loop and the sink router for one accessory.
///
/// The controller is the only writer of [`LiveValues`]. It translates tick
/// outcomes into host-visible state: completed windows are published to all
/// sinks, the first failure after a healthy read marks the accessory
/// unavailable, and the first successful read after failures marks it
/// recovered.
pub struct AccessoryController<'a, S, C> {
    info: AccessoryInfo,
    period: Duration,
    sampler: Sampler<S, C>,
    router: SinkRouter<'a>,
    live: &'a LiveValues,
}

impl<'a, S: Sensor, C: EpochClock> AccessoryController<'a, S, C> {
    pub fn new(
        info: AccessoryInfo,
        period: Duration,
        sampler: Sampler<S, C>,
        router: SinkRouter<'a>,
        live: &'a LiveValues,
    ) -> Self {
        Self {
            info,
            period,
            sampler,
            router,
            live,
        }
    }

    pub fn info(&self) -> &AccessoryInfo {
        &self.info
    }

    pub fn sampler(&self) -> &Sampler<S, C> {
        &self.sampler
    }

    /// Run one tick: read, average, and publish whatever the tick produced.
    pub async fn tick(&mut self) -> TickOutcome {
        let previous = self.sampler.status().clone();
        let outcome = self.sampler.tick().await;
        let status = self.sampler.status();

        self.live.record_status(status);

        match (&previous, status) {
            (SensorStatus::Unavailable(_), SensorStatus::Ok) => {
                info!("{} responding again", self.info.model);
                self.router.report_recovered();
            }
            (_, SensorStatus::Unavailable(reason)) if previous != *status => {
                self.router.report_unavailable(reason.clone());
            }
            _ => {}
        }

        if let TickOutcome::WindowComplete(reading) = &outcome {
            self.live.record_reading(*reading);
            self.router.publish(*reading);
        }

        outcome
    }

    /// Sample forever at the configured period, starting immediately.
    ///
    /// Each tick finishes its averager updates before the ticker is awaited,
    /// so tick `t + 1` never starts sensor I/O while tick `t` is in progress.
    pub async fn run(mut self) -> ! {
        info!(
            "{} sampling every {} ms, window of {}",
            self.info.name,
            self.period.as_millis(),
            self.sampler.pressure().capacity()
        );

        let mut ticker = Ticker::every(self.period);
        loop {
            self.tick().await;
            ticker.next().await;
        }
    }
}
