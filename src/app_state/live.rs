use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

use super::Reason;
use crate::sampling::AggregateReading;

/// Outcome of the most recent sensor read.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum SensorStatus {
    #[default]
    Ok,
    Unavailable(Reason),
}

impl SensorStatus {
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Point-in-time copy of the host-visible accessory values.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub status: SensorStatus,
    /// Last published window, if any window has completed yet.
    pub latest: Option<AggregateReading>,
    pub windows_published: u64,
    pub failed_reads: u64,
}

impl Snapshot {
    pub const fn new() -> Self {
        Self {
            status: SensorStatus::Ok,
            latest: None,
            windows_published: 0,
            failed_reads: 0,
        }
    }
}

impl Default for Snapshot {
    fn default() -> Self {
        Self::new()
    }
}

/// Current smoothed values, shareable across tasks and threads.
///
/// Written only by the accessory controller; any number of readers may take
/// snapshots. Usable in a `static`.
pub struct LiveValues {
    inner: Mutex<CriticalSectionRawMutex, RefCell<Snapshot>>,
}

impl LiveValues {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Snapshot::new())),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.inner.lock(|cell| cell.borrow().clone())
    }

    pub fn status(&self) -> SensorStatus {
        self.inner.lock(|cell| cell.borrow().status.clone())
    }

    /// Smoothed pressure, or `None` with no data yet or while the sensor is unavailable.
    pub fn pressure_mbar(&self) -> Option<f64> {
        self.current().map(|reading| reading.pressure_mbar)
    }

    /// Smoothed temperature, or `None` with no data yet or while the sensor is unavailable.
    pub fn temperature_c(&self) -> Option<f64> {
        self.current().map(|reading| reading.temperature_c)
    }

    fn current(&self) -> Option<AggregateReading> {
        self.inner.lock(|cell| {
            let snapshot = cell.borrow();
            match snapshot.status {
                SensorStatus::Ok => snapshot.latest,
                SensorStatus::Unavailable(_) => None,
            }
        })
    }

    pub(crate) fn record_reading(&self, reading: AggregateReading) {
        self.inner.lock(|cell| {
            let mut snapshot = cell.borrow_mut();
            snapshot.latest = Some(reading);
            snapshot.windows_published += 1;
        });
    }

    pub(crate) fn record_status(&self, status: &SensorStatus) {
        self.inner.lock(|cell| {
            let mut snapshot = cell.borrow_mut();
            if status.is_unavailable() {
                snapshot.failed_reads += 1;
            }
            snapshot.status = status.clone();
        });
    }
}

impl Default for LiveValues {
    fn default() -> Self {
        Self::new()
    }
}
