//! Fixed-capacity running average over the most recent samples of one metric.

use heapless::Deque;

use crate::config::ConfigurationError;

/// Largest window the averager supports.
///
/// The buffer is stack allocated at this size; the configured window may be
/// anything in `1..=MAX_WINDOW`.
pub const MAX_WINDOW: usize = 30;

/// Sliding window running average with a decoupled publish counter.
///
/// The buffer holds at most `capacity` samples (oldest first) and keeps a
/// running sum of them. Independently of buffer occupancy, a ready counter
/// counts pushes and fires once every `capacity` pushes, so the rolling
/// average of the last `capacity` samples is reported once per epoch rather
/// than once per sample.
#[derive(Debug, Clone)]
pub struct SlidingAverager {
    capacity: usize,
    samples: Deque<f64, MAX_WINDOW>,
    cumulative_sum: f64,
    ready_counter: usize,
}

impl SlidingAverager {
    /// Create an averager over the last `capacity` samples.
    pub fn new(capacity: usize) -> Result<Self, ConfigurationError> {
        if capacity == 0 || capacity > MAX_WINDOW {
            return Err(ConfigurationError::InvalidWindowSize {
                requested: capacity,
                max: MAX_WINDOW,
            });
        }

        Ok(Self {
            capacity,
            samples: Deque::new(),
            cumulative_sum: 0.0,
            ready_counter: 0,
        })
    }

    /// Admit a new sample, evicting the oldest one when the window is full.
    ///
    /// Returns `true` when this push completes an epoch of `capacity` pushes.
    pub fn push(&mut self, value: f64) -> bool {
        if self.samples.len() == self.capacity {
            if let Some(oldest) = self.samples.pop_front() {
                self.cumulative_sum -= oldest;
            }
        }

        // Capacity never exceeds MAX_WINDOW, so after the eviction above
        // there is always room.
        if self.samples.push_back(value).is_ok() {
            self.cumulative_sum += value;
        }

        self.ready_counter += 1;
        if self.ready_counter == self.capacity {
            self.ready_counter = 0;
            true
        } else {
            false
        }
    }

    /// Mean of the samples currently in the window, or `None` before the first push.
    pub fn average(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }

        Some(self.cumulative_sum / self.samples.len() as f64)
    }

    /// Drop all samples and restart the epoch counter.
    pub fn reset(&mut self) {
        self.samples.clear();
        self.cumulative_sum = 0.0;
        self.ready_counter = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// True once `capacity` samples have been admitted since the last reset.
    pub fn is_full(&self) -> bool {
        self.samples.len() == self.capacity
    }

    /// Running sum of the samples in the window.
    pub fn sum(&self) -> f64 {
        self.cumulative_sum
    }

    /// Pushes counted towards the current epoch.
    pub fn pending(&self) -> usize {
        self.ready_counter
    }

    /// Samples in the window, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().copied()
    }
}
