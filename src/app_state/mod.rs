//! Accessory-level state, lifecycle and error types

mod accessory;
mod controller;
mod live;

pub use accessory::*;
pub use controller::*;
pub use live::*;

use core::fmt;

use embassy_executor::SpawnError;
use thiserror::Error;

use crate::config::ConfigurationError;

/// Capacity of human-readable failure reasons.
pub const REASON_CAPACITY: usize = 64;

/// Bounded failure reason carried through status and pipeline events.
pub type Reason = heapless::String<REASON_CAPACITY>;

/// Format into a [`Reason`], dropping whatever does not fit.
pub fn reason(args: fmt::Arguments<'_>) -> Reason {
    let mut out = Reason::new();
    let _ = fmt::Write::write_fmt(&mut Truncating(&mut out), args);
    out
}

struct Truncating<'a, const N: usize>(&'a mut heapless::String<N>);

impl<const N: usize> fmt::Write for Truncating<'_, N> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for c in s.chars() {
            if self.0.push(c).is_err() {
                break;
            }
        }
        Ok(())
    }
}

pub trait FromTruncated<T> {
    fn from_truncated(value: T) -> Self;
}

impl<'a, const N: usize> FromTruncated<&'a str> for heapless::String<N> {
    fn from_truncated(value: &'a str) -> Self {
        let mut out = heapless::String::<N>::new();
        let _ = fmt::Write::write_str(&mut Truncating(&mut out), value);
        out
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("event channel exhausted: {0:?}")]
    Channel(embassy_sync::pubsub::Error),
    #[error("failed to spawn task: {0:?}")]
    Spawn(SpawnError),
    #[error(transparent)]
    Config(#[from] ConfigurationError),
    #[error("failed to start sink thread: {0}")]
    Thread(#[from] std::io::Error),
}

impl From<embassy_sync::pubsub::Error> for AppError {
    fn from(value: embassy_sync::pubsub::Error) -> Self {
        Self::Channel(value)
    }
}

impl From<SpawnError> for AppError {
    fn from(value: SpawnError) -> Self {
        Self::Spawn(value)
    }
}
