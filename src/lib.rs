//! Barometric pressure and temperature bridge.
//!
//! Samples a pressure/temperature sensor at a fixed period, smooths both
//! metrics over a sliding window and fans each completed window out to the
//! smart-home host state, a history log and a telemetry broker.

pub mod app_state;
pub mod config;
pub mod sampling;
pub mod sensors;
pub mod sinks;
pub mod storage;
