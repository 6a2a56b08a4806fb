//! Configuration model and validation.
//!
//! [`Config`] is plain serde data so the host can load it from whatever format
//! it uses. [`Config::resolve`] turns it into a [`ResolvedConfig`]: invalid
//! values fall back to defaults and invalid sink blocks disable that sink.
//! Every problem is logged once and kept in [`ResolvedConfig::issues`];
//! none of them stop the pipeline.

use std::path::PathBuf;

use embassy_time::Duration;
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::sampling::{MAX_WINDOW, Metric, ReadingLimits};
use crate::sinks::{SinkKind, SinkSet, Topics};

pub const DEFAULT_SAMPLING_PERIOD_MS: u64 = 1000;
pub const DEFAULT_WINDOW_SIZE: usize = 30;
pub const DEFAULT_DEVICE: &str = "/dev/spidev0.1";
pub const DEFAULT_DEVICE_LABEL: &str = "BMP280";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("window size {requested} outside 1..={max}")]
    InvalidWindowSize { requested: usize, max: usize },
    #[error("sampling period must be at least 1 ms")]
    InvalidSamplingPeriod,
    #[error("history is enabled but no storage path is configured")]
    MissingHistoryPath,
    #[error("history storage at {path} could not be opened: {details}")]
    HistoryStorage { path: String, details: String },
    #[error("telemetry is enabled but no broker configuration was found")]
    MissingTelemetryConfig,
    #[error("telemetry broker URL is empty")]
    MissingBrokerUrl,
    #[error("invalid plausibility range for {metric}")]
    InvalidReadingLimits { metric: Metric },
}

impl ConfigurationError {
    /// The sink this problem disables, if it is a sink problem.
    pub fn disables(&self) -> Option<SinkKind> {
        match self {
            Self::MissingHistoryPath | Self::HistoryStorage { .. } => Some(SinkKind::History),
            Self::MissingTelemetryConfig | Self::MissingBrokerUrl => Some(SinkKind::Telemetry),
            Self::InvalidWindowSize { .. }
            | Self::InvalidSamplingPeriod
            | Self::InvalidReadingLimits { .. } => None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Display name of the accessory
    pub name: String,
    /// Bus device of the sensor
    pub device: String,
    pub sampling_period_ms: u64,
    /// Number of successful samples per averaging window
    pub window_size: usize,
    pub enable_host_state: bool,
    pub enable_history: bool,
    pub history_storage_path: Option<PathBuf>,
    pub enable_telemetry: bool,
    pub telemetry: Option<TelemetryConfig>,
    /// Plausibility check for raw reads; off when absent
    pub reading_limits: Option<ReadingLimits>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: String::from("Weather"),
            device: String::from(DEFAULT_DEVICE),
            sampling_period_ms: DEFAULT_SAMPLING_PERIOD_MS,
            window_size: DEFAULT_WINDOW_SIZE,
            enable_host_state: true,
            enable_history: false,
            history_storage_path: None,
            enable_telemetry: false,
            telemetry: None,
            reading_limits: None,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TelemetryConfig {
    pub url: String,
    /// Prefix of the default topics
    pub device_label: String,
    pub pressure_topic: Option<String>,
    pub temperature_topic: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            device_label: String::from(DEFAULT_DEVICE_LABEL),
            pressure_topic: None,
            temperature_topic: None,
        }
    }
}

impl TelemetryConfig {
    pub fn topics(&self) -> Topics {
        let defaults = Topics::for_device(&self.device_label);
        Topics {
            pressure: self.pressure_topic.clone().unwrap_or(defaults.pressure),
            temperature: self.temperature_topic.clone().unwrap_or(defaults.temperature),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTelemetry {
    pub url: String,
    pub topics: Topics,
}

/// Validated settings the pipeline is built from.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub name: String,
    pub device: String,
    pub sampling_period: Duration,
    pub window_size: usize,
    pub sinks: SinkSet,
    pub history_storage_path: Option<PathBuf>,
    pub telemetry: Option<ResolvedTelemetry>,
    pub reading_limits: Option<ReadingLimits>,
    pub issues: Vec<ConfigurationError>,
}

impl ResolvedConfig {
    /// Record a problem found after resolution (e.g. storage failing to open).
    pub fn report(&mut self, issue: ConfigurationError) {
        error!("Configuration error: {}", issue);
        if let Some(kind) = issue.disables() {
            error!("Disabling {} sink", kind);
            self.sinks.disable(kind);
        }
        self.issues.push(issue);
    }
}

impl Config {
    pub fn resolve(&self) -> ResolvedConfig {
        let mut resolved = ResolvedConfig {
            name: self.name.clone(),
            device: self.device.clone(),
            sampling_period: Duration::from_millis(DEFAULT_SAMPLING_PERIOD_MS),
            window_size: DEFAULT_WINDOW_SIZE,
            sinks: SinkSet {
                host_state: self.enable_host_state,
                history: self.enable_history,
                telemetry: self.enable_telemetry,
            },
            history_storage_path: None,
            telemetry: None,
            reading_limits: None,
            issues: Vec::new(),
        };

        if self.sampling_period_ms == 0 {
            resolved.report(ConfigurationError::InvalidSamplingPeriod);
        } else {
            resolved.sampling_period = Duration::from_millis(self.sampling_period_ms);
        }

        if self.window_size == 0 || self.window_size > MAX_WINDOW {
            resolved.report(ConfigurationError::InvalidWindowSize {
                requested: self.window_size,
                max: MAX_WINDOW,
            });
        } else {
            resolved.window_size = self.window_size;
        }

        if let Some(limits) = self.reading_limits {
            match limits.validate() {
                Ok(()) => resolved.reading_limits = Some(limits),
                Err(e) => resolved.report(e),
            }
        }

        if self.enable_history {
            match &self.history_storage_path {
                Some(path) => resolved.history_storage_path = Some(path.clone()),
                None => resolved.report(ConfigurationError::MissingHistoryPath),
            }
        }

        if self.enable_telemetry {
            match &self.telemetry {
                None => resolved.report(ConfigurationError::MissingTelemetryConfig),
                Some(telemetry) if telemetry.url.trim().is_empty() => {
                    resolved.report(ConfigurationError::MissingBrokerUrl)
                }
                Some(telemetry) => {
                    resolved.telemetry = Some(ResolvedTelemetry {
                        url: telemetry.url.clone(),
                        topics: telemetry.topics(),
                    })
                }
            }
        }

        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampling::Bounds;

    #[test]
    fn test_defaults() {
        let resolved = Config::default().resolve();

        assert_eq!(resolved.sampling_period, Duration::from_millis(1000));
        assert_eq!(resolved.window_size, 30);
        assert_eq!(
            resolved.sinks,
            SinkSet {
                host_state: true,
                history: false,
                telemetry: false
            }
        );
        assert!(resolved.issues.is_empty());
    }

    #[test]
    fn test_invalid_window_falls_back() {
        let config = Config {
            window_size: 0,
            sampling_period_ms: 0,
            ..Config::default()
        };
        let resolved = config.resolve();

        assert_eq!(resolved.window_size, DEFAULT_WINDOW_SIZE);
        assert_eq!(
            resolved.sampling_period,
            Duration::from_millis(DEFAULT_SAMPLING_PERIOD_MS)
        );
        assert_eq!(resolved.issues.len(), 2);
        assert!(resolved.sinks.host_state);
    }

    #[test]
    fn test_missing_history_path_disables_history_only() {
        let config = Config {
            enable_history: true,
            enable_telemetry: true,
            telemetry: Some(TelemetryConfig {
                url: String::from("mqtt://broker:1883"),
                ..TelemetryConfig::default()
            }),
            ..Config::default()
        };
        let resolved = config.resolve();

        assert_eq!(resolved.issues, vec![ConfigurationError::MissingHistoryPath]);
        assert!(!resolved.sinks.history);
        assert!(resolved.sinks.telemetry);
        assert!(resolved.sinks.host_state);
    }

    #[test]
    fn test_telemetry_requires_url() {
        let config = Config {
            enable_telemetry: true,
            telemetry: Some(TelemetryConfig::default()),
            ..Config::default()
        };
        let resolved = config.resolve();

        assert_eq!(resolved.issues, vec![ConfigurationError::MissingBrokerUrl]);
        assert!(!resolved.sinks.telemetry);

        let config = Config {
            enable_telemetry: true,
            ..Config::default()
        };
        assert_eq!(
            config.resolve().issues,
            vec![ConfigurationError::MissingTelemetryConfig]
        );
    }

    #[test]
    fn test_topic_defaults_and_overrides() {
        let telemetry = TelemetryConfig {
            url: String::from("mqtt://broker:1883"),
            device_label: String::from("attic"),
            temperature_topic: Some(String::from("home/attic/temp")),
            ..TelemetryConfig::default()
        };
        let topics = telemetry.topics();

        assert_eq!(topics.pressure, "attic/pressure");
        assert_eq!(topics.temperature, "home/attic/temp");
    }

    #[test]
    fn test_invalid_limits_are_dropped() {
        let config = Config {
            reading_limits: Some(ReadingLimits {
                pressure_pa: Bounds::new(1.0, 0.0),
                temperature_c: Bounds::new(-40.0, 85.0),
            }),
            ..Config::default()
        };
        let resolved = config.resolve();

        assert_eq!(resolved.reading_limits, None);
        assert_eq!(
            resolved.issues,
            vec![ConfigurationError::InvalidReadingLimits {
                metric: Metric::Pressure
            }]
        );
    }

    #[test]
    fn test_late_storage_failure_disables_history() {
        let mut resolved = Config {
            enable_history: true,
            history_storage_path: Some(PathBuf::from("/nonexistent")),
            ..Config::default()
        }
        .resolve();
        assert!(resolved.sinks.history);

        resolved.report(ConfigurationError::HistoryStorage {
            path: String::from("/nonexistent"),
            details: String::from("permission denied"),
        });
        assert!(!resolved.sinks.history);
    }

    #[test]
    fn test_postcard_round_trip_keeps_defaults() {
        let config = Config {
            enable_history: true,
            history_storage_path: Some(PathBuf::from("/var/lib/baro")),
            ..Config::default()
        };
        let bytes = postcard::to_allocvec(&config).unwrap();
        let decoded: Config = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, config);
    }
}
