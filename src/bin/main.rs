//! Host runner for the pressure bridge.
//!
//! Samples a simulated BMP280 and fans readings out to a logging host state,
//! a file-backed history log and a loopback telemetry broker.
//!
//! Sampling and host-state updates run on the main executor. History and
//! telemetry each get an executor on their own thread, so blocking file I/O
//! delays neither a sensor read nor a telemetry publish.
//!
//! Set `BARO_HISTORY_DIR` to choose where history is written and `RUST_LOG`
//! to change the log level.

use std::path::PathBuf;

use embassy_executor::{Executor, SpawnError, SpawnToken, Spawner};
use log::{error, info};
use static_cell::StaticCell;

use baro_bridge::app_state::{AccessoryController, AccessoryInfo, AppError, LiveValues};
use baro_bridge::config::{Config, ConfigurationError, ResolvedConfig, TelemetryConfig};
use baro_bridge::sampling::{Sampler, SystemClock};
use baro_bridge::sensors::{Sensor, SimulatedBmp280};
use baro_bridge::sinks::{
    EventChannel, EventSubscriber, HistorySink, HostStateSink, LoggingHostState, LoopbackBroker,
    SinkRouter, TelemetrySink, run_sink,
};
use baro_bridge::storage::FileHistoryLog;

static EVENTS: EventChannel = EventChannel::new();
static LIVE: LiveValues = LiveValues::new();
static BROKER: LoopbackBroker = LoopbackBroker::new();
static HISTORY_EXECUTOR: StaticCell<Executor> = StaticCell::new();
static TELEMETRY_EXECUTOR: StaticCell<Executor> = StaticCell::new();

const BROKER_URL: &str = "mqtt://localhost:1883";
const FALLBACK_HOSTNAME: &str = "baro";

#[embassy_executor::task]
async fn sampling_task(
    controller: AccessoryController<'static, SimulatedBmp280, SystemClock>,
) -> ! {
    controller.run().await
}

#[embassy_executor::task]
async fn host_state_task(
    sink: HostStateSink<LoggingHostState>,
    subscriber: EventSubscriber<'static>,
) -> ! {
    run_sink(sink, subscriber).await
}

#[embassy_executor::task]
async fn history_task(
    sink: HistorySink<FileHistoryLog>,
    subscriber: EventSubscriber<'static>,
) -> ! {
    run_sink(sink, subscriber).await
}

#[embassy_executor::task]
async fn telemetry_task(
    sink: TelemetrySink<&'static LoopbackBroker>,
    subscriber: EventSubscriber<'static>,
) -> ! {
    run_sink(sink, subscriber).await
}

fn demo_config() -> Config {
    let history_dir = std::env::var_os("BARO_HISTORY_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join("baro-bridge"));

    Config {
        enable_history: true,
        history_storage_path: Some(history_dir),
        enable_telemetry: true,
        telemetry: Some(TelemetryConfig {
            url: String::from(BROKER_URL),
            ..TelemetryConfig::default()
        }),
        ..Config::default()
    }
}

fn hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .map(|name| name.trim().to_owned())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| String::from(FALLBACK_HOSTNAME))
}

fn open_history(resolved: &mut ResolvedConfig) -> Option<HistorySink<FileHistoryLog>> {
    if !resolved.sinks.history {
        return None;
    }
    let path = resolved.history_storage_path.clone()?;

    match FileHistoryLog::open(&path) {
        Ok(log) => {
            info!("History log at {}", log.path().display());
            Some(HistorySink::new(log))
        }
        Err(e) => {
            resolved.report(ConfigurationError::HistoryStorage {
                path: path.display().to_string(),
                details: e.to_string(),
            });
            None
        }
    }
}

/// Run one sink task on its own executor thread.
fn spawn_sink_thread<T: 'static>(
    name: &str,
    executor: &'static StaticCell<Executor>,
    task: impl FnOnce() -> Result<SpawnToken<T>, SpawnError> + Send + 'static,
) -> Result<(), AppError> {
    let thread_name = name.to_owned();
    std::thread::Builder::new()
        .name(name.to_owned())
        .spawn(move || {
            executor.init(Executor::new()).run(move |spawner| match task() {
                Ok(token) => spawner.spawn(token),
                Err(e) => error!("Failed to spawn {} task: {:?}", thread_name, e),
            });
        })?;
    Ok(())
}

fn start(spawner: Spawner) -> Result<(), AppError> {
    let mut resolved = demo_config().resolve();
    let history = open_history(&mut resolved);

    let telemetry = match &resolved.telemetry {
        Some(telemetry) if resolved.sinks.telemetry => {
            BROKER.connect(&telemetry.url);
            Some(TelemetrySink::new(&BROKER, telemetry.topics.clone()))
        }
        _ => None,
    };

    let sensor = SimulatedBmp280::new().with_failures_every(45);
    let info = AccessoryInfo::new(&resolved.name, sensor.model(), &hostname(), &resolved.device);

    let sampler = Sampler::new(sensor, SystemClock, resolved.window_size)?
        .with_limits(resolved.reading_limits);
    let router = SinkRouter::new(EVENTS.publisher()?, resolved.sinks);

    if resolved.sinks.host_state {
        let sink = HostStateSink::new(LoggingHostState::default());
        spawner.spawn(host_state_task(sink, EVENTS.subscriber()?)?);
    }

    if let Some(sink) = history {
        let subscriber = EVENTS.subscriber()?;
        spawn_sink_thread("baro-history", &HISTORY_EXECUTOR, move || {
            history_task(sink, subscriber)
        })?;
    }

    if let Some(sink) = telemetry {
        let subscriber = EVENTS.subscriber()?;
        spawn_sink_thread("baro-telemetry", &TELEMETRY_EXECUTOR, move || {
            telemetry_task(sink, subscriber)
        })?;
    }

    let controller =
        AccessoryController::new(info, resolved.sampling_period, sampler, router, &LIVE);
    let info = controller.info();
    info!(
        "{} {} (serial {}, firmware {})",
        info.manufacturer, info.model, info.serial_number, info.firmware_revision
    );
    spawner.spawn(sampling_task(controller)?);

    Ok(())
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = start(spawner) {
        error!("Failed to start bridge: {}", e);
        std::process::exit(1);
    }
}
