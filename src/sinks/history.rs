use core::future::Future;

use log::debug;
use thiserror::Error;

use super::{PipelineEvent, Sink, SinkError, SinkKind};
use crate::sampling::Metric;

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("history storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode history record: {0}")]
    Encode(postcard::Error),
}

/// Time-series history collaborator.
pub trait HistoryLog {
    /// Append one timestamped entry with a value per metric.
    fn append_entry(
        &mut self,
        timestamp: u64,
        fields: &[(Metric, f64)],
    ) -> impl Future<Output = Result<(), HistoryError>>;
}

/// Sink adapter that appends every completed window to the history log.
///
/// Availability changes are not recorded; gaps in the history show them.
pub struct HistorySink<L> {
    log: L,
}

impl<L: HistoryLog> HistorySink<L> {
    pub fn new(log: L) -> Self {
        Self { log }
    }

    pub fn log(&self) -> &L {
        &self.log
    }
}

impl<L: HistoryLog> Sink for HistorySink<L> {
    fn kind(&self) -> SinkKind {
        SinkKind::History
    }

    async fn process_event(&mut self, event: &PipelineEvent) -> Result<(), SinkError> {
        if let PipelineEvent::Reading(reading) = event {
            self.log
                .append_entry(reading.timestamp, &reading.fields())
                .await?;
            debug!("History entry appended at {}", reading.timestamp);
        }
        Ok(())
    }
}
