//! On-disk history storage.
//!
//! One append-only file of [`HistoryRecord`]s per history directory.

mod history_file;

pub use history_file::FileHistoryLog;

use serde::{Deserialize, Serialize};

use crate::sampling::Metric;

/// File name of the history log inside the configured storage directory.
pub const HISTORY_FILE: &str = "history.bin";

/// One stored history entry.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    /// Seconds since the Unix epoch
    pub time: u64,
    pub fields: Vec<(Metric, f64)>,
}

impl HistoryRecord {
    pub fn new(time: u64, fields: &[(Metric, f64)]) -> Self {
        Self {
            time,
            fields: fields.to_vec(),
        }
    }

    pub fn value(&self, metric: Metric) -> Option<f64> {
        self.fields
            .iter()
            .find(|(m, _)| *m == metric)
            .map(|(_, value)| *value)
    }
}
