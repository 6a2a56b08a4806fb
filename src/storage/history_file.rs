use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::warn;

use super::{HISTORY_FILE, HistoryRecord};
use crate::sampling::Metric;
use crate::sinks::{HistoryError, HistoryLog};

/// Append-only history log in a single file.
///
/// Each record is postcard-encoded and COBS-framed. A torn write loses only
/// that record: the next append starts a fresh frame, and frames that fail to
/// decode are skipped on read.
///
/// Writes are blocking; run the history sink on an executor that may block.
pub struct FileHistoryLog {
    path: PathBuf,
}

impl FileHistoryLog {
    /// Open (creating if needed) the history log in directory `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, HistoryError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        Ok(Self {
            path: dir.join(HISTORY_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record to the file.
    pub fn append(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
        let mut bytes = postcard::to_allocvec_cobs(record).map_err(HistoryError::Encode)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        // Close off a torn frame so it cannot swallow this record.
        if file.metadata()?.len() > 0 {
            let mut last = [0u8; 1];
            file.seek(SeekFrom::End(-1))?;
            file.read_exact(&mut last)?;
            if last[0] != 0 {
                bytes.insert(0, 0);
            }
        }

        file.write_all(&bytes)?;

        Ok(())
    }

    /// Read every record whose timestamp lies within `within_window` (inclusive).
    ///
    /// Corrupt frames are logged and skipped.
    pub fn read_window(
        &self,
        within_window: (u64, u64),
    ) -> Result<Vec<HistoryRecord>, HistoryError> {
        let mut bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for frame in bytes.split_inclusive_mut(|b| *b == 0) {
            if frame.last() != Some(&0) {
                warn!("Ignoring truncated record at end of {}", self.path.display());
                continue;
            }

            let record: HistoryRecord = match postcard::from_bytes_cobs(frame) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Skipping corrupt record in {}: {}", self.path.display(), e);
                    continue;
                }
            };
            if record.time >= within_window.0 && record.time <= within_window.1 {
                records.push(record);
            }
        }

        Ok(records)
    }
}

impl HistoryLog for FileHistoryLog {
    async fn append_entry(
        &mut self,
        timestamp: u64,
        fields: &[(Metric, f64)],
    ) -> Result<(), HistoryError> {
        self.append(&HistoryRecord::new(timestamp, fields))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embassy_futures::block_on;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut log = FileHistoryLog::open(dir.path()).unwrap();

        for (i, mbar) in [1000.0, 1001.5, 1003.25].into_iter().enumerate() {
            block_on(log.append_entry(
                1_000 + i as u64 * 30,
                &[(Metric::Pressure, mbar), (Metric::Temperature, 20.0 + i as f64)],
            ))
            .unwrap();
        }

        let all = log.read_window((0, u64::MAX)).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[1].time, 1_030);
        assert_eq!(all[1].value(Metric::Pressure), Some(1001.5));
        assert_eq!(all[2].value(Metric::Temperature), Some(22.0));
    }

    #[test]
    fn test_read_window_filters_by_time() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::open(dir.path()).unwrap();
        for time in [100, 200, 300, 400] {
            log.append(&HistoryRecord::new(time, &[(Metric::Pressure, 1000.0)]))
                .unwrap();
        }

        let times: Vec<u64> = log
            .read_window((200, 300))
            .unwrap()
            .iter()
            .map(|record| record.time)
            .collect();
        assert_eq!(times, vec![200, 300]);
    }

    #[test]
    fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::open(dir.path().join("nested")).unwrap();
        assert!(log.read_window((0, u64::MAX)).unwrap().is_empty());
    }

    #[test]
    fn test_torn_tail_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::open(dir.path()).unwrap();
        log.append(&HistoryRecord::new(1, &[(Metric::Temperature, 21.0)]))
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(&[0x03, 0x01]).unwrap();

        let records = log.read_window((0, u64::MAX)).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_append_after_torn_tail_keeps_both_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::open(dir.path()).unwrap();
        log.append(&HistoryRecord::new(1, &[(Metric::Pressure, 1000.0)]))
            .unwrap();

        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(&[0x03, 0x01]).unwrap();
        drop(file);

        log.append(&HistoryRecord::new(2, &[(Metric::Pressure, 1001.0)]))
            .unwrap();

        let times: Vec<u64> = log
            .read_window((0, u64::MAX))
            .unwrap()
            .iter()
            .map(|record| record.time)
            .collect();
        assert_eq!(times, vec![1, 2]);
    }

    #[test]
    fn test_corrupt_frame_does_not_hide_later_records() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileHistoryLog::open(dir.path()).unwrap();
        log.append(&HistoryRecord::new(1, &[(Metric::Pressure, 1000.0)]))
            .unwrap();

        // A complete frame whose payload is not a record.
        let mut file = OpenOptions::new().append(true).open(log.path()).unwrap();
        file.write_all(&[0x02, 0xff, 0x00]).unwrap();
        drop(file);

        log.append(&HistoryRecord::new(3, &[(Metric::Pressure, 1002.0)]))
            .unwrap();

        let records = log.read_window((0, u64::MAX)).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].time, 3);
    }
}
