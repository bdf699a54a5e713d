//! Record sink
//!
//! Appends every activity record to two per-day files: `clicks.ndjson`
//! (one JSON object per line) and `clicks.csv` (header written once per
//! file). The sink is best-effort; failures are logged and never reach the
//! caller.

use crate::capture::config::ConfigHandle;
use crate::recorder::channel::CaptureResult;
use crate::recorder::record::{day_dir, ActivityRecord, CSV_HEADER};
use chrono::{DateTime, Utc};
use parking_lot::Mutex as ParkingMutex;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;

pub const NDJSON_FILE: &str = "clicks.ndjson";
pub const CSV_FILE: &str = "clicks.csv";

/// Destination for flushed activity records
pub trait RecordSink: Send + Sync {
    /// Persist one record. Must not panic or block indefinitely.
    fn log_click(&self, record: &ActivityRecord);
}

/// File-backed sink writing NDJSON and CSV side by side
pub struct ClickLogger {
    config: ConfigHandle,
    ndjson_lock: ParkingMutex<()>,
    csv_lock: ParkingMutex<()>,
}

impl ClickLogger {
    pub fn new(config: ConfigHandle) -> Self {
        Self {
            config,
            ndjson_lock: ParkingMutex::new(()),
            csv_lock: ParkingMutex::new(()),
        }
    }

    fn day_folder(&self, ts: &DateTime<Utc>) -> PathBuf {
        day_dir(&self.config.snapshot().output_base, ts)
    }

    /// NDJSON file for the day of `ts`
    pub fn ndjson_path(&self, ts: &DateTime<Utc>) -> PathBuf {
        self.day_folder(ts).join(NDJSON_FILE)
    }

    /// CSV file for the day of `ts`
    pub fn csv_path(&self, ts: &DateTime<Utc>) -> PathBuf {
        self.day_folder(ts).join(CSV_FILE)
    }

    fn write_ndjson(&self, record: &ActivityRecord) -> CaptureResult<PathBuf> {
        let path = self.ndjson_path(&record.timestamp);
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        let _guard = self.ndjson_lock.lock();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(&line)?;
        Ok(path)
    }

    fn write_csv(&self, record: &ActivityRecord) -> CaptureResult<PathBuf> {
        let path = self.csv_path(&record.timestamp);

        let _guard = self.csv_lock.lock();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let needs_header = file.metadata()?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if needs_header {
            writer.write_record(CSV_HEADER)?;
        }
        writer.write_record(record.csv_row())?;
        writer.flush()?;
        Ok(path)
    }
}

impl RecordSink for ClickLogger {
    fn log_click(&self, record: &ActivityRecord) {
        tracing::info!(
            "Logging click: source={}, x={:?}, y={:?}, text={:?}",
            record.source,
            record.x,
            record.y,
            record.text.as_deref().map(|t| t.chars().take(50).collect::<String>())
        );

        match self.write_ndjson(record) {
            Ok(path) => tracing::debug!("Wrote to NDJSON: {:?}", path),
            Err(e) => tracing::error!("Failed to write NDJSON: {}", e),
        }

        match self.write_csv(record) {
            Ok(path) => tracing::debug!("Wrote to CSV: {:?}", path),
            Err(e) => tracing::error!("Failed to write CSV: {}", e),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::time::{Duration, Instant};

    /// Sink that keeps every record in memory
    #[derive(Default)]
    pub struct MemorySink {
        records: ParkingMutex<Vec<ActivityRecord>>,
    }

    impl MemorySink {
        pub fn records(&self) -> Vec<ActivityRecord> {
            self.records.lock().clone()
        }

        pub fn len(&self) -> usize {
            self.records.lock().len()
        }

        /// Wait (bounded) until at least `count` records arrived
        pub async fn wait_for(&self, count: usize, limit: Duration) -> Vec<ActivityRecord> {
            let start = Instant::now();
            while self.len() < count && start.elapsed() < limit {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            self.records()
        }
    }

    impl RecordSink for MemorySink {
        fn log_click(&self, record: &ActivityRecord) {
            self.records.lock().push(record.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::config::CaptureConfig;
    use crate::recorder::record::Source;
    use chrono::TimeZone;
    use tempfile::tempdir;

    fn logger(base: &std::path::Path) -> ClickLogger {
        ClickLogger::new(ConfigHandle::new(CaptureConfig::new(1.0, base)))
    }

    fn record() -> ActivityRecord {
        let mut record = ActivityRecord::new(Source::Os);
        record.timestamp = Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 12).unwrap();
        record.x = Some(100);
        record.y = Some(200);
        record.app_name = Some("acrobat".to_string());
        record.text = Some("Clicked, \"inside\"\nPDF".to_string());
        record
    }

    #[test]
    fn test_writes_both_representations() {
        let dir = tempdir().expect("tempdir");
        let sink = logger(dir.path());
        let record = record();

        sink.log_click(&record);

        let day = dir.path().join("2024-05-01");
        let ndjson = std::fs::read_to_string(day.join(NDJSON_FILE)).expect("ndjson");
        let lines: Vec<&str> = ndjson.lines().collect();
        assert_eq!(lines.len(), 1);
        let parsed: ActivityRecord = serde_json::from_str(lines[0]).expect("parse line");
        assert_eq!(parsed, record);

        let mut reader = csv::Reader::from_path(day.join(CSV_FILE)).expect("csv");
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADER.to_vec());
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(&rows[0][0], "2024-05-01T09:30:12.000Z");
        assert_eq!(&rows[0][3], "acrobat");
        assert_eq!(&rows[0][10], "Clicked, \"inside\" PDF");
        assert_eq!(&rows[0][11], "");
    }

    #[test]
    fn test_sink_does_not_deduplicate() {
        let dir = tempdir().expect("tempdir");
        let sink = logger(dir.path());
        let record = record();

        sink.log_click(&record);
        sink.log_click(&record);

        let day = dir.path().join("2024-05-01");
        let ndjson = std::fs::read_to_string(day.join(NDJSON_FILE)).expect("ndjson");
        assert_eq!(ndjson.lines().count(), 2);

        let csv_text = std::fs::read_to_string(day.join(CSV_FILE)).expect("csv");
        let header_count = csv_text
            .lines()
            .filter(|l| l.starts_with("timestamp_utc,"))
            .count();
        assert_eq!(header_count, 1);
        let mut reader = csv::Reader::from_path(day.join(CSV_FILE)).expect("csv");
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_one_representation_failing_does_not_block_the_other() {
        let dir = tempdir().expect("tempdir");
        let sink = logger(dir.path());
        let record = record();

        // A directory where the NDJSON file should be makes that write fail.
        let day = dir.path().join("2024-05-01");
        std::fs::create_dir_all(day.join(NDJSON_FILE)).expect("blocker");

        sink.log_click(&record);

        let mut reader = csv::Reader::from_path(day.join(CSV_FILE)).expect("csv");
        assert_eq!(reader.records().count(), 1);
    }

    #[test]
    fn test_output_base_follows_config() {
        let first = tempdir().expect("tempdir");
        let second = tempdir().expect("tempdir");
        let config = ConfigHandle::new(CaptureConfig::new(1.0, first.path()));
        let sink = ClickLogger::new(config.clone());

        config.update(None, Some(second.path().to_path_buf()));
        sink.log_click(&record());

        assert!(second.path().join("2024-05-01").join(NDJSON_FILE).exists());
        assert!(!first.path().join("2024-05-01").exists());
    }
}
