//! Upload records and the append-only CSV transfer log.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::Result;

/// Header row of the transfer log.
pub const LOG_HEADER: &str = "Filename,FileSize,Duration,Status,Latency";

/// Durations are floored at this many seconds so throughput stays finite.
pub const MIN_DURATION_SECS: f64 = 1e-6;

/// Outcome classification of an upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    /// Every declared byte was received and written.
    Success,
    /// The upload stopped short of the declared size.
    Incomplete,
}

impl TransferStatus {
    /// The status as written to the log.
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Success => "SUCCESS",
            TransferStatus::Incomplete => "INCOMPLETE",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finished upload.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    /// Sanitized name the upload was stored under.
    pub filename: String,
    /// Size announced in the UPLOAD command.
    pub declared_size: u64,
    /// Bytes actually received and written. Never exceeds `declared_size`.
    pub bytes_transferred: u64,
    /// Wall time from opening the destination to the end of the stream.
    pub elapsed: Duration,
    /// Outcome.
    pub status: TransferStatus,
}

impl TransferRecord {
    /// Record an upload whose stream ended normally or early.
    ///
    /// The status is `Success` exactly when all declared bytes arrived.
    pub fn new(
        filename: impl Into<String>,
        declared_size: u64,
        bytes_transferred: u64,
        elapsed: Duration,
    ) -> Self {
        let bytes_transferred = bytes_transferred.min(declared_size);
        let status = if bytes_transferred == declared_size {
            TransferStatus::Success
        } else {
            TransferStatus::Incomplete
        };

        Self {
            filename: filename.into(),
            declared_size,
            bytes_transferred,
            elapsed,
            status,
        }
    }

    /// Duration in seconds, floored at [`MIN_DURATION_SECS`].
    pub fn duration_secs(&self) -> f64 {
        self.elapsed.as_secs_f64().max(MIN_DURATION_SECS)
    }

    /// Latency in milliseconds.
    pub fn latency_millis(&self) -> f64 {
        self.duration_secs() * 1000.0
    }

    /// Throughput in bytes per second.
    pub fn throughput(&self) -> f64 {
        let duration = self.duration_secs();
        if duration > 0.0 {
            self.bytes_transferred as f64 / duration
        } else {
            0.0
        }
    }

    /// Whether all declared bytes were stored.
    pub fn is_success(&self) -> bool {
        self.status == TransferStatus::Success
    }

    /// Render the record as one CSV row, without line terminator.
    pub fn to_csv_row(&self) -> String {
        format!(
            "{},{},{:.2},{},{:.2}",
            csv_field(&self.filename),
            self.bytes_transferred,
            self.duration_secs(),
            self.status,
            self.latency_millis()
        )
    }
}

/// Quote a CSV field when it contains a delimiter, quote or line break.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Append-only CSV log of finished uploads.
///
/// The log is written for external reporting and never read back.
#[derive(Debug)]
pub struct TransferLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl TransferLog {
    /// Open the log at `path`, writing the header if the file is new or empty.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        if file.metadata().await?.len() == 0 {
            file.write_all(format!("{LOG_HEADER}\n").as_bytes()).await?;
            file.flush().await?;
        }

        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    /// Get the path of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record.
    pub async fn append(&self, record: &TransferRecord) -> std::io::Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut file = OpenOptions::new().append(true).open(&self.path).await?;
        file.write_all(format!("{}\n", record.to_csv_row()).as_bytes())
            .await?;
        file.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_status_from_counts() {
        let ok = TransferRecord::new("a.txt", 5, 5, Duration::from_millis(10));
        assert_eq!(ok.status, TransferStatus::Success);
        assert!(ok.is_success());

        let short = TransferRecord::new("a.txt", 5, 3, Duration::from_millis(10));
        assert_eq!(short.status, TransferStatus::Incomplete);
    }

    #[test]
    fn test_bytes_clamped_to_declared() {
        let record = TransferRecord::new("a.txt", 5, 9, Duration::from_secs(1));
        assert_eq!(record.bytes_transferred, 5);
    }

    #[test]
    fn test_zero_duration_is_floored() {
        let record = TransferRecord::new("a.txt", 10, 10, Duration::ZERO);
        assert_eq!(record.duration_secs(), MIN_DURATION_SECS);
        assert!(record.throughput().is_finite());
        assert!(record.throughput() > 0.0);
    }

    #[test]
    fn test_timing_figures() {
        let record = TransferRecord::new("a.txt", 2048, 2048, Duration::from_secs(2));
        assert_eq!(record.duration_secs(), 2.0);
        assert_eq!(record.latency_millis(), 2000.0);
        assert_eq!(record.throughput(), 1024.0);
    }

    #[test]
    fn test_csv_row() {
        let record = TransferRecord::new("a.txt", 5, 5, Duration::from_millis(1500));
        assert_eq!(record.to_csv_row(), "a.txt,5,1.50,SUCCESS,1500.00");

        let record = TransferRecord::new("b.bin", 10, 4, Duration::from_millis(250));
        assert_eq!(record.to_csv_row(), "b.bin,4,0.25,INCOMPLETE,250.00");
    }

    #[test]
    fn test_csv_quotes_special_names() {
        assert_eq!(csv_field("plain.txt"), "plain.txt");
        assert_eq!(csv_field("a,b.txt"), "\"a,b.txt\"");
        assert_eq!(csv_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[tokio::test]
    async fn test_open_writes_header_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("logs").join("transfer_log.csv");

        TransferLog::open(&path).await.unwrap();
        TransferLog::open(&path).await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{LOG_HEADER}\n"));
    }

    #[tokio::test]
    async fn test_append_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transfer_log.csv");
        let log = TransferLog::open(&path).await.unwrap();
        assert_eq!(log.path(), path);

        log.append(&TransferRecord::new("a.txt", 5, 5, Duration::from_secs(1)))
            .await
            .unwrap();
        log.append(&TransferRecord::new("b.txt", 5, 2, Duration::from_secs(1)))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![
                LOG_HEADER,
                "a.txt,5,1.00,SUCCESS,1000.00",
                "b.txt,2,1.00,INCOMPLETE,1000.00",
            ]
        );
    }

    #[tokio::test]
    async fn test_existing_log_is_preserved() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("transfer_log.csv");
        std::fs::write(&path, format!("{LOG_HEADER}\nold.txt,1,0.01,SUCCESS,10.00\n")).unwrap();

        let log = TransferLog::open(&path).await.unwrap();
        log.append(&TransferRecord::new("new.txt", 1, 1, Duration::from_millis(10)))
            .await
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.starts_with(LOG_HEADER));
    }
}
