//! Aggregate transfer counters for one listener.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use chrono::{DateTime, Utc};

use super::log::TransferRecord;

/// Counters shared by every connection of a listener.
#[derive(Debug)]
pub struct TransferStats {
    started_at: DateTime<Utc>,
    uploads_succeeded: AtomicU64,
    uploads_failed: AtomicU64,
    bytes_received: AtomicU64,
    bytes_sent: AtomicU64,
    downloads_served: AtomicU64,
    downloads_truncated: AtomicU64,
    deletions: AtomicU64,
    active_connections: AtomicUsize,
    total_connections: AtomicU64,
}

impl Default for TransferStats {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferStats {
    /// Create zeroed counters stamped with the current time.
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            uploads_succeeded: AtomicU64::new(0),
            uploads_failed: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            downloads_served: AtomicU64::new(0),
            downloads_truncated: AtomicU64::new(0),
            deletions: AtomicU64::new(0),
            active_connections: AtomicUsize::new(0),
            total_connections: AtomicU64::new(0),
        }
    }

    /// Count a finished upload.
    pub fn record_upload(&self, record: &TransferRecord) {
        self.bytes_received
            .fetch_add(record.bytes_transferred, Ordering::Relaxed);
        if record.is_success() {
            self.uploads_succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.uploads_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count an upload rejected before any byte was stored.
    pub fn record_rejected_upload(&self) {
        self.uploads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a download; `complete` is false when fewer bytes than announced
    /// were sent.
    pub fn record_download(&self, bytes_sent: u64, complete: bool) {
        self.bytes_sent.fetch_add(bytes_sent, Ordering::Relaxed);
        if complete {
            self.downloads_served.fetch_add(1, Ordering::Relaxed);
        } else {
            self.downloads_truncated.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Count a deleted file.
    pub fn record_deletion(&self) {
        self.deletions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a newly accepted connection.
    pub fn connection_opened(&self) {
        self.active_connections.fetch_add(1, Ordering::Relaxed);
        self.total_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a closed connection.
    pub fn connection_closed(&self) {
        // Saturate so an unbalanced close cannot wrap the gauge.
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| {
                Some(n.saturating_sub(1))
            });
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            started_at: self.started_at,
            uploads_succeeded: self.uploads_succeeded.load(Ordering::Relaxed),
            uploads_failed: self.uploads_failed.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            downloads_served: self.downloads_served.load(Ordering::Relaxed),
            downloads_truncated: self.downloads_truncated.load(Ordering::Relaxed),
            deletions: self.deletions.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_connections: self.total_connections.load(Ordering::Relaxed),
        }
    }
}

/// Plain copy of [`TransferStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub started_at: DateTime<Utc>,
    pub uploads_succeeded: u64,
    pub uploads_failed: u64,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub downloads_served: u64,
    pub downloads_truncated: u64,
    pub deletions: u64,
    pub active_connections: usize,
    pub total_connections: u64,
}

impl StatsSnapshot {
    /// Uploads attempted, successful or not.
    pub fn uploads_total(&self) -> u64 {
        self.uploads_succeeded + self.uploads_failed
    }

    /// Share of uploads that failed, in `0.0..=1.0`.
    pub fn failure_rate(&self) -> f64 {
        match self.uploads_total() {
            0 => 0.0,
            total => self.uploads_failed as f64 / total as f64,
        }
    }

    /// Time since the counters were created.
    pub fn uptime(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }
}
