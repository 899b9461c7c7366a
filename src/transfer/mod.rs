//! Transfer engine.
//!
//! Executes parsed commands against the file store:
//! - Chunked upload and download streaming with per-chunk deadlines
//! - Byte accounting and SUCCESS / INCOMPLETE classification
//! - Duration, latency and throughput figures for every upload
//! - The append-only CSV transfer log and shared counters

mod engine;
mod log;
mod stats;

pub use engine::{Flow, TransferEngine, TransferSettings};
pub use log::{TransferLog, TransferRecord, TransferStatus, LOG_HEADER, MIN_DURATION_SECS};
pub use stats::{StatsSnapshot, TransferStats};
