//! fileshare - TCP file sharing server
//!
//! Clients upload, list, download and delete files in a flat server-side
//! store over a line-oriented protocol with length-prefixed payloads. Every
//! upload is recorded in an append-only CSV transfer log.

pub mod client;
pub mod config;
pub mod error;
pub mod file;
pub mod logging;
pub mod protocol;
pub mod server;
pub mod transfer;

pub use client::{ClientError, DeleteResult, DownloadResult, FileClient, UploadResult};
pub use config::Config;
pub use error::{FileShareError, Result};
pub use file::{FileStore, StoredName};
pub use protocol::{Command, Reply};
pub use server::{CloseReason, Connection, FileServer, ShutdownHandle};
pub use transfer::{TransferEngine, TransferLog, TransferRecord, TransferStats, TransferStatus};
