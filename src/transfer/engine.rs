//! Command execution against the file store.

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use super::log::{TransferLog, TransferRecord};
use super::stats::TransferStats;
use crate::config::Config;
use crate::file::{FileStore, StoreError, StoredName};
use crate::protocol::{Command, FramedReader, Reply};

/// Tunables for payload streaming.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Payload chunk size in bytes.
    pub chunk_size: usize,
    /// Deadline for each chunk read or write and for each reply write.
    pub transfer_timeout: Duration,
    /// Largest accepted declared upload size.
    pub upload_limit: Option<u64>,
}

impl TransferSettings {
    /// Build settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.storage.chunk_size.max(1),
            transfer_timeout: config.server.transfer_timeout(),
            upload_limit: config.storage.upload_limit(),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What the connection should do after a command has been executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Wait for the next command line.
    Continue,
    /// The stream is no longer in a known state; close it.
    Close,
}

/// How an upload stream ended.
#[derive(Debug)]
enum UploadEnd {
    Complete,
    PeerClosed,
    TimedOut,
    ReadFailed(io::Error),
    WriteFailed(io::Error),
}

/// Executes commands for every connection of a listener.
#[derive(Debug)]
pub struct TransferEngine {
    store: FileStore,
    log: TransferLog,
    stats: Arc<TransferStats>,
    settings: TransferSettings,
}

impl TransferEngine {
    /// Create an engine over an existing store and log.
    pub fn new(
        store: FileStore,
        log: TransferLog,
        stats: Arc<TransferStats>,
        settings: TransferSettings,
    ) -> Self {
        Self {
            store,
            log,
            stats,
            settings,
        }
    }

    /// Open the store and transfer log named in the configuration.
    pub async fn from_config(config: &Config) -> crate::Result<Self> {
        let store = FileStore::new(&config.storage.root)?;
        let log = TransferLog::open(&config.storage.transfer_log).await?;

        Ok(Self::new(
            store,
            log,
            Arc::new(TransferStats::new()),
            TransferSettings::from_config(config),
        ))
    }

    /// Get the file store.
    pub fn store(&self) -> &FileStore {
        &self.store
    }

    /// Get the transfer log.
    pub fn log(&self) -> &TransferLog {
        &self.log
    }

    /// Get the shared counters.
    pub fn stats(&self) -> &Arc<TransferStats> {
        &self.stats
    }

    /// Get the streaming settings.
    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Execute one command, writing its reply (and any payload) to `writer`.
    ///
    /// An `Err` means the connection itself failed and must be dropped.
    pub async fn execute<R, W>(
        &self,
        command: Command,
        reader: &mut FramedReader<R>,
        writer: &mut W,
    ) -> io::Result<Flow>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        match command {
            Command::Upload { name, size } => self.upload(&name, size, reader, writer).await,
            Command::List => {
                let reply = self.list().await;
                self.send_reply(writer, &reply).await?;
                Ok(Flow::Continue)
            }
            Command::Download { name } => self.download(&name, writer).await,
            Command::Delete { name } => {
                let reply = self.delete(&name).await;
                self.send_reply(writer, &reply).await?;
                Ok(Flow::Continue)
            }
        }
    }

    /// Receive `size` payload bytes from `reader` into the store under the
    /// base name of `raw_name`, overwriting any existing file.
    pub async fn upload<R, W>(
        &self,
        raw_name: &str,
        size: u64,
        reader: &mut FramedReader<R>,
        writer: &mut W,
    ) -> io::Result<Flow>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let name = match StoredName::sanitize(raw_name) {
            Ok(name) => name,
            Err(e) => {
                warn!("Rejected upload: {}", e);
                self.stats.record_rejected_upload();
                return self
                    .reject_upload(size, Reply::error("Invalid filename."), reader, writer)
                    .await;
            }
        };

        if let Some(limit) = self.settings.upload_limit {
            if size > limit {
                warn!(
                    "Rejected upload of '{}': {} bytes exceeds limit of {} bytes",
                    name, size, limit
                );
                self.stats.record_rejected_upload();
                return self
                    .reject_upload(size, Reply::error("File too large."), reader, writer)
                    .await;
            }
        }

        let _guard = self.store.lock(&name).await;

        let mut file = match self.store.create(&name).await {
            Ok(file) => file,
            Err(e) => {
                error!("Failed to save file '{}': {}", name, e);
                self.stats.record_rejected_upload();
                return self
                    .reject_upload(
                        size,
                        Reply::error("File transfer failed."),
                        reader,
                        writer,
                    )
                    .await;
            }
        };

        let started = Instant::now();
        let mut buf = vec![0u8; self.settings.chunk_size];
        let mut consumed: u64 = 0;
        let mut written: u64 = 0;

        let end = loop {
            if consumed == size {
                break UploadEnd::Complete;
            }

            let want = (size - consumed).min(buf.len() as u64) as usize;
            let n = match timeout(
                self.settings.transfer_timeout,
                reader.read_chunk(&mut buf[..want]),
            )
            .await
            {
                Ok(Ok(0)) => break UploadEnd::PeerClosed,
                Ok(Ok(n)) => n,
                Ok(Err(e)) => break UploadEnd::ReadFailed(e),
                Err(_) => break UploadEnd::TimedOut,
            };
            consumed += n as u64;

            if let Err(e) = file.write_all(&buf[..n]).await {
                break UploadEnd::WriteFailed(e);
            }
            written += n as u64;
        };

        // Partial files are left in place.
        let flushed = file.flush().await;
        drop(file);

        let end = match (end, flushed) {
            (UploadEnd::Complete, Err(e)) => {
                // How much reached the disk is unknown, so no record is written.
                error!("Failed to flush file '{}' after {} bytes: {}", name, written, e);
                self.stats.record_rejected_upload();
                return self
                    .reject_upload(0, Reply::error("File transfer failed."), reader, writer)
                    .await;
            }
            (end, Err(e)) => {
                debug!("Flush after aborted upload of '{}' failed: {}", name, e);
                end
            }
            (end, Ok(())) => end,
        };

        let record = TransferRecord::new(name.as_str(), size, written, started.elapsed());

        if let Err(e) = self.log.append(&record).await {
            warn!(
                "Failed to append transfer record for '{}' to {}: {}",
                name,
                self.log.path().display(),
                e
            );
        }
        self.stats.record_upload(&record);

        let cause = match end {
            UploadEnd::Complete => {
                info!(
                    "File '{}' ({} bytes) received in {:.2} seconds. Latency: {:.2} ms, throughput: {:.2} bytes/sec",
                    name,
                    record.bytes_transferred,
                    record.duration_secs(),
                    record.latency_millis(),
                    record.throughput()
                );
                self.send_reply(writer, &Reply::UploadSuccess).await?;
                return Ok(Flow::Continue);
            }
            UploadEnd::WriteFailed(e) => {
                error!(
                    "Failed to save file '{}' after {} of {} bytes: {}",
                    name, written, size, e
                );
                return self
                    .reject_upload(
                        size - consumed,
                        Reply::error("File transfer failed."),
                        reader,
                        writer,
                    )
                    .await;
            }
            UploadEnd::PeerClosed => "peer closed".to_string(),
            UploadEnd::TimedOut => "timed out".to_string(),
            UploadEnd::ReadFailed(e) => e.to_string(),
        };

        warn!(
            "File '{}' incomplete ({}). Received {} of {} bytes. Latency: {:.2} ms",
            name,
            cause,
            record.bytes_transferred,
            size,
            record.latency_millis()
        );
        // The peer may already be gone.
        if let Err(e) = self.send_reply(writer, &Reply::UploadIncomplete).await {
            debug!("Could not deliver incomplete-upload reply: {}", e);
        }
        Ok(Flow::Close)
    }

    /// List stored names that can be framed in a LIST reply.
    pub async fn list(&self) -> Reply {
        match self.store.list().await {
            Ok(names) => Reply::FileList(
                names
                    .into_iter()
                    .map(|name| name.to_string())
                    .filter(|name| {
                        let listable = Reply::is_listable(name);
                        if !listable {
                            debug!("Omitting unlistable name {:?}", name);
                        }
                        listable
                    })
                    .collect(),
            ),
            Err(e) => {
                error!("Error listing files: {}", e);
                Reply::error("Unable to list files.")
            }
        }
    }

    /// Send `FILE_FOUND <size>` and the file's bytes, or `FILE_NOT_FOUND`.
    pub async fn download<W>(&self, raw_name: &str, writer: &mut W) -> io::Result<Flow>
    where
        W: AsyncWrite + Unpin,
    {
        let name = match StoredName::sanitize(raw_name) {
            Ok(name) => name,
            Err(e) => {
                warn!("Rejected download: {}", e);
                self.send_reply(writer, &Reply::error("Invalid filename."))
                    .await?;
                return Ok(Flow::Continue);
            }
        };

        let _guard = self.store.lock(&name).await;

        let (file, size) = match self.store.open(&name).await {
            Ok(opened) => opened,
            Err(StoreError::NotFound(_)) => {
                debug!("Download of missing file '{}'", name);
                self.send_reply(writer, &Reply::FileNotFound).await?;
                return Ok(Flow::Continue);
            }
            Err(e) => {
                error!("Error opening '{}' for download: {}", name, e);
                self.send_reply(writer, &Reply::error("Unable to send file."))
                    .await?;
                return Ok(Flow::Continue);
            }
        };

        self.send_reply(writer, &Reply::FileFound(size)).await?;

        let started = Instant::now();
        let mut source = file.take(size);
        let mut buf = vec![0u8; self.settings.chunk_size];
        let mut sent: u64 = 0;

        while sent < size {
            let n = match source.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    error!("Error reading '{}' after {} bytes: {}", name, sent, e);
                    break;
                }
            };

            match timeout(self.settings.transfer_timeout, writer.write_all(&buf[..n])).await {
                Ok(Ok(())) => sent += n as u64,
                Ok(Err(e)) => {
                    self.stats.record_download(sent, false);
                    return Err(e);
                }
                Err(_) => {
                    warn!("Download of '{}' timed out after {} bytes", name, sent);
                    self.stats.record_download(sent, false);
                    return Ok(Flow::Close);
                }
            }
        }

        if let Err(e) = writer.flush().await {
            self.stats.record_download(sent, false);
            return Err(e);
        }

        let complete = sent == size;
        self.stats.record_download(sent, complete);

        if complete {
            info!(
                "File '{}' ({} bytes) sent in {:.2} seconds",
                name,
                sent,
                started.elapsed().as_secs_f64()
            );
            Ok(Flow::Continue)
        } else {
            warn!("File '{}' truncated: sent {} of {} bytes", name, sent, size);
            Ok(Flow::Close)
        }
    }

    /// Remove a stored file.
    pub async fn delete(&self, raw_name: &str) -> Reply {
        let name = match StoredName::sanitize(raw_name) {
            Ok(name) => name,
            Err(e) => {
                warn!("Rejected delete: {}", e);
                return Reply::error("Invalid filename.");
            }
        };

        let _guard = self.store.lock(&name).await;

        match self.store.delete(&name).await {
            Ok(true) => {
                info!("File '{}' deleted by client", name);
                self.stats.record_deletion();
                Reply::FileDeleted
            }
            Ok(false) => Reply::FileNotFound,
            Err(e) => {
                error!("Error deleting file '{}': {}", name, e);
                Reply::error("Unable to delete file.")
            }
        }
    }

    /// Write a reply line, bounded by the transfer timeout.
    pub async fn send_reply<W>(&self, writer: &mut W, reply: &Reply) -> io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        let line = reply.to_line();
        let write = async {
            writer.write_all(line.as_bytes()).await?;
            writer.flush().await
        };

        timeout(self.settings.transfer_timeout, write)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "reply write timed out"))?
    }

    /// Drain `remaining` payload bytes so the next command line is found at
    /// the right offset, then send `reply`.
    async fn reject_upload<R, W>(
        &self,
        remaining: u64,
        reply: Reply,
        reader: &mut FramedReader<R>,
        writer: &mut W,
    ) -> io::Result<Flow>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let drained = self.drain(reader, remaining).await;
        if !drained {
            if let Err(e) = self.send_reply(writer, &reply).await {
                debug!("Could not deliver rejection reply: {}", e);
            }
            return Ok(Flow::Close);
        }

        self.send_reply(writer, &reply).await?;
        Ok(Flow::Continue)
    }

    /// Returns `true` once all `remaining` bytes were read and dropped.
    async fn drain<R>(&self, reader: &mut FramedReader<R>, mut remaining: u64) -> bool
    where
        R: AsyncRead + Unpin,
    {
        let step = self.settings.chunk_size as u64;

        while remaining > 0 {
            match timeout(
                self.settings.transfer_timeout,
                reader.discard(remaining.min(step)),
            )
            .await
            {
                Ok(Ok(0)) => return false,
                Ok(Ok(n)) => remaining -= n,
                Ok(Err(e)) => {
                    debug!("Error draining rejected payload: {}", e);
                    return false;
                }
                Err(_) => {
                    debug!("Timed out draining rejected payload");
                    return false;
                }
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::FramedReader;
    use crate::transfer::{TransferStatus, LOG_HEADER};
    use tempfile::TempDir;

    struct Fixture {
        temp_dir: TempDir,
        engine: TransferEngine,
    }

    async fn fixture_with(settings: TransferSettings) -> Fixture {
        let temp_dir = TempDir::new().unwrap();
        let store = FileStore::new(temp_dir.path().join("files")).unwrap();
        let log = TransferLog::open(temp_dir.path().join("transfer_log.csv"))
            .await
            .unwrap();
        let engine = TransferEngine::new(store, log, Arc::new(TransferStats::new()), settings);
        Fixture { temp_dir, engine }
    }

    async fn fixture() -> Fixture {
        fixture_with(TransferSettings {
            chunk_size: 4,
            transfer_timeout: Duration::from_secs(2),
            upload_limit: None,
        })
        .await
    }

    fn framed(data: &[u8]) -> FramedReader<&[u8]> {
        FramedReader::new(data, 256)
    }

    fn log_rows(fixture: &Fixture) -> Vec<String> {
        std::fs::read_to_string(fixture.temp_dir.path().join("transfer_log.csv"))
            .unwrap()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    fn stored(fixture: &Fixture, name: &str) -> Vec<u8> {
        std::fs::read(fixture.temp_dir.path().join("files").join(name)).unwrap()
    }

    #[tokio::test]
    async fn test_upload_success() {
        let fx = fixture().await;
        let mut reader = framed(b"hello world");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("a.txt", 11, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"UPLOAD_SUCCESS\n");
        assert_eq!(stored(&fx, "a.txt"), b"hello world");

        let rows = log_rows(&fx);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("a.txt,11,"));
        assert!(rows[0].contains(",SUCCESS,"));
        assert_eq!(fx.engine.stats().snapshot().uploads_succeeded, 1);
    }

    #[tokio::test]
    async fn test_upload_leaves_following_bytes_unread() {
        let fx = fixture().await;
        let mut reader = framed(b"helloLIST\n");
        let mut out = Vec::new();

        fx.engine
            .upload("a.txt", 5, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(stored(&fx, "a.txt"), b"hello");
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("LIST"));
    }

    #[tokio::test]
    async fn test_upload_zero_bytes() {
        let fx = fixture().await;
        let mut reader = framed(b"");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("empty.bin", 0, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"UPLOAD_SUCCESS\n");
        assert!(stored(&fx, "empty.bin").is_empty());
    }

    #[tokio::test]
    async fn test_upload_incomplete_on_early_close() {
        let fx = fixture().await;
        let mut reader = framed(b"abc");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("short.bin", 10, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Close);
        assert_eq!(out, b"UPLOAD_INCOMPLETE\n");
        assert_eq!(stored(&fx, "short.bin"), b"abc");

        let rows = log_rows(&fx);
        assert_eq!(rows.len(), 1);
        assert!(rows[0].starts_with("short.bin,3,"));
        assert!(rows[0].contains(",INCOMPLETE,"));

        let snapshot = fx.engine.stats().snapshot();
        assert_eq!(snapshot.uploads_failed, 1);
        assert_eq!(snapshot.bytes_received, 3);
    }

    #[tokio::test]
    async fn test_upload_times_out() {
        let fx = fixture_with(TransferSettings {
            chunk_size: 4,
            transfer_timeout: Duration::from_millis(50),
            upload_limit: None,
        })
        .await;

        let (mut client, server) = tokio::io::duplex(64);
        client.write_all(b"ab").await.unwrap();
        let mut reader = FramedReader::new(server, 256);
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("slow.bin", 10, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Close);
        assert_eq!(out, b"UPLOAD_INCOMPLETE\n");
        assert!(log_rows(&fx)[0].starts_with("slow.bin,2,"));
        drop(client);
    }

    #[tokio::test]
    async fn test_upload_sanitizes_traversal() {
        let fx = fixture().await;
        let mut reader = framed(b"0123456789");
        let mut out = Vec::new();

        fx.engine
            .upload("../../etc/passwd", 10, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(out, b"UPLOAD_SUCCESS\n");
        assert_eq!(stored(&fx, "passwd"), b"0123456789");
        assert!(!fx.temp_dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn test_upload_invalid_name_drains_payload() {
        let fx = fixture().await;
        let mut reader = framed(b"12345LIST\n");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("../", 5, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"ERROR: Invalid filename.\n");
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("LIST"));
        assert!(log_rows(&fx).is_empty());
        assert_eq!(fx.engine.stats().snapshot().uploads_failed, 1);
    }

    #[tokio::test]
    async fn test_upload_over_limit() {
        let fx = fixture_with(TransferSettings {
            chunk_size: 4,
            transfer_timeout: Duration::from_secs(2),
            upload_limit: Some(4),
        })
        .await;
        let mut reader = framed(b"123456");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("big.bin", 6, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"ERROR: File too large.\n");
        assert!(!fx.engine.store().exists(&StoredName::sanitize("big.bin").unwrap()).await);
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let fx = fixture().await;
        let mut out = Vec::new();

        fx.engine
            .upload("f.txt", 8, &mut framed(b"original"), &mut out)
            .await
            .unwrap();
        fx.engine
            .upload("f.txt", 3, &mut framed(b"new"), &mut out)
            .await
            .unwrap();

        assert_eq!(stored(&fx, "f.txt"), b"new");
    }

    #[tokio::test]
    async fn test_upload_create_failure_drains_payload() {
        let fx = fixture().await;
        // A directory under the same name cannot be opened as a file
        std::fs::create_dir(fx.temp_dir.path().join("files").join("adir")).unwrap();
        let mut reader = framed(b"abcdLIST\n");
        let mut out = Vec::new();

        let flow = fx
            .engine
            .upload("adir", 4, &mut reader, &mut out)
            .await
            .unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"ERROR: File transfer failed.\n");
        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("LIST"));
        assert!(log_rows(&fx).is_empty());

        let snapshot = fx.engine.stats().snapshot();
        assert_eq!(snapshot.uploads_failed, 1);
        assert_eq!(snapshot.uploads_succeeded, 0);
    }

    #[tokio::test]
    async fn test_list() {
        let fx = fixture().await;
        assert_eq!(fx.engine.list().await, Reply::FileList(Vec::new()));

        let mut out = Vec::new();
        fx.engine
            .upload("b.txt", 1, &mut framed(b"b"), &mut out)
            .await
            .unwrap();
        fx.engine
            .upload("a.txt", 1, &mut framed(b"a"), &mut out)
            .await
            .unwrap();

        assert_eq!(
            fx.engine.list().await,
            Reply::FileList(vec!["a.txt".to_string(), "b.txt".to_string()])
        );
    }

    #[tokio::test]
    async fn test_list_omits_unframeable_names() {
        let fx = fixture().await;
        std::fs::write(fx.temp_dir.path().join("files").join("a|b"), b"x").unwrap();
        std::fs::write(fx.temp_dir.path().join("files").join("ok"), b"x").unwrap();

        assert_eq!(
            fx.engine.list().await,
            Reply::FileList(vec!["ok".to_string()])
        );
    }

    #[tokio::test]
    async fn test_download_found() {
        let fx = fixture().await;
        std::fs::write(fx.temp_dir.path().join("files").join("a.txt"), b"hello").unwrap();

        let mut out = Vec::new();
        let flow = fx.engine.download("a.txt", &mut out).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"FILE_FOUND 5\nhello");

        let snapshot = fx.engine.stats().snapshot();
        assert_eq!(snapshot.downloads_served, 1);
        assert_eq!(snapshot.bytes_sent, 5);
    }

    #[tokio::test]
    async fn test_download_large_file_in_chunks() {
        let fx = fixture().await;
        let content: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        std::fs::write(fx.temp_dir.path().join("files").join("big.bin"), &content).unwrap();

        let mut out = Vec::new();
        fx.engine.download("big.bin", &mut out).await.unwrap();

        let header = b"FILE_FOUND 10000\n";
        assert_eq!(&out[..header.len()], header);
        assert_eq!(&out[header.len()..], content.as_slice());
    }

    #[tokio::test]
    async fn test_download_missing() {
        let fx = fixture().await;
        let mut out = Vec::new();

        let flow = fx.engine.download("nope.txt", &mut out).await.unwrap();

        assert_eq!(flow, Flow::Continue);
        assert_eq!(out, b"FILE_NOT_FOUND\n");
    }

    #[tokio::test]
    async fn test_download_directory_is_not_found() {
        let fx = fixture().await;
        std::fs::create_dir(fx.temp_dir.path().join("files").join("dir")).unwrap();

        let mut out = Vec::new();
        fx.engine.download("dir", &mut out).await.unwrap();
        assert_eq!(out, b"FILE_NOT_FOUND\n");
    }

    #[tokio::test]
    async fn test_delete() {
        let fx = fixture().await;
        std::fs::write(fx.temp_dir.path().join("files").join("a.txt"), b"x").unwrap();

        assert_eq!(fx.engine.delete("a.txt").await, Reply::FileDeleted);
        assert_eq!(fx.engine.delete("a.txt").await, Reply::FileNotFound);
        assert_eq!(
            fx.engine.delete("..").await,
            Reply::Error("Invalid filename.".to_string())
        );
        assert_eq!(fx.engine.stats().snapshot().deletions, 1);
    }

    #[tokio::test]
    async fn test_execute_dispatch() {
        let fx = fixture().await;
        let mut reader = framed(b"hi");
        let mut out = Vec::new();

        fx.engine
            .execute(
                Command::Upload {
                    name: "x".to_string(),
                    size: 2,
                },
                &mut reader,
                &mut out,
            )
            .await
            .unwrap();
        fx.engine
            .execute(Command::List, &mut reader, &mut out)
            .await
            .unwrap();
        fx.engine
            .execute(
                Command::Download {
                    name: "x".to_string(),
                },
                &mut reader,
                &mut out,
            )
            .await
            .unwrap();
        fx.engine
            .execute(
                Command::Delete {
                    name: "x".to_string(),
                },
                &mut reader,
                &mut out,
            )
            .await
            .unwrap();

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "UPLOAD_SUCCESS\nx\nFILE_FOUND 2\nhiFILE_DELETED\n"
        );
    }

    #[tokio::test]
    async fn test_record_status_matches_counts() {
        let fx = fixture().await;
        let mut out = Vec::new();
        fx.engine
            .upload("a", 4, &mut framed(b"ab"), &mut out)
            .await
            .unwrap();

        let row = &log_rows(&fx)[0];
        assert!(row.contains(TransferStatus::Incomplete.as_str()));
        let header = std::fs::read_to_string(fx.engine.log().path()).unwrap();
        assert!(header.starts_with(LOG_HEADER));
    }
}
