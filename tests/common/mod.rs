//! Test helpers for integration tests.
//!
//! Provides TestServer and a raw line-level TestClient.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use fileshare::config::Config;
use fileshare::{FileServer, ShutdownHandle, TransferEngine};

/// Default timeout for test operations.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// A server running on an OS-assigned port with its own store.
pub struct TestServer {
    pub addr: SocketAddr,
    pub engine: Arc<TransferEngine>,
    handle: ShutdownHandle,
    task: JoinHandle<fileshare::Result<()>>,
    temp_dir: TempDir,
}

impl TestServer {
    /// Start a server with the default test configuration.
    pub async fn start() -> Self {
        Self::start_with(|_| {}).await
    }

    /// Start a server after letting `customize` adjust the configuration.
    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Self {
        let temp_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.transfer_timeout_secs = 2;
        config.storage.root = temp_dir.path().join("files").display().to_string();
        config.storage.transfer_log = temp_dir
            .path()
            .join("transfer_log.csv")
            .display()
            .to_string();
        config.storage.chunk_size = 1024;
        customize(&mut config);
        config.validate().unwrap();

        let engine = Arc::new(TransferEngine::from_config(&config).await.unwrap());
        let server = FileServer::bind(&config.server, Arc::clone(&engine))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        let handle = server.shutdown_handle();
        let task = tokio::spawn(server.run());

        Self {
            addr,
            engine,
            handle,
            task,
            temp_dir,
        }
    }

    /// Directory holding the stored files.
    pub fn store_dir(&self) -> PathBuf {
        self.temp_dir.path().join("files")
    }

    /// Scratch directory for client-side files.
    pub fn scratch_dir(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Contents of the transfer log.
    pub fn transfer_log(&self) -> String {
        std::fs::read_to_string(self.temp_dir.path().join("transfer_log.csv")).unwrap()
    }

    /// Data rows of the transfer log, header excluded.
    pub fn log_rows(&self) -> Vec<String> {
        self.transfer_log()
            .lines()
            .skip(1)
            .map(str::to_string)
            .collect()
    }

    /// Stop the listener and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.handle.stop();
        timeout(DEFAULT_TIMEOUT, self.task)
            .await
            .expect("listener did not stop")
            .unwrap()
            .unwrap();
    }
}

/// Raw protocol client that speaks bytes and lines directly.
pub struct TestClient {
    reader: BufReader<TcpStream>,
}

impl TestClient {
    /// Connect to the server at the given address.
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.unwrap();
        Self {
            reader: BufReader::new(stream),
        }
    }

    /// Send raw bytes to the server.
    pub async fn send(&mut self, data: &[u8]) {
        let stream = self.reader.get_mut();
        stream.write_all(data).await.unwrap();
        stream.flush().await.unwrap();
    }

    /// Read one reply line including its newline. Empty at end of stream.
    pub async fn recv_line(&mut self) -> String {
        let mut line = String::new();
        timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut line))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        line
    }

    /// Read exactly `n` payload bytes.
    pub async fn recv_exact(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        timeout(DEFAULT_TIMEOUT, self.reader.read_exact(&mut buf))
            .await
            .expect("timed out waiting for payload")
            .unwrap();
        buf
    }

    /// Whether the server has closed the connection.
    pub async fn is_closed(&mut self) -> bool {
        let mut buf = Vec::new();
        matches!(
            timeout(DEFAULT_TIMEOUT, self.reader.read_to_end(&mut buf)).await,
            Ok(Ok(0)) | Ok(Err(_))
        )
    }

    /// Close the write side, signalling end of stream.
    pub async fn shutdown(&mut self) {
        self.reader.get_mut().shutdown().await.unwrap();
    }
}
