//! Client for the file share protocol.
//!
//! [`FileClient`] sends one command at a time and waits for its reply, so a
//! single connection never has more than one request in flight.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::file::StoredName;
use crate::protocol::{Command, FrameError, FramedReader, Reply};

/// Longest reply line the client accepts. LIST replies grow with the store.
const MAX_REPLY_LINE: usize = 1024 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const CHUNK_SIZE: usize = 4096;

/// Errors returned by [`FileClient`].
#[derive(Error, Debug)]
pub enum ClientError {
    /// Socket or local file error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The name cannot be sent as a command argument.
    #[error("invalid filename: {0:?}")]
    InvalidName(String),

    /// The server answered with `ERROR: ...`.
    #[error("server error: {0}")]
    Server(String),

    /// The server sent something this request does not expect.
    #[error("unexpected reply: {0:?}")]
    UnexpectedReply(String),

    /// The connection ended before the reply or payload was complete.
    #[error("download truncated: expected {expected} bytes, received {received}")]
    Truncated { expected: u64, received: u64 },

    /// The server closed the connection.
    #[error("connection closed by server")]
    Closed,

    /// No reply arrived in time.
    #[error("timed out waiting for the server")]
    Timeout,
}

/// Outcome of an upload the server accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadResult {
    Success,
    Incomplete,
}

/// Outcome of a download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadResult {
    /// The complete file content.
    Found(Vec<u8>),
    NotFound,
}

/// Outcome of a delete request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
}

/// A connection to a file share server.
pub struct FileClient {
    reader: FramedReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    timeout: Duration,
}

impl FileClient {
    /// Connect to a server.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            info!("Connected to file server at {}", peer);
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: FramedReader::new(read_half, MAX_REPLY_LINE),
            writer: write_half,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Set the deadline for each reply line and each payload chunk.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Upload `data` under `name`.
    pub async fn upload(&mut self, name: &str, data: &[u8]) -> Result<UploadResult, ClientError> {
        validate_name(name)?;
        let command = Command::Upload {
            name: name.to_string(),
            size: data.len() as u64,
        };
        self.send_command(&command).await?;
        self.writer.write_all(data).await?;
        self.writer.flush().await?;
        self.read_upload_reply(name).await
    }

    /// Upload a local file under its base name.
    pub async fn upload_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<UploadResult, ClientError> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ClientError::InvalidName(path.display().to_string()))?
            .to_string();
        validate_name(&name)?;

        let file = File::open(path).await?;
        let size = file.metadata().await?.len();
        info!("Uploading {} ({} bytes)", name, size);

        self.send_command(&Command::Upload {
            name: name.clone(),
            size,
        })
        .await?;
        let sent = tokio::io::copy(&mut file.take(size), &mut self.writer).await?;
        self.writer.flush().await?;
        if sent < size {
            // The file shrank while reading; the server will wait for the rest.
            warn!("{} shrank during upload: sent {} of {} bytes", name, sent, size);
        }

        self.read_upload_reply(&name).await
    }

    /// List the names in the server's store.
    pub async fn list(&mut self) -> Result<Vec<String>, ClientError> {
        self.send_command(&Command::List).await?;
        let line = self.read_reply_line().await?;
        match Reply::parse_list(&line) {
            Reply::FileList(names) => Ok(names),
            Reply::Error(reason) => Err(ClientError::Server(reason)),
            _ => Err(ClientError::UnexpectedReply(line)),
        }
    }

    /// Download a file into memory.
    pub async fn download(&mut self, name: &str) -> Result<DownloadResult, ClientError> {
        let Some(size) = self.request_download(name).await? else {
            return Ok(DownloadResult::NotFound);
        };

        let mut data = Vec::with_capacity(size.min(16 * 1024 * 1024) as usize);
        self.read_payload(size, &mut data).await?;
        Ok(DownloadResult::Found(data))
    }

    /// Download a file into `dir`, keeping its base name.
    ///
    /// Directory components of `name` are stripped, as the server does, so
    /// the file always lands directly inside `dir`. Returns the written path,
    /// or `None` if the server does not have the file. A truncated download
    /// leaves no partial file behind.
    pub async fn download_to(
        &mut self,
        name: &str,
        dir: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>, ClientError> {
        let base = StoredName::sanitize(name)
            .map_err(|_| ClientError::InvalidName(name.to_string()))?;

        let Some(size) = self.request_download(base.as_str()).await? else {
            return Ok(None);
        };

        let path = dir.as_ref().join(base.as_str());
        let mut file = File::create(&path).await?;
        let result = self.read_payload(size, &mut file).await;
        let result = match result {
            Ok(()) => file.flush().await.map_err(ClientError::from),
            Err(e) => Err(e),
        };
        drop(file);

        if let Err(e) = result {
            if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                debug!("Could not remove partial download {}: {}", path.display(), remove_err);
            }
            return Err(e);
        }

        info!("Downloaded {} ({} bytes) to {}", name, size, path.display());
        Ok(Some(path))
    }

    /// Delete a file from the server's store.
    pub async fn delete(&mut self, name: &str) -> Result<DeleteResult, ClientError> {
        validate_name(name)?;
        self.send_command(&Command::Delete {
            name: name.to_string(),
        })
        .await?;

        let line = self.read_reply_line().await?;
        match Reply::parse(&line) {
            Some(Reply::FileDeleted) => Ok(DeleteResult::Deleted),
            Some(Reply::FileNotFound) => Ok(DeleteResult::NotFound),
            Some(Reply::Error(reason)) => Err(ClientError::Server(reason)),
            _ => Err(ClientError::UnexpectedReply(line)),
        }
    }

    /// Close the connection.
    pub async fn close(mut self) -> Result<(), ClientError> {
        self.writer.shutdown().await?;
        Ok(())
    }

    async fn send_command(&mut self, command: &Command) -> Result<(), ClientError> {
        debug!("Sending {}", command);
        self.writer
            .write_all(format!("{command}\n").as_bytes())
            .await?;
        Ok(())
    }

    async fn read_reply_line(&mut self) -> Result<String, ClientError> {
        match timeout(self.timeout, self.reader.read_line()).await {
            Err(_) => Err(ClientError::Timeout),
            Ok(Ok(Some(line))) => Ok(line),
            Ok(Ok(None)) => Err(ClientError::Closed),
            Ok(Err(FrameError::LineTooLong(max))) => Err(ClientError::UnexpectedReply(format!(
                "reply longer than {max} bytes"
            ))),
            Ok(Err(FrameError::Io(e))) => Err(ClientError::Io(e)),
        }
    }

    async fn read_upload_reply(&mut self, name: &str) -> Result<UploadResult, ClientError> {
        let line = self.read_reply_line().await?;
        match Reply::parse(&line) {
            Some(Reply::UploadSuccess) => {
                info!("Server confirmed upload of {}", name);
                Ok(UploadResult::Success)
            }
            Some(Reply::UploadIncomplete) => {
                warn!("Server reported upload of {} incomplete", name);
                Ok(UploadResult::Incomplete)
            }
            Some(Reply::Error(reason)) => Err(ClientError::Server(reason)),
            _ => Err(ClientError::UnexpectedReply(line)),
        }
    }

    /// Send DOWNLOAD and return the announced size, or `None` if missing.
    async fn request_download(&mut self, name: &str) -> Result<Option<u64>, ClientError> {
        validate_name(name)?;
        self.send_command(&Command::Download {
            name: name.to_string(),
        })
        .await?;

        let line = self.read_reply_line().await?;
        match Reply::parse(&line) {
            Some(Reply::FileFound(size)) => Ok(Some(size)),
            Some(Reply::FileNotFound) => Ok(None),
            Some(Reply::Error(reason)) => Err(ClientError::Server(reason)),
            _ => Err(ClientError::UnexpectedReply(line)),
        }
    }

    async fn read_payload<W>(&mut self, size: u64, out: &mut W) -> Result<(), ClientError>
    where
        W: AsyncWrite + Unpin,
    {
        copy_payload(&mut self.reader, size, out, self.timeout).await
    }
}

/// Copy exactly `size` payload bytes from `reader` to `out`.
async fn copy_payload<R, W>(
    reader: &mut FramedReader<R>,
    size: u64,
    out: &mut W,
    chunk_timeout: Duration,
) -> Result<(), ClientError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;

    while received < size {
        let want = (size - received).min(buf.len() as u64) as usize;
        let n = match timeout(chunk_timeout, reader.read_chunk(&mut buf[..want])).await {
            Err(_) => return Err(ClientError::Timeout),
            Ok(result) => result?,
        };
        if n == 0 {
            return Err(ClientError::Truncated {
                expected: size,
                received,
            });
        }
        out.write_all(&buf[..n]).await?;
        received += n as u64;
    }

    Ok(())
}

/// Reject names the whitespace-split command grammar cannot carry.
fn validate_name(name: &str) -> Result<(), ClientError> {
    if name.is_empty() || name.chars().any(char::is_whitespace) {
        return Err(ClientError::InvalidName(name.to_string()));
    }
    Ok(())
}
