//! Per-connection command loop.

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::protocol::{Command, FrameError, FramedReader, Reply};
use crate::transfer::{Flow, TransferEngine};

/// Phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// Waiting for the next command line.
    #[default]
    AwaitCommand,
    /// A command is being executed.
    Dispatching,
    /// The connection has been released.
    Closed,
}

/// Why a connection ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed its side while no command was in flight.
    PeerClosed,
    /// No command line arrived within the idle timeout.
    IdleTimeout,
    /// A command line exceeded the maximum length.
    LineTooLong,
    /// A transfer left the stream in an unknown state.
    TransferAborted,
    /// Socket-level failure.
    Io(io::Error),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => f.write_str("peer closed"),
            CloseReason::IdleTimeout => f.write_str("idle timeout"),
            CloseReason::LineTooLong => f.write_str("command line too long"),
            CloseReason::TransferAborted => f.write_str("transfer aborted"),
            CloseReason::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

/// One client connection and the loop that serves it.
pub struct Connection<S> {
    id: Uuid,
    peer_addr: SocketAddr,
    reader: FramedReader<ReadHalf<S>>,
    writer: WriteHalf<S>,
    state: ConnectionState,
    engine: Arc<TransferEngine>,
    idle_timeout: Duration,
    commands_handled: u64,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite,
{
    /// Take ownership of an accepted stream.
    pub fn new(
        stream: S,
        peer_addr: SocketAddr,
        engine: Arc<TransferEngine>,
        config: &ServerConfig,
    ) -> Self {
        let id = Uuid::new_v4();
        debug!("Created connection {} for {}", id, peer_addr);

        let (read_half, write_half) = tokio::io::split(stream);

        Self {
            id,
            peer_addr,
            reader: FramedReader::new(read_half, config.max_line_length),
            writer: write_half,
            state: ConnectionState::default(),
            engine,
            idle_timeout: config.idle_timeout(),
            commands_handled: 0,
        }
    }

    /// Get the connection ID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Get the peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Get the current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    fn set_state(&mut self, state: ConnectionState) {
        debug!(
            "Connection {} state changed: {:?} -> {:?}",
            self.id, self.state, state
        );
        self.state = state;
    }

    async fn send(&mut self, reply: &Reply) -> io::Result<()> {
        self.engine.send_reply(&mut self.writer, reply).await
    }

    /// Serve commands until the peer leaves or the stream fails.
    ///
    /// Malformed commands are answered with `ERROR: ...` and do not end the
    /// loop.
    pub async fn run(mut self) -> CloseReason {
        let stats = Arc::clone(self.engine.stats());
        stats.connection_opened();
        info!("Client connected: {} (connection {})", self.peer_addr, self.id);

        let reason = loop {
            let line = match timeout(self.idle_timeout, self.reader.read_line()).await {
                Err(_) => break CloseReason::IdleTimeout,
                Ok(Ok(None)) => break CloseReason::PeerClosed,
                Ok(Ok(Some(line))) => line,
                Ok(Err(FrameError::LineTooLong(max))) => {
                    warn!(
                        "Connection {} sent a command line over {} bytes",
                        self.id, max
                    );
                    if let Err(e) = self.send(&Reply::error("Command too long.")).await {
                        debug!("Could not deliver error reply: {}", e);
                    }
                    break CloseReason::LineTooLong;
                }
                Ok(Err(FrameError::Io(e))) => break CloseReason::Io(e),
            };

            let command = match Command::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Invalid command from {}: {:?} ({})", self.peer_addr, line, e);
                    if let Err(e) = self.send(&Reply::error(&e)).await {
                        break CloseReason::Io(e);
                    }
                    continue;
                }
            };

            info!("Received {} command from {}: {}", command.keyword(), self.peer_addr, command);
            self.set_state(ConnectionState::Dispatching);

            match self
                .engine
                .execute(command, &mut self.reader, &mut self.writer)
                .await
            {
                Ok(Flow::Continue) => {
                    self.commands_handled += 1;
                    self.set_state(ConnectionState::AwaitCommand);
                }
                Ok(Flow::Close) => break CloseReason::TransferAborted,
                Err(e) => break CloseReason::Io(e),
            }
        };

        self.set_state(ConnectionState::Closed);
        if let Err(e) = self.writer.shutdown().await {
            debug!("Shutdown of connection {} failed: {}", self.id, e);
        }
        stats.connection_closed();

        info!(
            "Client disconnected: {} ({}, {} commands)",
            self.peer_addr, reason, self.commands_handled
        );
        reason
    }
}
