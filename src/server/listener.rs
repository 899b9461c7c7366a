//! TCP listener for the file share server.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tracing::{debug, error, info};

use super::connection::Connection;
use crate::config::ServerConfig;
use crate::transfer::TransferEngine;
use crate::Result;

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// File share server that accepts TCP connections.
pub struct FileServer {
    listener: TcpListener,
    semaphore: Arc<Semaphore>,
    max_connections: usize,
    config: ServerConfig,
    engine: Arc<TransferEngine>,
    shutdown: ShutdownHandle,
}

impl FileServer {
    /// Create a new FileServer bound to the configured address.
    pub async fn bind(config: &ServerConfig, engine: Arc<TransferEngine>) -> Result<Self> {
        let addr = format!("{}:{}", config.host, config.port);
        let listener = TcpListener::bind(&addr).await?;
        let local_addr = listener.local_addr()?;

        info!("File server listening on {}", local_addr);

        Ok(Self {
            listener,
            semaphore: Arc::new(Semaphore::new(config.max_connections)),
            max_connections: config.max_connections,
            config: config.clone(),
            engine,
            shutdown: ShutdownHandle::new(),
        })
    }

    /// Get the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Get the maximum number of connections allowed.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Get the number of available connection slots.
    pub fn available_connections(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Get the number of active connections.
    pub fn active_connections(&self) -> usize {
        self.max_connections - self.semaphore.available_permits()
    }

    /// Get the engine shared by all connections.
    pub fn engine(&self) -> &Arc<TransferEngine> {
        &self.engine
    }

    /// Get a handle that stops [`FileServer::run`].
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Accept a new connection.
    ///
    /// Waits for a free connection slot before accepting. Returns the TCP
    /// stream, the peer address and the slot permit.
    pub async fn accept(&self) -> Result<(TcpStream, SocketAddr, ConnectionPermit)> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| crate::FileShareError::Io(std::io::Error::other("semaphore closed")))?;

        let (stream, addr) = self.listener.accept().await?;
        debug!("Accepted connection from {}", addr);

        Ok((stream, addr, ConnectionPermit { _permit: permit }))
    }

    /// Accept connections until the shutdown handle is triggered.
    ///
    /// Each connection is served on its own task. Returning `Ok(())` means
    /// the listener was stopped and its socket closed; connections that were
    /// already accepted keep running.
    pub async fn run(self) -> Result<()> {
        let shutdown = self.shutdown.clone();

        while shutdown.is_running() {
            tokio::select! {
                _ = shutdown.notify.notified() => break,
                accepted = self.accept() => match accepted {
                    Ok((stream, addr, permit)) => self.spawn_connection(stream, addr, permit),
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }

        let local_addr = self.listener.local_addr().ok();
        drop(self.listener);
        match local_addr {
            Some(addr) => info!("File server on {} stopped", addr),
            None => info!("File server stopped"),
        }
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr, permit: ConnectionPermit) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY for {}: {}", addr, e);
        }

        let connection = Connection::new(stream, addr, Arc::clone(&self.engine), &self.config);
        tokio::spawn(async move {
            connection.run().await;
            // Permit is dropped here, releasing the connection slot
            drop(permit);
        });
    }
}

/// A permit that represents an active connection slot.
///
/// When this permit is dropped, the connection slot is released.
pub struct ConnectionPermit {
    _permit: tokio::sync::OwnedSemaphorePermit,
}

/// Stops a running [`FileServer`].
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl ShutdownHandle {
    fn new() -> Self {
        Self {
            running: Arc::new(AtomicBool::new(true)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Whether the accept loop should keep going.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Ask the accept loop to exit and close the listening socket.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }
}
