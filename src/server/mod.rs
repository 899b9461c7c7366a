//! File share server module.
//!
//! This module provides the TCP listener and the per-connection command
//! loop.

mod connection;
mod listener;

pub use connection::{CloseReason, Connection, ConnectionState};
pub use listener::{ConnectionPermit, FileServer, ShutdownHandle};
