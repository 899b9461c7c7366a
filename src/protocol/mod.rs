//! Wire protocol.
//!
//! Clients send newline-terminated ASCII command lines; uploads follow the
//! command with raw payload bytes. Each command gets one newline-terminated
//! reply, and a `FILE_FOUND` reply is followed by the file's bytes.

mod command;
mod framing;
mod reply;

pub use command::{keyword, Command, CommandError};
pub use framing::{FrameError, FramedReader};
pub use reply::{Reply, ERROR_PREFIX, LIST_DELIMITER};
