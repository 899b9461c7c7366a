//! Command line parsing.

use std::fmt;

use thiserror::Error;

/// A request sent by a client on one command line.
///
/// Names are untrusted and still need sanitizing before they reach the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `UPLOAD <name> <size>` followed by exactly `size` payload bytes.
    Upload { name: String, size: u64 },
    /// `LIST`
    List,
    /// `DOWNLOAD <name>`
    Download { name: String },
    /// `DELETE <name>`
    Delete { name: String },
}

/// Keywords recognized as the first token of a command line.
pub mod keyword {
    pub const UPLOAD: &str = "UPLOAD";
    pub const LIST: &str = "LIST";
    pub const DOWNLOAD: &str = "DOWNLOAD";
    pub const DELETE: &str = "DELETE";
}

/// Reasons a command line was rejected.
///
/// The `Display` text is what follows `ERROR: ` on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// The first token is not a known keyword.
    #[error("Unknown command.")]
    Unknown(String),

    /// Wrong number of arguments for a known keyword.
    #[error("Invalid {keyword} command. Format should be: {usage}")]
    InvalidFormat {
        keyword: &'static str,
        usage: &'static str,
    },

    /// The UPLOAD size is not a non-negative integer.
    #[error("Filesize must be an integer.")]
    InvalidSize(String),
}

impl Command {
    /// Parse one command line (delimiter already stripped).
    ///
    /// Tokens are separated by whitespace; keywords are case-sensitive.
    /// Returns `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError> {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = tokens.collect();

        let command = match keyword {
            keyword::UPLOAD => match args.as_slice() {
                [name, size] => {
                    let size = size
                        .parse::<u64>()
                        .map_err(|_| CommandError::InvalidSize((*size).to_string()))?;
                    Command::Upload {
                        name: (*name).to_string(),
                        size,
                    }
                }
                _ => {
                    return Err(CommandError::InvalidFormat {
                        keyword: keyword::UPLOAD,
                        usage: "UPLOAD filename filesize",
                    })
                }
            },
            keyword::LIST => {
                if !args.is_empty() {
                    return Err(CommandError::InvalidFormat {
                        keyword: keyword::LIST,
                        usage: "LIST",
                    });
                }
                Command::List
            }
            keyword::DOWNLOAD => match args.as_slice() {
                [name] => Command::Download {
                    name: (*name).to_string(),
                },
                _ => {
                    return Err(CommandError::InvalidFormat {
                        keyword: keyword::DOWNLOAD,
                        usage: "DOWNLOAD filename",
                    })
                }
            },
            keyword::DELETE => match args.as_slice() {
                [name] => Command::Delete {
                    name: (*name).to_string(),
                },
                _ => {
                    return Err(CommandError::InvalidFormat {
                        keyword: keyword::DELETE,
                        usage: "DELETE filename",
                    })
                }
            },
            other => return Err(CommandError::Unknown(other.to_string())),
        };

        Ok(Some(command))
    }

    /// The keyword of this command.
    pub fn keyword(&self) -> &'static str {
        match self {
            Command::Upload { .. } => keyword::UPLOAD,
            Command::List => keyword::LIST,
            Command::Download { .. } => keyword::DOWNLOAD,
            Command::Delete { .. } => keyword::DELETE,
        }
    }
}

impl fmt::Display for Command {
    /// Render the command line without its trailing newline.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Upload { name, size } => write!(f, "{} {name} {size}", keyword::UPLOAD),
            Command::List => f.write_str(keyword::LIST),
            Command::Download { name } => write!(f, "{} {name}", keyword::DOWNLOAD),
            Command::Delete { name } => write!(f, "{} {name}", keyword::DELETE),
        }
    }
}
