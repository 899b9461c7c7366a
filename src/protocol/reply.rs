//! Server replies.
//!
//! Every reply is a single newline-terminated line. `FILE_FOUND` is followed
//! by exactly the announced number of raw bytes.

use std::fmt;

/// Delimiter between names in a LIST reply.
pub const LIST_DELIMITER: char = '|';

/// Prefix of error replies.
pub const ERROR_PREFIX: &str = "ERROR: ";

/// A control reply written back on the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// All declared upload bytes were stored.
    UploadSuccess,
    /// The upload ended before the declared size was reached.
    UploadIncomplete,
    /// Names in the store, in listing order.
    FileList(Vec<String>),
    /// The requested file exists; this many payload bytes follow.
    FileFound(u64),
    /// No stored file has the requested name.
    FileNotFound,
    /// The file was removed.
    FileDeleted,
    /// The request failed; the text explains why.
    Error(String),
}

impl Reply {
    /// Build an error reply from anything displayable.
    pub fn error(reason: impl fmt::Display) -> Self {
        Reply::Error(reason.to_string())
    }

    /// Render the reply with its trailing newline.
    pub fn to_line(&self) -> String {
        format!("{self}\n")
    }

    /// Parse a reply line that is not a LIST reply.
    ///
    /// LIST replies are plain delimited names and cannot be told apart from
    /// other replies without knowing the request; use [`Reply::parse_list`].
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);

        if let Some(reason) = line.strip_prefix(ERROR_PREFIX) {
            return Some(Reply::Error(reason.to_string()));
        }
        if let Some(size) = line.strip_prefix("FILE_FOUND ") {
            return size.trim().parse().ok().map(Reply::FileFound);
        }

        match line {
            "UPLOAD_SUCCESS" => Some(Reply::UploadSuccess),
            "UPLOAD_INCOMPLETE" => Some(Reply::UploadIncomplete),
            "FILE_NOT_FOUND" => Some(Reply::FileNotFound),
            "FILE_DELETED" => Some(Reply::FileDeleted),
            _ => None,
        }
    }

    /// Parse the reply to a LIST request.
    pub fn parse_list(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if let Some(reason) = line.strip_prefix(ERROR_PREFIX) {
            return Reply::Error(reason.to_string());
        }
        if line.is_empty() {
            return Reply::FileList(Vec::new());
        }
        Reply::FileList(line.split(LIST_DELIMITER).map(str::to_string).collect())
    }

    /// Whether `name` can appear in a LIST reply without breaking its framing.
    pub fn is_listable(name: &str) -> bool {
        !name.contains([LIST_DELIMITER, '\n', '\r'])
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::UploadSuccess => f.write_str("UPLOAD_SUCCESS"),
            Reply::UploadIncomplete => f.write_str("UPLOAD_INCOMPLETE"),
            Reply::FileList(names) => {
                for (i, name) in names.iter().enumerate() {
                    if i > 0 {
                        write!(f, "{LIST_DELIMITER}")?;
                    }
                    f.write_str(name)?;
                }
                Ok(())
            }
            Reply::FileFound(size) => write!(f, "FILE_FOUND {size}"),
            Reply::FileNotFound => f.write_str("FILE_NOT_FOUND"),
            Reply::FileDeleted => f.write_str("FILE_DELETED"),
            Reply::Error(reason) => write!(f, "{ERROR_PREFIX}{reason}"),
        }
    }
}
