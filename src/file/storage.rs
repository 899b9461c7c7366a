//! Directory-backed file store.
//!
//! All stored files live directly under a single root directory. Callers
//! address them by [`StoredName`], which can only be produced by
//! [`StoredName::sanitize`], so a path outside the root never reaches a
//! filesystem call.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tokio::fs::{self, File};
use tracing::debug;

use super::lock::{NameGuard, NameLocks};

/// Errors raised by the file store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The raw name has no usable base component.
    #[error("invalid file name: {0:?}")]
    InvalidName(String),

    /// No regular file with this name exists in the store.
    #[error("file not found: {0}")]
    NotFound(String),

    /// Underlying filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// A file name reduced to its base component.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoredName(String);

impl StoredName {
    /// Strip every directory component from an untrusted name.
    ///
    /// Both `/` and `\` count as separators. Names that reduce to nothing,
    /// `.` or `..`, or that contain a NUL byte are rejected.
    pub fn sanitize(raw: &str) -> StoreResult<Self> {
        let base = raw
            .trim()
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default();

        if base.is_empty() || base == "." || base == ".." || base.contains('\0') {
            return Err(StoreError::InvalidName(raw.to_string()));
        }

        Ok(Self(base.to_string()))
    }

    /// The base name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoredName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for StoredName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Flat collection of named files under one root directory.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
    locks: Arc<NameLocks>,
}

impl FileStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>) -> crate::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;

        Ok(Self {
            root,
            locks: Arc::new(NameLocks::default()),
        })
    }

    /// Get the root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &StoredName) -> PathBuf {
        self.root.join(name.as_str())
    }

    /// Serialize access to one name across connections.
    ///
    /// The returned guard must be held for the whole upload, download or
    /// delete of that name.
    pub async fn lock(&self, name: &StoredName) -> NameGuard {
        NameLocks::acquire(&self.locks, name.as_str()).await
    }

    /// Check whether a regular file with this name exists.
    pub async fn exists(&self, name: &StoredName) -> bool {
        fs::metadata(self.path_of(name))
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    /// Get the size of a stored file.
    pub async fn size(&self, name: &StoredName) -> StoreResult<u64> {
        match fs::metadata(self.path_of(name)).await {
            Ok(m) if m.is_file() => Ok(m.len()),
            Ok(_) => Err(StoreError::NotFound(name.to_string())),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Create (or truncate) a file for writing.
    pub async fn create(&self, name: &StoredName) -> StoreResult<File> {
        let file = File::create(self.path_of(name)).await?;
        debug!("Opened {} for writing", name);
        Ok(file)
    }

    /// Open a stored file for reading, returning it with its current size.
    pub async fn open(&self, name: &StoredName) -> StoreResult<(File, u64)> {
        let file = match File::open(self.path_of(name)).await {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        let metadata = file.metadata().await?;
        if !metadata.is_file() {
            return Err(StoreError::NotFound(name.to_string()));
        }

        Ok((file, metadata.len()))
    }

    /// Delete a stored file.
    ///
    /// Returns `true` if the file was removed, `false` if it didn't exist.
    pub async fn delete(&self, name: &StoredName) -> StoreResult<bool> {
        let path = self.path_of(name);

        match fs::metadata(&path).await {
            Ok(m) if !m.is_file() => return Ok(false),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        }

        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List stored files, sorted by name.
    ///
    /// Only regular files directly under the root are returned. Entries whose
    /// names are not valid UTF-8 are skipped.
    pub async fn list(&self) -> StoreResult<Vec<StoredName>> {
        let mut entries = fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            if let Ok(name) = entry.file_name().into_string() {
                names.push(StoredName(name));
            }
        }

        names.sort();
        Ok(names)
    }
}
