//! File store module.
//!
//! This module provides the directory-backed store that holds uploaded files:
//! - Name sanitization down to a base name
//! - Existence, size, open, create, delete and list operations
//! - Per-name locking so concurrent transfers of one name are serialized

mod lock;
mod storage;

pub use lock::{NameGuard, NameLocks};
pub use storage::{FileStore, StoreError, StoreResult, StoredName};
