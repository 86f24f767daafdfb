//! Persistent one-file-per-key JSON store.
//!
//! [`MetadataCache`] backs the model metadata lookups.  The presence of
//! `{root}/{key}.json` means the value is known; its content is the
//! verbatim last-fetched document.  Entries never expire.
//!
//! There is no locking: the cache is only safe for a single process
//! accessing it sequentially.

use std::io::ErrorKind;
use std::path::PathBuf;

use crate::error::CacheError;
use crate::fs::{atomic_write, is_safe_file_stem};
use crate::schema::Document;

pub struct MetadataCache {
    root: PathBuf,
}

impl MetadataCache {
    /// Open a cache rooted at an existing directory.
    pub fn open(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Look up `key`, returning `None` when no entry exists.
    pub fn get(&self, key: &str) -> Result<Option<Document>, CacheError> {
        let path = self.entry_path(key)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheError::Io { path, source }),
        };

        let document = serde_json::from_slice(&bytes)
            .map_err(|source| CacheError::Corrupt { path: path.clone(), source })?;
        tracing::trace!(key, path = %path.display(), "Metadata cache hit");
        Ok(Some(document))
    }

    /// Store `value` under `key`, replacing any previous entry.
    pub fn set(&self, key: &str, value: &Document) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|source| CacheError::Corrupt { path: path.clone(), source })?;
        atomic_write(&path, &bytes).map_err(|source| CacheError::Io { path, source })
    }

    /// `{root}/{key}.json`, rejecting keys that could escape the root.
    pub fn entry_path(&self, key: &str) -> Result<PathBuf, CacheError> {
        if !is_safe_file_stem(key) {
            return Err(CacheError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(format!("{key}.json")))
    }
}
