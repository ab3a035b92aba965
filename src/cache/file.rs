//! File-backed cache store.
//!
//! Layout: one `<key>.json` file per entry under a single directory. Writes
//! go to a temporary file first and are renamed into place, so a reader
//! never observes a half-written entry.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::{CacheEntry, CacheStore, CachedPayload};
use crate::clock::{Clock, SystemClock};
use crate::{Result, TalkWalkError};

const ENTRY_EXTENSION: &str = "json";

/// Persistent cache rooted at a directory.
pub struct FileCache {
    dir: PathBuf,
    clock: Arc<dyn Clock>,
}

impl FileCache {
    /// Open (creating if needed) a cache directory using the system clock.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        Self::with_clock(dir, Arc::new(SystemClock))
    }

    /// Open a cache directory with an explicit clock.
    pub fn with_clock(dir: impl Into<PathBuf>, clock: Arc<dyn Clock>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| {
            TalkWalkError::CacheIo(format!("failed to create cache dir {}: {e}", dir.display()))
        })?;
        Ok(Self { dir, clock })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXTENSION}", sanitize_key(key)))
    }

    /// Paths of all entry files currently in the directory.
    fn entry_paths(&self) -> Result<Vec<PathBuf>> {
        let read_dir = fs::read_dir(&self.dir).map_err(|e| {
            TalkWalkError::CacheIo(format!("failed to list {}: {e}", self.dir.display()))
        })?;
        let mut paths = Vec::new();
        for item in read_dir {
            let item = item.map_err(|e| TalkWalkError::CacheIo(e.to_string()))?;
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) && path.is_file() {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn read_entry(path: &Path) -> Result<Option<CacheEntry>> {
        let content = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TalkWalkError::CacheIo(format!(
                    "failed to read {}: {e}",
                    path.display()
                )));
            }
        };
        match serde_json::from_str(&content) {
            Ok(entry) => Ok(Some(entry)),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry");
                Ok(None)
            }
        }
    }

    fn remove(path: &Path) -> Result<bool> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            // Removed concurrently; nothing left to do.
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TalkWalkError::CacheIo(format!(
                "failed to remove {}: {e}",
                path.display()
            ))),
        }
    }
}

impl CacheStore for FileCache {
    fn name(&self) -> &str {
        "file"
    }

    fn get(&self, key: &str) -> Result<Option<CacheEntry>> {
        let path = self.entry_path(key);
        let Some(entry) = Self::read_entry(&path)? else {
            return Ok(None);
        };
        if entry.is_fresh(self.clock.now()) {
            Ok(Some(entry))
        } else {
            debug!(key, "cache entry expired");
            Ok(None)
        }
    }

    fn put(&self, key: &str, payload: CachedPayload, ttl: Duration) -> Result<()> {
        let entry = CacheEntry::new(key, payload, self.clock.now(), ttl);
        let json = serde_json::to_string_pretty(&entry)
            .map_err(|e| TalkWalkError::CacheIo(format!("failed to serialize entry: {e}")))?;

        let path = self.entry_path(key);
        // Unique temp name so two writers of the same key never share a file.
        let nonce = rand::random::<u64>();
        let tmp_path = path.with_extension(format!("{ENTRY_EXTENSION}.{nonce:016x}.tmp"));
        fs::write(&tmp_path, json).map_err(|e| {
            TalkWalkError::CacheIo(format!("failed to write {}: {e}", tmp_path.display()))
        })?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            TalkWalkError::CacheIo(format!(
                "failed to rename {} → {}: {e}",
                tmp_path.display(),
                path.display()
            ))
        })
    }

    fn clear_all(&self) -> Result<usize> {
        let mut removed = 0;
        for path in self.entry_paths()? {
            if Self::remove(&path)? {
                removed += 1;
            }
        }
        debug!(removed, dir = %self.dir.display(), "cleared cache");
        Ok(removed)
    }

    fn clear_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut removed = 0;
        for path in self.entry_paths()? {
            // Unreadable entries can never be served, so they go too.
            let stale = match Self::read_entry(&path)? {
                Some(entry) => !entry.is_fresh(now),
                None => true,
            };
            if stale && Self::remove(&path)? {
                removed += 1;
            }
        }
        debug!(removed, dir = %self.dir.display(), "cleared expired cache entries");
        Ok(removed)
    }

    fn len(&self) -> Result<usize> {
        Ok(self.entry_paths()?.len())
    }
}

/// Keep keys usable as file names: anything outside `[A-Za-z0-9_-]` becomes `_`.
fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
