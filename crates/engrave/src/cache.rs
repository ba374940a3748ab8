//! Durable artifact cache.
//!
//! A flat directory of `<name>.pdf` / `<name>.midi` files that outlives the
//! per-request scratch directory. Writes go to a temp file in the same
//! directory and are renamed into place, so readers see either the old
//! file or the new one.
//!
//! All methods do blocking `std::fs` I/O; async callers run them under
//! `tokio::task::spawn_blocking`.

use crate::error::{EngraveError, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ArtifactCache {
    dir: PathBuf,
}

impl ArtifactCache {
    /// Cache rooted at `dir`. The directory is created on first write.
    pub fn at_path(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path for `filename` inside the cache, or `None` if it is not a plain file name.
    pub fn path_for(&self, filename: &str) -> Option<PathBuf> {
        is_plain_file_name(filename).then(|| self.dir.join(filename))
    }

    /// Atomically write `data` as `filename`, replacing any previous entry.
    pub fn store(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let target = self
            .path_for(filename)
            .ok_or_else(|| EngraveError::InvalidBaseName(filename.to_string()))?;

        fs::create_dir_all(&self.dir)
            .map_err(|e| EngraveError::io("creating cache directory", e))?;

        let mut staging = NamedTempFile::new_in(&self.dir)
            .map_err(|e| EngraveError::io("staging cache entry", e))?;
        staging
            .write_all(data)
            .map_err(|e| EngraveError::io("writing cache entry", e))?;

        let replaced = target.exists();
        staging
            .persist(&target)
            .map_err(|e| EngraveError::io("publishing cache entry", e.error))?;

        debug!(
            path = %target.display(),
            bytes = data.len(),
            replaced,
            "cached artifact"
        );
        Ok(target)
    }

    /// Read a cached entry. `Ok(None)` if it does not exist.
    pub fn read(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        let Some(path) = self.path_for(filename) else {
            return Ok(None);
        };
        match fs::read(&path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(EngraveError::io("reading cache entry", e)),
        }
    }

    /// Remove an entry if present.
    pub fn remove(&self, filename: &str) -> Result<bool> {
        let Some(path) = self.path_for(filename) else {
            return Ok(false);
        };
        match fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %path.display(), "removed stale cache entry");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(EngraveError::io("removing cache entry", e)),
        }
    }
}

/// True for a single path component that is not `.`/`..` and has no separators.
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && Path::new(name).file_name().map(|f| f == name).unwrap_or(false)
}
