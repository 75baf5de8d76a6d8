//! File-backed marker store.

use super::{Marker, MarkerStore};
use crate::error::{Result, WatchError};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// Marker store persisted in a small sidecar file.
///
/// The file holds the marker as decimal nanoseconds since the Unix epoch.
/// Every process sharing the store points a `FileMarkerStore` at the same
/// path; writers call [`touch`](FileMarkerStore::touch) after committing a
/// write and the watcher polls [`last_modified`](MarkerStore::last_modified).
///
/// A missing file reads as [`Marker::ZERO`]. Touches replace the file
/// atomically (temp file + rename), so readers never observe a torn value.
///
/// # Examples
///
/// ```rust,no_run
/// use storewatch::store::{FileMarkerStore, MarkerStore};
///
/// # fn example() -> storewatch::error::Result<()> {
/// let store = FileMarkerStore::new("/var/lib/myapp/state.marker");
/// store.touch()?;
/// println!("marker: {}", store.last_modified()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct FileMarkerStore {
    path: PathBuf,
}

impl FileMarkerStore {
    /// Create a store that keeps its marker at `path`.
    ///
    /// The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the marker file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Record a committed write.
    ///
    /// Writes `max(now, current + 1)` so that a single writer never moves the
    /// marker backwards, even if the wall clock does. Concurrent writers in
    /// different processes must serialize their commits through the store
    /// itself. A marker already at `u64::MAX` stays there, so further
    /// touches are not observed as changes.
    ///
    /// # Errors
    ///
    /// Returns an error if the current marker is unreadable or the new one
    /// cannot be persisted.
    pub fn touch(&self) -> Result<Marker> {
        let current = self.last_modified()?;
        let next = Marker::new(now_nanos().max(current.value().saturating_add(1)));

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = NamedTempFile::new_in(dir)?;
        write!(tmp, "{}", next.value())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|e| WatchError::IoError(e.error))?;

        Ok(next)
    }
}

impl MarkerStore for FileMarkerStore {
    fn last_modified(&self) -> Result<Marker> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Marker::ZERO),
            Err(e) => return Err(e.into()),
        };

        let trimmed = contents.trim();
        if trimmed.is_empty() {
            return Ok(Marker::ZERO);
        }

        trimmed.parse::<u64>().map(Marker::new).map_err(|e| {
            WatchError::InvalidMarker(format!(
                "'{}' in {}: {}",
                trimmed,
                self.path.display(),
                e
            ))
        })
    }

    fn name(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

fn now_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .and_then(|ns| u64::try_from(ns).ok())
        .unwrap_or(0)
}
