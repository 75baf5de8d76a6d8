//! In-process marker store.

use super::{Marker, MarkerStore};
use crate::error::{Result, WatchError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// In-process store backed by a shared counter.
///
/// Clones share the same counter, so one clone can be handed to a
/// [`StoreWatcher`](crate::core::StoreWatcher) while another plays the part of
/// a writer. Reads can be made to fail with [`MemoryStore::set_unavailable`]
/// to exercise the watcher's transient-failure path.
///
/// # Examples
///
/// ```rust
/// use storewatch::store::{Marker, MarkerStore, MemoryStore};
///
/// let store = MemoryStore::new();
/// assert_eq!(store.last_modified().unwrap(), Marker::ZERO);
///
/// store.touch();
/// assert_eq!(store.last_modified().unwrap(), Marker::new(1));
/// ```
#[derive(Clone, Default)]
pub struct MemoryStore {
    counter: Arc<AtomicU64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryStore {
    /// Create a store whose marker starts at [`Marker::ZERO`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store whose marker starts at `initial`.
    pub fn with_marker(initial: Marker) -> Self {
        Self {
            counter: Arc::new(AtomicU64::new(initial.value())),
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Record a committed write, advancing the marker by one.
    ///
    /// Returns the new marker. Touching works even while reads are
    /// unavailable. The marker saturates at `u64::MAX`, after which touches
    /// no longer register as changes.
    pub fn touch(&self) -> Marker {
        let previous = self
            .counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| Some(v.saturating_add(1)))
            .unwrap_or_else(|v| v);
        Marker::new(previous.saturating_add(1))
    }

    /// Make subsequent reads fail (`true`) or succeed again (`false`).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }
}

impl MarkerStore for MemoryStore {
    fn last_modified(&self) -> Result<Marker> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(WatchError::StoreUnavailable(
                "memory store is marked unavailable".to_string(),
            ));
        }
        Ok(Marker::new(self.counter.load(Ordering::SeqCst)))
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_advances_marker() {
        let store = MemoryStore::new();
        assert_eq!(store.touch(), Marker::new(1));
        assert_eq!(store.touch(), Marker::new(2));
        assert_eq!(store.last_modified().unwrap(), Marker::new(2));
    }

    #[test]
    fn test_touch_saturates_at_max() {
        let store = MemoryStore::with_marker(Marker::new(u64::MAX - 1));
        assert_eq!(store.touch(), Marker::new(u64::MAX));
        assert_eq!(store.touch(), Marker::new(u64::MAX));
        assert_eq!(store.last_modified().unwrap(), Marker::new(u64::MAX));
    }

    #[test]
    fn test_clones_share_counter() {
        let store = MemoryStore::with_marker(Marker::new(10));
        let writer = store.clone();
        writer.touch();
        assert_eq!(store.last_modified().unwrap(), Marker::new(11));
    }

    #[test]
    fn test_unavailable_reads_fail() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        store.touch();

        let err = store.last_modified().unwrap_err();
        assert!(err.is_transient());

        store.set_unavailable(false);
        assert_eq!(store.last_modified().unwrap(), Marker::new(1));
    }
}
