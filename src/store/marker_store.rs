//! Marker store trait.

use crate::error::Result;
use std::fmt;
use std::sync::Arc;

/// Opaque, monotonically non-decreasing modification marker.
///
/// Stores advance their marker on every committed write. `Marker::ZERO` means
/// the store has never been written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Marker(u64);

impl Marker {
    /// Marker of a store that has never been written.
    pub const ZERO: Marker = Marker(0);

    /// Wrap a raw marker value.
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// The raw marker value.
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl From<u64> for Marker {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Trait for stores the watcher can poll.
///
/// Implement this trait for any persisted store shared between processes
/// (databases, files, key-value stores).
///
/// # Contract
///
/// The returned marker must be non-decreasing over the lifetime of the store
/// and must change if and only if a commit occurred since the previous call.
/// Implementations backed by a database must update the marker in the same
/// transaction as the write it accompanies.
pub trait MarkerStore: Send + Sync {
    /// Read the current modification marker.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read right now. The watcher
    /// treats every error as transient and retries on its next tick.
    fn last_modified(&self) -> Result<Marker>;

    /// Get a human-readable name for this store (for logging/debugging).
    fn name(&self) -> String;
}

impl<S: MarkerStore + ?Sized> MarkerStore for Arc<S> {
    fn last_modified(&self) -> Result<Marker> {
        (**self).last_modified()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}

impl<S: MarkerStore + ?Sized> MarkerStore for Box<S> {
    fn last_modified(&self) -> Result<Marker> {
        (**self).last_modified()
    }

    fn name(&self) -> String {
        (**self).name()
    }
}
