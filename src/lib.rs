//! # storewatch
//!
//! Poll-based detection of external changes to a shared persisted store.
//!
//! ## Overview
//!
//! Several processes (a TUI, CLI commands, other instances) share one store.
//! Each of them keeps an in-memory view and needs to know when *someone else*
//! changed the store. `storewatch` answers that question by:
//! - Sampling a store-internal modification marker at a fixed interval
//! - Suppressing changes caused by the process's own saves (ignore window)
//! - Coalescing any number of changes into a single pending reload signal
//! - Shutting down cleanly and idempotently
//!
//! Polling replaces filesystem notifications, which are unreliable on network
//! and virtualized filesystems (NFS, 9p, WSL).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use storewatch::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<()> {
//! let store = FileMarkerStore::new("state.marker");
//! let watcher = Arc::new(
//!     StoreWatcher::builder()
//!         .with_store(store.clone())
//!         .with_settings(WatchSettings::load(None, Some("MYAPP"))?)
//!         .build()?,
//! );
//!
//! let view = SyncedView::load(Arc::clone(&watcher), || {
//!     std::fs::read_to_string("sessions.json")
//! })?;
//! watcher.start()?;
//! let _task = view.spawn_auto_reload()?;
//!
//! // Our own writes go through the view, which announces them to the watcher
//! view.save("[]".to_string(), |contents| {
//!     std::fs::write("sessions.json", contents)?;
//!     store.touch().map(|_| ())
//! })?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `metrics`: OpenTelemetry counters for poll outcomes, signals and reloads

#![warn(missing_docs, rust_2024_compatibility)]
#![deny(unsafe_code)]

pub mod core;
pub mod error;
pub mod store;
pub mod view;

#[cfg(feature = "metrics")]
pub mod metrics;

/// Convenient re-exports for common usage patterns.
pub mod prelude {
    pub use crate::core::{PollOutcome, ReloadChannel, StoreWatcher, StoreWatcherBuilder, WatchSettings};
    pub use crate::error::{Result, ValidationError, WatchError};
    pub use crate::store::{FileMarkerStore, Marker, MarkerStore, MemoryStore};
    pub use crate::view::{ListenerHandle, SyncedView};
}
