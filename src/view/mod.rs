//! Consumer-side helpers.
//!
//! A consumer keeps an in-memory snapshot of the store, reloads it in full when
//! the watcher signals, and announces its own writes before making them.

mod listeners;
mod synced_view;

pub use listeners::{ListenerHandle, ReloadListeners};
pub use synced_view::SyncedView;
