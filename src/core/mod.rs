//! Core watcher types.

mod builder;
mod settings;
mod watcher;

pub use builder::StoreWatcherBuilder;
pub use settings::{DEFAULT_IGNORE_WINDOW_FACTOR, DEFAULT_POLL_INTERVAL, WatchSettings};
pub use watcher::{PollOutcome, ReloadChannel, StoreWatcher};
pub(crate) use watcher::MetricsSlot;
