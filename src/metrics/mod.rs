//! Built-in metrics for watcher operations.
//!
//! Provides OpenTelemetry metrics tracking:
//! - Poll ticks and their outcomes (unchanged, suppressed, signaled, coalesced)
//! - Marker read failures
//! - Manual reload triggers
//! - Consumer reload duration and failures
//!
//! # Examples
//!
//! ```rust,no_run
//! use storewatch::prelude::*;
//! use opentelemetry::global;
//!
//! # fn example() -> Result<()> {
//! let meter = global::meter("my-app");
//!
//! let watcher = StoreWatcher::builder()
//!     .with_store(MemoryStore::new())
//!     .with_metrics(meter)
//!     .build()?;
//! # Ok(())
//! # }
//! ```

mod watcher_metrics;

pub use watcher_metrics::WatcherMetrics;
