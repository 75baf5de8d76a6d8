//! Builder for constructing StoreWatcher instances.

use crate::core::{MetricsSlot, StoreWatcher, WatchSettings};
use crate::error::{Result, WatchError};
use crate::store::MarkerStore;
use std::sync::Arc;
use std::time::Duration;

/// How the ignore window is chosen when the builder finishes.
#[derive(Debug, Clone, Copy)]
enum WindowChoice {
    Explicit(Duration),
    Factor(f64),
}

/// Builder for constructing a [`StoreWatcher`].
///
/// Provides a fluent interface for choosing the store and the poll timing.
/// Unless told otherwise, the ignore window is derived from the poll interval
/// (`interval * 1.5`), which keeps the window at least one interval long.
///
/// # Examples
///
/// ```rust,no_run
/// use storewatch::prelude::*;
/// use std::time::Duration;
///
/// # fn example() -> Result<()> {
/// let watcher = StoreWatcher::builder()
///     .with_store(FileMarkerStore::new("state.marker"))
///     .poll_interval(Duration::from_millis(500))
///     .ignore_window_factor(2.0)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct StoreWatcherBuilder {
    store: Option<Arc<dyn MarkerStore>>,
    poll_interval: Duration,
    window: WindowChoice,
    metrics: MetricsSlot,
}

impl StoreWatcherBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        let defaults = WatchSettings::default();
        Self {
            store: None,
            poll_interval: defaults.poll_interval,
            window: WindowChoice::Factor(crate::core::DEFAULT_IGNORE_WINDOW_FACTOR),
            metrics: MetricsSlot::default(),
        }
    }

    /// Set the store to watch.
    pub fn with_store<S: MarkerStore + 'static>(mut self, store: S) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    /// Set the store to watch from an existing shared handle.
    pub fn with_shared_store(mut self, store: Arc<dyn MarkerStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set how often the store marker is sampled.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set an explicit ignore window.
    ///
    /// A window shorter than the poll interval is accepted but logged, since
    /// it lets this process's own saves come back as reload signals.
    pub fn ignore_window(mut self, window: Duration) -> Self {
        self.window = WindowChoice::Explicit(window);
        self
    }

    /// Derive the ignore window as `poll_interval * factor`.
    ///
    /// The derivation happens in [`build`](StoreWatcherBuilder::build), so
    /// the order of this call and [`poll_interval`](StoreWatcherBuilder::poll_interval)
    /// does not matter.
    pub fn ignore_window_factor(mut self, factor: f64) -> Self {
        self.window = WindowChoice::Factor(factor);
        self
    }

    /// Take both timings from loaded settings.
    pub fn with_settings(mut self, settings: WatchSettings) -> Self {
        self.poll_interval = settings.poll_interval;
        self.window = WindowChoice::Explicit(settings.ignore_window);
        self
    }

    /// Record watcher metrics through the given OpenTelemetry meter.
    #[cfg(feature = "metrics")]
    pub fn with_metrics(mut self, meter: opentelemetry::metrics::Meter) -> Self {
        self.metrics = Some(crate::metrics::WatcherMetrics::new(meter));
        self
    }

    /// The settings the builder would produce right now.
    pub fn settings(&self) -> WatchSettings {
        match self.window {
            WindowChoice::Explicit(window) => WatchSettings::new(self.poll_interval, window),
            WindowChoice::Factor(factor) => WatchSettings::derived(self.poll_interval, factor),
        }
    }

    /// Build the watcher.
    ///
    /// Reads the store's current marker; does not start polling.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - No store was configured
    /// - The settings fail validation (zero poll interval)
    pub fn build(self) -> Result<StoreWatcher> {
        let settings = self.settings();
        let store = self.store.ok_or(WatchError::MissingStore)?;
        StoreWatcher::from_parts(store, settings, self.metrics)
    }
}

impl Default for StoreWatcherBuilder {
    fn default() -> Self {
        Self::new()
    }
}
